//! The shape/paint program produced by interpreting a content stream.

use crate::content::color::Color;
use crate::content::graphics_state::{Matrix, StrokeStyle};
use crate::content::path::{Path, WindingRule};
use crate::content::text::{Glyph, TextIndex, TextRenderMode};
use crate::images::DecodedImage;
use crate::object::Object;
use std::sync::Arc;

/// Glyphs shown by one text-showing operator.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    /// Font resource name
    pub font_name: Option<String>,
    /// Font size
    pub font_size: f32,
    /// Rendering mode the run was shown with
    pub render_mode: TextRenderMode,
    /// Glyphs with page-space boxes
    pub glyphs: Vec<Glyph>,
    /// Fill colour, for filling modes
    pub fill: Option<Color>,
    /// Stroke colour, for stroking modes
    pub stroke: Option<Color>,
    /// Line width divided by the text matrix scale
    pub stroke_width: f32,
    /// Fill alpha
    pub fill_alpha: f32,
    /// Stroke alpha
    pub stroke_alpha: f32,
}

/// An image placed on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePaint {
    /// XObject resource name, `None` for inline images
    pub name: Option<String>,
    /// Maps the unit square onto the page, top row first
    pub matrix: Matrix,
    /// Width in samples
    pub width: u32,
    /// Height in samples
    pub height: u32,
    /// Decoded pixels, when decoding was requested and succeeded
    pub decoded: Option<DecodedImage>,
    /// Fill colour painted through a stencil mask (`/ImageMask true`)
    pub stencil: Option<Color>,
    /// `/Interpolate`
    pub interpolate: bool,
    /// Fill alpha
    pub alpha: f32,
}

/// One paint command.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeCommand {
    /// Save the renderer's state (`q`, form entry)
    Save,
    /// Restore the renderer's state (`Q`, form exit)
    Restore,
    /// The CTM after a change, absolute
    Transform(Matrix),
    /// Intersect the clip with a path
    Clip {
        /// Clip outline
        path: Path,
        /// Interior rule
        rule: WindingRule,
    },
    /// Fill a path
    Fill {
        /// Outline
        path: Path,
        /// Interior rule
        rule: WindingRule,
        /// Fill colour
        color: Color,
        /// Fill alpha
        alpha: f32,
    },
    /// Stroke a path
    Stroke {
        /// Outline
        path: Path,
        /// Stroke colour
        color: Color,
        /// Line parameters
        style: StrokeStyle,
        /// Stroke alpha
        alpha: f32,
    },
    /// Fill then stroke a path
    FillStroke {
        /// Outline
        path: Path,
        /// Interior rule
        rule: WindingRule,
        /// Fill colour
        fill: Color,
        /// Stroke colour
        stroke: Color,
        /// Line parameters
        style: StrokeStyle,
        /// Fill alpha
        fill_alpha: f32,
        /// Stroke alpha
        stroke_alpha: f32,
    },
    /// Paint an image
    Image(ImagePaint),
    /// Paint text
    Text(TextRun),
    /// Paint the clip region with a shading (`sh`)
    Shading {
        /// Shading resource name
        name: String,
        /// Shading dictionary or stream
        shading: Arc<Object>,
        /// CTM the shading is painted under
        matrix: Matrix,
        /// Fill alpha
        alpha: f32,
    },
}

/// Ordered paint commands plus the text extracted along the way.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShapeProgram {
    /// Paint commands in operator order
    pub commands: Vec<ShapeCommand>,
    /// Extracted text
    pub text: TextIndex,
    complete: bool,
}

impl ShapeProgram {
    /// Empty, not yet complete program.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command.
    pub fn push(&mut self, command: ShapeCommand) {
        self.commands.push(command);
    }

    /// Number of commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check if there are no commands and no text.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.text.is_empty()
    }

    /// Whether interpretation ran to the end of the content.
    ///
    /// An interrupted program keeps whatever it had built but stays
    /// incomplete.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub(crate) fn mark_complete(&mut self) {
        self.complete = true;
    }

    /// Splice a sub-program (a form's content) into this one.
    pub fn append(&mut self, other: ShapeProgram) {
        self.commands.extend(other.commands);
        self.text.append(other.text);
    }

    /// Drop empty save/restore pairs and redundant transforms, then trim storage.
    pub fn contract(&mut self) {
        let mut contracted: Vec<ShapeCommand> = Vec::with_capacity(self.commands.len());
        for command in self.commands.drain(..) {
            match (&command, contracted.last()) {
                (ShapeCommand::Restore, Some(ShapeCommand::Save)) => {
                    contracted.pop();
                },
                (ShapeCommand::Transform(_), Some(ShapeCommand::Transform(_))) => {
                    contracted.pop();
                    contracted.push(command);
                },
                _ => contracted.push(command),
            }
        }
        contracted.shrink_to_fit();
        self.commands = contracted;
        self.text.shrink_to_fit();
    }

    /// Iterate over the image commands.
    pub fn images(&self) -> impl Iterator<Item = &ImagePaint> {
        self.commands.iter().filter_map(|c| match c {
            ShapeCommand::Image(image) => Some(image),
            _ => None,
        })
    }

    /// Iterate over the text runs.
    pub fn text_runs(&self) -> impl Iterator<Item = &TextRun> {
        self.commands.iter().filter_map(|c| match c {
            ShapeCommand::Text(run) => Some(run),
            _ => None,
        })
    }
}
