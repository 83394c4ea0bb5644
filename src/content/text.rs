//! Text state and the extracted-text index.

use crate::content::graphics_state::Matrix;
use crate::fonts::{DictionaryFont, FontMetrics};
use crate::geometry::Rect;
use std::sync::Arc;

/// Text rendering mode (`Tr`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextRenderMode {
    /// Fill glyphs (0)
    #[default]
    Fill,
    /// Stroke glyph outlines (1)
    Stroke,
    /// Fill, then stroke (2)
    FillStroke,
    /// Neither fill nor stroke (3)
    Invisible,
    /// Fill and add to clip (4)
    FillClip,
    /// Stroke and add to clip (5)
    StrokeClip,
    /// Fill, stroke and add to clip (6)
    FillStrokeClip,
    /// Add to clip only (7)
    Clip,
}

impl TextRenderMode {
    /// Mode from its operand value.
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => TextRenderMode::Fill,
            1 => TextRenderMode::Stroke,
            2 => TextRenderMode::FillStroke,
            3 => TextRenderMode::Invisible,
            4 => TextRenderMode::FillClip,
            5 => TextRenderMode::StrokeClip,
            6 => TextRenderMode::FillStrokeClip,
            7 => TextRenderMode::Clip,
            _ => return None,
        })
    }

    /// Glyphs are filled.
    pub fn fills(self) -> bool {
        matches!(
            self,
            TextRenderMode::Fill | TextRenderMode::FillStroke | TextRenderMode::FillClip | TextRenderMode::FillStrokeClip
        )
    }

    /// Glyph outlines are stroked.
    pub fn strokes(self) -> bool {
        matches!(
            self,
            TextRenderMode::Stroke
                | TextRenderMode::FillStroke
                | TextRenderMode::StrokeClip
                | TextRenderMode::FillStrokeClip
        )
    }

    /// Glyphs are added to the clip at the end of the text object.
    pub fn clips(self) -> bool {
        matches!(
            self,
            TextRenderMode::FillClip | TextRenderMode::StrokeClip | TextRenderMode::FillStrokeClip | TextRenderMode::Clip
        )
    }
}

/// Text parameters of the graphics state.
#[derive(Debug, Clone)]
pub struct TextState {
    /// Metrics of the selected font
    pub font: Arc<dyn FontMetrics>,
    /// Resource name of the selected font (`Tf`)
    pub font_name: Option<String>,
    /// Font size (`Tf`)
    pub font_size: f32,
    /// Character spacing (`Tc`)
    pub char_space: f32,
    /// Word spacing (`Tw`)
    pub word_space: f32,
    /// Horizontal scaling percentage (`Tz`)
    pub horizontal_scaling: f32,
    /// Text leading (`TL`)
    pub leading: f32,
    /// Text rise (`Ts`)
    pub rise: f32,
    /// Text rendering mode (`Tr`)
    pub render_mode: TextRenderMode,
    /// Text matrix (`Tm`)
    pub matrix: Matrix,
    /// Text line matrix
    pub line_matrix: Matrix,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font: Arc::new(DictionaryFont::fallback()),
            font_name: None,
            font_size: 12.0,
            char_space: 0.0,
            word_space: 0.0,
            horizontal_scaling: 100.0,
            leading: 0.0,
            rise: 0.0,
            render_mode: TextRenderMode::Fill,
            matrix: Matrix::identity(),
            line_matrix: Matrix::identity(),
        }
    }
}

impl TextState {
    /// `Tz` as a factor.
    pub fn horizontal_scale(&self) -> f32 {
        self.horizontal_scaling / 100.0
    }

    /// Move the line origin by `(tx, ty)` in unscaled text space (`Td`).
    pub fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Matrix::translation(tx, ty).multiply(&self.line_matrix);
        self.matrix = self.line_matrix;
    }

    /// Advance the pen horizontally by `tx` text space units.
    pub fn advance(&mut self, tx: f32) {
        self.matrix = Matrix::translation(tx, 0.0).multiply(&self.matrix);
    }

    /// Reset both matrices (`BT`).
    pub fn begin(&mut self) {
        self.matrix = Matrix::identity();
        self.line_matrix = Matrix::identity();
    }
}

/// One shown glyph in the extracted-text index.
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    /// Character code from the shown string
    pub code: u32,
    /// Unicode text, possibly empty when the font has no mapping
    pub unicode: String,
    /// Page-space bounding box
    pub bbox: Rect,
}

/// Glyphs between word breaks.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextWord {
    /// Glyphs in show order
    pub glyphs: Vec<Glyph>,
}

impl TextWord {
    /// Concatenated Unicode text.
    pub fn text(&self) -> String {
        self.glyphs.iter().map(|g| g.unicode.as_str()).collect()
    }

    /// Union of glyph boxes.
    pub fn bbox(&self) -> Option<Rect> {
        union_all(self.glyphs.iter().map(|g| g.bbox))
    }
}

/// Words between line breaks.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextLine {
    /// Words in show order
    pub words: Vec<TextWord>,
}

impl TextLine {
    /// Words joined by single spaces.
    pub fn text(&self) -> String {
        self.words.iter().map(TextWord::text).collect::<Vec<_>>().join(" ")
    }

    /// Union of word boxes.
    pub fn bbox(&self) -> Option<Rect> {
        union_all(self.words.iter().filter_map(TextWord::bbox))
    }
}

fn union_all(rects: impl Iterator<Item = Rect>) -> Option<Rect> {
    rects.reduce(|acc, r| acc.union(&r))
}

/// Text extracted while interpreting: lines, words, glyphs.
#[derive(Debug, Clone, PartialEq)]
pub struct TextIndex {
    lines: Vec<TextLine>,
    line_open: bool,
    word_open: bool,
}

impl Default for TextIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl TextIndex {
    /// Empty index.
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            line_open: false,
            word_open: false,
        }
    }

    /// Start a new line before the next glyph.
    pub fn new_line(&mut self) {
        self.line_open = false;
        self.word_open = false;
    }

    /// Start a new word before the next glyph.
    pub fn break_word(&mut self) {
        self.word_open = false;
    }

    /// Record a glyph.
    pub fn push_glyph(&mut self, glyph: Glyph) {
        if !self.line_open || self.lines.is_empty() {
            self.lines.push(TextLine::default());
            self.line_open = true;
            self.word_open = false;
        }
        let Some(line) = self.lines.last_mut() else {
            return;
        };
        if !self.word_open || line.words.is_empty() {
            line.words.push(TextWord::default());
            self.word_open = true;
        }
        if let Some(word) = line.words.last_mut() {
            word.glyphs.push(glyph);
        }
    }

    /// Append another index, starting its content on a new line.
    pub fn append(&mut self, other: TextIndex) {
        if other.lines.is_empty() {
            return;
        }
        self.lines.extend(other.lines);
        self.line_open = false;
        self.word_open = false;
    }

    /// Lines in show order.
    pub fn lines(&self) -> &[TextLine] {
        &self.lines
    }

    /// Check if no glyph was recorded.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of glyphs recorded.
    pub fn glyph_count(&self) -> usize {
        self.lines
            .iter()
            .flat_map(|l| l.words.iter())
            .map(|w| w.glyphs.len())
            .sum()
    }

    /// All text, lines separated by newlines.
    pub fn text(&self) -> String {
        self.lines.iter().map(TextLine::text).collect::<Vec<_>>().join("\n")
    }

    pub(crate) fn shrink_to_fit(&mut self) {
        self.lines.shrink_to_fit();
    }
}
