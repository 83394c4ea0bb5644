//! Graphics state management for content stream execution.
//!
//! This module provides the graphics state machine that tracks transformations,
//! colours, stroke parameters, clipping and text state as operators are executed.

use crate::content::color::Color;
use crate::content::path::ClipPath;
use crate::content::text::TextState;
use crate::geometry::{Point, Rect};

/// A 2D transformation matrix.
///
/// PDF uses matrices of the form:
/// ```text
/// [ a  b  0 ]
/// [ c  d  0 ]
/// [ e  f  1 ]
/// ```
///
/// Where (a,b,c,d) define scaling/rotation/skewing and (e,f) define translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    /// Horizontal scaling component
    pub a: f32,
    /// Rotation/skew component
    pub b: f32,
    /// Rotation/skew component
    pub c: f32,
    /// Vertical scaling component
    pub d: f32,
    /// Horizontal translation
    pub e: f32,
    /// Vertical translation
    pub f: f32,
}

impl Matrix {
    /// Create an identity matrix.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdf_engine::content::Matrix;
    ///
    /// let m = Matrix::identity();
    /// assert_eq!(m.a, 1.0);
    /// assert_eq!(m.d, 1.0);
    /// assert_eq!(m.e, 0.0);
    /// assert_eq!(m.f, 0.0);
    /// ```
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0)
    }

    /// Create a matrix from its six components.
    pub fn new(a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// Create a translation matrix.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdf_engine::content::Matrix;
    ///
    /// let m = Matrix::translation(10.0, 20.0);
    /// assert_eq!(m.e, 10.0);
    /// assert_eq!(m.f, 20.0);
    /// ```
    pub fn translation(tx: f32, ty: f32) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    /// Create a scaling matrix.
    pub fn scaling(sx: f32, sy: f32) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    /// Matrix from a `[a b c d e f]` array of numbers.
    pub fn from_slice(values: &[f32]) -> Option<Self> {
        match values {
            [a, b, c, d, e, f] => Some(Self::new(*a, *b, *c, *d, *e, *f)),
            _ => None,
        }
    }

    /// Multiply this matrix with another matrix.
    ///
    /// Matrix multiplication is not commutative. The result applies `self`
    /// first and `other` second, so concatenating `cm` onto a CTM is
    /// `cm.multiply(&ctm)`.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdf_engine::content::Matrix;
    ///
    /// let m = Matrix::translation(10.0, 0.0).multiply(&Matrix::scaling(2.0, 2.0));
    /// let p = m.transform_point(5.0, 5.0);
    /// assert_eq!((p.x, p.y), (30.0, 10.0));
    /// ```
    pub fn multiply(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    /// Transform a point using this matrix.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdf_engine::content::Matrix;
    ///
    /// let m = Matrix::translation(10.0, 20.0);
    /// let p = m.transform_point(5.0, 10.0);
    /// assert_eq!(p.x, 15.0);
    /// assert_eq!(p.y, 30.0);
    /// ```
    pub fn transform_point(&self, x: f32, y: f32) -> Point {
        Point {
            x: self.a * x + self.c * y + self.e,
            y: self.b * x + self.d * y + self.f,
        }
    }

    /// Bounding box of a transformed rectangle.
    pub fn transform_rect(&self, rect: &Rect) -> Rect {
        let corners = rect.corners().map(|p| self.transform_point(p.x, p.y));
        Rect::bounding(corners).unwrap_or_default()
    }

    /// Get the determinant of this matrix.
    pub fn determinant(&self) -> f32 {
        self.a * self.d - self.b * self.c
    }

    /// Check if this matrix is invertible.
    pub fn is_invertible(&self) -> bool {
        self.determinant().abs() > f32::EPSILON
    }

    /// The inverse transform, `None` for a degenerate matrix.
    pub fn inverse(&self) -> Option<Matrix> {
        if !self.is_invertible() {
            return None;
        }
        let det = self.determinant();
        let a = self.d / det;
        let b = -self.b / det;
        let c = -self.c / det;
        let d = self.a / det;
        Some(Matrix {
            a,
            b,
            c,
            d,
            e: -(self.e * a + self.f * c),
            f: -(self.e * b + self.f * d),
        })
    }

    /// Average linear scale, `sqrt(|det|)`.
    pub fn scale_factor(&self) -> f32 {
        self.determinant().abs().sqrt()
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::identity()
    }
}

/// Line cap style (`J`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineCap {
    /// Butt cap (0)
    #[default]
    Butt,
    /// Round cap (1)
    Round,
    /// Projecting square cap (2)
    Square,
}

impl LineCap {
    /// Cap style from its operand value.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(LineCap::Butt),
            1 => Some(LineCap::Round),
            2 => Some(LineCap::Square),
            _ => None,
        }
    }
}

/// Line join style (`j`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineJoin {
    /// Miter join (0)
    #[default]
    Miter,
    /// Round join (1)
    Round,
    /// Bevel join (2)
    Bevel,
}

impl LineJoin {
    /// Join style from its operand value.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(LineJoin::Miter),
            1 => Some(LineJoin::Round),
            2 => Some(LineJoin::Bevel),
            _ => None,
        }
    }
}

/// Line dash pattern (`d`). An empty array is a solid line.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DashPattern {
    /// On/off lengths
    pub array: Vec<f32>,
    /// Offset into the pattern
    pub phase: f32,
}

impl DashPattern {
    /// Check if the pattern is a solid line.
    pub fn is_solid(&self) -> bool {
        self.array.is_empty() || self.array.iter().all(|&len| len == 0.0)
    }
}

/// Stroke parameters captured with every stroke command.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeStyle {
    /// Line width (`w`)
    pub width: f32,
    /// Line cap (`J`)
    pub cap: LineCap,
    /// Line join (`j`)
    pub join: LineJoin,
    /// Miter limit (`M`)
    pub miter_limit: f32,
    /// Dash pattern (`d`)
    pub dash: DashPattern,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            width: 1.0,
            cap: LineCap::Butt,
            join: LineJoin::Miter,
            miter_limit: 10.0,
            dash: DashPattern::default(),
        }
    }
}

/// Graphics state parameters.
///
/// Tracks all parameters that affect how content is painted, including
/// transformations, colours, line styles, clipping and text state.
#[derive(Debug, Clone)]
pub struct GraphicsState {
    /// Current transformation matrix (maps user space to page space)
    pub ctm: Matrix,
    /// Fill colour and its space
    pub fill: Color,
    /// Stroke colour and its space
    pub stroke: Color,
    /// Line parameters
    pub stroke_style: StrokeStyle,
    /// Rendering intent (`ri`, `/RI`)
    pub rendering_intent: String,
    /// Flatness tolerance (`i`)
    pub flatness: f32,
    /// Fill alpha (`/ca`)
    pub fill_alpha: f32,
    /// Stroke alpha (`/CA`)
    pub stroke_alpha: f32,
    /// Fill overprint (`/op`)
    pub fill_overprint: bool,
    /// Stroke overprint (`/OP`)
    pub stroke_overprint: bool,
    /// Blend mode (`/BM`)
    pub blend_mode: String,
    /// Active clip, the intersection of every entry, in page space
    pub clip: Vec<ClipPath>,
    /// Text parameters
    pub text: TextState,
}

impl GraphicsState {
    /// Create a new graphics state with default values.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdf_engine::content::GraphicsState;
    ///
    /// let state = GraphicsState::new();
    /// assert_eq!(state.stroke_style.width, 1.0);
    /// assert_eq!(state.text.horizontal_scaling, 100.0);
    /// ```
    pub fn new() -> Self {
        Self {
            ctm: Matrix::identity(),
            fill: Color::black(),
            stroke: Color::black(),
            stroke_style: StrokeStyle::default(),
            rendering_intent: "RelativeColorimetric".to_string(),
            flatness: 1.0,
            fill_alpha: 1.0,
            stroke_alpha: 1.0,
            fill_overprint: false,
            stroke_overprint: false,
            blend_mode: "Normal".to_string(),
            clip: Vec::new(),
            text: TextState::default(),
        }
    }

    /// Graphics state whose CTM is `ctm`.
    pub fn with_ctm(ctm: Matrix) -> Self {
        Self {
            ctm,
            ..Self::new()
        }
    }

    /// Intersect the clip with `path`.
    pub fn push_clip(&mut self, clip: ClipPath) {
        self.clip.push(clip);
    }

    /// Bounding box of the active clip, `None` when unclipped.
    pub fn clip_bounds(&self) -> Option<Rect> {
        let mut bounds: Option<Rect> = None;
        for clip in &self.clip {
            let Some(rect) = clip.path.bounds() else {
                return Some(Rect::default());
            };
            bounds = Some(match bounds {
                Some(current) => current.intersection(&rect).unwrap_or_default(),
                None => rect,
            });
        }
        bounds
    }
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self::new()
    }
}

/// Stack of graphics states for save/restore operations.
///
/// `q` pushes a copy of the current state and `Q` returns to it. Restoring
/// with nothing saved resets the current state to the defaults.
#[derive(Debug, Clone, Default)]
pub struct GraphicsStateStack {
    current: GraphicsState,
    saved: Vec<GraphicsState>,
}

impl GraphicsStateStack {
    /// Create a new graphics state stack with a default state.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdf_engine::content::GraphicsStateStack;
    ///
    /// let stack = GraphicsStateStack::new();
    /// assert_eq!(stack.depth(), 1);
    /// ```
    pub fn new() -> Self {
        Self::with_state(GraphicsState::new())
    }

    /// Stack whose current state is `state`.
    pub fn with_state(state: GraphicsState) -> Self {
        Self {
            current: state,
            saved: Vec::new(),
        }
    }

    /// Get a reference to the current graphics state.
    pub fn current(&self) -> &GraphicsState {
        &self.current
    }

    /// Get a mutable reference to the current graphics state.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdf_engine::content::GraphicsStateStack;
    ///
    /// let mut stack = GraphicsStateStack::new();
    /// stack.current_mut().stroke_style.width = 4.0;
    /// assert_eq!(stack.current().stroke_style.width, 4.0);
    /// ```
    pub fn current_mut(&mut self) -> &mut GraphicsState {
        &mut self.current
    }

    /// Save the current graphics state (`q`).
    pub fn save(&mut self) {
        self.saved.push(self.current.clone());
    }

    /// Restore the previous graphics state (`Q`).
    ///
    /// Returns `false` when nothing was saved; the current state is then
    /// replaced by a default one.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdf_engine::content::GraphicsStateStack;
    ///
    /// let mut stack = GraphicsStateStack::new();
    /// stack.save();
    /// assert!(stack.restore());
    /// assert!(!stack.restore());
    /// assert_eq!(stack.depth(), 1);
    /// ```
    pub fn restore(&mut self) -> bool {
        match self.saved.pop() {
            Some(state) => {
                self.current = state;
                true
            },
            None => {
                self.current = GraphicsState::new();
                false
            },
        }
    }

    /// Number of states, the current one included.
    pub fn depth(&self) -> usize {
        self.saved.len() + 1
    }

    /// Consume the stack, returning the current state.
    pub fn into_current(self) -> GraphicsState {
        self.current
    }
}
