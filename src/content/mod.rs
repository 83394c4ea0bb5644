//! PDF content stream parsing and execution.
//!
//! Content streams hold the operators that define a page's appearance.
//! [`ContentReader`] splits them into operations, [`Operator`] types them,
//! and [`ContentInterpreter`] executes them against a graphics state,
//! producing a [`ShapeProgram`] of paint commands plus extracted text.

pub mod color;
pub mod graphics_state;
pub mod interpreter;
pub mod operators;
pub mod parser;
pub mod path;
pub mod program;
pub mod resources;
pub mod text;

pub use color::{Color, ColorSpace, PatternPaint};
pub use graphics_state::{DashPattern, GraphicsState, GraphicsStateStack, LineCap, LineJoin, Matrix, StrokeStyle};
pub use interpreter::ContentInterpreter;
pub use operators::{Operator, TextElement};
pub use parser::{parse_content_stream, ContentReader, Operation};
pub use path::{ClipPath, Path, PathSegment, WindingRule};
pub use program::{ImagePaint, ShapeCommand, ShapeProgram, TextRun};
pub use resources::Resources;
pub use text::{Glyph, TextIndex, TextLine, TextRenderMode, TextState, TextWord};
