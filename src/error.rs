//! Error types for the engine.
//!
//! Most malformed input is recovered from where it is found and only logged.
//! The variants here describe what a component hands back when it cannot
//! recover locally; see each module for which of them actually escape.

use crate::content::program::ShapeProgram;
use crate::object::ObjectRef;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while resolving objects or interpreting content.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Parse error at specific byte offset
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where error occurred
        offset: usize,
        /// Reason for parse failure
        reason: String,
    },

    /// Invalid cross-reference table
    #[error("Invalid cross-reference table")]
    InvalidXref,

    /// Referenced object not found in cross-reference chain
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Object has wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// Unexpected end of input
    #[error("End of file reached unexpectedly")]
    UnexpectedEof,

    /// IO error from the underlying byte source
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid PDF structure (generic)
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Unsupported stream filter
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Font collaborator error
    #[error("Font error: {0}")]
    Font(String),

    /// Image decode error
    #[error("Image error: {0}")]
    Image(String),

    /// Operator received missing or mistyped operands
    #[error("Invalid operands for '{operator}': {reason}")]
    InvalidOperands {
        /// Operator keyword
        operator: String,
        /// What was wrong
        reason: String,
    },

    /// Circular reference detected in object graph
    #[error("Circular reference detected: object {0}")]
    CircularReference(ObjectRef),

    /// Recursion depth limit exceeded
    #[error("Recursion depth limit exceeded (max: {0})")]
    RecursionLimitExceeded(u32),

    /// Interpretation was cancelled; carries the program built so far.
    #[error("Interpretation interrupted after {} paint commands", .0.commands.len())]
    Interrupted(Box<ShapeProgram>),
}

impl Error {
    /// True for errors caused by the byte source rather than its content.
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_))
    }

    /// True when this is a cancellation outcome.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::Interrupted(_))
    }
}
