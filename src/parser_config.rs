//! Limits and leniency for object resolution.
//!
//! These options trade strict PDF compliance for broader compatibility with
//! malformed files, and bound the work any single malformed structure can
//! cause.
//!
//! # Example
//!
//! ```
//! use pdf_engine::parser_config::ParserOptions;
//!
//! // Strict mode - no recovery heuristics
//! let strict = ParserOptions::strict();
//! assert!(!strict.allow_reconstruction);
//!
//! // Custom configuration
//! let custom = ParserOptions {
//!     max_xref_chain_length: 16,
//!     ..ParserOptions::lenient()
//! };
//! assert_eq!(custom.max_xref_chain_length, 16);
//! ```

/// Parser options for controlling error recovery and resource limits.
#[derive(Debug, Clone, Copy)]
pub struct ParserOptions {
    /// Enforce syntax rules instead of recovering from violations.
    pub strict: bool,

    /// Maximum array/dictionary nesting depth.
    ///
    /// Prevents stack overflow from deeply nested arrays or dictionaries
    /// in hostile files. ISO 32000-1 Annex C suggests 100 levels.
    pub max_nesting: usize,

    /// Maximum decompression ratio (decompressed:compressed), 0 disables.
    pub max_decompression_ratio: u32,

    /// Maximum decompressed stream size in bytes, 0 disables.
    pub max_decompressed_size: usize,

    /// Maximum length of a reference chain followed by `ObjectStore::resolve`.
    pub max_recursion_depth: u32,

    /// Maximum number of cross-reference sections visited for one lookup.
    pub max_xref_chain_length: usize,

    /// Largest entry count accepted for one cross-reference subsection.
    pub max_subsection_count: u32,

    /// Bytes searched backwards for an `N G obj` header when a recorded
    /// offset does not point at one. 0 disables the search.
    pub header_search_window: usize,

    /// Scan the whole file for object headers when no usable
    /// cross-reference section is found.
    pub allow_reconstruction: bool,
}

impl Default for ParserOptions {
    /// Default configuration: lenient mode
    fn default() -> Self {
        Self::lenient()
    }
}

impl ParserOptions {
    /// Strict mode: no recovery heuristics.
    ///
    /// Use this for validating files or when parsing trusted input.
    pub fn strict() -> Self {
        Self {
            strict: true,
            max_nesting: 100,
            max_decompression_ratio: 100,
            max_decompressed_size: 100 * 1024 * 1024, // 100 MB
            max_recursion_depth: 32,
            max_xref_chain_length: 64,
            max_subsection_count: 1_000_000,
            header_search_window: 0,
            allow_reconstruction: false,
        }
    }

    /// Lenient mode: recover from common producer mistakes.
    pub fn lenient() -> Self {
        Self {
            strict: false,
            max_nesting: 100,
            max_decompression_ratio: 100,
            max_decompressed_size: 100 * 1024 * 1024, // 100 MB
            max_recursion_depth: 32,
            max_xref_chain_length: 100,
            max_subsection_count: 1_000_000,
            header_search_window: 64,
            allow_reconstruction: true,
        }
    }

    /// Very lenient mode: maximum compatibility
    ///
    /// Use this for extracting data from heavily damaged files.
    pub fn very_lenient() -> Self {
        Self {
            strict: false,
            max_nesting: 200,
            max_decompression_ratio: 200,
            max_decompressed_size: 200 * 1024 * 1024, // 200 MB
            max_recursion_depth: 64,
            max_xref_chain_length: 256,
            max_subsection_count: 4_000_000,
            header_search_window: 1024,
            allow_reconstruction: true,
        }
    }
}
