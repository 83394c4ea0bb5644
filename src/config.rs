//! Configuration for content interpretation.

/// Interpreter and image-dispatch options.
///
/// Passed explicitly into [`ContentInterpreter`](crate::content::ContentInterpreter)
/// and [`ImageDispatcher`](crate::images::ImageDispatcher); the only process-wide
/// values are the ones produced by `Default`.
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// Maximum nesting of Form XObjects invoked through `Do`.
    pub max_form_depth: usize,

    /// Decode image samples through the dispatcher (false keeps only placement).
    pub decode_images: bool,

    /// Try the second registered image decoder before the first.
    pub prefer_alternate_decoder: bool,

    /// Height/width ratio used to synthesize a page box when none is declared.
    pub page_fallback_aspect_ratio: f64,

    /// TJ adjustment (thousandths of text space) treated as a word break.
    pub word_break_threshold: f32,

    /// Stop after this many operators, 0 = unlimited.
    pub max_operations: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl InterpreterConfig {
    /// Create new configuration with defaults.
    pub fn new() -> Self {
        Self {
            max_form_depth: 12,
            decode_images: true,
            prefer_alternate_decoder: false,
            page_fallback_aspect_ratio: 11.0 / 8.5,
            word_break_threshold: 150.0,
            max_operations: 0,
        }
    }

    /// Set the Form XObject nesting limit.
    pub fn with_max_form_depth(mut self, depth: usize) -> Self {
        self.max_form_depth = depth;
        self
    }

    /// Enable or disable image sample decoding.
    pub fn with_decode_images(mut self, enable: bool) -> Self {
        self.decode_images = enable;
        self
    }

    /// Prefer the alternate image decoder.
    pub fn with_prefer_alternate_decoder(mut self, enable: bool) -> Self {
        self.prefer_alternate_decoder = enable;
        self
    }

    /// Set the fallback page aspect ratio.
    pub fn with_page_fallback_aspect_ratio(mut self, ratio: f64) -> Self {
        self.page_fallback_aspect_ratio = ratio;
        self
    }

    /// Set the TJ word-break threshold.
    pub fn with_word_break_threshold(mut self, threshold: f32) -> Self {
        self.word_break_threshold = threshold;
        self
    }

    /// Set the operator budget.
    pub fn with_max_operations(mut self, limit: usize) -> Self {
        self.max_operations = limit;
        self
    }
}
