//! Progress notifications for a capture run.

/// Receives progress from a capture run. Every method defaults to a no-op.
pub trait CaptureCallbacks: Send + Sync {
    /// Condensation progress as (current chunk, total chunks).
    fn on_condense_progress(&self, _current: usize, _total: usize) {}

    /// Summarization progress: (0, 1) when the call starts, (1, 1) when it ends.
    fn on_summarize_progress(&self, _current: usize, _total: usize) {}

    /// Translation from `_language` is starting.
    fn on_translation_start(&self, _language: &str) {}

    fn on_translation_complete(&self) {}

    /// Translation failed; the page continues untranslated.
    fn on_translation_error(&self, _error: &str) {}
}

/// Ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallbacks;

impl CaptureCallbacks for NoopCallbacks {}
