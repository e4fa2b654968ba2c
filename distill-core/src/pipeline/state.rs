//! Capture state machine.

use std::fmt;

use distill_models::SessionHandle;

use crate::page::{CaptureResult, CondensedPageContent, PageContent};

/// Stage names, for logging and progress display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStage {
    Start,
    LanguageNormalize,
    Classify,
    Condense,
    ResetForSummarize,
    AttachImageContext,
    Summarize,
    Done,
}

impl CaptureStage {
    pub fn as_str(self) -> &'static str {
        match self {
            CaptureStage::Start => "start",
            CaptureStage::LanguageNormalize => "language_normalize",
            CaptureStage::Classify => "classify",
            CaptureStage::Condense => "condense",
            CaptureStage::ResetForSummarize => "reset_for_summarize",
            CaptureStage::AttachImageContext => "attach_image_context",
            CaptureStage::Summarize => "summarize",
            CaptureStage::Done => "done",
        }
    }
}

impl fmt::Display for CaptureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A capture run between stages, carrying what the next stage needs.
///
/// From `LanguageNormalize` on, the state owns the run's session.
pub enum CaptureState {
    Start {
        page: PageContent,
    },
    LanguageNormalize {
        page: PageContent,
        session: SessionHandle,
    },
    Classify {
        page: PageContent,
        session: SessionHandle,
    },
    Condense {
        page: PageContent,
        session: SessionHandle,
    },
    ResetForSummarize {
        page: PageContent,
        condensed: CondensedPageContent,
        session: SessionHandle,
    },
    AttachImageContext {
        page: PageContent,
        condensed: CondensedPageContent,
        session: SessionHandle,
    },
    Summarize {
        page: PageContent,
        condensed: CondensedPageContent,
        session: SessionHandle,
        image_count: usize,
    },
    Done(Box<CaptureResult>),
}

impl CaptureState {
    /// Initial state for `page`.
    pub fn start(page: PageContent) -> Self {
        CaptureState::Start { page }
    }

    pub fn stage(&self) -> CaptureStage {
        match self {
            CaptureState::Start { .. } => CaptureStage::Start,
            CaptureState::LanguageNormalize { .. } => CaptureStage::LanguageNormalize,
            CaptureState::Classify { .. } => CaptureStage::Classify,
            CaptureState::Condense { .. } => CaptureStage::Condense,
            CaptureState::ResetForSummarize { .. } => CaptureStage::ResetForSummarize,
            CaptureState::AttachImageContext { .. } => CaptureStage::AttachImageContext,
            CaptureState::Summarize { .. } => CaptureStage::Summarize,
            CaptureState::Done(_) => CaptureStage::Done,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, CaptureState::Done(_))
    }

    /// The current page, whichever stage the run is in.
    pub fn page(&self) -> &PageContent {
        match self {
            CaptureState::Start { page }
            | CaptureState::LanguageNormalize { page, .. }
            | CaptureState::Classify { page, .. }
            | CaptureState::Condense { page, .. }
            | CaptureState::ResetForSummarize { page, .. }
            | CaptureState::AttachImageContext { page, .. }
            | CaptureState::Summarize { page, .. } => page,
            CaptureState::Done(result) => &result.processed_page_content,
        }
    }
}

impl fmt::Debug for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureState")
            .field("stage", &self.stage())
            .field("url", &self.page().url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_state_reports_stage_and_page() {
        let state = CaptureState::start(PageContent::new("t", "https://example.com", "x"));
        assert_eq!(state.stage(), CaptureStage::Start);
        assert_eq!(state.page().url, "https://example.com");
        assert!(!state.is_done());
        assert_eq!(
            format!("{state:?}"),
            "CaptureState { stage: Start, url: \"https://example.com\" }"
        );
    }
}
