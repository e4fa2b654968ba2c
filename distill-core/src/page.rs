//! Page content flowing through the capture pipeline.
//!
//! JSON field names are camelCase so extraction output can be deserialized
//! directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Flexible key/value data extracted alongside a summary.
pub type StructuredData = serde_json::Map<String, serde_json::Value>;

/// Kind of page, either assigned by a specialized extractor or classified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Generic,
    Article,
    News,
    Documentation,
    Product,
    Recipe,
    Video,
    Forum,
    Arxiv,
    Github,
    Wikipedia,
}

impl ContentType {
    /// Every content type, generic first.
    pub const ALL: [ContentType; 11] = [
        ContentType::Generic,
        ContentType::Article,
        ContentType::News,
        ContentType::Documentation,
        ContentType::Product,
        ContentType::Recipe,
        ContentType::Video,
        ContentType::Forum,
        ContentType::Arxiv,
        ContentType::Github,
        ContentType::Wikipedia,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Generic => "generic",
            ContentType::Article => "article",
            ContentType::News => "news",
            ContentType::Documentation => "documentation",
            ContentType::Product => "product",
            ContentType::Recipe => "recipe",
            ContentType::Video => "video",
            ContentType::Forum => "forum",
            ContentType::Arxiv => "arxiv",
            ContentType::Github => "github",
            ContentType::Wikipedia => "wikipedia",
        }
    }

    pub fn is_generic(self) -> bool {
        self == ContentType::Generic
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive metadata attached by the extractor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Open-ended annotations (e.g. `originalLanguage`).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: StructuredData,
}

/// An image referenced by the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageImage {
    /// `data:`, `http(s):` or `blob:` URL.
    #[serde(alias = "url")]
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}

impl PageImage {
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            alt: None,
        }
    }
}

/// A hyperlink found on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLink {
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

fn default_extractor() -> String {
    "unknown".to_string()
}

/// Extraction result for one page.
///
/// Stages never modify a page in place; each returns a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContent {
    pub title: String,
    pub url: String,
    pub full_text: String,
    #[serde(default)]
    pub metadata: PageMetadata,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<PageImage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<PageLink>,
    /// Which extraction strategy produced this page.
    #[serde(default = "default_extractor")]
    pub extractor: String,
}

impl PageContent {
    /// Create a generic page with no metadata.
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        full_text: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            full_text: full_text.into(),
            metadata: PageMetadata::default(),
            images: Vec::new(),
            links: Vec::new(),
            extractor: default_extractor(),
        }
    }

    pub fn description(&self) -> Option<&str> {
        self.metadata.description.as_deref()
    }

    pub fn content_type(&self) -> ContentType {
        self.metadata.content_type
    }
}

/// Page text reduced to fit the model's context budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CondensedPageContent {
    pub title: String,
    pub url: String,
    pub content_type: ContentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub text: String,
    /// Characters in the text before condensation.
    pub source_chars: usize,
    /// Chunks processed by the model; 0 when the text already fit.
    pub chunks: usize,
}

/// Summary plus structured data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub summary: String,
    #[serde(default)]
    pub structured_data: StructuredData,
}

/// A refinement turn: the model's conversational reply and the updated output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    #[serde(flatten)]
    pub response: SummaryResponse,
}

/// Terminal artifact of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResult {
    pub processed_page_content: PageContent,
    pub condensed_content: CondensedPageContent,
    pub summary: String,
    pub structured_data: StructuredData,
    pub captured_at: DateTime<Utc>,
}

impl CaptureResult {
    /// The summary and structured data as a standalone response.
    pub fn summary_response(&self) -> SummaryResponse {
        SummaryResponse {
            summary: self.summary.clone(),
            structured_data: self.structured_data.clone(),
        }
    }

    /// Replace summary and structured data with a refined version.
    pub fn apply(&mut self, response: SummaryResponse) {
        self.summary = response.summary;
        self.structured_data = response.structured_data;
    }
}
