//! Multimodal context for page images.
//!
//! [`ImageContextBuilder`] validates a page's images, fetching remote ones,
//! and appends the usable ones to a session as a single user message. Images
//! that fail validation are skipped; they never fail the caller.

mod fetch;
mod source;

use std::sync::Arc;
use std::time::Duration;

use distill_models::ModelSession;
use distill_models::providers::{ContentPart, Message};
use tracing::{debug, warn};

use crate::config::ImageConfig;
use crate::error::ImageError;
use crate::page::{PageContent, PageImage};

pub use fetch::{FetchedImage, HttpImageFetcher, ImageFetcher};
pub use source::{ImageSource, ValidImage, parse_data_url, supported_media_type};

/// Page images examined per image slot; bounds the work spent on pages whose
/// images mostly fail validation.
const CANDIDATES_PER_IMAGE: usize = 2;

/// Attaches page images to model sessions.
pub struct ImageContextBuilder {
    fetcher: Arc<dyn ImageFetcher>,
    max_images: usize,
}

impl ImageContextBuilder {
    pub fn new(fetcher: Arc<dyn ImageFetcher>, max_images: usize) -> Self {
        Self {
            fetcher,
            max_images,
        }
    }

    /// Builder with the HTTP fetcher and limits from `config`.
    pub fn from_config(config: &ImageConfig) -> Result<Self, ImageError> {
        let fetcher = HttpImageFetcher::new(
            Duration::from_secs(config.fetch_timeout_secs),
            config.max_bytes,
        )?;
        Ok(Self::new(Arc::new(fetcher), config.max_images))
    }

    pub fn max_images(&self) -> usize {
        self.max_images
    }

    /// Resolve one page image into a validated payload.
    pub async fn load(&self, image: &PageImage) -> Result<ValidImage, ImageError> {
        match ImageSource::parse(&image.src)? {
            ImageSource::Inline(valid) => Ok(valid),
            ImageSource::Remote(url) => self.fetcher.fetch(&url).await?.into_valid(),
        }
    }

    /// Validate the page's images in order until the cap is reached.
    ///
    /// At most twice `max_images` candidates are examined.
    pub async fn collect(&self, page: &PageContent) -> Vec<ValidImage> {
        let candidates = self.max_images.saturating_mul(CANDIDATES_PER_IMAGE);
        if page.images.len() > candidates {
            debug!(
                url = %page.url,
                images = page.images.len(),
                candidates,
                "Ignoring page images past the candidate limit"
            );
        }

        let mut valid = Vec::with_capacity(self.max_images.min(page.images.len()));
        for image in page.images.iter().take(candidates) {
            if valid.len() >= self.max_images {
                break;
            }
            match self.load(image).await {
                Ok(image) => valid.push(image),
                Err(e) => debug!(src = %abbreviate(&image.src), error = %e, "Skipping page image"),
            }
        }
        valid
    }

    /// Append the page's usable images to `session`.
    ///
    /// Returns how many images were attached; zero means nothing was appended.
    pub async fn attach(&self, session: &mut dyn ModelSession, page: &PageContent) -> usize {
        let images = self.collect(page).await;
        if images.is_empty() {
            debug!(url = %page.url, "No usable page images");
            return 0;
        }

        let count = images.len();
        let noun = if count == 1 { "image" } else { "images" };
        let mut parts = Vec::with_capacity(count + 1);
        parts.push(ContentPart::text(format!(
            "The page \"{}\" contains the following {count} {noun}. \
             Use them as additional context.",
            page.title
        )));
        parts.extend(images.iter().map(ValidImage::to_part));

        match session.append(vec![Message::user(parts)]).await {
            Ok(()) => {
                debug!(url = %page.url, count, "Attached page images");
                count
            }
            Err(e) => {
                warn!(url = %page.url, error = %e, "Failed to attach page images");
                0
            }
        }
    }
}

/// Data URLs are long; keep log lines readable.
fn abbreviate(src: &str) -> &str {
    match src.char_indices().nth(80) {
        Some((end, _)) => &src[..end],
        None => src,
    }
}
