//! Fetching remote page images.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use super::source::{ValidImage, supported_media_type};
use crate::error::ImageError;

/// Raw response for a fetched image.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedImage {
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FetchedImage {
    /// Validate status, `Content-Type` and payload.
    pub fn into_valid(self) -> Result<ValidImage, ImageError> {
        if !(200..300).contains(&self.status) {
            return Err(ImageError::NetworkFetch(format!(
                "unexpected status {}",
                self.status
            )));
        }
        let content_type = self
            .content_type
            .ok_or_else(|| ImageError::Validation("missing content type".to_string()))?;
        ValidImage::new(&content_type, self.bytes)
    }
}

/// Retrieves the bytes behind an image URL.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchedImage, ImageError>;
}

/// HTTP(S) fetcher backed by reqwest.
///
/// Status and `Content-Type` are checked before any of the body is read, and
/// bodies longer than `max_bytes` are abandoned.
///
/// `blob:` references only resolve inside the page that created them, so a
/// host that can read them must supply its own [`ImageFetcher`].
pub struct HttpImageFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration, max_bytes: u64) -> Result<Self, ImageError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, max_bytes })
    }
}

/// Reject a response from its headers alone.
fn check_head(
    status: u16,
    content_type: Option<&str>,
    content_length: Option<u64>,
    max_bytes: u64,
) -> Result<(), ImageError> {
    if !(200..300).contains(&status) {
        return Err(ImageError::NetworkFetch(format!("unexpected status {status}")));
    }
    let content_type =
        content_type.ok_or_else(|| ImageError::Validation("missing content type".to_string()))?;
    if supported_media_type(content_type).is_none() {
        return Err(ImageError::Validation(format!(
            "unsupported content type {content_type}"
        )));
    }
    if let Some(length) = content_length
        && length > max_bytes
    {
        return Err(too_large(max_bytes));
    }
    Ok(())
}

fn too_large(max_bytes: u64) -> ImageError {
    ImageError::Validation(format!("image larger than {max_bytes} bytes"))
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedImage, ImageError> {
        if url.scheme() == "blob" {
            return Err(ImageError::NetworkFetch(format!(
                "cannot resolve {url} outside its page"
            )));
        }

        let mut response = self.client.get(url.clone()).send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        check_head(
            status,
            content_type.as_deref(),
            response.content_length(),
            self.max_bytes,
        )?;

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if (bytes.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(too_large(self.max_bytes));
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(FetchedImage {
            status,
            content_type,
            bytes,
        })
    }
}
