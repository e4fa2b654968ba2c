//! Image source parsing and MIME validation.
//!
//! Formats are decided by MIME type only: the data-URL header for inline
//! images, the `Content-Type` header for fetched ones. File extensions are
//! never consulted.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use distill_models::providers::ContentPart;
use url::Url;

use crate::error::ImageError;

/// Canonical media type for a supported image MIME, or `None`.
///
/// Parameters (`; charset=...`) and case are ignored.
pub fn supported_media_type(mime: &str) -> Option<&'static str> {
    let essence = mime.split(';').next().unwrap_or_default().trim();
    if essence.eq_ignore_ascii_case("image/png") {
        Some("image/png")
    } else if essence.eq_ignore_ascii_case("image/jpeg") || essence.eq_ignore_ascii_case("image/jpg")
    {
        Some("image/jpeg")
    } else {
        None
    }
}

/// A validated image ready to attach.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidImage {
    pub media_type: &'static str,
    pub bytes: Vec<u8>,
}

impl ValidImage {
    /// Check a MIME and payload pair.
    pub fn new(mime: &str, bytes: Vec<u8>) -> Result<Self, ImageError> {
        let media_type = supported_media_type(mime)
            .ok_or_else(|| ImageError::Validation(format!("unsupported image type {mime}")))?;
        if bytes.is_empty() {
            return Err(ImageError::Validation("empty image payload".to_string()));
        }
        Ok(Self { media_type, bytes })
    }

    /// Base64 content part for a session message.
    pub fn to_part(&self) -> ContentPart {
        ContentPart::image(STANDARD.encode(&self.bytes), self.media_type)
    }
}

/// Where an image comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    /// Already decoded from a `data:` URL.
    Inline(ValidImage),
    /// `http`, `https` or `blob` reference that must be fetched.
    Remote(Url),
}

impl ImageSource {
    /// Classify and, for data URLs, validate an image `src`.
    pub fn parse(src: &str) -> Result<Self, ImageError> {
        let src = src.trim();
        if src
            .get(..5)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
        {
            return parse_data_url(src).map(ImageSource::Inline);
        }

        let url = Url::parse(src)
            .map_err(|e| ImageError::Validation(format!("unparsable image URL: {e}")))?;
        match url.scheme() {
            "http" | "https" | "blob" => Ok(ImageSource::Remote(url)),
            other => Err(ImageError::Validation(format!(
                "unsupported URL scheme {other}"
            ))),
        }
    }
}

/// Decode `data:<mime>[;params][;base64],<payload>`.
pub fn parse_data_url(src: &str) -> Result<ValidImage, ImageError> {
    let parts: Vec<&str> = src.split(',').collect();
    let [header, payload] = parts.as_slice() else {
        return Err(ImageError::Validation(format!(
            "data URL must have exactly one payload segment, found {}",
            parts.len().saturating_sub(1)
        )));
    };

    let mime = header
        .get(5..)
        .and_then(|rest| rest.split(';').next())
        .map(str::trim)
        .filter(|mime| !mime.is_empty())
        .ok_or_else(|| ImageError::Validation("data URL has no MIME type".to_string()))?;

    if supported_media_type(mime).is_none() {
        return Err(ImageError::Validation(format!(
            "unsupported image type {mime}"
        )));
    }

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| ImageError::Validation(format!("undecodable data URL payload: {e}")))?;
    ValidImage::new(mime, bytes)
}
