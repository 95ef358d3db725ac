//! Image input handling for image-to-3D submissions.
//!
//! The image is only needed while submitting to the provider. A plain URL
//! may be kept on the task as a reference; inline base64 payloads are
//! never persisted and never printed.

use std::fmt;

/// Prefix shared by every inline image data URI.
const DATA_URI_PREFIX: &str = "data:image/";

/// Separator between the data URI header and the base64 payload.
const BASE64_MARKER: &str = ";base64,";

/// An image supplied with a submission.
#[derive(Clone, PartialEq, Eq)]
pub enum ImageInput {
    /// A publicly reachable image URL.
    Url(String),
    /// Raw base64 image bytes (without any data URI header).
    Base64(String),
}

impl ImageInput {
    /// Interpret a caller-supplied image string.
    ///
    /// `data:image/<type>;base64,<payload>` becomes [`ImageInput::Base64`];
    /// anything else non-empty is treated as a URL.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Some(rest) = trimmed.strip_prefix(DATA_URI_PREFIX) {
            return rest
                .split_once(BASE64_MARKER)
                .map(|(_, payload)| payload)
                .filter(|payload| !payload.is_empty())
                .map(|payload| Self::Base64(payload.to_string()));
        }
        Some(Self::Url(trimmed.to_string()))
    }

    /// Resolve the image from the two optional request fields.
    ///
    /// `image_url` wins when both are present.
    pub fn from_fields(image_url: Option<&str>, image_base64: Option<&str>) -> Option<Self> {
        image_url.and_then(Self::parse).or_else(|| {
            image_base64
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Self::Base64(s.to_string()))
        })
    }

    /// The value that may be stored on the task record, if any.
    pub fn persisted_reference(&self) -> Option<&str> {
        match self {
            Self::Url(url) => Some(url),
            Self::Base64(_) => None,
        }
    }

    /// Render as something a URL-only provider accepts.
    ///
    /// Base64 payloads are wrapped in a PNG data URI.
    pub fn to_url_or_data_uri(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::Base64(data) => format!("data:image/png;base64,{data}"),
        }
    }
}

impl fmt::Debug for ImageInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Self::Base64(data) => write!(f, "Base64(<{} bytes>)", data.len()),
        }
    }
}
