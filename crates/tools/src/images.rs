//! Post image loading for the `get_images` tool.
//!
//! Images are fetched one by one. A failed fetch or an unrecognized payload
//! drops that image only.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use calsync_core::error::ToolError;
use calsync_core::message::ContentPart;
use calsync_core::tool::ToolOutput;
use tracing::{debug, warn};

/// Fetches raw image bytes by URL.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ToolError>;
}

/// Fetches images over HTTP with `reqwest`, following redirects.
pub struct HttpImageFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpImageFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ToolError> {
        let fetch_err = |reason: String| ToolError::ImageFetch {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_err(format!("HTTP {}", status.as_u16())));
        }

        let bytes = response.bytes().await.map_err(|e| fetch_err(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Media type from the payload's magic bytes, if it is a supported image.
pub fn sniff_media_type(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if data.starts_with(b"\xff\xd8\xff") {
        Some("image/jpeg")
    } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        Some("image/webp")
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        Some("image/gif")
    } else {
        None
    }
}

/// Fetch each URL in order and build the `get_images` result.
///
/// The result starts with a `Loaded N image(s).` note followed by the N
/// image blocks, or is a single `No images could be loaded.` note.
pub async fn load_images(fetcher: &dyn ImageFetcher, urls: &[String]) -> ToolOutput {
    let mut images = Vec::new();

    for url in urls {
        let data = match fetcher.fetch(url).await {
            Ok(data) => data,
            Err(e) => {
                warn!(%url, error = %e, "Skipping image");
                continue;
            }
        };
        let Some(media_type) = sniff_media_type(&data) else {
            warn!(%url, bytes = data.len(), "Skipping unrecognized image format");
            continue;
        };
        debug!(%url, media_type, bytes = data.len(), "Loaded image");
        images.push(ContentPart::image(media_type, STANDARD.encode(&data)));
    }

    if images.is_empty() {
        return ToolOutput::text("No images could be loaded.");
    }

    let mut parts = Vec::with_capacity(images.len() + 1);
    parts.push(ContentPart::text(format!("Loaded {} image(s).", images.len())));
    parts.extend(images);
    ToolOutput::parts(parts)
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn sniffs_supported_formats() {
        assert_eq!(sniff_media_type(PNG), Some("image/png"));
        assert_eq!(sniff_media_type(JPEG), Some("image/jpeg"));
        assert_eq!(sniff_media_type(b"RIFF\x10\0\0\0WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff_media_type(b"GIF89a\x01\0"), Some("image/gif"));
        assert_eq!(sniff_media_type(b"<html>"), None);
        assert_eq!(sniff_media_type(b"RIFF"), None);
        assert_eq!(sniff_media_type(b""), None);
    }

    #[tokio::test]
    async fn corrupt_payload_is_dropped() {
        let fetcher = StaticImages::default()
            .with("https://a/1.png", PNG)
            .with("https://a/2.bin", b"\0\0garbage")
            .with("https://a/3.jpg", JPEG);
        let urls: Vec<String> = ["https://a/1.png", "https://a/2.bin", "https://a/3.jpg"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let out = load_images(&fetcher, &urls).await;
        assert!(!out.is_error);
        assert_eq!(out.parts.len(), 3);
        assert_eq!(out.parts[0], ContentPart::text("Loaded 2 image(s)."));
        assert!(matches!(&out.parts[1], ContentPart::Image { media_type, .. } if media_type == "image/png"));
        assert!(matches!(&out.parts[2], ContentPart::Image { media_type, .. } if media_type == "image/jpeg"));
    }

    #[tokio::test]
    async fn nothing_loaded_is_a_single_note() {
        let fetcher = StaticImages::default();
        let out = load_images(&fetcher, &["https://a/missing.png".to_string()]).await;
        assert_eq!(out.parts, vec![ContentPart::text("No images could be loaded.")]);
        assert!(!out.is_error);
    }

    #[tokio::test]
    async fn image_data_is_base64() {
        let fetcher = StaticImages::default().with("https://a/1.png", PNG);
        let out = load_images(&fetcher, &["https://a/1.png".to_string()]).await;
        let ContentPart::Image { data, .. } = &out.parts[1] else {
            panic!("expected image");
        };
        assert_eq!(STANDARD.decode(data).unwrap(), PNG);
    }
}
