//! The feed post being analyzed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Only this many images of a post are ever fetched or advertised.
pub const MAX_POST_IMAGES: usize = 5;

/// One feed entry. Immutable input to an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Globally unique post identifier (feed GUID)
    pub id: String,

    pub title: String,

    /// Canonical link to the post
    pub link: String,

    /// Raw content body
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,

    /// Image URLs in document order
    #[serde(default)]
    pub image_urls: Vec<String>,
}

impl Post {
    /// The image URLs that are considered during analysis.
    pub fn considered_images(&self) -> &[String] {
        let n = self.image_urls.len().min(MAX_POST_IMAGES);
        &self.image_urls[..n]
    }

    pub fn has_images(&self) -> bool {
        !self.image_urls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_with_images(n: usize) -> Post {
        Post {
            id: "guid-1".into(),
            title: "Ride".into(),
            link: "https://example.com/p/1".into(),
            content: "Saturday ride".into(),
            author: None,
            published: None,
            image_urls: (0..n).map(|i| format!("https://img.example.com/{i}.jpg")).collect(),
        }
    }

    #[test]
    fn considered_images_caps_at_five() {
        assert_eq!(post_with_images(7).considered_images().len(), 5);
        assert_eq!(post_with_images(2).considered_images().len(), 2);
        assert!(post_with_images(0).considered_images().is_empty());
    }

    #[test]
    fn has_images() {
        assert!(post_with_images(1).has_images());
        assert!(!post_with_images(0).has_images());
    }
}
