//! Feed ingestion — RSS 2.0 / Atom into [`Post`]s.
//!
//! Parsing is done by `feed-rs`; this crate only normalizes entries:
//! the id falls back to the link, content prefers the full body over the
//! summary, and images come from `<img src>` tags plus image enclosures.

use std::sync::LazyLock;
use std::time::Duration;

use calsync_core::error::FeedError;
use calsync_core::post::Post;
use feed_rs::model::Entry;
use regex_lite::Regex;
use tracing::debug;

static IMG_SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<img[^>]+src=["']([^"']+)["']"#).expect("img src pattern is valid")
});

/// Fetch a feed over HTTP and parse it.
pub async fn fetch_feed(client: &reqwest::Client, url: &str, timeout: Duration) -> Result<Vec<Post>, FeedError> {
    let fetch_err = |reason: String| FeedError::Fetch {
        url: url.to_string(),
        reason,
    };

    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| fetch_err(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(fetch_err(format!("HTTP {}", status.as_u16())));
    }

    let body = response.bytes().await.map_err(|e| fetch_err(e.to_string()))?;
    let posts = parse_feed(&body)?;
    debug!(url, posts = posts.len(), "Fetched feed");
    Ok(posts)
}

/// Parse a feed document into posts, in document order.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<Post>, FeedError> {
    let feed = feed_rs::parser::parse(bytes).map_err(|e| FeedError::Parse(e.to_string()))?;
    Ok(feed.entries.into_iter().map(entry_to_post).collect())
}

fn entry_to_post(entry: Entry) -> Post {
    let link = entry.links.first().map(|l| l.href.clone()).unwrap_or_default();

    let content = entry
        .content
        .as_ref()
        .and_then(|c| c.body.clone())
        .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()))
        .unwrap_or_default();

    let mut image_urls = extract_image_urls(&content);
    for media in &entry.media {
        for item in &media.content {
            let is_image = item
                .content_type
                .as_ref()
                .is_some_and(|ct| ct.as_str().starts_with("image/"));
            if let (true, Some(url)) = (is_image, item.url.as_ref()) {
                push_unique(&mut image_urls, url.as_str().to_string());
            }
        }
    }

    let id = if entry.id.trim().is_empty() { link.clone() } else { entry.id };

    Post {
        id,
        title: entry.title.map(|t| t.content).unwrap_or_default(),
        link,
        content,
        author: entry.authors.into_iter().map(|p| p.name).find(|n| !n.is_empty()),
        published: entry.published.or(entry.updated),
        image_urls,
    }
}

/// `<img src>` values in document order, without duplicates.
pub fn extract_image_urls(html: &str) -> Vec<String> {
    let mut urls = Vec::new();
    for caps in IMG_SRC.captures_iter(html) {
        if let Some(src) = caps.get(1) {
            push_unique(&mut urls, src.as_str().replace("&amp;", "&"));
        }
    }
    urls
}

fn push_unique(urls: &mut Vec<String>, url: String) {
    if !url.is_empty() && !urls.contains(&url) {
        urls.push(url);
    }
}
