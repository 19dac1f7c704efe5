//! Error types for the calsync domain.
//!
//! Each bounded context has its own `thiserror` enum. Binaries wrap them
//! with `anyhow`.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("Calendar not configured: {0}")]
    NotConfigured(String),

    #[error("Calendar authentication failed: {0}")]
    Auth(String),

    #[error("Calendar API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Calendar event not found: {0}")]
    NotFound(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Failed to fetch feed {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Failed to parse feed: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    NotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Image fetch failed: {url}: {reason}")]
    ImageFetch { url: String, reason: String },
}
