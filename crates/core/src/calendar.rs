//! CalendarService trait — the abstraction over calendar backends.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::CalendarError;
use crate::event::{CalendarEvent, EventDetails};

/// Keyword searches return at most this many events.
pub const KEYWORD_RESULT_LIMIT: usize = 5;

/// The calendar the decision loop reads from and writes to.
#[async_trait]
pub trait CalendarService: Send + Sync {
    /// A human-readable name for this backend (e.g., "google").
    fn name(&self) -> &str;

    /// Events overlapping the inclusive date range, soonest first.
    async fn search_by_date(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CalendarEvent>, CalendarError>;

    /// Up to [`KEYWORD_RESULT_LIMIT`] upcoming events matching any keyword,
    /// soonest first, deduplicated by id.
    async fn search_by_keyword(&self, keywords: &[String]) -> Result<Vec<CalendarEvent>, CalendarError>;

    /// Insert an event and return its id.
    async fn create(&self, event: &EventDetails) -> Result<String, CalendarError>;

    /// Replace an existing event and return its id.
    async fn update(&self, id: &str, event: &EventDetails) -> Result<String, CalendarError>;

    async fn delete(&self, id: &str) -> Result<(), CalendarError>;
}

/// Trim keywords, drop blanks and duplicates, keep first-seen order.
pub fn normalize_keywords(keywords: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.to_string()))
        .map(str::to_string)
        .collect()
}

/// Merge per-keyword result sets: dedup by id, sort by start, cap to `limit`.
pub fn merge_keyword_results(
    result_sets: impl IntoIterator<Item = Vec<CalendarEvent>>,
    limit: usize,
) -> Vec<CalendarEvent> {
    let mut seen = HashSet::new();
    let mut merged: Vec<CalendarEvent> = result_sets
        .into_iter()
        .flatten()
        .filter(|e| seen.insert(e.id.clone()))
        .collect();
    merged.sort_by_key(|e| e.start.sort_key());
    merged.truncate(limit);
    merged
}
