//! DecisionStore trait — durable record of processed posts.
//!
//! The store is append-only from the decision loop's point of view: one row
//! per accepted decision. The read and delete operations back the CLI's
//! history, details, report and reset commands.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::UsageTotals;
use crate::decision::{Action, Decision};
use crate::error::StoreError;
use crate::post::Post;

/// One stored decision row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub post_id: String,
    pub processed_at: DateTime<Utc>,
    pub action: Action,
    pub calendar_event_id: Option<String>,
    pub reasoning: Option<String>,
    pub confidence: Option<f64>,

    /// Usage of the analysis at the moment the decision was recorded
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub dry_run: bool,

    pub post_title: Option<String>,
    pub post_author: Option<String>,
    pub post_time: Option<DateTime<Utc>>,
    pub post_link: Option<String>,
    pub post_content: Option<String>,

    pub event_title: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub event_time: Option<String>,
    pub event_location: Option<String>,
}

impl DecisionRecord {
    fn for_post(post: &Post, action: Action, usage: UsageTotals, dry_run: bool) -> Self {
        Self {
            post_id: post.id.clone(),
            processed_at: Utc::now(),
            action,
            calendar_event_id: None,
            reasoning: None,
            confidence: None,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost_usd: usage.cost_usd,
            dry_run,
            post_title: Some(post.title.clone()),
            post_author: post.author.clone(),
            post_time: post.published,
            post_link: Some(post.link.clone()),
            post_content: Some(post.content.clone()),
            event_title: None,
            event_date: None,
            event_time: None,
            event_location: None,
        }
    }

    /// Row for a decision accepted by the tool dispatcher.
    pub fn from_decision(
        post: &Post,
        decision: &Decision,
        calendar_event_id: Option<String>,
        usage: UsageTotals,
        dry_run: bool,
    ) -> Self {
        let mut record = Self::for_post(post, decision.action, usage, dry_run);
        record.calendar_event_id = calendar_event_id;
        record.reasoning = Some(decision.reasoning.clone());
        record.confidence = Some(decision.confidence);
        if let Some(event) = &decision.event {
            record.event_title = Some(event.title.clone());
            record.event_date = Some(event.date);
            record.event_time = event.time_display();
            record.event_location = event.location.clone();
        }
        record
    }

    /// Row for a post the prefilter screened out.
    pub fn prefiltered(post: &Post, usage: UsageTotals, dry_run: bool) -> Self {
        let mut record = Self::for_post(post, Action::Ignore, usage, dry_run);
        record.reasoning = Some("Pre-filter: not an event".into());
        record
    }
}

/// Persistent storage for decision records.
#[async_trait]
pub trait DecisionStore: Send + Sync {
    /// A human-readable name for this backend (e.g., "sqlite").
    fn name(&self) -> &str;

    /// Append one row.
    async fn record(&self, record: DecisionRecord) -> Result<(), StoreError>;

    /// Whether any row exists for the post.
    async fn is_processed(&self, post_id: &str) -> Result<bool, StoreError>;

    /// All rows for a post, oldest first.
    async fn records_for_post(&self, post_id: &str) -> Result<Vec<DecisionRecord>, StoreError>;

    /// Most recent rows, newest first.
    async fn history(&self, limit: usize) -> Result<Vec<DecisionRecord>, StoreError>;

    /// Remove every row for a post. Returns whether anything was removed.
    async fn delete_post(&self, post_id: &str) -> Result<bool, StoreError>;

    /// Remove every row. Returns the number removed.
    async fn clear(&self) -> Result<u64, StoreError>;

    /// Sum of `cost_usd` over all rows.
    async fn total_cost(&self) -> Result<f64, StoreError>;
}
