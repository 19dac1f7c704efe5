//! Per-post driver: prefilter, then the decision loop.
//!
//! Posts are independent, so a batch runs up to `concurrency` posts at
//! once. Each post still runs strictly sequentially inside its own loop.

use std::sync::Arc;

use calsync_core::analysis::UsageTotals;
use calsync_core::post::Post;
use calsync_core::storage::{DecisionRecord, DecisionStore};
use calsync_telemetry::CostSummary;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::loop_runner::{AnalysisError, AnalysisOutcome, DecisionLoop};
use crate::prefilter::Prefilter;

/// What happened to one post.
#[derive(Debug)]
pub enum PostOutcome {
    /// The prefilter answered NO; a single `ignore` row was stored.
    Prefiltered { post_id: String, usage: UsageTotals },
    Analyzed {
        outcome: AnalysisOutcome,
        prefilter_usage: UsageTotals,
    },
    /// Nothing is stored, so the post is retried on the next run.
    Failed {
        post_id: String,
        error: AnalysisError,
        prefilter_usage: UsageTotals,
    },
}

impl PostOutcome {
    pub fn post_id(&self) -> &str {
        match self {
            Self::Prefiltered { post_id, .. } | Self::Failed { post_id, .. } => post_id,
            Self::Analyzed { outcome, .. } => &outcome.post_id,
        }
    }

    /// Prefilter plus decision-loop spend.
    pub fn usage(&self) -> UsageTotals {
        match self {
            Self::Prefiltered { usage, .. } => *usage,
            Self::Analyzed {
                outcome,
                prefilter_usage,
            } => *prefilter_usage + outcome.usage,
            Self::Failed {
                error, prefilter_usage, ..
            } => *prefilter_usage + error.usage(),
        }
    }
}

pub struct PostProcessor {
    prefilter: Option<Prefilter>,
    decision_loop: DecisionLoop,
    store: Arc<dyn DecisionStore>,
}

impl PostProcessor {
    pub fn new(decision_loop: DecisionLoop, store: Arc<dyn DecisionStore>) -> Self {
        Self {
            prefilter: None,
            decision_loop,
            store,
        }
    }

    pub fn with_prefilter(mut self, prefilter: Prefilter) -> Self {
        self.prefilter = Some(prefilter);
        self
    }

    pub async fn process(&self, post: Post, now: DateTime<Utc>, dry_run: bool) -> PostOutcome {
        let mut prefilter_usage = UsageTotals::default();

        if let Some(prefilter) = &self.prefilter {
            match prefilter.classify(&post, now).await {
                Ok(result) if !result.is_likely_event => {
                    info!(post_id = %post.id, usage = %result.usage, "Prefilter: not an event, skipping");
                    let record = DecisionRecord::prefiltered(&post, result.usage, dry_run);
                    if let Err(e) = self.store.record(record).await {
                        warn!(post_id = %post.id, error = %e, "Failed to record prefiltered post");
                    }
                    return PostOutcome::Prefiltered {
                        post_id: post.id,
                        usage: result.usage,
                    };
                }
                Ok(result) => prefilter_usage = result.usage,
                Err(e) => {
                    warn!(post_id = %post.id, error = %e, "Prefilter failed; running full analysis");
                }
            }
        }

        let post_id = post.id.clone();
        match self.decision_loop.analyze(post, now, dry_run).await {
            Ok(outcome) => PostOutcome::Analyzed {
                outcome,
                prefilter_usage,
            },
            Err(error) => PostOutcome::Failed {
                post_id,
                error,
                prefilter_usage,
            },
        }
    }

    /// Process `posts` with at most `concurrency` in flight. Outcomes come
    /// back in completion order.
    pub async fn process_batch(
        &self,
        posts: Vec<Post>,
        now: DateTime<Utc>,
        dry_run: bool,
        concurrency: usize,
    ) -> (Vec<PostOutcome>, CostSummary) {
        let outcomes: Vec<PostOutcome> = stream::iter(posts)
            .map(|post| self.process(post, now, dry_run))
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let mut summary = CostSummary::new();
        for outcome in &outcomes {
            match outcome {
                PostOutcome::Prefiltered { .. } => summary.record_prefiltered(outcome.usage()),
                PostOutcome::Analyzed { .. } => summary.record_success(outcome.usage()),
                PostOutcome::Failed { .. } => summary.record_failure(outcome.usage()),
            }
        }
        (outcomes, summary)
    }
}
