//! Aggregate cost over a batch of analyses.

use calsync_core::UsageTotals;
use serde::{Deserialize, Serialize};

/// Running totals across posts, split by outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub posts: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub prefiltered: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

impl CostSummary {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_usage(&mut self, usage: UsageTotals) {
        self.posts += 1;
        self.input_tokens += usage.input_tokens;
        self.output_tokens += usage.output_tokens;
        self.cost_usd += usage.cost_usd;
    }

    pub fn record_success(&mut self, usage: UsageTotals) {
        self.add_usage(usage);
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self, usage: UsageTotals) {
        self.add_usage(usage);
        self.failed += 1;
    }

    /// A post screened out before the decision loop ran.
    pub fn record_prefiltered(&mut self, usage: UsageTotals) {
        self.add_usage(usage);
        self.prefiltered += 1;
    }

    pub fn totals(&self) -> UsageTotals {
        UsageTotals {
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            cost_usd: self.cost_usd,
        }
    }
}
