//! Per-post analysis state.
//!
//! One [`AnalysisContext`] is created for each post and mutated by the
//! decision loop and the tool dispatcher. It is never shared across posts.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::decision::{Decision, DecisionLedger};
use crate::post::Post;

/// Token and cost totals for an analysis, attached to every outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

impl std::fmt::Display for UsageTotals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} in / {} out (${:.4})",
            self.input_tokens, self.output_tokens, self.cost_usd
        )
    }
}

impl std::ops::Add for UsageTotals {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
            cost_usd: self.cost_usd + rhs.cost_usd,
        }
    }
}

#[derive(Debug)]
pub struct AnalysisContext {
    post: Post,
    dry_run: bool,
    usage: UsageTotals,
    ledger: DecisionLedger,
    images_inspected: bool,
    turns: u32,
    log_path: Option<PathBuf>,
}

impl AnalysisContext {
    pub fn new(post: Post, dry_run: bool) -> Self {
        Self {
            post,
            dry_run,
            usage: UsageTotals::default(),
            ledger: DecisionLedger::new(),
            images_inspected: false,
            turns: 0,
            log_path: None,
        }
    }

    pub fn with_log_path(mut self, path: PathBuf) -> Self {
        self.log_path = Some(path);
        self
    }

    pub fn post(&self) -> &Post {
        &self.post
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Add one response's usage. `cost_usd` is the priced cost of that response.
    pub fn add_usage(&mut self, input_tokens: u64, output_tokens: u64, cost_usd: f64) {
        self.usage.input_tokens += input_tokens;
        self.usage.output_tokens += output_tokens;
        self.usage.cost_usd += cost_usd;
    }

    pub fn usage(&self) -> UsageTotals {
        self.usage
    }

    pub fn record_decision(&mut self, decision: Decision, calendar_event_id: Option<String>) {
        self.ledger.push(decision, calendar_event_id);
    }

    pub fn ledger(&self) -> &DecisionLedger {
        &self.ledger
    }

    pub fn mark_images_inspected(&mut self) {
        self.images_inspected = true;
    }

    pub fn images_inspected(&self) -> bool {
        self.images_inspected
    }

    /// Count a model turn and return its 1-based number.
    pub fn begin_turn(&mut self) -> u32 {
        self.turns += 1;
        self.turns
    }

    pub fn turns(&self) -> u32 {
        self.turns
    }

    pub fn log_path(&self) -> Option<&PathBuf> {
        self.log_path.as_ref()
    }
}
