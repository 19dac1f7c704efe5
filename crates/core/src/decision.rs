//! Decisions about a post and the per-post ledger that collects them.

use serde::{Deserialize, Serialize};
use crate::event::EventDetails;

/// What to do with a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Update,
    Cancel,
    Ignore,
    FlagForReview,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Create,
        Action::Update,
        Action::Cancel,
        Action::Ignore,
        Action::FlagForReview,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Cancel => "cancel",
            Self::Ignore => "ignore",
            Self::FlagForReview => "flag_for_review",
        }
    }

    /// Every action except `ignore` must be preceded by `get_images` when
    /// the post has images.
    pub fn needs_image_review(&self) -> bool {
        !matches!(self, Self::Ignore)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown action '{s}'"))
    }
}

/// A validated decision submitted by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub is_event: bool,
    /// In `[0.0, 1.0]`
    pub confidence: f64,
    pub action: Action,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<EventDetails>,
    /// Required for update and cancel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_event_id: Option<String>,
    /// Whether the model is finished with this post
    pub done: bool,
}

/// A decision together with the calendar event it produced, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedDecision {
    pub decision: Decision,
    pub calendar_event_id: Option<String>,
}

/// Append-only record of the decisions accepted for one post.
#[derive(Debug, Clone, Default)]
pub struct DecisionLedger {
    entries: Vec<RecordedDecision>,
}

impl DecisionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, decision: Decision, calendar_event_id: Option<String>) {
        self.entries.push(RecordedDecision {
            decision,
            calendar_event_id,
        });
    }

    pub fn entries(&self) -> &[RecordedDecision] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&RecordedDecision> {
        self.entries.last()
    }

    /// How many recorded decisions took the given action.
    pub fn count(&self, action: Action) -> usize {
        self.entries.iter().filter(|e| e.decision.action == action).count()
    }
}
