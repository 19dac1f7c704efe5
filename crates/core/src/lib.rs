//! # calsync core
//!
//! Domain types, traits, and error definitions for the calsync event
//! pipeline. This crate has **no I/O dependencies**: it defines the domain
//! model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the decision loop is a trait here (the language
//! model [`Provider`], the [`CalendarService`], the [`DecisionStore`]).
//! Implementations live in their own crates, so the loop can be driven
//! end to end against scripted providers and in-memory backends.

pub mod analysis;
pub mod calendar;
pub mod decision;
pub mod error;
pub mod event;
pub mod message;
pub mod post;
pub mod provider;
pub mod storage;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use analysis::{AnalysisContext, UsageTotals};
pub use calendar::{CalendarService, merge_keyword_results, normalize_keywords};
pub use decision::{Action, Decision, DecisionLedger, RecordedDecision};
pub use error::{CalendarError, FeedError, ProviderError, StoreError, ToolError};
pub use event::{CalendarEvent, EventDetails, EventTime};
pub use message::{ContentPart, Message, MessageToolCall, Role, ToolResultContent};
pub use post::Post;
pub use provider::{Provider, ProviderRequest, ProviderResponse, StopReason, ToolDefinition, Usage};
pub use storage::{DecisionRecord, DecisionStore};
pub use tool::ToolOutput;
