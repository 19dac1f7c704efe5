//! The agentic decision loop for calsync.
//!
//! A post is first screened by the cheap [`Prefilter`]. Posts that might be
//! events go through the [`DecisionLoop`]: the model calls tools
//! (`get_images`, the two calendar searches and `submit_decision`) until it
//! submits a final decision, gives up, or runs out of turns.
//!
//! Every model call's token usage is accumulated per post and attached to
//! both successful outcomes and terminal errors.

pub mod loop_runner;
pub mod prefilter;
pub mod processor;
pub mod prompt;
pub mod transcript;

#[cfg(test)]
mod test_helpers;

pub use loop_runner::{AnalysisError, AnalysisOutcome, DecisionLoop, Termination};
pub use prefilter::{Prefilter, PrefilterResult, is_likely_event};
pub use processor::{PostOutcome, PostProcessor};
pub use transcript::{FileTranscript, FileTranscripts, NullTranscript, Transcript, TranscriptFactory};
