//! LLM provider implementations for calsync.
//!
//! All providers implement the `calsync_core::Provider` trait.

pub mod anthropic;
pub mod retry;

pub use anthropic::AnthropicProvider;
pub use retry::RetryProvider;
