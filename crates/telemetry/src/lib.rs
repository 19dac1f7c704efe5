//! Token accounting and cost estimation for calsync.
//!
//! Every model call is priced against a per-million-token table. Built-in
//! prices cover the Anthropic models calsync runs against; configuration
//! can override or extend them.

pub mod pricing;
pub mod summary;

pub use pricing::{ModelPricing, PricingTable};
pub use summary::CostSummary;
