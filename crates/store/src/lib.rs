//! Decision storage for calsync.
//!
//! All backends implement the `calsync_core::DecisionStore` trait.
//! SQLite is the durable default; the in-memory store backs tests.

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use sqlite::SqliteStore;
