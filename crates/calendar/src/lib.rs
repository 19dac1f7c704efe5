//! Calendar backends for calsync.
//!
//! All backends implement the `calsync_core::CalendarService` trait.
//! [`GoogleCalendar`] talks to the Google Calendar v3 REST API using a
//! service-account key; [`InMemoryCalendar`] keeps events in process and
//! backs tests and dry experiments.

pub mod auth;
pub mod google;
pub mod in_memory;

pub use auth::{ServiceAccountAuth, ServiceAccountKey, StaticToken, TokenSource};
pub use google::{CalendarMetadata, GoogleCalendar};
pub use in_memory::InMemoryCalendar;
