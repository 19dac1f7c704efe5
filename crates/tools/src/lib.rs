//! The tool surface of the calsync decision loop.
//!
//! The model sees four tools (see [`schema`]). Each call is decoded into a
//! [`ToolRequest`], validated, and executed by the [`ToolDispatcher`]
//! against the calendar, the decision store and the post's images.

pub mod day_of_week;
pub mod dispatcher;
pub mod images;
pub mod request;
pub mod schema;
pub mod validate;

pub use day_of_week::{parse_weekday, validate_day_of_week};
pub use dispatcher::{DispatchPolicy, ToolDispatcher};
pub use images::{HttpImageFetcher, ImageFetcher, load_images, sniff_media_type};
pub use request::ToolRequest;
pub use schema::tool_definitions;
pub use validate::{ValidationFailure, validate_decision};
