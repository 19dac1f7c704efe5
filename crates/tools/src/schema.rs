//! Tool definitions advertised to the model.
//!
//! These four tools are the whole protocol surface. Changing a field set
//! here is a breaking change for prompts and stored transcripts alike.

use calsync_core::decision::Action;
use calsync_core::provider::ToolDefinition;
use serde_json::json;

pub const GET_IMAGES: &str = "get_images";
pub const SEARCH_EVENTS_BY_DATE: &str = "search_events_by_date";
pub const SEARCH_EVENTS_BY_KEYWORD: &str = "search_events_by_keyword";
pub const SUBMIT_DECISION: &str = "submit_decision";

pub fn tool_definitions() -> Vec<ToolDefinition> {
    let actions: Vec<&str> = Action::ALL.iter().map(|a| a.as_str()).collect();

    vec![
        ToolDefinition {
            name: GET_IMAGES.into(),
            description: "Fetch the images attached to this post. Call this if the post could plausibly \
                          be an event. Images often contain event posters with dates, times, and \
                          locations. You MUST call this before any decision other than ignore."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {}
            }),
        },
        ToolDefinition {
            name: SEARCH_EVENTS_BY_DATE.into(),
            description: "Search the calendar for events in a date range (inclusive).".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "start_date": {
                        "type": "string",
                        "description": "Start date in YYYY-MM-DD format"
                    },
                    "end_date": {
                        "type": "string",
                        "description": "End date in YYYY-MM-DD format"
                    },
                    "day_of_week": {
                        "type": "string",
                        "description": "Optional weekday you believe start_date falls on (e.g. \"Saturday\"). \
                                        Checked before searching."
                    }
                },
                "required": ["start_date", "end_date"]
            }),
        },
        ToolDefinition {
            name: SEARCH_EVENTS_BY_KEYWORD.into(),
            description: "Search upcoming calendar events by keyword. Each keyword is searched \
                          separately; results are merged, deduplicated and capped at 5, soonest first."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "keywords": {
                        "type": "array",
                        "items": {"type": "string"},
                        "minItems": 1,
                        "description": "Search terms (e.g., event name, organization name, venue)"
                    }
                },
                "required": ["keywords"]
            }),
        },
        ToolDefinition {
            name: SUBMIT_DECISION.into(),
            description: "Submit a decision about this post. Call once per distinct event (up to 5), \
                          setting done=true on the last one. You MUST call this tool to complete the \
                          analysis."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "is_event": {
                        "type": "boolean",
                        "description": "Whether this post announces an event"
                    },
                    "confidence": {
                        "type": "number",
                        "description": "Confidence level 0.0-1.0"
                    },
                    "action": {
                        "type": "string",
                        "enum": actions,
                        "description": "What action to take"
                    },
                    "reasoning": {
                        "type": "string",
                        "description": "Explanation of your decision"
                    },
                    "event": {
                        "type": ["object", "null"],
                        "description": "Event details. Required for create and update.",
                        "properties": {
                            "title": {"type": "string"},
                            "date": {"type": "string", "pattern": "^\\d{4}-\\d{2}-\\d{2}$"},
                            "day_of_week": {
                                "type": "string",
                                "description": "Weekday you believe date falls on; checked against the date"
                            },
                            "time": {"type": ["string", "null"], "description": "HH:MM, 24-hour; null for all-day"},
                            "end_time": {"type": ["string", "null"], "description": "HH:MM, 24-hour"},
                            "timezone": {"type": "string", "description": "IANA timezone"},
                            "location": {"type": ["string", "null"]},
                            "description": {"type": ["string", "null"]}
                        },
                        "required": ["title", "date"]
                    },
                    "related_event_id": {
                        "type": ["string", "null"],
                        "description": "Calendar event ID when updating or cancelling an existing event"
                    },
                    "done": {
                        "type": "boolean",
                        "description": "true if this is your last decision for this post"
                    }
                },
                "required": ["is_event", "confidence", "action", "reasoning", "done"]
            }),
        },
    ]
}
