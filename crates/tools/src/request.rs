//! Decoding of raw tool calls into [`ToolRequest`].

use calsync_core::error::ToolError;
use calsync_core::message::MessageToolCall;
use serde::Deserialize;
use serde_json::Value;

use crate::schema::{GET_IMAGES, SEARCH_EVENTS_BY_DATE, SEARCH_EVENTS_BY_KEYWORD, SUBMIT_DECISION};

/// One decoded tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRequest {
    GetImages,
    SearchByDate(DateSearch),
    SearchByKeyword(KeywordSearch),
    /// Left untyped; [`crate::validate::validate_decision`] owns its schema.
    SubmitDecision(Value),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DateSearch {
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub day_of_week: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KeywordSearch {
    pub keywords: Vec<String>,
}

impl ToolRequest {
    pub fn decode(call: &MessageToolCall) -> Result<Self, ToolError> {
        match call.name.as_str() {
            GET_IMAGES => Ok(Self::GetImages),
            SEARCH_EVENTS_BY_DATE => serde_json::from_value(arguments(call)?)
                .map(Self::SearchByDate)
                .map_err(|e| ToolError::InvalidArguments(e.to_string())),
            SEARCH_EVENTS_BY_KEYWORD => serde_json::from_value(arguments(call)?)
                .map(Self::SearchByKeyword)
                .map_err(|e| ToolError::InvalidArguments(e.to_string())),
            SUBMIT_DECISION => arguments(call).map(Self::SubmitDecision),
            other => Err(ToolError::NotFound(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::GetImages => GET_IMAGES,
            Self::SearchByDate(_) => SEARCH_EVENTS_BY_DATE,
            Self::SearchByKeyword(_) => SEARCH_EVENTS_BY_KEYWORD,
            Self::SubmitDecision(_) => SUBMIT_DECISION,
        }
    }
}

/// The call's argument string as JSON; empty means no arguments.
fn arguments(call: &MessageToolCall) -> Result<Value, ToolError> {
    if call.arguments.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(&call.arguments)
        .map_err(|e| ToolError::InvalidArguments(format!("arguments are not valid JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, arguments: &str) -> MessageToolCall {
        MessageToolCall {
            id: "toolu_1".into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    #[test]
    fn decodes_each_tool() {
        assert_eq!(ToolRequest::decode(&call("get_images", "")).unwrap(), ToolRequest::GetImages);

        let ToolRequest::SearchByDate(search) =
            ToolRequest::decode(&call("search_events_by_date", r#"{"start_date":"2026-01-03","end_date":"2026-01-04"}"#))
                .unwrap()
        else {
            panic!("expected date search");
        };
        assert_eq!(search.start_date, "2026-01-03");
        assert!(search.day_of_week.is_none());

        let ToolRequest::SearchByKeyword(search) =
            ToolRequest::decode(&call("search_events_by_keyword", r#"{"keywords":["alleycat"]}"#)).unwrap()
        else {
            panic!("expected keyword search");
        };
        assert_eq!(search.keywords, vec!["alleycat".to_string()]);

        assert!(matches!(
            ToolRequest::decode(&call("submit_decision", r#"{"action":"ignore"}"#)).unwrap(),
            ToolRequest::SubmitDecision(_)
        ));
    }

    #[test]
    fn unknown_tool_is_not_found() {
        let err = ToolRequest::decode(&call("delete_calendar", "{}")).unwrap_err();
        assert!(matches!(err, ToolError::NotFound(ref n) if n == "delete_calendar"));
        assert_eq!(err.to_string(), "Unknown tool: delete_calendar");

        let err = ToolRequest::decode(&call("delete_calendar", "{not json")).unwrap_err();
        assert_eq!(err.to_string(), "Unknown tool: delete_calendar");
    }

    #[test]
    fn bad_arguments_are_invalid() {
        assert!(matches!(
            ToolRequest::decode(&call("search_events_by_date", "{not json")),
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(matches!(
            ToolRequest::decode(&call("search_events_by_keyword", r#"{"query":"x"}"#)),
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(matches!(
            ToolRequest::decode(&call("submit_decision", "{not json")),
            Err(ToolError::InvalidArguments(_))
        ));
        // get_images takes no parameters, so stray arguments are ignored
        assert_eq!(ToolRequest::decode(&call("get_images", "{not json")).unwrap(), ToolRequest::GetImages);
    }
}
