//! Tool execution output.
//!
//! Every tool call the model issues is answered with exactly one
//! [`ToolOutput`]. Failures the model can correct (bad arguments, unknown
//! tools, workflow violations) are outputs with `is_error` set, never Rust
//! errors.

use serde::{Deserialize, Serialize};
use crate::message::{ContentPart, ToolResultContent};

/// The outcome of dispatching one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Ordered content blocks returned to the model
    pub parts: Vec<ContentPart>,

    /// Whether this output reports a failure
    pub is_error: bool,

    /// Set when a decision was accepted with `done = true`
    #[serde(default)]
    pub finished: bool,
}

impl ToolOutput {
    /// A successful plain-text output.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![ContentPart::text(text)],
            is_error: false,
            finished: false,
        }
    }

    /// A successful output carrying a JSON payload.
    pub fn json(value: &serde_json::Value) -> Self {
        Self::text(value.to_string())
    }

    /// A successful output made of arbitrary content blocks.
    pub fn parts(parts: Vec<ContentPart>) -> Self {
        Self {
            parts,
            is_error: false,
            finished: false,
        }
    }

    /// An error output the model is expected to react to.
    pub fn error(message: impl Into<String>) -> Self {
        let payload = serde_json::json!({ "error": message.into() });
        Self {
            parts: vec![ContentPart::text(payload.to_string())],
            is_error: true,
            finished: false,
        }
    }

    /// An error output with a list of detail lines.
    pub fn error_with_details(message: impl Into<String>, details: &[String]) -> Self {
        let payload = serde_json::json!({ "error": message.into(), "details": details });
        Self {
            parts: vec![ContentPart::text(payload.to_string())],
            is_error: true,
            finished: false,
        }
    }

    /// Mark this output as ending the analysis.
    pub fn finishing(mut self) -> Self {
        self.finished = true;
        self
    }

    /// Attach the tool call ID, producing the content sent back to the model.
    pub fn into_result(self, tool_call_id: impl Into<String>) -> ToolResultContent {
        ToolResultContent {
            tool_call_id: tool_call_id.into(),
            parts: self.parts,
            is_error: self.is_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_output_is_json_with_error_key() {
        let out = ToolOutput::error("Unknown tool: foo");
        assert!(out.is_error);
        assert!(!out.finished);
        let ContentPart::Text { text } = &out.parts[0] else {
            panic!("expected text part");
        };
        let v: serde_json::Value = serde_json::from_str(text).unwrap();
        assert_eq!(v["error"], "Unknown tool: foo");
    }

    #[test]
    fn error_with_details_lists_every_detail() {
        let details = vec!["event.date: field required".to_string(), "done: field required".to_string()];
        let out = ToolOutput::error_with_details("Validation failed", &details);
        let ContentPart::Text { text } = &out.parts[0] else {
            panic!("expected text part");
        };
        let v: serde_json::Value = serde_json::from_str(text).unwrap();
        assert_eq!(v["details"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn into_result_carries_call_id_and_error_flag() {
        let result = ToolOutput::error("nope").into_result("toolu_1");
        assert_eq!(result.tool_call_id, "toolu_1");
        assert!(result.is_error);
    }
}
