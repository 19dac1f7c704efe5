//! Shared test helpers for the prefilter and loop tests.

use calsync_core::error::ProviderError;
use calsync_core::message::{Message, MessageToolCall};
use calsync_core::provider::{Provider, ProviderRequest, ProviderResponse, StopReason, Usage};
use std::sync::Mutex;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next scripted result. Once the script
/// runs out every call fails with `ProviderError::Network`.
pub struct SequentialMockProvider {
    script: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::scripted(responses.into_iter().map(Ok).collect())
    }

    pub fn scripted(mut script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        script.reverse();
        Self {
            script: Mutex::new(script),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.script
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Err(ProviderError::Network("script exhausted".into())))
    }
}

/// A plain text response that ends the turn.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage::new(10, 5)),
        stop_reason: StopReason::EndTurn,
        model: "mock-model".into(),
        metadata: serde_json::Map::new(),
    }
}

/// A response asking for the given tool calls.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(thought).with_tool_calls(tool_calls),
        usage: Some(Usage::new(100, 20)),
        stop_reason: StopReason::ToolUse,
        model: "mock-model".into(),
        metadata: serde_json::Map::new(),
    }
}

/// Helper to create a tool call; the id is derived from the name and `n`.
pub fn make_tool_call(name: &str, n: usize, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("toolu_{name}_{n}"),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}
