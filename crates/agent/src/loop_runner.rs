//! The decision loop — drives one post's tool-calling conversation.
//!
//! ```text
//! AWAITING_MODEL ──▶ MODEL_RESPONDED ──┬─ tool_use ─▶ TOOL_EXECUTING ──▶ AWAITING_MODEL
//!                                      ├─ done decision / end_turn with decisions ─▶ TERMINAL_DONE
//!                                      └─ anything else ─▶ TERMINAL_ERROR
//! ```
//!
//! Usage is added to the context before any branching, so every outcome,
//! successful or not, carries the exact spend.

use std::path::PathBuf;
use std::sync::Arc;

use calsync_core::analysis::{AnalysisContext, UsageTotals};
use calsync_core::decision::RecordedDecision;
use calsync_core::error::ProviderError;
use calsync_core::message::Message;
use calsync_core::post::Post;
use calsync_core::provider::{Provider, ProviderRequest, StopReason, ToolDefinition};
use calsync_telemetry::PricingTable;
use calsync_tools::{ToolDispatcher, tool_definitions};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::prompt::{system_prompt, user_message};
use crate::transcript::{NullTranscript, Transcript, TranscriptFactory};

/// Terminal failure of one post's analysis.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Model ended its turn without calling submit_decision. Tokens used: {usage}")]
    ProtocolViolation { usage: UsageTotals },

    #[error("Unexpected stop reason: {stop_reason}. Tokens used: {usage}")]
    UnexpectedStopReason { stop_reason: String, usage: UsageTotals },

    #[error("Max turns ({max_turns}) exceeded without submit_decision. Tokens used: {usage}")]
    TurnBudgetExhausted { max_turns: u32, usage: UsageTotals },

    #[error("Provider request failed: {source}. Tokens used: {usage}")]
    Provider {
        #[source]
        source: ProviderError,
        usage: UsageTotals,
    },
}

impl AnalysisError {
    /// Spend accumulated before the failure.
    pub fn usage(&self) -> UsageTotals {
        match self {
            Self::ProtocolViolation { usage }
            | Self::UnexpectedStopReason { usage, .. }
            | Self::TurnBudgetExhausted { usage, .. }
            | Self::Provider { usage, .. } => *usage,
        }
    }
}

/// How a successful analysis ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// A decision was submitted with `done = true`.
    Done,
    /// The model stopped on its own after at least one decision.
    EndTurn,
    /// The turn budget ran out after at least one decision.
    TurnBudget,
}

/// Result of a successful analysis.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub post_id: String,
    pub decisions: Vec<RecordedDecision>,
    pub usage: UsageTotals,
    pub turns: u32,
    pub termination: Termination,
    pub log_path: Option<PathBuf>,
}

impl AnalysisOutcome {
    fn from_context(ctx: &AnalysisContext, termination: Termination) -> Self {
        Self {
            post_id: ctx.post().id.clone(),
            decisions: ctx.ledger().entries().to_vec(),
            usage: ctx.usage(),
            turns: ctx.turns(),
            termination,
            log_path: ctx.log_path().cloned(),
        }
    }
}

/// The tool-calling decision loop.
pub struct DecisionLoop {
    provider: Arc<dyn Provider>,
    dispatcher: Arc<ToolDispatcher>,
    pricing: Arc<PricingTable>,
    transcripts: Arc<dyn TranscriptFactory>,
    model: String,
    max_tokens: u32,
    max_turns: u32,
    timezone: Tz,
    tools: Vec<ToolDefinition>,
}

impl DecisionLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        dispatcher: Arc<ToolDispatcher>,
        pricing: Arc<PricingTable>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            dispatcher,
            pricing,
            transcripts: Arc::new(NullTranscript),
            model: model.into(),
            max_tokens: 4096,
            max_turns: 10,
            timezone: chrono_tz::America::Chicago,
            tools: tool_definitions(),
        }
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Zone used for the prompt's clock and for rendering publish times.
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_transcripts(mut self, transcripts: Arc<dyn TranscriptFactory>) -> Self {
        self.transcripts = transcripts;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Analyze one post.
    ///
    /// `now` is the clock the prompts are built against. In dry-run mode
    /// decisions are validated and recorded but the calendar is untouched.
    pub async fn analyze(
        &self,
        post: Post,
        now: DateTime<Utc>,
        dry_run: bool,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let mut transcript = self.transcripts.open(&post.id, now).await;
        let mut ctx = AnalysisContext::new(post, dry_run);
        if let Some(path) = transcript.path() {
            ctx = ctx.with_log_path(path.to_path_buf());
        }

        info!(post_id = %ctx.post().id, title = %ctx.post().title, dry_run, "Analyzing post");

        let opening = user_message(ctx.post(), self.timezone);
        transcript.log_user_message(&opening).await;

        let mut messages = vec![
            Message::system(system_prompt(
                now.with_timezone(&self.timezone),
                self.dispatcher.policy().max_creates_per_post,
            )),
            Message::user(opening),
        ];

        while ctx.turns() < self.max_turns {
            let turn = ctx.begin_turn();

            let mut request = ProviderRequest::new(&self.model, messages.clone());
            request.max_tokens = Some(self.max_tokens);
            request.tools = self.tools.clone();

            let response = match self.provider.complete(request).await {
                Ok(response) => response,
                Err(source) => {
                    let error = AnalysisError::Provider {
                        source,
                        usage: ctx.usage(),
                    };
                    return Err(self.fail(transcript.as_mut(), &ctx, error).await);
                }
            };

            let usage = response.usage_or_default();
            let cost = self
                .pricing
                .compute_cost(&self.model, usage.prompt_tokens, usage.completion_tokens);
            ctx.add_usage(usage.prompt_tokens, usage.completion_tokens, cost);

            debug!(
                post_id = %ctx.post().id,
                turn,
                stop_reason = %response.stop_reason,
                tool_calls = response.message.tool_calls.len(),
                input_tokens = usage.prompt_tokens,
                output_tokens = usage.completion_tokens,
                "Model responded"
            );

            let wants_tools =
                response.stop_reason == StopReason::ToolUse && !response.message.tool_calls.is_empty();

            if wants_tools {
                let mut results = Vec::with_capacity(response.message.tool_calls.len());
                let mut finished = false;
                // Issuance order; later calls may depend on earlier ones.
                for call in &response.message.tool_calls {
                    let output = self.dispatcher.dispatch(call, &mut ctx).await;
                    finished |= output.finished;
                    results.push(output.into_result(call.id.clone()));
                }
                transcript.log_turn(turn, &response, &results).await;

                if finished {
                    return Ok(self.complete(transcript.as_mut(), &ctx, Termination::Done).await);
                }

                messages.push(response.message);
                messages.push(Message::tool_results(results));
                continue;
            }

            transcript.log_turn(turn, &response, &[]).await;
            match response.stop_reason {
                // A tool_use stop without any calls asks for nothing; treat it as end_turn.
                StopReason::EndTurn | StopReason::ToolUse => {
                    if ctx.ledger().is_empty() {
                        let error = AnalysisError::ProtocolViolation { usage: ctx.usage() };
                        return Err(self.fail(transcript.as_mut(), &ctx, error).await);
                    }
                    return Ok(self.complete(transcript.as_mut(), &ctx, Termination::EndTurn).await);
                }
                other => {
                    let error = AnalysisError::UnexpectedStopReason {
                        stop_reason: other.to_string(),
                        usage: ctx.usage(),
                    };
                    return Err(self.fail(transcript.as_mut(), &ctx, error).await);
                }
            }
        }

        if ctx.ledger().is_empty() {
            let error = AnalysisError::TurnBudgetExhausted {
                max_turns: self.max_turns,
                usage: ctx.usage(),
            };
            return Err(self.fail(transcript.as_mut(), &ctx, error).await);
        }

        warn!(
            post_id = %ctx.post().id,
            max_turns = self.max_turns,
            decisions = ctx.ledger().len(),
            "Turn budget exhausted before a final decision; keeping recorded decisions"
        );
        Ok(self.complete(transcript.as_mut(), &ctx, Termination::TurnBudget).await)
    }

    async fn complete(
        &self,
        transcript: &mut dyn Transcript,
        ctx: &AnalysisContext,
        termination: Termination,
    ) -> AnalysisOutcome {
        transcript.log_final(ctx).await;
        let outcome = AnalysisOutcome::from_context(ctx, termination);
        info!(
            post_id = %outcome.post_id,
            decisions = outcome.decisions.len(),
            turns = outcome.turns,
            usage = %outcome.usage,
            ?termination,
            "Analysis complete"
        );
        outcome
    }

    async fn fail(&self, transcript: &mut dyn Transcript, ctx: &AnalysisContext, error: AnalysisError) -> AnalysisError {
        transcript.log_error(&error.to_string()).await;
        warn!(post_id = %ctx.post().id, turns = ctx.turns(), error = %error, "Analysis failed");
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        SequentialMockProvider, make_text_response, make_tool_call, make_tool_call_response,
    };
    use crate::transcript::FileTranscripts;
    use calsync_calendar::InMemoryCalendar;
    use calsync_core::decision::Action;
    use calsync_core::error::ToolError;
    use calsync_core::message::{ContentPart, Role};
    use calsync_core::provider::ProviderResponse;
    use calsync_store::InMemoryStore;
    use calsync_telemetry::ModelPricing;
    use calsync_tools::ImageFetcher;
    use chrono::TimeZone;
    use serde_json::json;

    struct NoImages;

    #[async_trait::async_trait]
    impl ImageFetcher for NoImages {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, ToolError> {
            Err(ToolError::ImageFetch {
                url: url.into(),
                reason: "offline".into(),
            })
        }
    }

    struct Fixture {
        provider: Arc<SequentialMockProvider>,
        calendar: Arc<InMemoryCalendar>,
        store: Arc<InMemoryStore>,
        decision_loop: DecisionLoop,
    }

    fn fixture(script: Vec<Result<ProviderResponse, ProviderError>>) -> Fixture {
        let provider = Arc::new(SequentialMockProvider::scripted(script));
        let calendar = Arc::new(InMemoryCalendar::new());
        let store = Arc::new(InMemoryStore::new());
        let dispatcher = Arc::new(ToolDispatcher::new(calendar.clone(), store.clone(), Arc::new(NoImages)));
        let pricing = Arc::new(PricingTable::empty());
        pricing.set("mock-model", ModelPricing::new(3.0, 15.0));
        let decision_loop = DecisionLoop::new(provider.clone(), dispatcher, pricing, "mock-model");
        Fixture {
            provider,
            calendar,
            store,
            decision_loop,
        }
    }

    fn post() -> Post {
        Post {
            id: "post-1".into(),
            title: "Join us for a ride!".into(),
            link: "https://example.com/p/1".into(),
            content: "Join us for a ride!".into(),
            author: Some("bonesaw".into()),
            published: None,
            image_urls: vec![],
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    fn ignore(done: bool) -> serde_json::Value {
        json!({"is_event": false, "confidence": 0.9, "action": "ignore",
               "reasoning": "no date given", "done": done})
    }

    fn create(title: &str, done: bool) -> serde_json::Value {
        json!({"is_event": true, "confidence": 0.9, "action": "create", "reasoning": "dated",
               "event": {"title": title, "date": "2026-01-03", "time": "14:00"}, "done": done})
    }

    fn tool_turn(calls: Vec<(&str, serde_json::Value)>) -> Result<ProviderResponse, ProviderError> {
        let calls = calls
            .into_iter()
            .enumerate()
            .map(|(i, (name, args))| make_tool_call(name, i, args))
            .collect();
        Ok(make_tool_call_response(calls, ""))
    }

    #[tokio::test]
    async fn ignore_on_first_turn_terminates() {
        let f = fixture(vec![tool_turn(vec![("submit_decision", ignore(true))])]);
        let outcome = f.decision_loop.analyze(post(), now(), false).await.unwrap();

        assert_eq!(outcome.termination, Termination::Done);
        assert_eq!(outcome.decisions.len(), 1);
        assert_eq!(outcome.decisions[0].decision.action, Action::Ignore);
        assert_eq!(outcome.turns, 1);
        assert_eq!(f.provider.call_count(), 1);
        assert_eq!(f.store.records().await.len(), 1);
    }

    #[tokio::test]
    async fn end_turn_without_decision_is_protocol_violation() {
        let f = fixture(vec![Ok(make_text_response("I think this is not an event."))]);
        let err = f.decision_loop.analyze(post(), now(), false).await.unwrap_err();

        assert!(matches!(err, AnalysisError::ProtocolViolation { .. }));
        assert_eq!(err.usage().input_tokens, 10);
        assert_eq!(err.usage().output_tokens, 5);
        assert!(f.store.records().await.is_empty());
    }

    #[tokio::test]
    async fn end_turn_after_decision_succeeds() {
        let f = fixture(vec![
            tool_turn(vec![("submit_decision", create("Ride", false))]),
            Ok(make_text_response("All done.")),
        ]);
        let outcome = f.decision_loop.analyze(post(), now(), false).await.unwrap();
        assert_eq!(outcome.termination, Termination::EndTurn);
        assert_eq!(outcome.decisions.len(), 1);
        assert_eq!(f.calendar.len().await, 1);
    }

    #[tokio::test]
    async fn usage_accumulates_across_turns_including_errors() {
        let f = fixture(vec![
            tool_turn(vec![("no_such_tool", json!({}))]),
            tool_turn(vec![("submit_decision", json!({"action": "update"}))]),
            tool_turn(vec![("submit_decision", ignore(true))]),
        ]);
        let outcome = f.decision_loop.analyze(post(), now(), false).await.unwrap();

        assert_eq!(outcome.turns, 3);
        assert_eq!(outcome.usage.input_tokens, 300);
        assert_eq!(outcome.usage.output_tokens, 60);
        let expected_cost = (300.0 * 3.0 + 60.0 * 15.0) / 1_000_000.0;
        assert!((outcome.usage.cost_usd - expected_cost).abs() < 1e-12);
    }

    #[tokio::test]
    async fn unknown_tool_error_is_fed_back() {
        let f = fixture(vec![
            tool_turn(vec![("no_such_tool", json!({}))]),
            tool_turn(vec![("submit_decision", ignore(true))]),
        ]);
        f.decision_loop.analyze(post(), now(), false).await.unwrap();

        let requests = f.provider.requests();
        let second = &requests[1];
        let results = second.messages.last().unwrap();
        assert_eq!(results.role, Role::Tool);
        assert!(results.tool_results[0].is_error);
        assert!(results.tool_results[0].summary().contains("Unknown tool: no_such_tool"));
        assert_eq!(second.messages[second.messages.len() - 2].role, Role::Assistant);
    }

    #[tokio::test]
    async fn done_decision_finishes_after_remaining_calls_in_turn() {
        let f = fixture(vec![tool_turn(vec![
            ("submit_decision", create("Ride A", false)),
            ("submit_decision", create("Ride B", true)),
            ("search_events_by_keyword", json!({"keywords": ["Ride"]})),
        ])]);
        let outcome = f.decision_loop.analyze(post(), now(), false).await.unwrap();
        assert_eq!(outcome.termination, Termination::Done);
        assert_eq!(outcome.decisions.len(), 2);
        assert_eq!(f.calendar.len().await, 2);
        assert_eq!(f.provider.call_count(), 1);
    }

    #[tokio::test]
    async fn turn_budget_without_decision_fails_with_usage() {
        let script = (0..3)
            .map(|_| tool_turn(vec![("search_events_by_keyword", json!({"keywords": ["ride"]}))]))
            .collect();
        let f = fixture(script);
        let decision_loop = f.decision_loop.with_max_turns(3);
        let err = decision_loop.analyze(post(), now(), false).await.unwrap_err();

        let AnalysisError::TurnBudgetExhausted { max_turns, usage } = err else {
            panic!("expected turn budget error, got {err:?}");
        };
        assert_eq!(max_turns, 3);
        assert_eq!(usage.input_tokens, 300);
        assert_eq!(f.provider.call_count(), 3);
    }

    #[tokio::test]
    async fn turn_budget_with_decision_keeps_it() {
        let f = fixture(vec![
            tool_turn(vec![("submit_decision", create("Ride", false))]),
            tool_turn(vec![("search_events_by_keyword", json!({"keywords": ["ride"]}))]),
        ]);
        let decision_loop = f.decision_loop.with_max_turns(2);
        let outcome = decision_loop.analyze(post(), now(), false).await.unwrap();
        assert_eq!(outcome.termination, Termination::TurnBudget);
        assert_eq!(outcome.decisions.len(), 1);
    }

    #[tokio::test]
    async fn unexpected_stop_reason_is_terminal() {
        let mut response = make_text_response("truncated");
        response.stop_reason = StopReason::MaxTokens;
        let f = fixture(vec![Ok(response)]);
        let err = f.decision_loop.analyze(post(), now(), false).await.unwrap_err();
        assert!(matches!(err, AnalysisError::UnexpectedStopReason { ref stop_reason, .. } if stop_reason == "max_tokens"));
        assert_eq!(err.usage().input_tokens, 10);
    }

    #[tokio::test]
    async fn provider_failure_carries_prior_usage() {
        let f = fixture(vec![
            tool_turn(vec![("search_events_by_keyword", json!({"keywords": ["ride"]}))]),
            Err(ProviderError::ApiError {
                status_code: 500,
                message: "overloaded".into(),
            }),
        ]);
        let err = f.decision_loop.analyze(post(), now(), false).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Provider { .. }));
        assert_eq!(err.usage().input_tokens, 100);
    }

    #[tokio::test]
    async fn dry_run_leaves_calendar_alone() {
        let f = fixture(vec![tool_turn(vec![("submit_decision", create("Ride", true))])]);
        let outcome = f.decision_loop.analyze(post(), now(), true).await.unwrap();
        assert_eq!(outcome.decisions[0].calendar_event_id, None);
        assert!(f.calendar.is_empty().await);
        assert!(f.store.records().await[0].dry_run);
    }

    #[tokio::test]
    async fn request_carries_tools_and_clock() {
        let f = fixture(vec![tool_turn(vec![("submit_decision", ignore(true))])]);
        f.decision_loop.analyze(post(), now(), false).await.unwrap();

        let request = &f.provider.requests()[0];
        assert_eq!(request.tools.len(), 4);
        assert_eq!(request.max_tokens, Some(4096));
        assert_eq!(request.messages[0].role, Role::System);
        assert!(request.messages[0].content.contains("2026-01-01 06:00"));
        assert!(request.messages[1].content.contains("This post has no images."));
    }

    #[tokio::test]
    async fn transcript_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(vec![Ok(make_text_response("nope"))]);
        let decision_loop = f
            .decision_loop
            .with_transcripts(Arc::new(FileTranscripts::new(dir.path())));
        let err = decision_loop.analyze(post(), now(), false).await.unwrap_err();
        assert!(matches!(err, AnalysisError::ProtocolViolation { .. }));

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let text = std::fs::read_to_string(entries[0].as_ref().unwrap().path()).unwrap();
        assert!(text.contains("=== TURN 1 ==="));
        assert!(text.contains("!!! ERROR !!!"));
    }

    #[tokio::test]
    async fn image_results_reach_the_model() {
        let f = fixture(vec![
            tool_turn(vec![("get_images", json!({}))]),
            tool_turn(vec![("submit_decision", ignore(true))]),
        ]);
        let mut with_images = post();
        with_images.image_urls = vec!["https://img/1.jpg".into()];
        f.decision_loop.analyze(with_images, now(), false).await.unwrap();

        let second = &f.provider.requests()[1];
        let results = &second.messages.last().unwrap().tool_results[0];
        assert_eq!(results.parts, vec![ContentPart::text("No images could be loaded.")]);
    }

    #[tokio::test]
    async fn missing_usage_counts_as_zero() {
        let mut response = make_tool_call_response(vec![make_tool_call("submit_decision", 0, ignore(true))], "");
        response.usage = None;
        let f = fixture(vec![Ok(response)]);
        let outcome = f.decision_loop.analyze(post(), now(), false).await.unwrap();
        assert_eq!(outcome.usage, UsageTotals::default());
    }
}
