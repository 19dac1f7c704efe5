//! Tool dispatcher — executes decoded tool calls against the calendar,
//! the store and the post's images.
//!
//! Nothing here returns a Rust error to the loop: every failure becomes a
//! [`ToolOutput`] with `is_error` set, so the model can see it and retry.

use std::sync::Arc;

use calsync_core::analysis::AnalysisContext;
use calsync_core::calendar::CalendarService;
use calsync_core::decision::{Action, Decision};
use calsync_core::message::MessageToolCall;
use calsync_core::storage::{DecisionRecord, DecisionStore};
use calsync_core::tool::ToolOutput;
use chrono::NaiveDate;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::day_of_week::validate_day_of_week;
use crate::images::{ImageFetcher, load_images};
use crate::request::{DateSearch, KeywordSearch, ToolRequest};
use crate::validate::validate_decision;

/// Workflow limits enforced on `submit_decision`.
#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    pub max_creates_per_post: usize,
    /// Non-ignore actions need `get_images` first when the post has images.
    pub require_images_before_action: bool,
    pub default_timezone: String,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            max_creates_per_post: 5,
            require_images_before_action: true,
            default_timezone: "America/Chicago".into(),
        }
    }
}

pub struct ToolDispatcher {
    calendar: Arc<dyn CalendarService>,
    store: Arc<dyn DecisionStore>,
    images: Arc<dyn ImageFetcher>,
    policy: DispatchPolicy,
}

impl ToolDispatcher {
    pub fn new(
        calendar: Arc<dyn CalendarService>,
        store: Arc<dyn DecisionStore>,
        images: Arc<dyn ImageFetcher>,
    ) -> Self {
        Self {
            calendar,
            store,
            images,
            policy: DispatchPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: DispatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &DispatchPolicy {
        &self.policy
    }

    /// Execute one tool call against the post's context.
    pub async fn dispatch(&self, call: &MessageToolCall, ctx: &mut AnalysisContext) -> ToolOutput {
        let request = match ToolRequest::decode(call) {
            Ok(request) => request,
            Err(e) => {
                debug!(tool = %call.name, error = %e, "Rejected tool call");
                return ToolOutput::error(e.to_string());
            }
        };

        debug!(tool = request.name(), call_id = %call.id, "Dispatching tool call");
        match request {
            ToolRequest::GetImages => self.get_images(ctx).await,
            ToolRequest::SearchByDate(search) => self.search_by_date(search).await,
            ToolRequest::SearchByKeyword(search) => self.search_by_keyword(search).await,
            ToolRequest::SubmitDecision(payload) => self.submit_decision(&payload, ctx).await,
        }
    }

    async fn get_images(&self, ctx: &mut AnalysisContext) -> ToolOutput {
        let urls = ctx.post().considered_images().to_vec();
        let output = load_images(self.images.as_ref(), &urls).await;
        ctx.mark_images_inspected();
        output
    }

    async fn search_by_date(&self, search: DateSearch) -> ToolOutput {
        if let Some(day) = search.day_of_week.as_deref() {
            if let Some(message) = validate_day_of_week(&search.start_date, day) {
                return ToolOutput::error(message);
            }
        }

        let (start, end) = match (parse_date(&search.start_date), parse_date(&search.end_date)) {
            (Some(start), Some(end)) => (start, end),
            (start, end) => {
                let mut details = Vec::new();
                if start.is_none() {
                    details.push("start_date: expected a date in YYYY-MM-DD format".to_string());
                }
                if end.is_none() {
                    details.push("end_date: expected a date in YYYY-MM-DD format".to_string());
                }
                return ToolOutput::error_with_details("Invalid arguments", &details);
            }
        };
        if end < start {
            return ToolOutput::error(format!("end_date {end} is before start_date {start}"));
        }

        match self.calendar.search_by_date(start, end).await {
            Ok(events) => {
                debug!(%start, %end, found = events.len(), "Date search");
                ToolOutput::json(&Value::Array(events.iter().map(|e| e.projection()).collect()))
            }
            Err(e) => ToolOutput::error(format!("Calendar search failed: {e}")),
        }
    }

    async fn search_by_keyword(&self, search: KeywordSearch) -> ToolOutput {
        if search.keywords.iter().all(|k| k.trim().is_empty()) {
            return ToolOutput::error("keywords must contain at least one non-empty string");
        }

        match self.calendar.search_by_keyword(&search.keywords).await {
            Ok(events) => {
                debug!(keywords = ?search.keywords, found = events.len(), "Keyword search");
                ToolOutput::json(&Value::Array(events.iter().map(|e| e.projection()).collect()))
            }
            Err(e) => ToolOutput::error(format!("Calendar search failed: {e}")),
        }
    }

    async fn submit_decision(&self, payload: &Value, ctx: &mut AnalysisContext) -> ToolOutput {
        let decision = match validate_decision(payload, &self.policy.default_timezone) {
            Ok(decision) => decision,
            Err(failure) => return failure.into_output(),
        };

        if let Some(violation) = self.workflow_violation(&decision, ctx) {
            return ToolOutput::error(violation);
        }

        let calendar_event_id = if ctx.dry_run() {
            None
        } else {
            match self.execute(&decision).await {
                Ok(id) => id,
                Err(message) => return ToolOutput::error(message),
            }
        };

        let record = DecisionRecord::from_decision(
            ctx.post(),
            &decision,
            calendar_event_id.clone(),
            ctx.usage(),
            ctx.dry_run(),
        );
        let warning = match self.store.record(record).await {
            Ok(()) => None,
            Err(e) => {
                warn!(post_id = %ctx.post().id, action = %decision.action, error = %e, "Failed to record decision");
                Some(format!("Decision was applied but could not be recorded: {e}"))
            }
        };

        info!(
            post_id = %ctx.post().id,
            action = %decision.action,
            calendar_event_id = calendar_event_id.as_deref().unwrap_or("-"),
            dry_run = ctx.dry_run(),
            "Decision accepted"
        );

        let action = decision.action;
        let done = decision.done;
        ctx.record_decision(decision, calendar_event_id.clone());

        let mut result = json!({
            "success": true,
            "action": action.as_str(),
            "calendar_event_id": calendar_event_id,
            "done": done,
            "decisions_recorded": ctx.ledger().len(),
        });
        if let Some(warning) = warning {
            result["warning"] = Value::String(warning);
        }

        let output = ToolOutput::json(&result);
        if done { output.finishing() } else { output }
    }

    fn workflow_violation(&self, decision: &Decision, ctx: &AnalysisContext) -> Option<String> {
        let action = decision.action;
        if self.policy.require_images_before_action
            && action.needs_image_review()
            && ctx.post().has_images()
            && !ctx.images_inspected()
        {
            return Some(format!(
                "You must call get_images before submitting a '{action}' decision for a post with images."
            ));
        }

        if action == Action::Create && ctx.ledger().count(Action::Create) >= self.policy.max_creates_per_post {
            return Some(format!(
                "At most {} events may be created per post; this post already has {}.",
                self.policy.max_creates_per_post,
                ctx.ledger().count(Action::Create)
            ));
        }

        None
    }

    /// Apply the decision to the calendar. Returns the affected event id.
    async fn execute(&self, decision: &Decision) -> Result<Option<String>, String> {
        let action = decision.action;
        let failed = |e: calsync_core::CalendarError| format!("Calendar {action} failed: {e}");

        match (action, decision.event.as_ref(), decision.related_event_id.as_deref()) {
            (Action::Create, Some(event), _) => self.calendar.create(event).await.map(Some).map_err(failed),
            (Action::Update, Some(event), Some(id)) => {
                self.calendar.update(id, event).await.map(Some).map_err(failed)
            }
            (Action::Cancel, _, Some(id)) => {
                self.calendar.delete(id).await.map_err(failed)?;
                Ok(Some(id.to_string()))
            }
            (Action::Ignore | Action::FlagForReview, _, _) => Ok(None),
            // Validation guarantees the fields each mutating action needs.
            _ => Err(format!("Decision for '{action}' is missing required fields")),
        }
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::day_of_week::weekday_name;
    use crate::images::test_support::{PNG, StaticImages};
    use calsync_calendar::InMemoryCalendar;
    use calsync_core::event::{CalendarEvent, EventTime};
    use calsync_core::message::ContentPart;
    use calsync_core::post::Post;
    use calsync_store::InMemoryStore;
    use chrono::Datelike;

    struct Harness {
        calendar: Arc<InMemoryCalendar>,
        store: Arc<InMemoryStore>,
        images: Arc<StaticImages>,
        dispatcher: ToolDispatcher,
    }

    fn harness() -> Harness {
        let calendar = Arc::new(InMemoryCalendar::new());
        let store = Arc::new(InMemoryStore::new());
        let images = Arc::new(StaticImages::default().with("https://img/1.png", PNG));
        let dispatcher = ToolDispatcher::new(calendar.clone(), store.clone(), images.clone());
        Harness {
            calendar,
            store,
            images,
            dispatcher,
        }
    }

    fn post(image_urls: Vec<&str>) -> Post {
        Post {
            id: "post-1".into(),
            title: "Saturday ride".into(),
            link: "https://example.com/p/1".into(),
            content: "Ride Saturday at 2pm".into(),
            author: None,
            published: None,
            image_urls: image_urls.into_iter().map(String::from).collect(),
        }
    }

    fn call(name: &str, args: Value) -> MessageToolCall {
        MessageToolCall {
            id: "toolu_1".into(),
            name: name.into(),
            arguments: args.to_string(),
        }
    }

    fn body(out: &ToolOutput) -> Value {
        let ContentPart::Text { text } = &out.parts[0] else {
            panic!("expected text part");
        };
        serde_json::from_str(text).unwrap()
    }

    fn create_args(done: bool) -> Value {
        json!({
            "is_event": true, "confidence": 0.9, "action": "create", "reasoning": "flyer",
            "event": {"title": "Social ride", "date": "2026-01-03", "time": "14:00"},
            "done": done
        })
    }

    #[tokio::test]
    async fn unknown_tool_is_structured_error() {
        let h = harness();
        let mut ctx = AnalysisContext::new(post(vec![]), false);
        let out = h.dispatcher.dispatch(&call("rm_rf", json!({})), &mut ctx).await;
        assert!(out.is_error);
        assert_eq!(body(&out)["error"], "Unknown tool: rm_rf");
    }

    #[tokio::test]
    async fn ignore_allowed_without_any_prior_calls() {
        let h = harness();
        let mut ctx = AnalysisContext::new(post(vec!["https://img/1.png"]), false);
        let out = h
            .dispatcher
            .dispatch(
                &call(
                    "submit_decision",
                    json!({"is_event": false, "confidence": 0.9, "action": "ignore",
                           "reasoning": "no date", "done": true}),
                ),
                &mut ctx,
            )
            .await;
        assert!(!out.is_error, "{:?}", out);
        assert!(out.finished);
        assert_eq!(ctx.ledger().len(), 1);
        assert_eq!(h.store.records().await.len(), 1);
        assert!(h.images.requested().is_empty());
    }

    #[tokio::test]
    async fn create_requires_images_first_when_post_has_images() {
        let h = harness();
        let mut ctx = AnalysisContext::new(post(vec!["https://img/1.png"]), false);

        let out = h.dispatcher.dispatch(&call("submit_decision", create_args(true)), &mut ctx).await;
        assert!(out.is_error);
        assert!(body(&out)["error"].as_str().unwrap().contains("get_images"));
        assert!(ctx.ledger().is_empty());
        assert!(h.calendar.is_empty().await);

        let images = h.dispatcher.dispatch(&call("get_images", json!({})), &mut ctx).await;
        assert_eq!(images.parts[0], ContentPart::text("Loaded 1 image(s)."));

        let out = h.dispatcher.dispatch(&call("submit_decision", create_args(true)), &mut ctx).await;
        assert!(!out.is_error);
        let result = body(&out);
        assert_eq!(result["success"], true);
        assert_eq!(result["action"], "create");
        assert_eq!(result["done"], true);
        assert_eq!(result["decisions_recorded"], 1);
        let id = result["calendar_event_id"].as_str().unwrap();
        assert!(h.calendar.get(id).await.is_some());
    }

    #[tokio::test]
    async fn create_without_images_on_imageless_post() {
        let h = harness();
        let mut ctx = AnalysisContext::new(post(vec![]), false);
        let out = h.dispatcher.dispatch(&call("submit_decision", create_args(false)), &mut ctx).await;
        assert!(!out.is_error);
        assert!(!out.finished);
    }

    #[tokio::test]
    async fn at_most_five_creates_per_post() {
        let h = harness();
        let mut ctx = AnalysisContext::new(post(vec![]), false);
        for _ in 0..5 {
            let out = h.dispatcher.dispatch(&call("submit_decision", create_args(false)), &mut ctx).await;
            assert!(!out.is_error);
        }
        let out = h.dispatcher.dispatch(&call("submit_decision", create_args(true)), &mut ctx).await;
        assert!(out.is_error);
        assert_eq!(ctx.ledger().count(Action::Create), 5);
        assert_eq!(h.calendar.len().await, 5);
    }

    #[tokio::test]
    async fn cancel_echoes_related_id() {
        let h = harness();
        h.calendar
            .insert(CalendarEvent {
                id: "evt-42".into(),
                title: "Ride".into(),
                start: EventTime::AllDay(NaiveDate::from_ymd_opt(2026, 1, 3).unwrap()),
                end: None,
                location: None,
                description: None,
            })
            .await;
        let mut ctx = AnalysisContext::new(post(vec![]), false);
        let out = h
            .dispatcher
            .dispatch(
                &call(
                    "submit_decision",
                    json!({"is_event": true, "confidence": 0.9, "action": "cancel",
                           "reasoning": "called off", "related_event_id": "evt-42", "done": true}),
                ),
                &mut ctx,
            )
            .await;
        assert_eq!(body(&out)["calendar_event_id"], "evt-42");
        assert!(h.calendar.is_empty().await);
        assert_eq!(ctx.ledger().last().unwrap().calendar_event_id.as_deref(), Some("evt-42"));
    }

    #[tokio::test]
    async fn update_without_related_id_never_creates() {
        let h = harness();
        let mut ctx = AnalysisContext::new(post(vec![]), false);
        let out = h
            .dispatcher
            .dispatch(
                &call(
                    "submit_decision",
                    json!({"is_event": true, "confidence": 0.9, "action": "update", "reasoning": "moved",
                           "event": {"title": "Ride", "date": "2026-01-10"}, "done": true}),
                ),
                &mut ctx,
            )
            .await;
        assert!(out.is_error);
        assert_eq!(body(&out)["error"], "Validation failed");
        assert!(h.calendar.is_empty().await);
        assert!(h.store.records().await.is_empty());
    }

    #[tokio::test]
    async fn weekday_mismatch_is_returned_to_model() {
        let h = harness();
        let mut ctx = AnalysisContext::new(post(vec![]), false);
        let mut args = create_args(true);
        args["event"]["day_of_week"] = json!("Sunday");
        let out = h.dispatcher.dispatch(&call("submit_decision", args), &mut ctx).await;
        assert!(out.is_error);
        let error = body(&out)["error"].as_str().unwrap().to_string();
        assert!(error.contains("is a Saturday, not a Sunday"));
        assert!(error.contains("2025-12-28") && error.contains("2026-01-04"));
    }

    #[tokio::test]
    async fn dry_run_records_without_touching_calendar() {
        let h = harness();
        let mut ctx = AnalysisContext::new(post(vec![]), true);
        let out = h.dispatcher.dispatch(&call("submit_decision", create_args(true)), &mut ctx).await;
        assert!(!out.is_error);
        assert_eq!(body(&out)["calendar_event_id"], Value::Null);
        assert!(h.calendar.is_empty().await);
        let records = h.store.records().await;
        assert_eq!(records.len(), 1);
        assert!(records[0].dry_run);
    }

    #[tokio::test]
    async fn flag_for_review_also_requires_images_first() {
        let h = harness();
        let mut ctx = AnalysisContext::new(post(vec!["https://img/1.png"]), false);
        let flag = json!({"is_event": false, "confidence": 0.5, "action": "flag_for_review",
                          "reasoning": "unclear", "done": true});

        let out = h.dispatcher.dispatch(&call("submit_decision", flag.clone()), &mut ctx).await;
        assert!(out.is_error);
        assert!(body(&out)["error"].as_str().unwrap().contains("'flag_for_review'"));
        assert!(ctx.ledger().is_empty());

        h.dispatcher.dispatch(&call("get_images", json!({})), &mut ctx).await;
        let out = h.dispatcher.dispatch(&call("submit_decision", flag), &mut ctx).await;
        assert!(!out.is_error, "{:?}", out);
    }

    #[tokio::test]
    async fn extreme_dates_come_back_as_tool_errors() {
        let h = harness();
        let mut ctx = AnalysisContext::new(post(vec![]), false);

        let mut args = create_args(true);
        args["event"]["date"] = json!("+262142-12-31");
        args["event"]["time"] = json!("23:00");
        let out = h.dispatcher.dispatch(&call("submit_decision", args), &mut ctx).await;
        assert!(out.is_error);
        assert_eq!(body(&out)["details"][0], "event.date: out of range (years 1 to 9999)");
        assert!(h.calendar.is_empty().await);

        for edge in [NaiveDate::MIN, NaiveDate::MAX] {
            let claimed = weekday_name(edge.weekday().succ());
            let out = h
                .dispatcher
                .dispatch(
                    &call(
                        "search_events_by_date",
                        json!({"start_date": edge.to_string(), "end_date": edge.to_string(), "day_of_week": claimed}),
                    ),
                    &mut ctx,
                )
                .await;
            assert!(out.is_error);
            assert!(body(&out)["error"].as_str().unwrap().contains(&format!("not a {claimed}")));
        }
        assert!(ctx.ledger().is_empty());
    }

    #[tokio::test]
    async fn calendar_failure_records_nothing() {
        let h = harness();
        h.calendar.set_failing(true);
        let mut ctx = AnalysisContext::new(post(vec![]), false);
        let out = h.dispatcher.dispatch(&call("submit_decision", create_args(true)), &mut ctx).await;
        assert!(out.is_error);
        assert!(body(&out)["error"].as_str().unwrap().starts_with("Calendar create failed"));
        assert!(ctx.ledger().is_empty());
        assert!(h.store.records().await.is_empty());
    }

    #[tokio::test]
    async fn store_failure_is_a_warning() {
        let h = harness();
        h.store.set_failing(true);
        let mut ctx = AnalysisContext::new(post(vec![]), false);
        let out = h.dispatcher.dispatch(&call("submit_decision", create_args(true)), &mut ctx).await;
        assert!(!out.is_error);
        assert!(out.finished);
        assert!(body(&out)["warning"].as_str().is_some());
        assert_eq!(ctx.ledger().len(), 1);
        assert_eq!(h.calendar.len().await, 1);
    }

    #[tokio::test]
    async fn date_search_projects_events() {
        let h = harness();
        let mut ctx = AnalysisContext::new(post(vec![]), false);
        h.dispatcher.dispatch(&call("submit_decision", create_args(false)), &mut ctx).await;

        let out = h
            .dispatcher
            .dispatch(
                &call(
                    "search_events_by_date",
                    json!({"start_date": "2026-01-03", "end_date": "2026-01-03", "day_of_week": "Saturday"}),
                ),
                &mut ctx,
            )
            .await;
        let found = body(&out);
        assert_eq!(found.as_array().unwrap().len(), 1);
        assert_eq!(found[0]["title"], "Social ride");
        assert!(found[0].get("location").is_some());
    }

    #[tokio::test]
    async fn date_search_rejects_bad_ranges() {
        let h = harness();
        let mut ctx = AnalysisContext::new(post(vec![]), false);

        let reversed = h
            .dispatcher
            .dispatch(
                &call("search_events_by_date", json!({"start_date": "2026-01-05", "end_date": "2026-01-03"})),
                &mut ctx,
            )
            .await;
        assert!(reversed.is_error);

        let wrong_day = h
            .dispatcher
            .dispatch(
                &call(
                    "search_events_by_date",
                    json!({"start_date": "2026-01-03", "end_date": "2026-01-03", "day_of_week": "Friday"}),
                ),
                &mut ctx,
            )
            .await;
        assert!(body(&wrong_day)["error"].as_str().unwrap().contains("not a Friday"));

        let malformed = h
            .dispatcher
            .dispatch(&call("search_events_by_date", json!({"start_date": "soon", "end_date": "later"})), &mut ctx)
            .await;
        assert_eq!(body(&malformed)["details"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn keyword_search_rejects_blank_keywords() {
        let h = harness();
        let mut ctx = AnalysisContext::new(post(vec![]), false);
        let out = h
            .dispatcher
            .dispatch(&call("search_events_by_keyword", json!({"keywords": ["  "]})), &mut ctx)
            .await;
        assert!(out.is_error);

        let out = h
            .dispatcher
            .dispatch(&call("search_events_by_keyword", json!({"keywords": ["ride"]})), &mut ctx)
            .await;
        assert!(!out.is_error);
        assert_eq!(body(&out), json!([]));
    }

    #[tokio::test]
    async fn get_images_considers_first_five_only() {
        let h = harness();
        let urls: Vec<String> = (0..7).map(|i| format!("https://img/{i}.png")).collect();
        let mut ctx = AnalysisContext::new(post(urls.iter().map(String::as_str).collect()), false);
        h.dispatcher.dispatch(&call("get_images", json!({})), &mut ctx).await;
        assert_eq!(h.images.requested().len(), 5);
        assert!(ctx.images_inspected());
    }
}
