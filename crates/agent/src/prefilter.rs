//! Cheap YES/NO screen run before the full decision loop.
//!
//! Fails open: only an explicit `NO` skips a post, and provider errors are
//! left to the caller to treat as "likely".

use std::sync::Arc;

use calsync_core::analysis::UsageTotals;
use calsync_core::error::ProviderError;
use calsync_core::message::Message;
use calsync_core::post::Post;
use calsync_core::provider::{Provider, ProviderRequest};
use calsync_telemetry::PricingTable;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::prompt::{prefilter_system_prompt, prefilter_user_message};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrefilterResult {
    pub is_likely_event: bool,
    pub usage: UsageTotals,
}

pub struct Prefilter {
    provider: Arc<dyn Provider>,
    pricing: Arc<PricingTable>,
    model: String,
    max_tokens: u32,
    timezone: Tz,
}

impl Prefilter {
    pub fn new(provider: Arc<dyn Provider>, pricing: Arc<PricingTable>, model: impl Into<String>) -> Self {
        Self {
            provider,
            pricing,
            model: model.into(),
            max_tokens: 8,
            timezone: chrono_tz::America::Chicago,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub async fn classify(&self, post: &Post, now: DateTime<Utc>) -> Result<PrefilterResult, ProviderError> {
        let messages = vec![
            Message::system(prefilter_system_prompt(now.with_timezone(&self.timezone))),
            Message::user(prefilter_user_message(post, self.timezone)),
        ];
        let mut request = ProviderRequest::new(&self.model, messages);
        request.max_tokens = Some(self.max_tokens);

        let response = self.provider.complete(request).await?;
        let usage = response.usage_or_default();
        let cost_usd = self
            .pricing
            .compute_cost(&self.model, usage.prompt_tokens, usage.completion_tokens);

        let answer = response.message.content;
        let is_likely_event = is_likely_event(&answer);
        if answer.trim().lines().count() > 1 || answer.trim().len() > 3 {
            warn!(post_id = %post.id, response = %answer, "Prefilter answered with extra content; using the first line");
        }
        debug!(post_id = %post.id, is_likely_event, "Prefilter verdict");

        Ok(PrefilterResult {
            is_likely_event,
            usage: UsageTotals {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                cost_usd,
            },
        })
    }
}

/// Anything but an exact `NO` on the first line counts as a possible event.
pub fn is_likely_event(answer: &str) -> bool {
    let first_line = answer.trim().lines().next().unwrap_or("").trim();
    !first_line.eq_ignore_ascii_case("NO")
}
