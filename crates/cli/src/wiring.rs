//! Builds the runtime pieces from `AppConfig`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use calsync_agent::{DecisionLoop, FileTranscripts, Prefilter, PostProcessor};
use calsync_calendar::{GoogleCalendar, ServiceAccountAuth, ServiceAccountKey};
use calsync_config::AppConfig;
use calsync_core::provider::Provider;
use calsync_providers::{AnthropicProvider, RetryProvider};
use calsync_store::SqliteStore;
use calsync_telemetry::{ModelPricing, PricingTable};
use calsync_tools::{DispatchPolicy, HttpImageFetcher, ToolDispatcher};
use chrono_tz::Tz;

pub fn load_config() -> anyhow::Result<AppConfig> {
    AppConfig::load().context("Failed to load config")
}

pub fn timezone(config: &AppConfig) -> anyhow::Result<Tz> {
    config
        .calendar
        .timezone
        .parse()
        .map_err(|_| anyhow::anyhow!("Unknown timezone '{}'", config.calendar.timezone))
}

/// Built-in prices overlaid with `[pricing."<model>"]` entries.
pub fn pricing(config: &AppConfig) -> Arc<PricingTable> {
    Arc::new(PricingTable::with_overrides(config.pricing.iter().map(|(model, price)| {
        (model.as_str(), ModelPricing::new(price.input_per_m, price.output_per_m))
    })))
}

pub async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<SqliteStore>> {
    let path = config.db_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
    }
    let store = SqliteStore::new(&sqlite_url(&path))
        .await
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    Ok(Arc::new(store))
}

fn sqlite_url(path: &Path) -> String {
    format!("sqlite://{}", path.display())
}

pub fn http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

pub fn calendar(config: &AppConfig, client: reqwest::Client) -> anyhow::Result<GoogleCalendar> {
    let Some(calendar_id) = config.calendar.calendar_id.clone() else {
        bail!("No calendar configured. Set CALENDAR_ID or calendar.calendar_id in the config file");
    };
    let Some(creds) = &config.calendar.credentials_path else {
        bail!("No service-account credentials configured. Set CAL_CREDS_PATH or calendar.credentials_path");
    };

    let key = ServiceAccountKey::from_file(creds)
        .with_context(|| format!("Failed to read credentials from {}", creds.display()))?;
    let auth = Arc::new(ServiceAccountAuth::new(key, client.clone()));

    Ok(GoogleCalendar::new(calendar_id, client, auth)
        .with_default_duration(chrono::Duration::hours(i64::from(config.calendar.default_duration_hours)))
        .with_keyword_window(chrono::Duration::days(i64::from(config.calendar.keyword_search_days))))
}

pub fn provider(config: &AppConfig) -> anyhow::Result<Arc<dyn Provider>> {
    let Some(api_key) = config.anthropic.api_key.clone() else {
        bail!(
            "No API key configured. Set ANTHROPIC_API_KEY or anthropic.api_key in {}",
            AppConfig::config_dir().join("config.toml").display()
        );
    };
    let anthropic = AnthropicProvider::new(api_key, Duration::from_secs(config.anthropic.timeout_secs))?
        .with_base_url(&config.anthropic.base_url);
    Ok(Arc::new(RetryProvider::new(Arc::new(anthropic))))
}

/// Everything `process` needs, wired from the config.
pub fn processor(
    config: &AppConfig,
    store: Arc<SqliteStore>,
    skip_prefilter: bool,
) -> anyhow::Result<PostProcessor> {
    let tz = timezone(config)?;
    let pricing = pricing(config);
    let provider = provider(config)?;
    let client = http_client(Duration::from_secs(config.anthropic.timeout_secs))?;

    let calendar = Arc::new(calendar(config, client.clone())?);
    let images = Arc::new(HttpImageFetcher::new(client).with_timeout(Duration::from_secs(config.feed.timeout_secs)));
    let policy = DispatchPolicy {
        max_creates_per_post: config.agent.max_creates_per_post,
        require_images_before_action: config.agent.require_images_before_action,
        default_timezone: config.calendar.timezone.clone(),
    };
    let dispatcher = Arc::new(ToolDispatcher::new(calendar, store.clone(), images).with_policy(policy));

    let decision_loop = DecisionLoop::new(provider.clone(), dispatcher, pricing.clone(), &config.anthropic.model)
        .with_max_tokens(config.anthropic.max_tokens)
        .with_max_turns(config.agent.max_turns)
        .with_timezone(tz)
        .with_transcripts(Arc::new(FileTranscripts::new(config.session_log_dir())));

    let mut processor = PostProcessor::new(decision_loop, store);
    if config.prefilter.enabled && !skip_prefilter {
        let prefilter = Prefilter::new(provider, pricing, &config.prefilter.model)
            .with_max_tokens(config.prefilter.max_tokens)
            .with_timezone(tz);
        processor = processor.with_prefilter(prefilter);
    }
    Ok(processor)
}
