//! `calsync process` — Analyze new feed posts and sync the calendar.

use std::collections::HashMap;
use std::time::Duration;

use calsync_agent::PostOutcome;
use calsync_core::error::StoreError;
use calsync_core::post::Post;
use calsync_core::storage::DecisionStore;
use chrono::Utc;

use crate::wiring;

pub struct ProcessOptions {
    pub feed: Option<String>,
    pub dry_run: bool,
    pub limit: Option<usize>,
    pub concurrency: usize,
    pub skip_prefilter: bool,
}

pub async fn run(options: ProcessOptions) -> anyhow::Result<()> {
    let config = wiring::load_config()?;
    let store = wiring::open_store(&config).await?;

    let feed_url = options.feed.unwrap_or_else(|| config.feed.url.clone());
    println!("📡 Fetching feed: {feed_url}");
    let client = wiring::http_client(Duration::from_secs(config.feed.timeout_secs))?;
    let posts = calsync_feed::fetch_feed(&client, &feed_url, Duration::from_secs(config.feed.timeout_secs)).await?;
    println!("  Found {} posts in feed", posts.len());

    let pending = select_unprocessed(posts, store.as_ref(), options.limit).await?;
    if pending.is_empty() {
        println!("  Nothing to process");
        return Ok(());
    }
    println!("  {} unprocessed post(s)", pending.len());
    if options.dry_run {
        println!("  (dry run: the calendar will not be changed)");
    }

    let titles: HashMap<String, String> = pending.iter().map(|p| (p.id.clone(), p.title.clone())).collect();
    let processor = wiring::processor(&config, store.clone(), options.skip_prefilter)?;
    let (outcomes, summary) = processor
        .process_batch(pending, Utc::now(), options.dry_run, options.concurrency)
        .await;

    for outcome in &outcomes {
        let title = titles.get(outcome.post_id()).map(String::as_str).unwrap_or("-");
        print_outcome(title, outcome);
    }

    println!();
    println!(
        "Processed {} post(s): {} analyzed, {} prefiltered, {} failed",
        summary.posts, summary.succeeded, summary.prefiltered, summary.failed
    );
    println!("Total cost:      ${:.4}", summary.cost_usd);
    println!("Cumulative cost: ${:.4}", store.total_cost().await?);
    Ok(())
}

/// Posts with no stored row, oldest first, capped at `limit`.
async fn select_unprocessed(
    posts: Vec<Post>,
    store: &dyn DecisionStore,
    limit: Option<usize>,
) -> Result<Vec<Post>, StoreError> {
    let mut pending = Vec::new();
    for post in posts {
        if !store.is_processed(&post.id).await? {
            pending.push(post);
        }
    }
    // Undated posts sort first.
    pending.sort_by_key(|p| p.published);
    if let Some(limit) = limit {
        pending.truncate(limit);
    }
    Ok(pending)
}

fn print_outcome(title: &str, outcome: &PostOutcome) {
    println!();
    println!("▶ {}", truncate(title, 60));
    match outcome {
        PostOutcome::Prefiltered { usage, .. } => {
            println!("  Skipped by prefilter: not an event");
            println!("  Tokens: {usage}");
        }
        PostOutcome::Analyzed { outcome: analysis, .. } => {
            for entry in &analysis.decisions {
                let decision = &entry.decision;
                println!(
                    "  Decision: {} (confidence: {:.0}%)",
                    decision.action,
                    decision.confidence * 100.0
                );
                println!("    {}", decision.reasoning);
                if let Some(event) = &decision.event {
                    println!("    Event: {}", event.title);
                    println!(
                        "    Date:  {} {}",
                        event.date,
                        event.time_display().unwrap_or_else(|| "all day".into())
                    );
                    if let Some(location) = &event.location {
                        println!("    Location: {location}");
                    }
                }
                if let Some(id) = &entry.calendar_event_id {
                    println!("    Calendar event: {id}");
                }
            }
            println!("  Tokens: {}", outcome.usage());
            if let Some(path) = &analysis.log_path {
                println!("  Log: {}", path.display());
            }
        }
        PostOutcome::Failed { error, .. } => {
            println!("  ❌ Error: {error}");
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...")
    }
}
