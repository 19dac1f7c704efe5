//! `calsync history` — Show recent decisions.

use calsync_core::storage::{DecisionRecord, DecisionStore};

use crate::wiring;

pub async fn run(limit: usize) -> anyhow::Result<()> {
    let config = wiring::load_config()?;
    let store = wiring::open_store(&config).await?;

    let records = store.history(limit).await?;
    if records.is_empty() {
        println!("No history yet");
        return Ok(());
    }

    println!("📜 Processing History");
    println!("{}", header());
    for record in &records {
        println!("{}", row(record));
    }
    println!();
    println!("Total cost: ${:.4}", store.total_cost().await?);
    Ok(())
}

fn header() -> String {
    format!(
        "{:<19}  {:<24}  {:<40}  {:<16}  {:<15}  {:<26}  {:>8}",
        "Time", "Post", "Title", "Author", "Decision", "Event ID", "Cost"
    )
}

fn row(record: &DecisionRecord) -> String {
    let cost = if record.cost_usd > 0.0 {
        format!("${:.4}", record.cost_usd)
    } else {
        "-".into()
    };
    format!(
        "{:<19}  {:<24}  {:<40}  {:<16}  {:<15}  {:<26}  {:>8}",
        record.processed_at.format("%Y-%m-%d %H:%M:%S"),
        clip(&record.post_id, 24),
        clip(record.post_title.as_deref().unwrap_or("-"), 40),
        clip(record.post_author.as_deref().unwrap_or("-"), 16),
        record.action.as_str(),
        clip(record.calendar_event_id.as_deref().unwrap_or("-"), 26),
        cost,
    )
}

/// Cut to `width` characters, marking the cut with `…`.
pub(crate) fn clip(text: &str, width: usize) -> String {
    let text = text.replace('\n', " ");
    if text.chars().count() <= width {
        return text;
    }
    let mut clipped: String = text.chars().take(width.saturating_sub(1)).collect();
    clipped.push('…');
    clipped
}
