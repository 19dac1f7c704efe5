//! `calsync details` — Show every stored decision for one post.

use calsync_core::storage::{DecisionRecord, DecisionStore};

use crate::wiring;

pub async fn run(post_id: &str) -> anyhow::Result<()> {
    let config = wiring::load_config()?;
    let store = wiring::open_store(&config).await?;

    let records = store.records_for_post(post_id).await?;
    let Some(first) = records.first() else {
        anyhow::bail!("No record found for: {post_id}");
    };

    println!("Post:       {}", first.post_id);
    println!("Title:      {}", first.post_title.as_deref().unwrap_or("-"));
    println!("Author:     {}", first.post_author.as_deref().unwrap_or("-"));
    println!("Link:       {}", first.post_link.as_deref().unwrap_or("-"));
    println!(
        "Post time:  {}",
        first.post_time.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into())
    );

    for (i, record) in records.iter().enumerate() {
        println!();
        println!("── Decision {} of {} ──", i + 1, records.len());
        print!("{}", describe(record));
    }
    Ok(())
}

fn describe(record: &DecisionRecord) -> String {
    let mut out = String::new();
    out.push_str(&format!("Processed:  {}\n", record.processed_at.to_rfc3339()));
    out.push_str(&format!(
        "Decision:   {}{}\n",
        record.action,
        if record.dry_run { " (dry run)" } else { "" }
    ));
    if let Some(confidence) = record.confidence {
        out.push_str(&format!("Confidence: {:.0}%\n", confidence * 100.0));
    }
    out.push_str(&format!(
        "Event ID:   {}\n",
        record.calendar_event_id.as_deref().unwrap_or("-")
    ));
    if let Some(title) = &record.event_title {
        let date = record.event_date.map(|d| d.to_string()).unwrap_or_default();
        let time = record.event_time.as_deref().unwrap_or("all day");
        out.push_str(&format!("Event:      {title} on {date} {time}\n"));
        if let Some(location) = &record.event_location {
            out.push_str(&format!("Location:   {location}\n"));
        }
    }
    out.push_str(&format!(
        "Tokens:     {} in / {} out\n",
        record.input_tokens, record.output_tokens
    ));
    out.push_str(&format!("Cost:       ${:.4}\n", record.cost_usd));
    out.push_str("Reasoning:\n");
    out.push_str(record.reasoning.as_deref().unwrap_or("-"));
    out.push('\n');
    out
}
