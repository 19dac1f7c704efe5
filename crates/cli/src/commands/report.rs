//! `calsync report` — Write a static HTML report of recent decisions.

use std::path::Path;

use calsync_core::storage::DecisionStore;
use chrono::Utc;

use crate::report::{ReportOptions, render};
use crate::wiring;

pub async fn run(output: &Path, limit: usize) -> anyhow::Result<()> {
    let config = wiring::load_config()?;
    let store = wiring::open_store(&config).await?;

    let records = store.history(limit).await?;
    if records.is_empty() {
        println!("No history to report");
        return Ok(());
    }

    let options = ReportOptions {
        timezone: wiring::timezone(&config)?,
        calendar_id: config.calendar.calendar_id.as_deref(),
        generated_at: Utc::now(),
    };
    let html = render(&records, store.total_cost().await?, &options)?;
    std::fs::write(output, html)?;

    println!("Report written to: {} ({} entries)", output.display(), records.len());
    Ok(())
}
