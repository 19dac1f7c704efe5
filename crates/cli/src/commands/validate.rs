//! `calsync validate` — Check calendar credentials, read and write access.

use std::time::Duration;

use anyhow::Context;
use calsync_core::calendar::CalendarService;
use calsync_core::event::EventDetails;
use chrono::{NaiveDate, NaiveTime, Utc};

use crate::wiring;

const UPCOMING_DAYS: i64 = 30;
const UPCOMING_SHOWN: usize = 5;

pub async fn run() -> anyhow::Result<()> {
    let config = wiring::load_config()?;
    println!("🔑 Validating calendar access...");
    println!();

    match &config.calendar.credentials_path {
        Some(path) if path.exists() => println!("  ✅ Credentials file: {}", path.display()),
        Some(path) => anyhow::bail!("Credentials file not found: {}", path.display()),
        None => anyhow::bail!("No credentials configured. Set CAL_CREDS_PATH or calendar.credentials_path"),
    }

    let client = wiring::http_client(Duration::from_secs(30))?;
    let calendar = wiring::calendar(&config, client)?;
    println!("  Calendar ID: {}", calendar.calendar_id());

    let metadata = calendar.metadata().await.context("Failed to access calendar")?;
    println!("  ✅ Authentication OK");
    println!("  ✅ Calendar name: {}", metadata.summary.as_deref().unwrap_or("Unnamed"));
    println!("  ✅ Timezone: {}", metadata.time_zone.as_deref().unwrap_or("Unknown"));

    println!();
    println!("Testing write permissions...");
    let event_id = calendar.create(&probe_event(&config.calendar.timezone)).await.context("Write test failed")?;
    println!("  ✅ Created test event {event_id}");
    calendar.delete(&event_id).await.context("Failed to delete test event")?;
    println!("  ✅ Deleted test event");

    let today = Utc::now().date_naive();
    match calendar
        .search_by_date(today, today + chrono::Duration::days(UPCOMING_DAYS))
        .await
    {
        Ok(events) => {
            println!();
            println!("Upcoming events (next {UPCOMING_DAYS} days): {}", events.len());
            for event in events.iter().take(UPCOMING_SHOWN) {
                println!("  - {} {}", event.start, event.title);
            }
            if events.len() > UPCOMING_SHOWN {
                println!("  ...and {} more", events.len() - UPCOMING_SHOWN);
            }
        }
        Err(e) => println!("  ⚠️  Could not list events: {e}"),
    }

    println!();
    println!("🎉 Calendar access validated successfully!");
    Ok(())
}

/// A timed event far in the past, created and deleted to prove write access.
fn probe_event(timezone: &str) -> EventDetails {
    EventDetails {
        title: "[TEST] calsync validation".into(),
        date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default(),
        time: NaiveTime::from_hms_opt(12, 0, 0),
        end_time: None,
        timezone: timezone.to_string(),
        location: None,
        description: Some("Created to test write permissions; deleted immediately.".into()),
    }
}
