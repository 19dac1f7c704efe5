//! Static HTML report of processing history.
//!
//! Records are grouped under day headings by the post's publish time in the
//! configured zone. Everything is escaped by the template.

use askama::Template;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use calsync_core::decision::Action;
use calsync_core::storage::DecisionRecord;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

const UNKNOWN_DAY: &str = "Unknown Date";

pub struct ReportCard {
    pub title: String,
    pub link: String,
    pub action: &'static str,
    pub color: &'static str,
    pub thumbnail: String,
    pub has_event: bool,
    pub event_title: String,
    pub event_when: String,
    pub event_location: String,
    pub event_url: String,
    pub reasoning: String,
    pub author: String,
    pub post_id: String,
    pub event_id: String,
    pub post_time: String,
    pub processed: String,
    pub tokens: String,
    pub cost: String,
}

pub struct DayGroup {
    pub label: String,
    pub cards: Vec<ReportCard>,
}

#[derive(Template)]
#[template(path = "report.html")]
pub struct ReportTemplate<'a> {
    pub days: &'a [DayGroup],
    pub entry_count: usize,
    pub total_cost: String,
    pub generated: String,
}

pub struct ReportOptions<'a> {
    pub timezone: Tz,
    /// Needed to link events to the Google Calendar web UI.
    pub calendar_id: Option<&'a str>,
    pub generated_at: DateTime<Utc>,
}

fn badge_color(action: Action) -> &'static str {
    match action {
        Action::Create => "#22c55e",
        Action::Update => "#3b82f6",
        Action::Cancel => "#ef4444",
        Action::Ignore => "#9ca3af",
        Action::FlagForReview => "#eab308",
    }
}

/// Web UI link for an event: the `eid` is base64 of `"<event id> <calendar id>"`.
pub fn event_url(event_id: &str, calendar_id: &str) -> String {
    let eid = STANDARD.encode(format!("{event_id} {calendar_id}"));
    format!("https://www.google.com/calendar/event?eid={eid}")
}

fn local_time(ts: Option<DateTime<Utc>>, tz: Tz) -> String {
    ts.map(|t| t.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z").to_string())
        .unwrap_or_else(|| "-".into())
}

fn day_label(ts: Option<DateTime<Utc>>, tz: Tz) -> String {
    ts.map(|t| t.with_timezone(&tz).format("%A %b %-d").to_string())
        .unwrap_or_else(|| UNKNOWN_DAY.into())
}

fn card(record: &DecisionRecord, options: &ReportOptions<'_>) -> ReportCard {
    let event_id = record.calendar_event_id.clone().unwrap_or_default();
    let event_url = match options.calendar_id {
        Some(calendar_id) if !event_id.is_empty() => event_url(&event_id, calendar_id),
        _ => String::new(),
    };
    let event_when = match (&record.event_date, &record.event_time) {
        (Some(date), Some(time)) => format!("{date} at {time}"),
        (Some(date), None) => date.to_string(),
        _ => String::new(),
    };
    let thumbnail = record
        .post_content
        .as_deref()
        .map(calsync_feed::extract_image_urls)
        .and_then(|urls| urls.into_iter().next())
        .unwrap_or_default();

    ReportCard {
        title: record.post_title.clone().unwrap_or_else(|| "-".into()),
        link: record.post_link.clone().unwrap_or_default(),
        action: record.action.as_str(),
        color: badge_color(record.action),
        thumbnail,
        has_event: record.event_title.is_some(),
        event_title: record.event_title.clone().unwrap_or_default(),
        event_when,
        event_location: record.event_location.clone().unwrap_or_default(),
        event_url,
        reasoning: record.reasoning.clone().unwrap_or_else(|| "-".into()),
        author: record.post_author.clone().unwrap_or_else(|| "-".into()),
        post_id: record.post_id.clone(),
        event_id: if event_id.is_empty() { "-".into() } else { event_id },
        post_time: local_time(record.post_time, options.timezone),
        processed: local_time(Some(record.processed_at), options.timezone),
        tokens: format!("{} in / {} out", record.input_tokens, record.output_tokens),
        cost: if record.cost_usd > 0.0 {
            format!("${:.4}", record.cost_usd)
        } else {
            "-".into()
        },
    }
}

/// Group records by publish day, keeping the order in which days first appear.
pub fn group_by_day(records: &[DecisionRecord], options: &ReportOptions<'_>) -> Vec<DayGroup> {
    let mut days: Vec<DayGroup> = Vec::new();
    for record in records {
        let label = day_label(record.post_time, options.timezone);
        let card = card(record, options);
        match days.iter_mut().find(|d| d.label == label) {
            Some(day) => day.cards.push(card),
            None => days.push(DayGroup {
                label,
                cards: vec![card],
            }),
        }
    }
    days
}

pub fn render(records: &[DecisionRecord], total_cost: f64, options: &ReportOptions<'_>) -> askama::Result<String> {
    let days = group_by_day(records, options);
    ReportTemplate {
        days: &days,
        entry_count: records.len(),
        total_cost: format!("${total_cost:.4}"),
        generated: local_time(Some(options.generated_at), options.timezone),
    }
    .render()
}
