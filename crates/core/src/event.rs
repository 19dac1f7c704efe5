//! Event value types: what the model extracts and what the calendar holds.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CalendarError;

/// Event details extracted from a post.
///
/// Without a start `time` the event is all-day. With a start time but no
/// `end_time`, the end is the start plus the configured default duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDetails {
    pub title: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<NaiveTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<NaiveTime>,
    /// IANA timezone name
    pub timezone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl EventDetails {
    pub fn is_all_day(&self) -> bool {
        self.time.is_none()
    }

    /// Local start date-time, `None` for all-day events.
    pub fn start(&self) -> Option<NaiveDateTime> {
        self.time.map(|t| self.date.and_time(t))
    }

    /// Local end date-time, `None` for all-day events.
    ///
    /// An explicit end time at or before the start time is taken to be on
    /// the following day. Fails when the end falls outside chrono's range.
    pub fn end(&self, default_duration: Duration) -> Result<Option<NaiveDateTime>, CalendarError> {
        let Some(start) = self.start() else {
            return Ok(None);
        };
        let end = match self.end_time {
            Some(end_time) => {
                let end = self.date.and_time(end_time);
                if end <= start {
                    end.checked_add_signed(Duration::days(1))
                } else {
                    Some(end)
                }
            }
            None => start.checked_add_signed(default_duration),
        };
        end.map(Some)
            .ok_or_else(|| CalendarError::InvalidEvent(format!("end of event on {} is out of range", self.date)))
    }

    /// Start time as `HH:MM`.
    pub fn time_display(&self) -> Option<String> {
        self.time.map(|t| t.format("%H:%M").to_string())
    }
}

/// The start or end of a calendar entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTime {
    /// Date-only, for all-day events
    AllDay(NaiveDate),
    /// A zoned instant
    At(DateTime<FixedOffset>),
}

impl EventTime {
    /// Instant used for ordering; all-day events sort at midnight UTC.
    pub fn sort_key(&self) -> DateTime<Utc> {
        match self {
            Self::AllDay(d) => Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN)),
            Self::At(dt) => dt.with_timezone(&Utc),
        }
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            Self::AllDay(d) => *d,
            Self::At(dt) => dt.date_naive(),
        }
    }
}

impl std::fmt::Display for EventTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllDay(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::At(dt) => write!(f, "{}", dt.to_rfc3339()),
        }
    }
}

/// An event as stored in the calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: EventTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<EventTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CalendarEvent {
    pub fn is_all_day(&self) -> bool {
        matches!(self.start, EventTime::AllDay(_))
    }

    /// The compact view returned to the model by the search tools.
    pub fn projection(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "title": self.title,
            "start": self.start.to_string(),
            "location": self.location,
            "description": self.description,
        })
    }
}
