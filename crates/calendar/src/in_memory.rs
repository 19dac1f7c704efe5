//! In-memory calendar — useful for testing and dry experiments.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use calsync_core::calendar::{CalendarService, KEYWORD_RESULT_LIMIT, merge_keyword_results, normalize_keywords};
use calsync_core::error::CalendarError;
use calsync_core::event::{CalendarEvent, EventDetails, EventTime};
use chrono::{Duration, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use tokio::sync::RwLock;

/// A calendar that keeps events in process.
///
/// Keyword search matches title, location and description
/// case-insensitively over every stored event.
pub struct InMemoryCalendar {
    events: RwLock<BTreeMap<String, CalendarEvent>>,
    next_id: AtomicU64,
    default_duration: Duration,
    failing: AtomicBool,
}

impl InMemoryCalendar {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            default_duration: Duration::hours(2),
            failing: AtomicBool::new(false),
        }
    }

    pub fn with_default_duration(mut self, duration: Duration) -> Self {
        self.default_duration = duration;
        self
    }

    /// Make every subsequent call fail with an API error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Seed an existing event.
    pub async fn insert(&self, event: CalendarEvent) {
        self.events.write().await.insert(event.id.clone(), event);
    }

    /// Snapshot of all events, soonest first.
    pub async fn events(&self) -> Vec<CalendarEvent> {
        let mut events: Vec<_> = self.events.read().await.values().cloned().collect();
        events.sort_by_key(|e| e.start.sort_key());
        events
    }

    pub async fn get(&self, id: &str) -> Option<CalendarEvent> {
        self.events.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check(&self) -> Result<(), CalendarError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CalendarError::Api {
                status_code: 503,
                message: "calendar unavailable".into(),
            });
        }
        Ok(())
    }

    fn to_calendar_event(&self, id: String, details: &EventDetails) -> Result<CalendarEvent, CalendarError> {
        let (start, end) = match (details.start(), details.end(self.default_duration)?) {
            (Some(start), Some(end)) => {
                let tz: Tz = details
                    .timezone
                    .parse()
                    .map_err(|_| CalendarError::InvalidEvent(format!("unknown timezone '{}'", details.timezone)))?;
                (zoned(tz, start)?, zoned(tz, end)?)
            }
            _ => {
                let next = details
                    .date
                    .succ_opt()
                    .ok_or_else(|| CalendarError::InvalidEvent("date out of range".into()))?;
                (EventTime::AllDay(details.date), EventTime::AllDay(next))
            }
        };

        Ok(CalendarEvent {
            id,
            title: details.title.clone(),
            start,
            end: Some(end),
            location: details.location.clone(),
            description: details.description.clone(),
        })
    }
}

fn zoned(tz: Tz, local: NaiveDateTime) -> Result<EventTime, CalendarError> {
    tz.from_local_datetime(&local)
        .earliest()
        .map(|dt| EventTime::At(dt.fixed_offset()))
        .ok_or_else(|| CalendarError::InvalidEvent(format!("{local} does not exist in {tz}")))
}

impl Default for InMemoryCalendar {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CalendarService for InMemoryCalendar {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn search_by_date(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        self.check()?;
        let mut found: Vec<_> = self
            .events
            .read()
            .await
            .values()
            .filter(|e| {
                let d = e.start.date();
                d >= start && d <= end
            })
            .cloned()
            .collect();
        found.sort_by_key(|e| e.start.sort_key());
        Ok(found)
    }

    async fn search_by_keyword(&self, keywords: &[String]) -> Result<Vec<CalendarEvent>, CalendarError> {
        self.check()?;
        let events = self.events.read().await;
        let result_sets = normalize_keywords(keywords).into_iter().map(|kw| {
            let kw = kw.to_lowercase();
            events
                .values()
                .filter(|e| {
                    [Some(&e.title), e.location.as_ref(), e.description.as_ref()]
                        .into_iter()
                        .flatten()
                        .any(|field| field.to_lowercase().contains(&kw))
                })
                .cloned()
                .collect::<Vec<_>>()
        });
        Ok(merge_keyword_results(result_sets.collect::<Vec<_>>(), KEYWORD_RESULT_LIMIT))
    }

    async fn create(&self, event: &EventDetails) -> Result<String, CalendarError> {
        self.check()?;
        let id = format!("mem-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let stored = self.to_calendar_event(id.clone(), event)?;
        self.events.write().await.insert(id.clone(), stored);
        Ok(id)
    }

    async fn update(&self, id: &str, event: &EventDetails) -> Result<String, CalendarError> {
        self.check()?;
        let stored = self.to_calendar_event(id.to_string(), event)?;
        let mut events = self.events.write().await;
        match events.get_mut(id) {
            Some(slot) => {
                *slot = stored;
                Ok(id.to_string())
            }
            None => Err(CalendarError::NotFound(id.to_string())),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), CalendarError> {
        self.check()?;
        match self.events.write().await.remove(id) {
            Some(_) => Ok(()),
            None => Err(CalendarError::NotFound(id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn details(title: &str, day: u32, time: Option<&str>) -> EventDetails {
        EventDetails {
            title: title.into(),
            date: NaiveDate::from_ymd_opt(2026, 1, day).unwrap(),
            time: time.map(|t| NaiveTime::parse_from_str(t, "%H:%M").unwrap()),
            end_time: None,
            timezone: "America/Chicago".into(),
            location: None,
            description: None,
        }
    }

    #[tokio::test]
    async fn create_then_search_by_date() {
        let cal = InMemoryCalendar::new();
        let id = cal.create(&details("Ride", 3, Some("14:00"))).await.unwrap();
        cal.create(&details("Other", 10, None)).await.unwrap();

        let d = NaiveDate::from_ymd_opt(2026, 1, 3).unwrap();
        let found = cal.search_by_date(d, d).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, id);
        assert_eq!(found[0].start.to_string(), "2026-01-03T14:00:00-06:00");
        assert_eq!(
            found[0].end.as_ref().unwrap().to_string(),
            "2026-01-03T16:00:00-06:00"
        );
    }

    #[tokio::test]
    async fn keyword_search_matches_fields_and_caps() {
        let cal = InMemoryCalendar::new();
        for day in 1..=7 {
            cal.create(&details(&format!("Unity Ride {day}"), day, None)).await.unwrap();
        }
        let found = cal
            .search_by_keyword(&["unity".into(), "UNITY ride".into()])
            .await
            .unwrap();
        assert_eq!(found.len(), 5);
        assert_eq!(found[0].title, "Unity Ride 1");
    }

    #[tokio::test]
    async fn update_and_delete_missing_are_not_found() {
        let cal = InMemoryCalendar::new();
        assert!(matches!(
            cal.update("nope", &details("x", 1, None)).await,
            Err(CalendarError::NotFound(_))
        ));
        assert!(matches!(cal.delete("nope").await, Err(CalendarError::NotFound(_))));
    }

    #[tokio::test]
    async fn update_replaces_event() {
        let cal = InMemoryCalendar::new();
        let id = cal.create(&details("Ride", 3, None)).await.unwrap();
        let returned = cal.update(&id, &details("Ride (moved)", 4, None)).await.unwrap();
        assert_eq!(returned, id);
        assert_eq!(cal.get(&id).await.unwrap().title, "Ride (moved)");
        cal.delete(&id).await.unwrap();
        assert!(cal.is_empty().await);
    }

    #[tokio::test]
    async fn end_past_last_date_is_invalid_event() {
        let cal = InMemoryCalendar::new();
        let mut event = details("Ride", 3, Some("23:00"));
        event.date = NaiveDate::MAX;
        let err = cal.create(&event).await.unwrap_err();
        assert!(matches!(err, CalendarError::InvalidEvent(_)));
        assert!(cal.is_empty().await);
    }

    #[tokio::test]
    async fn failing_mode_errors() {
        let cal = InMemoryCalendar::new();
        cal.set_failing(true);
        assert!(cal.create(&details("Ride", 3, None)).await.is_err());
        cal.set_failing(false);
        assert!(cal.create(&details("Ride", 3, None)).await.is_ok());
    }
}
