//! Google Calendar v3 REST backend.

use std::sync::Arc;

use async_trait::async_trait;
use calsync_core::calendar::{CalendarService, KEYWORD_RESULT_LIMIT, merge_keyword_results, normalize_keywords};
use calsync_core::error::CalendarError;
use calsync_core::event::{CalendarEvent, EventDetails, EventTime};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::{Method, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::auth::TokenSource;

/// The subset of the calendar resource calsync reads.
#[derive(Debug, Clone, Deserialize)]
pub struct CalendarMetadata {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, rename = "timeZone")]
    pub time_zone: Option<String>,
}

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

/// A Google Calendar backed by the v3 REST API.
pub struct GoogleCalendar {
    base_url: String,
    calendar_id: String,
    client: reqwest::Client,
    auth: Arc<dyn TokenSource>,
    default_duration: Duration,
    keyword_window: Duration,
}

impl GoogleCalendar {
    pub fn new(calendar_id: impl Into<String>, client: reqwest::Client, auth: Arc<dyn TokenSource>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            calendar_id: calendar_id.into(),
            client,
            auth,
            default_duration: Duration::hours(2),
            keyword_window: Duration::days(90),
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Length of timed events that have no explicit end.
    pub fn with_default_duration(mut self, duration: Duration) -> Self {
        self.default_duration = duration;
        self
    }

    /// How far ahead keyword searches look.
    pub fn with_keyword_window(mut self, window: Duration) -> Self {
        self.keyword_window = window;
        self
    }

    pub fn calendar_id(&self) -> &str {
        &self.calendar_id
    }

    /// `…/calendars/{id}` followed by `extra`, with every segment escaped.
    fn calendar_url(&self, extra: &[&str]) -> Result<Url, CalendarError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| CalendarError::NotConfigured(format!("Invalid calendar base URL: {e}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| CalendarError::NotConfigured("Calendar base URL cannot be a base".into()))?;
            segments.push("calendars").push(&self.calendar_id).extend(extra);
        }
        Ok(url)
    }

    fn events_url(&self, event_id: Option<&str>) -> Result<Url, CalendarError> {
        match event_id {
            Some(id) => self.calendar_url(&["events", id]),
            None => self.calendar_url(&["events"]),
        }
    }

    /// Name and zone of the calendar itself.
    pub async fn metadata(&self) -> Result<CalendarMetadata, CalendarError> {
        let response = self.send(Method::GET, self.calendar_url(&[])?, &[], None).await?;
        response.json().await.map_err(|e| CalendarError::Api {
            status_code: 200,
            message: format!("Malformed calendar resource: {e}"),
        })
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, CalendarError> {
        let token = self.auth.access_token().await?;
        let mut request = self.client.request(method, url).bearer_auth(token).query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CalendarError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            let message = response.text().await.unwrap_or_default();
            return Err(CalendarError::Auth(message));
        }
        if !(200..300).contains(&status) {
            let message = response.text().await.unwrap_or_default();
            warn!(status, body = %message, "Google Calendar API error");
            return Err(CalendarError::Api {
                status_code: status,
                message,
            });
        }
        Ok(response)
    }

    /// List events in `[time_min, time_max]`, following pagination.
    async fn list(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        q: Option<&str>,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("timeMin", time_min.to_rfc3339()),
                ("timeMax", time_max.to_rfc3339()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ];
            if let Some(q) = q {
                query.push(("q", q.to_string()));
            }
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let response = self.send(Method::GET, self.events_url(None)?, &query, None).await?;
            let page: EventsPage = response
                .json()
                .await
                .map_err(|e| CalendarError::Api {
                    status_code: 200,
                    message: format!("Malformed events list: {e}"),
                })?;

            events.extend(page.items.iter().filter_map(parse_event));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(events)
    }
}

#[async_trait]
impl CalendarService for GoogleCalendar {
    fn name(&self) -> &str {
        "google"
    }

    async fn search_by_date(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let time_min = start.and_hms_opt(0, 0, 0).map(|d| d.and_utc());
        let time_max = end.and_hms_opt(23, 59, 59).map(|d| d.and_utc());
        let (Some(time_min), Some(time_max)) = (time_min, time_max) else {
            return Err(CalendarError::InvalidEvent("date out of range".into()));
        };
        debug!(%start, %end, "Searching calendar by date");
        self.list(time_min, time_max, None).await
    }

    async fn search_by_keyword(&self, keywords: &[String]) -> Result<Vec<CalendarEvent>, CalendarError> {
        let now = Utc::now();
        let until = now + self.keyword_window;
        let mut result_sets = Vec::new();
        for keyword in normalize_keywords(keywords) {
            debug!(%keyword, "Searching calendar by keyword");
            result_sets.push(self.list(now, until, Some(&keyword)).await?);
        }
        Ok(merge_keyword_results(result_sets, KEYWORD_RESULT_LIMIT))
    }

    async fn create(&self, event: &EventDetails) -> Result<String, CalendarError> {
        let body = event_body(event, self.default_duration)?;
        let response = self.send(Method::POST, self.events_url(None)?, &[], Some(&body)).await?;
        created_id(response).await
    }

    async fn update(&self, id: &str, event: &EventDetails) -> Result<String, CalendarError> {
        let body = event_body(event, self.default_duration)?;
        let response = self
            .send(Method::PUT, self.events_url(Some(id))?, &[], Some(&body))
            .await
            .map_err(|e| not_found_as(e, id))?;
        created_id(response).await
    }

    async fn delete(&self, id: &str) -> Result<(), CalendarError> {
        self.send(Method::DELETE, self.events_url(Some(id))?, &[], None)
            .await
            .map_err(|e| not_found_as(e, id))?;
        Ok(())
    }
}

fn not_found_as(err: CalendarError, id: &str) -> CalendarError {
    match err {
        CalendarError::Api { status_code: 404 | 410, .. } => CalendarError::NotFound(id.to_string()),
        other => other,
    }
}

async fn created_id(response: reqwest::Response) -> Result<String, CalendarError> {
    let item: GoogleEvent = response.json().await.map_err(|e| CalendarError::Api {
        status_code: 200,
        message: format!("Malformed event response: {e}"),
    })?;
    item.id.ok_or_else(|| CalendarError::Api {
        status_code: 200,
        message: "Event response has no id".into(),
    })
}

/// Build the insert/update body for an event.
///
/// Timed events are sent as local wall-clock times plus an IANA `timeZone`.
/// All-day events use `date` with the exclusive end on the following day.
pub fn event_body(event: &EventDetails, default_duration: Duration) -> Result<serde_json::Value, CalendarError> {
    let (start, end) = match (event.start(), event.end(default_duration)?) {
        (Some(start), Some(end)) => (
            serde_json::json!({
                "dateTime": start.format("%Y-%m-%dT%H:%M:%S").to_string(),
                "timeZone": event.timezone,
            }),
            serde_json::json!({
                "dateTime": end.format("%Y-%m-%dT%H:%M:%S").to_string(),
                "timeZone": event.timezone,
            }),
        ),
        _ => {
            let next_day = event
                .date
                .succ_opt()
                .ok_or_else(|| CalendarError::InvalidEvent(format!("date {} out of range", event.date)))?;
            (
                serde_json::json!({ "date": event.date.format("%Y-%m-%d").to_string() }),
                serde_json::json!({ "date": next_day.format("%Y-%m-%d").to_string() }),
            )
        }
    };

    let mut body = serde_json::json!({
        "summary": event.title,
        "start": start,
        "end": end,
    });
    if let Some(location) = &event.location {
        body["location"] = serde_json::json!(location);
    }
    if let Some(description) = &event.description {
        body["description"] = serde_json::json!(description);
    }
    Ok(body)
}

// --- Google API types ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsPage {
    #[serde(default)]
    items: Vec<GoogleEvent>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleEvent {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    start: Option<GoogleTime>,
    #[serde(default)]
    end: Option<GoogleTime>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleTime {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    date_time: Option<String>,
}

impl GoogleTime {
    fn to_event_time(&self) -> Option<EventTime> {
        if let Some(dt) = &self.date_time {
            return DateTime::parse_from_rfc3339(dt).ok().map(EventTime::At);
        }
        self.date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .map(EventTime::AllDay)
    }
}

/// Events without an id or a parseable start are skipped.
fn parse_event(item: &GoogleEvent) -> Option<CalendarEvent> {
    let id = item.id.clone()?;
    let start = item.start.as_ref()?.to_event_time()?;
    Some(CalendarEvent {
        id,
        title: item.summary.clone().unwrap_or_default(),
        start,
        end: item.end.as_ref().and_then(GoogleTime::to_event_time),
        location: item.location.clone(),
        description: item.description.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use chrono::NaiveTime;

    fn details(time: Option<&str>, end_time: Option<&str>) -> EventDetails {
        EventDetails {
            title: "Ice Skating Ride".into(),
            date: NaiveDate::from_ymd_opt(2026, 1, 3).unwrap(),
            time: time.map(|t| NaiveTime::parse_from_str(t, "%H:%M").unwrap()),
            end_time: end_time.map(|t| NaiveTime::parse_from_str(t, "%H:%M").unwrap()),
            timezone: "America/Chicago".into(),
            location: Some("Behind Bars Bicycle Shop".into()),
            description: None,
        }
    }

    fn calendar() -> GoogleCalendar {
        GoogleCalendar::new(
            "abc123@group.calendar.google.com",
            reqwest::Client::new(),
            Arc::new(StaticToken("t".into())),
        )
    }

    #[test]
    fn timed_body_uses_local_time_and_zone() {
        let body = event_body(&details(Some("14:00"), None), Duration::hours(2)).unwrap();
        assert_eq!(body["summary"], "Ice Skating Ride");
        assert_eq!(body["start"]["dateTime"], "2026-01-03T14:00:00");
        assert_eq!(body["start"]["timeZone"], "America/Chicago");
        assert_eq!(body["end"]["dateTime"], "2026-01-03T16:00:00");
        assert_eq!(body["location"], "Behind Bars Bicycle Shop");
        assert!(body.get("description").is_none());
    }

    #[test]
    fn explicit_end_time_is_used() {
        let body = event_body(&details(Some("14:00"), Some("15:15")), Duration::hours(2)).unwrap();
        assert_eq!(body["end"]["dateTime"], "2026-01-03T15:15:00");
    }

    #[test]
    fn all_day_body_uses_dates() {
        let body = event_body(&details(None, None), Duration::hours(2)).unwrap();
        assert_eq!(body["start"]["date"], "2026-01-03");
        assert_eq!(body["end"]["date"], "2026-01-04");
        assert!(body["start"].get("dateTime").is_none());
    }

    #[test]
    fn body_for_unrepresentable_end_is_an_error() {
        let mut timed = details(Some("23:00"), None);
        timed.date = NaiveDate::MAX;
        assert!(matches!(
            event_body(&timed, Duration::hours(2)),
            Err(CalendarError::InvalidEvent(_))
        ));

        let mut all_day = details(None, None);
        all_day.date = NaiveDate::MAX;
        assert!(event_body(&all_day, Duration::hours(2)).is_err());
    }

    #[test]
    fn events_url_escapes_calendar_id() {
        let url = calendar().events_url(Some("evt 1")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/abc123@group.calendar.google.com/events/evt%201"
        );
        let url = calendar().calendar_url(&[]).unwrap();
        assert!(url.as_str().ends_with("/calendars/abc123@group.calendar.google.com"));
    }

    #[test]
    fn metadata_tolerates_missing_fields() {
        let meta: CalendarMetadata = serde_json::from_str(r#"{"summary": "Rides", "timeZone": "America/Chicago"}"#).unwrap();
        assert_eq!(meta.summary.as_deref(), Some("Rides"));
        assert_eq!(meta.time_zone.as_deref(), Some("America/Chicago"));
        let meta: CalendarMetadata = serde_json::from_str("{}").unwrap();
        assert!(meta.summary.is_none());
    }

    #[test]
    fn parses_timed_and_all_day_items() {
        let page: EventsPage = serde_json::from_str(
            r#"{
                "items": [
                    {"id": "a", "summary": "Tuesday ride",
                     "start": {"dateTime": "2026-01-27T18:45:00-06:00"},
                     "end": {"dateTime": "2026-01-27T20:45:00-06:00"},
                     "location": "Sabo Bridge"},
                    {"id": "b", "summary": "Swap meet",
                     "start": {"date": "2026-02-01"}, "end": {"date": "2026-02-02"}},
                    {"summary": "no id", "start": {"date": "2026-02-01"}}
                ],
                "nextPageToken": "p2"
            }"#,
        )
        .unwrap();

        let events: Vec<_> = page.items.iter().filter_map(parse_event).collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].start.to_string(), "2026-01-27T18:45:00-06:00");
        assert_eq!(events[0].location.as_deref(), Some("Sabo Bridge"));
        assert!(events[1].is_all_day());
        assert_eq!(page.next_page_token.as_deref(), Some("p2"));
    }

    #[test]
    fn missing_event_maps_to_not_found() {
        let err = not_found_as(
            CalendarError::Api {
                status_code: 410,
                message: "Resource has been deleted".into(),
            },
            "evt1",
        );
        assert!(matches!(err, CalendarError::NotFound(id) if id == "evt1"));
    }
}
