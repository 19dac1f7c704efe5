//! Decision validation — untyped `submit_decision` payload in, typed
//! [`Decision`] or a field-labeled error list out.
//!
//! Every problem in the payload is collected before returning so the model
//! can fix them all in one retry. A weekday mismatch on the event is
//! reported on its own and stops validation early.

use calsync_core::decision::{Action, Decision};
use calsync_core::event::EventDetails;
use calsync_core::tool::ToolOutput;
use chrono::{Datelike, NaiveDate, NaiveTime};
use chrono_tz::Tz;
use serde_json::{Map, Value};

use crate::day_of_week::validate_day_of_week;

/// Years expressible as the four-digit dates calendar APIs accept.
const SUPPORTED_YEARS: std::ops::RangeInclusive<i32> = 1..=9999;

/// Why a payload was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationFailure {
    /// The event's claimed weekday does not match its date.
    DayOfWeek(String),
    /// One entry per offending field, e.g. `event.date: field required`.
    Fields(Vec<String>),
}

impl ValidationFailure {
    pub fn into_output(self) -> ToolOutput {
        match self {
            Self::DayOfWeek(message) => ToolOutput::error(message),
            Self::Fields(details) => ToolOutput::error_with_details("Validation failed", &details),
        }
    }
}

/// Validate a `submit_decision` payload.
///
/// `default_timezone` fills in `event.timezone` when the model omits it.
pub fn validate_decision(payload: &Value, default_timezone: &str) -> Result<Decision, ValidationFailure> {
    let Some(obj) = payload.as_object() else {
        return Err(ValidationFailure::Fields(vec![
            "(root): expected an object".into(),
        ]));
    };

    // Weekday check first; its message is more useful than field errors.
    if let Some(Value::Object(event)) = obj.get("event") {
        if let (Some(Value::String(date)), Some(Value::String(day))) =
            (event.get("date"), event.get("day_of_week"))
        {
            if let Some(message) = validate_day_of_week(date, day) {
                return Err(ValidationFailure::DayOfWeek(message));
            }
        }
    }

    let mut fields = FieldReader::new(obj, "");
    let is_event = fields.required_bool("is_event");
    let confidence = fields.required_number("confidence").and_then(|c| {
        if (0.0..=1.0).contains(&c) {
            Some(c)
        } else {
            fields.fail("confidence", "must be between 0.0 and 1.0");
            None
        }
    });
    let action = fields.required_str("action").and_then(|a| match a.parse::<Action>() {
        Ok(action) => Some(action),
        Err(_) => {
            let allowed: Vec<&str> = Action::ALL.iter().map(|a| a.as_str()).collect();
            fields.fail("action", &format!("must be one of {}", allowed.join(", ")));
            None
        }
    });
    let reasoning = fields.required_str("reasoning");
    let done = fields.required_bool("done");
    let related_event_id = fields.optional_str("related_event_id");
    let mut errors = fields.into_errors();

    let event = match obj.get("event") {
        None | Some(Value::Null) => None,
        Some(Value::Object(event)) => match validate_event(event, default_timezone) {
            Ok(event) => Some(event),
            Err(event_errors) => {
                errors.extend(event_errors);
                None
            }
        },
        Some(_) => {
            errors.push("event: expected an object or null".into());
            None
        }
    };
    let event_present = matches!(obj.get("event"), Some(Value::Object(_)));

    if let Some(action) = action {
        let needs_event = matches!(action, Action::Create | Action::Update);
        let needs_related = matches!(action, Action::Update | Action::Cancel);
        if needs_event && !event_present {
            errors.push(format!("event: required for action '{action}'"));
        }
        if needs_related && related_event_id.is_none() {
            errors.push(format!("related_event_id: required for action '{action}'"));
        }
    }

    match (is_event, confidence, action, reasoning, done) {
        (Some(is_event), Some(confidence), Some(action), Some(reasoning), Some(done)) if errors.is_empty() => {
            Ok(Decision {
                is_event,
                confidence,
                action,
                reasoning,
                event,
                related_event_id,
                done,
            })
        }
        _ => Err(ValidationFailure::Fields(errors)),
    }
}

fn validate_event(obj: &Map<String, Value>, default_timezone: &str) -> Result<EventDetails, Vec<String>> {
    let mut fields = FieldReader::new(obj, "event");

    let title = fields.required_str("title");
    let date = fields.required_str("date").and_then(|d| {
        match NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d") {
            Ok(date) if SUPPORTED_YEARS.contains(&date.year()) => Some(date),
            Ok(_) => {
                fields.fail("date", "out of range (years 1 to 9999)");
                None
            }
            Err(_) => {
                fields.fail("date", "expected a date in YYYY-MM-DD format");
                None
            }
        }
    });
    let time = fields.optional_time("time");
    let end_time = fields.optional_time("end_time");
    if end_time.is_some() && obj.get("time").is_none_or(Value::is_null) {
        fields.fail("end_time", "requires event.time");
    }
    let timezone = fields
        .optional_str("timezone")
        .unwrap_or_else(|| default_timezone.to_string());
    if timezone.parse::<Tz>().is_err() {
        fields.fail("timezone", &format!("unknown IANA timezone '{timezone}'"));
    }
    let location = fields.optional_str("location");
    let description = fields.optional_str("description");
    // Only checked for type here; its value was handled before field validation.
    let _ = fields.optional_str("day_of_week");

    let errors = fields.into_errors();
    match (title, date) {
        (Some(title), Some(date)) if errors.is_empty() => Ok(EventDetails {
            title,
            date,
            time,
            end_time,
            timezone,
            location,
            description,
        }),
        _ => Err(errors),
    }
}

/// Reads typed fields out of a JSON object, collecting labeled errors.
struct FieldReader<'a> {
    obj: &'a Map<String, Value>,
    prefix: &'static str,
    errors: Vec<String>,
}

impl<'a> FieldReader<'a> {
    fn new(obj: &'a Map<String, Value>, prefix: &'static str) -> Self {
        Self {
            obj,
            prefix,
            errors: Vec::new(),
        }
    }

    fn fail(&mut self, key: &str, message: &str) {
        let label = if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{key}", self.prefix)
        };
        self.errors.push(format!("{label}: {message}"));
    }

    /// The value under `key`, treating `null` as absent.
    fn present(&self, key: &str) -> Option<&'a Value> {
        self.obj.get(key).filter(|v| !v.is_null())
    }

    fn required_bool(&mut self, key: &str) -> Option<bool> {
        match self.present(key) {
            None => {
                self.fail(key, "field required");
                None
            }
            Some(Value::Bool(b)) => Some(*b),
            Some(_) => {
                self.fail(key, "expected a boolean");
                None
            }
        }
    }

    fn required_number(&mut self, key: &str) -> Option<f64> {
        match self.present(key) {
            None => {
                self.fail(key, "field required");
                None
            }
            Some(v) => v.as_f64().or_else(|| {
                self.fail(key, "expected a number");
                None
            }),
        }
    }

    fn required_str(&mut self, key: &str) -> Option<String> {
        match self.present(key) {
            None => {
                self.fail(key, "field required");
                None
            }
            Some(Value::String(s)) if s.trim().is_empty() => {
                self.fail(key, "must not be empty");
                None
            }
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                self.fail(key, "expected a string");
                None
            }
        }
    }

    /// Absent, null and blank strings are all `None`.
    fn optional_str(&mut self, key: &str) -> Option<String> {
        match self.present(key) {
            None => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                self.fail(key, "expected a string or null");
                None
            }
        }
    }

    fn optional_time(&mut self, key: &str) -> Option<NaiveTime> {
        let raw = self.optional_str(key)?;
        parse_time(&raw).or_else(|| {
            self.fail(key, "expected a time in HH:MM format");
            None
        })
    }

    fn into_errors(self) -> Vec<String> {
        self.errors
    }
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}
