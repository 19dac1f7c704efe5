//! Weekday check for dates the model derived from relative phrases
//! ("this Saturday").

use chrono::{Datelike, Duration, NaiveDate, Weekday};

const WEEKDAYS: [(Weekday, &str); 7] = [
    (Weekday::Mon, "Monday"),
    (Weekday::Tue, "Tuesday"),
    (Weekday::Wed, "Wednesday"),
    (Weekday::Thu, "Thursday"),
    (Weekday::Fri, "Friday"),
    (Weekday::Sat, "Saturday"),
    (Weekday::Sun, "Sunday"),
];

/// Parse a full weekday name or an unambiguous prefix, case-insensitively.
pub fn parse_weekday(name: &str) -> Result<Weekday, String> {
    let needle = name.trim().trim_end_matches('.').to_lowercase();
    if needle.is_empty() {
        return Err("Day of week must not be empty".into());
    }
    // "weds" is common enough to accept even though it is not a prefix
    let needle = if needle == "weds" { "wed".to_string() } else { needle };

    let matches: Vec<Weekday> = WEEKDAYS
        .iter()
        .filter(|(_, full)| full.to_lowercase().starts_with(&needle))
        .map(|(day, _)| *day)
        .collect();

    match matches.as_slice() {
        [day] => Ok(*day),
        [] => Err(format!("Unrecognized day of week '{name}'")),
        _ => Err(format!("Ambiguous day of week '{name}'")),
    }
}

pub fn weekday_name(day: Weekday) -> &'static str {
    WEEKDAYS
        .iter()
        .find(|(d, _)| *d == day)
        .map(|(_, name)| *name)
        .unwrap_or("Unknown")
}

/// Check that `date` (`YYYY-MM-DD`) falls on `weekday`.
///
/// Returns `None` on a match. Otherwise returns a message for the model:
/// either the correction, naming the nearest matching dates on both sides,
/// or a description of why the inputs could not be checked.
pub fn validate_day_of_week(date: &str, weekday: &str) -> Option<String> {
    let parsed = match NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d") {
        Ok(d) => d,
        Err(_) => return Some(format!("Invalid date '{date}': expected YYYY-MM-DD")),
    };
    let claimed = match parse_weekday(weekday) {
        Ok(w) => w,
        Err(e) => return Some(e),
    };

    let actual = parsed.weekday();
    if actual == claimed {
        return None;
    }

    let back = (actual.num_days_from_monday() + 7 - claimed.num_days_from_monday()) % 7;
    let ahead = (claimed.num_days_from_monday() + 7 - actual.num_days_from_monday()) % 7;
    let before = parsed.checked_sub_signed(Duration::days(i64::from(back)));
    let after = parsed.checked_add_signed(Duration::days(i64::from(ahead)));

    let name = weekday_name(claimed);
    let nearest = match (before, after) {
        (Some(before), Some(after)) => {
            format!("The nearest {name}s are {before} (before) and {after} (after).")
        }
        (Some(before), None) => {
            format!("The nearest {name} is {before} (before); no later {name} is representable.")
        }
        (None, Some(after)) => {
            format!("The nearest {name} is {after} (after); no earlier {name} is representable.")
        }
        (None, None) => format!("No nearby {name} is representable."),
    };
    Some(format!(
        "{parsed} is a {}, not a {name}. {nearest}",
        weekday_name(actual),
    ))
}
