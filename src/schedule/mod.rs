//! Cron expression parsing and evaluation.
//!
//! A [`Schedule`] is an immutable, canonicalized cron expression. It is built
//! once via [`Schedule::parse`] and then only ever queried with
//! [`Schedule::is_due`].

mod element;
mod position;
mod qualification;

pub use position::Position;
pub use qualification::Qualification;

use std::fmt;

use chrono::{DateTime, Datelike, Timelike, Utc};
use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::error::ScheduleError;
use element::Element;

static TEMPLATES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("@YEARLY", "0 0 1 1 *"),
        ("@ANNUALLY", "0 0 1 1 *"),
        ("@MONTHLY", "0 0 1 * *"),
        ("@WEEKLY", "0 0 * * 0"),
        ("@DAILY", "0 0 * * *"),
        ("@HOURLY", "0 * * * *"),
        ("@EVERYMINUTE", "* * * * *"),
        ("@5MINUTES", "*/5 * * * *"),
        ("@10MINUTES", "*/10 * * * *"),
        ("@15MINUTES", "*/15 * * * *"),
        ("@30MINUTES", "0,30 * * * *"),
        ("@EVERYSECOND", "* * * * * *"),
    ])
});

/// An immutable, canonicalized cron schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    expression: String,
    elements: Vec<Element>,
}

impl Schedule {
    /// Parses a 5-, 6-, or 7-field cron expression (or an `@`-shortcut) into
    /// a [`Schedule`]. Returns the first applicable [`ScheduleError`] on a
    /// malformed expression.
    pub fn parse(expression: &str) -> Result<Schedule, ScheduleError> {
        let canonical = canonicalize(expression);
        let fields = standardize(&canonical)?;

        let mut elements = Vec::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            elements.push(Element::parse(field, Position::at(i))?);
        }

        Ok(Schedule {
            expression: fields.join(" "),
            elements,
        })
    }

    /// A schedule that triggers on January 1st at 00:00:00.
    pub fn yearly() -> Schedule {
        Schedule::parse("@yearly").expect("builtin template is always valid")
    }

    /// A schedule that triggers on the first day of each month at 00:00:00.
    pub fn monthly() -> Schedule {
        Schedule::parse("@monthly").expect("builtin template is always valid")
    }

    /// A schedule that triggers each Sunday at 00:00:00.
    pub fn weekly() -> Schedule {
        Schedule::parse("@weekly").expect("builtin template is always valid")
    }

    /// A schedule that triggers once a day at 00:00:00.
    pub fn daily() -> Schedule {
        Schedule::parse("@daily").expect("builtin template is always valid")
    }

    /// A schedule that triggers at the top of every hour.
    pub fn hourly() -> Schedule {
        Schedule::parse("@hourly").expect("builtin template is always valid")
    }

    /// A schedule that triggers at the top of every minute.
    pub fn every_minute() -> Schedule {
        Schedule::parse("@everyminute").expect("builtin template is always valid")
    }

    /// A schedule that triggers every second.
    pub fn every_second() -> Schedule {
        Schedule::parse("@everysecond").expect("builtin template is always valid")
    }

    /// Returns true when every field of the schedule matches the
    /// corresponding component of `instant`.
    pub fn is_due(&self, instant: DateTime<Utc>) -> bool {
        self.elements
            .iter()
            .all(|e| e.is_due(instant_component(e.position(), instant)))
    }

    /// Returns the canonicalized expression this schedule was built from.
    pub fn as_str(&self) -> &str {
        &self.expression
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

fn canonicalize(expression: &str) -> String {
    if let Some(template) = TEMPLATES.get(expression.trim().to_uppercase().as_str()) {
        return (*template).to_owned();
    }

    let collapsed = expression.split_whitespace().collect::<Vec<_>>().join(" ");
    let upper = collapsed.to_uppercase();
    replace_literals(&upper)
}

fn replace_literals(expression: &str) -> String {
    const WEEKDAYS: [(&str, &str); 7] = [
        ("SUN", "0"),
        ("MON", "1"),
        ("TUE", "2"),
        ("WED", "3"),
        ("THU", "4"),
        ("FRI", "5"),
        ("SAT", "6"),
    ];
    const MONTHS: [(&str, &str); 12] = [
        ("JAN", "1"),
        ("FEB", "2"),
        ("MAR", "3"),
        ("APR", "4"),
        ("MAY", "5"),
        ("JUN", "6"),
        ("JUL", "7"),
        ("AUG", "8"),
        ("SEP", "9"),
        ("OCT", "10"),
        ("NOV", "11"),
        ("DEC", "12"),
    ];

    let mut out = expression.to_owned();
    for (literal, value) in WEEKDAYS.into_iter().chain(MONTHS) {
        out = out.replace(literal, value);
    }
    out
}

fn standardize(expression: &str) -> Result<Vec<String>, ScheduleError> {
    let segments: Vec<String> = expression.split(' ').map(str::to_owned).collect();
    let count = segments.len();

    if !(5..=7).contains(&count) {
        return Err(ScheduleError::InvalidFieldCount(count));
    }

    let is_year_like = count == 6 && looks_like_year(&segments[5]);

    if count == 5 || is_year_like {
        let mut with_seconds = vec!["0".to_owned()];
        with_seconds.extend(segments);
        return Ok(with_seconds);
    }

    Ok(segments)
}

fn looks_like_year(field: &str) -> bool {
    if field == "*" {
        return false;
    }
    if let Some(rest) = field.strip_prefix("*/") {
        return rest.parse::<u32>().is_ok();
    }
    field
        .split(|c| c == ',' || c == '-')
        .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

/// Extracts the time component an [`Element`] at a given position should be
/// compared against.
pub(crate) fn instant_component(position: Position, instant: DateTime<Utc>) -> i64 {
    match position {
        Position::Second => instant.second() as i64,
        Position::Minute => instant.minute() as i64,
        Position::Hour => instant.hour() as i64,
        Position::Day => instant.day() as i64,
        Position::Month => instant.month() as i64,
        Position::Weekday => instant.weekday().num_days_from_sunday() as i64,
        Position::Year => instant.year() as i64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn five_field_expression_gets_seconds_prepended() {
        let s = Schedule::parse("0 0 1 1 *").unwrap();
        assert_eq!(s.as_str(), "0 0 0 1 1 *");
    }

    #[test]
    fn everysecond_template_round_trips() {
        let s = Schedule::parse("@everysecond").unwrap();
        assert_eq!(s.as_str(), "* * * * * *");
        assert_eq!(Schedule::parse(s.as_str()).unwrap().as_str(), s.as_str());
    }

    #[test]
    fn daily_midnight_is_due_only_at_midnight() {
        let s = Schedule::parse("0 0 * * *").unwrap();
        assert!(s.is_due(at(2026, 7, 30, 0, 0, 0)));
        assert!(!s.is_due(at(2026, 7, 30, 0, 0, 1)));
        assert!(!s.is_due(at(2026, 7, 30, 1, 0, 0)));
    }

    #[test]
    fn weekday_literals_are_normalized() {
        let literal = Schedule::parse("0 0 * * MON").unwrap();
        let numeric = Schedule::parse("0 0 * * 1").unwrap();
        assert_eq!(literal.as_str(), numeric.as_str());
    }

    #[test]
    fn month_literals_are_normalized() {
        let literal = Schedule::parse("0 0 1 JAN *").unwrap();
        let numeric = Schedule::parse("0 0 1 1 *").unwrap();
        assert_eq!(literal.as_str(), numeric.as_str());
    }

    #[test]
    fn too_few_fields_is_rejected() {
        let err = Schedule::parse("* * *").unwrap_err();
        assert_eq!(err, ScheduleError::InvalidFieldCount(3));
    }

    #[test]
    fn too_many_fields_is_rejected() {
        let err = Schedule::parse("* * * * * * * *").unwrap_err();
        assert_eq!(err, ScheduleError::InvalidFieldCount(8));
    }

    #[test]
    fn six_field_with_trailing_year_gets_seconds_prepended() {
        // "* * * * * 2030" is 6 fields where the last looks like a year, so
        // this is minute..weekday plus year, not second..weekday.
        let s = Schedule::parse("* * * * * 2030").unwrap();
        assert_eq!(s.as_str(), "0 * * * * * 2030");
    }

    #[test]
    fn step_schedule_matches_every_n_seconds() {
        let s = Schedule::parse("*/2 * * * * *").unwrap();
        assert!(s.is_due(at(2026, 7, 30, 10, 0, 0)));
        assert!(!s.is_due(at(2026, 7, 30, 10, 0, 1)));
        assert!(s.is_due(at(2026, 7, 30, 10, 0, 2)));
    }

    #[test]
    fn every_second_builtin() {
        let s = Schedule::every_second();
        assert!(s.is_due(at(2026, 7, 30, 10, 0, 0)));
        assert!(s.is_due(at(2026, 7, 30, 10, 0, 1)));
    }
}
