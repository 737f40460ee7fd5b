// Five-field cron expression parser and evaluator
//
// Fields: minute hour day-of-month month day-of-week, evaluated in UTC.
// Each field accepts `*`, `N`, `A-B`, `*/S`, `A-B/S`, `N/S` and comma lists
// of those. Day-of-week 7 is folded onto 0 (Sunday).

use crate::errors::ScheduleError;
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use std::fmt;
use std::str::FromStr;

/// Years searched past `after` before giving up. Leap-day schedules can skip
/// a non-leap century year, so a single occurrence may be 8 years away.
const SEARCH_HORIZON_YEARS: i32 = 8;

/// Bitset of the values a field matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet(u64);

impl FieldSet {
    fn contains(&self, value: u32) -> bool {
        value < 64 && self.0 & (1u64 << value) != 0
    }

    fn insert(&mut self, value: u32) {
        self.0 |= 1u64 << value;
    }

    fn remove(&mut self, value: u32) {
        self.0 &= !(1u64 << value);
    }
}

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    /// Upper bound used when the field is `*`
    wildcard_max: u32,
}

const MINUTE: FieldSpec = FieldSpec { name: "minute", min: 0, max: 59, wildcard_max: 59 };
const HOUR: FieldSpec = FieldSpec { name: "hour", min: 0, max: 23, wildcard_max: 23 };
const DAY_OF_MONTH: FieldSpec = FieldSpec { name: "day-of-month", min: 1, max: 31, wildcard_max: 31 };
const MONTH: FieldSpec = FieldSpec { name: "month", min: 1, max: 12, wildcard_max: 12 };
const DAY_OF_WEEK: FieldSpec = FieldSpec { name: "day-of-week", min: 0, max: 7, wildcard_max: 6 };

/// A parsed cron expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    source: String,
    minutes: FieldSet,
    hours: FieldSet,
    days_of_month: FieldSet,
    months: FieldSet,
    days_of_week: FieldSet,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronExpr {
    /// Parse a 5-field expression
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(invalid(
                expression,
                format!(
                    "expected 5 fields (minute hour day-of-month month day-of-week), got {}",
                    fields.len()
                ),
            ));
        }

        let mut days_of_week = parse_field(fields[4], &DAY_OF_WEEK, expression)?;
        if days_of_week.contains(7) {
            days_of_week.remove(7);
            days_of_week.insert(0);
        }

        Ok(Self {
            source: fields.join(" "),
            minutes: parse_field(fields[0], &MINUTE, expression)?,
            hours: parse_field(fields[1], &HOUR, expression)?,
            days_of_month: parse_field(fields[2], &DAY_OF_MONTH, expression)?,
            months: parse_field(fields[3], &MONTH, expression)?,
            days_of_week,
            dom_restricted: !fields[2].starts_with('*'),
            dow_restricted: !fields[4].starts_with('*'),
        })
    }

    /// The normalised expression text
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Earliest minute strictly after `after` matching every field, or `None`
    /// when nothing matches within the search horizon.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let limit_year = after.year() + SEARCH_HORIZON_YEARS;
        let mut t = after.with_nanosecond(0)?.with_second(0)? + Duration::minutes(1);

        loop {
            if t.year() > limit_year {
                return None;
            }
            if !self.months.contains(t.month()) {
                t = start_of_next_month(t)?;
                continue;
            }
            if !self.day_matches(t) {
                t = start_of_next_day(t)?;
                continue;
            }
            if !self.hours.contains(t.hour()) {
                t = t.with_minute(0)? + Duration::hours(1);
                continue;
            }
            if !self.minutes.contains(t.minute()) {
                t += Duration::minutes(1);
                continue;
            }
            return Some(t);
        }
    }

    fn day_matches(&self, t: DateTime<Utc>) -> bool {
        let dom = self.days_of_month.contains(t.day());
        let dow = self.days_of_week.contains(t.weekday().num_days_from_sunday());
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }
}

impl FromStr for CronExpr {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CronExpr::parse(s)
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn invalid(expression: &str, reason: impl Into<String>) -> ScheduleError {
    ScheduleError::InvalidCronExpression {
        expression: expression.to_string(),
        reason: reason.into(),
    }
}

fn parse_field(field: &str, spec: &FieldSpec, expression: &str) -> Result<FieldSet, ScheduleError> {
    let mut set = FieldSet(0);

    for item in field.split(',') {
        if item.is_empty() {
            return Err(invalid(expression, format!("empty list item in {} field", spec.name)));
        }

        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step = parse_number(step, spec, expression)?;
                if step == 0 {
                    return Err(invalid(expression, format!("step of 0 in {} field", spec.name)));
                }
                (range, Some(step))
            }
            None => (item, None),
        };

        let (start, end) = if range == "*" {
            (spec.min, spec.wildcard_max)
        } else if let Some((lo, hi)) = range.split_once('-') {
            (parse_number(lo, spec, expression)?, parse_number(hi, spec, expression)?)
        } else {
            let value = parse_number(range, spec, expression)?;
            // `N/S` runs from N to the end of the field
            match step {
                Some(_) => (value, spec.max),
                None => (value, value),
            }
        };

        if start < spec.min || end > spec.max {
            return Err(invalid(
                expression,
                format!(
                    "{} field value out of range {}-{}: '{}'",
                    spec.name, spec.min, spec.max, item
                ),
            ));
        }
        if start > end {
            return Err(invalid(
                expression,
                format!("{} field range is reversed: '{}'", spec.name, item),
            ));
        }

        for value in (start..=end).step_by(step.unwrap_or(1) as usize) {
            set.insert(value);
        }
    }

    Ok(set)
}

fn parse_number(text: &str, spec: &FieldSpec, expression: &str) -> Result<u32, ScheduleError> {
    text.parse::<u32>().map_err(|_| {
        invalid(
            expression,
            format!("'{}' is not a number in {} field", text, spec.name),
        )
    })
}

fn start_of_next_month(t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()
}

fn start_of_next_day(t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let next = t.date_naive().succ_opt()?;
    Some(next.and_hms_opt(0, 0, 0)?.and_utc())
}
