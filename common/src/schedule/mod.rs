// Trigger evaluation for one-time and cron reminders
//
// Everything here is pure: the reference instant is always passed in, the
// wall clock is never read.

pub mod cron;

pub use self::cron::CronExpr;

use crate::errors::{ReminderError, ScheduleError, ValidationError};
use crate::models::ReminderKind;
use chrono::{DateTime, NaiveDateTime, Utc};

/// ScheduleTrigger computes the next fire instant after a reference time
pub trait ScheduleTrigger {
    /// Earliest instant strictly greater than `after` at which the trigger fires
    fn next_fire(&self, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, ScheduleError>;

    /// Whether the trigger keeps firing after an occurrence
    fn is_recurring(&self) -> bool;
}

/// Parsed schedule of a reminder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Once { at: DateTime<Utc> },
    Cron(CronExpr),
}

impl Trigger {
    /// Build a trigger from the raw reminder fields, checking that exactly the
    /// field matching `kind` is populated
    pub fn from_parts(
        kind: ReminderKind,
        when: Option<DateTime<Utc>>,
        cron_expr: Option<&str>,
    ) -> Result<Self, ReminderError> {
        let cron_expr = cron_expr.map(str::trim).filter(|c| !c.is_empty());

        match kind {
            ReminderKind::Time => {
                if cron_expr.is_some() {
                    return Err(ValidationError::invalid(
                        "cron",
                        "must be empty for type 'time'",
                    )
                    .into());
                }
                let at = when.ok_or_else(|| ValidationError::MissingField("when".to_string()))?;
                Ok(Trigger::Once { at })
            }
            ReminderKind::Cron => {
                if when.is_some() {
                    return Err(ValidationError::invalid(
                        "when",
                        "must be empty for type 'cron'",
                    )
                    .into());
                }
                let expression =
                    cron_expr.ok_or_else(|| ValidationError::MissingField("cron".to_string()))?;
                Ok(Trigger::Cron(CronExpr::parse(expression)?))
            }
        }
    }
}

impl ScheduleTrigger for Trigger {
    fn next_fire(&self, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, ScheduleError> {
        match self {
            Trigger::Once { at } => Ok((*at > after).then_some(*at)),
            Trigger::Cron(expr) => expr
                .next_after(after)
                .map(Some)
                .ok_or_else(|| ScheduleError::NoNextExecution {
                    schedule_type: format!("cron '{}'", expr),
                }),
        }
    }

    fn is_recurring(&self) -> bool {
        matches!(self, Trigger::Cron(_))
    }
}

/// Next fire instant for raw reminder fields.
///
/// `time` yields `when` while it lies after `after` and `None` afterwards;
/// `cron` yields the next matching minute or fails with an invalid schedule
/// when the expression can never match again.
pub fn next_fire(
    kind: ReminderKind,
    when: Option<DateTime<Utc>>,
    cron_expr: Option<&str>,
    after: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, ReminderError> {
    let trigger = Trigger::from_parts(kind, when, cron_expr)?;
    Ok(trigger.next_fire(after)?)
}

/// Parse an ISO-8601 instant. Values without an offset are taken as UTC.
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>, ValidationError> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M%:z") {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }

    Err(ValidationError::invalid(
        "when",
        format!("'{}' is not an ISO-8601 timestamp", value),
    ))
}
