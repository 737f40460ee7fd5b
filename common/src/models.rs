use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::ValidationError;

// ============================================================================
// Reminder Models
// ============================================================================

/// How a reminder fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderKind {
    /// Fires exactly once at an absolute instant
    Time,
    /// Fires repeatedly per a 5-field cron expression
    Cron,
}

impl ReminderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderKind::Time => "time",
            ReminderKind::Cron => "cron",
        }
    }
}

impl fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReminderKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "time" => Ok(ReminderKind::Time),
            "cron" => Ok(ReminderKind::Cron),
            other => Err(ValidationError::invalid(
                "type",
                format!("must be 'time' or 'cron', got '{}'", other),
            )),
        }
    }
}

/// Externally visible lifecycle state. The internal in-flight sub-state is
/// reported as `Scheduled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderStatus {
    Scheduled,
    Delivered,
    Cancelled,
    Failed,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStatus::Scheduled => "scheduled",
            ReminderStatus::Delivered => "delivered",
            ReminderStatus::Cancelled => "cancelled",
            ReminderStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReminderStatus::Scheduled)
    }
}

impl fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reminder is the central record owned by the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: Uuid,
    pub app_id: String,
    pub kind: ReminderKind,
    pub when: Option<DateTime<Utc>>,
    pub cron_expr: Option<String>,
    pub webhook_url: String,
    /// Caller-supplied document, passed through untouched
    pub payload: Box<RawValue>,
    pub idempotency_key: Option<String>,
    pub status: ReminderStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub next_run_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Creation request after gateway normalisation
#[derive(Debug, Clone)]
pub struct NewReminder {
    pub app_id: String,
    pub kind: ReminderKind,
    pub when: Option<DateTime<Utc>>,
    pub cron_expr: Option<String>,
    pub webhook_url: String,
    pub payload: Option<Box<RawValue>>,
    pub idempotency_key: Option<String>,
}

impl NewReminder {
    /// One-time reminder firing at `when`
    pub fn at(app_id: impl Into<String>, when: DateTime<Utc>, webhook_url: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            kind: ReminderKind::Time,
            when: Some(when),
            cron_expr: None,
            webhook_url: webhook_url.into(),
            payload: None,
            idempotency_key: None,
        }
    }

    /// Recurring reminder following `expression`
    pub fn cron(
        app_id: impl Into<String>,
        expression: impl Into<String>,
        webhook_url: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            kind: ReminderKind::Cron,
            when: None,
            cron_expr: Some(expression.into()),
            webhook_url: webhook_url.into(),
            payload: None,
            idempotency_key: None,
        }
    }

    pub fn with_payload(mut self, payload: Box<RawValue>) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Result of `create`: either a fresh record or the one already holding the
/// idempotency key
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(Reminder),
    Existing(Reminder),
}

impl CreateOutcome {
    pub fn reminder(&self) -> &Reminder {
        match self {
            CreateOutcome::Created(r) | CreateOutcome::Existing(r) => r,
        }
    }

    pub fn into_reminder(self) -> Reminder {
        match self {
            CreateOutcome::Created(r) | CreateOutcome::Existing(r) => r,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }
}

// ============================================================================
// Delivery Models
// ============================================================================

/// Outcome of delivery attempts reported by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// A 2xx was received on attempt `attempts`
    Delivered { attempts: u32 },
    /// Attempt failed and another one will follow within the same cycle
    Retrying { attempts: u32, error: String },
    /// Every allowed attempt failed
    Exhausted { attempts: u32, error: String },
}

impl DeliveryOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            DeliveryOutcome::Delivered { attempts }
            | DeliveryOutcome::Retrying { attempts, .. }
            | DeliveryOutcome::Exhausted { attempts, .. } => *attempts,
        }
    }
}

/// Empty JSON object used when a caller sends no payload
pub fn empty_payload() -> Box<RawValue> {
    RawValue::from_string("{}".to_string()).expect("literal is valid JSON")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_is_case_insensitive() {
        assert_eq!("TIME".parse::<ReminderKind>().unwrap(), ReminderKind::Time);
        assert_eq!(" Cron ".parse::<ReminderKind>().unwrap(), ReminderKind::Cron);
        assert!("weekly".parse::<ReminderKind>().is_err());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&ReminderStatus::Delivered).unwrap();
        assert_eq!(json, "\"delivered\"");
        assert!(ReminderStatus::Cancelled.is_terminal());
        assert!(!ReminderStatus::Scheduled.is_terminal());
    }

    #[test]
    fn test_empty_payload() {
        assert_eq!(empty_payload().get(), "{}");
    }
}
