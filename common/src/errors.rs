// Error handling framework for the reminder engine

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Schedule-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    #[error("No next execution time available for {schedule_type} schedule")]
    NoNextExecution { schedule_type: String },
}

/// Validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field value for {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },
}

impl ValidationError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFieldValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors returned synchronously by registry operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReminderError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Reminder not found: {0}")]
    NotFound(Uuid),
}

impl From<ScheduleError> for ReminderError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::InvalidCronExpression { .. } => {
                ReminderError::Validation(ValidationError::invalid("cron", err.to_string()))
            }
            ScheduleError::NoNextExecution { .. } => ReminderError::InvalidSchedule(err.to_string()),
        }
    }
}

/// Failure of a single webhook delivery attempt. Never returned to API callers;
/// its text ends up in `last_error`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Webhook request failed: {0}")]
    Transport(String),

    #[error("Webhook responded with status {status}")]
    Status { status: u16 },

    #[error("Delivery deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("Failed to encode delivery: {0}")]
    Encoding(String),
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        DeliveryError::Transport(err.to_string())
    }
}

/// API response error type for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<ReminderError> for ApiError {
    fn from(err: ReminderError) -> Self {
        let code = match err {
            ReminderError::Validation(_) => "validation_error",
            ReminderError::InvalidSchedule(_) => "invalid_schedule",
            ReminderError::NotFound(_) => "not_found",
        };
        ApiError::new(code, err.to_string())
    }
}
