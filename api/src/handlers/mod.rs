pub mod health;
pub mod metrics;
pub mod reminders;

// Common response types
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::errors::{ApiError, ReminderError};
use serde::Serialize;

/// Standard API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub trace_id: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            trace_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.error.as_str() {
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "not_found" => StatusCode::NOT_FOUND,
            "validation_error" => StatusCode::BAD_REQUEST,
            "invalid_schedule" => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ReminderError> for ErrorResponse {
    fn from(err: ReminderError) -> Self {
        let api = ApiError::from(err);
        ErrorResponse::new(api.code, api.message)
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        if self.status().is_server_error() {
            tracing::error!(error = %self.error, message = %self.message, trace_id = %self.trace_id, "Request failed");
        } else {
            tracing::debug!(error = %self.error, message = %self.message, trace_id = %self.trace_id, "Request rejected");
        }
        (self.status(), Json(self)).into_response()
    }
}
