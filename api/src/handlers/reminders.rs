use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use uuid::Uuid;

use crate::handlers::ErrorResponse;
use crate::state::AppState;
use common::errors::ReminderError;
use common::models::{CreateOutcome, NewReminder, Reminder, ReminderKind};
use common::schedule::parse_instant;

/// Request to create a new reminder
#[derive(Debug, Deserialize)]
pub struct CreateReminderRequest {
    pub app_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub when: Option<String>,
    pub cron: Option<String>,
    pub notify: NotifySpec,
    #[serde(default)]
    pub payload: Option<Box<RawValue>>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotifySpec {
    pub webhook: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub app_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateReminderResponse {
    pub reminder_id: Uuid,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub status: &'static str,
    pub reminder_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub status: &'static str,
    pub count: usize,
}

/// Wire shape of a reminder record
#[derive(Debug, Serialize)]
pub struct ReminderView {
    pub reminder_id: Uuid,
    pub app_id: String,
    #[serde(rename = "type")]
    pub kind: ReminderKind,
    pub when: Option<DateTime<Utc>>,
    pub cron: Option<String>,
    pub notify: NotifySpec,
    pub payload: Box<RawValue>,
    pub idempotency_key: Option<String>,
    pub status: String,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub next_run_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Reminder> for ReminderView {
    fn from(r: Reminder) -> Self {
        Self {
            reminder_id: r.id,
            app_id: r.app_id,
            kind: r.kind,
            when: r.when,
            cron: r.cron_expr,
            notify: NotifySpec {
                webhook: r.webhook_url,
            },
            payload: r.payload,
            idempotency_key: r.idempotency_key,
            status: r.status.to_string(),
            attempts: r.attempts,
            last_error: r.last_error,
            next_run_time: r.next_run_time,
            created_at: r.created_at,
        }
    }
}

impl CreateReminderRequest {
    /// Normalise the wire request into a registry creation spec
    pub fn into_new_reminder(self) -> Result<NewReminder, ReminderError> {
        let kind: ReminderKind = self.kind.parse()?;
        let when = self
            .when
            .as_deref()
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .map(parse_instant)
            .transpose()?;

        Ok(NewReminder {
            app_id: self.app_id.trim().to_string(),
            kind,
            when,
            cron_expr: self.cron,
            webhook_url: self.notify.webhook,
            payload: self.payload,
            idempotency_key: self.idempotency_key,
        })
    }
}

fn parse_id(raw: &str) -> Result<Uuid, ErrorResponse> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ErrorResponse::new("not_found", format!("Reminder not found: {}", raw)))
}

/// Create a reminder; repeating an idempotency key returns the existing one
#[tracing::instrument(skip(state, body))]
pub async fn create_reminder(
    State(state): State<AppState>,
    body: Result<Json<CreateReminderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateReminderResponse>), ErrorResponse> {
    let Json(req) = body.map_err(|e| ErrorResponse::new("validation_error", e.body_text()))?;
    let spec = req.into_new_reminder()?;

    let outcome = state.registry.create(spec).await?;
    let status = match outcome {
        CreateOutcome::Created(_) => StatusCode::CREATED,
        CreateOutcome::Existing(_) => StatusCode::OK,
    };
    let reminder = outcome.into_reminder();

    Ok((
        status,
        Json(CreateReminderResponse {
            reminder_id: reminder.id,
            status: reminder.status.to_string(),
        }),
    ))
}

/// List reminders, optionally for one app
#[tracing::instrument(skip(state))]
pub async fn list_reminders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<ReminderView>> {
    let app_id = query
        .app_id
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty());
    let reminders = state.registry.list(app_id).await;
    Json(reminders.into_iter().map(ReminderView::from).collect())
}

#[tracing::instrument(skip(state))]
pub async fn get_reminder(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReminderView>, ErrorResponse> {
    let id = parse_id(&id)?;
    let reminder = state.registry.get(id).await?;
    Ok(Json(reminder.into()))
}

/// Cancel a reminder; cancelling twice succeeds
#[tracing::instrument(skip(state))]
pub async fn cancel_reminder(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, ErrorResponse> {
    let id = parse_id(&id)?;
    let reminder = state.registry.cancel(id).await?;
    Ok(Json(CancelResponse {
        status: "cancelled",
        reminder_id: reminder.id,
    }))
}

/// Remove every reminder
#[tracing::instrument(skip(state))]
pub async fn clear_reminders(State(state): State<AppState>) -> Json<ClearResponse> {
    let count = state.registry.clear_all().await;
    Json(ClearResponse {
        status: "cleared",
        count,
    })
}
