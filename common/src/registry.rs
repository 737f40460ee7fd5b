// Reminder registry: the single owner of every reminder record
//
// All reads and writes go through one mutex. Critical sections are map
// lookups and updates only; nothing awaits while the lock is held except
// the lock itself.

use crate::clock::Clock;
use crate::errors::{ReminderError, ValidationError};
use crate::models::{
    empty_payload, CreateOutcome, DeliveryOutcome, NewReminder, Reminder, ReminderStatus,
};
use crate::schedule::{ScheduleTrigger, Trigger};
use crate::telemetry;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

struct Entry {
    reminder: Reminder,
    trigger: Trigger,
    /// Claimed by a tick, delivery cycle running
    in_flight: bool,
    /// Creation sequence, tie-breaker for equal `created_at`
    seq: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<Uuid, Entry>,
    /// (app_id, idempotency_key) -> holder among non-cancelled reminders
    idempotency: HashMap<(String, String), Uuid>,
    next_seq: u64,
}

impl Inner {
    fn release_key(&mut self, reminder: &Reminder) {
        if let Some(key) = &reminder.idempotency_key {
            let index_key = (reminder.app_id.clone(), key.clone());
            if self.idempotency.get(&index_key) == Some(&reminder.id) {
                self.idempotency.remove(&index_key);
            }
        }
    }
}

/// Concurrency-safe in-memory reminder store
pub struct ReminderRegistry {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
}

impl ReminderRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock,
        }
    }

    /// Create a reminder, or return the one already holding the same
    /// idempotency key within the same `app_id`
    #[instrument(skip(self, spec), fields(app_id = %spec.app_id, kind = %spec.kind))]
    pub async fn create(&self, spec: NewReminder) -> Result<CreateOutcome, ReminderError> {
        let app_id = spec.app_id.trim().to_string();
        if app_id.is_empty() {
            return Err(ValidationError::MissingField("app_id".to_string()).into());
        }
        let webhook_url = validate_webhook_url(&spec.webhook_url)?;
        let trigger = Trigger::from_parts(spec.kind, spec.when, spec.cron_expr.as_deref())?;
        let idempotency_key = spec
            .idempotency_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let mut inner = self.inner.lock().await;

        if let Some(key) = &idempotency_key {
            let index_key = (app_id.clone(), key.clone());
            if let Some(entry) = inner
                .idempotency
                .get(&index_key)
                .and_then(|id| inner.entries.get(id))
            {
                debug!(reminder_id = %entry.reminder.id, "Idempotency key already held, returning existing reminder");
                return Ok(CreateOutcome::Existing(entry.reminder.clone()));
            }
        }

        let now = self.clock.now();
        let next_run_time = trigger.next_fire(now)?.ok_or_else(|| {
            ReminderError::InvalidSchedule(format!(
                "time {} is not in the future",
                spec.when.map(|w| w.to_rfc3339()).unwrap_or_default()
            ))
        })?;

        let reminder = Reminder {
            id: Uuid::new_v4(),
            app_id,
            kind: spec.kind,
            when: spec.when,
            cron_expr: match &trigger {
                Trigger::Cron(expr) => Some(expr.as_str().to_string()),
                Trigger::Once { .. } => None,
            },
            webhook_url,
            payload: spec.payload.unwrap_or_else(empty_payload),
            idempotency_key,
            status: ReminderStatus::Scheduled,
            attempts: 0,
            last_error: None,
            next_run_time: Some(next_run_time),
            created_at: now,
        };

        if let Some(key) = &reminder.idempotency_key {
            inner
                .idempotency
                .insert((reminder.app_id.clone(), key.clone()), reminder.id);
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            reminder.id,
            Entry {
                reminder: reminder.clone(),
                trigger,
                in_flight: false,
                seq,
            },
        );
        drop(inner);

        telemetry::record_reminder_created(&reminder.app_id, reminder.kind.as_str());
        info!(
            reminder_id = %reminder.id,
            next_run_time = %next_run_time,
            "Reminder scheduled"
        );

        Ok(CreateOutcome::Created(reminder))
    }

    pub async fn get(&self, id: Uuid) -> Result<Reminder, ReminderError> {
        let inner = self.inner.lock().await;
        inner
            .entries
            .get(&id)
            .map(|e| e.reminder.clone())
            .ok_or(ReminderError::NotFound(id))
    }

    /// Snapshot ordered by creation time
    pub async fn list(&self, app_id: Option<&str>) -> Vec<Reminder> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<&Entry> = inner
            .entries
            .values()
            .filter(|e| app_id.map_or(true, |a| e.reminder.app_id == a))
            .collect();
        entries.sort_by_key(|e| (e.reminder.created_at, e.seq));
        entries.into_iter().map(|e| e.reminder.clone()).collect()
    }

    /// Cancel a reminder. Cancelling twice is not an error.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: Uuid) -> Result<Reminder, ReminderError> {
        let mut inner = self.inner.lock().await;
        let entry = inner.entries.get_mut(&id).ok_or(ReminderError::NotFound(id))?;

        if entry.reminder.status != ReminderStatus::Cancelled {
            if entry.in_flight {
                debug!("Cancelling reminder with delivery in flight");
            }
            entry.reminder.status = ReminderStatus::Cancelled;
            entry.reminder.next_run_time = None;
            entry.in_flight = false;
        }

        let reminder = entry.reminder.clone();
        inner.release_key(&reminder);
        info!("Reminder cancelled");

        Ok(reminder)
    }

    /// Remove every record regardless of state
    #[instrument(skip(self))]
    pub async fn clear_all(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let count = inner.entries.len();
        inner.entries.clear();
        inner.idempotency.clear();
        info!(count = count, "Registry cleared");
        count
    }

    /// Claim every scheduled reminder due at `now` and mark it in flight.
    /// A claimed reminder is not returned again until its cycle is reported.
    #[instrument(skip(self))]
    pub async fn take_due(&self, now: DateTime<Utc>) -> Vec<Reminder> {
        let mut inner = self.inner.lock().await;
        let mut due: Vec<Reminder> = inner
            .entries
            .values_mut()
            .filter(|e| {
                !e.in_flight
                    && e.reminder.status == ReminderStatus::Scheduled
                    && e.reminder.next_run_time.is_some_and(|t| t <= now)
            })
            .map(|e| {
                e.in_flight = true;
                e.reminder.attempts = 0;
                e.reminder.clone()
            })
            .collect();
        drop(inner);

        due.sort_by_key(|r| r.next_run_time);
        if !due.is_empty() {
            debug!(count = due.len(), "Claimed due reminders");
        }
        due
    }

    /// Apply the outcome of a delivery attempt. Reports for cancelled or
    /// removed reminders are discarded.
    #[instrument(skip(self, outcome), fields(attempts = outcome.attempts()))]
    pub async fn report_result(&self, id: Uuid, outcome: DeliveryOutcome) {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;

        let Some(entry) = inner.entries.get_mut(&id) else {
            debug!("Result for removed reminder discarded");
            return;
        };
        if entry.reminder.status.is_terminal() || !entry.in_flight {
            debug!(status = %entry.reminder.status, "Result for inactive reminder discarded");
            return;
        }

        match outcome {
            DeliveryOutcome::Retrying { attempts, error } => {
                entry.reminder.attempts = attempts;
                entry.reminder.last_error = Some(error);
            }
            DeliveryOutcome::Delivered { attempts } => {
                entry.reminder.attempts = attempts;
                entry.reminder.last_error = None;
                entry.in_flight = false;
                finish_cycle(entry, now, ReminderStatus::Delivered);
            }
            DeliveryOutcome::Exhausted { attempts, error } => {
                entry.reminder.attempts = attempts;
                entry.reminder.last_error = Some(error);
                entry.in_flight = false;
                finish_cycle(entry, now, ReminderStatus::Failed);
            }
        }
    }

    /// Whether the reminder still exists and has not been cancelled
    pub async fn is_active(&self, id: Uuid) -> bool {
        let inner = self.inner.lock().await;
        inner
            .entries
            .get(&id)
            .is_some_and(|e| !e.reminder.status.is_terminal())
    }

    /// Drop the claim of a cycle that ended without reporting. The cycle
    /// counts as failed: one-time reminders become `failed`, recurring ones
    /// move on to their next occurrence.
    #[instrument(skip(self, error))]
    pub async fn release(&self, id: Uuid, error: String) {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;

        let Some(entry) = inner.entries.get_mut(&id) else {
            return;
        };
        if entry.reminder.status.is_terminal() || !entry.in_flight {
            return;
        }

        warn!(error = %error, "Releasing abandoned delivery claim");
        entry.reminder.last_error = Some(error);
        entry.in_flight = false;
        finish_cycle(entry, now, ReminderStatus::Failed);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Close a cycle: one-time reminders become `terminal`, recurring ones are
/// rescheduled from `now`
fn finish_cycle(entry: &mut Entry, now: DateTime<Utc>, terminal: ReminderStatus) {
    if !entry.trigger.is_recurring() {
        entry.reminder.status = terminal;
        entry.reminder.next_run_time = None;
        info!(reminder_id = %entry.reminder.id, status = %terminal, "Reminder cycle finished");
        return;
    }

    match entry.trigger.next_fire(now) {
        Ok(Some(next)) => {
            entry.reminder.next_run_time = Some(next);
            debug!(reminder_id = %entry.reminder.id, next_run_time = %next, "Recurring reminder rescheduled");
        }
        Ok(None) | Err(_) => {
            warn!(reminder_id = %entry.reminder.id, "Recurring reminder has no further occurrence");
            entry.reminder.status = ReminderStatus::Failed;
            entry.reminder.next_run_time = None;
            entry
                .reminder
                .last_error
                .get_or_insert_with(|| "no further occurrence".to_string());
        }
    }
}

fn validate_webhook_url(raw: &str) -> Result<String, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::MissingField("notify.webhook".to_string()));
    }
    let url = reqwest::Url::parse(raw)
        .map_err(|e| ValidationError::invalid("notify.webhook", format!("'{}': {}", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ValidationError::invalid(
            "notify.webhook",
            format!("'{}' must be an http(s) URL with a host", raw),
        ));
    }
    Ok(raw.to_string())
}
