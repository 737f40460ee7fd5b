// Dispatcher: bounded pool of delivery cycles with retry and backoff
//
// Workers only ever see copies of reminders and talk back to the registry
// through `report_result`.

use crate::config::DeliveryConfig;
use crate::errors::DeliveryError;
use crate::models::{DeliveryOutcome, Reminder};
use crate::registry::ReminderRegistry;
use crate::retry::{ExponentialBackoff, RetryStrategy};
use crate::telemetry;
use crate::webhook::{Delivery, Notifier, WebhookNotifier};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

struct Shared {
    registry: Arc<ReminderRegistry>,
    notifier: Arc<dyn Notifier>,
    retry: Arc<dyn RetryStrategy>,
    permits: Arc<Semaphore>,
    cycle_deadline: Duration,
}

/// Spawned cycles and the reminder each one owns
#[derive(Default)]
struct Cycles {
    set: JoinSet<()>,
    owners: HashMap<Id, Uuid>,
}

/// Runs firing cycles concurrently, at most `concurrency` at a time
pub struct Dispatcher {
    shared: Arc<Shared>,
    tasks: Mutex<Cycles>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ReminderRegistry>,
        notifier: Arc<dyn Notifier>,
        retry: Arc<dyn RetryStrategy>,
        concurrency: usize,
        cycle_deadline: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry,
                notifier,
                retry,
                permits: Arc::new(Semaphore::new(concurrency.max(1))),
                cycle_deadline,
            }),
            tasks: Mutex::new(Cycles::default()),
        }
    }

    /// Build a dispatcher posting real webhooks per the delivery settings
    pub fn from_config(
        registry: Arc<ReminderRegistry>,
        config: &DeliveryConfig,
    ) -> Result<Self, DeliveryError> {
        let notifier = WebhookNotifier::new(config.request_timeout(), config.signing_secret.clone())?;
        let retry = ExponentialBackoff::with_config(
            config.max_attempts,
            config.backoff_base(),
            config.backoff_multiplier,
            config.backoff_max(),
            config.jitter_factor,
        );

        Ok(Self::new(
            registry,
            Arc::new(notifier),
            Arc::new(retry),
            config.concurrency,
            config.cycle_deadline(),
        ))
    }

    /// Start a firing cycle in the background. Returns without waiting for a
    /// free worker so a busy pool never stalls the scheduler tick.
    pub async fn dispatch(&self, reminder: Reminder, fired_at: DateTime<Utc>) {
        let mut tasks = self.tasks.lock().await;
        self.reap_finished(&mut tasks).await;

        let reminder_id = reminder.id;
        let shared = Arc::clone(&self.shared);
        let span = info_span!(
            "delivery_cycle",
            reminder_id = %reminder.id,
            app_id = %reminder.app_id
        );
        let handle = tasks.set.spawn(
            async move {
                let Ok(_permit) = Arc::clone(&shared.permits).acquire_owned().await else {
                    return;
                };
                shared.run_cycle(reminder, fired_at).await;
            }
            .instrument(span),
        );
        tasks.owners.insert(handle.id(), reminder_id);
    }

    /// Collect cycles that already finished. A cycle that panicked never
    /// reported back, so its claim is released here.
    pub async fn reap(&self) {
        let mut tasks = self.tasks.lock().await;
        self.reap_finished(&mut tasks).await;
    }

    async fn reap_finished(&self, tasks: &mut Cycles) {
        while let Some(result) = tasks.set.try_join_next_with_id() {
            self.settle(tasks, result).await;
        }
    }

    async fn settle(&self, tasks: &mut Cycles, result: Result<(Id, ()), JoinError>) {
        match result {
            Ok((id, ())) => {
                tasks.owners.remove(&id);
            }
            Err(e) => {
                let owner = tasks.owners.remove(&e.id());
                if !e.is_panic() {
                    return;
                }
                error!(error = %e, "Delivery cycle panicked");
                if let Some(reminder_id) = owner {
                    self.shared
                        .registry
                        .release(reminder_id, format!("delivery cycle panicked: {}", e))
                        .await;
                }
            }
        }
    }

    /// Run one firing cycle inline. Returns `None` when the cycle was
    /// abandoned because the reminder was cancelled or removed.
    pub async fn run_cycle(
        &self,
        reminder: Reminder,
        fired_at: DateTime<Utc>,
    ) -> Option<DeliveryOutcome> {
        self.shared.run_cycle(reminder, fired_at).await
    }

    /// Number of cycles spawned and not yet reaped
    pub async fn in_flight(&self) -> usize {
        self.tasks.lock().await.set.len()
    }

    /// Wait up to `grace` for running cycles, then abort whatever is left
    pub async fn drain(&self, grace: Duration) {
        let mut tasks = self.tasks.lock().await;
        if tasks.set.is_empty() {
            return;
        }

        info!(in_flight = tasks.set.len(), grace_ms = grace.as_millis() as u64, "Draining delivery cycles");
        let drained = tokio::time::timeout(grace, async {
            while let Some(result) = tasks.set.join_next_with_id().await {
                self.settle(&mut tasks, result).await;
            }
        })
        .await;

        if drained.is_err() {
            warn!(remaining = tasks.set.len(), "Grace period elapsed, aborting delivery cycles");
            tasks.set.abort_all();
            while let Some(result) = tasks.set.join_next_with_id().await {
                self.settle(&mut tasks, result).await;
            }
        }
    }
}

impl Shared {
    async fn run_cycle(&self, reminder: Reminder, fired_at: DateTime<Utc>) -> Option<DeliveryOutcome> {
        let started = Instant::now();
        let max_attempts = self.retry.max_attempts();
        let mut attempt = 1;

        loop {
            if !self.registry.is_active(reminder.id).await {
                debug!(attempt = attempt, "Reminder no longer active, abandoning cycle");
                return None;
            }

            let delivery = Delivery::new(&reminder, fired_at, attempt);
            let remaining = self.cycle_deadline.saturating_sub(started.elapsed());
            let attempt_started = Instant::now();
            let result = match tokio::time::timeout(remaining, self.notifier.notify(&delivery)).await {
                Ok(result) => result,
                Err(_) => Err(DeliveryError::DeadlineExceeded(self.cycle_deadline)),
            };
            telemetry::record_delivery_duration(attempt_started.elapsed().as_secs_f64());

            let error = match result {
                Ok(()) => {
                    info!(attempt = attempt, "Webhook delivered");
                    telemetry::record_delivery_success(&reminder.app_id);
                    let outcome = DeliveryOutcome::Delivered { attempts: attempt };
                    self.registry.report_result(reminder.id, outcome.clone()).await;
                    return Some(outcome);
                }
                Err(err) => err,
            };

            let next_delay = match &error {
                DeliveryError::DeadlineExceeded(_) => None,
                _ => self.retry.next_delay(attempt),
            };

            let Some(delay) = next_delay else {
                return Some(self.exhaust(&reminder, attempt, error.to_string()).await);
            };

            if started.elapsed() + delay >= self.cycle_deadline {
                let message = format!(
                    "{}; {}",
                    error,
                    DeliveryError::DeadlineExceeded(self.cycle_deadline)
                );
                return Some(self.exhaust(&reminder, attempt, message).await);
            }

            warn!(
                attempt = attempt,
                max_attempts = max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Webhook delivery failed, retrying"
            );
            telemetry::record_delivery_failure(&reminder.app_id, "retrying");
            self.registry
                .report_result(
                    reminder.id,
                    DeliveryOutcome::Retrying {
                        attempts: attempt,
                        error: error.to_string(),
                    },
                )
                .await;

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn exhaust(&self, reminder: &Reminder, attempts: u32, error: String) -> DeliveryOutcome {
        warn!(attempts = attempts, error = %error, "Webhook delivery exhausted");
        telemetry::record_delivery_failure(&reminder.app_id, "exhausted");
        let outcome = DeliveryOutcome::Exhausted { attempts, error };
        self.registry.report_result(reminder.id, outcome.clone()).await;
        outcome
    }
}
