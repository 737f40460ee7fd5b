// Scheduler engine: periodic tick handing due reminders to the dispatcher

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::dispatcher::Dispatcher;
use crate::registry::ReminderRegistry;
use crate::telemetry;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument};

/// Scheduler trait for reminder scheduling operations
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Run the tick loop until `stop` is called, then drain in-flight deliveries
    async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Signal the tick loop to stop
    async fn stop(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Claim due reminders and hand them to the dispatcher, returning how many
    async fn process_due_reminders(&self) -> usize;
}

/// Main scheduler engine implementation
pub struct SchedulerEngine {
    tick_interval: Duration,
    shutdown_grace: Duration,
    registry: Arc<ReminderRegistry>,
    dispatcher: Arc<Dispatcher>,
    clock: Arc<dyn Clock>,
    shutdown_tx: watch::Sender<bool>,
}

impl SchedulerEngine {
    pub fn new(
        config: &SchedulerConfig,
        registry: Arc<ReminderRegistry>,
        dispatcher: Arc<Dispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);

        Self {
            tick_interval: config.tick_interval().max(Duration::from_millis(1)),
            shutdown_grace: config.shutdown_grace(),
            registry,
            dispatcher,
            clock,
            shutdown_tx,
        }
    }

    /// Get a shutdown signal receiver
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }
}

#[async_trait]
impl Scheduler for SchedulerEngine {
    #[instrument(skip(self))]
    async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(
            tick_interval_ms = self.tick_interval.as_millis() as u64,
            "Starting scheduler engine"
        );

        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut shutdown_rx = self.shutdown_receiver();

        while !*shutdown_rx.borrow_and_update() {
            tokio::select! {
                _ = ticker.tick() => {
                    let count = self.process_due_reminders().await;
                    if count > 0 {
                        info!(reminders_dispatched = count, "Dispatched due reminders");
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Shutdown signal received, stopping scheduler");

        self.dispatcher.drain(self.shutdown_grace).await;

        info!("Scheduler engine stopped");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!("Stopping scheduler engine");
        self.shutdown_tx.send_replace(true);
        Ok(())
    }

    async fn process_due_reminders(&self) -> usize {
        // Settle finished cycles first so released claims are due again
        self.dispatcher.reap().await;

        let now = self.clock.now();
        let due = self.registry.take_due(now).await;
        let count = due.len();
        telemetry::update_due_batch_size(count);

        if count == 0 {
            debug!("No reminders due");
        }
        for reminder in due {
            self.dispatcher.dispatch(reminder, now).await;
        }

        count
    }
}
