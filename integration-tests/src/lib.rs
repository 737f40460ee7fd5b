// Shared fixtures for end-to-end engine tests

use chrono::{DateTime, Utc};
use common::clock::Clock;
use common::config::SchedulerConfig;
use common::dispatcher::Dispatcher;
use common::registry::ReminderRegistry;
use common::retry::{FixedDelay, RetryStrategy};
use common::scheduler::SchedulerEngine;
use common::webhook::WebhookNotifier;
use std::sync::Arc;
use std::time::Duration;

/// Signing secret used by every harness-built notifier
pub const SIGNING_SECRET: &str = "integration-secret";

/// Fully wired engine posting real HTTP requests
pub struct Harness {
    pub registry: Arc<ReminderRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub engine: Arc<SchedulerEngine>,
}

pub struct HarnessOptions {
    pub tick_interval: Duration,
    pub retry: Arc<dyn RetryStrategy>,
    pub request_timeout: Duration,
    pub cycle_deadline: Duration,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(50),
            retry: Arc::new(FixedDelay::new(Duration::from_millis(20), 3)),
            request_timeout: Duration::from_secs(2),
            cycle_deadline: Duration::from_secs(10),
        }
    }
}

impl Harness {
    pub fn new(clock: Arc<dyn Clock>, options: HarnessOptions) -> anyhow::Result<Self> {
        let registry = Arc::new(ReminderRegistry::new(clock.clone()));
        let notifier = WebhookNotifier::new(
            options.request_timeout,
            Some(SIGNING_SECRET.to_string()),
        )?;
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            Arc::new(notifier),
            options.retry,
            8,
            options.cycle_deadline,
        ));
        let config = SchedulerConfig {
            tick_interval_ms: options.tick_interval.as_millis() as u64,
            shutdown_grace_seconds: 5,
        };
        let engine = Arc::new(SchedulerEngine::new(
            &config,
            registry.clone(),
            dispatcher.clone(),
            clock,
        ));

        Ok(Self {
            registry,
            dispatcher,
            engine,
        })
    }
}

/// Parse the `fired_at` field of a delivered body
pub fn fired_at(body: &serde_json::Value) -> Option<DateTime<Utc>> {
    body.get("fired_at")?
        .as_str()?
        .parse::<DateTime<Utc>>()
        .ok()
}
