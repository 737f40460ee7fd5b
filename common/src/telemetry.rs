// Telemetry module for structured logging and metrics

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize structured logging
///
/// `RUST_LOG` takes precedence over `log_level`. With `json` set every event
/// is emitted as one JSON object carrying the current span fields.
pub fn init_logging(log_level: &str, json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let registry = tracing_subscriber::registry();

    if json {
        let json_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_filter(env_filter);
        registry
            .with(json_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    } else {
        let text_layer = fmt::layer().with_target(true).with_filter(env_filter);
        registry
            .with(text_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    }

    tracing::info!(log_level = log_level, json = json, "Structured logging initialized");

    Ok(())
}

/// Install the Prometheus recorder and describe all metrics
///
/// The returned handle renders the exposition text for the `/metrics` route.
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    describe_counter!("reminder_created_total", "Total number of reminders created");
    describe_counter!(
        "reminder_delivery_success_total",
        "Total number of firing cycles delivered successfully"
    );
    describe_counter!(
        "reminder_delivery_failure_total",
        "Total number of failed delivery attempts, by reason"
    );
    describe_histogram!(
        "reminder_delivery_duration_seconds",
        "Duration of single webhook delivery attempts in seconds"
    );
    describe_gauge!(
        "reminder_due_batch_size",
        "Number of reminders found due on the last scheduler tick"
    );

    tracing::info!("Prometheus metrics recorder installed");

    Ok(handle)
}

#[inline]
pub fn record_reminder_created(app_id: &str, kind: &str) {
    counter!(
        "reminder_created_total",
        "app_id" => app_id.to_string(),
        "type" => kind.to_string()
    )
    .increment(1);
}

#[inline]
pub fn record_delivery_success(app_id: &str) {
    counter!("reminder_delivery_success_total", "app_id" => app_id.to_string()).increment(1);
}

/// `reason` is `retrying` or `exhausted`
#[inline]
pub fn record_delivery_failure(app_id: &str, reason: &str) {
    counter!(
        "reminder_delivery_failure_total",
        "app_id" => app_id.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

#[inline]
pub fn record_delivery_duration(duration_seconds: f64) {
    histogram!("reminder_delivery_duration_seconds").record(duration_seconds);
}

#[inline]
pub fn update_due_batch_size(size: usize) {
    gauge!("reminder_due_batch_size").set(size as f64);
}
