use std::sync::Arc;

use common::config::Settings;
use common::registry::ReminderRegistry;
use metrics_exporter_prometheus::PrometheusHandle;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ReminderRegistry>,
    pub config: Arc<Settings>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    /// Create a new AppState instance
    pub fn new(
        registry: Arc<ReminderRegistry>,
        config: Settings,
        metrics_handle: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            registry,
            config: Arc::new(config),
            metrics_handle,
        }
    }
}
