// Configuration management with layered configuration (defaults, files, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub cors: CorsConfig,
    pub scheduler: SchedulerConfig,
    pub delivery: DeliveryConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared key every caller presents
    pub api_key: String,
    pub header_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub tick_interval_ms: u64,
    /// How long shutdown waits for in-flight deliveries
    pub shutdown_grace_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    pub max_attempts: u32,
    pub request_timeout_seconds: u64,
    /// Upper bound on one firing cycle, retries and backoff included
    pub cycle_deadline_seconds: u64,
    pub backoff_base_ms: u64,
    pub backoff_multiplier: u32,
    pub backoff_max_ms: u64,
    pub jitter_factor: f64,
    /// Maximum concurrent firing cycles
    pub concurrency: usize,
    #[serde(default)]
    pub signing_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_metrics_enabled() -> bool {
    true
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Built-in defaults so partial files are enough
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // URNS__AUTH__API_KEY=... style overrides
            .add_source(
                Environment::with_prefix("URNS")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("cors.allowed_origins")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port must be greater than 0".to_string());
        }

        if self.auth.api_key.trim().is_empty() {
            return Err("Auth api_key cannot be empty".to_string());
        }
        if self.auth.header_name.trim().is_empty() {
            return Err("Auth header_name cannot be empty".to_string());
        }

        if self.scheduler.tick_interval_ms == 0 {
            return Err("Scheduler tick_interval_ms must be greater than 0".to_string());
        }

        if self.delivery.max_attempts == 0 {
            return Err("Delivery max_attempts must be greater than 0".to_string());
        }
        if self.delivery.concurrency == 0 {
            return Err("Delivery concurrency must be greater than 0".to_string());
        }
        if self.delivery.cycle_deadline_seconds == 0 {
            return Err("Delivery cycle_deadline_seconds must be greater than 0".to_string());
        }
        if self.delivery.request_timeout_seconds == 0 {
            return Err("Delivery request_timeout_seconds must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.delivery.jitter_factor) {
            return Err("Delivery jitter_factor must be between 0.0 and 1.0".to_string());
        }

        Ok(())
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

impl DeliveryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn cycle_deadline(&self) -> Duration {
        Duration::from_secs(self.cycle_deadline_seconds)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8081,
            },
            auth: AuthConfig {
                api_key: "dev-key".to_string(),
                header_name: "x-app-key".to_string(),
            },
            cors: CorsConfig {
                allowed_origins: vec![
                    "http://127.0.0.1:8080".to_string(),
                    "http://localhost:8080".to_string(),
                ],
            },
            scheduler: SchedulerConfig {
                tick_interval_ms: 1000,
                shutdown_grace_seconds: 10,
            },
            delivery: DeliveryConfig {
                max_attempts: 3,
                request_timeout_seconds: 5,
                cycle_deadline_seconds: 60,
                backoff_base_ms: 2000,
                backoff_multiplier: 4,
                backoff_max_ms: 30_000,
                jitter_factor: 0.1,
                concurrency: 16,
                signing_secret: None,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: false,
                metrics_enabled: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.server.port, 8081);
        assert_eq!(settings.auth.api_key, "dev-key");
    }

    #[test]
    fn test_validation_catches_zero_port() {
        let mut settings = Settings::default();
        settings.server.port = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_empty_api_key() {
        let mut settings = Settings::default();
        settings.auth.api_key = "  ".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_bad_delivery_values() {
        let mut settings = Settings::default();
        settings.delivery.max_attempts = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.delivery.concurrency = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.delivery.cycle_deadline_seconds = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.delivery.jitter_factor = 1.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_zero_tick() {
        let mut settings = Settings::default();
        settings.scheduler.tick_interval_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_partial_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            r#"
[server]
port = 9000

[delivery]
max_attempts = 5
signing_secret = "s3cret"
"#,
        )
        .unwrap();

        let settings = Settings::load_from_path(dir.path()).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.delivery.max_attempts, 5);
        assert_eq!(settings.delivery.signing_secret.as_deref(), Some("s3cret"));
        // Untouched values keep their defaults
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.delivery.request_timeout_seconds, 5);
    }

    #[test]
    fn test_local_file_wins_over_default_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("default.toml"), "[auth]\napi_key = \"a\"\n").unwrap();
        fs::write(dir.path().join("local.toml"), "[auth]\napi_key = \"b\"\n").unwrap();

        let settings = Settings::load_from_path(dir.path()).unwrap();
        assert_eq!(settings.auth.api_key, "b");
    }

    /// Restores the previous value of an environment variable on drop
    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let previous = std::env::var(key).ok();
            std::env::set_var(key, value);
            Self { key, previous }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.previous {
                Some(value) => std::env::set_var(self.key, value),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn test_environment_overrides_files() {
        // Keys here are not asserted by any other test in this module
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            "[auth]\nheader_name = \"x-from-file\"\n\n[delivery]\nconcurrency = 2\n",
        )
        .unwrap();

        let _header = EnvGuard::set("URNS__AUTH__HEADER_NAME", "x-from-env");
        let _concurrency = EnvGuard::set("URNS__DELIVERY__CONCURRENCY", "32");
        let _origins = EnvGuard::set(
            "URNS__CORS__ALLOWED_ORIGINS",
            "http://localhost:3000,https://app.example.com",
        );

        let settings = Settings::load_from_path(dir.path()).unwrap();
        assert_eq!(settings.auth.header_name, "x-from-env");
        assert_eq!(settings.delivery.concurrency, 32);
        assert_eq!(
            settings.cors.allowed_origins,
            vec!["http://localhost:3000", "https://app.example.com"]
        );
    }

    #[test]
    fn test_missing_directory_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load_from_path(dir.path().join("absent")).unwrap();
        assert_eq!(settings.scheduler.tick_interval(), Duration::from_secs(1));
        assert_eq!(settings.delivery.backoff_base(), Duration::from_secs(2));
    }
}
