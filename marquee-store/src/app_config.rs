use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub lock_store: LockStoreConfig,
    #[serde(default)]
    pub kafka: Option<KafkaConfig>,
    pub auth: AuthConfig,
    #[serde(default)]
    pub booking_rules: BookingRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Unset runs bookings in memory.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LockBackend {
    Redis,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LockStoreConfig {
    pub backend: LockBackend,
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
}

fn default_operation_timeout_ms() -> u64 {
    250
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_notification_topic")]
    pub notification_topic: String,
}

fn default_notification_topic() -> String {
    "booking-notifications".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Shared secret the payment gateway sends in `X-Webhook-Secret`.
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingRules {
    pub cancellation_cutoff_hours: i64,
    pub pending_payment_timeout_seconds: u64,
    pub sweep_interval_seconds: u64,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            cancellation_cutoff_hours: 2,
            pending_payment_timeout_seconds: 900,
            sweep_interval_seconds: 60,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `MARQUEE__LOCK_STORE__BACKEND=memory`
            .add_source(config::Environment::with_prefix("MARQUEE").separator("__"))
            .build()?;

        s.try_deserialize::<Config>()?.validate()
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(self) -> Result<Self, config::ConfigError> {
        let rules = &self.booking_rules;
        if rules.sweep_interval_seconds == 0 {
            return Err(config::ConfigError::Message(
                "booking_rules.sweep_interval_seconds must be at least 1".to_string(),
            ));
        }
        if rules.pending_payment_timeout_seconds == 0 {
            return Err(config::ConfigError::Message(
                "booking_rules.pending_payment_timeout_seconds must be at least 1".to_string(),
            ));
        }
        if rules.cancellation_cutoff_hours < 0 {
            return Err(config::ConfigError::Message(
                "booking_rules.cancellation_cutoff_hours cannot be negative".to_string(),
            ));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    #[test]
    fn test_defaults_fill_optional_sections() {
        let raw = r#"
            [server]
            port = 8080

            [lock_store]
            backend = "memory"

            [auth]
            jwt_secret = "secret"
        "#;
        let config: Config = config::Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.lock_store.backend, LockBackend::Memory);
        assert_eq!(config.lock_store.operation_timeout_ms, 250);
        assert!(config.database.url.is_none());
        assert!(config.kafka.is_none());
        assert_eq!(config.booking_rules.cancellation_cutoff_hours, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_sweep_interval_rejected() {
        let raw = r#"
            [server]
            port = 8080

            [lock_store]
            backend = "memory"

            [auth]
            jwt_secret = "secret"

            [booking_rules]
            cancellation_cutoff_hours = 2
            pending_payment_timeout_seconds = 900
            sweep_interval_seconds = 0
        "#;
        let config: Config = config::Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sweep_interval_seconds"));
    }
}
