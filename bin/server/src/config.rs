//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables. Nested keys
//! use `__` as the separator, e.g. `NOTIFIER__BOT_TOKEN`.

use serde::Deserialize;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// Address the HTTP listener binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Failure notification configuration.
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Trigger loop configuration.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Where failed-run notifications are delivered.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    /// Bot token for direct messages. When unset, failures are only logged.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Base URL of the platform Web API.
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

/// Trigger loop cadence.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Milliseconds between ticks of the time and cron loops.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

fn default_listen_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_api_base() -> String {
    "https://slack.com/api".to_string()
}

fn default_tick_interval_ms() -> u64 {
    1000
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base: default_api_base(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl SchedulerConfig {
    /// The tick interval as a duration.
    #[must_use]
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Self>()?
            .validated()
    }

    /// Rejects values that deserialize but cannot be used.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheduler tick interval is zero.
    pub fn validated(self) -> Result<Self, config::ConfigError> {
        if self.scheduler.tick_interval_ms == 0 {
            return Err(config::ConfigError::Message(
                "scheduler.tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_sections() {
        let config: ServerConfig = config::Config::builder()
            .set_override("database_url", "postgres://localhost/flowrun")
            .expect("override")
            .build()
            .expect("build")
            .try_deserialize()
            .expect("deserialize");

        assert_eq!(config.listen_addr, "127.0.0.1:3000");
        assert!(config.notifier.bot_token.is_none());
        assert_eq!(config.notifier.api_base, "https://slack.com/api");
        assert_eq!(config.scheduler.tick(), Duration::from_secs(1));
    }

    #[test]
    fn nested_values_override_defaults() {
        let config: ServerConfig = config::Config::builder()
            .set_override("database_url", "postgres://localhost/flowrun")
            .expect("override")
            .set_override("notifier.bot_token", "xoxb-test")
            .expect("override")
            .set_override("scheduler.tick_interval_ms", 250)
            .expect("override")
            .build()
            .expect("build")
            .try_deserialize()
            .expect("deserialize");

        assert_eq!(config.notifier.bot_token.as_deref(), Some("xoxb-test"));
        assert_eq!(config.scheduler.tick_interval_ms, 250);
    }

    #[test]
    fn zero_tick_interval_is_rejected() {
        let err = config::Config::builder()
            .set_override("database_url", "postgres://localhost/flowrun")
            .expect("override")
            .set_override("scheduler.tick_interval_ms", 0)
            .expect("override")
            .build()
            .expect("build")
            .try_deserialize::<ServerConfig>()
            .expect("deserialize")
            .validated()
            .expect_err("zero tick must be rejected");

        assert!(err.to_string().contains("tick_interval_ms"));
    }
}
