//! Client configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate, overlaid with `CASELINK__*` environment variables.
//! Each sub-module represents a logical configuration section.

pub mod api;
pub mod logging;
pub mod polling;
pub mod realtime;
pub mod session;

use serde::{Deserialize, Serialize};

pub use self::api::ApiConfig;
pub use self::logging::LoggingConfig;
pub use self::polling::PollingConfig;
pub use self::realtime::RealtimeConfig;
pub use self::session::{MAX_SESSION_SECONDS, SessionConfig, StoreConfig};

use crate::error::AppError;

/// Root client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// REST API settings.
    #[serde(default)]
    pub api: ApiConfig,
    /// Session and store settings.
    #[serde(default)]
    pub session: SessionConfig,
    /// Hub connection settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Polling fallback settings.
    #[serde(default)]
    pub polling: PollingConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file plus `CASELINK__*` environment
    /// variables. A missing file is not an error; every field has a default.
    pub fn load(path: &str) -> Result<Self, AppError> {
        Self::build(path, None)
    }

    /// Like [`AppConfig::load`], with an additional `config/<env>` overlay
    /// applied between the base file and the environment variables.
    pub fn load_with_env(path: &str, env: &str) -> Result<Self, AppError> {
        Self::build(path, Some(env))
    }

    fn build(path: &str, env: Option<&str>) -> Result<Self, AppError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name(path).required(false));

        if let Some(env) = env {
            builder = builder
                .add_source(config::File::with_name(&format!("config/{env}")).required(false));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("CASELINK")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("realtime.reconnect_schedule_ms"),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let parsed: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        parsed.validate()?;
        Ok(parsed)
    }

    /// Reject settings the sync layer cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.realtime.reconnect_schedule_ms.is_empty() {
            return Err(AppError::configuration(
                "realtime.reconnect_schedule_ms must contain at least one delay",
            ));
        }
        if self.realtime.max_outer_retries == 0 {
            return Err(AppError::configuration(
                "realtime.max_outer_retries must be at least 1",
            ));
        }
        if self.realtime.debounce_delay_ms == 0 {
            return Err(AppError::configuration(
                "realtime.debounce_delay_ms must be greater than zero",
            ));
        }
        if self.realtime.channel_buffer_size == 0 {
            return Err(AppError::configuration(
                "realtime.channel_buffer_size must be greater than zero",
            ));
        }
        if self.realtime.handshake_timeout_seconds == 0 {
            return Err(AppError::configuration(
                "realtime.handshake_timeout_seconds must be greater than zero",
            ));
        }
        if self.realtime.keepalive_interval_seconds == 0 {
            return Err(AppError::configuration(
                "realtime.keepalive_interval_seconds must be greater than zero",
            ));
        }
        if !(1..=MAX_SESSION_SECONDS).contains(&self.session.session_ttl_seconds) {
            return Err(AppError::configuration(format!(
                "session.session_ttl_seconds must be between 1 and {MAX_SESSION_SECONDS}"
            )));
        }
        if self.session.token_refresh_lead_seconds == 0
            || self.session.token_refresh_lead_seconds >= self.session.session_ttl_seconds
        {
            return Err(AppError::configuration(
                "session.token_refresh_lead_seconds must be positive and below session.session_ttl_seconds",
            ));
        }
        if self.polling.interval_seconds == 0 {
            return Err(AppError::configuration(
                "polling.interval_seconds must be greater than zero",
            ));
        }
        if self.session.privileged_role.trim().is_empty() {
            return Err(AppError::configuration(
                "session.privileged_role must not be empty",
            ));
        }
        Ok(())
    }
}
