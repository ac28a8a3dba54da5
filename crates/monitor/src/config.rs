use std::time::Duration;

use emission_core::error::CoreError;
use emission_core::thresholds::ThresholdConfig;
use emission_telemetry::{ReconnectPolicy, TelemetryConfig};

/// Errors raised while reading the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Thresholds(#[from] CoreError),
}

/// Monitor configuration loaded from environment variables.
///
/// All fields have defaults suitable for a bench setup where the
/// telemetry bridge and records API run on the same machine.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Telemetry WebSocket endpoint.
    pub telemetry_url: String,
    /// Records API base URL.
    pub api_base_url: String,
    pub reconnect: ReconnectPolicy,
    pub thresholds: ThresholdConfig,
}

impl MonitorConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var               | Default                     |
    /// |-----------------------|-----------------------------|
    /// | `TELEMETRY_URL`       | `http://localhost:3001`     |
    /// | `API_BASE_URL`        | `http://localhost:3001/api` |
    /// | `RECONNECT_DELAY_MS`  | `1000`                      |
    /// | `RECONNECT_ATTEMPTS`  | `5`                         |
    /// | `THRESHOLDS_VERSION`  | `1`                         |
    /// | `THRESHOLD_A_CAUTION` | `300`                       |
    /// | `THRESHOLD_A_DANGER`  | `600`                       |
    /// | `THRESHOLD_B_CAUTION` | `75`                        |
    /// | `THRESHOLD_B_DANGER`  | `150`                       |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let telemetry_url = lookup("TELEMETRY_URL")
            .unwrap_or_else(|| "http://localhost:3001".into());
        let api_base_url = lookup("API_BASE_URL")
            .unwrap_or_else(|| "http://localhost:3001/api".into());

        let defaults = ReconnectPolicy::default();
        let delay_ms: u64 = parse_var(
            &lookup,
            "RECONNECT_DELAY_MS",
            defaults.delay.as_millis() as u64,
        )?;
        let max_attempts: u32 = parse_var(&lookup, "RECONNECT_ATTEMPTS", defaults.max_attempts)?;

        let mut thresholds = ThresholdConfig::default();
        thresholds.version = parse_var(&lookup, "THRESHOLDS_VERSION", thresholds.version)?;
        thresholds.channel_a.caution_above =
            parse_var(&lookup, "THRESHOLD_A_CAUTION", thresholds.channel_a.caution_above)?;
        thresholds.channel_a.danger_above =
            parse_var(&lookup, "THRESHOLD_A_DANGER", thresholds.channel_a.danger_above)?;
        thresholds.channel_b.caution_above =
            parse_var(&lookup, "THRESHOLD_B_CAUTION", thresholds.channel_b.caution_above)?;
        thresholds.channel_b.danger_above =
            parse_var(&lookup, "THRESHOLD_B_DANGER", thresholds.channel_b.danger_above)?;
        thresholds.validate()?;

        Ok(Self {
            telemetry_url,
            api_base_url,
            reconnect: ReconnectPolicy {
                delay: Duration::from_millis(delay_ms),
                max_attempts,
            },
            thresholds,
        })
    }

    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            reconnect: self.reconnect,
            ..TelemetryConfig::new(self.telemetry_url.clone())
        }
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
