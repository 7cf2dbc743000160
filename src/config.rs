use std::env;
use std::time::Duration;

use crate::error::ConfigError;
use crate::monitor::MonitorConfig;
use crate::sampler::DEFAULT_INTERVAL;

const ENV_ENABLED: &str = "MONITOR_ENABLED";
const ENV_REDIS_URL: &str = "MONITOR_REDIS_URL";
const ENV_INTERVAL_MS: &str = "MONITOR_INTERVAL_MS";

/// Process-level switches for the demo binary.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Monitoring on/off. Defaults to on in debug builds only.
    pub enabled: bool,
    /// External sink location. `None` keeps records in memory.
    pub redis_url: Option<String>,
    pub interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: cfg!(debug_assertions),
            redis_url: None,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Settings::from_env`] but reading from any key source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(raw) = lookup(ENV_ENABLED) {
            settings.enabled = parse_bool(&raw).ok_or(ConfigError::InvalidValue {
                var: ENV_ENABLED,
                value: raw,
            })?;
        }

        settings.redis_url = lookup(ENV_REDIS_URL).filter(|url| !url.trim().is_empty());

        if let Some(raw) = lookup(ENV_INTERVAL_MS) {
            let ms = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or(ConfigError::InvalidValue {
                    var: ENV_INTERVAL_MS,
                    value: raw,
                })?;
            settings.interval = Duration::from_millis(ms);
        }

        Ok(settings)
    }

    /// Monitor config seeded from these settings. Sink and name stay unset.
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            enabled: self.enabled,
            interval: self.interval,
            ..Default::default()
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
