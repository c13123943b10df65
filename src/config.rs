//! Plugin and per-source configuration.
//!
//! # Environment
//!
//! - `BIND_IGNORE_ERRORS`: `true`/`false`, suppress user-visible cycle errors
//!   (default `true`)
//! - `BIND_MESSAGE_WAIT_MS`: pause after each relayed item (default `0`)
//! - `BIND_POLL_INTERVAL_SECS`: interval for sources that don't set one
//!   (default `90`)
//!
//! Loading and saving the source list is the host's business; the types here
//! are serialisable so it can do so in whatever format it already uses.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::first_run::FirstRunMode;

/// Default poll interval for timeline-style sources (90 seconds).
pub const DEFAULT_INTERVAL_SECS: u64 = 90;

/// Default poll interval for feeds (1 hour).
pub const FEED_INTERVAL_SECS: u64 = 60 * 60;

/// Upper bound (exclusive) of the random delay before a timer's first tick.
pub const JITTER_WINDOW: Duration = Duration::from_millis(3000);

/// Settings shared by every node of the plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindConfig {
    /// Keep cycle failures out of the chat; they are still logged.
    pub ignore_errors: bool,

    /// Pause the sink takes after each relayed item.
    pub message_wait: Duration,

    /// Interval for sources created without an explicit one.
    pub default_interval: Duration,
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            ignore_errors: true,
            message_wait: Duration::ZERO,
            default_interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
        }
    }
}

impl BindConfig {
    /// Read the configuration from the environment, falling back to the
    /// default for any variable that is unset or malformed.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), false).unwrap_or_default()
    }

    /// A source without a preset of its own, polled at
    /// [`default_interval`](Self::default_interval).
    pub fn source(&self, id: impl Into<String>) -> SourceConfig {
        SourceConfig::new(id).with_interval_secs(self.default_interval.as_secs())
    }

    /// Like [`from_env`](Self::from_env) but rejects malformed values.
    pub fn try_from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok(), true)
    }

    fn from_lookup(
        lookup: impl Fn(&'static str) -> Option<String>,
        strict: bool,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let ignore_errors = parse_var(&lookup, "BIND_IGNORE_ERRORS", strict, |v| {
            match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Some(true),
                "0" | "false" | "no" | "off" => Some(false),
                _ => None,
            }
        })?
        .unwrap_or(defaults.ignore_errors);

        let message_wait = parse_var(&lookup, "BIND_MESSAGE_WAIT_MS", strict, |v| {
            v.parse::<u64>().ok().map(Duration::from_millis)
        })?
        .unwrap_or(defaults.message_wait);

        let default_interval = parse_var(&lookup, "BIND_POLL_INTERVAL_SECS", strict, |v| {
            v.parse::<u64>().ok().filter(|s| *s > 0).map(Duration::from_secs)
        })?
        .unwrap_or(defaults.default_interval);

        Ok(Self {
            ignore_errors,
            message_wait,
            default_interval,
        })
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&'static str) -> Option<String>,
    key: &'static str,
    strict: bool,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>, ConfigError> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    match parse(raw.trim()) {
        Some(value) => Ok(Some(value)),
        None if strict => Err(ConfigError::InvalidValue { key, value: raw }),
        None => Ok(None),
    }
}

/// One configured poll target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique identifier, used in logs and error messages.
    pub id: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Seconds between polls; must be at least 1.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default)]
    pub first_run: FirstRunMode,
}

fn default_enabled() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    DEFAULT_INTERVAL_SECS
}

impl SourceConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            interval_secs: DEFAULT_INTERVAL_SECS,
            first_run: FirstRunMode::default(),
        }
    }

    /// A feed source: hourly polling, first run cleared by any successful
    /// cycle.
    pub fn feed(id: impl Into<String>) -> Self {
        Self {
            interval_secs: FEED_INTERVAL_SECS,
            first_run: FirstRunMode::ClearOnCycle,
            ..Self::new(id)
        }
    }

    pub fn with_interval_secs(mut self, secs: u64) -> Self {
        self.interval_secs = secs;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn interval(&self) -> Result<Duration, ConfigError> {
        validate_interval(Duration::from_secs(self.interval_secs))
    }
}

pub(crate) fn validate_interval(interval: Duration) -> Result<Duration, ConfigError> {
    if interval < Duration::from_secs(1) {
        return Err(ConfigError::ZeroInterval);
    }
    Ok(interval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let map: HashMap<&'static str, String> =
            vars.iter().map(|(k, v)| (*k, v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_plugin_defaults() {
        let cfg = BindConfig::default();
        assert!(cfg.ignore_errors);
        assert_eq!(cfg.message_wait, Duration::ZERO);
        assert_eq!(cfg.default_interval, Duration::from_secs(90));
    }

    #[test]
    fn reads_all_variables() {
        let cfg = BindConfig::from_lookup(
            lookup(&[
                ("BIND_IGNORE_ERRORS", "off"),
                ("BIND_MESSAGE_WAIT_MS", "250"),
                ("BIND_POLL_INTERVAL_SECS", " 120 "),
            ]),
            true,
        )
        .unwrap();
        assert!(!cfg.ignore_errors);
        assert_eq!(cfg.message_wait, Duration::from_millis(250));
        assert_eq!(cfg.default_interval, Duration::from_secs(120));
    }

    #[test]
    fn strict_lookup_rejects_garbage() {
        let err = BindConfig::from_lookup(lookup(&[("BIND_MESSAGE_WAIT_MS", "soon")]), true)
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: "BIND_MESSAGE_WAIT_MS",
                value: "soon".into()
            }
        );
    }

    #[test]
    fn lenient_lookup_falls_back_per_variable() {
        let cfg = BindConfig::from_lookup(
            lookup(&[("BIND_POLL_INTERVAL_SECS", "0"), ("BIND_IGNORE_ERRORS", "false")]),
            false,
        )
        .unwrap();
        assert_eq!(cfg.default_interval, Duration::from_secs(90));
        assert!(!cfg.ignore_errors);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let cfg = SourceConfig::new("x").with_interval_secs(0);
        assert_eq!(cfg.interval(), Err(ConfigError::ZeroInterval));
        assert_eq!(
            SourceConfig::new("x").interval(),
            Ok(Duration::from_secs(DEFAULT_INTERVAL_SECS))
        );
    }

    #[test]
    fn feed_preset_polls_hourly() {
        let cfg = SourceConfig::feed("news");
        assert_eq!(cfg.interval_secs, 3600);
        assert_eq!(cfg.first_run, FirstRunMode::ClearOnCycle);
        assert!(cfg.enabled);
    }

    #[test]
    fn default_interval_applies_only_to_sources_without_a_preset() {
        let cfg = BindConfig {
            default_interval: Duration::from_secs(120),
            ..BindConfig::default()
        };
        assert_eq!(cfg.source("lists").interval_secs, 120);
        assert_eq!(SourceConfig::feed("http://e.x/rss").interval_secs, FEED_INTERVAL_SECS);
    }

    #[test]
    fn source_config_fills_missing_fields() {
        let cfg: SourceConfig = serde_json::from_str(r#"{"id":"lists"}"#).unwrap();
        assert_eq!(cfg, SourceConfig::new("lists"));

        let json = r#"{"id":"f","enabled":false,"interval_secs":60,"first_run":"clear_on_cycle"}"#;
        let cfg: SourceConfig = serde_json::from_str(json).unwrap();
        assert!(!cfg.enabled);
        assert_eq!(cfg.interval_secs, 60);
        assert_eq!(cfg.first_run, FirstRunMode::ClearOnCycle);
    }
}
