//! Application configuration loaded from the environment.
//!
//! Keys are read verbatim (case-insensitive) from the process environment,
//! after `.env` has been merged in by `dotenvy`.

use custom_debug_derive::Debug;
use figment::{Figment, providers::Env};
use fundu::{DurationParser, TimeUnit};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base level for the `sprout` crate when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[debug(with = "crate::fmt::redacted")]
    pub database_url: String,
    /// Grace period given to services during shutdown.
    #[serde(
        default = "default_shutdown_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub shutdown_timeout: Duration,

    #[debug(with = "crate::fmt::redacted_opt")]
    pub brave_search_api_key: Option<String>,
    #[serde(default = "default_brave_search_base_url")]
    pub brave_search_base_url: String,

    #[debug(with = "crate::fmt::redacted_opt")]
    pub anthropic_api_key: Option<String>,
    #[serde(default = "default_anthropic_base_url")]
    pub anthropic_base_url: String,
    #[serde(default = "default_anthropic_model")]
    pub anthropic_model: String,

    /// Minimum time between two unforced price refresh runs.
    #[serde(
        default = "default_refresh_cooldown",
        deserialize_with = "deserialize_duration"
    )]
    pub refresh_cooldown: Duration,
    /// Spacing enforced between consecutive search requests.
    #[serde(
        default = "default_refresh_pace",
        deserialize_with = "deserialize_duration"
    )]
    pub refresh_pace: Duration,
    /// A `running` status not rewritten for this long is treated as abandoned.
    #[serde(
        default = "default_refresh_stale_after",
        deserialize_with = "deserialize_duration"
    )]
    pub refresh_stale_after: Duration,
}

impl Config {
    /// Extract the configuration from the process environment.
    pub fn from_env() -> Result<Self, figment::Error> {
        Figment::new().merge(Env::raw()).extract()
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(8)
}

fn default_brave_search_base_url() -> String {
    "https://api.search.brave.com".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

fn default_refresh_cooldown() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_refresh_pace() -> Duration {
    Duration::from_millis(400)
}

fn default_refresh_stale_after() -> Duration {
    Duration::from_secs(30 * 60)
}

/// Parse a human-readable duration such as `"24h"`, `"400ms"` or `"8"` (seconds).
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let parser = DurationParser::with_time_units(&[
        TimeUnit::MilliSecond,
        TimeUnit::Second,
        TimeUnit::Minute,
        TimeUnit::Hour,
        TimeUnit::Day,
    ]);

    let parsed = parser
        .parse(input.trim())
        .map_err(|e| format!("invalid duration '{input}': {e}"))?;
    Duration::try_from(parsed).map_err(|e| format!("invalid duration '{input}': {e}"))
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}
