//! Environment-driven configuration.

use figment::{Figment, providers::Env};
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration, read from raw environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Log level for this crate when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Postgres connection string. Only the probe needs it.
    #[serde(default)]
    pub database_url: Option<String>,
    /// Upper bound on acquiring a connection and on the probe query.
    #[serde(
        default = "default_probe_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub probe_timeout: Duration,
    /// TOML file holding the remote image allowlist.
    #[serde(default = "default_images_config")]
    pub images_config: PathBuf,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self, figment::Error> {
        Self::from_figment(Figment::new().merge(Env::raw()))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, figment::Error> {
        figment.extract()
    }
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(4)
}

fn default_images_config() -> PathBuf {
    PathBuf::from("images.toml")
}

/// Accepts either a bare number of seconds or a human duration such as `1500ms` or `4s`.
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
        Raw::Text(text) => fundu::parse_duration(text.trim())
            .map_err(|e| serde::de::Error::custom(format!("invalid duration {text:?}: {e}"))),
    }
}
