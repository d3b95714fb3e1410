use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use directories::ProjectDirs;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::error::ConfigError;

const CONFIG_FILE_NAME: &str = "config.json";

/// Runtime settings for the SPIN service.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Builder, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// BLE adapter index.
    #[builder(default)]
    device: usize,
    /// Period between discovery passes.
    #[builder(default = DEFAULT_SCAN_INTERVAL)]
    #[serde(deserialize_with = "human_duration")]
    scan_interval: Duration,
    /// Length of one discovery pass.
    #[builder(default = DEFAULT_SCAN_TIMEOUT)]
    #[serde(deserialize_with = "human_duration")]
    scan_timeout: Duration,
    /// Longest single wait for a notification before re-checking for shutdown.
    #[builder(default = DEFAULT_NOTIFICATION_POLL)]
    #[serde(deserialize_with = "human_duration")]
    notification_poll: Duration,
    /// Upper bound on each BLE connect, read or write.
    #[builder(default = DEFAULT_OPERATION_TIMEOUT)]
    #[serde(deserialize_with = "human_duration")]
    operation_timeout: Duration,
}

const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_NOTIFICATION_POLL: Duration = Duration::from_secs(1);
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Command-line values layered over a loaded [`ServiceConfig`].
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Builder)]
pub struct ConfigOverrides {
    device: Option<usize>,
    scan_interval: Option<Duration>,
    scan_timeout: Option<Duration>,
}

impl ServiceConfig {
    /// Loads settings from `path`, or from the platform config file when it exists.
    ///
    /// Missing keys keep their defaults. An explicit `path` must exist.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or is not valid JSON.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) if path.is_file() => path,
                _ => {
                    debug!("no config file found; using defaults");
                    return Ok(Self::default());
                }
            },
        };
        Self::load_from_path(&path)
    }

    fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let path_display = path.display().to_string();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path_display.clone(),
            source,
        })?;
        let config = serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
            path: path_display.clone(),
            source,
        })?;
        debug!(path = %path_display, ?config, "loaded config file");
        Ok(config)
    }

    /// Applies command-line overrides on top of these settings.
    #[must_use]
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(device) = overrides.device {
            self.device = device;
        }
        if let Some(scan_interval) = overrides.scan_interval {
            self.scan_interval = scan_interval;
        }
        if let Some(scan_timeout) = overrides.scan_timeout {
            self.scan_timeout = scan_timeout;
        }
        self
    }

    #[must_use]
    pub fn device(&self) -> usize {
        self.device
    }

    #[must_use]
    pub fn scan_interval(&self) -> Duration {
        self.scan_interval
    }

    #[must_use]
    pub fn scan_timeout(&self) -> Duration {
        self.scan_timeout
    }

    #[must_use]
    pub fn notification_poll(&self) -> Duration {
        self.notification_poll
    }

    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("io", "spin-remote", "spin-remote")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

fn human_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    humantime::parse_duration(&value).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;

    fn unique_temp_path(name: &str) -> PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be after unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!("spin-remote-{name}-{suffix}.json"))
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = ServiceConfig::default();
        assert_eq!(0, config.device());
        assert_eq!(Duration::from_secs(30), config.scan_interval());
        assert_eq!(Duration::from_secs(10), config.scan_timeout());
        assert_eq!(Duration::from_secs(1), config.notification_poll());
        assert_eq!(Duration::from_secs(10), config.operation_timeout());
    }

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let config: ServiceConfig =
            serde_json::from_str(r#"{"scan_interval": "1m", "device": 2}"#)
                .expect("partial config should parse");
        assert_eq!(Duration::from_secs(60), config.scan_interval());
        assert_eq!(2, config.device());
        assert_eq!(Duration::from_secs(10), config.scan_timeout());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert_eq!(
            true,
            serde_json::from_str::<ServiceConfig>(r#"{"scan_period": "1m"}"#).is_err()
        );
    }

    #[test]
    fn overrides_take_precedence_over_file_values() {
        let config = ServiceConfig::builder()
            .scan_interval(Duration::from_secs(60))
            .build()
            .with_overrides(
                ConfigOverrides::builder()
                    .scan_timeout(Duration::from_secs(3))
                    .build(),
            );
        assert_eq!(Duration::from_secs(60), config.scan_interval());
        assert_eq!(Duration::from_secs(3), config.scan_timeout());
    }

    #[test]
    fn load_reads_explicit_file() {
        let path = unique_temp_path("config");
        fs::write(&path, r#"{"notification_poll": "250ms"}"#).expect("fixture should be written");

        let config = ServiceConfig::load(Some(&path)).expect("config should load");
        fs::remove_file(&path).expect("fixture should be removable");

        assert_eq!(Duration::from_millis(250), config.notification_poll());
    }

    #[test]
    fn load_reports_missing_explicit_file() {
        let path = unique_temp_path("missing");
        assert_matches!(
            ServiceConfig::load(Some(&path)),
            Err(ConfigError::Io { .. })
        );
    }
}
