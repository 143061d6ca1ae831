//! Application-level configuration loading: autosave timing, snapshot location
//! and the streak defaults offered to new matches.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::match_state::Configuration;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "COURTSIDE_CONFIG_PATH";
/// Quiet period after the last mutation before an autosave runs.
const DEFAULT_AUTOSAVE_DEBOUNCE_MS: u64 = 4_000;
/// Where the local snapshot lives unless configured otherwise.
const DEFAULT_SNAPSHOT_PATH: &str = "data/current_match.json";

#[derive(Debug, Clone, PartialEq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Debounce window of the autosave timer.
    pub autosave_debounce: Duration,
    /// Snapshot file; `None` keeps the snapshot in memory only.
    pub snapshot_path: Option<PathBuf>,
    /// Streak options used when a setup payload leaves them out.
    pub default_streaks: Configuration,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        debounce_ms = app_config.autosave_debounce.as_millis() as u64,
                        snapshot = ?app_config.snapshot_path,
                        "loaded application config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Configuration suited to tests: short debounce, in-memory snapshot.
    pub fn in_memory(autosave_debounce: Duration) -> Self {
        Self {
            autosave_debounce,
            snapshot_path: None,
            default_streaks: Configuration::default(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            autosave_debounce: Duration::from_millis(DEFAULT_AUTOSAVE_DEBOUNCE_MS),
            snapshot_path: Some(PathBuf::from(DEFAULT_SNAPSHOT_PATH)),
            default_streaks: Configuration::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    autosave_debounce_ms: Option<u64>,
    /// Explicit `null` disables the snapshot file.
    #[serde(default, with = "::serde_with::rust::double_option")]
    snapshot_path: Option<Option<PathBuf>>,
    #[serde(default)]
    streaks: Option<RawStreaks>,
}

#[derive(Debug, Deserialize)]
struct RawStreaks {
    hot_enabled: Option<bool>,
    hot_threshold: Option<u32>,
    cold_enabled: Option<bool>,
    cold_threshold: Option<u32>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        let fallback = defaults.default_streaks;
        let default_streaks = match value.streaks {
            Some(raw) => Configuration {
                hot_streak_enabled: raw.hot_enabled.unwrap_or(fallback.hot_streak_enabled),
                hot_threshold: raw.hot_threshold.unwrap_or(fallback.hot_threshold).max(1),
                cold_streak_enabled: raw.cold_enabled.unwrap_or(fallback.cold_streak_enabled),
                cold_threshold: raw.cold_threshold.unwrap_or(fallback.cold_threshold).max(1),
            },
            None => fallback,
        };

        Self {
            autosave_debounce: value
                .autosave_debounce_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.autosave_debounce),
            snapshot_path: value.snapshot_path.unwrap_or(defaults.snapshot_path),
            default_streaks,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> AppConfig {
        serde_json::from_str::<RawConfig>(json).unwrap().into()
    }

    #[test]
    fn empty_file_yields_defaults() {
        assert_eq!(parse("{}"), AppConfig::default());
    }

    #[test]
    fn partial_streaks_keep_remaining_defaults() {
        let config = parse(r#"{"autosave_debounce_ms": 1500, "streaks": {"hot_threshold": 5}}"#);
        assert_eq!(config.autosave_debounce, Duration::from_millis(1500));
        assert_eq!(config.default_streaks.hot_threshold, 5);
        assert_eq!(config.default_streaks.cold_threshold, 3);
        assert!(config.default_streaks.cold_streak_enabled);
    }

    #[test]
    fn null_snapshot_path_disables_the_file() {
        assert_eq!(parse(r#"{"snapshot_path": null}"#).snapshot_path, None);
        assert_eq!(
            parse(r#"{"snapshot_path": "/tmp/m.json"}"#).snapshot_path,
            Some(PathBuf::from("/tmp/m.json"))
        );
    }

    #[test]
    fn thresholds_are_at_least_one() {
        let config = parse(r#"{"streaks": {"cold_threshold": 0}}"#);
        assert_eq!(config.default_streaks.cold_threshold, 1);
    }
}
