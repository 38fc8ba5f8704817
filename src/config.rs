//! Application-level configuration loading: room sizing, join timeout and persistence retries.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "HITSTREAK_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Buffered broadcasts per room before a slow subscriber lags.
    pub room_broadcast_capacity: usize,
    /// Pending commands per room before senders wait.
    pub room_command_capacity: usize,
    /// Delay granted to a WebSocket client to send its `join` message.
    pub join_timeout: Duration,
    /// Retry policy for durable writes.
    pub persist: PersistPolicy,
}

/// Bounded exponential backoff applied to durable writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound for the delay between attempts.
    pub max_backoff: Duration,
}

impl PersistPolicy {
    /// Delay to wait after `current`.
    pub fn next_backoff(&self, current: Duration) -> Duration {
        (current * 2).min(self.max_backoff)
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(path = %path.display(), "loaded configuration file");
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
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    room_broadcast_capacity: usize,
    room_command_capacity: usize,
    join_timeout_secs: u64,
    persist_max_attempts: u32,
    persist_initial_backoff_ms: u64,
    persist_max_backoff_ms: u64,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            room_broadcast_capacity: 64,
            room_command_capacity: 64,
            join_timeout_secs: 10,
            persist_max_attempts: 5,
            persist_initial_backoff_ms: 250,
            persist_max_backoff_ms: 5_000,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            // broadcast::channel panics on a zero capacity
            room_broadcast_capacity: value.room_broadcast_capacity.max(1),
            room_command_capacity: value.room_command_capacity.max(1),
            join_timeout: Duration::from_secs(value.join_timeout_secs),
            persist: PersistPolicy {
                max_attempts: value.persist_max_attempts.max(1),
                initial_backoff: Duration::from_millis(value.persist_initial_backoff_ms),
                max_backoff: Duration::from_millis(value.persist_max_backoff_ms),
            },
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
