//! Configuration management
//!
//! Every config struct has sensible defaults and can be overridden from the
//! environment (`VIGIL_*` variables).

use crate::dsn::Dsn;
use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Default idle timeout before a replay session rotates (15 minutes)
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 15 * 60 * 1000;
/// Default delay before a non-initial segment is flushed
pub const DEFAULT_FLUSH_DELAY_MS: u64 = 5_000;
pub const DEFAULT_MAX_BUFFERED_SNAPSHOTS: usize = 1_000;
pub const DEFAULT_LOCAL_VARIABLES_MAX_FRAMES: usize = 5;
pub const DEFAULT_MAX_EXCEPTIONS_PER_SECOND: u32 = 50;
pub const DEFAULT_FRAME_CACHE_SIZE: usize = 20;
/// Envelopes the transport holds before refusing new ones
pub const DEFAULT_MAX_QUEUED_ENVELOPES: usize = 100;

/// Session replay configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Idle time after which the session rotates
    #[serde(with = "duration_ms")]
    pub idle_timeout: Duration,
    /// Age of the oldest buffered snapshot that triggers a flush
    #[serde(with = "duration_ms")]
    pub flush_delay: Duration,
    /// Buffer size that triggers an immediate flush
    pub max_buffered_snapshots: usize,
    /// zlib-compress recording payloads
    pub compress_recordings: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_millis(DEFAULT_IDLE_TIMEOUT_MS),
            flush_delay: Duration::from_millis(DEFAULT_FLUSH_DELAY_MS),
            max_buffered_snapshots: DEFAULT_MAX_BUFFERED_SNAPSHOTS,
            compress_recordings: false,
        }
    }
}

impl ReplayConfig {
    /// Interval at which the expiry timer checks the session
    pub fn check_interval(&self) -> Duration {
        let base = self.idle_timeout.min(self.flush_delay);
        (base / 2).max(Duration::from_millis(10))
    }
}

/// Local variables capture configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalVariablesConfig {
    pub enabled: bool,
    /// Capture for caught exceptions too, not only uncaught ones
    pub capture_all_exceptions: bool,
    /// Number of innermost frames that get variables
    pub max_frames: usize,
    pub max_exceptions_per_second: u32,
    /// Number of exceptions whose frames are kept in memory
    pub cache_size: usize,
}

impl Default for LocalVariablesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            capture_all_exceptions: true,
            max_frames: DEFAULT_LOCAL_VARIABLES_MAX_FRAMES,
            max_exceptions_per_second: DEFAULT_MAX_EXCEPTIONS_PER_SECOND,
            cache_size: DEFAULT_FRAME_CACHE_SIZE,
        }
    }
}

impl LocalVariablesConfig {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }
}

/// HTTP transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub shutdown_timeout: Duration,
    #[serde(default = "default_max_queued_envelopes")]
    pub max_queued_envelopes: usize,
}

fn default_max_queued_envelopes() -> usize {
    DEFAULT_MAX_QUEUED_ENVELOPES
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(2),
            max_queued_envelopes: DEFAULT_MAX_QUEUED_ENVELOPES,
        }
    }
}

/// Top level client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    pub dsn: Option<String>,
    pub environment: Option<String>,
    pub release: Option<String>,
    pub replay: ReplayConfig,
    pub local_variables: LocalVariablesConfig,
    pub transport: TransportConfig,
}

impl ClientConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ClientConfig {
            dsn: lookup("VIGIL_DSN"),
            environment: lookup("VIGIL_ENVIRONMENT"),
            release: lookup("VIGIL_RELEASE"),
            ..Default::default()
        };

        if let Some(ms) = parse_var::<u64, _>(&lookup, "VIGIL_REPLAY_IDLE_TIMEOUT_MS")? {
            config.replay.idle_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "VIGIL_REPLAY_FLUSH_DELAY_MS")? {
            config.replay.flush_delay = Duration::from_millis(ms);
        }
        if let Some(max) = parse_var(&lookup, "VIGIL_REPLAY_MAX_BUFFERED")? {
            config.replay.max_buffered_snapshots = max;
        }
        if let Some(compress) = parse_var(&lookup, "VIGIL_REPLAY_COMPRESS")? {
            config.replay.compress_recordings = compress;
        }
        if let Some(max) = parse_var(&lookup, "VIGIL_TRANSPORT_MAX_QUEUED")? {
            config.transport.max_queued_envelopes = max;
        }
        if let Some(enabled) = parse_var(&lookup, "VIGIL_LOCAL_VARIABLES")? {
            config.local_variables.enabled = enabled;
        }
        if let Some(all) = parse_var(&lookup, "VIGIL_LOCAL_VARIABLES_CAPTURE_ALL")? {
            config.local_variables.capture_all_exceptions = all;
        }
        if let Some(rate) = parse_var(&lookup, "VIGIL_LOCAL_VARIABLES_MAX_PER_SECOND")? {
            config.local_variables.max_exceptions_per_second = rate;
        }

        if let Some(dsn) = &config.dsn {
            // Fail early rather than on the first send
            Dsn::parse(dsn)?;
        }

        Ok(config)
    }

    pub fn parsed_dsn(&self) -> ConfigResult<Option<Dsn>> {
        match &self.dsn {
            Some(dsn) => Ok(Some(Dsn::parse(dsn)?)),
            None => Ok(None),
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        None => Ok(None),
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
