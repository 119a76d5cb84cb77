//! Common time and SDK metadata types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Standard UTC DateTime type used across all Vigil crates
pub type UtcDateTime = DateTime<Utc>;

pub const SDK_NAME: &str = "vigil.rust";
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Seconds since the Unix epoch with millisecond precision, as replay events expect.
pub fn epoch_seconds(at: UtcDateTime) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

/// Milliseconds since the Unix epoch, as recording snapshots expect.
pub fn epoch_millis(at: UtcDateTime) -> i64 {
    at.timestamp_millis()
}

/// SDK identification sent with every envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkInfo {
    pub name: String,
    pub version: String,
}

impl Default for SdkInfo {
    fn default() -> Self {
        Self {
            name: SDK_NAME.to_string(),
            version: SDK_VERSION.to_string(),
        }
    }
}

impl SdkInfo {
    /// Value for the `sentry_client` field of the auth header
    pub fn client_string(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }
}
