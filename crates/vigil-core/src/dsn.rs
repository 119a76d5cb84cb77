//! DSN (Data Source Name) parsing
//!
//! A DSN has the shape `protocol://public_key@host[:port]/project_id` and tells
//! the SDK where to deliver envelopes and which key to authenticate with.

use crate::types::SdkInfo;
use std::fmt;
use thiserror::Error;
use url::Url;

pub const PROTOCOL_VERSION: u8 = 7;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DsnError {
    #[error("DSN is not a valid URL: {0}")]
    InvalidUrl(String),

    #[error("DSN has no host")]
    MissingHost,

    #[error("DSN has no public key")]
    MissingPublicKey,

    #[error("DSN has an invalid project id: {0}")]
    InvalidProjectId(String),

    #[error("Unsupported DSN scheme: {0}")]
    UnsupportedScheme(String),
}

/// Parsed DSN components
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
    pub protocol: String,
    pub public_key: String,
    pub host: String,
    pub port: Option<u16>,
    pub project_id: u64,
}

impl Dsn {
    /// Parse a DSN string
    pub fn parse(dsn: &str) -> Result<Self, DsnError> {
        let url = Url::parse(dsn).map_err(|e| DsnError::InvalidUrl(e.to_string()))?;

        let protocol = url.scheme().to_string();
        if protocol != "http" && protocol != "https" {
            return Err(DsnError::UnsupportedScheme(protocol));
        }

        let host = url.host_str().ok_or(DsnError::MissingHost)?.to_string();

        let public_key = url.username().to_string();
        if public_key.is_empty() {
            return Err(DsnError::MissingPublicKey);
        }

        let raw_project = url.path().trim_matches('/');
        let project_id = raw_project
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .parse::<u64>()
            .map_err(|_| DsnError::InvalidProjectId(raw_project.to_string()))?;

        tracing::debug!(
            "Parsed DSN - public_key: {}, project_id: {}, host: {}",
            crate::utils::mask_sensitive(&public_key),
            project_id,
            host
        );

        Ok(Dsn {
            protocol,
            public_key,
            host,
            port: url.port(),
            project_id,
        })
    }

    /// Endpoint that accepts envelopes for this project
    pub fn envelope_url(&self) -> String {
        match self.port {
            Some(port) => format!(
                "{}://{}:{}/api/{}/envelope/",
                self.protocol, self.host, port, self.project_id
            ),
            None => format!(
                "{}://{}/api/{}/envelope/",
                self.protocol, self.host, self.project_id
            ),
        }
    }

    /// Value of the `X-Sentry-Auth` header
    pub fn auth_header(&self, sdk: &SdkInfo) -> String {
        format!(
            "Sentry sentry_version={}, sentry_key={}, sentry_client={}",
            PROTOCOL_VERSION,
            self.public_key,
            sdk.client_string()
        )
    }
}

impl fmt::Display for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}@{}", self.protocol, self.public_key, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        write!(f, "/{}", self.project_id)
    }
}

impl std::str::FromStr for Dsn {
    type Err = DsnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dsn::parse(s)
    }
}
