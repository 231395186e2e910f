//! Client configuration
//!
//! Everything is read from environment-style keys and falls back to the local
//! development endpoint when a key is unset or empty.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ShError;

pub const DEFAULT_URL: &str = "http://127.0.0.1:8000/rpc";
pub const DEFAULT_NAMESPACE: &str = "seceda";
pub const DEFAULT_DATABASE: &str = "core";
pub const DEFAULT_ACCESS: &str = "user_access";
pub const DEFAULT_TOKEN_KEY: &str = "surrealToken";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

impl From<ConfigError> for ShError {
    fn from(err: ConfigError) -> Self {
        ShError::Config(err.to_string())
    }
}

/// How signup and signin reach the engine
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthTransport {
    /// `signup` / `signin` RPC methods on the same endpoint as queries
    #[default]
    Rpc,
    /// Plain `POST /signup` and `POST /signin` next to the RPC endpoint
    Http,
}

impl FromStr for AuthTransport {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rpc" => Ok(AuthTransport::Rpc),
            "http" | "rest" => Ok(AuthTransport::Http),
            _ => Err(()),
        }
    }
}

/// Remote engine endpoint
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EngineConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    /// Record access method used for signup and signin
    pub access: String,
    pub auth_transport: AuthTransport,
    /// Per-request timeout; `None` leaves it to the transport
    pub request_timeout_seconds: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            access: DEFAULT_ACCESS.to_string(),
            auth_transport: AuthTransport::default(),
            request_timeout_seconds: None,
        }
    }
}

impl EngineConfig {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Where the session token is persisted
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SessionConfig {
    pub token_key: String,
    /// File-backed token store location; in-memory when unset
    pub token_file: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_key: DEFAULT_TOKEN_KEY.to_string(),
            token_file: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ClientConfig {
    pub engine: EngineConfig,
    pub session: SessionConfig,
}

impl ClientConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = EngineConfig::default();

        let auth_transport: AuthTransport = match get("SURREAL_AUTH_TRANSPORT") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "SURREAL_AUTH_TRANSPORT",
                value,
            })?,
            None => AuthTransport::default(),
        };

        let request_timeout_seconds: Option<u64> = match get("SURREAL_TIMEOUT_SECS") {
            Some(value) => Some(value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "SURREAL_TIMEOUT_SECS",
                value,
            })?),
            None => None,
        };

        Ok(Self {
            engine: EngineConfig {
                url: get("SURREAL_URL").unwrap_or(defaults.url),
                namespace: get("SURREAL_NS").unwrap_or(defaults.namespace),
                database: get("SURREAL_DB").unwrap_or(defaults.database),
                access: get("SURREAL_ACCESS").unwrap_or(defaults.access),
                auth_transport,
                request_timeout_seconds,
            },
            session: SessionConfig {
                token_key: get("SLATEHUB_TOKEN_KEY").unwrap_or_else(|| DEFAULT_TOKEN_KEY.into()),
                token_file: get("SLATEHUB_TOKEN_FILE").map(PathBuf::from),
            },
        })
    }
}
