//! Remote engine seam
//!
//! `Engine` is the narrow set of calls the connection manager makes against
//! SurrealDB. `HttpRpcEngine` implements it over HTTP; tests script it.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use sh_core::config::EngineConfig;
use sh_core::{RemoteError, ShError};
use thiserror::Error;

/// Prefix the engine puts in front of `THROW` messages
const THROW_PREFIX: &str = "An error occurred: ";

/// Marker of statements skipped because another statement in the transaction failed
pub(crate) const CANCELLED_MARKER: &str = "not executed due to a";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineErrorKind {
    /// The request never produced a response
    Transport,
    /// The engine answered the call with an error
    Rpc,
    /// A statement inside a query failed or threw
    Statement,
}

#[derive(Debug, Clone, Error, Serialize)]
#[error("{message}")]
pub struct EngineError {
    pub kind: EngineErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub information: Option<String>,
}

impl EngineError {
    fn with_kind(kind: EngineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            description: None,
            information: None,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::with_kind(EngineErrorKind::Transport, message)
    }

    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            ..Self::with_kind(EngineErrorKind::Rpc, message)
        }
    }

    pub fn statement(message: impl Into<String>) -> Self {
        Self::with_kind(EngineErrorKind::Statement, message)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_information(mut self, information: impl Into<String>) -> Self {
        self.information = Some(information.into());
        self
    }

    /// The message with the engine's `THROW` prefix removed
    pub fn thrown_message(&self) -> &str {
        self.message
            .strip_prefix(THROW_PREFIX)
            .unwrap_or(&self.message)
            .trim()
    }

    /// Decompose into the `{message, code, details}` record shown to users
    pub fn to_remote(&self, default_message: &str, default_code: i64, default_details: &str) -> RemoteError {
        let message = if self.message.trim().is_empty() {
            default_message.to_string()
        } else {
            self.thrown_message().to_string()
        };
        let mut details = self
            .description
            .clone()
            .unwrap_or_else(|| default_details.to_string());
        if let Some(information) = &self.information {
            details = format!("{}: {}", details, information);
        }
        RemoteError::new(message, self.code.unwrap_or(default_code), details)
    }
}

impl From<EngineError> for ShError {
    fn from(err: EngineError) -> Self {
        match err.kind {
            EngineErrorKind::Transport => ShError::Transport(err.message),
            EngineErrorKind::Rpc => ShError::Remote(err.to_remote(
                "Remote call failed",
                0,
                "Unknown error during database query",
            )),
            EngineErrorKind::Statement => classify_abort(err.thrown_message()),
        }
    }
}

/// Map a transaction abort message onto the error taxonomy
pub fn classify_abort(message: &str) -> ShError {
    let lower = message.to_lowercase();
    let message = message.to_string();
    if lower.contains("already") {
        ShError::Conflict { message }
    } else if lower.contains("not found") {
        ShError::Missing { message }
    } else if lower.starts_with("only ")
        || lower.contains("must be an owner")
        || lower.contains("cannot")
        || lower.contains("permission")
        || lower.contains("not allowed")
    {
        ShError::Forbidden { message }
    } else {
        ShError::Rejected { message }
    }
}

/// Record-access credentials for signup and signin
#[derive(Debug, Clone)]
pub struct AuthParams {
    pub namespace: String,
    pub database: String,
    pub access: String,
    pub variables: Map<String, Value>,
}

impl AuthParams {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            namespace: config.namespace.clone(),
            database: config.database.clone(),
            access: config.access.clone(),
            variables: Map::new(),
        }
    }

    pub fn var(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.variables.insert(key.to_string(), value.into());
        self
    }

    /// Parameter object for the `signup` / `signin` RPC methods
    pub fn rpc_params(&self) -> Value {
        let mut params = self.variables.clone();
        params.insert("NS".into(), Value::String(self.namespace.clone()));
        params.insert("DB".into(), Value::String(self.database.clone()));
        params.insert("AC".into(), Value::String(self.access.clone()));
        Value::Object(params)
    }

    /// JSON body for `POST /signup` and `POST /signin`
    pub fn http_body(&self) -> Value {
        let mut body = self.variables.clone();
        body.insert("ns".into(), Value::String(self.namespace.clone()));
        body.insert("db".into(), Value::String(self.database.clone()));
        body.insert("ac".into(), Value::String(self.access.clone()));
        Value::Object(body)
    }
}

#[async_trait]
pub trait Engine: Send + Sync {
    /// Open the endpoint and check that it answers
    async fn connect(&self, config: &EngineConfig) -> Result<(), EngineError>;

    async fn use_namespace(&self, namespace: &str, database: &str) -> Result<(), EngineError>;

    /// Create an account; returns the session token when the engine issues one
    async fn signup(&self, params: &AuthParams) -> Result<Option<String>, EngineError>;

    async fn signin(&self, params: &AuthParams) -> Result<Option<String>, EngineError>;

    /// Attach a previously issued token to this session
    async fn authenticate(&self, token: &str) -> Result<(), EngineError>;

    async fn invalidate(&self) -> Result<(), EngineError>;

    /// The record of the authenticated identity
    async fn info(&self) -> Result<Value, EngineError>;

    /// Run statements with bound variables; one result per statement
    async fn query(&self, sql: &str, vars: Value) -> Result<Vec<Value>, EngineError>;

    async fn close(&self) -> Result<(), EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_thrown_message_strips_prefix() {
        let err = EngineError::statement("An error occurred: User not found");
        assert_eq!(err.thrown_message(), "User not found");
        assert_eq!(EngineError::statement("plain").thrown_message(), "plain");
    }

    #[test]
    fn test_classify_abort() {
        assert!(matches!(
            classify_abort("Only organization owners can delete organizations"),
            ShError::Forbidden { .. }
        ));
        assert!(matches!(
            classify_abort("You must be an owner or admin to add members"),
            ShError::Forbidden { .. }
        ));
        assert!(matches!(
            classify_abort("You cannot remove yourself from an organization"),
            ShError::Forbidden { .. }
        ));
        assert!(matches!(
            classify_abort("User is already a member of this organization"),
            ShError::Conflict { .. }
        ));
        assert!(matches!(classify_abort("User not found"), ShError::Missing { .. }));
        assert!(matches!(
            classify_abort("Specialization not found"),
            ShError::Missing { .. }
        ));
        assert!(matches!(
            classify_abort("Organization name is required"),
            ShError::Rejected { .. }
        ));
    }

    #[test]
    fn test_to_remote_decomposition() {
        let err = EngineError::rpc(401, "Failed to sign in")
            .with_description("There was a problem with authentication")
            .with_information("bad credentials");
        let remote = err.to_remote("Failed to sign in", 400, "Unknown error during signin");
        assert_eq!(remote.code, 401);
        assert_eq!(
            remote.details,
            "There was a problem with authentication: bad credentials"
        );

        let remote = EngineError::transport("").to_remote(
            "Failed to sign up",
            400,
            "Unknown error during signup",
        );
        assert_eq!(remote.message, "Failed to sign up");
        assert_eq!(remote.code, 400);
        assert_eq!(remote.details, "Unknown error during signup");
    }

    #[test]
    fn test_auth_params_shapes() {
        let params = AuthParams::new(&EngineConfig::default())
            .var("username", "alice")
            .var("password", "pw");
        assert_eq!(
            params.rpc_params(),
            json!({ "NS": "seceda", "DB": "core", "AC": "user_access", "username": "alice", "password": "pw" })
        );
        assert_eq!(params.http_body()["ac"], "user_access");
    }
}
