//! Core error types for the SlateHub data layer
//!
//! Every failure surfaced by the connection manager or a repository is an
//! `ShError`. Repositories wrap the underlying failure in `ShError::Context`
//! so callers get "Failed to delete organization: Only organization owners can
//! delete organizations" rather than a bare engine message.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core error type for all SlateHub operations
#[derive(Error, Debug)]
pub enum ShError {
    /// The remote engine could not be reached or the namespace could not be selected
    #[error("Connection failed: {message}")]
    Connection { message: String },

    /// Signup, signin or token restoration was refused
    #[error("{0}")]
    Authentication(RemoteError),

    /// A statement or RPC call failed on the remote engine
    #[error("{0}")]
    Remote(RemoteError),

    #[error("{message}")]
    Unauthenticated { message: String },

    /// Aborted by a permission check inside a remote transaction
    #[error("{message}")]
    Forbidden { message: String },

    /// Aborted because the record already exists (duplicate member, username, email)
    #[error("{message}")]
    Conflict { message: String },

    /// Any other abort raised by the remote engine or a local precondition
    #[error("{message}")]
    Rejected { message: String },

    /// Aborted because a referenced record does not exist
    #[error("{message}")]
    Missing { message: String },

    #[error("{entity} not found: {field}={value}")]
    NotFound {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    /// The result envelope did not have the expected shape
    #[error("Unexpected response: {0}")]
    Shape(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ShError>,
    },
}

impl ShError {
    pub fn unauthenticated() -> Self {
        ShError::Unauthenticated {
            message: "User not authenticated".into(),
        }
    }

    pub fn shape(message: impl Into<String>) -> Self {
        ShError::Shape(message.into())
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        ShError::Rejected {
            message: message.into(),
        }
    }

    pub fn missing(message: impl Into<String>) -> Self {
        ShError::Missing {
            message: message.into(),
        }
    }

    /// Whether a referenced record was absent, however it was detected
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), ShError::Missing { .. } | ShError::NotFound { .. })
    }

    /// Wrap this error with a human-readable description of the failed operation
    pub fn context(self, context: impl Into<String>) -> Self {
        ShError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any `Context` layers
    pub fn root(&self) -> &ShError {
        match self {
            ShError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// The structured remote error, if this failure came from the engine
    pub fn remote(&self) -> Option<&RemoteError> {
        match self.root() {
            ShError::Authentication(err) | ShError::Remote(err) => Some(err),
            _ => None,
        }
    }

    /// Numeric code reported to the UI in the error-details record
    pub fn code(&self) -> i64 {
        match self.root() {
            ShError::Authentication(err) | ShError::Remote(err) => err.code,
            ShError::Unauthenticated { .. } => 401,
            ShError::Forbidden { .. } => 403,
            ShError::Missing { .. } | ShError::NotFound { .. } => 404,
            ShError::Conflict { .. } => 409,
            ShError::Validation(_) | ShError::Rejected { .. } => 422,
            _ => 0,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self.root() {
            ShError::Connection { .. } => "connection_failed",
            ShError::Authentication(_) => "authentication_failed",
            ShError::Remote(_) => "remote_error",
            ShError::Unauthenticated { .. } => "unauthenticated",
            ShError::Forbidden { .. } => "forbidden",
            ShError::Conflict { .. } => "conflict",
            ShError::Rejected { .. } => "rejected",
            ShError::Missing { .. } | ShError::NotFound { .. } => "not_found",
            ShError::Validation(_) => "validation_failed",
            ShError::Shape(_) => "unexpected_response",
            ShError::Transport(_) => "transport_error",
            ShError::Config(_) => "configuration_error",
            ShError::Context { .. } => "internal_error",
        }
    }
}

/// Structured failure decomposed from a remote engine error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub message: String,
    pub code: i64,
    pub details: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>, code: i64, details: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
            details: details.into(),
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RemoteError {}

/// Client-side validation errors, keyed by field
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ValidationErrors {
    pub errors: BTreeMap<String, Vec<String>>,
    /// Errors not tied to a specific field
    pub base_errors: Vec<String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a single field error
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn add_base(&mut self, message: impl Into<String>) {
        self.base_errors.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.base_errors.is_empty()
    }

    pub fn has_error(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&Vec<String>> {
        self.errors.get(field)
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, messages) in other.errors {
            self.errors.entry(field).or_default().extend(messages);
        }
        self.base_errors.extend(other.base_errors);
    }

    /// Base messages first, then field messages verbatim
    pub fn full_messages(&self) -> Vec<String> {
        let mut messages = self.base_errors.clone();
        for field_messages in self.errors.values() {
            messages.extend(field_messages.iter().cloned());
        }
        messages
    }

    /// `Ok(())` when empty, otherwise the collected errors
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_messages().join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

impl From<validator::ValidationErrors> for ValidationErrors {
    fn from(source: validator::ValidationErrors) -> Self {
        let mut errors = ValidationErrors::new();
        for (field, field_errors) in source.field_errors() {
            for error in field_errors {
                let message = error
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} is invalid ({})", field, error.code));
                errors.add(field.to_string(), message);
            }
        }
        errors
    }
}

impl From<validator::ValidationErrors> for ShError {
    fn from(source: validator::ValidationErrors) -> Self {
        ShError::Validation(source.into())
    }
}

impl From<serde_json::Error> for ShError {
    fn from(err: serde_json::Error) -> Self {
        ShError::Shape(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_display_and_root() {
        let err = ShError::Forbidden {
            message: "Only organization owners can delete organizations".into(),
        }
        .context("Failed to delete organization");

        assert_eq!(
            err.to_string(),
            "Failed to delete organization: Only organization owners can delete organizations"
        );
        assert!(matches!(err.root(), ShError::Forbidden { .. }));
        assert_eq!(err.code(), 403);
        assert_eq!(err.error_code(), "forbidden");
    }

    #[test]
    fn test_not_found_shares_one_code() {
        let aborted = ShError::missing("Membership not found").context("Failed to remove member");
        let local = ShError::NotFound {
            entity: "PersonRole",
            field: "id",
            value: "person_has_role:r1".into(),
        };
        assert!(aborted.is_not_found() && local.is_not_found());
        assert_eq!(aborted.code(), 404);
        assert_eq!(aborted.error_code(), local.error_code());
        assert_eq!(aborted.to_string(), "Failed to remove member: Membership not found");
    }

    #[test]
    fn test_remote_code_passthrough() {
        let err = ShError::Authentication(RemoteError::new(
            "Failed to sign in",
            401,
            "There was a problem with authentication",
        ))
        .context("signin");
        assert_eq!(err.code(), 401);
        assert_eq!(
            err.remote().map(|r| r.details.as_str()),
            Some("There was a problem with authentication")
        );
    }

    #[test]
    fn test_validation_errors_messages() {
        let mut errors = ValidationErrors::new();
        assert!(errors.clone().into_result().is_ok());

        errors.add("email", "Invalid email format");
        errors.add_base("Nothing to update");
        assert!(errors.has_error("email"));
        assert_eq!(
            errors.full_messages(),
            vec!["Nothing to update".to_string(), "Invalid email format".to_string()]
        );
        assert_eq!(errors.to_string(), "Nothing to update; Invalid email format");

        let mut other = ValidationErrors::single("email", "is required");
        other.merge(errors);
        assert_eq!(other.get("email").map(Vec::len), Some(2));
    }
}
