//! Shared plumbing for the domain accessors

use sh_core::{ShError, ShResult};

/// Log a failed accessor call and re-raise it with a description of what failed
pub trait ContextExt<T> {
    fn context(self, what: &str) -> ShResult<T>;
}

impl<T> ContextExt<T> for ShResult<T> {
    fn context(self, what: &str) -> ShResult<T> {
        self.map_err(|err| {
            tracing::error!(error = %err, code = err.error_code(), "{}", what);
            err.context(what)
        })
    }
}

/// Fixed error for a mutation whose transaction returned nothing
pub(crate) fn empty_result(what: &str) -> ShError {
    ShError::shape(format!("{}: no record returned", what))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_wraps_error() {
        let result: ShResult<()> = Err(ShError::rejected("User not found"));
        let err = result.context("Failed to add member").unwrap_err();
        assert_eq!(err.to_string(), "Failed to add member: User not found");
        assert!(matches!(err.root(), ShError::Rejected { .. }));
    }

    #[test]
    fn test_context_passes_ok_through() {
        let result: ShResult<u8> = Ok(3);
        assert_eq!(result.context("unused").unwrap(), 3);
    }
}
