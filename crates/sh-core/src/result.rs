//! Result type alias

use crate::error::ShError;

/// Standard Result type for SlateHub operations
pub type ShResult<T> = Result<T, ShError>;
