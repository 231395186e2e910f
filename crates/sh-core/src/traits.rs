//! Core traits shared by the domain records

use chrono::{DateTime, Utc};

use crate::types::RecordId;

/// Records that carry a remote id once persisted
pub trait Identifiable {
    fn id(&self) -> Option<&RecordId>;

    fn is_persisted(&self) -> bool {
        self.id().is_some()
    }
}

pub trait Timestamped {
    fn created_at(&self) -> Option<DateTime<Utc>>;
    fn updated_at(&self) -> Option<DateTime<Utc>>;
}

/// Base trait for records stored in a remote table
pub trait Entity: Identifiable + Send + Sync {
    /// The remote table name
    const TABLE_NAME: &'static str;

    /// Human-readable type name for error messages
    const TYPE_NAME: &'static str;
}
