//! Record identifiers
//!
//! The remote engine identifies every record as `table:key`. Keys that are not
//! plain identifiers are wrapped in `⟨…⟩` (or backticks) on the wire.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ShError, ValidationErrors};

/// A `table:key` record identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    table: String,
    key: String,
}

impl RecordId {
    pub fn new(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
        }
    }

    /// Parse `table:key`, also accepting the `table/key` form used in URLs
    pub fn parse(raw: &str) -> Result<Self, ShError> {
        let raw = raw.trim();
        let (table, key) = raw
            .split_once(':')
            .or_else(|| raw.split_once('/'))
            .ok_or_else(|| invalid(raw))?;

        let key = strip_key_delimiters(key);
        if table.is_empty() || key.is_empty() {
            return Err(invalid(raw));
        }

        Ok(Self::new(table, key))
    }

    /// Parse and check that the id belongs to `table`
    pub fn parse_in(raw: &str, table: &str) -> Result<Self, ShError> {
        let id = Self::parse(raw)?;
        if id.table != table {
            return Err(ShError::Validation(ValidationErrors::single(
                "id",
                format!("Expected a {} record, got {}", table, id),
            )));
        }
        Ok(id)
    }

    /// Accept either a full `table:key` id or a bare key of `table`
    pub fn in_table(raw: &str, table: &str) -> Result<Self, ShError> {
        if looks_like_record_id(raw) {
            Self::parse_in(raw, table)
        } else {
            let key = strip_key_delimiters(raw);
            if key.is_empty() {
                return Err(invalid(raw));
            }
            Ok(Self::new(table, key))
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_table(&self, table: &str) -> bool {
        self.table == table
    }
}

/// Whether `raw` should be treated as a record id rather than a slug
pub fn looks_like_record_id(raw: &str) -> bool {
    raw.contains(':') || raw.contains('/')
}

fn strip_key_delimiters(key: &str) -> &str {
    let key = key.trim();
    key.strip_prefix('⟨')
        .and_then(|k| k.strip_suffix('⟩'))
        .or_else(|| key.strip_prefix('`').and_then(|k| k.strip_suffix('`')))
        .unwrap_or(key)
}

fn invalid(raw: &str) -> ShError {
    ShError::Validation(ValidationErrors::single(
        "id",
        format!("Invalid record id: {}", raw),
    ))
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plain = !self.key.is_empty()
            && self
                .key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if plain {
            write!(f, "{}:{}", self.table, self.key)
        } else {
            write!(f, "{}:⟨{}⟩", self.table, self.key)
        }
    }
}

impl FromStr for RecordId {
    type Err = ShError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        RecordId::parse(&raw).map_err(serde::de::Error::custom)
    }
}
