//! Department catalog and person specializations
//!
//! Table: department
//! Edge: person_specializes_in (person -> department)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sh_core::{Entity, Identifiable, RecordId};

use crate::shape::{null_as_default, one_or_first};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    pub id: RecordId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Identifiable for Department {
    fn id(&self) -> Option<&RecordId> {
        Some(&self.id)
    }
}

impl Entity for Department {
    const TABLE_NAME: &'static str = "department";
    const TYPE_NAME: &'static str = "Department";
}

/// A `person_specializes_in` edge with the department embedded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonDepartment {
    pub id: RecordId,
    #[serde(rename = "in")]
    pub person: RecordId,
    #[serde(rename = "out")]
    pub department: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
    /// Higher numbers sort first
    #[serde(default, deserialize_with = "null_as_default")]
    pub priority: i64,
    #[serde(default, deserialize_with = "one_or_first", skip_serializing_if = "Option::is_none")]
    pub department_details: Option<Department>,
}

impl PersonDepartment {
    pub const EDGE: &'static str = "person_specializes_in";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_person_department_shape() {
        let pd: PersonDepartment = serde_json::from_value(json!({
            "id": "person_specializes_in:x1",
            "in": "person:alice",
            "out": "department:camera",
            "priority": 3,
            "added_at": "2024-01-02T00:00:00Z",
            "department_details": {
                "id": "department:camera",
                "name": "Camera",
                "description": null
            }
        }))
        .unwrap();
        assert_eq!(pd.priority, 3);
        assert_eq!(pd.department.key(), "camera");
        let details = pd.department_details.unwrap();
        assert_eq!(details.name, "Camera");
        assert_eq!(details.slug, "");
    }

    #[test]
    fn test_missing_priority_defaults_to_zero() {
        let pd: PersonDepartment = serde_json::from_value(json!({
            "id": "person_specializes_in:x1",
            "in": "person:alice",
            "out": "department:camera",
            "priority": null
        }))
        .unwrap();
        assert_eq!(pd.priority, 0);
        assert!(pd.department_details.is_none());
    }
}
