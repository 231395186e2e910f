//! Role catalog and person role assignments
//!
//! Table: role
//! Edges: person_has_role (person -> role), belongs_to_department (role -> department)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sh_core::{Entity, Identifiable, RecordId};

use crate::department::Department;
use crate::shape::{null_as_default, one_or_first, one_or_many};

/// A role's department, in whichever shape the record carries it
///
/// Older role records hold a flat `department` name; newer ones resolve the
/// `belongs_to_department` relation into department records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DepartmentRef {
    Linked(Department),
    Id(RecordId),
    Named(String),
}

impl DepartmentRef {
    pub fn name(&self) -> Option<&str> {
        match self {
            DepartmentRef::Linked(dept) => Some(&dept.name),
            DepartmentRef::Named(name) => Some(name),
            DepartmentRef::Id(_) => None,
        }
    }

    pub fn id(&self) -> Option<&RecordId> {
        match self {
            DepartmentRef::Linked(dept) => Some(&dept.id),
            DepartmentRef::Id(id) => Some(id),
            DepartmentRef::Named(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: RecordId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "department", deserialize_with = "one_or_many")]
    pub departments: Vec<DepartmentRef>,
}

impl Identifiable for Role {
    fn id(&self) -> Option<&RecordId> {
        Some(&self.id)
    }
}

impl Entity for Role {
    const TABLE_NAME: &'static str = "role";
    const TYPE_NAME: &'static str = "Role";
}

/// A `person_has_role` edge with the role embedded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRole {
    pub person_has_role_id: RecordId,
    #[serde(default, deserialize_with = "one_or_first")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expertise_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl PersonRole {
    pub const EDGE: &'static str = "person_has_role";
}

/// Standardized role from the department catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRole {
    pub id: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standardized_title: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reports_to: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub localizations: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_references: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_with_flat_department_name() {
        let role: Role = serde_json::from_value(json!({
            "id": "role:gaffer",
            "name": "Gaffer",
            "department": "Lighting"
        }))
        .unwrap();
        assert_eq!(role.departments, vec![DepartmentRef::Named("Lighting".into())]);
        assert_eq!(role.departments[0].name(), Some("Lighting"));
    }

    #[test]
    fn test_role_with_department_relation() {
        let role: Role = serde_json::from_value(json!({
            "id": "role:gaffer",
            "name": "Gaffer",
            "departments": [
                { "id": "department:lighting", "name": "Lighting", "slug": "lighting" },
                "department:electric"
            ]
        }))
        .unwrap();
        assert_eq!(role.departments.len(), 2);
        assert_eq!(role.departments[0].name(), Some("Lighting"));
        assert_eq!(
            role.departments[1].id(),
            Some(&RecordId::new("department", "electric"))
        );
    }

    #[test]
    fn test_role_without_departments() {
        let role: Role =
            serde_json::from_value(json!({ "id": "role:pa", "name": "PA", "department": null }))
                .unwrap();
        assert!(role.departments.is_empty());
    }

    #[test]
    fn test_person_role_embeds_role() {
        let pr: PersonRole = serde_json::from_value(json!({
            "person_has_role_id": "person_has_role:r1",
            "role": { "id": "role:gaffer", "name": "Gaffer" }
        }))
        .unwrap();
        assert_eq!(pr.role.unwrap().name, "Gaffer");
    }
}
