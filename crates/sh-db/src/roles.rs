//! Role catalog and the current user's role assignments

use serde_json::{json, Value};
use sh_core::{Entity, RecordId, ShError, ShResult};
use sh_models::{Department, PersonRole, Role};

use crate::client::Database;
use crate::repository::{empty_result, ContextExt};

/// Role fields plus its departments: the linked records when the relation is
/// populated, otherwise the flat `department` name
const ROLE_FIELDS: &str = "id, name, slug, description, created_at, updated_at, \
     (department ?? ->belongs_to_department->department.*) AS departments";

const PERSON_ROLE_FIELDS: &str = "id AS person_has_role_id, out.* AS role, expertise_level, created_at";

pub struct RoleRepository {
    db: Database,
}

impl RoleRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn all_roles(&self) -> ShResult<Vec<Role>> {
        self.fetch_all().await.context("Failed to fetch roles")
    }

    /// Roles belonging to a department, by record id or bare key
    pub async fn roles_by_department(&self, department_id: &str) -> ShResult<Vec<Role>> {
        self.fetch_by_department(department_id)
            .await
            .context("Failed to fetch roles")
    }

    pub async fn person_roles(&self) -> ShResult<Vec<PersonRole>> {
        self.fetch_person_roles()
            .await
            .context("Failed to fetch person roles")
    }

    pub async fn add_role_to_person(
        &self,
        role_id: &str,
        expertise_level: Option<&str>,
    ) -> ShResult<PersonRole> {
        self.assign_role(role_id, expertise_level)
            .await
            .context("Failed to add role")
    }

    pub async fn remove_role_from_person(&self, person_role_id: &str) -> ShResult<bool> {
        self.unassign_role(person_role_id)
            .await
            .context("Failed to remove role")
    }

    async fn fetch_all(&self) -> ShResult<Vec<Role>> {
        let sql = format!("SELECT {} FROM role ORDER BY name ASC;", ROLE_FIELDS);
        self.db.query(&sql, json!({})).await?.many(0)
    }

    async fn fetch_by_department(&self, department_id: &str) -> ShResult<Vec<Role>> {
        let department = RecordId::in_table(department_id, Department::TABLE_NAME)?;
        let sql = format!(
            "SELECT {} FROM role WHERE id IN (SELECT VALUE in FROM belongs_to_department WHERE out = type::record($department)) ORDER BY name ASC;",
            ROLE_FIELDS
        );
        self.db
            .query(&sql, json!({ "department": department }))
            .await?
            .many(0)
    }

    async fn fetch_person_roles(&self) -> ShResult<Vec<PersonRole>> {
        let me = self.db.session_user_id().await?;
        let sql = format!(
            "SELECT {} FROM {} WHERE in = type::record($person) ORDER BY created_at DESC;",
            PERSON_ROLE_FIELDS,
            PersonRole::EDGE
        );
        self.db.query(&sql, json!({ "person": me })).await?.many(0)
    }

    async fn assign_role(&self, role_id: &str, expertise_level: Option<&str>) -> ShResult<PersonRole> {
        let role = RecordId::in_table(role_id, Role::TABLE_NAME)?;
        let me = self.db.session_user_id().await?;

        let sql = format!(
            r#"
            BEGIN TRANSACTION;
            LET $me = type::record($person);
            LET $role = type::record($role_id);
            IF (SELECT id FROM $role)[0] == NONE {{ THROW "Role not found"; }};
            IF (SELECT id FROM {edge} WHERE in = $me AND out = $role)[0] != NONE {{
                THROW "Role is already assigned to you";
            }};
            LET $edge = (RELATE $me->{edge}->$role SET expertise_level = $expertise_level, created_at = time::now())[0];
            RETURN (SELECT {fields} FROM $edge.id)[0];
            COMMIT TRANSACTION;
            "#,
            edge = PersonRole::EDGE,
            fields = PERSON_ROLE_FIELDS,
        );

        let assigned: PersonRole = self
            .db
            .query(
                &sql,
                json!({ "person": me, "role_id": role, "expertise_level": expertise_level }),
            )
            .await?
            .returned_one()?
            .ok_or_else(|| empty_result("Failed to add role to person"))?;

        tracing::info!(role = %role, "Role assigned");
        Ok(assigned)
    }

    async fn unassign_role(&self, person_role_id: &str) -> ShResult<bool> {
        let id = RecordId::in_table(person_role_id, PersonRole::EDGE)?;
        let me = self.db.session_user_id().await?;

        let sql = format!(
            "DELETE {} WHERE id = type::record($id) AND in = type::record($person) RETURN BEFORE;",
            PersonRole::EDGE
        );
        let removed: Vec<Value> = self
            .db
            .query(&sql, json!({ "id": id, "person": me }))
            .await?
            .many(0)?;

        if removed.is_empty() {
            return Err(ShError::NotFound {
                entity: "PersonRole",
                field: "id",
                value: id.to_string(),
            });
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{alice_record, connected_database, restorable_database, ScriptedEngine};
    use sh_models::DepartmentRef;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_all_roles_accepts_both_department_shapes() {
        let engine = Arc::new(ScriptedEngine::new());
        engine.push_query(vec![json!([
            { "id": "role:gaffer", "name": "Gaffer", "departments": "Lighting" },
            {
                "id": "role:dop",
                "name": "Director of Photography",
                "departments": [{ "id": "department:camera", "name": "Camera", "slug": "camera" }]
            }
        ])]);
        let roles = RoleRepository::new(connected_database(&engine));

        let all = roles.all_roles().await.unwrap();
        assert_eq!(all[0].departments, vec![DepartmentRef::Named("Lighting".into())]);
        assert_eq!(all[1].departments[0].name(), Some("Camera"));
        assert_eq!(
            all[1].departments[0].id(),
            Some(&RecordId::new("department", "camera"))
        );
    }

    #[tokio::test]
    async fn test_roles_by_department_accepts_bare_key() {
        let engine = Arc::new(ScriptedEngine::new());
        engine.push_query(vec![json!([])]);
        let roles = RoleRepository::new(connected_database(&engine));

        assert!(roles.roles_by_department("camera").await.unwrap().is_empty());
        assert_eq!(engine.queries()[0].1["department"], "department:camera");
    }

    #[tokio::test]
    async fn test_person_roles() {
        let engine = Arc::new(ScriptedEngine::new());
        engine.push_query(vec![json!([{
            "person_has_role_id": "person_has_role:r1",
            "role": { "id": "role:gaffer", "name": "Gaffer" },
            "expertise_level": "senior"
        }])]);
        let roles = RoleRepository::new(connected_database(&engine));

        let mine = roles.person_roles().await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].role.as_ref().unwrap().name, "Gaffer");
        assert_eq!(engine.queries()[0].1["person"], "person:alice");
    }

    #[tokio::test]
    async fn test_person_roles_connect_before_reading_user() {
        let engine = Arc::new(ScriptedEngine::new());
        engine.push("info", Ok(alice_record()));
        engine.push_query(vec![json!([])]);
        let roles = RoleRepository::new(restorable_database(&engine, "tok"));

        assert!(roles.person_roles().await.unwrap().is_empty());
        assert_eq!(engine.queries()[0].1["person"], "person:alice");
    }

    #[tokio::test]
    async fn test_add_duplicate_role_is_conflict() {
        let engine = Arc::new(ScriptedEngine::new());
        engine.push_query_err("Role is already assigned to you");
        let roles = RoleRepository::new(connected_database(&engine));

        let err = roles.add_role_to_person("role:gaffer", None).await.unwrap_err();
        assert!(matches!(err.root(), ShError::Conflict { .. }));
        assert_eq!(err.to_string(), "Failed to add role: Role is already assigned to you");
    }

    #[tokio::test]
    async fn test_remove_unknown_role_is_not_found() {
        let engine = Arc::new(ScriptedEngine::new());
        engine.push_query(vec![json!([])]);
        let roles = RoleRepository::new(connected_database(&engine));

        let err = roles
            .remove_role_from_person("person_has_role:r9")
            .await
            .unwrap_err();
        assert!(matches!(err.root(), ShError::NotFound { .. }));
        assert_eq!(err.code(), 404);
    }
}
