//! Department catalog and the current user's specializations
//!
//! A specialization is a `person_specializes_in` edge carrying a priority;
//! listings sort by priority then by the time it was added, newest first.

use serde_json::{json, Value};
use sh_core::{Entity, RecordId, ShError, ShResult};
use sh_models::{CatalogRole, Department, PersonDepartment, Role};

use crate::client::Database;
use crate::repository::{empty_result, ContextExt};

const DEPARTMENT_FIELDS: &str = "id, name, slug, description, created_at, updated_at";

const SPECIALIZATION_FIELDS: &str = "id, in, out, added_at, priority, \
     (SELECT id, name, slug, description, created_at, updated_at FROM department WHERE id = $parent.out)[0] AS department_details";

pub struct DepartmentRepository {
    db: Database,
}

impl DepartmentRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn all_departments(&self) -> ShResult<Vec<Department>> {
        self.fetch_all()
            .await
            .context("Failed to fetch departments")
    }

    /// Departments a role belongs to
    pub async fn departments_for_role(&self, role_id: &str) -> ShResult<Vec<Department>> {
        self.fetch_for_role(role_id)
            .await
            .context("Failed to fetch departments for role")
    }

    /// Catalog roles listed under a department
    pub async fn roles_for_department(&self, department_id: &str) -> ShResult<Vec<CatalogRole>> {
        self.fetch_catalog_roles(department_id)
            .await
            .context("Failed to fetch roles for department")
    }

    pub async fn specializations(&self) -> ShResult<Vec<PersonDepartment>> {
        self.fetch_specializations()
            .await
            .context("Failed to fetch specializations")
    }

    pub async fn add_specialization(
        &self,
        department_id: &str,
        priority: i64,
    ) -> ShResult<PersonDepartment> {
        self.specialize(department_id, priority)
            .await
            .context("Failed to add specialization")
    }

    pub async fn update_priority(
        &self,
        specialization_id: &str,
        priority: i64,
    ) -> ShResult<PersonDepartment> {
        self.reprioritize(specialization_id, priority)
            .await
            .context("Failed to update specialization priority")
    }

    pub async fn remove_specialization(&self, specialization_id: &str) -> ShResult<bool> {
        self.unspecialize(specialization_id)
            .await
            .context("Failed to remove specialization")
    }

    async fn fetch_all(&self) -> ShResult<Vec<Department>> {
        let sql = format!("SELECT {} FROM department ORDER BY name ASC;", DEPARTMENT_FIELDS);
        self.db.query(&sql, json!({})).await?.many(0)
    }

    async fn fetch_for_role(&self, role_id: &str) -> ShResult<Vec<Department>> {
        let role = RecordId::in_table(role_id, Role::TABLE_NAME)?;
        let sql = format!(
            "SELECT {} FROM department WHERE id IN (SELECT VALUE out FROM belongs_to_department WHERE in = type::record($role)) ORDER BY name ASC;",
            DEPARTMENT_FIELDS
        );
        self.db.query(&sql, json!({ "role": role })).await?.many(0)
    }

    async fn fetch_catalog_roles(&self, department_id: &str) -> ShResult<Vec<CatalogRole>> {
        let department = RecordId::in_table(department_id, Department::TABLE_NAME)?;
        let sql = "SELECT * FROM role WHERE id IN (SELECT VALUE in FROM belongs_to_department WHERE out = type::record($department)) ORDER BY standardized_title ASC;";
        self.db
            .query(sql, json!({ "department": department }))
            .await?
            .many(0)
    }

    async fn fetch_specializations(&self) -> ShResult<Vec<PersonDepartment>> {
        let me = self.db.session_user_id().await?;
        let sql = format!(
            "SELECT {} FROM {} WHERE in = type::record($person) ORDER BY priority DESC, added_at DESC;",
            SPECIALIZATION_FIELDS,
            PersonDepartment::EDGE
        );
        self.db.query(&sql, json!({ "person": me })).await?.many(0)
    }

    async fn specialize(&self, department_id: &str, priority: i64) -> ShResult<PersonDepartment> {
        let department = RecordId::in_table(department_id, Department::TABLE_NAME)?;
        let me = self.db.session_user_id().await?;

        let sql = format!(
            r#"
            BEGIN TRANSACTION;
            LET $me = type::record($person);
            LET $department = type::record($department_id);
            IF (SELECT id FROM $department)[0] == NONE {{ THROW "Department not found"; }};
            IF (SELECT id FROM {edge} WHERE in = $me AND out = $department)[0] != NONE {{
                THROW "Department is already one of your specializations";
            }};
            LET $edge = (RELATE $me->{edge}->$department SET priority = $priority, added_at = time::now())[0];
            RETURN (SELECT {fields} FROM $edge.id)[0];
            COMMIT TRANSACTION;
            "#,
            edge = PersonDepartment::EDGE,
            fields = SPECIALIZATION_FIELDS,
        );

        let added: PersonDepartment = self
            .db
            .query(
                &sql,
                json!({ "person": me, "department_id": department, "priority": priority }),
            )
            .await?
            .returned_one()?
            .ok_or_else(|| empty_result("Failed to add specialization"))?;

        tracing::info!(department = %department, priority, "Specialization added");
        Ok(added)
    }

    async fn reprioritize(&self, specialization_id: &str, priority: i64) -> ShResult<PersonDepartment> {
        let id = RecordId::in_table(specialization_id, PersonDepartment::EDGE)?;
        let me = self.db.session_user_id().await?;

        let sql = format!(
            r#"
            BEGIN TRANSACTION;
            LET $edge = (SELECT id FROM {edge} WHERE id = type::record($id) AND in = type::record($person))[0];
            IF $edge == NONE {{ THROW "Specialization not found"; }};
            UPDATE $edge.id SET priority = $priority RETURN NONE;
            RETURN (SELECT {fields} FROM $edge.id)[0];
            COMMIT TRANSACTION;
            "#,
            edge = PersonDepartment::EDGE,
            fields = SPECIALIZATION_FIELDS,
        );

        self.db
            .query(&sql, json!({ "id": id, "person": me, "priority": priority }))
            .await?
            .returned_one()?
            .ok_or_else(|| empty_result("Failed to update specialization"))
    }

    async fn unspecialize(&self, specialization_id: &str) -> ShResult<bool> {
        let id = RecordId::in_table(specialization_id, PersonDepartment::EDGE)?;
        let me = self.db.session_user_id().await?;

        let sql = format!(
            "DELETE {} WHERE id = type::record($id) AND in = type::record($person) RETURN BEFORE;",
            PersonDepartment::EDGE
        );
        let removed: Vec<Value> = self
            .db
            .query(&sql, json!({ "id": id, "person": me }))
            .await?
            .many(0)?;

        if removed.is_empty() {
            return Err(ShError::NotFound {
                entity: "Specialization",
                field: "id",
                value: id.to_string(),
            });
        }
        Ok(true)
    }
}
