//! Organizations and productions
//!
//! Both group kinds share one repository, parameterized by `Group`. Every
//! mutation runs as a single transaction that checks, in order: the record
//! exists, the actor's membership role permits the action, the owner
//! escalation rule, and the self-action rule. A failed check `THROW`s and the
//! engine rolls the transaction back.
//!
//! Roles seen in listings are cached per repository so obviously forbidden
//! calls fail locally with the same message the engine would raise.

use std::collections::HashMap;
use std::marker::PhantomData;

use parking_lot::RwLock;
use serde_json::json;
use sh_auth::permissions::{
    authorize, authorize_removal, authorize_role_change, self_removal_message, GroupAction,
};
use sh_core::{looks_like_record_id, Identifiable, RecordId, ShError, ShResult, ValidationErrors};
use sh_models::{Group, MemberRole, Membership, Organization, Production};

use crate::client::Database;
use crate::repository::{empty_result, ContextExt};

pub type OrganizationRepository = GroupRepository<Organization>;
pub type ProductionRepository = GroupRepository<Production>;

#[derive(Debug, Default)]
struct MembershipCache {
    /// The current user's role per group
    roles: HashMap<RecordId, MemberRole>,
    memberships: HashMap<RecordId, Membership>,
}

pub struct GroupRepository<G: Group> {
    db: Database,
    cache: RwLock<MembershipCache>,
    _group: PhantomData<fn() -> G>,
}

impl<G: Group> GroupRepository<G> {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            cache: RwLock::new(MembershipCache::default()),
            _group: PhantomData,
        }
    }

    /// Groups the current user is a member of, ordered by label
    pub async fn list_for_current_user(&self) -> ShResult<Vec<G>> {
        self.list_groups()
            .await
            .context(&format!("Failed to fetch {}s", G::NOUN))
    }

    /// Create a group owned by the current user
    pub async fn create(&self, label: &str) -> ShResult<G> {
        self.create_group(label)
            .await
            .context(&format!("Failed to create {}", G::NOUN))
    }

    /// Look a group up by record id or slug, among the current user's groups
    pub async fn get_by_slug_or_id(&self, slug_or_id: &str) -> ShResult<Option<G>> {
        self.find_group(slug_or_id)
            .await
            .context(&format!("Failed to fetch {}", G::NOUN))
    }

    /// Rename; owner or admin only
    pub async fn update(&self, id: &str, label: &str) -> ShResult<G> {
        self.update_group(id, label)
            .await
            .context(&format!("Failed to update {}", G::NOUN))
    }

    /// Delete the group and every membership edge; owner only
    pub async fn delete(&self, id: &str) -> ShResult<bool> {
        self.delete_group(id)
            .await
            .context(&format!("Failed to delete {}", G::NOUN))
    }

    pub async fn members(&self, id: &str) -> ShResult<Vec<Membership>> {
        self.list_members(id)
            .await
            .context(&format!("Failed to fetch {} members", G::NOUN))
    }

    pub async fn add_member(&self, id: &str, username: &str, role: MemberRole) -> ShResult<Membership> {
        self.insert_member(id, username, role)
            .await
            .context("Failed to add member")
    }

    pub async fn update_member_role(&self, member_id: &str, role: MemberRole) -> ShResult<Membership> {
        self.change_member_role(member_id, role)
            .await
            .context("Failed to update member role")
    }

    pub async fn remove_member(&self, member_id: &str) -> ShResult<bool> {
        self.delete_member(member_id)
            .await
            .context("Failed to remove member")
    }

    /// The current user's role in a group, `None` when not a member
    pub async fn current_role(&self, id: &str) -> ShResult<Option<MemberRole>> {
        self.fetch_role(id)
            .await
            .context(&format!("Failed to fetch {} role", G::NOUN))
    }

    async fn list_groups(&self) -> ShResult<Vec<G>> {
        self.db.session_user_id().await?;
        let sql = format!(
            "SELECT * FROM {table} WHERE id IN (SELECT VALUE out FROM {edge} WHERE in = $auth.id) ORDER BY {label} ASC;",
            table = G::TABLE_NAME,
            edge = G::EDGE,
            label = G::LABEL_FIELD,
        );
        self.db.query(&sql, json!({})).await?.many(0)
    }

    async fn create_group(&self, label: &str) -> ShResult<G> {
        let label = label.trim();
        if label.is_empty() {
            return Err(ShError::Validation(ValidationErrors::single(
                G::LABEL_FIELD,
                format!("{} {} is required", G::TYPE_NAME, G::LABEL_FIELD),
            )));
        }
        self.db.session_user_id().await?;

        let sql = format!(
            r#"
            BEGIN TRANSACTION;
            LET $group = CREATE ONLY {table} SET {label} = $label, created_at = time::now(), updated_at = time::now();
            LET $actor = $auth.id;
            LET $target = $group.id;
            RELATE $actor->{edge}->$target SET role = "{owner}", joined_at = time::now();
            RETURN $group;
            COMMIT TRANSACTION;
            "#,
            table = G::TABLE_NAME,
            label = G::LABEL_FIELD,
            edge = G::EDGE,
            owner = MemberRole::Owner,
        );

        let group: G = self
            .db
            .query(&sql, json!({ "label": label }))
            .await?
            .returned_one()?
            .ok_or_else(|| empty_result(&format!("Failed to create {}", G::NOUN)))?;

        if let Some(id) = group.id() {
            self.cache.write().roles.insert(id.clone(), MemberRole::Owner);
            tracing::info!(id = %id, "{} created", G::TYPE_NAME);
        }
        Ok(group)
    }

    async fn find_group(&self, slug_or_id: &str) -> ShResult<Option<G>> {
        self.db.session_user_id().await?;
        let mine = format!(
            "id IN (SELECT VALUE out FROM {} WHERE in = $auth.id)",
            G::EDGE
        );

        let mut results = if looks_like_record_id(slug_or_id) {
            let id = RecordId::parse_in(slug_or_id, G::TABLE_NAME)?;
            let sql = format!(
                "SELECT * FROM {} WHERE id = type::record($id) AND {} LIMIT 1;",
                G::TABLE_NAME,
                mine
            );
            self.db.query(&sql, json!({ "id": id })).await?
        } else {
            let sql = format!(
                "SELECT * FROM {} WHERE slug = $slug AND {} LIMIT 1;",
                G::TABLE_NAME,
                mine
            );
            self.db.query(&sql, json!({ "slug": slug_or_id.trim() })).await?
        };
        results.one(0)
    }

    async fn update_group(&self, id: &str, label: &str) -> ShResult<G> {
        let id = RecordId::parse_in(id, G::TABLE_NAME)?;
        let label = label.trim();
        if label.is_empty() {
            return Err(ShError::Validation(ValidationErrors::single(
                G::LABEL_FIELD,
                format!("{} {} is required", G::TYPE_NAME, G::LABEL_FIELD),
            )));
        }
        self.db.session_user_id().await?;
        self.authorize_cached(GroupAction::Update, &id)?;

        let sql = format!(
            r#"
            BEGIN TRANSACTION;
            LET $target = type::record($id);
            {exists}
            {permitted}
            UPDATE $target SET {label} = $label, updated_at = time::now();
            RETURN (SELECT * FROM $target)[0];
            COMMIT TRANSACTION;
            "#,
            exists = Self::require_target(),
            permitted = Self::require(GroupAction::Update),
            label = G::LABEL_FIELD,
        );

        self.db
            .query(&sql, json!({ "id": id, "label": label }))
            .await?
            .returned_one()?
            .ok_or_else(|| empty_result(&format!("Failed to update {}", G::NOUN)))
    }

    async fn delete_group(&self, id: &str) -> ShResult<bool> {
        let id = RecordId::parse_in(id, G::TABLE_NAME)?;
        self.db.session_user_id().await?;
        self.authorize_cached(GroupAction::Delete, &id)?;

        let sql = format!(
            r#"
            BEGIN TRANSACTION;
            LET $target = type::record($id);
            {exists}
            {permitted}
            DELETE {edge} WHERE out = $target;
            DELETE $target;
            COMMIT TRANSACTION;
            "#,
            exists = Self::require_target(),
            permitted = Self::require(GroupAction::Delete),
            edge = G::EDGE,
        );
        self.db.query(&sql, json!({ "id": id })).await?;

        let mut cache = self.cache.write();
        cache.roles.remove(&id);
        cache.memberships.retain(|_, m| m.group != id);
        tracing::info!(id = %id, "{} deleted", G::TYPE_NAME);
        Ok(true)
    }

    async fn list_members(&self, id: &str) -> ShResult<Vec<Membership>> {
        let id = RecordId::parse_in(id, G::TABLE_NAME)?;
        let me = self.db.session_user_id().await?;

        let sql = format!(
            "SELECT {} FROM {} WHERE out = type::record($id) ORDER BY joined_at ASC;",
            Self::member_projection(),
            G::EDGE
        );
        let members: Vec<Membership> = self.db.query(&sql, json!({ "id": id })).await?.many(0)?;

        let mut cache = self.cache.write();
        cache.roles.remove(&id);
        for member in &members {
            if member.member == me {
                cache.roles.insert(id.clone(), member.role);
            }
            cache.memberships.insert(member.id.clone(), member.clone());
        }
        Ok(members)
    }

    async fn insert_member(&self, id: &str, username: &str, role: MemberRole) -> ShResult<Membership> {
        let id = RecordId::parse_in(id, G::TABLE_NAME)?;
        let username = username.trim().to_lowercase();
        if username.is_empty() {
            return Err(ShError::Validation(ValidationErrors::single(
                "username",
                "Username is required",
            )));
        }
        if role == MemberRole::Owner {
            return Err(ShError::rejected("New members cannot be added as owner"));
        }
        self.db.session_user_id().await?;
        self.authorize_cached(GroupAction::AddMember, &id)?;

        let sql = format!(
            r#"
            BEGIN TRANSACTION;
            LET $target = type::record($id);
            {exists}
            {permitted}
            LET $person = (SELECT id FROM person WHERE username = $username)[0];
            IF $person == NONE {{ THROW "User not found"; }};
            LET $person_id = $person.id;
            IF (SELECT * FROM {edge} WHERE in = $person_id AND out = $target)[0] != NONE {{
                THROW "User is already a member of this {noun}";
            }};
            LET $created = (RELATE $person_id->{edge}->$target SET role = $role, joined_at = time::now())[0];
            RETURN (SELECT {projection} FROM $created.id)[0];
            COMMIT TRANSACTION;
            "#,
            exists = Self::require_target(),
            permitted = Self::require(GroupAction::AddMember),
            edge = G::EDGE,
            noun = G::NOUN,
            projection = Self::member_projection(),
        );

        let membership: Membership = self
            .db
            .query(&sql, json!({ "id": id, "username": username, "role": role }))
            .await?
            .returned_one()?
            .ok_or_else(|| empty_result("Failed to add member"))?;

        self.cache
            .write()
            .memberships
            .insert(membership.id.clone(), membership.clone());
        tracing::info!(group = %id, username = %username, role = %role, "Member added");
        Ok(membership)
    }

    async fn change_member_role(&self, member_id: &str, role: MemberRole) -> ShResult<Membership> {
        let member_id = RecordId::parse_in(member_id, G::EDGE)?;
        let me = self.db.session_user_id().await?;

        {
            let cache = self.cache.read();
            if let Some(existing) = cache.memberships.get(&member_id) {
                if let Some(actor) = cache.roles.get(&existing.group) {
                    authorize_role_change(Some(*actor), existing.role, role, G::NOUN)?;
                }
            }
        }

        let sql = format!(
            r#"
            BEGIN TRANSACTION;
            {membership}
            {permitted}
            IF $role == "{owner}" AND {assign_denied} {{ THROW "{assign_message}"; }};
            IF $membership.role == "{owner}" AND {demote_denied} {{ THROW "{demote_message}"; }};
            UPDATE $membership.id SET role = $role, updated_at = time::now();
            RETURN (SELECT {projection} FROM $membership.id)[0];
            COMMIT TRANSACTION;
            "#,
            membership = Self::require_membership(),
            permitted = Self::require(GroupAction::ChangeMemberRole),
            owner = MemberRole::Owner,
            assign_denied = Self::denied(GroupAction::AssignOwner),
            assign_message = GroupAction::AssignOwner.denial_message(G::NOUN),
            demote_denied = Self::denied(GroupAction::DemoteOwner),
            demote_message = GroupAction::DemoteOwner.denial_message(G::NOUN),
            projection = Self::member_projection(),
        );

        let membership: Membership = self
            .db
            .query(&sql, json!({ "member_id": member_id, "role": role }))
            .await?
            .returned_one()?
            .ok_or_else(|| empty_result("Failed to update member role"))?;

        let mut cache = self.cache.write();
        if membership.member == me {
            cache.roles.insert(membership.group.clone(), membership.role);
        }
        cache
            .memberships
            .insert(membership.id.clone(), membership.clone());
        Ok(membership)
    }

    async fn delete_member(&self, member_id: &str) -> ShResult<bool> {
        let member_id = RecordId::parse_in(member_id, G::EDGE)?;
        let me = self.db.session_user_id().await?;

        {
            let cache = self.cache.read();
            if let Some(existing) = cache.memberships.get(&member_id) {
                if let Some(actor) = cache.roles.get(&existing.group) {
                    authorize_removal(
                        Some(*actor),
                        existing.role,
                        existing.member == me,
                        G::NOUN,
                        G::A_NOUN,
                    )?;
                }
            }
        }

        let sql = format!(
            r#"
            BEGIN TRANSACTION;
            {membership}
            {permitted}
            IF $membership.role == "{owner}" AND {owner_denied} {{ THROW "{owner_message}"; }};
            IF $membership.role == "{admin}" AND {admin_denied} {{ THROW "{admin_message}"; }};
            IF $membership.in == $auth.id {{ THROW "{self_message}"; }};
            DELETE $membership.id;
            COMMIT TRANSACTION;
            "#,
            membership = Self::require_membership(),
            permitted = Self::require(GroupAction::RemoveMember),
            owner = MemberRole::Owner,
            owner_denied = Self::denied(GroupAction::RemoveOwner),
            owner_message = GroupAction::RemoveOwner.denial_message(G::NOUN),
            admin = MemberRole::Admin,
            admin_denied = Self::denied(GroupAction::RemoveAdmin),
            admin_message = GroupAction::RemoveAdmin.denial_message(G::NOUN),
            self_message = self_removal_message(G::A_NOUN),
        );
        self.db.query(&sql, json!({ "member_id": member_id })).await?;

        self.cache.write().memberships.remove(&member_id);
        tracing::info!(membership = %member_id, "Member removed");
        Ok(true)
    }

    async fn fetch_role(&self, id: &str) -> ShResult<Option<MemberRole>> {
        let id = RecordId::parse_in(id, G::TABLE_NAME)?;
        self.db.session_user_id().await?;

        let sql = format!(
            "SELECT VALUE role FROM {} WHERE in = $auth.id AND out = type::record($id) LIMIT 1;",
            G::EDGE
        );
        let role: Option<MemberRole> = self.db.query(&sql, json!({ "id": id })).await?.one(0)?;

        let mut cache = self.cache.write();
        match role {
            Some(role) => cache.roles.insert(id, role),
            None => cache.roles.remove(&id),
        };
        Ok(role)
    }

    /// Local pre-flight check against the cached role, if one is known
    fn authorize_cached(&self, action: GroupAction, group: &RecordId) -> ShResult<()> {
        match self.cache.read().roles.get(group) {
            Some(role) => authorize(action, Some(*role), G::NOUN),
            None => Ok(()),
        }
    }

    /// Condition that holds when the current user lacks the role for `action` on `$target`
    fn denied(action: GroupAction) -> String {
        format!(
            "(SELECT * FROM {} WHERE in = $auth.id AND out = $target AND role IN {})[0] == NONE",
            G::EDGE,
            action.role_list()
        )
    }

    fn require(action: GroupAction) -> String {
        format!(
            "IF {} {{ THROW \"{}\"; }};",
            Self::denied(action),
            action.denial_message(G::NOUN)
        )
    }

    fn require_target() -> String {
        format!(
            "IF (SELECT * FROM $target)[0] == NONE {{ THROW \"{} not found\"; }};",
            G::TYPE_NAME
        )
    }

    /// Binds `$membership` and its group as `$target`
    fn require_membership() -> String {
        "LET $membership = (SELECT * FROM type::record($member_id))[0];\n\
         IF $membership == NONE { THROW \"Membership not found\"; };\n\
         LET $target = $membership.out;"
            .to_string()
    }

    fn member_projection() -> String {
        "*, (SELECT id, username, email, emails FROM person WHERE id = $parent.in) AS person"
            .to_string()
    }
}
