//! The signed-in person's profile
//!
//! Every change here is written through to the cached user snapshot in the
//! session state, so observers see it without refetching.

use serde_json::{json, Map, Value};
use sh_core::{RecordId, ShError, ShResult, ValidationErrors};
use sh_models::{validate_email, CredentialsUpdate, Profile, ProfileImage, ProfileUpdate};
use validator::Validate;

use crate::client::Database;
use crate::repository::{empty_result, ContextExt};

const PROFILE_FIELDS: &str = "id, username, emails, full_name, location, phone, social, \
     global_role, created_at, updated_at, profile_images, profile_image_active";

pub struct ProfileRepository {
    db: Database,
}

impl ProfileRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn get_profile(&self) -> ShResult<Option<Profile>> {
        self.fetch_profile().await.context("Failed to fetch profile")
    }

    /// Append a base64 image; it becomes active when none is
    pub async fn upload_profile_image(&self, data: &str) -> ShResult<ProfileImage> {
        self.append_image(data)
            .await
            .context("Failed to upload profile image")
    }

    pub async fn delete_profile_image(&self, image_id: &str) -> ShResult<bool> {
        self.drop_image(image_id)
            .await
            .context("Failed to delete profile image")
    }

    pub async fn set_active_profile_image(&self, image_id: &str) -> ShResult<bool> {
        self.activate_image(image_id)
            .await
            .context("Failed to set active profile image")
    }

    /// Active image of the cached user snapshot
    pub fn active_profile_image(&self) -> Option<ProfileImage> {
        self.db
            .current_user()
            .and_then(|user| user.active_image().cloned())
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> ShResult<Profile> {
        self.write_profile(update)
            .await
            .context("Failed to update profile")
    }

    /// Change username and/or password after verifying the current password
    pub async fn update_credentials(&self, update: &CredentialsUpdate) -> ShResult<Profile> {
        self.write_credentials(update)
            .await
            .context("Failed to update credentials")
    }

    pub async fn add_email(&self, email: &str, is_primary: bool) -> ShResult<Profile> {
        self.insert_email(email, is_primary)
            .await
            .context("Failed to add email")
    }

    pub async fn remove_email(&self, email: &str) -> ShResult<Profile> {
        self.delete_email(email)
            .await
            .context("Failed to remove email")
    }

    pub async fn set_primary_email(&self, email: &str) -> ShResult<Profile> {
        self.promote_email(email)
            .await
            .context("Failed to set primary email")
    }

    /// Primary address of the cached user snapshot
    pub fn primary_email(&self) -> Option<String> {
        self.db
            .current_user()
            .and_then(|user| user.primary_email().map(|e| e.address.clone()))
    }

    async fn fetch_profile(&self) -> ShResult<Option<Profile>> {
        let me = self.db.session_user_id().await?;
        let sql = format!("SELECT {} FROM type::record($id);", PROFILE_FIELDS);
        self.db.query(&sql, json!({ "id": me })).await?.one(0)
    }

    async fn require_profile(&self) -> ShResult<(RecordId, Profile)> {
        let me = self.db.session_user_id().await?;
        let profile = self.fetch_profile().await?.ok_or_else(|| ShError::NotFound {
            entity: "Person",
            field: "id",
            value: me.to_string(),
        })?;
        Ok((me, profile))
    }

    async fn append_image(&self, data: &str) -> ShResult<ProfileImage> {
        let data = data.trim();
        if data.is_empty() {
            return Err(ShError::Validation(ValidationErrors::single(
                "data",
                "Image data is required",
            )));
        }
        let me = self.db.session_user_id().await?;
        let image = ProfileImage::new(data);

        let sql = r#"
            BEGIN TRANSACTION;
            LET $me = type::record($id);
            LET $image = { id: $image_id, data: $data, created_at: time::now() };
            UPDATE $me SET
                profile_images = array::concat(profile_images ?? [], [$image]),
                profile_image_active = profile_image_active ?? $image_id,
                updated_at = time::now();
            RETURN $image;
            COMMIT TRANSACTION;
        "#;

        let stored: ProfileImage = self
            .db
            .query(sql, json!({ "id": me, "image_id": image.id, "data": image.data }))
            .await?
            .returned_one()?
            .ok_or_else(|| empty_result("Failed to upload profile image"))?;

        self.db.update_current_user(|user| user.add_image(stored.clone()));
        tracing::debug!(image = %stored.id, "Profile image uploaded");
        Ok(stored)
    }

    async fn drop_image(&self, image_id: &str) -> ShResult<bool> {
        let me = self.db.session_user_id().await?;

        let sql = r#"
            BEGIN TRANSACTION;
            LET $me = type::record($id);
            LET $current = (SELECT profile_images, profile_image_active FROM $me)[0];
            LET $remaining = array::filter($current.profile_images ?? [], |$img| $img.id != $image_id);
            LET $active = IF $current.profile_image_active == $image_id {
                $remaining[0].id
            } ELSE {
                $current.profile_image_active
            };
            UPDATE $me SET
                profile_images = $remaining,
                profile_image_active = $active,
                updated_at = time::now();
            COMMIT TRANSACTION;
        "#;
        self.db
            .query(sql, json!({ "id": me, "image_id": image_id }))
            .await?;

        self.db.update_current_user(|user| {
            user.remove_image(image_id);
        });
        Ok(true)
    }

    async fn activate_image(&self, image_id: &str) -> ShResult<bool> {
        let (me, mut profile) = self.require_profile().await?;
        profile.set_active_image(image_id)?;

        let sql = "UPDATE type::record($id) SET profile_image_active = $image_id, updated_at = time::now();";
        self.db
            .query(sql, json!({ "id": me, "image_id": image_id }))
            .await?;

        self.db.update_current_user(|user| {
            user.profile_image_active = profile.profile_image_active.clone();
        });
        Ok(true)
    }

    async fn write_profile(&self, update: &ProfileUpdate) -> ShResult<Profile> {
        if update.is_empty() {
            return Ok(self.require_profile().await?.1);
        }
        let me = self.db.session_user_id().await?;

        let mut vars = match serde_json::to_value(update)? {
            Value::Object(fields) => fields,
            _ => Map::new(),
        };
        let assignments: Vec<String> = vars.keys().map(|field| format!("{0} = ${0}", field)).collect();
        vars.insert("id".into(), json!(me));

        let sql = format!(
            "UPDATE type::record($id) SET {}, updated_at = time::now() RETURN {};",
            assignments.join(", "),
            PROFILE_FIELDS
        );
        let profile: Profile = self
            .db
            .query(&sql, Value::Object(vars))
            .await?
            .one(0)?
            .ok_or_else(|| empty_result("Failed to update profile"))?;

        self.db.update_current_user(|user| update.apply_to(user));
        Ok(profile)
    }

    async fn write_credentials(&self, update: &CredentialsUpdate) -> ShResult<Profile> {
        update.validate()?;
        if !update.changes_anything() {
            return Ok(self.require_profile().await?.1);
        }
        let me = self.db.session_user_id().await?;
        let username = update.normalized_username();
        let new_password = update.new_password.as_deref().filter(|p| !p.is_empty());

        let mut assignments = Vec::new();
        let mut username_check = String::new();
        let mut vars = Map::new();
        vars.insert("id".into(), json!(me));
        vars.insert("current_password".into(), json!(update.current_password));

        if let Some(username) = &username {
            username_check = "IF (SELECT id FROM person WHERE username = $username AND id != $me)[0] != NONE { THROW \"Username already exists\"; };".to_string();
            assignments.push("username = $username");
            vars.insert("username".into(), json!(username));
        }
        if let Some(password) = new_password {
            assignments.push("password = crypto::argon2::generate($new_password)");
            vars.insert("new_password".into(), json!(password));
        }
        assignments.push("updated_at = time::now()");

        let sql = format!(
            r#"
            BEGIN TRANSACTION;
            LET $me = type::record($id);
            IF (SELECT id FROM $me WHERE crypto::argon2::compare(password, $current_password))[0] == NONE {{
                THROW "Current password is incorrect";
            }};
            {username_check}
            UPDATE $me SET {assignments};
            RETURN (SELECT {fields} FROM $me)[0];
            COMMIT TRANSACTION;
            "#,
            username_check = username_check,
            assignments = assignments.join(", "),
            fields = PROFILE_FIELDS,
        );

        let profile: Profile = self
            .db
            .query(&sql, Value::Object(vars))
            .await?
            .returned_one()?
            .ok_or_else(|| empty_result("Failed to update credentials"))?;

        if let Some(username) = username {
            self.db.update_current_user(|user| user.username = username);
        }
        tracing::info!(user = %me, "Credentials updated");
        Ok(profile)
    }

    async fn insert_email(&self, email: &str, is_primary: bool) -> ShResult<Profile> {
        let email = email.trim().to_lowercase();
        if !validate_email(&email) {
            return Err(ShError::Validation(ValidationErrors::single(
                "email",
                "Invalid email format",
            )));
        }

        let (me, mut profile) = self.require_profile().await?;
        if profile.has_email(&email) {
            return Err(ShError::Conflict {
                message: "This email address is already in use".into(),
            });
        }
        profile.add_email(email.as_str(), is_primary);

        let sql = format!(
            r#"
            BEGIN TRANSACTION;
            LET $me = type::record($id);
            IF (SELECT id FROM person WHERE $email IN emails[*].address)[0] != NONE {{
                THROW "This email address is already in use";
            }};
            UPDATE $me SET emails = $emails, updated_at = time::now();
            RETURN (SELECT {} FROM $me)[0];
            COMMIT TRANSACTION;
            "#,
            PROFILE_FIELDS
        );

        let updated: Profile = self
            .db
            .query(&sql, json!({ "id": me, "email": email, "emails": profile.emails }))
            .await?
            .returned_one()?
            .ok_or_else(|| empty_result("Failed to add email address"))?;

        let emails = profile.emails;
        self.db.update_current_user(|user| user.emails = emails);
        Ok(updated)
    }

    async fn delete_email(&self, email: &str) -> ShResult<Profile> {
        let email = email.trim().to_lowercase();
        let (me, mut profile) = self.require_profile().await?;
        profile.remove_email(&email)?;
        self.store_emails(me, profile, "Failed to remove email address").await
    }

    async fn promote_email(&self, email: &str) -> ShResult<Profile> {
        let email = email.trim().to_lowercase();
        let (me, mut profile) = self.require_profile().await?;
        profile.set_primary_email(&email)?;
        self.store_emails(me, profile, "Failed to set primary email").await
    }

    async fn store_emails(&self, me: RecordId, profile: Profile, what: &str) -> ShResult<Profile> {
        let sql = format!(
            "UPDATE type::record($id) SET emails = $emails, updated_at = time::now() RETURN {};",
            PROFILE_FIELDS
        );
        let updated: Profile = self
            .db
            .query(&sql, json!({ "id": me, "emails": profile.emails }))
            .await?
            .one(0)?
            .ok_or_else(|| empty_result(what))?;

        let emails = profile.emails;
        self.db.update_current_user(|user| user.emails = emails);
        Ok(updated)
    }
}
