//! Person / profile records
//!
//! Table: person
//!
//! The email and image list rules live here as plain methods so the
//! repository can compute the new list, send it, and apply the same change to
//! the cached user snapshot.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sh_core::{Entity, Identifiable, RecordId, ShError, ShResult, Timestamped};
use validator::Validate;

use crate::shape::null_as_default;

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

/// Loose `local@domain.tld` check applied before any email reaches the engine
pub fn validate_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub address: String,
    #[serde(default)]
    pub is_primary: bool,
}

impl Email {
    pub fn new(address: impl Into<String>, is_primary: bool) -> Self {
        Self {
            address: address.into(),
            is_primary,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileImage {
    pub id: String,
    /// Base64 encoded image payload
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ProfileImage {
    /// New image with a fresh id; `created_at` is stamped by the engine
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            data: data.into(),
            created_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phone {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Social {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram: Option<String>,
}

/// A person record, also used as the cached user snapshot of the session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub username: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub emails: Vec<Email>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<Phone>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social: Option<Social>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_role: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub profile_images: Vec<ProfileImage>,

    /// Id of an element of `profile_images`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image_active: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// The primary email, falling back to the first one
    pub fn primary_email(&self) -> Option<&Email> {
        self.emails
            .iter()
            .find(|e| e.is_primary)
            .or_else(|| self.emails.first())
    }

    pub fn has_email(&self, address: &str) -> bool {
        self.emails.iter().any(|e| e.address == address)
    }

    /// Append an address. A primary address clears every other primary flag.
    pub fn add_email(&mut self, address: impl Into<String>, is_primary: bool) {
        if is_primary {
            for email in &mut self.emails {
                email.is_primary = false;
            }
        }
        self.emails.push(Email::new(address, is_primary));
    }

    /// Remove an address, promoting the first remaining one if the primary went away
    pub fn remove_email(&mut self, address: &str) -> ShResult<()> {
        let index = self
            .emails
            .iter()
            .position(|e| e.address == address)
            .ok_or_else(|| ShError::missing("Email not found"))?;

        if self.emails.len() == 1 {
            return Err(ShError::rejected("Cannot remove the only email address"));
        }

        let removed_primary = self.emails[index].is_primary;
        self.emails.remove(index);
        if removed_primary {
            if let Some(first) = self.emails.first_mut() {
                first.is_primary = true;
            }
        }
        Ok(())
    }

    pub fn set_primary_email(&mut self, address: &str) -> ShResult<()> {
        if !self.has_email(address) {
            return Err(ShError::missing("Email not found in your profile"));
        }
        for email in &mut self.emails {
            email.is_primary = email.address == address;
        }
        Ok(())
    }

    pub fn active_image(&self) -> Option<&ProfileImage> {
        let active = self.profile_image_active.as_deref()?;
        self.profile_images.iter().find(|img| img.id == active)
    }

    /// Append an image; it becomes active when nothing is active yet
    pub fn add_image(&mut self, image: ProfileImage) {
        if self.profile_image_active.is_none() {
            self.profile_image_active = Some(image.id.clone());
        }
        self.profile_images.push(image);
    }

    /// Drop an image. Deleting the active one reassigns to the first remaining or clears it.
    pub fn remove_image(&mut self, image_id: &str) -> bool {
        let before = self.profile_images.len();
        self.profile_images.retain(|img| img.id != image_id);
        if self.profile_image_active.as_deref() == Some(image_id) {
            self.profile_image_active = self.profile_images.first().map(|img| img.id.clone());
        }
        self.profile_images.len() != before
    }

    pub fn set_active_image(&mut self, image_id: &str) -> ShResult<()> {
        if !self.profile_images.iter().any(|img| img.id == image_id) {
            return Err(ShError::missing("Image not found in user's profile"));
        }
        self.profile_image_active = Some(image_id.to_string());
        Ok(())
    }
}

impl Identifiable for Profile {
    fn id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }
}

impl Timestamped for Profile {
    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

impl Entity for Profile {
    const TABLE_NAME: &'static str = "person";
    const TYPE_NAME: &'static str = "Person";
}

/// Editable profile fields; unset fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<Phone>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social: Option<Social>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.location.is_none()
            && self.phone.is_none()
            && self.social.is_none()
    }

    pub fn apply_to(&self, profile: &mut Profile) {
        if let Some(full_name) = &self.full_name {
            profile.full_name = Some(full_name.clone());
        }
        if let Some(location) = &self.location {
            profile.location = Some(location.clone());
        }
        if let Some(phone) = &self.phone {
            profile.phone = Some(phone.clone());
        }
        if let Some(social) = &self.social {
            profile.social = Some(social.clone());
        }
    }
}

/// Username and/or password change, authorized by the current password
#[derive(Clone, Default, Validate)]
pub struct CredentialsUpdate {
    #[validate(length(min = 3, max = 64, message = "Username must be between 3 and 64 characters"))]
    pub username: Option<String>,
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 8, message = "New password must be at least 8 characters"))]
    pub new_password: Option<String>,
}

impl CredentialsUpdate {
    /// Usernames are stored lowercased
    pub fn normalized_username(&self) -> Option<String> {
        self.username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_lowercase)
    }

    pub fn changes_anything(&self) -> bool {
        self.normalized_username().is_some()
            || self.new_password.as_deref().is_some_and(|p| !p.is_empty())
    }
}

impl fmt::Debug for CredentialsUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsUpdate")
            .field("username", &self.username)
            .field("current_password", &"[redacted]")
            .field("new_password", &self.new_password.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// Account creation input
#[derive(Clone, Validate)]
pub struct Signup {
    #[validate(length(min = 3, max = 64, message = "Username must be between 3 and 64 characters"))]
    pub username: String,
    #[validate(custom(function = "check_email"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

impl Signup {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Signup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signup")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"[redacted]")
            .finish()
    }
}

fn check_email(email: &str) -> Result<(), validator::ValidationError> {
    if validate_email(email) {
        Ok(())
    } else {
        let mut error = validator::ValidationError::new("email");
        error.message = Some("Invalid email format".into());
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile_with_emails(emails: &[(&str, bool)]) -> Profile {
        Profile {
            username: "alice".into(),
            emails: emails.iter().map(|(a, p)| Email::new(*a, *p)).collect(),
            ..Default::default()
        }
    }

    fn image(id: &str) -> ProfileImage {
        ProfileImage {
            id: id.into(),
            data: "aGVsbG8=".into(),
            created_at: None,
        }
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("alice@slatehub.com"));
        assert!(!validate_email("alice@slatehub"));
        assert!(!validate_email("alice slatehub@x.com"));
        assert!(!validate_email("@x.com"));
    }

    #[test]
    fn test_add_primary_email_leaves_single_primary() {
        let mut profile = profile_with_emails(&[("a@x.com", true), ("b@x.com", false)]);
        profile.add_email("c@x.com", true);

        let primaries: Vec<_> = profile.emails.iter().filter(|e| e.is_primary).collect();
        assert_eq!(primaries.len(), 1);
        assert_eq!(primaries[0].address, "c@x.com");
    }

    #[test]
    fn test_add_secondary_email_keeps_primary() {
        let mut profile = profile_with_emails(&[("a@x.com", true)]);
        profile.add_email("b@x.com", false);
        assert_eq!(profile.primary_email().unwrap().address, "a@x.com");
        assert_eq!(profile.emails.len(), 2);
    }

    #[test]
    fn test_remove_primary_promotes_first_remaining() {
        let mut profile =
            profile_with_emails(&[("a@x.com", false), ("b@x.com", true), ("c@x.com", false)]);
        profile.remove_email("b@x.com").unwrap();
        assert_eq!(profile.emails.len(), 2);
        assert!(profile.emails[0].is_primary);
        assert_eq!(profile.primary_email().unwrap().address, "a@x.com");
    }

    #[test]
    fn test_remove_only_email_fails() {
        let mut profile = profile_with_emails(&[("a@x.com", true)]);
        let err = profile.remove_email("a@x.com").unwrap_err();
        assert_eq!(err.to_string(), "Cannot remove the only email address");

        let err = profile.remove_email("z@x.com").unwrap_err();
        assert_eq!(err.to_string(), "Email not found");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_remove_only_non_primary_email_fails() {
        let mut profile = profile_with_emails(&[("a@x.com", false)]);
        let err = profile.remove_email("a@x.com").unwrap_err();
        assert_eq!(err.to_string(), "Cannot remove the only email address");
        assert_eq!(profile.emails.len(), 1);
    }

    #[test]
    fn test_set_primary_email() {
        let mut profile = profile_with_emails(&[("a@x.com", true), ("b@x.com", false)]);
        profile.set_primary_email("b@x.com").unwrap();
        assert!(!profile.emails[0].is_primary);
        assert!(profile.emails[1].is_primary);
        assert!(profile.set_primary_email("z@x.com").is_err());
    }

    #[test]
    fn test_primary_email_falls_back_to_first() {
        let profile = profile_with_emails(&[("a@x.com", false), ("b@x.com", false)]);
        assert_eq!(profile.primary_email().unwrap().address, "a@x.com");
        assert!(Profile::default().primary_email().is_none());
    }

    #[test]
    fn test_first_image_becomes_active() {
        let mut profile = Profile::default();
        profile.add_image(image("one"));
        profile.add_image(image("two"));
        assert_eq!(profile.profile_image_active.as_deref(), Some("one"));
        assert_eq!(profile.active_image().unwrap().id, "one");
    }

    #[test]
    fn test_remove_active_image_reassigns_to_first_remaining() {
        let mut profile = Profile::default();
        profile.add_image(image("one"));
        profile.add_image(image("two"));
        profile.add_image(image("three"));
        profile.set_active_image("two").unwrap();

        assert!(profile.remove_image("two"));
        assert_eq!(profile.profile_image_active.as_deref(), Some("one"));

        assert!(profile.remove_image("one"));
        assert_eq!(profile.profile_image_active.as_deref(), Some("three"));

        assert!(profile.remove_image("three"));
        assert_eq!(profile.profile_image_active, None);
        assert!(profile.active_image().is_none());
    }

    #[test]
    fn test_remove_inactive_image_keeps_pointer() {
        let mut profile = Profile::default();
        profile.add_image(image("one"));
        profile.add_image(image("two"));
        assert!(profile.remove_image("two"));
        assert_eq!(profile.profile_image_active.as_deref(), Some("one"));
        assert!(!profile.remove_image("missing"));
    }

    #[test]
    fn test_set_active_image_requires_existing() {
        let mut profile = Profile::default();
        let err = profile.set_active_image("nope").unwrap_err();
        assert_eq!(err.to_string(), "Image not found in user's profile");
    }

    #[test]
    fn test_profile_tolerates_nulls() {
        let profile: Profile = serde_json::from_value(json!({
            "id": "person:alice",
            "username": "alice",
            "emails": null,
            "profile_images": null,
            "full_name": null,
            "created_at": "2024-03-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(profile.id, Some(RecordId::new("person", "alice")));
        assert!(profile.emails.is_empty());
        assert!(profile.profile_images.is_empty());
        assert!(profile.created_at.is_some());
    }

    #[test]
    fn test_profile_update_apply() {
        let mut profile = Profile {
            full_name: Some("Old".into()),
            location: Some("Berlin".into()),
            ..Default::default()
        };
        let update = ProfileUpdate {
            full_name: Some("Alice Smith".into()),
            ..Default::default()
        };
        update.apply_to(&mut profile);
        assert_eq!(profile.full_name.as_deref(), Some("Alice Smith"));
        assert_eq!(profile.location.as_deref(), Some("Berlin"));
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({ "full_name": "Alice Smith" })
        );
    }

    #[test]
    fn test_signup_validation() {
        assert!(Signup::new("alice", "alice@x.com", "correct-horse").validate().is_ok());

        let errors = Signup::new("al", "nope", "short").validate().unwrap_err();
        let errors: sh_core::ValidationErrors = errors.into();
        assert!(errors.has_error("username"));
        assert!(errors.has_error("email"));
        assert!(errors.has_error("password"));
        assert_eq!(errors.get("email").unwrap()[0], "Invalid email format");
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let update = CredentialsUpdate {
            username: Some(" Alice ".into()),
            current_password: "hunter22".into(),
            new_password: Some("hunter2222".into()),
        };
        let debug = format!("{:?}", update);
        assert!(!debug.contains("hunter"));
        assert_eq!(update.normalized_username().as_deref(), Some("alice"));
        assert!(update.changes_anything());
    }
}
