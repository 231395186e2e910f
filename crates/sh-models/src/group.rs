//! Organizations, productions and their memberships
//!
//! Tables: organization, production
//! Edges: member_of_org (person -> organization), membership (person -> production)
//!
//! Both group kinds behave the same way and differ only in table, edge and
//! label field names, captured by the `Group` trait.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sh_core::{Entity, Identifiable, RecordId, ShError, Timestamped};

use crate::person::Email;
use crate::shape::{null_as_default, one_or_first};

/// Membership role, ordered from least to most privileged
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Viewer,
    Editor,
    Admin,
    Owner,
}

impl MemberRole {
    pub const ALL: [MemberRole; 4] = [
        MemberRole::Viewer,
        MemberRole::Editor,
        MemberRole::Admin,
        MemberRole::Owner,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Viewer => "viewer",
            MemberRole::Editor => "editor",
            MemberRole::Admin => "admin",
            MemberRole::Owner => "owner",
        }
    }

    /// Every role at or above `self`
    pub fn and_above(self) -> impl Iterator<Item = MemberRole> {
        Self::ALL.into_iter().filter(move |r| *r >= self)
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberRole {
    type Err = ShError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "viewer" => Ok(MemberRole::Viewer),
            "editor" => Ok(MemberRole::Editor),
            "admin" => Ok(MemberRole::Admin),
            "owner" => Ok(MemberRole::Owner),
            other => Err(ShError::rejected(format!("Unknown member role: {}", other))),
        }
    }
}

/// A named group with members
pub trait Group: Entity + Timestamped + DeserializeOwned + Serialize + Clone + fmt::Debug {
    /// Membership edge table
    const EDGE: &'static str;
    /// Field holding the human label (`name` or `title`)
    const LABEL_FIELD: &'static str;
    /// Lowercase noun for messages
    const NOUN: &'static str;
    /// Noun with its indefinite article
    const A_NOUN: &'static str;

    fn label(&self) -> &str;
    fn slug(&self) -> &str;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub name: String,
    /// Generated by the engine from `name`
    #[serde(default, deserialize_with = "null_as_default")]
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Production {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub title: String,
    /// Generated by the engine from `title`
    #[serde(default, deserialize_with = "null_as_default")]
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

macro_rules! impl_group {
    ($ty:ty, $label:ident, table = $table:literal, type_name = $type_name:literal, edge = $edge:literal, noun = $noun:literal, a_noun = $a_noun:literal) => {
        impl Identifiable for $ty {
            fn id(&self) -> Option<&RecordId> {
                self.id.as_ref()
            }
        }

        impl Timestamped for $ty {
            fn created_at(&self) -> Option<DateTime<Utc>> {
                self.created_at
            }

            fn updated_at(&self) -> Option<DateTime<Utc>> {
                self.updated_at
            }
        }

        impl Entity for $ty {
            const TABLE_NAME: &'static str = $table;
            const TYPE_NAME: &'static str = $type_name;
        }

        impl Group for $ty {
            const EDGE: &'static str = $edge;
            const LABEL_FIELD: &'static str = stringify!($label);
            const NOUN: &'static str = $noun;
            const A_NOUN: &'static str = $a_noun;

            fn label(&self) -> &str {
                &self.$label
            }

            fn slug(&self) -> &str {
                &self.slug
            }
        }
    };
}

impl_group!(
    Organization,
    name,
    table = "organization",
    type_name = "Organization",
    edge = "member_of_org",
    noun = "organization",
    a_noun = "an organization"
);

impl_group!(
    Production,
    title,
    table = "production",
    type_name = "Production",
    edge = "membership",
    noun = "production",
    a_noun = "a production"
);

/// The person side of a membership, as embedded by member listings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemberPerson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub emails: Vec<Email>,
}

/// A membership edge between a person (`in`) and a group (`out`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub id: RecordId,
    #[serde(rename = "in")]
    pub member: RecordId,
    #[serde(rename = "out")]
    pub group: RecordId,
    pub role: MemberRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "one_or_first", skip_serializing_if = "Option::is_none")]
    pub person: Option<MemberPerson>,
}

impl Membership {
    pub fn is_owner(&self) -> bool {
        self.role == MemberRole::Owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_ordering() {
        assert!(MemberRole::Owner > MemberRole::Admin);
        assert!(MemberRole::Admin > MemberRole::Editor);
        assert!(MemberRole::Editor > MemberRole::Viewer);
        let above: Vec<_> = MemberRole::Admin.and_above().collect();
        assert_eq!(above, vec![MemberRole::Admin, MemberRole::Owner]);
    }

    #[test]
    fn test_role_parse_and_serde() {
        assert_eq!("Owner".parse::<MemberRole>().unwrap(), MemberRole::Owner);
        assert!("superuser".parse::<MemberRole>().is_err());
        assert_eq!(serde_json::to_value(MemberRole::Editor).unwrap(), json!("editor"));
    }

    #[test]
    fn test_group_constants() {
        assert_eq!(Organization::TABLE_NAME, "organization");
        assert_eq!(Organization::EDGE, "member_of_org");
        assert_eq!(Organization::LABEL_FIELD, "name");
        assert_eq!(Production::TABLE_NAME, "production");
        assert_eq!(Production::EDGE, "membership");
        assert_eq!(Production::LABEL_FIELD, "title");
    }

    #[test]
    fn test_membership_with_wrapped_person() {
        let membership: Membership = serde_json::from_value(json!({
            "id": "member_of_org:m1",
            "in": "person:alice",
            "out": "organization:acme",
            "role": "owner",
            "joined_at": "2024-05-01T12:00:00Z",
            "person": [{ "username": "alice", "email": "alice@x.com" }]
        }))
        .unwrap();

        assert!(membership.is_owner());
        assert_eq!(membership.member, RecordId::new("person", "alice"));
        assert_eq!(membership.group.table(), "organization");
        assert_eq!(membership.person.unwrap().username, "alice");
    }

    #[test]
    fn test_organization_label_and_slug() {
        let org: Organization = serde_json::from_value(json!({
            "id": "organization:acme",
            "name": "Acme",
            "slug": "acme"
        }))
        .unwrap();
        assert_eq!(org.label(), "Acme");
        assert_eq!(org.slug(), "acme");
        assert!(org.is_persisted());
    }
}
