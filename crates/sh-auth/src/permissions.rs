//! Membership permission policy for organizations and productions
//!
//! The engine enforces these rules inside each mutating transaction. The same
//! table drives the role lists embedded in those statements and the local
//! pre-flight checks, so both sides always agree on thresholds and messages.
//!
//! Check order for every membership mutation:
//! existence -> permission -> role-escalation rule -> self-action rule.
//! Existence is the caller's job (it needs the membership record).

use sh_core::{ShError, ShResult};
use sh_models::MemberRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupAction {
    Update,
    Delete,
    AddMember,
    ChangeMemberRole,
    RemoveMember,
    /// Promote someone to owner
    AssignOwner,
    /// Change the role of an existing owner
    DemoteOwner,
    RemoveOwner,
    /// Remove a member holding the admin role
    RemoveAdmin,
}

impl GroupAction {
    pub fn minimum_role(self) -> MemberRole {
        match self {
            GroupAction::Update
            | GroupAction::AddMember
            | GroupAction::ChangeMemberRole
            | GroupAction::RemoveMember => MemberRole::Admin,
            GroupAction::Delete
            | GroupAction::AssignOwner
            | GroupAction::DemoteOwner
            | GroupAction::RemoveOwner
            | GroupAction::RemoveAdmin => MemberRole::Owner,
        }
    }

    /// Roles allowed to perform the action, highest first
    pub fn permitted_roles(self) -> Vec<MemberRole> {
        let mut roles: Vec<_> = self.minimum_role().and_above().collect();
        roles.reverse();
        roles
    }

    /// The permitted roles as a query-language array literal, e.g. `["owner", "admin"]`
    pub fn role_list(self) -> String {
        let quoted: Vec<String> = self
            .permitted_roles()
            .iter()
            .map(|r| format!("\"{}\"", r.as_str()))
            .collect();
        format!("[{}]", quoted.join(", "))
    }

    pub fn allows(self, role: MemberRole) -> bool {
        role >= self.minimum_role()
    }

    /// Message raised when the action is refused, for a group called `noun`
    pub fn denial_message(self, noun: &str) -> String {
        match self {
            GroupAction::Update => format!("You must be an owner or admin to update this {}", noun),
            GroupAction::Delete => format!("Only {} owners can delete {}s", noun, noun),
            GroupAction::AddMember => "You must be an owner or admin to add members".to_string(),
            GroupAction::ChangeMemberRole => {
                "You must be an owner or admin to change member roles".to_string()
            }
            GroupAction::RemoveMember => "You must be an owner or admin to remove members".to_string(),
            GroupAction::AssignOwner => format!("Only {} owners can assign owner role", noun),
            GroupAction::DemoteOwner => format!("Only {} owners can change an owner's role", noun),
            GroupAction::RemoveOwner => format!("Only {} owners can remove other owners", noun),
            GroupAction::RemoveAdmin => format!("Only {} owners can remove other admins", noun),
        }
    }
}

/// Message raised when a member tries to remove their own membership
pub fn self_removal_message(a_noun: &str) -> String {
    format!("You cannot remove yourself from {}", a_noun)
}

fn forbidden(action: GroupAction, noun: &str) -> ShError {
    ShError::Forbidden {
        message: action.denial_message(noun),
    }
}

/// Permission check for `actor` (None when not a member)
pub fn authorize(action: GroupAction, actor: Option<MemberRole>, noun: &str) -> ShResult<()> {
    match actor {
        Some(role) if action.allows(role) => Ok(()),
        _ => Err(forbidden(action, noun)),
    }
}

/// Permission, then the owner escalation rule in both directions
pub fn authorize_role_change(
    actor: Option<MemberRole>,
    current: MemberRole,
    new_role: MemberRole,
    noun: &str,
) -> ShResult<()> {
    authorize(GroupAction::ChangeMemberRole, actor, noun)?;
    if new_role == MemberRole::Owner {
        authorize(GroupAction::AssignOwner, actor, noun)?;
    }
    if current == MemberRole::Owner {
        authorize(GroupAction::DemoteOwner, actor, noun)?;
    }
    Ok(())
}

/// Permission, then escalation (no removing equal or higher roles unless owner), then self
pub fn authorize_removal(
    actor: Option<MemberRole>,
    target: MemberRole,
    is_self: bool,
    noun: &str,
    a_noun: &str,
) -> ShResult<()> {
    authorize(GroupAction::RemoveMember, actor, noun)?;
    match target {
        MemberRole::Owner => authorize(GroupAction::RemoveOwner, actor, noun)?,
        MemberRole::Admin => authorize(GroupAction::RemoveAdmin, actor, noun)?,
        _ => {}
    }
    if is_self {
        return Err(ShError::Forbidden {
            message: self_removal_message(a_noun),
        });
    }
    Ok(())
}
