//! Who may operate isolation.

use std::collections::BTreeSet;

use warden_types::{GuildSnapshot, Member, PrincipalId, UserId};

use crate::errors::Rejection;

/// Permission level an operation requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// The globally configured operator. Configuration changes.
    Operator,
    /// The owner of the server the command runs in.
    ServerOwner,
    /// Server owner or anyone on the allow-list. Isolate and restore.
    Moderator,
}

#[must_use]
pub fn is_server_owner(caller: UserId, guild: &GuildSnapshot) -> bool {
    caller == guild.owner_id
}

#[must_use]
pub fn is_app_owner(caller: UserId, operator: Option<UserId>) -> bool {
    operator == Some(caller)
}

/// True if the member, or any role they hold, is on the allow-list.
#[must_use]
pub fn has_isolation_permission(member: &Member, allowed: &BTreeSet<PrincipalId>) -> bool {
    allowed.contains(&PrincipalId::from(member.user))
        || member
            .roles
            .iter()
            .any(|role| allowed.contains(&PrincipalId::from(*role)))
}

pub fn authorize(
    gate: Gate,
    caller: &Member,
    guild: &GuildSnapshot,
    operator: Option<UserId>,
    allowed: &BTreeSet<PrincipalId>,
) -> Result<(), Rejection> {
    match gate {
        Gate::Operator if is_app_owner(caller.user, operator) => Ok(()),
        Gate::Operator => Err(Rejection::NotOperator),
        Gate::ServerOwner if is_server_owner(caller.user, guild) => Ok(()),
        Gate::ServerOwner => Err(Rejection::NotServerOwner),
        Gate::Moderator
            if is_server_owner(caller.user, guild) || has_isolation_permission(caller, allowed) =>
        {
            Ok(())
        }
        Gate::Moderator => Err(Rejection::NotModerator),
    }
}
