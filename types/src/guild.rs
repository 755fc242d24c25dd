//! Read-only views of platform state, resolved per operation.

use std::cmp::Ordering;

use crate::ids::{ChannelId, GuildId, RoleId, UserId};
use crate::permissions::{Overwrite, OverwriteTarget, PermissionOverwrite};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub position: u32,
}

impl Role {
    #[must_use]
    pub fn rank(&self) -> RoleRank {
        RoleRank {
            position: self.position,
            id: self.id,
        }
    }
}

/// Hierarchy position of a role.
///
/// Higher `position` outranks lower. On a tie the older role (smaller ID)
/// outranks the newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleRank {
    pub position: u32,
    pub id: RoleId,
}

impl Ord for RoleRank {
    fn cmp(&self, other: &Self) -> Ordering {
        self.position
            .cmp(&other.position)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for RoleRank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    Voice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub kind: ChannelKind,
    pub overwrites: Vec<Overwrite>,
}

impl Channel {
    /// The overwrite currently set for `target`, or an empty one.
    #[must_use]
    pub fn overwrite_for(&self, target: OverwriteTarget) -> PermissionOverwrite {
        self.overwrites
            .iter()
            .find(|o| o.target == target)
            .map(|o| o.permissions)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub user: UserId,
    pub name: String,
    /// Explicitly assigned roles in platform order. Never includes the
    /// guild's default role.
    pub roles: Vec<RoleId>,
}

impl Member {
    /// `name (id)`, as written into audit reasons and staff notices.
    #[must_use]
    pub fn tag(&self) -> String {
        format!("{} ({})", self.name, self.user)
    }
}

/// The acting agent's own membership plus its guild-wide capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotMember {
    pub member: Member,
    pub manage_roles: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildSnapshot {
    pub id: GuildId,
    pub name: String,
    pub owner_id: UserId,
    pub roles: Vec<Role>,
    pub channels: Vec<Channel>,
}

impl GuildSnapshot {
    #[must_use]
    pub fn role(&self, id: RoleId) -> Option<&Role> {
        self.roles.iter().find(|role| role.id == id)
    }

    #[must_use]
    pub fn role_named(&self, name: &str) -> Option<&Role> {
        self.roles.iter().find(|role| role.name == name)
    }

    #[must_use]
    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.iter().find(|channel| channel.id == id)
    }

    #[must_use]
    pub fn text_channel_named(&self, name: &str) -> Option<&Channel> {
        self.channels
            .iter()
            .find(|channel| channel.kind == ChannelKind::Text && channel.name == name)
    }

    #[must_use]
    pub fn default_role_rank(&self) -> RoleRank {
        RoleRank {
            position: 0,
            id: self.id.default_role(),
        }
    }

    /// Highest-ranked role the member holds; the default role when they
    /// hold nothing else. Roles unknown to this snapshot are ignored.
    #[must_use]
    pub fn top_role(&self, member: &Member) -> RoleRank {
        member
            .roles
            .iter()
            .filter_map(|id| self.role(*id))
            .map(Role::rank)
            .max()
            .unwrap_or_else(|| self.default_role_rank())
    }
}
