//! Capability interface to the chat platform.
//!
//! Every remote call may fail with [`PlatformError`]. Callers in this crate
//! treat those failures as soft: they pick a fallback path or record the
//! failure in the operation summary instead of aborting.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use warden_types::{
    BotMember, Channel, ChannelId, GuildId, Member, Outgoing, Overwrite, OverwriteTarget,
    PermissionOverwrite, Role, RoleId, UserId,
};

/// Remote call future type alias.
pub type PlatformFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, PlatformError>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// The acting agent lacks the capability for this call.
    #[error("missing permissions for {action}")]
    Forbidden { action: String },
    /// Rate limit, invalid state or any other refusal by the platform.
    #[error("{action} rejected: {message}")]
    Rejected { action: String, message: String },
}

impl PlatformError {
    pub fn forbidden(action: impl Into<String>) -> Self {
        Self::Forbidden {
            action: action.into(),
        }
    }

    pub fn rejected(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            action: action.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden { .. })
    }
}

/// Anything a message can be posted to: a text channel, a thread, a DM.
pub trait PostTarget: Send + Sync {
    /// Whether this target accepts messages at all (voice channels and
    /// categories do not).
    fn can_post(&self) -> bool;

    fn post(&self, message: Outgoing) -> PlatformFut<'_, ()>;
}

pub trait Platform: Send + Sync {
    fn member(&self, guild: GuildId, user: UserId) -> PlatformFut<'_, Option<Member>>;

    /// The acting agent's own membership and guild-wide role capability.
    fn current_member(&self, guild: GuildId) -> PlatformFut<'_, BotMember>;

    /// Replace the member's role set with exactly `roles`.
    fn set_member_roles(
        &self,
        guild: GuildId,
        user: UserId,
        roles: Vec<RoleId>,
        reason: String,
    ) -> PlatformFut<'_, ()>;

    /// Set (or with `None`, delete) one overwrite on a channel.
    fn set_channel_overwrite(
        &self,
        guild: GuildId,
        channel: ChannelId,
        target: OverwriteTarget,
        overwrite: Option<PermissionOverwrite>,
        reason: String,
    ) -> PlatformFut<'_, ()>;

    /// Replace all overwrites on a channel.
    fn replace_channel_overwrites(
        &self,
        guild: GuildId,
        channel: ChannelId,
        overwrites: Vec<Overwrite>,
        reason: String,
    ) -> PlatformFut<'_, ()>;

    fn create_role(&self, guild: GuildId, name: String, reason: String) -> PlatformFut<'_, Role>;

    fn create_text_channel(
        &self,
        guild: GuildId,
        name: String,
        overwrites: Vec<Overwrite>,
        reason: String,
    ) -> PlatformFut<'_, Channel>;

    fn ban(&self, guild: GuildId, user: UserId, reason: String) -> PlatformFut<'_, ()>;

    fn banned_users(&self, guild: GuildId) -> PlatformFut<'_, Vec<UserId>>;

    fn send_direct(&self, user: UserId, message: Outgoing) -> PlatformFut<'_, ()>;

    /// Local lookup of a channel-like entity messages can be posted to.
    fn post_target(&self, guild: GuildId, channel: ChannelId) -> Option<Arc<dyn PostTarget>>;
}
