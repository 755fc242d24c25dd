//! Core domain types for Warden.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

mod guild;
mod ids;
mod isolation;
mod notice;
mod permissions;

pub use guild::{BotMember, Channel, ChannelKind, GuildSnapshot, Member, Role, RoleRank};
pub use ids::{
    ChannelId, GuildId, InvalidId, PrincipalId, RoleId, UserId, parse_channel_ref, parse_role_ref,
    parse_snowflake, parse_user_ref,
};
pub use isolation::{IsolationConfig, RoleSnapshot, StoredLayout};
pub use notice::{Notice, NoticeColor, NoticeField, Outgoing};
pub use permissions::{
    ISOLATION_CHANNEL_ALLOW, ISOLATION_DENY, Overwrite, OverwriteTarget, PermissionOverwrite,
    Permissions,
};
