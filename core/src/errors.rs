//! Rejections returned to the caller before any mutation happens.
//!
//! The `Display` text of each variant is the reply shown to the caller.

use thiserror::Error;

use crate::platform::PlatformError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    Authorization,
    Precondition,
    /// The platform refused a call the operation cannot proceed without.
    Capability,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Only the configured owner can use this command.")]
    NotOperator,
    #[error("Only the server owner can use this command.")]
    NotServerOwner,
    #[error("You do not have isolation permissions.")]
    NotModerator,

    #[error("{0}")]
    Usage(&'static str),
    #[error("Please mention a user or provide their ID. Usage: {usage}")]
    MissingTarget { usage: &'static str },
    #[error("You cannot isolate yourself.")]
    SelfTarget,
    #[error("You cannot isolate a member with an equal or higher top role.")]
    Hierarchy,
    #[error("Bot context missing.")]
    BotContextMissing,
    #[error("Isolation role not set. Run .isolation setup first.")]
    IsolationRoleMissing,
    #[error(
        "I cannot manage that member. Ensure my role is above the target's roles and I have Manage Roles."
    )]
    CannotManageTarget,
    #[error("This user is not currently isolated.")]
    NotIsolated,

    #[error("ID must be a numeric ID.")]
    InvalidId,
    #[error("That ID is already allowed.")]
    PrincipalAlreadyAllowed,
    #[error("That ID is not in the isolation permissions list.")]
    PrincipalNotAllowed,
    #[error("Please mention a role or provide its ID.")]
    MissingRole,
    #[error("That role is already configured for isolation.")]
    RoleAlreadyConfigured,
    #[error("That role is not configured for isolation.")]
    RoleNotConfigured,
    #[error("Please mention a channel or provide its ID.")]
    MissingChannel,
    #[error("That channel is already configured for isolation.")]
    ChannelAlreadyConfigured,
    #[error("That channel is not configured for isolation.")]
    ChannelNotConfigured,

    #[error("I lack permissions to create roles.")]
    RoleCreateForbidden,
    #[error("Failed to create role: {0}")]
    RoleCreateFailed(PlatformError),
}

impl Rejection {
    #[must_use]
    pub fn kind(&self) -> RejectionKind {
        match self {
            Self::NotOperator | Self::NotServerOwner | Self::NotModerator => {
                RejectionKind::Authorization
            }
            Self::RoleCreateForbidden | Self::RoleCreateFailed(_) => RejectionKind::Capability,
            _ => RejectionKind::Precondition,
        }
    }
}
