//! Channel permission bits and per-channel overwrites.
//!
//! Bit positions follow the platform's wire values so overwrites can be
//! forwarded without translation.

use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

use serde::{Deserialize, Serialize};

use crate::ids::{RoleId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(u64);

impl Permissions {
    pub const NONE: Self = Self(0);
    pub const ADD_REACTIONS: Self = Self(1 << 6);
    pub const STREAM: Self = Self(1 << 9);
    pub const VIEW_CHANNEL: Self = Self(1 << 10);
    pub const SEND_MESSAGES: Self = Self(1 << 11);
    pub const SEND_TTS_MESSAGES: Self = Self(1 << 12);
    pub const READ_MESSAGE_HISTORY: Self = Self(1 << 16);
    pub const CONNECT: Self = Self(1 << 20);
    pub const SPEAK: Self = Self(1 << 21);
    pub const USE_VOICE_ACTIVATION: Self = Self(1 << 25);
    pub const MANAGE_ROLES: Self = Self(1 << 28);
    pub const CREATE_PUBLIC_THREADS: Self = Self(1 << 35);
    pub const CREATE_PRIVATE_THREADS: Self = Self(1 << 36);
    pub const SEND_MESSAGES_IN_THREADS: Self = Self(1 << 38);

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl BitOr for Permissions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for Permissions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Permissions {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for Permissions {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

/// Everything an isolated member must not do outside the isolation channels.
pub const ISOLATION_DENY: Permissions = Permissions::VIEW_CHANNEL
    .union(Permissions::SEND_MESSAGES)
    .union(Permissions::SEND_MESSAGES_IN_THREADS)
    .union(Permissions::CREATE_PUBLIC_THREADS)
    .union(Permissions::CREATE_PRIVATE_THREADS)
    .union(Permissions::ADD_REACTIONS)
    .union(Permissions::CONNECT)
    .union(Permissions::SPEAK)
    .union(Permissions::STREAM)
    .union(Permissions::USE_VOICE_ACTIVATION)
    .union(Permissions::SEND_TTS_MESSAGES);

/// What the isolation role may do inside the private isolation channel.
pub const ISOLATION_CHANNEL_ALLOW: Permissions = Permissions::VIEW_CHANNEL
    .union(Permissions::SEND_MESSAGES)
    .union(Permissions::ADD_REACTIONS)
    .union(Permissions::READ_MESSAGE_HISTORY);

/// A tri-state permission exception: bits in `allow` are granted, bits in
/// `deny` are revoked, everything else inherits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PermissionOverwrite {
    pub allow: Permissions,
    pub deny: Permissions,
}

impl PermissionOverwrite {
    #[must_use]
    pub const fn allowing(allow: Permissions) -> Self {
        Self {
            allow,
            deny: Permissions::NONE,
        }
    }

    #[must_use]
    pub const fn denying(deny: Permissions) -> Self {
        Self {
            allow: Permissions::NONE,
            deny,
        }
    }

    /// Force every bit of `deny` to the denied state, leaving all other
    /// bits exactly as they were.
    #[must_use]
    pub fn merge_deny(self, deny: Permissions) -> Self {
        Self {
            allow: self.allow & !deny,
            deny: self.deny | deny,
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }
}

/// Who an overwrite applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverwriteTarget {
    Role(RoleId),
    Member(UserId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overwrite {
    pub target: OverwriteTarget,
    pub permissions: PermissionOverwrite,
}
