use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{raw}' is not a numeric ID")]
pub struct InvalidId {
    pub raw: String,
}

/// Parse an all-digit string into a snowflake value.
///
/// Signs, whitespace and decimal points are rejected so that only values the
/// platform could have issued are accepted.
pub fn parse_snowflake(raw: &str) -> Result<u64, InvalidId> {
    let invalid = || InvalidId {
        raw: raw.to_string(),
    };
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    raw.parse().map_err(|_| invalid())
}

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            #[must_use]
            pub const fn value(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = InvalidId;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_snowflake(s).map(Self)
            }
        }
    };
}

snowflake_id!(
    /// A server (community).
    GuildId
);
snowflake_id!(UserId);
snowflake_id!(RoleId);
snowflake_id!(ChannelId);
snowflake_id!(
    /// An allow-list entry. May name either a user or a role; the platform
    /// never issues the same snowflake to both.
    PrincipalId
);

impl From<UserId> for PrincipalId {
    fn from(value: UserId) -> Self {
        Self(value.0)
    }
}

impl From<RoleId> for PrincipalId {
    fn from(value: RoleId) -> Self {
        Self(value.0)
    }
}

impl GuildId {
    /// The implicit default role every member holds shares the guild's ID.
    #[must_use]
    pub const fn default_role(self) -> RoleId {
        RoleId(self.0)
    }
}

/// Accept `<@123>` / `<@!123>` or a bare ID.
pub fn parse_user_ref(raw: &str) -> Result<UserId, InvalidId> {
    let raw = raw.trim();
    let inner = raw
        .strip_prefix("<@")
        .and_then(|rest| rest.strip_suffix('>'))
        .map(|rest| rest.strip_prefix('!').unwrap_or(rest));
    match inner {
        Some(inner) if !inner.starts_with('&') => parse_snowflake(inner).map(UserId),
        Some(_) => Err(InvalidId {
            raw: raw.to_string(),
        }),
        None => raw.parse(),
    }
}

/// Accept `<@&123>` or a bare ID.
pub fn parse_role_ref(raw: &str) -> Result<RoleId, InvalidId> {
    let raw = raw.trim();
    match raw.strip_prefix("<@&").and_then(|r| r.strip_suffix('>')) {
        Some(inner) => parse_snowflake(inner).map(RoleId),
        None => raw.parse(),
    }
}

/// Accept `<#123>` or a bare ID.
pub fn parse_channel_ref(raw: &str) -> Result<ChannelId, InvalidId> {
    let raw = raw.trim();
    match raw.strip_prefix("<#").and_then(|r| r.strip_suffix('>')) {
        Some(inner) => parse_snowflake(inner).map(ChannelId),
        None => raw.parse(),
    }
}
