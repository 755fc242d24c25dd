//! Persisted isolation configuration and the ephemeral role snapshot.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::ids::{ChannelId, PrincipalId, RoleId, UserId, parse_snowflake};

/// Process-wide isolation configuration.
///
/// Every collection is a `BTreeSet`, so the in-memory value is always
/// deduplicated and sorted ascending and serializes in normalized form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IsolationConfig {
    /// Users or roles allowed to isolate and restore members.
    #[serde(rename = "allowed_ids")]
    pub allowed: BTreeSet<PrincipalId>,
    /// Candidate isolation roles; the first one that still exists is canonical.
    #[serde(rename = "roles")]
    pub roles: BTreeSet<RoleId>,
    /// Channels isolated members keep access to.
    #[serde(rename = "channels")]
    pub channels: BTreeSet<ChannelId>,
    /// Members currently confined.
    #[serde(rename = "isolated_users")]
    pub isolated: BTreeSet<UserId>,
}

/// Shape of a persisted record, reported so the loader can log migrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredLayout {
    Current,
    /// A bare array of allowed IDs written by early releases.
    LegacyAllowList,
    Unrecognized,
}

impl IsolationConfig {
    /// Interpret a decoded JSON record.
    ///
    /// Entries that are not non-negative integers (or all-digit strings) are
    /// dropped. A top-level value that is neither an object nor an array
    /// yields an empty configuration.
    #[must_use]
    pub fn from_value(value: &Value) -> (Self, StoredLayout) {
        match value {
            Value::Array(items) => (
                Self {
                    allowed: collect_ids(items, PrincipalId::new),
                    ..Self::default()
                },
                StoredLayout::LegacyAllowList,
            ),
            Value::Object(map) => (
                Self {
                    allowed: collect_ids(array_field(map, "allowed_ids"), PrincipalId::new),
                    roles: collect_ids(array_field(map, "roles"), RoleId::new),
                    channels: collect_ids(array_field(map, "channels"), ChannelId::new),
                    isolated: collect_ids(array_field(map, "isolated_users"), UserId::new),
                },
                StoredLayout::Current,
            ),
            _ => (Self::default(), StoredLayout::Unrecognized),
        }
    }

    #[must_use]
    pub fn is_isolated(&self, user: UserId) -> bool {
        self.isolated.contains(&user)
    }
}

fn array_field<'a>(map: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    map.get(key)
        .and_then(Value::as_array)
        .map_or(&[][..], Vec::as_slice)
}

fn collect_ids<T: Ord>(items: &[Value], make: impl Fn(u64) -> T) -> BTreeSet<T> {
    items.iter().filter_map(id_from_value).map(make).collect()
}

fn id_from_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => parse_snowflake(s).ok(),
        _ => None,
    }
}

/// Roles a member held immediately before isolation, default role excluded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoleSnapshot {
    roles: Vec<RoleId>,
}

impl RoleSnapshot {
    #[must_use]
    pub fn new(roles: Vec<RoleId>) -> Self {
        Self { roles }
    }

    #[must_use]
    pub fn roles(&self) -> &[RoleId] {
        &self.roles
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    #[must_use]
    pub fn into_roles(self) -> Vec<RoleId> {
        self.roles
    }
}
