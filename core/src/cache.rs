//! In-memory role snapshots taken at isolation time.
//!
//! Nothing here is persisted: a restart empties the cache and restoration
//! falls back to removing the isolation role.

use std::collections::HashMap;

use tokio::sync::Mutex;

use warden_types::{GuildId, RoleSnapshot, UserId};

#[derive(Debug, Default)]
pub struct RoleCache {
    inner: Mutex<HashMap<GuildId, HashMap<UserId, RoleSnapshot>>>,
}

impl RoleCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a snapshot, replacing any previous one for the same member.
    pub async fn insert(&self, guild: GuildId, user: UserId, snapshot: RoleSnapshot) {
        tracing::info!(%guild, %user, roles = ?snapshot.roles(), "Cached roles");
        self.inner
            .lock()
            .await
            .entry(guild)
            .or_default()
            .insert(user, snapshot);
    }

    /// Remove and return the member's snapshot.
    pub async fn pop(&self, guild: GuildId, user: UserId) -> Option<RoleSnapshot> {
        let mut inner = self.inner.lock().await;
        let Some(members) = inner.get_mut(&guild) else {
            tracing::warn!(%guild, "No role cache for guild");
            return None;
        };
        let snapshot = members.remove(&user);
        if members.is_empty() {
            inner.remove(&guild);
        }
        match &snapshot {
            Some(s) => tracing::info!(%guild, %user, roles = ?s.roles(), "Retrieved cached roles"),
            None => tracing::warn!(%guild, %user, "No cached roles"),
        }
        snapshot
    }

    pub async fn get(&self, guild: GuildId, user: UserId) -> Option<RoleSnapshot> {
        self.inner
            .lock()
            .await
            .get(&guild)
            .and_then(|members| members.get(&user))
            .cloned()
    }

    /// Drop every snapshot for one guild. Returns how many were dropped.
    pub async fn clear_guild(&self, guild: GuildId) -> usize {
        self.inner
            .lock()
            .await
            .remove(&guild)
            .map_or(0, |members| members.len())
    }

    /// Drop everything. Returns how many snapshots were dropped.
    pub async fn clear(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let dropped = inner.values().map(HashMap::len).sum();
        inner.clear();
        dropped
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.values().map(HashMap::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
