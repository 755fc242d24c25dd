//! Per-member serialization of isolate, restore and the rejoin guard.
//!
//! A snapshot-then-swap in isolation must not interleave with a
//! pop-then-restore for the same member.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use warden_types::{GuildId, UserId};

type Key = (GuildId, UserId);

#[derive(Debug, Default)]
pub struct MemberLocks {
    slots: Mutex<HashMap<Key, Arc<Mutex<()>>>>,
}

/// Held for the duration of one member's critical section.
#[derive(Debug)]
pub struct MemberGuard {
    _guard: OwnedMutexGuard<()>,
}

impl MemberLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, guild: GuildId, user: UserId) -> MemberGuard {
        let slot = {
            let mut slots = self.slots.lock().await;
            // Slots only referenced by the map are idle.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            Arc::clone(slots.entry((guild, user)).or_default())
        };
        MemberGuard {
            _guard: slot.lock_owned().await,
        }
    }

    pub async fn active(&self) -> usize {
        self.slots
            .lock()
            .await
            .values()
            .filter(|slot| Arc::strong_count(slot) > 1)
            .count()
    }
}
