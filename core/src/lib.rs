//! Isolation core for Warden.
//!
//! A [`Warden`] owns the persisted isolation configuration, the in-memory
//! role cache and the per-member locks, and talks to the chat platform only
//! through the [`Platform`] capability trait. Gateway plumbing and command
//! text dispatch live outside this crate; they hand in a [`CommandContext`]
//! (or a rejoin event) and get plain replies back.
//!
//! ```text
//! dispatcher ── Command::parse ──> Warden::handle ──> isolate / unisolate / manage
//!                                        │                     │
//!                                        v                     v
//!                                  Reply -> PostTarget   IsolationStore (json)
//! gateway ── member join ──> Warden::on_member_join ──> ban + staff notice
//! ```

pub mod authority;
pub mod cache;
pub mod commands;
pub mod errors;
mod guard;
mod isolate;
pub mod locks;
mod manage;
pub mod notify;
pub mod platform;
mod restore;
pub mod store;

use std::sync::Arc;

use warden_config::Settings;
use warden_types::{GuildId, GuildSnapshot, IsolationConfig, Member, Role};

pub use authority::Gate;
pub use cache::RoleCache;
pub use commands::{Command, Reply};
pub use errors::{Rejection, RejectionKind};
pub use guard::{EVASION_BAN_REASON, JoinOutcome};
pub use isolate::{IsolateOutcome, IsolationNotices};
pub use locks::MemberLocks;
pub use manage::{
    CleanupOutcome, ConfigView, PrivateChannelAction, PrivateChannelOutcome, SetupOutcome,
    ViewEntry,
};
pub use notify::{Delivery, SkipReason};
pub use platform::{Platform, PlatformError, PlatformFut, PostTarget};
pub use restore::{FallbackReason, RestoreOutcome, RestorePath};
pub use store::{IsolationStore, StoreError};

/// Everything a command handler knows about its invocation.
#[derive(Clone)]
pub struct CommandContext {
    pub guild: GuildSnapshot,
    pub caller: Member,
    /// Where replies go: the channel or thread the command came from.
    pub reply: Arc<dyn PostTarget>,
}

pub struct Warden {
    settings: Settings,
    platform: Arc<dyn Platform>,
    store: IsolationStore,
    cache: RoleCache,
    locks: MemberLocks,
}

impl Warden {
    /// Build a warden, loading the isolation store from `settings.store_path`.
    #[must_use]
    pub fn new(settings: Settings, platform: Arc<dyn Platform>) -> Self {
        let store = IsolationStore::open(settings.store_path.clone());
        Self::with_store(settings, platform, store)
    }

    #[must_use]
    pub fn with_store(
        settings: Settings,
        platform: Arc<dyn Platform>,
        store: IsolationStore,
    ) -> Self {
        tracing::info!(path = %store.path().display(), "Isolation store opened");
        Self {
            settings,
            platform,
            store,
            cache: RoleCache::new(),
            locks: MemberLocks::new(),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn cache(&self) -> &RoleCache {
        &self.cache
    }

    pub async fn config(&self) -> IsolationConfig {
        self.store.snapshot().await
    }

    /// Re-read `target` from the platform. Called with the member lock held
    /// so role snapshots and fallbacks see the roles left by whoever held it
    /// before. A failed lookup keeps the caller's copy.
    async fn refresh_member(
        &self,
        guild: GuildId,
        target: &Member,
        usage: &'static str,
    ) -> Result<Member, Rejection> {
        match self.platform.member(guild, target.user).await {
            Ok(Some(member)) => Ok(member),
            Ok(None) => Err(Rejection::MissingTarget { usage }),
            Err(e) => {
                tracing::warn!(%guild, user = %target.user, "Could not refresh member: {e}");
                Ok(target.clone())
            }
        }
    }

    fn authorize(
        &self,
        gate: Gate,
        ctx: &CommandContext,
        config: &IsolationConfig,
    ) -> Result<(), Rejection> {
        let result = authority::authorize(
            gate,
            &ctx.caller,
            &ctx.guild,
            self.settings.operator,
            &config.allowed,
        );
        if let Err(e) = &result {
            tracing::debug!(caller = %ctx.caller.user, ?gate, "Rejected: {e}");
        }
        result
    }
}

/// The first configured isolation role that still exists in the guild.
#[must_use]
pub fn canonical_isolation_role<'a>(
    config: &IsolationConfig,
    guild: &'a GuildSnapshot,
) -> Option<&'a Role> {
    config.roles.iter().find_map(|id| guild.role(*id))
}
