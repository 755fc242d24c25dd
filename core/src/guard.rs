//! Rejoin evasion guard and guild lifecycle hooks.

use warden_types::{GuildId, Member, Notice, NoticeColor};

use crate::Warden;
use crate::notify::Delivery;
use crate::platform::PlatformError;

pub const EVASION_BAN_REASON: &str = "Attempted to evade isolation by leaving and rejoining";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Not marked isolated; nothing was done.
    NotIsolated,
    Banned { staff_log: Delivery },
    BanFailed(PlatformError),
}

impl Warden {
    /// Handle a member (re)joining `guild`.
    ///
    /// Never fails: ban and notification errors are logged and reported in
    /// the outcome only.
    pub async fn on_member_join(&self, guild: GuildId, member: &Member) -> JoinOutcome {
        if !self.store.snapshot().await.is_isolated(member.user) {
            return JoinOutcome::NotIsolated;
        }

        let _guard = self.locks.lock(guild, member.user).await;
        // A restore that held the lock may have cleared the mark.
        if !self.store.snapshot().await.is_isolated(member.user) {
            tracing::debug!(%guild, user = %member.user, "Restored while waiting; not banning");
            return JoinOutcome::NotIsolated;
        }

        if let Err(e) = self
            .platform
            .ban(guild, member.user, EVASION_BAN_REASON.to_string())
            .await
        {
            tracing::error!(%guild, user = %member.user, "Failed to ban isolation evader: {e}");
            return JoinOutcome::BanFailed(e);
        }
        tracing::warn!(%guild, user = %member.user, "Banned member for evading isolation");

        let notice =
            Notice::new("Auto-ban: Isolation Evasion", NoticeColor::Red).field("User", member.tag());
        let staff_log = self.post_staff_notice(guild, notice).await;
        JoinOutcome::Banned { staff_log }
    }

    /// Forget cached role snapshots for a guild the bot left.
    pub async fn on_guild_remove(&self, guild: GuildId) -> usize {
        self.cache.clear_guild(guild).await
    }
}
