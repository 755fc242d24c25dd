//! Confinement of a member.
//!
//! Order of effects: snapshot roles, try the role swap, clear the target's
//! overwrites in isolation channels, fall back to per-channel deny-all when
//! the swap did not happen, persist the isolated mark, then notify. Remote
//! failures after the preconditions never abort; a partially applied
//! isolation is safe to re-run.

use warden_types::{
    ISOLATION_DENY, Member, Notice, NoticeColor, OverwriteTarget, PermissionOverwrite,
    RoleSnapshot, UserId,
};

use crate::authority::{Gate, is_server_owner};
use crate::errors::Rejection;
use crate::notify::{Delivery, SkipReason};
use crate::platform::PlatformError;
use crate::{CommandContext, Warden, canonical_isolation_role};

pub(crate) const ISOLATE_USAGE: &str = ".isolate <@user|user_id>";
const TARGET_DM: &str =
    "You have been isolated in the server. If you leave and rejoin, you will be automatically banned.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolationNotices {
    pub target_dm: Delivery,
    pub owner_dm: Delivery,
    pub staff_log: Delivery,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolateOutcome {
    pub target: UserId,
    /// Number of roles captured in the snapshot.
    pub snapshot_len: usize,
    /// Whether the role set was replaced by the isolation role alone.
    pub roles_swapped: bool,
    /// Why the swap failed, when it was attempted and refused.
    pub swap_error: Option<PlatformError>,
    /// Channels that received the member deny-all overwrite.
    pub channels_updated: usize,
    /// Isolation channels where a member overwrite was cleared.
    pub isolation_channels_cleared: usize,
    /// False when the member was already marked isolated.
    pub newly_isolated: bool,
    pub notices: IsolationNotices,
}

impl Warden {
    pub async fn isolate(
        &self,
        ctx: &CommandContext,
        target: Option<&Member>,
    ) -> Result<IsolateOutcome, Rejection> {
        let guild = &ctx.guild;
        let author = &ctx.caller;

        self.authorize(Gate::Moderator, ctx, &self.store.snapshot().await)?;
        let target = target.ok_or(Rejection::MissingTarget {
            usage: ISOLATE_USAGE,
        })?;
        if target.user == author.user {
            return Err(Rejection::SelfTarget);
        }
        if guild.top_role(author) <= guild.top_role(target) && !is_server_owner(author.user, guild)
        {
            return Err(Rejection::Hierarchy);
        }

        let _guard = self.locks.lock(guild.id, target.user).await;

        // Roles may have changed while another operation held the lock.
        let refreshed = self.refresh_member(guild.id, target, ISOLATE_USAGE).await?;
        let target = &refreshed;
        if guild.top_role(author) <= guild.top_role(target) && !is_server_owner(author.user, guild)
        {
            return Err(Rejection::Hierarchy);
        }

        let bot = match self.platform.current_member(guild.id).await {
            Ok(bot) => bot,
            Err(e) => {
                tracing::warn!(guild = %guild.id, "Could not resolve bot member: {e}");
                return Err(Rejection::BotContextMissing);
            }
        };
        let can_manage_roles =
            bot.manage_roles && guild.top_role(&bot.member) > guild.top_role(target);

        let config = self.store.snapshot().await;
        let isolation_role =
            canonical_isolation_role(&config, guild).ok_or(Rejection::IsolationRoleMissing)?;

        let default_role = guild.id.default_role();
        let snapshot = RoleSnapshot::new(
            target
                .roles
                .iter()
                .copied()
                .filter(|role| *role != default_role)
                .collect(),
        );
        let snapshot_len = snapshot.len();
        self.cache.insert(guild.id, target.user, snapshot).await;

        let reason = format!("Isolated by {}", author.tag());
        let mut swap_error = None;
        let roles_swapped = if can_manage_roles {
            match self
                .platform
                .set_member_roles(guild.id, target.user, vec![isolation_role.id], reason)
                .await
            {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(
                        guild = %guild.id,
                        user = %target.user,
                        "Role swap failed, falling back to channel overwrites: {e}"
                    );
                    swap_error = Some(e);
                    false
                }
            }
        } else {
            tracing::info!(
                guild = %guild.id,
                user = %target.user,
                "Cannot manage target roles, using channel overwrites"
            );
            false
        };

        let member_target = OverwriteTarget::Member(target.user);
        let mut isolation_channels_cleared = 0;
        for channel in config.channels.iter().filter(|id| guild.channel(**id).is_some()) {
            match self
                .platform
                .set_channel_overwrite(
                    guild.id,
                    *channel,
                    member_target,
                    None,
                    "Ensure isolated member can access isolation channels".to_string(),
                )
                .await
            {
                Ok(()) => isolation_channels_cleared += 1,
                Err(e) => tracing::debug!(%channel, "Could not clear member overwrite: {e}"),
            }
        }

        let mut channels_updated = 0;
        if !roles_swapped {
            let deny = PermissionOverwrite::denying(ISOLATION_DENY);
            for channel in guild
                .channels
                .iter()
                .filter(|c| !config.channels.contains(&c.id))
            {
                match self
                    .platform
                    .set_channel_overwrite(
                        guild.id,
                        channel.id,
                        member_target,
                        Some(deny),
                        "Isolation member deny-all (unmanageable roles)".to_string(),
                    )
                    .await
                {
                    Ok(()) => channels_updated += 1,
                    Err(e) => {
                        tracing::debug!(channel = %channel.id, "Could not apply deny-all: {e}");
                    }
                }
            }
        }

        let newly_isolated = self
            .store
            .mutate(|cfg| Ok::<_, Rejection>(cfg.isolated.insert(target.user)))
            .await?;

        tracing::info!(
            guild = %guild.id,
            moderator = %author.user,
            user = %target.user,
            roles_swapped,
            channels_updated,
            "Member isolated"
        );

        let notices = self.notify_isolation(ctx, target, channels_updated).await;

        Ok(IsolateOutcome {
            target: target.user,
            snapshot_len,
            roles_swapped,
            swap_error,
            channels_updated,
            isolation_channels_cleared,
            newly_isolated,
            notices,
        })
    }

    async fn notify_isolation(
        &self,
        ctx: &CommandContext,
        target: &Member,
        channels_updated: usize,
    ) -> IsolationNotices {
        let guild = &ctx.guild;
        let author = &ctx.caller;

        let target_dm = self
            .send_dm("target DM", target.user, TARGET_DM.to_string())
            .await;

        let owner_dm = match self.platform.member(guild.id, guild.owner_id).await {
            Ok(Some(owner)) => {
                self.send_dm(
                    "owner DM",
                    owner.user,
                    format!(
                        "Isolation: {} isolated {} in {}.",
                        author.name, target.name, guild.name
                    ),
                )
                .await
            }
            Ok(None) => Delivery::Skipped(SkipReason::NoRecipient),
            Err(e) => Delivery::Failed(e),
        };

        let notice = Notice::new("User Isolated", NoticeColor::Orange)
            .field("Moderator", author.tag())
            .field("Target", target.tag())
            .field("Channels updated", channels_updated.to_string());
        let staff_log = self.post_staff_notice(guild.id, notice).await;

        IsolationNotices {
            target_dm,
            owner_dm,
            staff_log,
        }
    }
}
