//! Restoration of an isolated member.

use std::convert::Infallible;

use warden_types::{Member, Notice, NoticeColor, OverwriteTarget, RoleId, UserId};

use crate::authority::Gate;
use crate::errors::Rejection;
use crate::notify::Delivery;
use crate::platform::PlatformError;
use crate::{CommandContext, Warden, canonical_isolation_role};

pub(crate) const UNISOLATE_USAGE: &str = ".unisolate <@user|user_id>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// Nothing cached for this member, e.g. after a restart.
    NoSnapshot,
    /// Every cached role was deleted or now ranks above the bot.
    NoValidRoles,
    /// The platform refused the role replacement.
    ReplaceFailed(PlatformError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestorePath {
    /// The member's role set was replaced with the cached roles.
    Cached { roles: Vec<RoleId> },
    /// Only the isolation role was removed from the member's current roles.
    Fallback {
        reason: FallbackReason,
        removal_error: Option<PlatformError>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub target: UserId,
    pub path: RestorePath,
    pub overwrites_cleared: usize,
    pub staff_log: Delivery,
}

impl RestoreOutcome {
    #[must_use]
    pub fn roles_restored(&self) -> bool {
        matches!(self.path, RestorePath::Cached { .. })
    }
}

impl Warden {
    pub async fn unisolate(
        &self,
        ctx: &CommandContext,
        target: Option<&Member>,
    ) -> Result<RestoreOutcome, Rejection> {
        let guild = &ctx.guild;
        let author = &ctx.caller;

        self.authorize(Gate::Moderator, ctx, &self.store.snapshot().await)?;
        let target = target.ok_or(Rejection::MissingTarget {
            usage: UNISOLATE_USAGE,
        })?;

        let _guard = self.locks.lock(guild.id, target.user).await;
        let refreshed = self.refresh_member(guild.id, target, UNISOLATE_USAGE).await?;
        let target = &refreshed;

        let bot = self
            .platform
            .current_member(guild.id)
            .await
            .map_err(|e| {
                tracing::warn!(guild = %guild.id, "Could not resolve bot member: {e}");
                Rejection::CannotManageTarget
            })?;
        let bot_top = guild.top_role(&bot.member);
        if !bot.manage_roles || bot_top <= guild.top_role(target) {
            return Err(Rejection::CannotManageTarget);
        }

        let config = self.store.snapshot().await;
        let isolation_role =
            canonical_isolation_role(&config, guild).ok_or(Rejection::IsolationRoleMissing)?;
        if !config.is_isolated(target.user) {
            return Err(Rejection::NotIsolated);
        }

        let snapshot = self.cache.pop(guild.id, target.user).await;
        let reason = format!("Unisolated by {}", author.tag());

        let fallback_reason = match snapshot {
            None => FallbackReason::NoSnapshot,
            Some(snapshot) => {
                let roles: Vec<RoleId> = snapshot
                    .into_roles()
                    .into_iter()
                    .filter(|id| guild.role(*id).is_some_and(|role| role.rank() < bot_top))
                    .collect();
                if roles.is_empty() {
                    FallbackReason::NoValidRoles
                } else {
                    match self
                        .platform
                        .set_member_roles(guild.id, target.user, roles.clone(), reason.clone())
                        .await
                    {
                        Ok(()) => {
                            let path = RestorePath::Cached { roles };
                            return Ok(self.finish_restore(ctx, target, path).await);
                        }
                        Err(e) => {
                            tracing::warn!(
                                guild = %guild.id,
                                user = %target.user,
                                "Restoring cached roles failed: {e}"
                            );
                            FallbackReason::ReplaceFailed(e)
                        }
                    }
                }
            }
        };

        let mut removal_error = None;
        if target.roles.contains(&isolation_role.id) {
            let remaining: Vec<RoleId> = target
                .roles
                .iter()
                .copied()
                .filter(|id| *id != isolation_role.id)
                .collect();
            if let Err(e) = self
                .platform
                .set_member_roles(
                    guild.id,
                    target.user,
                    remaining,
                    format!("{reason} - fallback"),
                )
                .await
            {
                tracing::warn!(
                    guild = %guild.id,
                    user = %target.user,
                    "Could not remove isolation role: {e}"
                );
                removal_error = Some(e);
            }
        }

        let path = RestorePath::Fallback {
            reason: fallback_reason,
            removal_error,
        };
        Ok(self.finish_restore(ctx, target, path).await)
    }

    /// Clear member overwrites everywhere, drop the isolated mark and report.
    async fn finish_restore(
        &self,
        ctx: &CommandContext,
        target: &Member,
        path: RestorePath,
    ) -> RestoreOutcome {
        let guild = &ctx.guild;

        let mut overwrites_cleared = 0;
        for channel in &guild.channels {
            match self
                .platform
                .set_channel_overwrite(
                    guild.id,
                    channel.id,
                    OverwriteTarget::Member(target.user),
                    None,
                    "Clear isolation member-specific denies".to_string(),
                )
                .await
            {
                Ok(()) => overwrites_cleared += 1,
                Err(e) => tracing::debug!(channel = %channel.id, "Could not clear overwrite: {e}"),
            }
        }

        let Ok(was_isolated) = self
            .store
            .mutate(|cfg| Ok::<_, Infallible>(cfg.isolated.remove(&target.user)))
            .await;

        let roles_restored = matches!(path, RestorePath::Cached { .. });
        tracing::info!(
            guild = %guild.id,
            moderator = %ctx.caller.user,
            user = %target.user,
            roles_restored,
            overwrites_cleared,
            was_isolated,
            "Member restored"
        );

        let method = if roles_restored {
            "Cached roles restored"
        } else {
            "Fallback restoration"
        };
        let notice = Notice::new("User Unisolated", NoticeColor::Green)
            .field("Moderator", ctx.caller.tag())
            .field("Target", target.tag())
            .field("Method", method)
            .field("Overwrites cleared", overwrites_cleared.to_string());
        let staff_log = self.post_staff_notice(guild.id, notice).await;

        RestoreOutcome {
            target: target.user,
            path,
            overwrites_cleared,
            staff_log,
        }
    }
}
