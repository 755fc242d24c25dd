//! Best-effort notifications.
//!
//! Nothing here can fail the operation that triggered it. Each attempt
//! reports a [`Delivery`] so summaries and tests can see what happened.

use warden_types::{ChannelId, GuildId, Notice, Outgoing, UserId};

use crate::Warden;
use crate::platform::{PlatformError, PlatformFut};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Skipped(SkipReason),
    Failed(PlatformError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No staff log channel configured.
    NotConfigured,
    /// Configured channel not found.
    Unavailable,
    /// Channel exists but does not accept messages.
    CannotPost,
    /// Nobody to send to (for example the owner is not a member).
    NoRecipient,
}

/// Await a remote send, logging and swallowing failure.
pub async fn best_effort(what: &'static str, send: PlatformFut<'_, ()>) -> Delivery {
    match send.await {
        Ok(()) => Delivery::Sent,
        Err(e) => {
            tracing::debug!("Best-effort {what} failed: {e}");
            Delivery::Failed(e)
        }
    }
}

impl Warden {
    pub(crate) async fn send_dm(
        &self,
        what: &'static str,
        user: UserId,
        text: String,
    ) -> Delivery {
        best_effort(what, self.platform.send_direct(user, Outgoing::Text(text))).await
    }

    /// Post a structured notice to the configured staff log channel.
    pub(crate) async fn post_staff_notice(&self, guild: GuildId, notice: Notice) -> Delivery {
        let Some(channel) = self.settings.staff_log_channel else {
            return Delivery::Skipped(SkipReason::NotConfigured);
        };
        self.post_notice_to(guild, channel, notice).await
    }

    async fn post_notice_to(&self, guild: GuildId, channel: ChannelId, notice: Notice) -> Delivery {
        let Some(target) = self.platform.post_target(guild, channel) else {
            tracing::debug!(%guild, %channel, "Staff log channel not found");
            return Delivery::Skipped(SkipReason::Unavailable);
        };
        if !target.can_post() {
            return Delivery::Skipped(SkipReason::CannotPost);
        }
        best_effort("staff notice", target.post(Outgoing::Notice(notice))).await
    }
}
