//! Text command surface.
//!
//! The dispatcher hands over the raw command line (with or without the
//! leading `.`); [`Command::parse`] types it and [`Warden::handle`] runs it
//! and renders the reply lines. [`Warden::dispatch`] also posts them.

use warden_types::{
    Member, Notice, Outgoing, PrincipalId, UserId, parse_channel_ref, parse_role_ref,
    parse_user_ref,
};

use crate::authority::Gate;
use crate::errors::{Rejection, RejectionKind};
use crate::notify::{Delivery, SkipReason, best_effort};
use crate::restore::{FallbackReason, RestorePath};
use crate::{CommandContext, Warden};

const ISOPERM_USAGE: &str = "Usage: .isoperm add <id> | .isoperm remove <id>";
const ISOPERM_UNKNOWN_ACTION: &str = "Unknown action. Use 'add' or 'remove'.";
const ISOLATION_USAGE: &str = "Usage: .isolation role add/remove <@role|role_id> | .isolation channel add/remove <#channel|channel_id> | .isolation show";
const ROLE_USAGE: &str = "Usage: .isolation role add/remove <@role|role_id>";
const CHANNEL_USAGE: &str = "Usage: .isolation channel add/remove <#channel|channel_id>";

/// Parsed command with its raw arguments.
#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    IsoPerm {
        action: Option<&'a str>,
        id: Option<&'a str>,
    },
    Isolate(Option<&'a str>),
    Unisolate(Option<&'a str>),
    /// Bare `isolation` or an unknown subcommand.
    IsolationUsage,
    Show,
    RoleUsage,
    RoleAdd(Option<&'a str>),
    RoleRemove(Option<&'a str>),
    ChannelUsage,
    ChannelAdd(Option<&'a str>),
    ChannelRemove(Option<&'a str>),
    Setup(Option<&'a str>),
    Cleanup,
    ClearCache,
    Unknown(&'a str),
    Empty,
}

impl<'a> Command<'a> {
    #[must_use]
    pub fn parse(raw: &'a str) -> Self {
        let raw = raw.trim_start();
        let raw = raw.strip_prefix('.').unwrap_or(raw);
        let parts: Vec<&str> = raw.split_whitespace().collect();
        let arg = |i: usize| parts.get(i).copied();

        match parts.first().copied() {
            Some("isoperm") => Command::IsoPerm {
                action: arg(1),
                id: arg(2),
            },
            Some("isolate") => Command::Isolate(arg(1)),
            Some("unisolate") => Command::Unisolate(arg(1)),
            Some("isolation") => match arg(1) {
                Some("show") => Command::Show,
                Some("role") => match arg(2) {
                    Some("add") => Command::RoleAdd(arg(3)),
                    Some("remove") => Command::RoleRemove(arg(3)),
                    _ => Command::RoleUsage,
                },
                Some("channel") => match arg(2) {
                    Some("add") => Command::ChannelAdd(arg(3)),
                    Some("remove") => Command::ChannelRemove(arg(3)),
                    _ => Command::ChannelUsage,
                },
                Some("setup") => Command::Setup(arg(2)),
                Some("cleanup") => Command::Cleanup,
                Some("clearcache") => Command::ClearCache,
                _ => Command::IsolationUsage,
            },
            Some(cmd) => Command::Unknown(cmd),
            None => Command::Empty,
        }
    }

    /// Whether this crate owns the command at all.
    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_) | Self::Empty)
    }
}

/// Messages to send back to the invoking channel, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub messages: Vec<Outgoing>,
}

impl Reply {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            messages: vec![Outgoing::Text(text.into())],
        }
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        self.messages.push(Outgoing::Text(text.into()));
    }

    pub fn push_notice(&mut self, notice: Notice) {
        self.messages.push(Outgoing::Notice(notice));
    }

    /// Plain text lines, skipping notices.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().filter_map(Outgoing::as_text)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

fn parse_principal(raw: &str) -> Option<PrincipalId> {
    parse_role_ref(raw)
        .map(PrincipalId::from)
        .or_else(|_| parse_user_ref(raw).map(PrincipalId::from))
        .ok()
}

impl Warden {
    /// Run a command and render its reply. Rejections become their reply
    /// text; nothing is returned as an error.
    pub async fn handle(&self, ctx: &CommandContext, command: Command<'_>) -> Reply {
        match self.run(ctx, command).await {
            Ok(reply) => reply,
            Err(rejection) => {
                let guild = ctx.guild.id;
                let user = ctx.caller.user;
                match rejection.kind() {
                    RejectionKind::Capability => {
                        tracing::warn!(%guild, %user, "Command failed: {rejection}");
                    }
                    RejectionKind::Authorization | RejectionKind::Precondition => {
                        tracing::debug!(%guild, %user, "Command rejected: {rejection}");
                    }
                }
                Reply::text(rejection.to_string())
            }
        }
    }

    /// Parse, run and post the reply to `ctx.reply`.
    ///
    /// A notice that cannot be posted is retried once as plain text.
    pub async fn dispatch(&self, ctx: &CommandContext, raw: &str) -> Vec<Delivery> {
        let command = Command::parse(raw);
        if !command.is_known() {
            return Vec::new();
        }
        let reply = self.handle(ctx, command).await;

        let mut deliveries = Vec::with_capacity(reply.messages.len());
        for message in reply.messages {
            if !ctx.reply.can_post() {
                deliveries.push(Delivery::Skipped(SkipReason::CannotPost));
                continue;
            }
            let fallback = message.as_notice().map(Notice::to_plain_text);
            let mut delivery = best_effort("reply", ctx.reply.post(message)).await;
            if matches!(delivery, Delivery::Failed(_))
                && let Some(text) = fallback
            {
                delivery = best_effort("reply", ctx.reply.post(Outgoing::Text(text))).await;
            }
            deliveries.push(delivery);
        }
        deliveries
    }

    async fn run(&self, ctx: &CommandContext, command: Command<'_>) -> Result<Reply, Rejection> {
        match command {
            Command::IsoPerm { action, id } => self.run_isoperm(ctx, action, id).await,
            Command::Isolate(raw) => {
                self.authorize(Gate::Moderator, ctx, &self.store.snapshot().await)?;
                let target = self.resolve_member(ctx, raw).await;
                let outcome = self.isolate(ctx, target.as_ref()).await?;
                Ok(Reply::text(format!(
                    "<@{}> has been isolated. Cached roles saved. Isolation channels updated: {}.",
                    outcome.target, outcome.channels_updated
                )))
            }
            Command::Unisolate(raw) => {
                self.authorize(Gate::Moderator, ctx, &self.store.snapshot().await)?;
                let target = self.resolve_member(ctx, raw).await;
                let outcome = self.unisolate(ctx, target.as_ref()).await?;

                let mut reply = Reply::default();
                if let RestorePath::Fallback {
                    reason,
                    removal_error,
                } = &outcome.path
                {
                    reply.push_text(match reason {
                        FallbackReason::NoSnapshot => {
                            "Warning: No cached roles found. Proceeding with basic restoration."
                                .to_string()
                        }
                        FallbackReason::NoValidRoles => {
                            "Warning: No valid roles found in cache. Proceeding with basic restoration."
                                .to_string()
                        }
                        FallbackReason::ReplaceFailed(e) if e.is_forbidden() => {
                            "Failed to restore roles due to missing permissions.".to_string()
                        }
                        FallbackReason::ReplaceFailed(e) => format!("Failed to restore roles: {e}"),
                    });
                    if let Some(e) = removal_error {
                        reply.push_text(format!("Warning: Could not remove isolation role: {e}"));
                    }
                }
                let method = if outcome.roles_restored() {
                    "Roles restored from cache."
                } else {
                    "Basic restoration completed."
                };
                reply.push_text(format!(
                    "Restored <@{}> from isolation. {method} Overwrites cleared: {}",
                    outcome.target, outcome.overwrites_cleared
                ));
                Ok(reply)
            }
            Command::IsolationUsage => self.usage(ctx, ISOLATION_USAGE).await,
            Command::RoleUsage => self.usage(ctx, ROLE_USAGE).await,
            Command::ChannelUsage => self.usage(ctx, CHANNEL_USAGE).await,
            Command::Show => {
                let view = self.show(ctx).await?;
                let mut reply = Reply::default();
                reply.push_notice(view.to_notice());
                Ok(reply)
            }
            Command::RoleAdd(raw) => {
                self.authorize(Gate::Operator, ctx, &self.store.snapshot().await)?;
                let id = raw
                    .and_then(|raw| parse_role_ref(raw).ok())
                    .ok_or(Rejection::MissingRole)?;
                let role = self.add_isolation_role(ctx, id).await?;
                Ok(Reply::text(format!(
                    "Added role {} ({}) to isolation configuration.",
                    role.name, role.id
                )))
            }
            Command::RoleRemove(raw) => {
                self.authorize(Gate::Operator, ctx, &self.store.snapshot().await)?;
                let id = raw
                    .and_then(|raw| parse_role_ref(raw).ok())
                    .ok_or(Rejection::MissingRole)?;
                self.remove_isolation_role(ctx, id).await?;
                let label = match ctx.guild.role(id) {
                    Some(role) => format!("{} ({id})", role.name),
                    None => id.to_string(),
                };
                Ok(Reply::text(format!(
                    "Removed role {label} from isolation configuration."
                )))
            }
            Command::ChannelAdd(raw) => {
                self.authorize(Gate::Operator, ctx, &self.store.snapshot().await)?;
                let id = raw
                    .and_then(|raw| parse_channel_ref(raw).ok())
                    .ok_or(Rejection::MissingChannel)?;
                let channel = self.add_isolation_channel(ctx, id).await?;
                Ok(Reply::text(format!(
                    "Added channel <#{0}> ({0}) to isolation configuration.",
                    channel.id
                )))
            }
            Command::ChannelRemove(raw) => {
                self.authorize(Gate::Operator, ctx, &self.store.snapshot().await)?;
                let id = raw
                    .and_then(|raw| parse_channel_ref(raw).ok())
                    .ok_or(Rejection::MissingChannel)?;
                self.remove_isolation_channel(ctx, id).await?;
                Ok(Reply::text(format!(
                    "Removed channel <#{id}> ({id}) from isolation configuration."
                )))
            }
            Command::Setup(role_name) => self.run_setup(ctx, role_name).await,
            Command::Cleanup => {
                let outcome = self.cleanup(ctx).await?;
                Ok(Reply::text(format!(
                    "Cleanup complete. Removed {} banned user(s) from isolated list. Remaining: {}.",
                    outcome.removed, outcome.remaining
                )))
            }
            Command::ClearCache => {
                self.clear_cache(ctx).await?;
                Ok(Reply::text("Isolation in-memory cache cleared."))
            }
            Command::Unknown(_) | Command::Empty => Ok(Reply::default()),
        }
    }

    async fn usage(&self, ctx: &CommandContext, usage: &'static str) -> Result<Reply, Rejection> {
        self.authorize(Gate::Operator, ctx, &self.store.snapshot().await)?;
        Err(Rejection::Usage(usage))
    }

    async fn run_isoperm(
        &self,
        ctx: &CommandContext,
        action: Option<&str>,
        raw_id: Option<&str>,
    ) -> Result<Reply, Rejection> {
        self.authorize(Gate::Operator, ctx, &self.store.snapshot().await)?;
        let (Some(action), Some(raw_id)) = (action, raw_id) else {
            return Err(Rejection::Usage(ISOPERM_USAGE));
        };
        let id = parse_principal(raw_id).ok_or(Rejection::InvalidId)?;

        match action.to_ascii_lowercase().as_str() {
            "add" => {
                self.allow_principal(ctx, id).await?;
                Ok(Reply::text(format!("Added {id} to isolation permissions.")))
            }
            "remove" => {
                self.disallow_principal(ctx, id).await?;
                Ok(Reply::text(format!(
                    "Removed {id} from isolation permissions."
                )))
            }
            _ => Err(Rejection::Usage(ISOPERM_UNKNOWN_ACTION)),
        }
    }

    async fn run_setup(
        &self,
        ctx: &CommandContext,
        role_name: Option<&str>,
    ) -> Result<Reply, Rejection> {
        let outcome = self.setup(ctx, role_name).await?;
        let role = &outcome.role;

        let mut reply = Reply::default();
        reply.push_text(if outcome.role_created {
            format!("Created isolation role: {} ({}).", role.name, role.id)
        } else {
            format!("Using existing isolation role: {} ({}).", role.name, role.id)
        });

        let mut summary = format!(
            "Isolation setup complete. Role: <@&{}>. Updated {} channel(s).",
            role.id, outcome.channels_updated
        );
        if outcome.channels_failed > 0 {
            summary.push_str(&format!(
                " {} channel(s) failed due to permissions.",
                outcome.channels_failed
            ));
        }
        reply.push_text(summary);

        reply.push_text(match &outcome.private_channel {
            Ok(private) => format!("Private isolation channel ready: <#{}>", private.channel),
            Err(e) if e.is_forbidden() => {
                "I lack permissions to create or configure the isolation channel.".to_string()
            }
            Err(e) => format!("Failed to create/configure isolation channel: {e}"),
        });
        Ok(reply)
    }

    /// Look up a mentioned or bare-ID member. Anything unresolvable reads as
    /// a missing target.
    async fn resolve_member(&self, ctx: &CommandContext, raw: Option<&str>) -> Option<Member> {
        let user: UserId = parse_user_ref(raw?).ok()?;
        match self.platform.member(ctx.guild.id, user).await {
            Ok(member) => member,
            Err(e) => {
                tracing::debug!(%user, "Could not resolve member: {e}");
                None
            }
        }
    }
}
