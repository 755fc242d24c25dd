//! Isolation environment management: allow-list, role and channel sets,
//! provisioning, inspection and housekeeping.

use std::collections::BTreeSet;

use warden_types::{
    Channel, ChannelId, ChannelKind, GuildSnapshot, ISOLATION_CHANNEL_ALLOW, ISOLATION_DENY,
    IsolationConfig, Notice, NoticeColor, Overwrite, OverwriteTarget, PermissionOverwrite,
    Permissions, PrincipalId, Role, RoleId, UserId,
};

use crate::authority::Gate;
use crate::errors::Rejection;
use crate::platform::PlatformError;
use crate::{CommandContext, Warden};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupOutcome {
    pub role: Role,
    pub role_created: bool,
    /// False when the role was already in the configured role set.
    pub role_registered: bool,
    pub channels_updated: usize,
    pub channels_failed: usize,
    pub private_channel: Result<PrivateChannelOutcome, PlatformError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivateChannelAction {
    Created,
    /// An existing channel had its overwrites replaced.
    Adopted,
    /// An existing channel already had exactly the private overwrites.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateChannelOutcome {
    pub channel: ChannelId,
    pub action: PrivateChannelAction,
    pub registered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupOutcome {
    pub removed: usize,
    pub remaining: usize,
}

/// One configured ID, resolved against live guild state where possible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEntry {
    User(UserId),
    Role { id: RoleId, name: String },
    Channel { id: ChannelId, name: String },
    Unresolved(u64),
}

impl ViewEntry {
    fn describe(&self) -> String {
        match self {
            Self::User(id) => format!("<@{id}> ({id})"),
            Self::Role { id, name } => format!("{name} ({id})"),
            Self::Channel { id, name } => format!("#{name} ({id})"),
            Self::Unresolved(id) => format!("ID: {id}"),
        }
    }

    /// Allow-list entries say what kind of principal they resolved to.
    fn describe_principal(&self) -> String {
        match self {
            Self::User(_) => format!("User: {}", self.describe()),
            Self::Role { .. } => format!("Role: {}", self.describe()),
            _ => self.describe(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigView {
    pub allowed: Vec<ViewEntry>,
    pub roles: Vec<ViewEntry>,
    pub channels: Vec<ViewEntry>,
    pub isolated: Vec<UserId>,
}

impl ConfigView {
    /// A view with nothing resolved, for use outside any guild.
    #[must_use]
    pub fn unresolved(config: &IsolationConfig) -> Self {
        Self {
            allowed: config
                .allowed
                .iter()
                .map(|id| ViewEntry::Unresolved(id.value()))
                .collect(),
            roles: config
                .roles
                .iter()
                .map(|id| ViewEntry::Unresolved(id.value()))
                .collect(),
            channels: config
                .channels
                .iter()
                .map(|id| ViewEntry::Unresolved(id.value()))
                .collect(),
            isolated: config.isolated.iter().copied().collect(),
        }
    }

    #[must_use]
    pub fn to_notice(&self) -> Notice {
        let sections = [
            section(
                "Allowed IDs",
                self.allowed.iter().map(ViewEntry::describe_principal),
            ),
            section("Roles", self.roles.iter().map(ViewEntry::describe)),
            section("Channels", self.channels.iter().map(ViewEntry::describe)),
            section(
                "Isolated Users",
                self.isolated.iter().map(ToString::to_string),
            ),
        ];
        Notice::new("Isolation Configuration", NoticeColor::Blurple)
            .description(sections.join("\n\n"))
    }
}

fn section(title: &str, lines: impl Iterator<Item = String>) -> String {
    let lines: Vec<String> = lines.collect();
    if lines.is_empty() {
        format!("{title}:\n<none>")
    } else {
        format!("{title}:\n{}", lines.join("\n"))
    }
}

/// Overwrites that make a channel visible to the isolation role only.
fn private_overwrites(guild: &GuildSnapshot, role: RoleId) -> Vec<Overwrite> {
    vec![
        Overwrite {
            target: OverwriteTarget::Role(guild.id.default_role()),
            permissions: PermissionOverwrite::denying(Permissions::VIEW_CHANNEL),
        },
        Overwrite {
            target: OverwriteTarget::Role(role),
            permissions: PermissionOverwrite::allowing(ISOLATION_CHANNEL_ALLOW),
        },
    ]
}

fn same_overwrites(current: &[Overwrite], desired: &[Overwrite]) -> bool {
    current.len() == desired.len() && desired.iter().all(|o| current.contains(o))
}

impl Warden {
    pub async fn allow_principal(
        &self,
        ctx: &CommandContext,
        id: PrincipalId,
    ) -> Result<(), Rejection> {
        self.authorize(Gate::Operator, ctx, &self.store.snapshot().await)?;
        self.store
            .mutate(|cfg| {
                if cfg.allowed.insert(id) {
                    Ok(())
                } else {
                    Err(Rejection::PrincipalAlreadyAllowed)
                }
            })
            .await?;
        tracing::info!(%id, "Allowed isolation principal");
        Ok(())
    }

    pub async fn disallow_principal(
        &self,
        ctx: &CommandContext,
        id: PrincipalId,
    ) -> Result<(), Rejection> {
        self.authorize(Gate::Operator, ctx, &self.store.snapshot().await)?;
        self.store
            .mutate(|cfg| {
                if cfg.allowed.remove(&id) {
                    Ok(())
                } else {
                    Err(Rejection::PrincipalNotAllowed)
                }
            })
            .await?;
        tracing::info!(%id, "Removed isolation principal");
        Ok(())
    }

    /// Register an existing guild role as an isolation role.
    pub async fn add_isolation_role(
        &self,
        ctx: &CommandContext,
        id: RoleId,
    ) -> Result<Role, Rejection> {
        self.authorize(Gate::Operator, ctx, &self.store.snapshot().await)?;
        let role = ctx.guild.role(id).cloned().ok_or(Rejection::MissingRole)?;
        self.store
            .mutate(|cfg| {
                if cfg.roles.insert(id) {
                    Ok(())
                } else {
                    Err(Rejection::RoleAlreadyConfigured)
                }
            })
            .await?;
        tracing::info!(role = %id, "Added isolation role");
        Ok(role)
    }

    /// Unregister an isolation role. The role need not exist any more.
    pub async fn remove_isolation_role(
        &self,
        ctx: &CommandContext,
        id: RoleId,
    ) -> Result<(), Rejection> {
        self.authorize(Gate::Operator, ctx, &self.store.snapshot().await)?;
        self.store
            .mutate(|cfg| {
                if cfg.roles.remove(&id) {
                    Ok(())
                } else {
                    Err(Rejection::RoleNotConfigured)
                }
            })
            .await?;
        tracing::info!(role = %id, "Removed isolation role");
        Ok(())
    }

    /// Register an existing text channel as an isolation channel.
    pub async fn add_isolation_channel(
        &self,
        ctx: &CommandContext,
        id: ChannelId,
    ) -> Result<Channel, Rejection> {
        self.authorize(Gate::Operator, ctx, &self.store.snapshot().await)?;
        let channel = ctx
            .guild
            .channel(id)
            .filter(|c| c.kind == ChannelKind::Text)
            .cloned()
            .ok_or(Rejection::MissingChannel)?;
        self.store
            .mutate(|cfg| {
                if cfg.channels.insert(id) {
                    Ok(())
                } else {
                    Err(Rejection::ChannelAlreadyConfigured)
                }
            })
            .await?;
        tracing::info!(channel = %id, "Added isolation channel");
        Ok(channel)
    }

    pub async fn remove_isolation_channel(
        &self,
        ctx: &CommandContext,
        id: ChannelId,
    ) -> Result<(), Rejection> {
        self.authorize(Gate::Operator, ctx, &self.store.snapshot().await)?;
        self.store
            .mutate(|cfg| {
                if cfg.channels.remove(&id) {
                    Ok(())
                } else {
                    Err(Rejection::ChannelNotConfigured)
                }
            })
            .await?;
        tracing::info!(channel = %id, "Removed isolation channel");
        Ok(())
    }

    /// Provision the isolation environment for `ctx.guild`.
    ///
    /// Safe to re-run: the role is found by name, only overwrites that lack
    /// a deny field are rewritten, and the private channel is adopted by
    /// name before a new one is created.
    pub async fn setup(
        &self,
        ctx: &CommandContext,
        role_name: Option<&str>,
    ) -> Result<SetupOutcome, Rejection> {
        self.authorize(Gate::Operator, ctx, &self.store.snapshot().await)?;
        let guild = &ctx.guild;
        let role_name = role_name.unwrap_or(&self.settings.role_name);

        let (role, role_created) = match guild.role_named(role_name) {
            Some(role) => (role.clone(), false),
            None => {
                let role = self
                    .platform
                    .create_role(
                        guild.id,
                        role_name.to_string(),
                        "Create isolation role".to_string(),
                    )
                    .await
                    .map_err(|e| {
                        tracing::warn!(guild = %guild.id, "Could not create isolation role: {e}");
                        if e.is_forbidden() {
                            Rejection::RoleCreateForbidden
                        } else {
                            Rejection::RoleCreateFailed(e)
                        }
                    })?;
                tracing::info!(guild = %guild.id, role = %role.id, "Created isolation role");
                (role, true)
            }
        };

        let Ok(role_registered) = self
            .store
            .mutate(|cfg| Ok::<_, std::convert::Infallible>(cfg.roles.insert(role.id)))
            .await;

        let private = self.private_channel_candidate(guild);
        let config = self.store.snapshot().await;
        let role_target = OverwriteTarget::Role(role.id);

        let mut channels_updated = 0;
        let mut channels_failed = 0;
        for channel in guild.channels.iter().filter(|c| {
            !config.channels.contains(&c.id) && private.is_none_or(|p| p.id != c.id)
        }) {
            let current = channel.overwrite_for(role_target);
            let merged = current.merge_deny(ISOLATION_DENY);
            if merged == current {
                continue;
            }
            match self
                .platform
                .set_channel_overwrite(
                    guild.id,
                    channel.id,
                    role_target,
                    Some(merged),
                    "Isolation setup deny-all".to_string(),
                )
                .await
            {
                Ok(()) => channels_updated += 1,
                Err(e) => {
                    tracing::debug!(channel = %channel.id, "Could not apply role deny-all: {e}");
                    channels_failed += 1;
                }
            }
        }

        let private_channel = self.ensure_private_channel(guild, private, role.id).await;
        if let Err(e) = &private_channel {
            tracing::warn!(guild = %guild.id, "Private isolation channel not ready: {e}");
        }

        tracing::info!(
            guild = %guild.id,
            role = %role.id,
            role_created,
            channels_updated,
            channels_failed,
            "Isolation setup finished"
        );

        Ok(SetupOutcome {
            role,
            role_created,
            role_registered,
            channels_updated,
            channels_failed,
            private_channel,
        })
    }

    fn private_channel_candidate<'a>(&self, guild: &'a GuildSnapshot) -> Option<&'a Channel> {
        std::iter::once(&self.settings.channel_name)
            .chain(&self.settings.channel_aliases)
            .find_map(|name| guild.text_channel_named(name))
    }

    async fn ensure_private_channel(
        &self,
        guild: &GuildSnapshot,
        existing: Option<&Channel>,
        role: RoleId,
    ) -> Result<PrivateChannelOutcome, PlatformError> {
        let desired = private_overwrites(guild, role);
        let (channel, action) = match existing {
            None => {
                let channel = self
                    .platform
                    .create_text_channel(
                        guild.id,
                        self.settings.channel_name.clone(),
                        desired,
                        "Create private isolation channel visible only to isolation role"
                            .to_string(),
                    )
                    .await?;
                (channel.id, PrivateChannelAction::Created)
            }
            Some(channel) if same_overwrites(&channel.overwrites, &desired) => {
                (channel.id, PrivateChannelAction::Unchanged)
            }
            Some(channel) => {
                self.platform
                    .replace_channel_overwrites(
                        guild.id,
                        channel.id,
                        desired,
                        "Ensure isolation channel privacy".to_string(),
                    )
                    .await?;
                (channel.id, PrivateChannelAction::Adopted)
            }
        };

        let Ok(registered) = self
            .store
            .mutate(|cfg| Ok::<_, std::convert::Infallible>(cfg.channels.insert(channel)))
            .await;
        Ok(PrivateChannelOutcome {
            channel,
            action,
            registered,
        })
    }

    /// Resolve the configuration against the caller's guild.
    pub async fn show(&self, ctx: &CommandContext) -> Result<ConfigView, Rejection> {
        let config = self.store.snapshot().await;
        self.authorize(Gate::Operator, ctx, &config)?;
        let guild = &ctx.guild;

        let mut allowed = Vec::with_capacity(config.allowed.len());
        for id in &config.allowed {
            let user = UserId::new(id.value());
            let entry = match self.platform.member(guild.id, user).await {
                Ok(Some(_)) => ViewEntry::User(user),
                _ => match guild.role(RoleId::new(id.value())) {
                    Some(role) => ViewEntry::Role {
                        id: role.id,
                        name: role.name.clone(),
                    },
                    None => ViewEntry::Unresolved(id.value()),
                },
            };
            allowed.push(entry);
        }

        let roles = config
            .roles
            .iter()
            .map(|id| match guild.role(*id) {
                Some(role) => ViewEntry::Role {
                    id: role.id,
                    name: role.name.clone(),
                },
                None => ViewEntry::Unresolved(id.value()),
            })
            .collect();
        let channels = config
            .channels
            .iter()
            .map(|id| match guild.channel(*id) {
                Some(channel) => ViewEntry::Channel {
                    id: channel.id,
                    name: channel.name.clone(),
                },
                None => ViewEntry::Unresolved(id.value()),
            })
            .collect();

        Ok(ConfigView {
            allowed,
            roles,
            channels,
            isolated: config.isolated.iter().copied().collect(),
        })
    }

    /// Drop isolated marks for users who are banned. Members who merely
    /// left stay marked so a rejoin still trips the guard.
    pub async fn cleanup(&self, ctx: &CommandContext) -> Result<CleanupOutcome, Rejection> {
        self.authorize(Gate::Operator, ctx, &self.store.snapshot().await)?;
        let banned: BTreeSet<UserId> = match self.platform.banned_users(ctx.guild.id).await {
            Ok(users) => users.into_iter().collect(),
            Err(e) => {
                tracing::warn!(guild = %ctx.guild.id, "Could not list bans: {e}");
                BTreeSet::new()
            }
        };

        let Ok(outcome) = self
            .store
            .mutate(|cfg| {
                let before = cfg.isolated.len();
                cfg.isolated.retain(|user| !banned.contains(user));
                Ok::<_, std::convert::Infallible>(CleanupOutcome {
                    removed: before - cfg.isolated.len(),
                    remaining: cfg.isolated.len(),
                })
            })
            .await;
        tracing::info!(
            guild = %ctx.guild.id,
            removed = outcome.removed,
            remaining = outcome.remaining,
            "Isolation cleanup"
        );
        Ok(outcome)
    }

    /// Drop every cached role snapshot in every guild.
    pub async fn clear_cache(&self, ctx: &CommandContext) -> Result<usize, Rejection> {
        self.authorize(Gate::ServerOwner, ctx, &self.store.snapshot().await)?;
        let dropped = self.cache.clear().await;
        tracing::warn!(caller = %ctx.caller.user, dropped, "Role cache cleared");
        Ok(dropped)
    }
}
