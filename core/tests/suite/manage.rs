//! Configuration management: allow-list, role and channel sets, setup,
//! show, cleanup and cache clearing.

use warden_core::{
    Platform, PlatformError, PrivateChannelAction, Rejection, ViewEntry, canonical_isolation_role,
};
use warden_types::{
    ChannelKind, ISOLATION_CHANNEL_ALLOW, ISOLATION_DENY, OverwriteTarget, PermissionOverwrite,
    Permissions, PrincipalId, RoleId, UserId,
};

use crate::common::{
    BYSTANDER, Call, GENERAL, GUILD, Harness, ISOLATION_CHANNEL, ISOLATION_ROLE, MOD_ROLE,
    MODERATOR, OPERATOR, OWNER, Op, STAFF_LOG, TARGET, VOICE,
};

#[tokio::test]
async fn allow_list_rejects_duplicates_and_missing() {
    let h = Harness::new();
    let (ctx, _) = h.ctx(OPERATOR);
    let id = PrincipalId::new(42);

    h.warden.allow_principal(&ctx, id).await.expect("added");
    assert_eq!(
        h.warden.allow_principal(&ctx, id).await.unwrap_err(),
        Rejection::PrincipalAlreadyAllowed
    );
    h.warden.disallow_principal(&ctx, id).await.expect("removed");
    assert_eq!(
        h.warden.disallow_principal(&ctx, id).await.unwrap_err(),
        Rejection::PrincipalNotAllowed
    );
}

#[tokio::test]
async fn allow_list_changes_are_persisted() {
    let h = Harness::new();
    let (ctx, _) = h.ctx(OPERATOR);
    h.warden
        .allow_principal(&ctx, PrincipalId::new(9))
        .await
        .expect("added");
    h.warden
        .allow_principal(&ctx, PrincipalId::new(3))
        .await
        .expect("added");

    let raw = std::fs::read_to_string(h.store_path()).expect("store");
    let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
    assert_eq!(value["allowed_ids"], serde_json::json!([3, 9]));
    assert_eq!(value["roles"], serde_json::json!([]));
}

#[tokio::test]
async fn config_changes_require_the_operator() {
    let h = Harness::configured();
    // The server owner is not the configured operator.
    let (ctx, _) = h.ctx(OWNER);

    assert_eq!(
        h.warden
            .allow_principal(&ctx, PrincipalId::new(1))
            .await
            .unwrap_err(),
        Rejection::NotOperator
    );
    assert_eq!(
        h.warden.setup(&ctx, None).await.unwrap_err(),
        Rejection::NotOperator
    );
    assert_eq!(h.warden.show(&ctx).await.unwrap_err(), Rejection::NotOperator);
    assert_eq!(
        h.warden.cleanup(&ctx).await.unwrap_err(),
        Rejection::NotOperator
    );
    assert!(h.platform.calls().is_empty());
}

#[tokio::test]
async fn role_set_membership() {
    let h = Harness::new();
    let (ctx, _) = h.ctx(OPERATOR);

    assert_eq!(
        h.warden
            .add_isolation_role(&ctx, RoleId::new(777))
            .await
            .unwrap_err(),
        Rejection::MissingRole
    );
    let role = h
        .warden
        .add_isolation_role(&ctx, ISOLATION_ROLE)
        .await
        .expect("added");
    assert_eq!(role.name, "Isolation");
    assert_eq!(
        h.warden
            .add_isolation_role(&ctx, ISOLATION_ROLE)
            .await
            .unwrap_err(),
        Rejection::RoleAlreadyConfigured
    );
    h.warden
        .remove_isolation_role(&ctx, ISOLATION_ROLE)
        .await
        .expect("removed");
    assert_eq!(
        h.warden
            .remove_isolation_role(&ctx, ISOLATION_ROLE)
            .await
            .unwrap_err(),
        Rejection::RoleNotConfigured
    );
}

#[tokio::test]
async fn deleted_roles_can_still_be_unregistered() {
    let h = Harness::configured();
    h.platform.remove_role(ISOLATION_ROLE);
    let (ctx, _) = h.ctx(OPERATOR);

    h.warden
        .remove_isolation_role(&ctx, ISOLATION_ROLE)
        .await
        .expect("removed");
    assert!(h.warden.config().await.roles.is_empty());
}

#[tokio::test]
async fn first_existing_role_is_canonical() {
    let h = Harness::configured();
    let (ctx, _) = h.ctx(OPERATOR);
    h.warden
        .add_isolation_role(&ctx, MOD_ROLE)
        .await
        .expect("added");
    h.platform.remove_role(MOD_ROLE);

    let config = h.warden.config().await;
    let guild = h.platform.guild();
    assert_eq!(
        canonical_isolation_role(&config, &guild).map(|r| r.id),
        Some(ISOLATION_ROLE)
    );
}

#[tokio::test]
async fn channel_set_membership() {
    let h = Harness::new();
    let (ctx, _) = h.ctx(OPERATOR);

    assert_eq!(
        h.warden
            .add_isolation_channel(&ctx, VOICE)
            .await
            .unwrap_err(),
        Rejection::MissingChannel
    );
    let channel = h
        .warden
        .add_isolation_channel(&ctx, GENERAL)
        .await
        .expect("added");
    assert_eq!(channel.kind, ChannelKind::Text);
    assert_eq!(
        h.warden
            .add_isolation_channel(&ctx, GENERAL)
            .await
            .unwrap_err(),
        Rejection::ChannelAlreadyConfigured
    );
    h.warden
        .remove_isolation_channel(&ctx, GENERAL)
        .await
        .expect("removed");
    assert_eq!(
        h.warden
            .remove_isolation_channel(&ctx, GENERAL)
            .await
            .unwrap_err(),
        Rejection::ChannelNotConfigured
    );
}

#[tokio::test]
async fn setup_adopts_existing_role_and_channel() {
    let h = Harness::new();
    let (ctx, _) = h.ctx(OPERATOR);

    let outcome = h.warden.setup(&ctx, None).await.expect("setup");

    assert_eq!(outcome.role.id, ISOLATION_ROLE);
    assert!(!outcome.role_created);
    assert!(outcome.role_registered);
    // general, voice and staff-log; the private channel is skipped.
    assert_eq!(outcome.channels_updated, 3);
    assert_eq!(outcome.channels_failed, 0);
    let private = outcome.private_channel.expect("private channel");
    assert_eq!(private.channel, ISOLATION_CHANNEL);
    assert_eq!(private.action, PrivateChannelAction::Adopted);
    assert!(private.registered);

    let config = h.warden.config().await;
    assert!(config.roles.contains(&ISOLATION_ROLE));
    assert!(config.channels.contains(&ISOLATION_CHANNEL));

    let guild = h.platform.guild();
    let general = guild.channel(GENERAL).expect("general");
    assert_eq!(
        general.overwrite_for(OverwriteTarget::Role(ISOLATION_ROLE)),
        PermissionOverwrite::denying(ISOLATION_DENY)
    );
    let isolation = guild.channel(ISOLATION_CHANNEL).expect("isolation");
    assert_eq!(
        isolation.overwrite_for(OverwriteTarget::Role(ISOLATION_ROLE)),
        PermissionOverwrite::allowing(ISOLATION_CHANNEL_ALLOW)
    );
    assert_eq!(
        isolation.overwrite_for(OverwriteTarget::Role(GUILD.default_role())),
        PermissionOverwrite::denying(Permissions::VIEW_CHANNEL)
    );
}

#[tokio::test]
async fn setup_is_idempotent() {
    let h = Harness::new();
    let (ctx, _) = h.ctx(OPERATOR);
    h.warden.setup(&ctx, None).await.expect("first setup");
    h.platform.clear_calls();

    let (ctx, _) = h.ctx(OPERATOR);
    let outcome = h.warden.setup(&ctx, None).await.expect("second setup");

    assert!(!outcome.role_created);
    assert!(!outcome.role_registered);
    assert_eq!(outcome.channels_updated, 0);
    let private = outcome.private_channel.expect("private channel");
    assert_eq!(private.action, PrivateChannelAction::Unchanged);
    assert!(!private.registered);
    assert!(h.platform.mutating_calls().is_empty());
    assert_eq!(h.warden.config().await.roles.len(), 1);
}

#[tokio::test]
async fn setup_merges_deny_into_existing_overwrites() {
    let h = Harness::new();
    let keep = PermissionOverwrite {
        allow: Permissions::READ_MESSAGE_HISTORY | Permissions::VIEW_CHANNEL,
        deny: Permissions::NONE,
    };
    h.platform
        .set_channel_overwrite(
            GUILD,
            GENERAL,
            OverwriteTarget::Role(ISOLATION_ROLE),
            Some(keep),
            "test".to_string(),
        )
        .await
        .expect("seed overwrite");
    let (ctx, _) = h.ctx(OPERATOR);

    h.warden.setup(&ctx, None).await.expect("setup");

    let general = h.platform.guild().channel(GENERAL).cloned().expect("general");
    let merged = general.overwrite_for(OverwriteTarget::Role(ISOLATION_ROLE));
    assert_eq!(merged.allow, Permissions::READ_MESSAGE_HISTORY);
    assert_eq!(merged.deny, ISOLATION_DENY);
}

#[tokio::test]
async fn setup_skips_configured_isolation_channels() {
    let h = Harness::new();
    let (ctx, _) = h.ctx(OPERATOR);
    h.warden
        .add_isolation_channel(&ctx, STAFF_LOG)
        .await
        .expect("added");

    let outcome = h.warden.setup(&ctx, None).await.expect("setup");

    assert_eq!(outcome.channels_updated, 2);
    assert!(
        h.platform
            .guild()
            .channel(STAFF_LOG)
            .expect("staff")
            .overwrites
            .is_empty()
    );
}

#[tokio::test]
async fn setup_creates_missing_role() {
    let h = Harness::new();
    let (ctx, _) = h.ctx(OPERATOR);

    let outcome = h.warden.setup(&ctx, Some("Jail")).await.expect("setup");

    assert!(outcome.role_created);
    assert_eq!(outcome.role.name, "Jail");
    assert!(h.platform.calls().contains(&Call::CreateRole("Jail".to_string())));
    assert!(h.warden.config().await.roles.contains(&outcome.role.id));
}

#[tokio::test]
async fn setup_role_creation_failures_abort() {
    let h = Harness::new();
    h.platform
        .fail_always(Op::CreateRole, PlatformError::forbidden("create role"));
    let (ctx, _) = h.ctx(OPERATOR);

    assert_eq!(
        h.warden.setup(&ctx, Some("Jail")).await.unwrap_err(),
        Rejection::RoleCreateForbidden
    );

    h.platform.fail_always(
        Op::CreateRole,
        PlatformError::rejected("create role", "too many roles"),
    );
    let err = h.warden.setup(&ctx, Some("Jail")).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Failed to create role: create role rejected: too many roles"
    );
    assert!(h.warden.config().await.roles.is_empty());
}

#[tokio::test]
async fn setup_creates_private_channel_when_none_matches() {
    let h = Harness::new();
    h.platform.rename_channel(ISOLATION_CHANNEL, "lobby");
    let (ctx, _) = h.ctx(OPERATOR);

    let outcome = h.warden.setup(&ctx, None).await.expect("setup");

    assert_eq!(outcome.channels_updated, 4);
    let private = outcome.private_channel.expect("private channel");
    assert_eq!(private.action, PrivateChannelAction::Created);
    assert!(
        h.platform
            .calls()
            .contains(&Call::CreateChannel("isolation".to_string()))
    );
    assert!(h.warden.config().await.channels.contains(&private.channel));
}

#[tokio::test]
async fn setup_adopts_alias_channel() {
    let h = Harness::new();
    h.platform.rename_channel(ISOLATION_CHANNEL, "quarantine");
    let (ctx, _) = h.ctx(OPERATOR);

    let outcome = h.warden.setup(&ctx, None).await.expect("setup");

    let private = outcome.private_channel.expect("private channel");
    assert_eq!(private.channel, ISOLATION_CHANNEL);
    assert_eq!(private.action, PrivateChannelAction::Adopted);
}

#[tokio::test]
async fn setup_reports_private_channel_failure() {
    let h = Harness::new();
    h.platform.fail_always(
        Op::ReplaceOverwrites,
        PlatformError::forbidden("edit channel"),
    );
    let (ctx, _) = h.ctx(OPERATOR);

    let outcome = h.warden.setup(&ctx, None).await.expect("setup");

    assert_eq!(
        outcome.private_channel,
        Err(PlatformError::forbidden("edit channel"))
    );
    assert!(outcome.role_registered);
    assert!(h.warden.config().await.channels.is_empty());
}

#[tokio::test]
async fn setup_counts_failed_channels() {
    let h = Harness::new();
    h.platform
        .fail_always(Op::SetOverwrite, PlatformError::forbidden("edit channel"));
    let (ctx, _) = h.ctx(OPERATOR);

    let outcome = h.warden.setup(&ctx, None).await.expect("setup");

    assert_eq!(outcome.channels_updated, 0);
    assert_eq!(outcome.channels_failed, 3);
}

#[tokio::test]
async fn show_resolves_live_names() {
    let h = Harness::configured();
    let (ctx, _) = h.ctx(OPERATOR);
    h.warden
        .allow_principal(&ctx, PrincipalId::from(MODERATOR))
        .await
        .expect("added");
    h.warden
        .allow_principal(&ctx, PrincipalId::new(4242))
        .await
        .expect("added");

    let view = h.warden.show(&ctx).await.expect("view");

    assert_eq!(
        view.allowed,
        vec![
            ViewEntry::Role {
                id: MOD_ROLE,
                name: "Mod".to_string()
            },
            ViewEntry::User(MODERATOR),
            ViewEntry::Unresolved(4242),
        ]
    );
    assert_eq!(
        view.roles,
        vec![ViewEntry::Role {
            id: ISOLATION_ROLE,
            name: "Isolation".to_string()
        }]
    );
    assert_eq!(
        view.channels,
        vec![ViewEntry::Channel {
            id: ISOLATION_CHANNEL,
            name: "isolation".to_string()
        }]
    );
}

#[tokio::test]
async fn show_falls_back_to_raw_ids() {
    let h = Harness::configured();
    h.platform.remove_channel(ISOLATION_CHANNEL);
    h.platform.remove_role(ISOLATION_ROLE);
    let (ctx, _) = h.ctx(OPERATOR);

    let notice = h.warden.show(&ctx).await.expect("view").to_notice();

    let text = notice.description.unwrap_or_default();
    assert!(text.contains("Roles:\nID: 13"));
    assert!(text.contains("Channels:\nID: 202"));
    assert!(text.ends_with("Isolated Users:\n<none>"));
}

#[tokio::test]
async fn cleanup_removes_only_banned_users() {
    let h = Harness::configured();
    let (ctx, _) = h.ctx(OWNER);
    h.warden
        .isolate(&ctx, Some(&h.target()))
        .await
        .expect("isolated");
    let bystander = h.platform.member_state(BYSTANDER).expect("bystander");
    h.warden
        .isolate(&ctx, Some(&bystander))
        .await
        .expect("isolated");
    // The target merely left; the bystander was banned.
    h.platform.leave(TARGET);
    h.platform.set_banned(&[BYSTANDER, UserId::new(9000)]);

    let (ctx, _) = h.ctx(OPERATOR);
    let outcome = h.warden.cleanup(&ctx).await.expect("cleanup");

    assert_eq!(outcome.removed, 1);
    assert_eq!(outcome.remaining, 1);
    let config = h.warden.config().await;
    assert!(config.is_isolated(TARGET));
    assert!(!config.is_isolated(BYSTANDER));
}

#[tokio::test]
async fn cleanup_tolerates_ban_list_failure() {
    let h = Harness::configured();
    let (ctx, _) = h.ctx(OWNER);
    h.warden
        .isolate(&ctx, Some(&h.target()))
        .await
        .expect("isolated");
    h.platform
        .fail_always(Op::BannedUsers, PlatformError::forbidden("list bans"));

    let (ctx, _) = h.ctx(OPERATOR);
    let outcome = h.warden.cleanup(&ctx).await.expect("cleanup");

    assert_eq!(outcome.removed, 0);
    assert_eq!(outcome.remaining, 1);
}

#[tokio::test]
async fn clear_cache_is_server_owner_only() {
    let h = Harness::configured();
    let (owner, _) = h.ctx(OWNER);
    h.warden
        .isolate(&owner, Some(&h.target()))
        .await
        .expect("isolated");

    let (operator, _) = h.ctx(OPERATOR);
    assert_eq!(
        h.warden.clear_cache(&operator).await.unwrap_err(),
        Rejection::NotServerOwner
    );
    assert_eq!(h.warden.clear_cache(&owner).await, Ok(1));
    assert!(h.warden.cache().is_empty().await);
}
