//! Rejoin evasion guard.

use warden_core::{Delivery, EVASION_BAN_REASON, JoinOutcome, PlatformError, SkipReason};

use crate::common::{BYSTANDER, Call, GUILD, Harness, OWNER, Op, TARGET};

async fn isolate_and_leave(h: &Harness) -> warden_types::Member {
    let (ctx, _) = h.ctx(OWNER);
    let target = h.target();
    h.warden
        .isolate(&ctx, Some(&target))
        .await
        .expect("isolated");
    h.platform.leave(TARGET);
    h.platform.clear_calls();
    target
}

#[tokio::test]
async fn rejoin_of_unmarked_member_is_a_no_op() {
    let h = Harness::configured();
    let bystander = h.platform.member_state(BYSTANDER).expect("bystander");

    let outcome = h.warden.on_member_join(GUILD, &bystander).await;

    assert_eq!(outcome, JoinOutcome::NotIsolated);
    assert!(h.platform.calls().is_empty());
}

#[tokio::test]
async fn rejoining_isolated_member_is_banned() {
    let h = Harness::configured();
    let target = isolate_and_leave(&h).await;

    let outcome = h.warden.on_member_join(GUILD, &target).await;

    assert_eq!(
        outcome,
        JoinOutcome::Banned {
            staff_log: Delivery::Sent
        }
    );
    assert_eq!(
        h.platform.calls(),
        vec![Call::Ban {
            user: TARGET,
            reason: EVASION_BAN_REASON.to_string(),
        }]
    );
    let posted = h.platform.staff_log().posted();
    let notice = posted.last().and_then(|m| m.as_notice()).expect("notice");
    assert_eq!(notice.title, "Auto-ban: Isolation Evasion");
    assert_eq!(notice.field_value("User"), Some("target (102)"));
}

#[tokio::test]
async fn isolated_mark_survives_restart() {
    let h = Harness::configured();
    let target = isolate_and_leave(&h).await;
    let h = h.reopen();

    let outcome = h.warden.on_member_join(GUILD, &target).await;

    assert!(matches!(outcome, JoinOutcome::Banned { .. }));
    assert_eq!(h.platform.banned(), vec![TARGET]);
}

#[tokio::test]
async fn ban_failure_is_swallowed() {
    let h = Harness::configured();
    let target = isolate_and_leave(&h).await;
    h.platform
        .fail_always(Op::Ban, PlatformError::forbidden("ban member"));
    let before = h.platform.staff_log().posted().len();

    let outcome = h.warden.on_member_join(GUILD, &target).await;

    assert_eq!(
        outcome,
        JoinOutcome::BanFailed(PlatformError::forbidden("ban member"))
    );
    assert_eq!(h.platform.staff_log().posted().len(), before);
    assert!(h.warden.config().await.is_isolated(TARGET));
}

#[tokio::test]
async fn missing_staff_channel_does_not_block_ban() {
    let h = Harness::configured_with(|s| s.staff_log_channel = None);
    let target = isolate_and_leave(&h).await;

    let outcome = h.warden.on_member_join(GUILD, &target).await;

    assert_eq!(
        outcome,
        JoinOutcome::Banned {
            staff_log: Delivery::Skipped(SkipReason::NotConfigured)
        }
    );
}

#[tokio::test]
async fn guild_removal_drops_its_snapshots() {
    let h = Harness::configured();
    let (ctx, _) = h.ctx(OWNER);
    h.warden
        .isolate(&ctx, Some(&h.target()))
        .await
        .expect("isolated");

    assert_eq!(h.warden.on_guild_remove(GUILD).await, 1);
    assert!(h.warden.cache().is_empty().await);
    assert_eq!(h.warden.on_guild_remove(GUILD).await, 0);
}

#[tokio::test]
async fn rejoin_racing_a_restore_is_not_banned() {
    let h = Harness::configured();
    let (ctx, _) = h.ctx(OWNER);
    h.warden
        .isolate(&ctx, Some(&h.target()))
        .await
        .expect("isolated");
    let member = h.target();
    h.platform.set_slow(true);

    let (restored, outcome) = tokio::join!(h.warden.unisolate(&ctx, Some(&member)), async {
        // Let the restore take the member lock first.
        tokio::task::yield_now().await;
        h.warden.on_member_join(GUILD, &member).await
    });

    assert!(restored.expect("restored").roles_restored());
    assert_eq!(outcome, JoinOutcome::NotIsolated);
    assert!(h.platform.banned().is_empty());
    assert!(
        !h.platform
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Ban { .. }))
    );
}
