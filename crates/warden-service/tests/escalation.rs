//! Cascade scenarios across ledger, policy and restriction manager.

mod common;

use common::{Harness, MARKER, ROLE_A, ROLE_B, SCOPE, TARGET};
use std::collections::BTreeSet;
use std::time::Duration;
use warden_policy::{PolicyConfig, SanctionDirective};
use warden_service::AppliedEscalation;
use warden_types::{RestrictionKey, RoleId};

#[tokio::test(start_paused = true)]
async fn test_third_warning_restricts_for_one_day() {
    let h = Harness::new();
    let ctx = h.ctx();

    for _ in 0..2 {
        let outcome = h.service.warn(&ctx, "spam").await.unwrap();
        assert!(outcome.escalations.is_empty());
        h.advance_minutes(1);
    }

    let outcome = h.service.warn(&ctx, "spam").await.unwrap();
    assert_eq!(outcome.counts.warnings, 3);
    assert_eq!(outcome.counts.restrictions, 1);
    assert_eq!(outcome.escalations.len(), 1);

    match &outcome.escalations[0] {
        AppliedEscalation::Restricted { record, counted } => {
            assert!(counted);
            assert_eq!(record.reason, "경고 3회 누적");
            assert_eq!(
                record.expires_at - record.applied_at,
                chrono::Duration::days(1)
            );
        }
        other => panic!("unexpected escalation: {other:?}"),
    }
    assert_eq!(
        h.platform.roles_of(TARGET, SCOPE).unwrap(),
        BTreeSet::from([MARKER])
    );
}

#[tokio::test(start_paused = true)]
async fn test_warning_restriction_cascades_into_removal() {
    let h = Harness::new();
    let ctx = h.ctx();

    for _ in 0..2 {
        h.service.restrict(&ctx, "1h", "flood").await.unwrap();
        h.advance_minutes(1);
        h.service.unrestrict(&ctx, "served").await.unwrap();
        h.advance_minutes(1);
    }
    for _ in 0..2 {
        h.service.warn(&ctx, "spam").await.unwrap();
        h.advance_minutes(1);
    }

    let outcome = h.service.warn(&ctx, "spam").await.unwrap();
    assert_eq!(outcome.counts.restrictions, 3);
    assert_eq!(outcome.counts.removals, 1);
    assert_eq!(outcome.counts.bans, 0);
    assert!(matches!(
        outcome.escalations.as_slice(),
        [
            AppliedEscalation::Restricted { .. },
            AppliedEscalation::Removed { reason },
        ] if reason == "재갈 3회 누적"
    ));
    assert!(!h.platform.is_member(TARGET, SCOPE));
}

#[tokio::test(start_paused = true)]
async fn test_removed_member_restriction_lifts_after_rejoin() {
    let h = Harness::new();
    let ctx = h.ctx();

    for _ in 0..2 {
        h.service.restrict(&ctx, "1h", "flood").await.unwrap();
        h.service.unrestrict(&ctx, "served").await.unwrap();
    }
    for _ in 0..3 {
        h.service.warn(&ctx, "spam").await.unwrap();
    }
    assert!(!h.platform.is_member(TARGET, SCOPE));
    let key = RestrictionKey::new(TARGET, SCOPE);

    // Expiry passes while the member is gone: the record stays and the
    // reversal keeps being retried.
    h.elapse(Duration::from_secs(24 * 3600 + 60)).await;
    assert!(h.service.restrictions().is_restricted(TARGET, SCOPE).await.unwrap());
    assert_eq!(h.service.restrictions().armed_timers(), vec![key]);

    h.elapse(Duration::from_secs(600)).await;
    assert_eq!(h.service.restrictions().armed_timers(), vec![key]);

    // After rejoining, the next retry restores the snapshot.
    h.platform.join(TARGET, SCOPE, Vec::<RoleId>::new());
    h.elapse(Duration::from_secs(3600)).await;
    assert!(!h.service.restrictions().is_restricted(TARGET, SCOPE).await.unwrap());
    assert!(h.service.restrictions().armed_timers().is_empty());
    assert_eq!(
        h.platform.roles_of(TARGET, SCOPE).unwrap(),
        BTreeSet::from([ROLE_A, ROLE_B])
    );

    let outcome = h.service.restrict(&ctx, "1h", "flood").await.unwrap();
    assert!(outcome.restriction.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_uncounted_threshold_restriction_stops_cascade() {
    let h = Harness::with_policy(PolicyConfig {
        threshold_restriction_counts: false,
        ..Default::default()
    });
    let ctx = h.ctx();

    for _ in 0..2 {
        h.service.restrict(&ctx, "1h", "flood").await.unwrap();
        h.service.unrestrict(&ctx, "served").await.unwrap();
    }
    for _ in 0..2 {
        h.service.warn(&ctx, "spam").await.unwrap();
    }

    let outcome = h.service.warn(&ctx, "spam").await.unwrap();
    assert_eq!(outcome.counts.restrictions, 2);
    assert_eq!(outcome.counts.removals, 0);
    assert!(matches!(
        outcome.escalations.as_slice(),
        [AppliedEscalation::Restricted { counted: false, .. }]
    ));
    assert!(h.platform.is_member(TARGET, SCOPE));
}

#[tokio::test(start_paused = true)]
async fn test_restricted_member_skips_warning_restriction() {
    let h = Harness::new();
    let ctx = h.ctx();

    h.service.restrict(&ctx, "2d", "flood").await.unwrap();
    for _ in 0..2 {
        h.service.warn(&ctx, "spam").await.unwrap();
    }

    let outcome = h.service.warn(&ctx, "spam").await.unwrap();
    assert_eq!(outcome.counts.restrictions, 1);
    assert!(matches!(
        outcome.escalations.as_slice(),
        [AppliedEscalation::Skipped {
            directive: SanctionDirective::Restrict { .. }
        }]
    ));
    assert!(!outcome.escalated());
}

#[tokio::test(start_paused = true)]
async fn test_third_restriction_command_kicks() {
    let h = Harness::new();
    let ctx = h.ctx();

    for _ in 0..2 {
        let outcome = h.service.restrict(&ctx, "30m", "flood").await.unwrap();
        assert!(outcome.escalations.is_empty());
        h.service.unrestrict(&ctx, "served").await.unwrap();
    }

    let outcome = h.service.restrict(&ctx, "30m", "flood").await.unwrap();
    assert_eq!(outcome.counts.restrictions, 3);
    assert_eq!(outcome.counts.removals, 1);
    assert!(outcome.restriction.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_second_kick_bans() {
    let h = Harness::new();
    let ctx = h.ctx();

    let first = h.service.kick(&ctx, "raid").await.unwrap();
    assert_eq!(first.counts.removals, 1);
    assert!(first.escalations.is_empty());

    h.platform.join(TARGET, SCOPE, []);
    let second = h.service.kick(&ctx, "raid again").await.unwrap();
    assert_eq!(second.counts.removals, 2);
    assert_eq!(second.counts.bans, 1);
    assert_eq!(
        second.escalations,
        vec![AppliedEscalation::Banned {
            reason: "추방 2회 누적".to_string()
        }]
    );
    assert!(h.platform.is_banned(TARGET, SCOPE));
}

#[tokio::test(start_paused = true)]
async fn test_warn_and_restrict_below_threshold_is_uncounted() {
    let h = Harness::new();
    let ctx = h.ctx();

    let outcome = h
        .service
        .warn_and_restrict(&ctx, "45m", "caps")
        .await
        .unwrap();
    assert_eq!(outcome.counts.warnings, 1);
    assert_eq!(outcome.counts.restrictions, 0);

    let record = outcome.restriction.unwrap();
    assert_eq!(record.reason, "caps");
    assert_eq!(
        record.expires_at - record.applied_at,
        chrono::Duration::minutes(45)
    );
}

#[tokio::test(start_paused = true)]
async fn test_warn_and_restrict_at_threshold_uses_threshold_restriction() {
    let h = Harness::new();
    let ctx = h.ctx();

    for _ in 0..2 {
        h.service.warn(&ctx, "spam").await.unwrap();
    }

    let outcome = h
        .service
        .warn_and_restrict(&ctx, "45m", "caps")
        .await
        .unwrap();
    assert_eq!(outcome.counts.warnings, 3);
    assert_eq!(outcome.counts.restrictions, 1);
    assert!(outcome.restriction.is_none());
    match &outcome.escalations[0] {
        AppliedEscalation::Restricted { record, .. } => {
            assert_eq!(
                record.expires_at - record.applied_at,
                chrono::Duration::days(1)
            );
        }
        other => panic!("unexpected escalation: {other:?}"),
    }
}
