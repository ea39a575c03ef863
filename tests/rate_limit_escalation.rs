use crate::common::TestShield;
use abuse_shield::notify::NotifyKind;
use abuse_shield::security::{RateDecision, SYSTEM_ACTOR};
use chrono::TimeDelta;

mod common;

const ADDR: &str = "1.2.3.4";

/// Use up the FREE allowance, then send one more. Returns that last decision.
async fn breach_free_window(t: &TestShield) -> anyhow::Result<RateDecision> {
    for _ in 0..50 {
        let decision = t
            .shield
            .rate_limiter
            .check(ADDR, "/ping", Some("FREE"))
            .await?;
        assert!(decision.is_allowed());
    }
    Ok(t
        .shield
        .rate_limiter
        .check(ADDR, "/ping", Some("FREE"))
        .await?)
}

#[tokio::test]
async fn test_normal_traffic_is_allowed() -> anyhow::Result<()> {
    let t = TestShield::new();

    for _ in 0..10 {
        let decision = t
            .shield
            .rate_limiter
            .check(ADDR, "/ping", Some("FREE"))
            .await?;
        assert!(decision.is_allowed());
        t.clock.advance(TimeDelta::seconds(5));
    }

    assert_eq!(t.store.violation_count(ADDR), 0);
    Ok(())
}

#[tokio::test]
async fn test_fifty_first_request_is_denied() -> anyhow::Result<()> {
    let t = TestShield::new();

    match breach_free_window(&t).await? {
        RateDecision::Deny(denial) => {
            assert_eq!(
                denial.message,
                "Rate limit exceeded for free tier. Upgrade for higher limits."
            );
            assert!(!denial.escalated);
        }
        other => panic!("expected deny, got {other:?}"),
    }

    assert_eq!(t.store.violation_count(ADDR), 1);
    assert!(!t.shield.registry.is_blocked(ADDR));
    Ok(())
}

#[tokio::test]
async fn test_three_breached_windows_escalate() -> anyhow::Result<()> {
    let t = TestShield::new();

    for window in 0..3 {
        let decision = breach_free_window(&t).await?;
        let RateDecision::Deny(denial) = decision else {
            panic!("window {window}: expected deny");
        };
        assert_eq!(denial.escalated, window == 2);
        t.clock.advance(TimeDelta::minutes(15));
    }

    assert_eq!(t.store.violation_count(ADDR), 3);
    assert!(t.shield.registry.is_blocked(ADDR));

    let record = t.store.block_record(ADDR).unwrap();
    assert_eq!(record.blocked_by, SYSTEM_ACTOR);
    assert_eq!(
        record.reason.as_deref(),
        Some("automatic: repeated rate-limit violations")
    );
    assert_eq!(t.sink.count(NotifyKind::Escalated), 1);
    Ok(())
}

#[tokio::test]
async fn test_two_denials_do_not_escalate() -> anyhow::Result<()> {
    let t = TestShield::new();

    for _ in 0..2 {
        assert!(!breach_free_window(&t).await?.is_allowed());
        t.clock.advance(TimeDelta::minutes(15));
    }

    assert!(!t.shield.registry.is_blocked(ADDR));
    assert!(t.sink.received().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_violations_older_than_a_day_do_not_count() -> anyhow::Result<()> {
    let t = TestShield::new();

    for _ in 0..2 {
        breach_free_window(&t).await?;
        t.clock.advance(TimeDelta::minutes(15));
    }
    t.clock.advance(TimeDelta::hours(24));

    breach_free_window(&t).await?;
    assert!(!t.shield.registry.is_blocked(ADDR));
    Ok(())
}

#[tokio::test]
async fn test_unknown_tier_uses_default_window() -> anyhow::Result<()> {
    let t = TestShield::new();

    for _ in 0..100 {
        let decision = t
            .shield
            .rate_limiter
            .check(ADDR, "/ping", Some("PLATINUM"))
            .await?;
        assert!(decision.is_allowed());
    }
    let decision = t
        .shield
        .rate_limiter
        .check(ADDR, "/ping", Some("PLATINUM"))
        .await?;
    assert!(!decision.is_allowed());
    Ok(())
}

#[tokio::test]
async fn test_higher_tiers_allow_more() -> anyhow::Result<()> {
    let t = TestShield::new();

    for _ in 0..1000 {
        let decision = t
            .shield
            .rate_limiter
            .check("5.6.7.8", "/ping", Some("PREMIUM"))
            .await?;
        assert!(decision.is_allowed());
    }
    let decision = t
        .shield
        .rate_limiter
        .check("5.6.7.8", "/ping", Some("PREMIUM"))
        .await?;
    assert!(!decision.is_allowed());
    Ok(())
}
