use crate::common::TestShield;
use abuse_shield::ShieldError;
use abuse_shield::notify::NotifyKind;
use abuse_shield::security::{Clock, SYSTEM_ACTOR};
use chrono::TimeDelta;

mod common;

#[tokio::test]
async fn test_five_failed_attempts_block_for_a_day() -> anyhow::Result<()> {
    let t = TestShield::new();
    let registry = &t.shield.registry;

    for _ in 0..4 {
        assert!(!registry.record_failed_attempt("1.2.3.4").await?);
    }
    assert!(!registry.is_blocked("1.2.3.4"));

    assert!(registry.record_failed_attempt("1.2.3.4").await?);
    assert!(registry.is_blocked("1.2.3.4"));

    let record = t.store.block_record("1.2.3.4").unwrap();
    assert_eq!(record.blocked_by, SYSTEM_ACTOR);
    assert_eq!(
        record.reason.as_deref(),
        Some("automatic: repeated failed attempts")
    );
    assert_eq!(record.expires_at, Some(t.clock.now() + TimeDelta::hours(24)));
    assert_eq!(t.sink.count(NotifyKind::Escalated), 1);
    Ok(())
}

#[tokio::test]
async fn test_four_failed_attempts_do_not_block() -> anyhow::Result<()> {
    let t = TestShield::new();

    for _ in 0..4 {
        t.shield.registry.record_failed_attempt("1.2.3.4").await?;
    }

    assert!(!t.shield.registry.is_blocked("1.2.3.4"));
    assert!(t.sink.received().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failed_attempts_outside_lookback_are_ignored() -> anyhow::Result<()> {
    let t = TestShield::new();
    let registry = &t.shield.registry;

    for _ in 0..4 {
        registry.record_failed_attempt("1.2.3.4").await?;
    }
    t.clock.advance(TimeDelta::hours(25));

    assert!(!registry.record_failed_attempt("1.2.3.4").await?);
    assert!(!registry.is_blocked("1.2.3.4"));
    Ok(())
}

#[tokio::test]
async fn test_block_is_idempotent() -> anyhow::Result<()> {
    let t = TestShield::new();
    let registry = &t.shield.registry;

    registry
        .block("1.2.3.4", "admin", Some("spam".into()), None)
        .await?;
    let later = t.clock.now() + TimeDelta::hours(2);
    registry
        .block("1.2.3.4", "admin", Some("more spam".into()), Some(later))
        .await?;

    assert_eq!(t.store.block_record_count(), 1);
    let record = t.store.block_record("1.2.3.4").unwrap();
    assert!(record.is_active);
    assert_eq!(record.reason.as_deref(), Some("more spam"));
    assert_eq!(record.expires_at, Some(later));
    assert!(registry.is_blocked("1.2.3.4"));
    Ok(())
}

#[tokio::test]
async fn test_unblock_of_unknown_address_is_silent() -> anyhow::Result<()> {
    let t = TestShield::new();

    assert!(!t.shield.registry.unblock("8.8.8.8").await?);
    assert!(!t.shield.registry.unblock("8.8.8.8").await?);
    assert!(t.sink.received().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_manual_unblock_before_expiry() -> anyhow::Result<()> {
    let t = TestShield::new();
    let registry = &t.shield.registry;

    registry
        .block(
            "1.2.3.4",
            "admin",
            None,
            Some(t.clock.now() + TimeDelta::hours(24)),
        )
        .await?;
    assert!(registry.is_blocked("1.2.3.4"));

    registry.unblock("1.2.3.4").await?;
    assert!(!registry.is_blocked("1.2.3.4"));

    // The record survives, inactive.
    let record = t.store.block_record("1.2.3.4").unwrap();
    assert!(!record.is_active);
    Ok(())
}

#[tokio::test]
async fn test_block_then_unblock_in_order() -> anyhow::Result<()> {
    let t = TestShield::new();
    let registry = &t.shield.registry;

    for _ in 0..3 {
        registry.block("1.2.3.4", "admin", None, None).await?;
        assert!(registry.is_blocked("1.2.3.4"));
        registry.unblock("1.2.3.4").await?;
        assert!(!registry.is_blocked("1.2.3.4"));
    }
    Ok(())
}

#[tokio::test]
async fn test_sweep_lifts_only_expired_blocks() -> anyhow::Result<()> {
    let t = TestShield::new();
    let registry = &t.shield.registry;
    let now = t.clock.now();

    registry
        .block("10.0.0.1", "admin", None, Some(now + TimeDelta::minutes(5)))
        .await?;
    registry
        .block("10.0.0.2", "admin", None, Some(now + TimeDelta::hours(5)))
        .await?;
    registry.block("10.0.0.3", "admin", None, None).await?;

    // Expired blocks still deny until the sweep runs.
    t.clock.advance(TimeDelta::minutes(6));
    assert!(registry.is_blocked("10.0.0.1"));

    assert_eq!(registry.sweep_expired().await?, 1);
    assert!(!registry.is_blocked("10.0.0.1"));
    assert!(registry.is_blocked("10.0.0.2"));
    assert!(registry.is_blocked("10.0.0.3"));
    assert_eq!(t.sink.count(NotifyKind::Unblocked), 1);

    // Nothing left to do on the next pass.
    assert_eq!(registry.sweep_expired().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_sweep_failure_is_transient() -> anyhow::Result<()> {
    let t = TestShield::new();
    let registry = &t.shield.registry;

    registry
        .block(
            "10.0.0.1",
            "admin",
            None,
            Some(t.clock.now() + TimeDelta::minutes(1)),
        )
        .await?;
    t.clock.advance(TimeDelta::minutes(2));

    t.store.set_failing(true);
    assert!(matches!(
        registry.sweep_expired().await,
        Err(ShieldError::TransientStore(_))
    ));
    assert!(registry.is_blocked("10.0.0.1"));

    t.store.set_failing(false);
    assert_eq!(registry.sweep_expired().await?, 1);
    assert!(!registry.is_blocked("10.0.0.1"));
    Ok(())
}

#[tokio::test]
async fn test_unblock_failure_keeps_block() -> anyhow::Result<()> {
    let t = TestShield::new();
    let registry = &t.shield.registry;

    registry.block("1.2.3.4", "admin", None, None).await?;
    t.store.set_failing(true);

    assert!(matches!(
        registry.unblock("1.2.3.4").await,
        Err(ShieldError::Persistence(_))
    ));
    assert!(registry.is_blocked("1.2.3.4"));
    Ok(())
}
