//! End-to-end relay scenarios over the SQLite store.

use crosschat_core::{DeliveryOutcome, UserId};
use crosschat_integration_tests::{message, test_config, Relay};
use crosschat_relay::{
    BroadcastKind, Reaction, RejectReason, RelayError, RelayOutcome, RelaySummary,
};
use crosschat_store::{DeliveryStore, RelayEventStore, SqliteStore};
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

fn recorded(outcome: RelayOutcome) -> RelaySummary {
    match outcome {
        RelayOutcome::Recorded(summary) => summary,
        other => panic!("expected Recorded, got {:?}", other),
    }
}

#[tokio::test]
async fn test_elite_message_reaches_every_other_channel() {
    let relay = Relay::in_memory().await;
    relay.register_channels(10).await;

    let start = Instant::now();
    let summary = recorded(
        relay
            .engine
            .handle(message("m1", "c0", "ana", &["elite"]))
            .await
            .unwrap(),
    );

    assert!(start.elapsed() >= Duration::from_millis(10));
    assert_eq!(summary.succeeded, 9);

    let records = relay.store.deliveries_for(&summary.cc_id).await.unwrap();
    assert_eq!(records.len(), 9);
    assert!(records
        .iter()
        .all(|r| r.outcome == DeliveryOutcome::Success && r.platform_message_id.is_some()));

    let footer = summary.cc_id.tag();
    assert!(relay.platform.sent().iter().all(|s| s.footer.starts_with(&footer)));
}

#[tokio::test]
async fn test_banned_author_produces_no_records() {
    let relay = Relay::in_memory().await;
    relay.register_channels(5).await;
    relay.moderation.ban("mallory");

    let outcome = relay
        .engine
        .handle(message("m1", "c0", "mallory", &["elite"]))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        RelayOutcome::Rejected {
            reason: RejectReason::Banned
        }
    );
    assert!(relay.platform.sent().is_empty());
    assert!(relay
        .store
        .find_event_by_source(&"m1".into())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_banned_community_is_rejected() {
    let relay = Relay::in_memory().await;
    relay.register_channels(3).await;
    relay.moderation.ban_community("g1");

    let outcome = relay.engine.handle(message("m1", "c1", "bob", &[])).await.unwrap();
    assert_eq!(
        outcome,
        RelayOutcome::Rejected {
            reason: RejectReason::ServerBanned
        }
    );
}

#[tokio::test]
async fn test_unreachable_destination_does_not_block_others() {
    let relay = Relay::in_memory().await;
    relay.register_channels(10).await;
    relay.platform.fail_always("c4");

    let summary = recorded(relay.engine.handle(message("m1", "c0", "bob", &[])).await.unwrap());
    assert_eq!(summary.succeeded, 8);
    assert_eq!(summary.failed, 1);

    let records = relay.store.deliveries_for(&summary.cc_id).await.unwrap();
    assert_eq!(records.len(), 9);
    let failed: Vec<_> = records
        .iter()
        .filter(|r| r.outcome == DeliveryOutcome::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].destination_channel_id.as_str(), "c4");
    assert_eq!(failed[0].attempts, 2);
}

#[tokio::test]
async fn test_concurrent_duplicates_fan_out_once() {
    let relay = Relay::in_memory().await;
    relay.register_channels(4).await;

    let handles: Vec<_> = (0..5)
        .map(|_| relay.engine.spawn(message("m1", "c0", "bob", &[])).unwrap())
        .collect();

    let mut recorded_count = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            RelayOutcome::Recorded(_) => recorded_count += 1,
            RelayOutcome::Duplicate => {}
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    assert_eq!(recorded_count, 1);
    assert_eq!(relay.platform.sent().len(), 3);
    assert_eq!(relay.engine.stats().duplicates, 4);
}

#[tokio::test]
async fn test_retraction_is_idempotent() {
    let relay = Relay::in_memory().await;
    relay.register_channels(4).await;
    relay.platform.mark_forbidden("c2");

    let summary = recorded(relay.engine.handle(message("m1", "c0", "bob", &[])).await.unwrap());
    let admin = UserId::new("admin");

    let first = relay.engine.retract(&summary.cc_id, &admin).await.unwrap();
    assert_eq!(first.destinations_attempted, 3);
    assert_eq!(first.destinations_succeeded, 2);
    assert_eq!(first.destinations_failed, 1);

    relay.platform.clear_forbidden("c2");
    let second = relay.engine.retract(&summary.cc_id, &admin).await.unwrap();
    assert_eq!(second.destinations_attempted, 1);
    assert_eq!(second.destinations_succeeded, 1);
    assert!(second.is_complete());

    let third = relay.engine.retract(&summary.cc_id, &admin).await.unwrap();
    assert_eq!(third.destinations_attempted, 0);
    assert_eq!(third.destinations_succeeded, 0);
    assert_eq!(third.already_retracted, 3);
    assert_eq!(relay.platform.deleted().len(), 3);

    let event = relay.store.get_event(&summary.cc_id).await.unwrap().unwrap();
    assert!(event.is_retracted());
    assert_eq!(event.retracted_by, Some(admin));
}

#[tokio::test]
async fn test_retract_unknown_correlation_id() {
    let relay = Relay::in_memory().await;
    let err = relay
        .engine
        .retract(&crosschat_core::CorrelationId::mint(), &UserId::new("admin"))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::NotFound(_)));
}

#[tokio::test]
async fn test_deregistered_channel_receives_nothing() {
    let relay = Relay::in_memory().await;
    relay.register_channels(4).await;
    relay.engine.registry().deregister(&"c3".into()).await.unwrap();

    let summary = recorded(relay.engine.handle(message("m1", "c0", "bob", &[])).await.unwrap());
    assert_eq!(summary.total(), 2);
    assert!(relay
        .platform
        .sent()
        .iter()
        .all(|s| s.channel.as_str() != "c3"));

    // Messages from a deregistered channel are ignored.
    let outcome = relay.engine.handle(message("m2", "c3", "bob", &[])).await.unwrap();
    assert!(matches!(outcome, RelayOutcome::Ignored(_)));
}

#[tokio::test]
async fn test_redelivery_after_restart_is_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    let url = dir.path().join("crosschat.db").to_string_lossy().to_string();

    {
        let store = Arc::new(SqliteStore::connect(&url).await.unwrap());
        let relay = Relay::over(store.clone(), &test_config());
        relay.register_channels(3).await;
        recorded(relay.engine.handle(message("m1", "c0", "bob", &[])).await.unwrap());
        store.close().await;
    }

    let store = Arc::new(SqliteStore::connect(&url).await.unwrap());
    let relay = Relay::over(store, &test_config());
    let outcome = relay.engine.handle(message("m1", "c0", "bob", &[])).await.unwrap();
    assert_eq!(outcome, RelayOutcome::Duplicate);
    assert!(relay.platform.sent().is_empty());

    // Registrations survived too.
    let summary = recorded(relay.engine.handle(message("m2", "c0", "bob", &[])).await.unwrap());
    assert_eq!(summary.succeeded, 2);
}

#[tokio::test]
async fn test_edit_reaches_delivered_copies() {
    let relay = Relay::in_memory().await;
    relay.register_channels(3).await;
    recorded(relay.engine.handle(message("m1", "c0", "bob", &[])).await.unwrap());

    let report = relay
        .engine
        .propagate_edit(&"m1".into(), "corrected text")
        .await
        .unwrap();
    assert_eq!(report.attempted, 2);
    assert_eq!(report.succeeded, 2);
    assert!(relay
        .platform
        .edits()
        .iter()
        .all(|(_, _, content)| content.ends_with("corrected text")));
}

#[tokio::test]
async fn test_author_sees_outcome_reactions() {
    let relay = Relay::in_memory().await;
    relay.register_channels(3).await;
    relay.moderation.ban("mallory");

    recorded(relay.engine.handle(message("m1", "c0", "bob", &[])).await.unwrap());
    relay.engine.handle(message("m2", "c1", "mallory", &[])).await.unwrap();

    assert_eq!(relay.platform.reactions("m1"), vec![Reaction::Delivered]);
    assert_eq!(relay.platform.reactions("m2"), vec![Reaction::Banned]);
}

#[tokio::test]
async fn test_announcement_is_not_recorded_as_relay() {
    let relay = Relay::in_memory().await;
    relay.register_channels(3).await;

    let report = relay
        .engine
        .broadcast(
            BroadcastKind::Announcement,
            "Welcome to the network",
            &UserId::new("admin"),
        )
        .await
        .unwrap();
    assert_eq!(report.succeeded, 3);
    assert!(report.failed.is_empty());

    let stats = relay.engine.stats();
    assert_eq!(stats.received, 0);
    assert_eq!(stats.relayed, 0);
}
