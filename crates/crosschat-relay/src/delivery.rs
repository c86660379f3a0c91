//! Delivery records and bulk retraction.

use crate::error::{DeleteError, RelayError};
use crate::traits::PlatformSender;
use crate::Result;
use chrono::Utc;
use crosschat_core::{CorrelationId, DeliveryOutcome, DeliveryRecord, UserId};
use crosschat_store::{DeliveryStore, RelayEventStore, Store};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one retraction call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetractionReport {
    /// Correlation id that was retracted.
    pub cc_id: Option<CorrelationId>,

    /// Deletes issued by this call.
    pub destinations_attempted: usize,

    /// Deletes that succeeded (or found the copy already gone).
    pub destinations_succeeded: usize,

    /// Deletes that failed and remain outstanding.
    pub destinations_failed: usize,

    /// Copies deleted by an earlier call and not attempted again.
    pub already_retracted: usize,
}

impl RetractionReport {
    /// Whether every delivered copy is now gone.
    pub fn is_complete(&self) -> bool {
        self.destinations_failed == 0
    }
}

/// Records per-destination outcomes and retracts relay events.
///
/// Works from the backing store alone, so retraction survives restarts.
pub struct DeliveryTracker {
    store: Arc<dyn Store>,
    platform: Arc<dyn PlatformSender>,
}

impl DeliveryTracker {
    /// Create a tracker.
    pub fn new(store: Arc<dyn Store>, platform: Arc<dyn PlatformSender>) -> Self {
        Self { store, platform }
    }

    /// Persist one delivery record.
    pub async fn record(&self, record: &DeliveryRecord) -> Result<()> {
        self.store.insert_delivery(record).await?;
        Ok(())
    }

    /// Every delivery record of a relay event.
    pub async fn find_by_correlation(&self, cc_id: &CorrelationId) -> Result<Vec<DeliveryRecord>> {
        Ok(self.store.deliveries_for(cc_id).await?)
    }

    /// Delete every delivered copy of a relay event.
    ///
    /// Per-destination failures are counted, not fatal. Copies deleted by an
    /// earlier call are skipped, so repeating a complete retraction reports
    /// zero new deletions.
    pub async fn retract(&self, cc_id: &CorrelationId, retracted_by: &UserId) -> Result<RetractionReport> {
        if self.store.get_event(cc_id).await?.is_none() {
            return Err(RelayError::not_found(format!("cc_id {}", cc_id.tag())));
        }

        let records = self.store.deliveries_for(cc_id).await?;
        let done: HashSet<_> = self
            .store
            .retracted_destinations(cc_id)
            .await?
            .into_iter()
            .collect();

        let mut report = RetractionReport {
            cc_id: Some(cc_id.clone()),
            ..Default::default()
        };

        let mut pending = Vec::new();
        for record in &records {
            let message_id = match (&record.outcome, &record.platform_message_id) {
                (DeliveryOutcome::Success, Some(id)) => id,
                _ => continue,
            };
            if done.contains(&record.destination_channel_id) {
                report.already_retracted += 1;
                continue;
            }
            pending.push((record.destination_channel_id.clone(), message_id.clone()));
        }

        report.destinations_attempted = pending.len();

        let deletes = pending.iter().map(|(channel, message_id)| async move {
            let result = self.platform.delete(channel, message_id).await;
            (channel, result)
        });

        for (channel, result) in join_all(deletes).await {
            match result {
                Ok(()) | Err(DeleteError::NotFound) => {
                    self.store.mark_retracted(cc_id, channel).await?;
                    report.destinations_succeeded += 1;
                }
                Err(e) => {
                    warn!(cc_id = %cc_id, channel_id = %channel, error = %e, "Retraction delete failed");
                    report.destinations_failed += 1;
                }
            }
        }

        self.store
            .mark_event_retracted(cc_id, retracted_by, Utc::now())
            .await?;

        info!(
            cc_id = %cc_id,
            attempted = report.destinations_attempted,
            succeeded = report.destinations_succeeded,
            failed = report.destinations_failed,
            already = report.already_retracted,
            "Retraction finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePlatform;
    use crosschat_core::{ChannelId, RelayEvent, Tier};
    use crosschat_store::MemoryStore;

    async fn seeded(store: &MemoryStore, cc: &CorrelationId) {
        store
            .insert_event(&RelayEvent {
                cc_id: cc.clone(),
                source_message_id: "src-msg".into(),
                source_channel_id: "src".into(),
                community_id: "g0".into(),
                community_name: "Guild".to_string(),
                author_id: "author".into(),
                author_display: "Author".to_string(),
                tier: Tier::Regular,
                content: "hi".to_string(),
                created_at: Utc::now(),
                retracted_at: None,
                retracted_by: None,
            })
            .await
            .unwrap();
        for (channel, message) in [("a", "pm-a"), ("b", "pm-b"), ("c", "pm-c")] {
            store
                .insert_delivery(&DeliveryRecord::success(cc.clone(), channel.into(), message.into(), 1))
                .await
                .unwrap();
        }
        store
            .insert_delivery(&DeliveryRecord::failed(cc.clone(), "d".into(), "boom", 2))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_retract_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let platform = Arc::new(FakePlatform::new());
        let cc = CorrelationId::mint();
        seeded(&store, &cc).await;

        // One copy was already removed by a channel moderator.
        platform.mark_missing("b");

        let tracker = DeliveryTracker::new(store.clone(), platform.clone());
        let admin = UserId::new("admin");

        let first = tracker.retract(&cc, &admin).await.unwrap();
        assert_eq!(first.destinations_attempted, 3);
        assert_eq!(first.destinations_succeeded, 3);
        assert_eq!(first.destinations_failed, 0);
        assert!(first.is_complete());

        let second = tracker.retract(&cc, &admin).await.unwrap();
        assert_eq!(second.destinations_attempted, 0);
        assert_eq!(second.destinations_succeeded, 0);
        assert_eq!(second.already_retracted, 3);

        assert_eq!(platform.deleted().len(), 2);
        assert!(store.get_event(&cc).await.unwrap().unwrap().is_retracted());
    }

    #[tokio::test]
    async fn test_partial_retraction_is_reported() {
        let store = Arc::new(MemoryStore::new());
        let platform = Arc::new(FakePlatform::new());
        let cc = CorrelationId::mint();
        seeded(&store, &cc).await;
        platform.mark_forbidden("c");

        let tracker = DeliveryTracker::new(store.clone(), platform.clone());
        let admin = UserId::new("admin");

        let first = tracker.retract(&cc, &admin).await.unwrap();
        assert_eq!(first.destinations_succeeded, 2);
        assert_eq!(first.destinations_failed, 1);
        assert!(!first.is_complete());

        // Permission restored: only the outstanding copy is attempted.
        platform.clear_forbidden("c");
        let second = tracker.retract(&cc, &admin).await.unwrap();
        assert_eq!(second.destinations_attempted, 1);
        assert_eq!(second.destinations_succeeded, 1);
        assert_eq!(second.already_retracted, 2);
        assert_eq!(
            store.retracted_destinations(&cc).await.unwrap(),
            vec![ChannelId::new("a"), ChannelId::new("b"), ChannelId::new("c")]
        );
    }

    #[tokio::test]
    async fn test_unknown_correlation_id() {
        let tracker = DeliveryTracker::new(Arc::new(MemoryStore::new()), Arc::new(FakePlatform::new()));
        let err = tracker
            .retract(&CorrelationId::mint(), &UserId::new("admin"))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::NotFound(_)));
    }
}
