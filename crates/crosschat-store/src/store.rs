//! Storage traits.

use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crosschat_core::{
    ChannelId, ChannelRegistration, CommunityId, CorrelationId, DeliveryRecord, PlatformMessageId,
    RelayEvent, UserId,
};

/// Channel registration collection, keyed by channel id.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Insert a registration, or overwrite the existing row for its channel.
    async fn upsert_registration(&self, registration: &ChannelRegistration) -> Result<()>;

    /// Get a registration by channel id, enabled or not.
    async fn get_registration(&self, channel_id: &ChannelId)
        -> Result<Option<ChannelRegistration>>;

    /// List every registration including disabled ones, ordered by channel id.
    async fn list_registrations(&self) -> Result<Vec<ChannelRegistration>>;

    /// List enabled registrations, ordered by channel id.
    async fn list_enabled(&self) -> Result<Vec<ChannelRegistration>> {
        let all = self.list_registrations().await?;
        Ok(all.into_iter().filter(|r| r.enabled).collect())
    }

    /// Flip the enabled flag. Returns false if the channel is unknown.
    async fn set_enabled(&self, channel_id: &ChannelId, enabled: bool) -> Result<bool>;

    /// Set the partner flag on every channel of a community. Returns rows touched.
    async fn set_community_partner(&self, community_id: &CommunityId, partner: bool)
        -> Result<u64>;

    /// Physically remove every channel of a community. Returns rows removed.
    async fn delete_community(&self, community_id: &CommunityId) -> Result<u64>;
}

/// Per-destination delivery records and retraction marks.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    /// Write a delivery record. Fails with `Conflict` if the leg was already recorded.
    async fn insert_delivery(&self, record: &DeliveryRecord) -> Result<()>;

    /// All delivery records of a relay event, ordered by destination.
    async fn deliveries_for(&self, cc_id: &CorrelationId) -> Result<Vec<DeliveryRecord>>;

    /// Mark a destination copy as deleted. Returns false if it was already marked.
    async fn mark_retracted(&self, cc_id: &CorrelationId, destination: &ChannelId)
        -> Result<bool>;

    /// Destinations already marked as deleted for a relay event.
    async fn retracted_destinations(&self, cc_id: &CorrelationId) -> Result<Vec<ChannelId>>;
}

/// Accepted relay events.
#[async_trait]
pub trait RelayEventStore: Send + Sync {
    /// Persist a relay event. Fails with a conflict if its cc_id or
    /// source message id is already known.
    async fn insert_event(&self, event: &RelayEvent) -> Result<()>;

    /// Look up a relay event by correlation id.
    async fn get_event(&self, cc_id: &CorrelationId) -> Result<Option<RelayEvent>>;

    /// Look up a relay event by the inbound platform message it came from.
    async fn find_event_by_source(
        &self,
        source_message_id: &PlatformMessageId,
    ) -> Result<Option<RelayEvent>>;

    /// Stamp an event as retracted. Returns false if it already was.
    async fn mark_event_retracted(
        &self,
        cc_id: &CorrelationId,
        retracted_by: &UserId,
        at: DateTime<Utc>,
    ) -> Result<bool>;
}

/// The full backing store used by the relay engine.
pub trait Store: RegistrationStore + DeliveryStore + RelayEventStore {}

impl<T> Store for T where T: RegistrationStore + DeliveryStore + RelayEventStore {}
