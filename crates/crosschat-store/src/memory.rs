//! In-memory store.

use crate::store::{DeliveryStore, RegistrationStore, RelayEventStore};
use crate::{Result, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crosschat_core::{
    ChannelId, ChannelRegistration, CommunityId, CorrelationId, DeliveryRecord, PlatformMessageId,
    RelayEvent, UserId,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    registrations: BTreeMap<ChannelId, ChannelRegistration>,
    events: HashMap<CorrelationId, RelayEvent>,
    sources: HashMap<PlatformMessageId, CorrelationId>,
    deliveries: BTreeMap<(CorrelationId, ChannelId), DeliveryRecord>,
    marks: BTreeSet<(CorrelationId, ChannelId)>,
}

/// Store that keeps everything in process memory.
///
/// Nothing survives a restart. Used by tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    offline: AtomicBool,
}

impl MemoryStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a backing-store outage: every call fails with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RegistrationStore for MemoryStore {
    async fn upsert_registration(&self, registration: &ChannelRegistration) -> Result<()> {
        self.check_online()?;
        let mut tables = self.tables.write().await;
        tables
            .registrations
            .insert(registration.channel_id.clone(), registration.clone());
        Ok(())
    }

    async fn get_registration(
        &self,
        channel_id: &ChannelId,
    ) -> Result<Option<ChannelRegistration>> {
        self.check_online()?;
        let tables = self.tables.read().await;
        Ok(tables.registrations.get(channel_id).cloned())
    }

    async fn list_registrations(&self) -> Result<Vec<ChannelRegistration>> {
        self.check_online()?;
        let tables = self.tables.read().await;
        Ok(tables.registrations.values().cloned().collect())
    }

    async fn set_enabled(&self, channel_id: &ChannelId, enabled: bool) -> Result<bool> {
        self.check_online()?;
        let mut tables = self.tables.write().await;
        match tables.registrations.get_mut(channel_id) {
            Some(registration) => {
                registration.enabled = enabled;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_community_partner(
        &self,
        community_id: &CommunityId,
        partner: bool,
    ) -> Result<u64> {
        self.check_online()?;
        let mut tables = self.tables.write().await;
        let mut touched = 0;
        for registration in tables.registrations.values_mut() {
            if &registration.community_id == community_id {
                registration.partner = partner;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn delete_community(&self, community_id: &CommunityId) -> Result<u64> {
        self.check_online()?;
        let mut tables = self.tables.write().await;
        let before = tables.registrations.len();
        tables
            .registrations
            .retain(|_, registration| &registration.community_id != community_id);
        Ok((before - tables.registrations.len()) as u64)
    }
}

#[async_trait]
impl DeliveryStore for MemoryStore {
    async fn insert_delivery(&self, record: &DeliveryRecord) -> Result<()> {
        self.check_online()?;
        let mut tables = self.tables.write().await;
        let key = (record.cc_id.clone(), record.destination_channel_id.clone());
        if tables.deliveries.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "delivery {} -> {} already recorded",
                record.cc_id, record.destination_channel_id
            )));
        }
        tables.deliveries.insert(key, record.clone());
        Ok(())
    }

    async fn deliveries_for(&self, cc_id: &CorrelationId) -> Result<Vec<DeliveryRecord>> {
        self.check_online()?;
        let tables = self.tables.read().await;
        Ok(tables
            .deliveries
            .iter()
            .filter(|((cc, _), _)| cc == cc_id)
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn mark_retracted(
        &self,
        cc_id: &CorrelationId,
        destination: &ChannelId,
    ) -> Result<bool> {
        self.check_online()?;
        let mut tables = self.tables.write().await;
        Ok(tables.marks.insert((cc_id.clone(), destination.clone())))
    }

    async fn retracted_destinations(&self, cc_id: &CorrelationId) -> Result<Vec<ChannelId>> {
        self.check_online()?;
        let tables = self.tables.read().await;
        Ok(tables
            .marks
            .iter()
            .filter(|(cc, _)| cc == cc_id)
            .map(|(_, channel)| channel.clone())
            .collect())
    }
}

#[async_trait]
impl RelayEventStore for MemoryStore {
    async fn insert_event(&self, event: &RelayEvent) -> Result<()> {
        self.check_online()?;
        let mut tables = self.tables.write().await;
        if tables.events.contains_key(&event.cc_id) {
            return Err(StoreError::Conflict(format!("cc_id {} already exists", event.cc_id)));
        }
        if tables.sources.contains_key(&event.source_message_id) {
            return Err(StoreError::Conflict(format!(
                "source message {} already relayed",
                event.source_message_id
            )));
        }
        tables
            .sources
            .insert(event.source_message_id.clone(), event.cc_id.clone());
        tables.events.insert(event.cc_id.clone(), event.clone());
        Ok(())
    }

    async fn get_event(&self, cc_id: &CorrelationId) -> Result<Option<RelayEvent>> {
        self.check_online()?;
        let tables = self.tables.read().await;
        Ok(tables.events.get(cc_id).cloned())
    }

    async fn find_event_by_source(
        &self,
        source_message_id: &PlatformMessageId,
    ) -> Result<Option<RelayEvent>> {
        self.check_online()?;
        let tables = self.tables.read().await;
        Ok(tables
            .sources
            .get(source_message_id)
            .and_then(|cc_id| tables.events.get(cc_id))
            .cloned())
    }

    async fn mark_event_retracted(
        &self,
        cc_id: &CorrelationId,
        retracted_by: &UserId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.check_online()?;
        let mut tables = self.tables.write().await;
        match tables.events.get_mut(cc_id) {
            Some(event) if event.retracted_at.is_none() => {
                event.retracted_at = Some(at);
                event.retracted_by = Some(retracted_by.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
