//! Channel registry: the source of truth for fan-out membership.

use crate::error::RelayError;
use crate::Result;
use crosschat_core::{ChannelId, ChannelRegistration, CommunityId};
use crosschat_store::{RegistrationStore, Store};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

struct Snapshot {
    entries: Arc<Vec<ChannelRegistration>>,
    loaded_at: Instant,
}

/// Registry of destination channels over the backing store.
///
/// Active entries are cached for a bounded interval. Every write through
/// the registry invalidates the cache, so a write is visible to the next
/// read in the same process.
pub struct ChannelRegistry {
    store: Arc<dyn Store>,
    cache: RwLock<Option<Snapshot>>,
    generation: AtomicU64,
    ttl: Duration,
}

impl ChannelRegistry {
    /// Create a registry over a store with the given cache interval.
    pub fn new(store: Arc<dyn Store>, ttl: Duration) -> Self {
        Self {
            store,
            cache: RwLock::new(None),
            generation: AtomicU64::new(0),
            ttl,
        }
    }

    /// Active registrations. Fails with `RegistryUnavailable` if the store
    /// cannot be read and the cache is stale.
    pub async fn list_active(&self) -> Result<Arc<Vec<ChannelRegistration>>> {
        {
            let cache = self.cache.read().await;
            if let Some(snapshot) = cache.as_ref() {
                if snapshot.loaded_at.elapsed() < self.ttl {
                    return Ok(snapshot.entries.clone());
                }
            }
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let entries = Arc::new(
            self.store
                .list_enabled()
                .await
                .map_err(RelayError::registry_unavailable)?,
        );
        debug!(count = entries.len(), "Registry reloaded");

        let mut cache = self.cache.write().await;
        // An invalidation raced with this load; serve the result but do not cache it.
        if self.generation.load(Ordering::SeqCst) == generation {
            *cache = Some(Snapshot {
                entries: entries.clone(),
                loaded_at: Instant::now(),
            });
        }
        Ok(entries)
    }

    /// Active registration for a channel, if any.
    pub async fn active(&self, channel_id: &ChannelId) -> Result<Option<ChannelRegistration>> {
        let entries = self.list_active().await?;
        Ok(entries.iter().find(|r| &r.channel_id == channel_id).cloned())
    }

    /// Whether a channel is an active registration.
    pub async fn is_registered(&self, channel_id: &ChannelId) -> Result<bool> {
        Ok(self.active(channel_id).await?.is_some())
    }

    /// Registration for a channel, enabled or not, read from the store.
    pub async fn get(&self, channel_id: &ChannelId) -> Result<Option<ChannelRegistration>> {
        Ok(self.store.get_registration(channel_id).await?)
    }

    /// Every registration including disabled ones.
    pub async fn list_all(&self) -> Result<Vec<ChannelRegistration>> {
        Ok(self.store.list_registrations().await?)
    }

    /// Register a channel. Re-enables a disabled registration.
    pub async fn register(
        &self,
        channel_id: ChannelId,
        community_id: CommunityId,
        partner: bool,
    ) -> Result<ChannelRegistration> {
        if let Some(existing) = self.store.get_registration(&channel_id).await? {
            if existing.enabled {
                return Err(RelayError::AlreadyRegistered(channel_id));
            }
        }

        let registration = ChannelRegistration::new(channel_id, community_id, partner);
        self.store.upsert_registration(&registration).await?;
        self.invalidate().await;

        info!(
            channel_id = %registration.channel_id,
            community_id = %registration.community_id,
            partner = registration.partner,
            "Channel registered"
        );
        Ok(registration)
    }

    /// Soft-disable a channel. History stays attributable.
    pub async fn deregister(&self, channel_id: &ChannelId) -> Result<()> {
        match self.store.get_registration(channel_id).await? {
            Some(existing) if existing.enabled => {}
            _ => return Err(RelayError::NotRegistered(channel_id.clone())),
        }

        self.store.set_enabled(channel_id, false).await?;
        self.invalidate().await;

        info!(channel_id = %channel_id, "Channel deregistered");
        Ok(())
    }

    /// Physically remove every channel of a community (community-leave cleanup).
    pub async fn purge_community(&self, community_id: &CommunityId) -> Result<u64> {
        let removed = self.store.delete_community(community_id).await?;
        self.invalidate().await;

        info!(community_id = %community_id, removed, "Community purged");
        Ok(removed)
    }

    /// Flag or unflag a community as partner. Returns channels touched.
    pub async fn set_partner(&self, community_id: &CommunityId, partner: bool) -> Result<u64> {
        let touched = self
            .store
            .set_community_partner(community_id, partner)
            .await?;
        self.invalidate().await;

        info!(community_id = %community_id, partner, touched, "Partner flag updated");
        Ok(touched)
    }

    /// Drop the cached snapshot.
    pub async fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.cache.write().await = None;
    }
}
