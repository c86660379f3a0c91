//! Shared fixtures for the integration tests.

use crosschat_core::{Config, RoleId};
use crosschat_relay::testing::{FakePlatform, ScriptedModeration};
use crosschat_relay::{InboundAuthor, InboundEvent, RelayEngine};
use crosschat_store::{SqliteStore, Store};
use std::sync::Arc;

/// Configuration with one elite and one architect role and short delays.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.store.database_url = ":memory:".to_string();
    config.relay.tier_delays_ms.elite_vip = 10;
    config.relay.tier_delays_ms.architect_vip = 20;
    config.relay.tier_delays_ms.partner = 30;
    config.relay.tier_delays_ms.regular = 40;
    config.relay.retry_backoff_ms = 20;
    config.roles.elite_vip_role_ids = vec!["elite".to_string()];
    config.roles.architect_vip_role_ids = vec!["architect".to_string()];
    config
}

/// An engine over a store with fakes at the platform and moderation seams.
pub struct Relay {
    pub engine: RelayEngine,
    pub store: Arc<SqliteStore>,
    pub platform: Arc<FakePlatform>,
    pub moderation: Arc<ScriptedModeration>,
}

impl Relay {
    /// Build over an existing store.
    pub fn over(store: Arc<SqliteStore>, config: &Config) -> Self {
        let platform = Arc::new(FakePlatform::new());
        let moderation = Arc::new(ScriptedModeration::new());
        let engine = RelayEngine::new(
            config,
            store.clone() as Arc<dyn Store>,
            platform.clone(),
            moderation.clone(),
        )
        .unwrap();
        Self {
            engine,
            store,
            platform,
            moderation,
        }
    }

    /// Build over a fresh in-memory SQLite store.
    pub async fn in_memory() -> Self {
        let store = Arc::new(SqliteStore::connect(":memory:").await.unwrap());
        Self::over(store, &test_config())
    }

    /// Register channels `c0..cN`, each in its own community `gI`.
    pub async fn register_channels(&self, count: usize) {
        for i in 0..count {
            self.engine
                .registry()
                .register(format!("c{}", i).into(), format!("g{}", i).into(), false)
                .await
                .unwrap();
        }
    }
}

/// A message posted in `channel` by `author`.
pub fn message(id: &str, channel: &str, author: &str, roles: &[&str]) -> InboundEvent {
    InboundEvent {
        platform_message_id: id.into(),
        source_channel_id: channel.into(),
        community_id: format!("g{}", channel.trim_start_matches('c')).into(),
        community_name: "Origin".to_string(),
        author: InboundAuthor {
            id: author.into(),
            display_name: author.to_string(),
            is_bot: false,
            roles: roles.iter().map(|r| RoleId::new(*r)).collect(),
        },
        content: format!("message {}", id),
        attachments: Vec::new(),
    }
}
