//! CLI command implementations.

pub mod announce;
pub mod channels;
pub mod config;
pub mod deliveries;
pub mod doctor;
pub mod retract;
pub mod serve;

use anyhow::Context;
use crosschat_core::Config;
use crosschat_relay::{ChannelRegistry, HttpModerationClient, ModerationService, Unmoderated};
use crosschat_store::Store;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Load and validate configuration.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = Config::resolve(path).context("Failed to load configuration")?;
    config.validate()?;
    Ok(config)
}

/// Open the configured store.
pub async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    crosschat_store::open(&config.store.database_url)
        .await
        .with_context(|| format!("Failed to open store at {}", config.store.database_url))
}

/// Registry over the configured store.
pub fn registry(config: &Config, store: Arc<dyn Store>) -> ChannelRegistry {
    ChannelRegistry::new(
        store,
        Duration::from_secs(config.relay.registry_cache_ttl_secs),
    )
}

/// Moderation service for the configured endpoint.
///
/// Running without one must be requested with `moderation.disabled`.
pub fn moderation_service(config: &Config) -> anyhow::Result<Arc<dyn ModerationService>> {
    match &config.moderation.endpoint {
        Some(endpoint) => {
            let client = HttpModerationClient::new(
                endpoint.clone(),
                Duration::from_millis(config.moderation.timeout_ms),
            )?;
            Ok(Arc::new(client))
        }
        None if config.moderation.disabled => {
            warn!("Moderation disabled by configuration, ban checks are off");
            Ok(Arc::new(Unmoderated))
        }
        None => anyhow::bail!(
            "moderation.endpoint is not configured; set it, or set moderation.disabled to relay without ban checks"
        ),
    }
}
