//! Relay server command.

use std::path::Path;

/// Run the relay until interrupted.
#[cfg(feature = "discord")]
pub async fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    use super::{load_config, moderation_service, open_store};
    use anyhow::Context;
    use crosschat_relay::discord::{self, DiscordHandler, DiscordPlatform};
    use crosschat_relay::RelayEngine;
    use std::sync::Arc;
    use std::time::Duration;
    use tracing::{info, warn};

    let config = load_config(config_path)?;
    let token = config
        .discord
        .as_ref()
        .context("discord.bot_token is not configured")?
        .bot_token
        .clone();

    let store = open_store(&config).await?;
    let platform = Arc::new(DiscordPlatform::new(token.expose_secret()));
    let moderation = moderation_service(&config)?;
    let engine = RelayEngine::new(&config, store, platform, moderation)?;

    let active = engine.registry().list_active().await?;
    info!(channels = active.len(), "Starting relay");

    let mut client = discord::client(token.expose_secret(), DiscordHandler::new(engine.clone()))
        .await
        .context("Failed to create Discord client")?;
    let shard_manager = client.shard_manager.clone();

    tokio::select! {
        result = client.start() => {
            if let Err(e) = result {
                warn!(error = %e, "Discord client stopped");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            shard_manager.shutdown_all().await;
        }
    }

    let grace = Duration::from_secs(config.relay.shutdown_grace_secs);
    if !engine.shutdown(grace).await {
        warn!("Some relays were abandoned at shutdown");
    }

    let stats = engine.stats();
    info!(
        received = stats.received,
        relayed = stats.relayed,
        rejected = stats.rejected,
        duplicates = stats.duplicates,
        unrecorded = stats.legs_unrecorded,
        "Relay stopped"
    );
    Ok(())
}

/// Run the relay until interrupted.
#[cfg(not(feature = "discord"))]
pub async fn run(_config_path: Option<&Path>) -> anyhow::Result<()> {
    anyhow::bail!("crosschat was built without the `discord` feature; rebuild with --features discord")
}
