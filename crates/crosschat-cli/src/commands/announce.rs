//! Announcement and system alert broadcasts.

use clap::Args;
use crosschat_relay::BroadcastKind;
use std::path::Path;

/// Announce command arguments.
#[derive(Args)]
pub struct AnnounceArgs {
    /// Text to send; a literal \n starts a new line
    pub message: String,

    /// Send as a system alert instead of an announcement
    #[arg(long)]
    pub alert: bool,

    /// Administrator shown as the issuer
    #[arg(long, default_value = "cli")]
    pub by: String,
}

impl AnnounceArgs {
    /// Broadcast kind selected by the flags.
    pub fn kind(&self) -> BroadcastKind {
        if self.alert {
            BroadcastKind::SystemAlert
        } else {
            BroadcastKind::Announcement
        }
    }
}

/// Run the announce command.
#[cfg(feature = "discord")]
pub async fn run(args: AnnounceArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    use super::{load_config, open_store, registry};
    use anyhow::Context;
    use crosschat_core::UserId;
    use crosschat_relay::broadcast::broadcast;
    use crosschat_relay::discord::DiscordPlatform;

    let config = load_config(config_path)?;
    let discord = config
        .discord
        .as_ref()
        .context("discord.bot_token is not configured")?;

    let store = open_store(&config).await?;
    let channels = registry(&config, store);
    let platform = DiscordPlatform::new(discord.bot_token.expose_secret());

    let report = broadcast(
        &channels,
        &platform,
        args.kind(),
        &args.message,
        &UserId::new(args.by),
    )
    .await?;

    println!("Sent to {} of {} channels", report.succeeded, report.attempted);
    if !report.failed.is_empty() {
        for channel in &report.failed {
            println!("  failed: {}", channel);
        }
        anyhow::bail!("{} channels did not receive the broadcast", report.failed.len());
    }
    Ok(())
}

/// Run the announce command.
#[cfg(not(feature = "discord"))]
pub async fn run(args: AnnounceArgs, _config_path: Option<&Path>) -> anyhow::Result<()> {
    if args.message.trim().is_empty() {
        anyhow::bail!("Nothing to broadcast");
    }
    anyhow::bail!("crosschat was built without the `discord` feature; announce needs a platform")
}
