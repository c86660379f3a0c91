//! Retraction command.

use super::deliveries::parse_cc_id;
use clap::Args;
use std::path::Path;

/// Retract command arguments.
#[derive(Args)]
pub struct RetractArgs {
    /// Correlation id, with or without the CC- prefix
    pub cc_id: String,

    /// Moderator recorded as having retracted the message
    #[arg(long, default_value = "cli")]
    pub by: String,
}

/// Run the retract command.
#[cfg(feature = "discord")]
pub async fn run(args: RetractArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    use super::{load_config, open_store};
    use anyhow::Context;
    use crosschat_core::UserId;
    use crosschat_relay::discord::DiscordPlatform;
    use crosschat_relay::DeliveryTracker;
    use std::sync::Arc;

    let cc_id = parse_cc_id(&args.cc_id)?;
    let config = load_config(config_path)?;
    let discord = config
        .discord
        .as_ref()
        .context("discord.bot_token is not configured")?;

    let store = open_store(&config).await?;
    let platform = Arc::new(DiscordPlatform::new(discord.bot_token.expose_secret()));
    let tracker = DeliveryTracker::new(store, platform);

    let report = tracker.retract(&cc_id, &UserId::new(args.by)).await?;
    println!(
        "{}: {} deleted, {} failed, {} already retracted",
        cc_id.tag(),
        report.destinations_succeeded,
        report.destinations_failed,
        report.already_retracted
    );
    if !report.is_complete() {
        anyhow::bail!("Retraction incomplete; run the command again to retry failed destinations");
    }
    Ok(())
}

/// Run the retract command.
#[cfg(not(feature = "discord"))]
pub async fn run(args: RetractArgs, _config_path: Option<&Path>) -> anyhow::Result<()> {
    parse_cc_id(&args.cc_id)?;
    anyhow::bail!("crosschat was built without the `discord` feature; retract needs a platform")
}
