//! Channel registration commands.

use super::{load_config, open_store, registry};
use clap::Args;
use crosschat_core::{ChannelId, CommunityId};
use crosschat_relay::ChannelRegistry;
use std::path::Path;

/// Channels command arguments.
#[derive(Args)]
pub struct ChannelsArgs {
    #[command(subcommand)]
    pub command: ChannelsCommand,
}

#[derive(clap::Subcommand)]
pub enum ChannelsCommand {
    /// List registrations
    List {
        /// Include disabled registrations
        #[arg(short, long)]
        all: bool,
    },

    /// Register a channel in the relay namespace
    Register {
        /// Channel id
        channel: String,

        /// Community owning the channel
        #[arg(long)]
        community: String,

        /// Mark the community as a partner
        #[arg(long)]
        partner: bool,
    },

    /// Stop relaying to and from a channel
    Deregister {
        /// Channel id
        channel: String,
    },

    /// Remove every registration of a community
    Purge {
        /// Community id
        community: String,
    },

    /// Set or clear the partner flag of a community
    Partner {
        /// Community id
        community: String,

        /// Clear the flag instead of setting it
        #[arg(long)]
        off: bool,
    },
}

/// Run the channels command.
pub async fn run(args: ChannelsArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config).await?;
    let registry = registry(&config, store);
    execute(args.command, &registry).await
}

/// Execute a channels command against a registry.
pub async fn execute(command: ChannelsCommand, registry: &ChannelRegistry) -> anyhow::Result<()> {
    match command {
        ChannelsCommand::List { all } => {
            let mut entries = registry.list_all().await?;
            if !all {
                entries.retain(|r| r.enabled);
            }

            if entries.is_empty() {
                println!("No channels registered.");
                return Ok(());
            }

            println!(
                "  {:<22} {:<22} {:<9} {:<8} {}",
                "CHANNEL", "COMMUNITY", "STATUS", "PARTNER", "REGISTERED"
            );
            println!("  {}", "-".repeat(80));
            for entry in entries {
                println!(
                    "  {:<22} {:<22} {:<9} {:<8} {}",
                    entry.channel_id,
                    entry.community_id,
                    if entry.enabled { "enabled" } else { "disabled" },
                    if entry.partner { "yes" } else { "no" },
                    entry.registered_at.format("%Y-%m-%d %H:%M")
                );
            }
        }

        ChannelsCommand::Register {
            channel,
            community,
            partner,
        } => {
            let entry = registry
                .register(ChannelId::new(channel), CommunityId::new(community), partner)
                .await?;
            println!(
                "Registered channel {} (community {})",
                entry.channel_id, entry.community_id
            );
        }

        ChannelsCommand::Deregister { channel } => {
            let channel = ChannelId::new(channel);
            registry.deregister(&channel).await?;
            println!("Deregistered channel {}", channel);
        }

        ChannelsCommand::Purge { community } => {
            let removed = registry.purge_community(&CommunityId::new(community.as_str())).await?;
            println!("Removed {} registration(s) of community {}", removed, community);
        }

        ChannelsCommand::Partner { community, off } => {
            let touched = registry
                .set_partner(&CommunityId::new(community.as_str()), !off)
                .await?;
            if touched == 0 {
                anyhow::bail!("Community {} has no registered channels", community);
            }
            let state = if off { "cleared" } else { "set" };
            println!("Partner flag {} on {} channel(s) of {}", state, touched, community);
        }
    }

    Ok(())
}
