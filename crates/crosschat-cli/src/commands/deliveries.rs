//! Delivery record inspection.

use super::{load_config, open_store};
use anyhow::Context;
use clap::Args;
use crosschat_core::{CorrelationId, DeliveryRecord, RelayEvent};
use crosschat_store::{DeliveryStore, RelayEventStore, Store};
use serde::Serialize;
use std::path::Path;

/// Deliveries command arguments.
#[derive(Args)]
pub struct DeliveriesArgs {
    /// Correlation id, with or without the CC- prefix
    pub cc_id: String,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct DeliveryView {
    event: RelayEvent,
    deliveries: Vec<DeliveryRecord>,
    retracted_destinations: Vec<String>,
}

/// Parse a user-supplied correlation id.
pub fn parse_cc_id(input: &str) -> anyhow::Result<CorrelationId> {
    CorrelationId::parse(input).with_context(|| format!("Invalid correlation id: {}", input))
}

/// Run the deliveries command.
pub async fn run(args: DeliveriesArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let cc_id = parse_cc_id(&args.cc_id)?;
    let config = load_config(config_path)?;
    let store = open_store(&config).await?;

    let view = lookup(store.as_ref(), &cc_id).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    let event = &view.event;
    println!("{}", cc_id.tag());
    println!("  source:  {} in {}", event.source_message_id, event.source_channel_id);
    println!("  author:  {} ({})", event.author_id, event.tier);
    println!("  created: {}", event.created_at.format("%Y-%m-%d %H:%M:%S"));
    if let (Some(at), Some(by)) = (&event.retracted_at, &event.retracted_by) {
        println!("  retracted by {} at {}", by, at.format("%Y-%m-%d %H:%M:%S"));
    }
    println!();

    println!(
        "  {:<22} {:<8} {:<8} {:<22} {}",
        "DESTINATION", "OUTCOME", "ATTEMPTS", "MESSAGE", "ERROR"
    );
    println!("  {}", "-".repeat(80));
    for record in &view.deliveries {
        let retracted = view
            .retracted_destinations
            .iter()
            .any(|d| d == record.destination_channel_id.as_str());
        let message = match (&record.platform_message_id, retracted) {
            (Some(_), true) => "(deleted)".to_string(),
            (Some(id), false) => id.to_string(),
            (None, _) => "-".to_string(),
        };
        println!(
            "  {:<22} {:<8} {:<8} {:<22} {}",
            record.destination_channel_id,
            record.outcome,
            record.attempts,
            message,
            record.error.as_deref().unwrap_or("")
        );
    }

    Ok(())
}

async fn lookup(store: &dyn Store, cc_id: &CorrelationId) -> anyhow::Result<DeliveryView> {
    let event = store
        .get_event(cc_id)
        .await?
        .with_context(|| format!("No relay event {}", cc_id.tag()))?;
    let deliveries = store.deliveries_for(cc_id).await?;
    let retracted_destinations = store
        .retracted_destinations(cc_id)
        .await?
        .into_iter()
        .map(|c| c.to_string())
        .collect();

    Ok(DeliveryView {
        event,
        deliveries,
        retracted_destinations,
    })
}
