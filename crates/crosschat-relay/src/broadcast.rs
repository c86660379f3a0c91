//! Administrative broadcasts to every active channel.

use crate::error::RelayError;
use crate::message::{BroadcastKind, RenderedMessage};
use crate::registry::ChannelRegistry;
use crate::traits::PlatformSender;
use crate::Result;
use crosschat_core::{ChannelId, UserId};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Result of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: Vec<ChannelId>,
}

/// Send `body` to every active channel, once each.
pub async fn broadcast(
    registry: &ChannelRegistry,
    platform: &dyn PlatformSender,
    kind: BroadcastKind,
    body: &str,
    issued_by: &UserId,
) -> Result<BroadcastReport> {
    if body.trim().is_empty() {
        return Err(RelayError::EmptyBroadcast);
    }

    let channels = registry.list_active().await?;
    let rendered = RenderedMessage::broadcast(kind, body, issued_by);

    let sends = channels.iter().map(|registration| {
        let rendered = &rendered;
        async move {
            let channel = &registration.channel_id;
            (channel, platform.send(channel, rendered, Vec::new()).await)
        }
    });

    let mut report = BroadcastReport {
        attempted: channels.len(),
        ..Default::default()
    };
    for (channel, result) in join_all(sends).await {
        match result {
            Ok(_) => report.succeeded += 1,
            Err(e) => {
                warn!(channel_id = %channel, kind = ?kind, error = %e, "Broadcast send failed");
                report.failed.push(channel.clone());
            }
        }
    }

    info!(
        kind = ?kind,
        issued_by = %issued_by,
        attempted = report.attempted,
        succeeded = report.succeeded,
        "Broadcast sent"
    );
    Ok(report)
}
