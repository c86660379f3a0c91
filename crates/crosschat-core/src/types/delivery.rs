//! Relay event and per-destination delivery records.

use super::{ChannelId, CommunityId, CorrelationId, PlatformMessageId, Tier, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Final state of one fan-out leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryOutcome {
    /// The destination accepted the message.
    Success,

    /// Both the first attempt and the retry failed.
    Failed,

    /// The destination was disabled before the leg started.
    Skipped,
}

impl DeliveryOutcome {
    /// Stable storage name.
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryOutcome::Success => "success",
            DeliveryOutcome::Failed => "failed",
            DeliveryOutcome::Skipped => "skipped",
        }
    }

    /// Inverse of [`DeliveryOutcome::as_str`].
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "success" => Some(DeliveryOutcome::Success),
            "failed" => Some(DeliveryOutcome::Failed),
            "skipped" => Some(DeliveryOutcome::Skipped),
            _ => None,
        }
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one destination leg of a relay event. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// Correlation id of the relay event.
    pub cc_id: CorrelationId,

    /// Destination channel of this leg.
    pub destination_channel_id: ChannelId,

    /// Platform id of the delivered copy (success only).
    pub platform_message_id: Option<PlatformMessageId>,

    /// When the leg completed.
    pub delivered_at: DateTime<Utc>,

    /// Leg outcome.
    pub outcome: DeliveryOutcome,

    /// Send attempts made (0 for skipped legs).
    pub attempts: u32,

    /// Last error for failed legs.
    pub error: Option<String>,
}

impl DeliveryRecord {
    /// A delivered leg.
    pub fn success(
        cc_id: CorrelationId,
        destination: ChannelId,
        message_id: PlatformMessageId,
        attempts: u32,
    ) -> Self {
        Self {
            cc_id,
            destination_channel_id: destination,
            platform_message_id: Some(message_id),
            delivered_at: Utc::now(),
            outcome: DeliveryOutcome::Success,
            attempts,
            error: None,
        }
    }

    /// A leg that exhausted its retry.
    pub fn failed(
        cc_id: CorrelationId,
        destination: ChannelId,
        error: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            cc_id,
            destination_channel_id: destination,
            platform_message_id: None,
            delivered_at: Utc::now(),
            outcome: DeliveryOutcome::Failed,
            attempts,
            error: Some(error.into()),
        }
    }

    /// A leg whose destination was disabled mid-flight.
    pub fn skipped(cc_id: CorrelationId, destination: ChannelId) -> Self {
        Self {
            cc_id,
            destination_channel_id: destination,
            platform_message_id: None,
            delivered_at: Utc::now(),
            outcome: DeliveryOutcome::Skipped,
            attempts: 0,
            error: None,
        }
    }
}

/// Durable record of one accepted relay event.
///
/// Keyed by `cc_id` and unique by `source_message_id`, which makes the
/// inbound-id to correlation-id mapping survive restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEvent {
    pub cc_id: CorrelationId,
    pub source_message_id: PlatformMessageId,
    pub source_channel_id: ChannelId,
    pub community_id: CommunityId,
    pub community_name: String,
    pub author_id: UserId,
    pub author_display: String,
    pub tier: Tier,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub retracted_at: Option<DateTime<Utc>>,
    pub retracted_by: Option<UserId>,
}

impl RelayEvent {
    /// Whether the event has been retracted.
    pub fn is_retracted(&self) -> bool {
        self.retracted_at.is_some()
    }
}
