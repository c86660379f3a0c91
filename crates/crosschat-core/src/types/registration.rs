//! Channel registration records.

use super::{ChannelId, CommunityId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A channel taking part in the shared cross-chat namespace.
///
/// Unique by `channel_id`. Removal disables the entry so history stays
/// attributable; rows are only deleted by community-leave cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRegistration {
    /// Destination channel.
    pub channel_id: ChannelId,

    /// Community owning the channel.
    pub community_id: CommunityId,

    /// Whether the channel currently receives fan-out.
    pub enabled: bool,

    /// Whether the owning community is a partner.
    pub partner: bool,

    /// When the channel was (last) registered.
    pub registered_at: DateTime<Utc>,
}

impl ChannelRegistration {
    /// Create an enabled registration stamped with the current time.
    pub fn new(channel_id: ChannelId, community_id: CommunityId, partner: bool) -> Self {
        Self {
            channel_id,
            community_id,
            enabled: true,
            partner,
            registered_at: Utc::now(),
        }
    }
}
