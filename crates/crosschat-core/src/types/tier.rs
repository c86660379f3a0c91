//! Sender priority tiers.

use crate::config::TierDelays;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Capability flags a sender is classified by.
///
/// Built from role membership and the source community's partner flag;
/// never from display names or scattered role-id comparisons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderCapabilities {
    /// Author holds an Elite VIP role.
    pub elite_vip: bool,

    /// Author holds an Architect VIP role.
    pub architect_vip: bool,

    /// Source community is flagged as a partner.
    pub partner_community: bool,
}

/// Processing tier of a sender. Resolved per message, never stored on the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    EliteVip,
    ArchitectVip,
    Partner,
    Regular,
}

impl Tier {
    /// All tiers, highest precedence first.
    pub const ALL: [Tier; 4] = [Tier::EliteVip, Tier::ArchitectVip, Tier::Partner, Tier::Regular];

    /// Resolve a tier. First match wins; partner status only upgrades non-VIP senders.
    pub fn resolve(caps: &SenderCapabilities) -> Self {
        if caps.elite_vip {
            Tier::EliteVip
        } else if caps.architect_vip {
            Tier::ArchitectVip
        } else if caps.partner_community {
            Tier::Partner
        } else {
            Tier::Regular
        }
    }

    /// Pre-dispatch delay for this tier under the given policy.
    pub fn delay(self, delays: &TierDelays) -> Duration {
        let ms = match self {
            Tier::EliteVip => delays.elite_vip,
            Tier::ArchitectVip => delays.architect_vip,
            Tier::Partner => delays.partner,
            Tier::Regular => delays.regular,
        };
        Duration::from_millis(ms)
    }

    /// Badge shown in front of the author name, if any.
    pub fn badge(self) -> Option<&'static str> {
        match self {
            Tier::EliteVip => Some("💎 Elite"),
            Tier::ArchitectVip => Some("⭐ Architect"),
            Tier::Partner => Some("🤝 Partner"),
            Tier::Regular => None,
        }
    }

    /// Stable storage name.
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::EliteVip => "elite_vip",
            Tier::ArchitectVip => "architect_vip",
            Tier::Partner => "partner",
            Tier::Regular => "regular",
        }
    }

    /// Inverse of [`Tier::as_str`].
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
