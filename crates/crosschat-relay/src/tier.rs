//! Sender tier classification.

use crosschat_core::config::RolesConfig;
use crosschat_core::{RoleId, SenderCapabilities, Tier};
use std::collections::HashSet;

/// Maps role membership and the community partner flag to a [`Tier`].
#[derive(Debug, Clone, Default)]
pub struct TierClassifier {
    elite_roles: HashSet<RoleId>,
    architect_roles: HashSet<RoleId>,
}

impl TierClassifier {
    /// Build a classifier from the configured VIP role ids.
    pub fn new(roles: &RolesConfig) -> Self {
        Self {
            elite_roles: roles.elite_vip_role_ids.iter().map(RoleId::new).collect(),
            architect_roles: roles.architect_vip_role_ids.iter().map(RoleId::new).collect(),
        }
    }

    /// Capability flags for an author.
    pub fn capabilities(&self, roles: &[RoleId], partner_community: bool) -> SenderCapabilities {
        SenderCapabilities {
            elite_vip: roles.iter().any(|r| self.elite_roles.contains(r)),
            architect_vip: roles.iter().any(|r| self.architect_roles.contains(r)),
            partner_community,
        }
    }

    /// Resolve the processing tier for an author.
    pub fn classify(&self, roles: &[RoleId], partner_community: bool) -> Tier {
        Tier::resolve(&self.capabilities(roles, partner_community))
    }
}
