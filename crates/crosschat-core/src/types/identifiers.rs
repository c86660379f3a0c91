//! Strongly-typed identifiers.
//!
//! Platform identifiers are opaque strings: the relay never does arithmetic
//! on them and different platforms format them differently.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! platform_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }
    };
}

platform_id!(
    /// Destination or source channel on the chat platform.
    ChannelId
);

platform_id!(
    /// Community (guild/server) owning one or more channels.
    CommunityId
);

platform_id!(
    /// Message author.
    UserId
);

platform_id!(
    /// Role held by an author inside a community.
    RoleId
);

platform_id!(
    /// Message identifier assigned by the platform (differs per destination).
    PlatformMessageId
);

/// Correlation identifier tying every delivered copy of one relay event together.
///
/// Minted once per accepted message and independent of any platform-native
/// message id. Rendered in footers as `CC-<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Footer prefix that precedes the raw id.
    pub const PREFIX: &'static str = "CC-";

    /// Mint a fresh correlation id.
    pub fn mint() -> Self {
        Self(crate::id::correlation_id())
    }

    /// Parse user input, accepting an optional `CC-` prefix in any case.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        let raw = match trimmed.get(..Self::PREFIX.len()) {
            Some(head) if head.eq_ignore_ascii_case(Self::PREFIX) => &trimmed[Self::PREFIX.len()..],
            _ => trimmed,
        };

        if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(Self(raw.to_ascii_uppercase()))
    }

    /// Get the raw ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Render the visible tag, e.g. `CC-4F1A09B2C3D4`.
    pub fn tag(&self) -> String {
        format!("{}{}", Self::PREFIX, self.0)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
