//! Cross-community relay engine for CrossChat.
//!
//! This crate takes messages posted in one registered channel and fans
//! them out to every other registered channel, applying tier priority,
//! moderation and delivery tracking along the way.

pub mod attachment;
pub mod broadcast;
pub mod dedup;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod moderation;
pub mod registry;
pub mod tier;
pub mod traits;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

#[cfg(feature = "discord")]
pub mod discord;

pub use attachment::{AttachmentForwarder, InboundAttachment, PreparedAttachment, SendableAttachment};
pub use broadcast::BroadcastReport;
pub use dedup::DedupSet;
pub use delivery::{DeliveryTracker, RetractionReport};
pub use dispatcher::{
    EditReport, EngineStats, IgnoreReason, RelayEngine, RelayOutcome, RelayState, RelaySummary,
};
pub use error::{DeleteError, RelayError, SendError};
pub use message::{BroadcastKind, InboundAuthor, InboundEvent, RelayMessage, RenderedMessage};
pub use moderation::{
    ContentFilter, HttpModerationClient, ModerationGate, ModerationVerdict, RejectReason,
};
pub use registry::ChannelRegistry;
pub use tier::TierClassifier;
pub use traits::{ModerationService, ModerationStatus, PlatformSender, Reaction, Unmoderated};

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
