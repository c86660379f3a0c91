//! Relay error types.

use crosschat_core::{ChannelId, ConfigError};
use crosschat_store::StoreError;
use thiserror::Error;

/// Errors surfaced by the relay engine and its administration surface.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Channel is already an active registration.
    #[error("Channel already registered: {0}")]
    AlreadyRegistered(ChannelId),

    /// Channel is unknown or already disabled.
    #[error("Channel not registered: {0}")]
    NotRegistered(ChannelId),

    /// The external moderation subsystem could not produce a verdict.
    #[error("Moderation unavailable: {0}")]
    ModerationUnavailable(String),

    /// A destination rejected or failed a send.
    #[error("Send to {channel} failed: {message}")]
    DestinationSendFailure {
        /// Destination channel.
        channel: ChannelId,
        /// Error message.
        message: String,
    },

    /// An attachment could not be read at intake.
    #[error("Attachment unavailable: {0}")]
    AttachmentUnavailable(String),

    /// The backing store could not produce the registry.
    #[error("Registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// A broadcast was requested without content.
    #[error("Nothing to broadcast")]
    EmptyBroadcast,

    /// Unknown correlation id or source message.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl RelayError {
    /// Create a send failure for a destination.
    pub fn send_failure(channel: ChannelId, message: impl Into<String>) -> Self {
        Self::DestinationSendFailure {
            channel,
            message: message.into(),
        }
    }

    /// Wrap a store error raised while reading the registry.
    pub fn registry_unavailable(err: impl std::fmt::Display) -> Self {
        Self::RegistryUnavailable(err.to_string())
    }

    /// Create a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

/// Failure reported by the platform send or edit primitive.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    /// The destination channel no longer exists.
    #[error("destination not found: {0}")]
    NotFound(String),

    /// The bot may not post in the destination.
    #[error("permission denied: {0}")]
    Forbidden(String),

    /// Any other failure (network, rate limit, server error).
    #[error("send failed: {0}")]
    Failed(String),
}

/// Failure reported by the platform delete primitive.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeleteError {
    /// The message is already gone.
    #[error("message not found")]
    NotFound,

    /// Permission to delete was revoked.
    #[error("permission denied: {0}")]
    Forbidden(String),

    /// Any other failure.
    #[error("delete failed: {0}")]
    Failed(String),
}
