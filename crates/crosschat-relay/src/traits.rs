//! Boundaries to the chat platform and the moderation subsystem.

use crate::attachment::SendableAttachment;
use crate::error::{DeleteError, SendError};
use crate::message::RenderedMessage;
use crate::Result;
use async_trait::async_trait;
use crosschat_core::{ChannelId, CommunityId, PlatformMessageId, UserId};
use serde::{Deserialize, Serialize};

/// Status marker placed on the author's source message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reaction {
    /// Admitted and waiting for fan-out.
    Processing,

    /// At least one destination received a copy.
    Delivered,

    /// No destination received a copy.
    Failed,

    /// Author or community is banned.
    Banned,

    /// Refused by the content filter or the warning threshold.
    Blocked,
}

impl Reaction {
    /// Emoji shown on the source message.
    pub fn emoji(self) -> &'static str {
        match self {
            Reaction::Processing => "⏳",
            Reaction::Delivered => "✅",
            Reaction::Failed => "❌",
            Reaction::Banned => "🚫",
            Reaction::Blocked => "⚠️",
        }
    }
}

/// Platform send, edit, delete and reaction primitives.
#[async_trait]
pub trait PlatformSender: Send + Sync {
    /// Post a rendered message with its attachments to a channel.
    ///
    /// Consumes the attachments; each call needs its own instances.
    async fn send(
        &self,
        channel: &ChannelId,
        message: &RenderedMessage,
        attachments: Vec<SendableAttachment>,
    ) -> std::result::Result<PlatformMessageId, SendError>;

    /// Replace the visible content of a previously relayed copy.
    async fn edit(
        &self,
        channel: &ChannelId,
        message_id: &PlatformMessageId,
        message: &RenderedMessage,
    ) -> std::result::Result<(), SendError>;

    /// Delete a previously relayed copy.
    async fn delete(
        &self,
        channel: &ChannelId,
        message_id: &PlatformMessageId,
    ) -> std::result::Result<(), DeleteError>;

    /// Add a status reaction to a message.
    async fn react(
        &self,
        channel: &ChannelId,
        message_id: &PlatformMessageId,
        reaction: Reaction,
    ) -> std::result::Result<(), SendError>;

    /// Remove a status reaction previously added by [`PlatformSender::react`].
    async fn unreact(
        &self,
        channel: &ChannelId,
        message_id: &PlatformMessageId,
        reaction: Reaction,
    ) -> std::result::Result<(), SendError>;
}

/// Ban and warning state of an author, as reported by the moderation subsystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationStatus {
    /// Author is currently banned from cross-chat.
    #[serde(default)]
    pub active_ban: bool,

    /// Warnings on record.
    #[serde(default)]
    pub warning_count: u32,
}

/// The external moderation subsystem. The relay only consumes its verdicts.
#[async_trait]
pub trait ModerationService: Send + Sync {
    /// Ban and warning state for an author.
    ///
    /// Any failure must be reported as `RelayError::ModerationUnavailable`.
    async fn get_verdict(&self, author: &UserId) -> Result<ModerationStatus>;

    /// Whether a whole community is banned from cross-chat.
    async fn community_banned(&self, _community: &CommunityId) -> Result<bool> {
        Ok(false)
    }
}

/// Moderation service for deployments that set `moderation.disabled`.
///
/// Reports every author as clean, leaving only the local content filter.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unmoderated;

#[async_trait]
impl ModerationService for Unmoderated {
    async fn get_verdict(&self, _author: &UserId) -> Result<ModerationStatus> {
        Ok(ModerationStatus::default())
    }
}
