//! Inbound events and the relayed message format.

use crate::attachment::InboundAttachment;
use crosschat_core::{ChannelId, CommunityId, CorrelationId, PlatformMessageId, RoleId, Tier, UserId};
use serde::{Deserialize, Serialize};

/// Author of an inbound message.
#[derive(Debug, Clone)]
pub struct InboundAuthor {
    /// Author id.
    pub id: UserId,

    /// Name shown in the relayed header.
    pub display_name: String,

    /// Whether the author is a bot (bots are never relayed).
    pub is_bot: bool,

    /// Roles held in the source community.
    pub roles: Vec<RoleId>,
}

/// A message event handed over by the platform gateway.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Platform id of the inbound message.
    pub platform_message_id: PlatformMessageId,

    /// Channel the message was posted in.
    pub source_channel_id: ChannelId,

    /// Community owning the source channel.
    pub community_id: CommunityId,

    /// Community name shown in the relayed header.
    pub community_name: String,

    /// Message author.
    pub author: InboundAuthor,

    /// Text content.
    pub content: String,

    /// Attachments in posting order.
    pub attachments: Vec<InboundAttachment>,
}

impl InboundEvent {
    /// Whether the event carries neither text nor attachments.
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.attachments.is_empty()
    }
}

/// A message accepted for fan-out. Built once per inbound event.
#[derive(Debug, Clone)]
pub struct RelayMessage {
    pub community_name: String,
    pub author_id: UserId,
    pub author_display: String,
    pub content: String,
    pub tier: Tier,
}

impl RelayMessage {
    /// Render the visible copy delivered to every destination.
    pub fn render(&self, cc_id: &CorrelationId) -> RenderedMessage {
        RenderedMessage::new(
            self.tier,
            &self.author_display,
            &self.community_name,
            &self.author_id,
            &self.content,
            cc_id,
        )
    }
}

/// Visible form of a relayed message: header plus body, and a footer tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    /// Header line followed by the message body.
    pub content: String,

    /// `CC-<id> • ID: <author id>`.
    pub footer: String,
}

impl RenderedMessage {
    /// Render a message from its parts.
    pub fn new(
        tier: Tier,
        author_display: &str,
        community_name: &str,
        author_id: &UserId,
        body: &str,
        cc_id: &CorrelationId,
    ) -> Self {
        let header = match tier.badge() {
            Some(badge) => format!("**[{}] {} • {}**", badge, author_display, community_name),
            None => format!("**{} • {}**", author_display, community_name),
        };

        let content = if body.is_empty() {
            header
        } else {
            format!("{}\n{}", header, body)
        };

        Self {
            content,
            footer: format!("{} • ID: {}", cc_id.tag(), author_id),
        }
    }
}

/// Kind of an administrative broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastKind {
    Announcement,
    SystemAlert,
}

impl BroadcastKind {
    fn title(self) -> &'static str {
        match self {
            BroadcastKind::Announcement => "📢 Announcement",
            BroadcastKind::SystemAlert => "⚙️ System Alert",
        }
    }
}

impl RenderedMessage {
    /// Render an administrative broadcast.
    ///
    /// A literal `\n` typed on a command line becomes a line break.
    pub fn broadcast(kind: BroadcastKind, body: &str, issued_by: &UserId) -> Self {
        let body = body.replace("\\n", "\n");
        Self {
            content: format!("**{}**\n{}", kind.title(), body.trim()),
            footer: format!("CrossChat • issued by {}", issued_by),
        }
    }
}

/// Shorten content to at most `max_chars` characters, marking the cut.
pub fn truncate_content(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let kept: String = content.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", kept)
}
