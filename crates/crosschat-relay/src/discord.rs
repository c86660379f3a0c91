//! Discord adapter.
//!
//! `DiscordPlatform` is the outbound half (send, edit, delete and reactions
//! over serenity's HTTP client); `DiscordHandler` is the inbound half that
//! turns gateway events into relay work.

#![cfg(feature = "discord")]

use crate::attachment::{InboundAttachment, SendableAttachment};
use crate::dispatcher::{RelayEngine, RelayOutcome};
use crate::error::{DeleteError, RelayError, SendError};
use crate::message::{InboundAuthor, InboundEvent, RenderedMessage};
use crate::traits::{PlatformSender, Reaction};
use async_trait::async_trait;
use crosschat_core::{ChannelId, CommunityId, PlatformMessageId, RoleId, UserId};
use parking_lot::RwLock;
use serenity::all::{
    ChannelId as DiscordChannelId, CreateAttachment, CreateEmbed, CreateEmbedFooter,
    CreateMessage, EditMessage, GatewayIntents, Guild, GuildId, Http, Message,
    MessageId as DiscordMessageId, MessageUpdateEvent, ReactionType, UnavailableGuild,
};
use serenity::async_trait as serenity_async_trait;
use serenity::model::gateway::Ready;
use serenity::prelude::*;
use serenity::Error as SerenityError;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Gateway intents the relay needs.
pub fn intents() -> GatewayIntents {
    GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT
}

/// Build a gateway client that feeds `handler`.
pub async fn client(token: &str, handler: DiscordHandler) -> serenity::Result<Client> {
    Client::builder(token, intents()).event_handler(handler).await
}

/// Outbound Discord primitives.
#[derive(Clone)]
pub struct DiscordPlatform {
    http: Arc<Http>,
}

impl std::fmt::Debug for DiscordPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordPlatform").finish_non_exhaustive()
    }
}

impl DiscordPlatform {
    /// Create a platform client from a bot token.
    pub fn new(token: &str) -> Self {
        Self::from_http(Arc::new(Http::new(token)))
    }

    /// Wrap an existing HTTP client.
    pub fn from_http(http: Arc<Http>) -> Self {
        Self { http }
    }
}

/// Parse a snowflake. Zero and non-numeric ids are rejected.
fn snowflake(raw: &str) -> Option<u64> {
    raw.parse::<u64>().ok().filter(|id| *id != 0)
}

fn discord_channel(channel: &ChannelId) -> Option<DiscordChannelId> {
    snowflake(channel.as_str()).map(DiscordChannelId::new)
}

fn discord_message(message: &PlatformMessageId) -> Option<DiscordMessageId> {
    snowflake(message.as_str()).map(DiscordMessageId::new)
}

fn status_code(err: &SerenityError) -> Option<u16> {
    match err {
        SerenityError::Http(e) => e.status_code().map(|s| s.as_u16()),
        _ => None,
    }
}

fn send_error(channel: &ChannelId, err: &SerenityError) -> SendError {
    match status_code(err) {
        Some(404) => SendError::NotFound(channel.to_string()),
        Some(403) => SendError::Forbidden(channel.to_string()),
        _ => SendError::Failed(err.to_string()),
    }
}

fn reaction_type(reaction: Reaction) -> ReactionType {
    ReactionType::Unicode(reaction.emoji().to_string())
}

fn embed(message: &RenderedMessage) -> CreateEmbed {
    CreateEmbed::new()
        .description(&message.content)
        .footer(CreateEmbedFooter::new(&message.footer))
}

#[async_trait]
impl PlatformSender for DiscordPlatform {
    async fn send(
        &self,
        channel: &ChannelId,
        message: &RenderedMessage,
        attachments: Vec<SendableAttachment>,
    ) -> std::result::Result<PlatformMessageId, SendError> {
        let channel_id =
            discord_channel(channel).ok_or_else(|| SendError::NotFound(channel.to_string()))?;

        let files: Vec<CreateAttachment> = attachments
            .into_iter()
            .map(|attachment| {
                let (filename, _, data) = attachment.into_parts();
                CreateAttachment::bytes(data.to_vec(), filename)
            })
            .collect();

        let builder = CreateMessage::new().embed(embed(message)).add_files(files);
        let sent = channel_id
            .send_message(&self.http, builder)
            .await
            .map_err(|e| send_error(channel, &e))?;

        Ok(PlatformMessageId::new(sent.id.to_string()))
    }

    async fn edit(
        &self,
        channel: &ChannelId,
        message_id: &PlatformMessageId,
        message: &RenderedMessage,
    ) -> std::result::Result<(), SendError> {
        let channel_id =
            discord_channel(channel).ok_or_else(|| SendError::NotFound(channel.to_string()))?;
        let target =
            discord_message(message_id).ok_or_else(|| SendError::NotFound(message_id.to_string()))?;

        channel_id
            .edit_message(&self.http, target, EditMessage::new().embed(embed(message)))
            .await
            .map_err(|e| send_error(channel, &e))?;
        Ok(())
    }

    async fn delete(
        &self,
        channel: &ChannelId,
        message_id: &PlatformMessageId,
    ) -> std::result::Result<(), DeleteError> {
        let (channel_id, target) = match (discord_channel(channel), discord_message(message_id)) {
            (Some(channel_id), Some(target)) => (channel_id, target),
            _ => return Err(DeleteError::NotFound),
        };

        match channel_id.delete_message(&self.http, target).await {
            Ok(()) => Ok(()),
            Err(e) => match status_code(&e) {
                Some(404) => Err(DeleteError::NotFound),
                Some(403) => Err(DeleteError::Forbidden(channel.to_string())),
                _ => Err(DeleteError::Failed(e.to_string())),
            },
        }
    }

    async fn react(
        &self,
        channel: &ChannelId,
        message_id: &PlatformMessageId,
        reaction: Reaction,
    ) -> std::result::Result<(), SendError> {
        let channel_id =
            discord_channel(channel).ok_or_else(|| SendError::NotFound(channel.to_string()))?;
        let target =
            discord_message(message_id).ok_or_else(|| SendError::NotFound(message_id.to_string()))?;

        self.http
            .create_reaction(channel_id, target, &reaction_type(reaction))
            .await
            .map_err(|e| send_error(channel, &e))
    }

    async fn unreact(
        &self,
        channel: &ChannelId,
        message_id: &PlatformMessageId,
        reaction: Reaction,
    ) -> std::result::Result<(), SendError> {
        let channel_id =
            discord_channel(channel).ok_or_else(|| SendError::NotFound(channel.to_string()))?;
        let target =
            discord_message(message_id).ok_or_else(|| SendError::NotFound(message_id.to_string()))?;

        self.http
            .delete_reaction_me(channel_id, target, &reaction_type(reaction))
            .await
            .map_err(|e| send_error(channel, &e))
    }
}

/// Gateway event handler feeding the relay engine.
pub struct DiscordHandler {
    engine: RelayEngine,
    community_names: RwLock<HashMap<GuildId, String>>,
}

impl DiscordHandler {
    /// Create a handler for `engine`.
    pub fn new(engine: RelayEngine) -> Self {
        Self {
            engine,
            community_names: RwLock::new(HashMap::new()),
        }
    }

    fn community_name(&self, guild_id: GuildId) -> String {
        self.community_names
            .read()
            .get(&guild_id)
            .cloned()
            .unwrap_or_else(|| guild_id.to_string())
    }

    /// Convert a guild message. Direct messages are not relayed.
    fn to_inbound(&self, msg: &Message) -> Option<InboundEvent> {
        let guild_id = msg.guild_id?;

        let member = msg.member.as_deref();
        let display_name = member
            .and_then(|m| m.nick.clone())
            .or_else(|| msg.author.global_name.clone())
            .unwrap_or_else(|| msg.author.name.clone());
        let roles = member
            .map(|m| m.roles.iter().map(|r| RoleId::new(r.to_string())).collect())
            .unwrap_or_default();

        let attachments = msg
            .attachments
            .iter()
            .map(|a| {
                let inbound = InboundAttachment::from_url(a.url.clone(), a.filename.clone());
                match &a.content_type {
                    Some(content_type) => inbound.with_content_type(content_type.clone()),
                    None => inbound,
                }
            })
            .collect();

        Some(InboundEvent {
            platform_message_id: PlatformMessageId::new(msg.id.to_string()),
            source_channel_id: ChannelId::new(msg.channel_id.to_string()),
            community_id: CommunityId::new(guild_id.to_string()),
            community_name: self.community_name(guild_id),
            author: InboundAuthor {
                id: UserId::new(msg.author.id.to_string()),
                display_name,
                is_bot: msg.author.bot,
                roles,
            },
            content: msg.content.clone(),
            attachments,
        })
    }
}

#[serenity_async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(user = %ready.user.name, guilds = ready.guilds.len(), "Discord gateway ready");
    }

    async fn guild_create(&self, _ctx: Context, guild: Guild, _is_new: Option<bool>) {
        self.community_names.write().insert(guild.id, guild.name.clone());
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        // An outage also arrives as a guild delete; only a leave purges.
        if incomplete.unavailable {
            return;
        }

        self.community_names.write().remove(&incomplete.id);
        let community = CommunityId::new(incomplete.id.to_string());
        if let Err(e) = self.engine.registry().purge_community(&community).await {
            warn!(community_id = %community, error = %e, "Failed to purge community");
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let event = match self.to_inbound(&msg) {
            Some(event) => event,
            None => return,
        };
        let handle = match self.engine.spawn(event) {
            Some(handle) => handle,
            None => return,
        };

        if let Ok(Ok(RelayOutcome::Rejected { reason })) = handle.await {
            let notice = format!(
                "<@{}> your message was not relayed ({}).",
                msg.author.id, reason
            );
            if let Err(e) = msg.channel_id.say(&ctx.http, notice).await {
                warn!(channel_id = %msg.channel_id, error = %e, "Failed to notify author");
            }
        }
    }

    async fn message_update(
        &self,
        _ctx: Context,
        _old_if_available: Option<Message>,
        _new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        if event.guild_id.is_none() || event.author.as_ref().map_or(false, |a| a.bot) {
            return;
        }
        let content = match event.content {
            Some(content) => content,
            None => return,
        };

        let source = PlatformMessageId::new(event.id.to_string());
        match self.engine.propagate_edit(&source, &content).await {
            Ok(report) => debug!(
                message_id = %source,
                attempted = report.attempted,
                succeeded = report.succeeded,
                "Edit handled"
            ),
            Err(RelayError::NotFound(_)) => {}
            Err(e) => warn!(message_id = %source, error = %e, "Edit propagation failed"),
        }
    }
}
