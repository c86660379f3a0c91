//! In-process fakes of the platform and moderation boundaries.

use crate::attachment::SendableAttachment;
use crate::error::{DeleteError, RelayError, SendError};
use crate::message::RenderedMessage;
use crate::traits::{ModerationService, ModerationStatus, PlatformSender, Reaction};
use crate::Result;
use async_trait::async_trait;
use crosschat_core::{ChannelId, CommunityId, PlatformMessageId, UserId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// A message accepted by [`FakePlatform::send`].
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub channel: ChannelId,
    pub message_id: PlatformMessageId,
    pub content: String,
    pub footer: String,
    pub attachments: Vec<(String, Vec<u8>)>,
    pub at: Instant,
}

#[derive(Default)]
struct PlatformState {
    sent: Vec<SentMessage>,
    edits: Vec<(ChannelId, PlatformMessageId, String)>,
    deleted: Vec<(ChannelId, PlatformMessageId)>,
    reactions: HashMap<PlatformMessageId, Vec<Reaction>>,
    failures: HashMap<ChannelId, u32>,
    missing: HashSet<ChannelId>,
    forbidden: HashSet<ChannelId>,
}

/// Scriptable platform that records every call.
#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<PlatformState>,
    next_id: AtomicU64,
    latency: Option<Duration>,
}

impl FakePlatform {
    /// A platform where every send succeeds immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every send by `latency`.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Fail the next `count` sends to `channel`.
    pub fn fail_sends(&self, channel: &str, count: u32) {
        self.state.lock().failures.insert(ChannelId::new(channel), count);
    }

    /// Fail every send to `channel`.
    pub fn fail_always(&self, channel: &str) {
        self.fail_sends(channel, u32::MAX);
    }

    /// Deletes in `channel` report the message as already gone.
    pub fn mark_missing(&self, channel: &str) {
        self.state.lock().missing.insert(ChannelId::new(channel));
    }

    /// Deletes and edits in `channel` are refused.
    pub fn mark_forbidden(&self, channel: &str) {
        self.state.lock().forbidden.insert(ChannelId::new(channel));
    }

    /// Lift a [`FakePlatform::mark_forbidden`].
    pub fn clear_forbidden(&self, channel: &str) {
        self.state.lock().forbidden.remove(&ChannelId::new(channel));
    }

    /// Every successful send, in completion order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.state.lock().sent.clone()
    }

    /// Every successful edit.
    pub fn edits(&self) -> Vec<(ChannelId, PlatformMessageId, String)> {
        self.state.lock().edits.clone()
    }

    /// Every successful delete.
    pub fn deleted(&self) -> Vec<(ChannelId, PlatformMessageId)> {
        self.state.lock().deleted.clone()
    }

    /// Reactions currently on a message, oldest first.
    pub fn reactions(&self, message_id: &str) -> Vec<Reaction> {
        self.state
            .lock()
            .reactions
            .get(&PlatformMessageId::new(message_id))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl PlatformSender for FakePlatform {
    async fn send(
        &self,
        channel: &ChannelId,
        message: &RenderedMessage,
        attachments: Vec<SendableAttachment>,
    ) -> std::result::Result<PlatformMessageId, SendError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock();
        if let Some(remaining) = state.failures.get_mut(channel) {
            if *remaining > 0 {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                return Err(SendError::Failed(format!("{} unreachable", channel)));
            }
        }

        let message_id =
            PlatformMessageId::new(format!("pm-{}", self.next_id.fetch_add(1, Ordering::SeqCst)));
        let attachments = attachments
            .into_iter()
            .map(|a| {
                let (name, _, data) = a.into_parts();
                (name, data.to_vec())
            })
            .collect();

        state.sent.push(SentMessage {
            channel: channel.clone(),
            message_id: message_id.clone(),
            content: message.content.clone(),
            footer: message.footer.clone(),
            attachments,
            at: Instant::now(),
        });
        Ok(message_id)
    }

    async fn edit(
        &self,
        channel: &ChannelId,
        message_id: &PlatformMessageId,
        message: &RenderedMessage,
    ) -> std::result::Result<(), SendError> {
        let mut state = self.state.lock();
        if state.forbidden.contains(channel) {
            return Err(SendError::Forbidden(channel.to_string()));
        }
        state
            .edits
            .push((channel.clone(), message_id.clone(), message.content.clone()));
        Ok(())
    }

    async fn delete(
        &self,
        channel: &ChannelId,
        message_id: &PlatformMessageId,
    ) -> std::result::Result<(), DeleteError> {
        let mut state = self.state.lock();
        if state.forbidden.contains(channel) {
            return Err(DeleteError::Forbidden(channel.to_string()));
        }
        if state.missing.contains(channel) {
            return Err(DeleteError::NotFound);
        }
        state.deleted.push((channel.clone(), message_id.clone()));
        Ok(())
    }

    async fn react(
        &self,
        _channel: &ChannelId,
        message_id: &PlatformMessageId,
        reaction: Reaction,
    ) -> std::result::Result<(), SendError> {
        let mut state = self.state.lock();
        let current = state.reactions.entry(message_id.clone()).or_default();
        if !current.contains(&reaction) {
            current.push(reaction);
        }
        Ok(())
    }

    async fn unreact(
        &self,
        _channel: &ChannelId,
        message_id: &PlatformMessageId,
        reaction: Reaction,
    ) -> std::result::Result<(), SendError> {
        if let Some(current) = self.state.lock().reactions.get_mut(message_id) {
            current.retain(|r| *r != reaction);
        }
        Ok(())
    }
}

/// Moderation service with fixed answers per author and community.
#[derive(Default)]
pub struct ScriptedModeration {
    statuses: Mutex<HashMap<UserId, ModerationStatus>>,
    banned_communities: Mutex<HashSet<CommunityId>>,
    unavailable: std::sync::atomic::AtomicBool,
}

impl ScriptedModeration {
    /// Every author is clean.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the status reported for an author.
    pub fn set_status(&self, author: &str, status: ModerationStatus) {
        self.statuses.lock().insert(UserId::new(author), status);
    }

    /// Report an author as banned.
    pub fn ban(&self, author: &str) {
        self.set_status(
            author,
            ModerationStatus {
                active_ban: true,
                warning_count: 0,
            },
        );
    }

    /// Report a community as banned.
    pub fn ban_community(&self, community: &str) {
        self.banned_communities
            .lock()
            .insert(CommunityId::new(community));
    }

    /// Make every lookup fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RelayError::ModerationUnavailable("scripted outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ModerationService for ScriptedModeration {
    async fn get_verdict(&self, author: &UserId) -> Result<ModerationStatus> {
        self.check()?;
        Ok(self
            .statuses
            .lock()
            .get(author)
            .copied()
            .unwrap_or_default())
    }

    async fn community_banned(&self, community: &CommunityId) -> Result<bool> {
        self.check()?;
        Ok(self.banned_communities.lock().contains(community))
    }
}
