//! The relay engine.
//!
//! One inbound message moves through
//! `Received → Classified → Gated → Delayed → Dispatching → Recorded → Done`,
//! ending early in `Duplicate` (from `Received`) or `Rejected` (from `Gated`).
//! Fan-out runs one task per destination; a failing leg never blocks or
//! aborts its siblings.

use crate::attachment::{AttachmentForwarder, PreparedAttachment};
use crate::broadcast::{self, BroadcastReport};
use crate::delivery::{DeliveryTracker, RetractionReport};
use crate::dedup::DedupSet;
use crate::error::RelayError;
use crate::message::{
    truncate_content, BroadcastKind, InboundEvent, RelayMessage, RenderedMessage,
};
use crate::moderation::{ModerationGate, RejectReason};
use crate::registry::ChannelRegistry;
use crate::tier::TierClassifier;
use crate::traits::{ModerationService, PlatformSender, Reaction};
use crate::Result;
use chrono::Utc;
use crosschat_core::config::RelayConfig;
use crosschat_core::{
    ChannelId, Config, CorrelationId, DeliveryOutcome, DeliveryRecord, PlatformMessageId,
    RelayEvent, UserId,
};
use crosschat_store::{RelayEventStore, Store};
use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Per-message processing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Received,
    Classified,
    Gated,
    Delayed,
    Dispatching,
    Recorded,
    Done,
    Rejected,
    Duplicate,
}

/// Why an inbound event was dropped before deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// Bots are never relayed.
    BotAuthor,

    /// No text and no attachments.
    Empty,

    /// Source channel is not an active registration.
    UnregisteredSource,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IgnoreReason::BotAuthor => "bot_author",
            IgnoreReason::Empty => "empty",
            IgnoreReason::UnregisteredSource => "unregistered_source",
        };
        f.write_str(name)
    }
}

/// Aggregate result of one fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelaySummary {
    pub cc_id: CorrelationId,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,

    /// Legs whose delivery record could not be written. Their copies, if
    /// any, cannot be retracted by correlation id.
    #[serde(default)]
    pub unrecorded: usize,
}

impl RelaySummary {
    fn new(cc_id: CorrelationId) -> Self {
        Self {
            cc_id,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            unrecorded: 0,
        }
    }

    /// Whether every leg has a durable delivery record.
    pub fn is_fully_recorded(&self) -> bool {
        self.unrecorded == 0
    }

    fn add(&mut self, outcome: DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Success => self.succeeded += 1,
            DeliveryOutcome::Failed => self.failed += 1,
            DeliveryOutcome::Skipped => self.skipped += 1,
        }
    }

    /// Destinations the message was fanned out to.
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }
}

/// Terminal result of handling one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Dropped by pre-filtering; nothing was remembered.
    Ignored(IgnoreReason),

    /// Already relayed; no further work done.
    Duplicate,

    /// Not admitted; the reason is meant for the author.
    Rejected { reason: RejectReason },

    /// Fanned out and recorded.
    Recorded(RelaySummary),
}

impl RelayOutcome {
    /// Status reaction for the author's source message, if any.
    pub fn reaction(&self) -> Option<Reaction> {
        match self {
            RelayOutcome::Ignored(_) | RelayOutcome::Duplicate => None,
            RelayOutcome::Rejected { reason } => Some(match reason {
                RejectReason::Banned | RejectReason::ServerBanned => Reaction::Banned,
                RejectReason::TooManyWarnings | RejectReason::BlockedContent => Reaction::Blocked,
                RejectReason::ModerationUnavailable | RejectReason::RelayDisabled => {
                    Reaction::Failed
                }
            }),
            RelayOutcome::Recorded(summary) if summary.succeeded > 0 => Some(Reaction::Delivered),
            RelayOutcome::Recorded(_) => Some(Reaction::Failed),
        }
    }
}

/// Result of propagating an edit to delivered copies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,

    /// The new content was refused by the content filter; nothing was edited.
    pub blocked: bool,
}

/// Point-in-time engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub received: u64,
    pub ignored: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub relayed: u64,
    pub failed_relays: u64,
    pub legs_succeeded: u64,
    pub legs_failed: u64,
    pub legs_skipped: u64,
    pub legs_unrecorded: u64,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    ignored: AtomicU64,
    duplicates: AtomicU64,
    rejected: AtomicU64,
    relayed: AtomicU64,
    failed_relays: AtomicU64,
    legs_succeeded: AtomicU64,
    legs_failed: AtomicU64,
    legs_skipped: AtomicU64,
    legs_unrecorded: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

struct Inner {
    relay: RelayConfig,
    store: Arc<dyn Store>,
    registry: ChannelRegistry,
    classifier: TierClassifier,
    gate: ModerationGate,
    forwarder: AttachmentForwarder,
    dedup: DedupSet,
    tracker: DeliveryTracker,
    platform: Arc<dyn PlatformSender>,
    counters: Counters,
    tasks: TaskTracker,
    accepting: AtomicBool,
}

/// The process-wide relay engine.
///
/// Construct exactly one in the composition root and pass clones of the
/// handle to whatever receives inbound events; clones share the dedup set,
/// registry cache and counters.
#[derive(Clone)]
pub struct RelayEngine {
    inner: Arc<Inner>,
}

impl RelayEngine {
    /// Build the engine and its components from configuration.
    pub fn new(
        config: &Config,
        store: Arc<dyn Store>,
        platform: Arc<dyn PlatformSender>,
        moderation: Arc<dyn ModerationService>,
    ) -> Result<Self> {
        let relay = config.relay.clone();
        let registry = ChannelRegistry::new(
            store.clone(),
            Duration::from_secs(relay.registry_cache_ttl_secs),
        );
        let dedup = DedupSet::new(relay.dedup_capacity, Duration::from_secs(relay.dedup_ttl_secs));

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                classifier: TierClassifier::new(&config.roles),
                gate: ModerationGate::new(moderation, &config.moderation)?,
                forwarder: AttachmentForwarder::new(&config.attachments)?,
                dedup,
                tracker: DeliveryTracker::new(store.clone(), platform.clone()),
                store,
                platform,
                counters: Counters::default(),
                tasks: TaskTracker::new(),
                accepting: AtomicBool::new(true),
                relay,
            }),
        })
    }

    /// The channel registry.
    pub fn registry(&self) -> &ChannelRegistry {
        &self.inner.registry
    }

    /// The delivery tracker.
    pub fn tracker(&self) -> &DeliveryTracker {
        &self.inner.tracker
    }

    /// Current counters.
    pub fn stats(&self) -> EngineStats {
        let c = &self.inner.counters;
        EngineStats {
            received: c.received.load(Ordering::Relaxed),
            ignored: c.ignored.load(Ordering::Relaxed),
            duplicates: c.duplicates.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            relayed: c.relayed.load(Ordering::Relaxed),
            failed_relays: c.failed_relays.load(Ordering::Relaxed),
            legs_succeeded: c.legs_succeeded.load(Ordering::Relaxed),
            legs_failed: c.legs_failed.load(Ordering::Relaxed),
            legs_skipped: c.legs_skipped.load(Ordering::Relaxed),
            legs_unrecorded: c.legs_unrecorded.load(Ordering::Relaxed),
        }
    }

    /// Run a dispatch as a tracked background task.
    ///
    /// Returns `None` once shutdown has begun.
    pub fn spawn(&self, event: InboundEvent) -> Option<JoinHandle<Result<RelayOutcome>>> {
        if !self.inner.accepting.load(Ordering::SeqCst) {
            warn!(message_id = %event.platform_message_id, "Engine shutting down, event dropped");
            return None;
        }

        let engine = self.clone();
        Some(self.inner.tasks.spawn(async move {
            let message_id = event.platform_message_id.clone();
            let result = engine.handle(event).await;
            if let Err(e) = &result {
                error!(message_id = %message_id, error = %e, "Relay failed");
            }
            result
        }))
    }

    /// Stop accepting events and wait up to `grace` for in-flight dispatches.
    ///
    /// Returns false if some dispatches were abandoned. An abandoned dispatch
    /// may leave a partial delivery record set behind.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.inner.accepting.store(false, Ordering::SeqCst);
        self.inner.tasks.close();

        match tokio::time::timeout(grace, self.inner.tasks.wait()).await {
            Ok(()) => {
                info!("Relay engine drained");
                true
            }
            Err(_) => {
                warn!(
                    in_flight = self.inner.tasks.len(),
                    "Shutdown grace elapsed, abandoning in-flight relays"
                );
                false
            }
        }
    }

    /// Handle one inbound event to completion.
    ///
    /// Whole-relay failures (`RegistryUnavailable`, store outages) are
    /// returned as errors before any fan-out begins.
    pub async fn handle(&self, event: InboundEvent) -> Result<RelayOutcome> {
        let inner = &self.inner;
        bump(&inner.counters.received);
        let message_id = event.platform_message_id.clone();

        if event.author.is_bot {
            return Ok(self.ignored(&message_id, IgnoreReason::BotAuthor));
        }
        if event.is_empty() {
            return Ok(self.ignored(&message_id, IgnoreReason::Empty));
        }
        let source = match self.registry().active(&event.source_channel_id).await {
            Ok(Some(source)) => source,
            Ok(None) => return Ok(self.ignored(&message_id, IgnoreReason::UnregisteredSource)),
            Err(e) => return Err(self.whole_relay_failure(&message_id, e)),
        };

        // Received
        if !inner.dedup.check_and_insert(&message_id) {
            return Ok(self.duplicate(&message_id));
        }
        match inner.store.find_event_by_source(&message_id).await {
            Ok(Some(_)) => return Ok(self.duplicate(&message_id)),
            Ok(None) => {}
            Err(e) => return Err(self.whole_relay_failure(&message_id, e.into())),
        }
        trace_state(&message_id, RelayState::Received);

        if !inner.relay.enabled {
            return Ok(self.rejected(&event, RejectReason::RelayDisabled).await);
        }

        let tier = inner.classifier.classify(&event.author.roles, source.partner);
        debug!(message_id = %message_id, tier = %tier, state = ?RelayState::Classified, "Relay state");

        let content = truncate_content(&event.content, inner.relay.max_content_length);
        let verdict = inner
            .gate
            .evaluate(&event.author.id, &event.community_id, &content)
            .await;
        if !verdict.allowed {
            let reason = verdict.reason.unwrap_or(RejectReason::ModerationUnavailable);
            return Ok(self.rejected(&event, reason).await);
        }
        trace_state(&message_id, RelayState::Gated);
        self.mark_source(&event, Reaction::Processing).await;

        tokio::time::sleep(tier.delay(&inner.relay.tier_delays_ms)).await;
        trace_state(&message_id, RelayState::Delayed);

        let destinations: Vec<ChannelId> = match self.registry().list_active().await {
            Ok(entries) => entries
                .iter()
                .filter(|r| r.channel_id != event.source_channel_id)
                .map(|r| r.channel_id.clone())
                .collect(),
            Err(e) => {
                self.settle_source(&event, Some(Reaction::Failed)).await;
                return Err(self.whole_relay_failure(&message_id, e));
            }
        };

        let cc_id = CorrelationId::mint();
        let relay_event = RelayEvent {
            cc_id: cc_id.clone(),
            source_message_id: message_id.clone(),
            source_channel_id: event.source_channel_id.clone(),
            community_id: event.community_id.clone(),
            community_name: event.community_name.clone(),
            author_id: event.author.id.clone(),
            author_display: event.author.display_name.clone(),
            tier,
            content: content.clone(),
            created_at: Utc::now(),
            retracted_at: None,
            retracted_by: None,
        };
        if let Err(e) = inner.store.insert_event(&relay_event).await {
            if e.is_conflict() {
                match inner.store.find_event_by_source(&message_id).await {
                    Ok(Some(_)) => {
                        self.settle_source(&event, None).await;
                        return Ok(self.duplicate(&message_id));
                    }
                    Ok(None) => {}
                    Err(lookup) => {
                        warn!(message_id = %message_id, error = %lookup, "Conflict lookup failed")
                    }
                }
            }
            self.settle_source(&event, Some(Reaction::Failed)).await;
            return Err(self.whole_relay_failure(&message_id, e.into()));
        }
        debug!(
            message_id = %message_id,
            cc_id = %cc_id,
            destinations = destinations.len(),
            state = ?RelayState::Dispatching,
            "Relay state"
        );

        let prepared = match inner.forwarder.prepare_all(&event.attachments).await {
            Ok(prepared) => Ok(prepared),
            Err(e) => {
                warn!(cc_id = %cc_id, error = %e, "Attachments unavailable, every leg will fail");
                Err(e.to_string())
            }
        };
        let message = RelayMessage {
            community_name: event.community_name.clone(),
            author_id: event.author.id.clone(),
            author_display: event.author.display_name.clone(),
            content,
            tier,
        };
        let rendered = Arc::new(message.render(&cc_id));
        let prepared = Arc::new(prepared);

        let mut legs: FuturesUnordered<_> = destinations
            .into_iter()
            .map(|destination| {
                let inner = self.inner.clone();
                let cc_id = cc_id.clone();
                let leg_destination = destination.clone();
                let rendered = rendered.clone();
                let prepared = prepared.clone();
                let handle = tokio::spawn(async move {
                    inner.run_leg(cc_id, leg_destination, rendered, prepared).await
                });
                async move { (destination, handle.await) }
            })
            .collect();

        let mut summary = RelaySummary::new(cc_id.clone());
        while let Some((destination, joined)) = legs.next().await {
            let record = joined.unwrap_or_else(|e| {
                DeliveryRecord::failed(cc_id.clone(), destination, format!("leg task failed: {}", e), 0)
            });
            if !inner.record_delivery(&record).await {
                bump(&inner.counters.legs_unrecorded);
                summary.unrecorded += 1;
            }
            match record.outcome {
                DeliveryOutcome::Success => bump(&inner.counters.legs_succeeded),
                DeliveryOutcome::Failed => bump(&inner.counters.legs_failed),
                DeliveryOutcome::Skipped => bump(&inner.counters.legs_skipped),
            }
            summary.add(record.outcome);
        }
        trace_state(&message_id, RelayState::Recorded);

        bump(&inner.counters.relayed);
        if summary.is_fully_recorded() {
            info!(
                cc_id = %cc_id,
                tier = %tier,
                succeeded = summary.succeeded,
                failed = summary.failed,
                skipped = summary.skipped,
                "Relay recorded"
            );
        } else {
            error!(
                cc_id = %cc_id,
                tier = %tier,
                succeeded = summary.succeeded,
                unrecorded = summary.unrecorded,
                "Relay partially recorded"
            );
        }

        let outcome = RelayOutcome::Recorded(summary);
        self.settle_source(&event, outcome.reaction()).await;
        trace_state(&message_id, RelayState::Done);
        Ok(outcome)
    }

    /// Send an administrative broadcast to every active channel.
    ///
    /// Broadcasts skip moderation, tier delays and delivery tracking.
    pub async fn broadcast(
        &self,
        kind: BroadcastKind,
        body: &str,
        issued_by: &UserId,
    ) -> Result<BroadcastReport> {
        broadcast::broadcast(
            &self.inner.registry,
            self.inner.platform.as_ref(),
            kind,
            body,
            issued_by,
        )
        .await
    }

    /// Edit every delivered copy of a relayed message after its source was edited.
    pub async fn propagate_edit(
        &self,
        source_message_id: &PlatformMessageId,
        new_content: &str,
    ) -> Result<EditReport> {
        let inner = &self.inner;
        let event = inner
            .store
            .find_event_by_source(source_message_id)
            .await?
            .ok_or_else(|| RelayError::not_found(format!("source message {}", source_message_id)))?;

        if event.is_retracted() {
            debug!(cc_id = %event.cc_id, "Edit ignored for retracted relay");
            return Ok(EditReport::default());
        }

        let content = truncate_content(new_content, inner.relay.max_content_length);
        if inner.gate.filter().is_blocked(&event.author_id, &content) {
            info!(cc_id = %event.cc_id, "Edited content blocked, copies left unchanged");
            return Ok(EditReport {
                blocked: true,
                ..Default::default()
            });
        }

        let rendered = RenderedMessage::new(
            event.tier,
            &event.author_display,
            &event.community_name,
            &event.author_id,
            &content,
            &event.cc_id,
        );

        let targets: Vec<(ChannelId, PlatformMessageId)> = inner
            .tracker
            .find_by_correlation(&event.cc_id)
            .await?
            .into_iter()
            .filter(|r| r.outcome == DeliveryOutcome::Success)
            .filter_map(|r| r.platform_message_id.map(|id| (r.destination_channel_id, id)))
            .collect();

        let edits = targets.iter().map(|(channel, message_id)| {
            let rendered = &rendered;
            async move { (channel, inner.platform.edit(channel, message_id, rendered).await) }
        });

        let mut report = EditReport {
            attempted: targets.len(),
            ..Default::default()
        };
        for (channel, result) in join_all(edits).await {
            match result {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    warn!(cc_id = %event.cc_id, channel_id = %channel, error = %e, "Edit failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            cc_id = %event.cc_id,
            attempted = report.attempted,
            succeeded = report.succeeded,
            "Edit propagated"
        );
        Ok(report)
    }

    /// Delete every delivered copy of a relay event.
    pub async fn retract(
        &self,
        cc_id: &CorrelationId,
        retracted_by: &UserId,
    ) -> Result<RetractionReport> {
        self.inner.tracker.retract(cc_id, retracted_by).await
    }

    fn ignored(&self, message_id: &PlatformMessageId, reason: IgnoreReason) -> RelayOutcome {
        bump(&self.inner.counters.ignored);
        debug!(message_id = %message_id, reason = %reason, "Inbound event ignored");
        RelayOutcome::Ignored(reason)
    }

    fn duplicate(&self, message_id: &PlatformMessageId) -> RelayOutcome {
        bump(&self.inner.counters.duplicates);
        debug!(message_id = %message_id, state = ?RelayState::Duplicate, "Relay state");
        RelayOutcome::Duplicate
    }

    async fn rejected(&self, event: &InboundEvent, reason: RejectReason) -> RelayOutcome {
        bump(&self.inner.counters.rejected);
        info!(
            message_id = %event.platform_message_id,
            author_id = %event.author.id,
            reason = %reason,
            state = ?RelayState::Rejected,
            "Relay rejected"
        );
        let outcome = RelayOutcome::Rejected { reason };
        if let Some(reaction) = outcome.reaction() {
            self.mark_source(event, reaction).await;
        }
        outcome
    }

    async fn mark_source(&self, event: &InboundEvent, reaction: Reaction) {
        if !self.inner.relay.status_reactions {
            return;
        }
        let result = self
            .inner
            .platform
            .react(&event.source_channel_id, &event.platform_message_id, reaction)
            .await;
        if let Err(e) = result {
            warn!(
                message_id = %event.platform_message_id,
                reaction = ?reaction,
                error = %e,
                "Failed to add reaction"
            );
        }
    }

    /// Replace the processing marker with the final one.
    async fn settle_source(&self, event: &InboundEvent, outcome: Option<Reaction>) {
        if !self.inner.relay.status_reactions {
            return;
        }
        let result = self
            .inner
            .platform
            .unreact(
                &event.source_channel_id,
                &event.platform_message_id,
                Reaction::Processing,
            )
            .await;
        if let Err(e) = result {
            debug!(
                message_id = %event.platform_message_id,
                error = %e,
                "Failed to remove processing reaction"
            );
        }
        if let Some(reaction) = outcome {
            self.mark_source(event, reaction).await;
        }
    }

    fn whole_relay_failure(&self, message_id: &PlatformMessageId, err: RelayError) -> RelayError {
        bump(&self.inner.counters.failed_relays);
        error!(message_id = %message_id, error = %err, "Relay aborted before fan-out");
        err
    }
}

impl Inner {
    /// Write a delivery record, retrying once after the leg backoff.
    ///
    /// Returns false if the record could not be written.
    async fn record_delivery(&self, record: &DeliveryRecord) -> bool {
        for attempt in 1..=2u32 {
            match self.tracker.record(record).await {
                Ok(()) => return true,
                // The first attempt landed after all.
                Err(RelayError::Store(e)) if attempt > 1 && e.is_conflict() => return true,
                Err(e) if attempt == 1 => {
                    warn!(
                        cc_id = %record.cc_id,
                        channel_id = %record.destination_channel_id,
                        error = %e,
                        "Delivery record write failed, retrying"
                    );
                    tokio::time::sleep(self.relay.retry_backoff()).await;
                }
                Err(e) => {
                    error!(
                        cc_id = %record.cc_id,
                        channel_id = %record.destination_channel_id,
                        platform_message_id = ?record.platform_message_id,
                        error = %e,
                        "Delivery record lost; copy is not retractable by correlation id"
                    );
                }
            }
        }
        false
    }

    /// Deliver to one destination: fresh attachments per attempt, one retry.
    async fn run_leg(
        &self,
        cc_id: CorrelationId,
        destination: ChannelId,
        message: Arc<RenderedMessage>,
        attachments: Arc<std::result::Result<Vec<PreparedAttachment>, String>>,
    ) -> DeliveryRecord {
        let mut attempts = 0;
        let mut last_error = String::new();

        for attempt in 1..=2u32 {
            if !self.destination_active(&destination).await {
                debug!(cc_id = %cc_id, channel_id = %destination, "Destination disabled mid-flight");
                return DeliveryRecord::skipped(cc_id, destination);
            }

            let sendable = match attachments.as_ref() {
                Ok(prepared) => self.forwarder.instantiate_all(prepared),
                Err(e) => {
                    let err = RelayError::AttachmentUnavailable(e.clone());
                    return DeliveryRecord::failed(cc_id, destination, err.to_string(), attempts);
                }
            };

            attempts = attempt;
            match self.platform.send(&destination, &message, sendable).await {
                Ok(platform_message_id) => {
                    debug!(cc_id = %cc_id, channel_id = %destination, attempt, "Delivered");
                    return DeliveryRecord::success(cc_id, destination, platform_message_id, attempts);
                }
                Err(e) => {
                    let err = RelayError::send_failure(destination.clone(), e.to_string());
                    warn!(cc_id = %cc_id, channel_id = %destination, attempt, error = %err, "Send failed");
                    last_error = e.to_string();
                    if attempt == 1 {
                        tokio::time::sleep(self.relay.retry_backoff()).await;
                    }
                }
            }
        }

        DeliveryRecord::failed(cc_id, destination, last_error, attempts)
    }

    async fn destination_active(&self, destination: &ChannelId) -> bool {
        match self.registry.is_registered(destination).await {
            Ok(active) => active,
            Err(e) => {
                // The snapshot this leg came from was valid; keep going.
                warn!(channel_id = %destination, error = %e, "Registry check failed mid-flight");
                true
            }
        }
    }
}

fn trace_state(message_id: &PlatformMessageId, state: RelayState) {
    debug!(message_id = %message_id, state = ?state, "Relay state");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::InboundAttachment;
    use crate::message::InboundAuthor;
    use crate::testing::{FakePlatform, ScriptedModeration};
    use crate::traits::ModerationStatus;
    use crosschat_core::{RoleId, Tier};
    use crosschat_store::{DeliveryStore, MemoryStore};
    use tokio::time::Instant;

    struct Harness {
        engine: RelayEngine,
        store: Arc<MemoryStore>,
        platform: Arc<FakePlatform>,
        moderation: Arc<ScriptedModeration>,
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.roles.elite_vip_role_ids = vec!["elite".to_string()];
        config.roles.architect_vip_role_ids = vec!["architect".to_string()];
        config.moderation.blocked_words = vec!["forbidden".to_string()];
        config
    }

    async fn harness_with(config: Config, platform: FakePlatform, channels: usize) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let platform = Arc::new(platform);
        let moderation = Arc::new(ScriptedModeration::new());
        let engine = RelayEngine::new(&config, store.clone(), platform.clone(), moderation.clone())
            .unwrap();

        for i in 0..channels {
            engine
                .registry()
                .register(format!("c{}", i).into(), format!("g{}", i).into(), i == 2)
                .await
                .unwrap();
        }

        Harness {
            engine,
            store,
            platform,
            moderation,
        }
    }

    async fn harness(channels: usize) -> Harness {
        harness_with(config(), FakePlatform::new(), channels).await
    }

    fn event(id: &str, channel: &str, author: &str, roles: &[&str]) -> InboundEvent {
        InboundEvent {
            platform_message_id: id.into(),
            source_channel_id: channel.into(),
            community_id: format!("g{}", channel.trim_start_matches('c')).into(),
            community_name: "Source Guild".to_string(),
            author: InboundAuthor {
                id: author.into(),
                display_name: author.to_string(),
                is_bot: false,
                roles: roles.iter().map(|r| RoleId::new(*r)).collect(),
            },
            content: "hello everyone".to_string(),
            attachments: Vec::new(),
        }
    }

    fn recorded(outcome: RelayOutcome) -> RelaySummary {
        match outcome {
            RelayOutcome::Recorded(summary) => summary,
            other => panic!("expected Recorded, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_elite_fan_out_to_all_other_channels() {
        let h = harness(10).await;
        let start = Instant::now();

        let outcome = h.engine.handle(event("m1", "c0", "ana", &["elite"])).await.unwrap();
        let summary = recorded(outcome);
        let elapsed = start.elapsed();

        assert_eq!(summary.succeeded, 9);
        assert_eq!(summary.failed, 0);
        assert!(elapsed >= Duration::from_millis(250));
        assert!(elapsed < Duration::from_millis(300));

        let records = h.store.deliveries_for(&summary.cc_id).await.unwrap();
        assert_eq!(records.len(), 9);
        assert!(records.iter().all(|r| r.outcome == DeliveryOutcome::Success));
        assert!(records.iter().all(|r| r.destination_channel_id.as_str() != "c0"));

        let sent = h.platform.sent();
        assert_eq!(sent.len(), 9);
        assert!(sent[0].content.starts_with("**[💎 Elite] ana • Source Guild**"));
        assert_eq!(sent[0].footer, format!("{} • ID: ana", summary.cc_id.tag()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_banned_author_is_rejected() {
        let h = harness(4).await;
        h.moderation.ban("mallory");

        let outcome = h.engine.handle(event("m1", "c0", "mallory", &[])).await.unwrap();
        assert_eq!(
            outcome,
            RelayOutcome::Rejected {
                reason: RejectReason::Banned
            }
        );
        assert!(h.platform.sent().is_empty());
        assert!(h.store.find_event_by_source(&"m1".into()).await.unwrap().is_none());
        assert_eq!(h.engine.stats().rejected, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_moderation_outage_fails_closed() {
        let h = harness(3).await;
        h.moderation.set_unavailable(true);

        let outcome = h.engine.handle(event("m1", "c0", "bob", &[])).await.unwrap();
        assert_eq!(
            outcome,
            RelayOutcome::Rejected {
                reason: RejectReason::ModerationUnavailable
            }
        );
        assert!(h.platform.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_warning_threshold_and_blocked_content() {
        let mut config = config();
        config.moderation.max_warnings = Some(2);
        let h = harness_with(config, FakePlatform::new(), 3).await;
        h.moderation.set_status(
            "warned",
            ModerationStatus {
                active_ban: false,
                warning_count: 2,
            },
        );

        let outcome = h.engine.handle(event("m1", "c0", "warned", &[])).await.unwrap();
        assert_eq!(
            outcome,
            RelayOutcome::Rejected {
                reason: RejectReason::TooManyWarnings
            }
        );

        let mut blocked = event("m2", "c0", "bob", &[]);
        blocked.content = "this is FORBIDDEN".to_string();
        let outcome = h.engine.handle(blocked).await.unwrap();
        assert_eq!(
            outcome,
            RelayOutcome::Rejected {
                reason: RejectReason::BlockedContent
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_destination_is_recorded_failed() {
        let h = harness(10).await;
        h.platform.fail_always("c7");

        let summary = recorded(h.engine.handle(event("m1", "c0", "bob", &[])).await.unwrap());
        assert_eq!(summary.succeeded, 8);
        assert_eq!(summary.failed, 1);

        let records = h.store.deliveries_for(&summary.cc_id).await.unwrap();
        assert_eq!(records.len(), 9);
        let failed = records
            .iter()
            .find(|r| r.destination_channel_id.as_str() == "c7")
            .unwrap();
        assert_eq!(failed.outcome, DeliveryOutcome::Failed);
        assert_eq!(failed.attempts, 2);
        assert!(failed.platform_message_id.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried_once() {
        let h = harness(3).await;
        h.platform.fail_sends("c1", 1);

        let summary = recorded(h.engine.handle(event("m1", "c0", "bob", &[])).await.unwrap());
        assert_eq!(summary.succeeded, 2);

        let records = h.store.deliveries_for(&summary.cc_id).await.unwrap();
        let retried = records
            .iter()
            .find(|r| r.destination_channel_id.as_str() == "c1")
            .unwrap();
        assert_eq!(retried.outcome, DeliveryOutcome::Success);
        assert_eq!(retried.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_triggers_fan_out_once() {
        let h = harness(5).await;

        let first = h.engine.spawn(event("m1", "c0", "bob", &[])).unwrap();
        let second = h.engine.spawn(event("m1", "c0", "bob", &[])).unwrap();
        let outcomes = vec![first.await.unwrap().unwrap(), second.await.unwrap().unwrap()];

        let recorded_count = outcomes
            .iter()
            .filter(|o| matches!(o, RelayOutcome::Recorded(_)))
            .count();
        assert_eq!(recorded_count, 1);
        assert!(outcomes.contains(&RelayOutcome::Duplicate));
        assert_eq!(h.platform.sent().len(), 4);

        // A later redelivery is still a duplicate.
        let third = h.engine.handle(event("m1", "c0", "bob", &[])).await.unwrap();
        assert_eq!(third, RelayOutcome::Duplicate);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persisted_event_survives_engine_restart() {
        let h = harness(3).await;
        recorded(h.engine.handle(event("m1", "c0", "bob", &[])).await.unwrap());

        // Fresh engine, empty dedup set, same store.
        let engine = RelayEngine::new(
            &config(),
            h.store.clone(),
            h.platform.clone(),
            h.moderation.clone(),
        )
        .unwrap();
        let outcome = engine.handle(event("m1", "c0", "bob", &[])).await.unwrap();
        assert_eq!(outcome, RelayOutcome::Duplicate);
        assert_eq!(h.platform.sent().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tier_delay_ordering() {
        let h = harness(4).await;
        let start = Instant::now();

        // c2 belongs to a partner community.
        let handles = vec![
            ("regular", h.engine.spawn(event("m-reg", "c0", "reg", &[])).unwrap()),
            ("partner", h.engine.spawn(event("m-par", "c2", "par", &[])).unwrap()),
            ("architect", h.engine.spawn(event("m-arc", "c1", "arc", &["architect"])).unwrap()),
            ("elite", h.engine.spawn(event("m-eli", "c3", "eli", &["elite"])).unwrap()),
        ];
        for (_, handle) in handles {
            recorded(handle.await.unwrap().unwrap());
        }

        let first_delivery = |author: &str| {
            h.platform
                .sent()
                .iter()
                .filter(|s| s.footer.ends_with(&format!("ID: {}", author)))
                .map(|s| s.at.duration_since(start))
                .min()
                .unwrap()
        };

        let elite = first_delivery("eli");
        let architect = first_delivery("arc");
        let partner = first_delivery("par");
        let regular = first_delivery("reg");
        assert!(elite < architect);
        assert!(architect < partner);
        assert!(partner < regular);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attachments_are_independent_per_destination() {
        let h = harness(4).await;
        let mut inbound = event("m1", "c0", "bob", &[]);
        inbound.attachments = vec![InboundAttachment::from_bytes(
            vec![1u8, 2, 3, 4],
            "pic.png",
            "image/png",
        )];

        let summary = recorded(h.engine.handle(inbound).await.unwrap());
        assert_eq!(summary.succeeded, 3);

        let sent = h.platform.sent();
        assert_eq!(sent.len(), 3);
        for message in sent {
            assert_eq!(message.attachments, vec![("pic.png".to_string(), vec![1u8, 2, 3, 4])]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_attachment_fails_legs_not_relay() {
        let h = harness(3).await;
        let mut inbound = event("m1", "c0", "bob", &[]);
        inbound.attachments = vec![InboundAttachment::from_path("/nonexistent/pic.png")];

        let summary = recorded(h.engine.handle(inbound).await.unwrap());
        assert_eq!(summary.failed, 2);
        assert!(h.platform.sent().is_empty());

        let records = h.store.deliveries_for(&summary.cc_id).await.unwrap();
        assert!(records
            .iter()
            .all(|r| r.error.as_deref().unwrap_or_default().contains("Attachment unavailable")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deregistered_mid_flight_is_skipped() {
        let h = harness(3).await;
        h.platform.fail_sends("c2", 1);

        let engine = h.engine.clone();
        let handle = tokio::spawn(async move { engine.handle(event("m1", "c0", "bob", &[])).await });

        // Past the regular delay, inside c2's retry backoff.
        tokio::time::sleep(Duration::from_millis(1200)).await;
        h.engine.registry().deregister(&"c2".into()).await.unwrap();

        let summary = recorded(handle.await.unwrap().unwrap());
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.skipped, 1);
        assert!(h.platform.sent().iter().all(|s| s.channel.as_str() != "c2"));

        // Subsequent relays never include the disabled channel.
        let next = recorded(h.engine.handle(event("m2", "c0", "bob", &[])).await.unwrap());
        assert_eq!(next.total(), 1);
        let records = h.store.deliveries_for(&next.cc_id).await.unwrap();
        assert!(records.iter().all(|r| r.destination_channel_id.as_str() != "c2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_outage_aborts_relay() {
        let h = harness(3).await;
        h.engine.registry().invalidate().await;
        h.store.set_offline(true);

        let err = h.engine.handle(event("m1", "c0", "bob", &[])).await.unwrap_err();
        assert!(matches!(err, RelayError::RegistryUnavailable(_)));
        assert!(h.platform.sent().is_empty());
        assert_eq!(h.engine.stats().failed_relays, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pre_filter_ignores_without_consuming_dedup() {
        let h = harness(3).await;

        let mut bot = event("m1", "c0", "bot", &[]);
        bot.author.is_bot = true;
        assert_eq!(
            h.engine.handle(bot).await.unwrap(),
            RelayOutcome::Ignored(IgnoreReason::BotAuthor)
        );

        let mut empty = event("m2", "c0", "bob", &[]);
        empty.content = "   ".to_string();
        assert_eq!(
            h.engine.handle(empty).await.unwrap(),
            RelayOutcome::Ignored(IgnoreReason::Empty)
        );

        assert_eq!(
            h.engine.handle(event("m3", "elsewhere", "bob", &[])).await.unwrap(),
            RelayOutcome::Ignored(IgnoreReason::UnregisteredSource)
        );

        // The same message id is still relayable once its channel is registered.
        h.engine
            .registry()
            .register("elsewhere".into(), "g9".into(), false)
            .await
            .unwrap();
        let summary = recorded(h.engine.handle(event("m3", "elsewhere", "bob", &[])).await.unwrap());
        assert_eq!(summary.succeeded, 3);
        assert_eq!(h.engine.stats().ignored, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_switch_off_rejects() {
        let mut config = config();
        config.relay.enabled = false;
        let h = harness_with(config, FakePlatform::new(), 3).await;

        let outcome = h.engine.handle(event("m1", "c0", "bob", &[])).await.unwrap();
        assert_eq!(
            outcome,
            RelayOutcome::Rejected {
                reason: RejectReason::RelayDisabled
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_content_is_truncated() {
        let mut config = config();
        config.relay.max_content_length = 10;
        let h = harness_with(config, FakePlatform::new(), 2).await;

        let mut long = event("m1", "c0", "bob", &[]);
        long.content = "x".repeat(50);
        recorded(h.engine.handle(long).await.unwrap());

        let sent = h.platform.sent();
        assert!(sent[0].content.ends_with(&format!("{}…", "x".repeat(9))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_propagates_to_delivered_copies() {
        let h = harness(4).await;
        h.platform.fail_always("c3");
        recorded(h.engine.handle(event("m1", "c0", "bob", &["architect"])).await.unwrap());

        let source: PlatformMessageId = "m1".into();
        let report = h.engine.propagate_edit(&source, "hello, edited").await.unwrap();
        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 2);

        let edits = h.platform.edits();
        assert_eq!(edits.len(), 2);
        assert!(edits[0].2.starts_with("**[⭐ Architect] bob"));
        assert!(edits[0].2.ends_with("hello, edited"));

        let report = h.engine.propagate_edit(&source, "now forbidden").await.unwrap();
        assert!(report.blocked);
        assert_eq!(h.platform.edits().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_after_retraction_is_noop() {
        let h = harness(3).await;
        let summary = recorded(h.engine.handle(event("m1", "c0", "bob", &[])).await.unwrap());

        let report = h.engine.retract(&summary.cc_id, &UserId::new("admin")).await.unwrap();
        assert_eq!(report.destinations_succeeded, 2);

        let report = h.engine.propagate_edit(&"m1".into(), "changed").await.unwrap();
        assert_eq!(report, EditReport::default());

        let err = h
            .engine
            .propagate_edit(&"unknown".into(), "changed")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drains_and_refuses_new_events() {
        let h = harness(3).await;
        let handle = h.engine.spawn(event("m1", "c0", "bob", &[])).unwrap();

        assert!(h.engine.shutdown(Duration::from_secs(5)).await);
        recorded(handle.await.unwrap().unwrap());
        assert!(h.engine.spawn(event("m2", "c0", "bob", &[])).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_abandons_after_grace() {
        let h = harness_with(config(), FakePlatform::with_latency(Duration::from_secs(60)), 3).await;
        let _handle = h.engine.spawn(event("m1", "c0", "bob", &[])).unwrap();

        assert!(!h.engine.shutdown(Duration::from_secs(2)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_write_is_retried_after_store_blip() {
        let platform = FakePlatform::with_latency(Duration::from_millis(100));
        let h = harness_with(config(), platform, 3).await;
        let engine = h.engine.clone();
        let handle = tokio::spawn(async move { engine.handle(event("m1", "c0", "bob", &[])).await });

        // Sends land at 1100ms; the first record writes fail.
        tokio::time::sleep(Duration::from_millis(1050)).await;
        h.store.set_offline(true);
        tokio::time::sleep(Duration::from_millis(250)).await;
        h.store.set_offline(false);

        let summary = recorded(handle.await.unwrap().unwrap());
        assert_eq!(summary.succeeded, 2);
        assert!(summary.is_fully_recorded());
        assert_eq!(h.store.deliveries_for(&summary.cc_id).await.unwrap().len(), 2);

        let report = h.engine.retract(&summary.cc_id, &UserId::new("admin")).await.unwrap();
        assert_eq!(report.destinations_succeeded, 2);
        assert_eq!(h.platform.deleted().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_record_writes_are_reported() {
        let platform = FakePlatform::with_latency(Duration::from_millis(100));
        let h = harness_with(config(), platform, 3).await;
        let engine = h.engine.clone();
        let handle = tokio::spawn(async move { engine.handle(event("m1", "c0", "bob", &[])).await });

        tokio::time::sleep(Duration::from_millis(1050)).await;
        h.store.set_offline(true);
        let summary = recorded(handle.await.unwrap().unwrap());
        h.store.set_offline(false);

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.unrecorded, 2);
        assert!(!summary.is_fully_recorded());
        assert_eq!(h.engine.stats().legs_unrecorded, 2);
        assert!(h.store.deliveries_for(&summary.cc_id).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_outage_on_dedup_lookup_counts_as_failed_relay() {
        let h = harness(3).await;
        recorded(h.engine.handle(event("m0", "c0", "bob", &[])).await.unwrap());

        // Registry stays cached; only the event lookup hits the store.
        h.store.set_offline(true);
        let err = h.engine.handle(event("m1", "c0", "bob", &[])).await.unwrap_err();
        assert!(matches!(err, RelayError::Store(_)));
        assert_eq!(h.engine.stats().failed_relays, 1);
        assert_eq!(h.platform.sent().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_message_gets_status_reactions() {
        let h = harness(4).await;
        recorded(h.engine.handle(event("m1", "c0", "bob", &[])).await.unwrap());
        assert_eq!(h.platform.reactions("m1"), vec![Reaction::Delivered]);

        h.moderation.ban("mallory");
        h.engine.handle(event("m2", "c0", "mallory", &[])).await.unwrap();
        assert_eq!(h.platform.reactions("m2"), vec![Reaction::Banned]);

        let mut blocked = event("m3", "c0", "bob", &[]);
        blocked.content = "forbidden words".to_string();
        h.engine.handle(blocked).await.unwrap();
        assert_eq!(h.platform.reactions("m3"), vec![Reaction::Blocked]);

        for channel in ["c1", "c2", "c3"] {
            h.platform.fail_always(channel);
        }
        let summary = recorded(h.engine.handle(event("m4", "c0", "bob", &[])).await.unwrap());
        assert_eq!(summary.failed, 3);
        assert_eq!(h.platform.reactions("m4"), vec![Reaction::Failed]);

        // Duplicates leave the original marks alone.
        assert_eq!(
            h.engine.handle(event("m1", "c0", "bob", &[])).await.unwrap(),
            RelayOutcome::Duplicate
        );
        assert_eq!(h.platform.reactions("m1"), vec![Reaction::Delivered]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reactions_can_be_switched_off() {
        let mut config = config();
        config.relay.status_reactions = false;
        let h = harness_with(config, FakePlatform::new(), 3).await;

        recorded(h.engine.handle(event("m1", "c0", "bob", &[])).await.unwrap());
        assert!(h.platform.reactions("m1").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_broadcast_uses_active_registry() {
        let h = harness(3).await;
        let report = h
            .engine
            .broadcast(BroadcastKind::SystemAlert, "relay restarting", &UserId::new("ops"))
            .await
            .unwrap();
        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 3);
        assert!(h.platform.sent().iter().all(|s| s.content.contains("System Alert")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tier_is_persisted_with_event() {
        let h = harness(3).await;
        let summary = recorded(h.engine.handle(event("m1", "c2", "bob", &[])).await.unwrap());
        let stored = h.store.get_event(&summary.cc_id).await.unwrap().unwrap();
        assert_eq!(stored.tier, Tier::Partner);
        assert_eq!(stored.source_message_id.as_str(), "m1");
    }
}
