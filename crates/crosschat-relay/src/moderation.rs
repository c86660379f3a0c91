//! Admission control: external ban/warning state plus a local content filter.

use crate::error::RelayError;
use crate::traits::{ModerationService, ModerationStatus};
use crate::Result;
use aho_corasick::AhoCorasick;
use async_trait::async_trait;
use crosschat_core::config::ModerationConfig;
use crosschat_core::{CommunityId, UserId};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Why a message was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Author has an active cross-chat ban.
    Banned,

    /// Source community is banned.
    ServerBanned,

    /// Author reached the configured warning threshold.
    TooManyWarnings,

    /// Content matched the local blocklist.
    BlockedContent,

    /// The moderation subsystem could not be consulted.
    ModerationUnavailable,

    /// Relaying is switched off globally.
    RelayDisabled,
}

impl RejectReason {
    /// Stable name shown to authors and in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::Banned => "banned",
            RejectReason::ServerBanned => "server_banned",
            RejectReason::TooManyWarnings => "too_many_warnings",
            RejectReason::BlockedContent => "blocked_content",
            RejectReason::ModerationUnavailable => "moderation_unavailable",
            RejectReason::RelayDisabled => "relay_disabled",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Admission decision for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationVerdict {
    /// Whether the message may be relayed.
    pub allowed: bool,

    /// Reason when not allowed.
    pub reason: Option<RejectReason>,

    /// Ban state reported by the subsystem.
    pub active_ban: bool,

    /// Warning count reported by the subsystem.
    pub warning_count: u32,
}

impl ModerationVerdict {
    fn allow(status: ModerationStatus) -> Self {
        Self {
            allowed: true,
            reason: None,
            active_ban: status.active_ban,
            warning_count: status.warning_count,
        }
    }

    fn reject(reason: RejectReason, status: ModerationStatus) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            active_ban: status.active_ban,
            warning_count: status.warning_count,
        }
    }
}

/// Word and pattern blocklist with an allow-list of exempt authors.
pub struct ContentFilter {
    words: Option<AhoCorasick>,
    patterns: Vec<Regex>,
    allowlist: HashSet<UserId>,
}

impl fmt::Debug for ContentFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentFilter")
            .field("patterns", &self.patterns.len())
            .field("allowlist", &self.allowlist.len())
            .finish()
    }
}

impl ContentFilter {
    /// Build the filter from moderation settings.
    pub fn new(config: &ModerationConfig) -> Result<Self> {
        let words: Vec<&str> = config
            .blocked_words
            .iter()
            .map(|w| w.trim())
            .filter(|w| !w.is_empty())
            .collect();

        let words = if words.is_empty() {
            None
        } else {
            let automaton = AhoCorasick::builder()
                .ascii_case_insensitive(true)
                .build(&words)
                .map_err(|e| RelayError::Config(crosschat_core::ConfigError::Validation(e.to_string())))?;
            Some(automaton)
        };

        let patterns = config
            .blocked_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    RelayError::Config(crosschat_core::ConfigError::Validation(format!(
                        "Invalid blocked pattern '{}': {}",
                        p, e
                    )))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            words,
            patterns,
            allowlist: config.allowlist.iter().map(UserId::new).collect(),
        })
    }

    /// Whether `content` from `author` must be blocked.
    pub fn is_blocked(&self, author: &UserId, content: &str) -> bool {
        if self.allowlist.contains(author) {
            return false;
        }
        if let Some(words) = &self.words {
            if words.is_match(content) {
                return true;
            }
        }
        self.patterns.iter().any(|p| p.is_match(content))
    }
}

/// Fail-closed admission gate in front of fan-out.
pub struct ModerationGate {
    service: Arc<dyn ModerationService>,
    filter: ContentFilter,
    max_warnings: Option<u32>,
}

impl ModerationGate {
    /// Create a gate over a moderation service.
    pub fn new(service: Arc<dyn ModerationService>, config: &ModerationConfig) -> Result<Self> {
        Ok(Self {
            service,
            filter: ContentFilter::new(config)?,
            max_warnings: config.max_warnings,
        })
    }

    /// The local content filter.
    pub fn filter(&self) -> &ContentFilter {
        &self.filter
    }

    /// Decide whether a message may be relayed.
    ///
    /// Never errors: an unreachable subsystem yields a rejection with
    /// [`RejectReason::ModerationUnavailable`].
    pub async fn evaluate(
        &self,
        author: &UserId,
        community: &CommunityId,
        content: &str,
    ) -> ModerationVerdict {
        let status = match self.service.get_verdict(author).await {
            Ok(status) => status,
            Err(e) => {
                warn!(author_id = %author, error = %e, "Moderation verdict unavailable");
                return ModerationVerdict::reject(
                    RejectReason::ModerationUnavailable,
                    ModerationStatus::default(),
                );
            }
        };

        if status.active_ban {
            return ModerationVerdict::reject(RejectReason::Banned, status);
        }

        match self.service.community_banned(community).await {
            Ok(true) => return ModerationVerdict::reject(RejectReason::ServerBanned, status),
            Ok(false) => {}
            Err(e) => {
                warn!(community_id = %community, error = %e, "Community ban state unavailable");
                return ModerationVerdict::reject(RejectReason::ModerationUnavailable, status);
            }
        }

        if let Some(max) = self.max_warnings {
            if status.warning_count >= max {
                return ModerationVerdict::reject(RejectReason::TooManyWarnings, status);
            }
        }

        if self.filter.is_blocked(author, content) {
            debug!(author_id = %author, "Content blocked by filter");
            return ModerationVerdict::reject(RejectReason::BlockedContent, status);
        }

        ModerationVerdict::allow(status)
    }
}

#[derive(Debug, Deserialize)]
struct CommunityBanResponse {
    #[serde(default)]
    banned: bool,
}

/// HTTP client for the external moderation subsystem.
///
/// `GET {endpoint}/users/{id}/verdict` returns `{active_ban, warning_count}`;
/// `GET {endpoint}/communities/{id}/ban` returns `{banned}`. Any non-success
/// response is reported as unavailable.
#[derive(Debug, Clone)]
pub struct HttpModerationClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpModerationClient {
    /// Create a client for `endpoint` with a per-request timeout.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T> {
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RelayError::ModerationUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RelayError::ModerationUnavailable(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| RelayError::ModerationUnavailable(e.to_string()))
    }
}

#[async_trait]
impl ModerationService for HttpModerationClient {
    async fn get_verdict(&self, author: &UserId) -> Result<ModerationStatus> {
        self.get_json(format!("{}/users/{}/verdict", self.endpoint, author))
            .await
    }

    async fn community_banned(&self, community: &CommunityId) -> Result<bool> {
        let response: CommunityBanResponse = self
            .get_json(format!("{}/communities/{}/ban", self.endpoint, community))
            .await?;
        Ok(response.banned)
    }
}
