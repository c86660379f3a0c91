//! Configuration schema definitions.

use crate::secret::SecretString;
use serde::{Deserialize, Serialize};

/// Main CrossChat configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Relay engine tuning.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Role ids that grant VIP tiers.
    #[serde(default)]
    pub roles: RolesConfig,

    /// Moderation subsystem and content filter.
    #[serde(default)]
    pub moderation: ModerationConfig,

    /// Attachment intake limits.
    #[serde(default)]
    pub attachments: AttachmentsConfig,

    /// Backing store.
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Discord gateway settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discord: Option<DiscordConfig>,
}

/// Relay engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Global relay switch.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Per-tier pre-dispatch delays.
    #[serde(default)]
    pub tier_delays_ms: TierDelays,

    /// Backoff before the single retry of a failed leg.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Maximum inbound message ids remembered for deduplication.
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,

    /// How long an inbound message id is remembered.
    #[serde(default = "default_dedup_ttl_secs")]
    pub dedup_ttl_secs: u64,

    /// How long the registry cache may serve reads before reloading.
    #[serde(default = "default_registry_cache_ttl_secs")]
    pub registry_cache_ttl_secs: u64,

    /// Content longer than this is truncated before fan-out.
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,

    /// Grace period for in-flight dispatches at shutdown.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Mark the author's source message with processing and outcome reactions.
    #[serde(default = "default_true")]
    pub status_reactions: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tier_delays_ms: TierDelays::default(),
            retry_backoff_ms: default_retry_backoff_ms(),
            dedup_capacity: default_dedup_capacity(),
            dedup_ttl_secs: default_dedup_ttl_secs(),
            registry_cache_ttl_secs: default_registry_cache_ttl_secs(),
            max_content_length: default_max_content_length(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            status_reactions: true,
        }
    }
}

/// Pre-dispatch delay per tier, in milliseconds.
///
/// The magnitudes are policy; only the ordering elite < architect < partner
/// < regular is checked by validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierDelays {
    #[serde(default = "default_elite_delay")]
    pub elite_vip: u64,

    #[serde(default = "default_architect_delay")]
    pub architect_vip: u64,

    #[serde(default = "default_partner_delay")]
    pub partner: u64,

    #[serde(default = "default_regular_delay")]
    pub regular: u64,
}

impl Default for TierDelays {
    fn default() -> Self {
        Self {
            elite_vip: default_elite_delay(),
            architect_vip: default_architect_delay(),
            partner: default_partner_delay(),
            regular: default_regular_delay(),
        }
    }
}

/// Role ids that grant VIP tiers. An author holding any listed role qualifies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RolesConfig {
    #[serde(default)]
    pub elite_vip_role_ids: Vec<String>,

    #[serde(default)]
    pub architect_vip_role_ids: Vec<String>,
}

/// Moderation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// Base URL of the external moderation subsystem.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Relay without ban and warning checks when no endpoint is set.
    ///
    /// Only the local content filter applies then.
    #[serde(default)]
    pub disabled: bool,

    /// Request timeout for verdict lookups.
    #[serde(default = "default_moderation_timeout_ms")]
    pub timeout_ms: u64,

    /// Reject authors whose warning count reaches this value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_warnings: Option<u32>,

    /// Case-insensitive blocked words.
    #[serde(default)]
    pub blocked_words: Vec<String>,

    /// Blocked regex patterns.
    #[serde(default)]
    pub blocked_patterns: Vec<String>,

    /// Author ids exempt from the content filter (never from bans).
    #[serde(default)]
    pub allowlist: Vec<String>,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            disabled: false,
            timeout_ms: default_moderation_timeout_ms(),
            max_warnings: None,
            blocked_words: Vec::new(),
            blocked_patterns: Vec::new(),
            allowlist: Vec::new(),
        }
    }
}

/// Attachment intake configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentsConfig {
    /// Largest attachment accepted, in bytes.
    #[serde(default = "default_max_attachment_bytes")]
    pub max_bytes: usize,

    /// Timeout for downloading URL-backed attachments.
    #[serde(default = "default_download_timeout_ms")]
    pub download_timeout_ms: u64,
}

impl Default for AttachmentsConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_attachment_bytes(),
            download_timeout_ms: default_download_timeout_ms(),
        }
    }
}

/// Backing store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path, or `:memory:`.
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Discord gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Bot token.
    pub bot_token: SecretString,
}

fn default_true() -> bool {
    true
}

fn default_elite_delay() -> u64 {
    250
}

fn default_architect_delay() -> u64 {
    500
}

fn default_partner_delay() -> u64 {
    750
}

fn default_regular_delay() -> u64 {
    1000
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_dedup_capacity() -> usize {
    1000
}

fn default_dedup_ttl_secs() -> u64 {
    600
}

fn default_registry_cache_ttl_secs() -> u64 {
    30
}

fn default_max_content_length() -> usize {
    2000
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

fn default_moderation_timeout_ms() -> u64 {
    2000
}

fn default_max_attachment_bytes() -> usize {
    25 * 1024 * 1024
}

fn default_download_timeout_ms() -> u64 {
    15_000
}

fn default_database_url() -> String {
    "~/.crosschat/crosschat.db".to_string()
}

fn default_log_level() -> String {
    "crosschat=info".to_string()
}
