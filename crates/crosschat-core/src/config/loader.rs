//! Configuration loading and persistence.

use super::{Config, DiscordConfig, RelayConfig};
use crate::env;
use crate::error::ConfigError;
use crate::paths;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = paths::config_file()?;
        Self::load(&path)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        debug!(path = %path.display(), "Loading configuration");
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Json5(e.to_string()))
    }

    /// Save configuration to a file path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_json5()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Serialize to JSON5 string.
    pub fn to_json5(&self) -> Result<String, ConfigError> {
        // json5 doesn't have a serializer, so we use serde_json with pretty print
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from an explicit path if given, otherwise from the default location.
    ///
    /// A missing default file yields defaults; a missing explicit file is an error.
    /// Environment overrides are applied in both cases.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => match Self::load_default() {
                Ok(config) => config,
                Err(ConfigError::NotFound(_)) => Self::default(),
                Err(e) => return Err(e),
            },
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides on top of file values.
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = env::get_var(env::vars::CROSSCHAT_DATABASE_URL) {
            self.store.database_url = url;
        }
        if let Some(endpoint) = env::get_var(env::vars::CROSSCHAT_MODERATION_URL) {
            self.moderation.endpoint = Some(endpoint);
        }
        if let Some(token) = env::get_var(env::vars::DISCORD_BOT_TOKEN) {
            self.discord = Some(DiscordConfig {
                bot_token: token.into(),
            });
        }
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        // 1. Tier delay precedence must be preserved
        let d = &self.relay.tier_delays_ms;
        if !(d.elite_vip <= d.architect_vip && d.architect_vip <= d.partner && d.partner <= d.regular)
        {
            errors.push(format!(
                "Tier delays must be ordered elite_vip <= architect_vip <= partner <= regular, got {}/{}/{}/{}",
                d.elite_vip, d.architect_vip, d.partner, d.regular
            ));
        }

        // 2. Dedup retention must be bounded and non-empty
        if self.relay.dedup_capacity == 0 {
            errors.push("relay.dedup_capacity must be greater than 0".to_string());
        }
        if self.relay.dedup_ttl_secs == 0 {
            errors.push("relay.dedup_ttl_secs must be greater than 0".to_string());
        }

        if self.relay.max_content_length == 0 {
            errors.push("relay.max_content_length must be greater than 0".to_string());
        }

        // 3. Content filter patterns must compile
        for pattern in &self.moderation.blocked_patterns {
            if let Err(e) = Regex::new(pattern) {
                errors.push(format!("Invalid blocked pattern '{}': {}", pattern, e));
            }
        }

        // 4. Moderation endpoint must look like a URL
        if let Some(endpoint) = &self.moderation.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                errors.push(format!(
                    "moderation.endpoint '{}' must start with http:// or https://",
                    endpoint
                ));
            }
        }

        // 5. A role cannot grant two tiers
        for role in &self.roles.elite_vip_role_ids {
            if self.roles.architect_vip_role_ids.contains(role) {
                errors.push(format!("Role '{}' is listed as both elite and architect VIP", role));
            }
        }

        if self.attachments.max_bytes == 0 {
            errors.push("attachments.max_bytes must be greater than 0".to_string());
        }

        if let Some(discord) = &self.discord {
            if discord.bot_token.is_empty() {
                errors.push("Discord is configured but bot_token is empty".to_string());
            }
            // Serving requires an explicit moderation decision.
            if self.moderation.endpoint.is_none() && !self.moderation.disabled {
                errors.push(
                    "Discord is configured without moderation.endpoint; set one, or set moderation.disabled to relay without ban checks"
                        .to_string(),
                );
            }
        }

        if self.store.database_url.trim().is_empty() {
            errors.push("store.database_url must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }
}

impl RelayConfig {
    /// Backoff before a failed leg or delivery record write is retried.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.relay.enabled);
        assert_eq!(config.relay.tier_delays_ms.elite_vip, 250);
        assert_eq!(config.relay.tier_delays_ms.regular, 1000);
    }

    #[test]
    fn test_parse_json5_with_partial_sections() {
        let config = Config::parse(
            r#"{
                // comments are allowed
                relay: { tier_delays_ms: { elite_vip: 0, architect_vip: 75 } },
                roles: { elite_vip_role_ids: ["111"] },
                moderation: { blocked_words: ["scam"], max_warnings: 3 },
            }"#,
        )
        .unwrap();

        assert_eq!(config.relay.tier_delays_ms.elite_vip, 0);
        assert_eq!(config.relay.tier_delays_ms.architect_vip, 75);
        assert_eq!(config.relay.tier_delays_ms.partner, 750);
        assert_eq!(config.roles.elite_vip_role_ids, vec!["111".to_string()]);
        assert_eq!(config.moderation.max_warnings, Some(3));
        assert_eq!(config.relay.dedup_capacity, 1000);
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = Config::default();
        config.relay.tier_delays_ms.elite_vip = 2000;
        config.relay.dedup_capacity = 0;
        config.moderation.blocked_patterns = vec!["(unclosed".to_string()];
        config.moderation.endpoint = Some("ftp://mod".to_string());

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("Tier delays"));
        assert!(err.contains("dedup_capacity"));
        assert!(err.contains("(unclosed"));
        assert!(err.contains("ftp://mod"));
    }

    #[test]
    fn test_validate_rejects_overlapping_roles() {
        let mut config = Config::default();
        config.roles.elite_vip_role_ids = vec!["42".to_string()];
        config.roles.architect_vip_role_ids = vec!["42".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_discord_requires_moderation_decision() {
        let mut config = Config::default();
        config.discord = Some(DiscordConfig {
            bot_token: "token".into(),
        });
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("moderation.endpoint"));

        config.moderation.endpoint = Some("https://mod.example".to_string());
        assert!(config.validate().is_ok());

        config.moderation.endpoint = None;
        config.moderation.disabled = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("crosschat.json5");

        let mut config = Config::default();
        config.relay.retry_backoff_ms = 123;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.relay.retry_backoff_ms, 123);
        assert_eq!(loaded.relay.retry_backoff(), Duration::from_millis(123));
    }

    #[test]
    fn test_resolve_missing_explicit_path_fails() {
        let result = Config::resolve(Some(Path::new("/nonexistent/crosschat.json5")));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }
}
