//! Config save/load roundtrip integration tests.

use crosschat_cli::commands::config::{init, redacted_json};
use crosschat_core::config::{Config, DiscordConfig};
use std::path::Path;
use tempfile::TempDir;

#[test]
fn test_config_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("crosschat.json5");

    let config = Config::default();
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.relay.tier_delays_ms, config.relay.tier_delays_ms);
    assert_eq!(loaded.relay.dedup_capacity, config.relay.dedup_capacity);
    assert_eq!(loaded.store.database_url, config.store.database_url);
}

#[test]
fn test_config_modify_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("crosschat.json5");

    let mut config = Config::default();
    config.relay.tier_delays_ms.regular = 1500;
    config.roles.elite_vip_role_ids = vec!["900".to_string()];
    config.discord = Some(DiscordConfig {
        bot_token: "token-value".into(),
    });
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.relay.tier_delays_ms.regular, 1500);
    assert_eq!(loaded.roles.elite_vip_role_ids, vec!["900".to_string()]);
    assert_eq!(
        loaded.discord.unwrap().bot_token.expose_secret(),
        "token-value"
    );
}

#[test]
fn test_cli_init_writes_loadable_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("crosschat.json5");

    init(&path, false).unwrap();
    let loaded = Config::load(&path).unwrap();
    loaded.validate().unwrap();

    let shown = redacted_json(&loaded).unwrap();
    assert!(shown.get("discord").is_none());
}

#[test]
fn test_discord_config_needs_moderation_decision() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("crosschat.json5");

    let mut config = Config::default();
    config.discord = Some(DiscordConfig {
        bot_token: "token-value".into(),
    });
    config.save(&path).unwrap();
    assert!(Config::load(&path).unwrap().validate().is_err());

    config.moderation.disabled = true;
    config.save(&path).unwrap();
    let loaded = Config::load(&path).unwrap();
    assert!(loaded.moderation.disabled);
    loaded.validate().unwrap();
}

#[test]
fn test_config_load_nonexistent() {
    let result = Config::load(Path::new("/nonexistent/crosschat.json5"));
    assert!(result.is_err());
}

#[test]
fn test_config_parse_invalid() {
    let result = Config::parse("not valid json");
    assert!(result.is_err());
}
