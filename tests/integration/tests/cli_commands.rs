//! CLI command routing and execution against a real store.

use clap::Parser;
use crosschat_cli::commands::channels::{execute, ChannelsCommand};
use crosschat_cli::{Cli, Commands};
use crosschat_relay::ChannelRegistry;
use crosschat_store::SqliteStore;
use std::sync::Arc;
use std::time::Duration;

fn channels_command(args: &[&str]) -> ChannelsCommand {
    let mut argv = vec!["crosschat", "channels"];
    argv.extend_from_slice(args);
    match Cli::try_parse_from(argv).unwrap().command {
        Commands::Channels(args) => args.command,
        _ => panic!("Expected Channels command"),
    }
}

#[tokio::test]
async fn test_channel_administration_persists() {
    let dir = tempfile::tempdir().unwrap();
    let url = dir.path().join("crosschat.db").to_string_lossy().to_string();

    {
        let store = Arc::new(SqliteStore::connect(&url).await.unwrap());
        let registry = ChannelRegistry::new(store.clone(), Duration::from_secs(30));

        for channel in ["101", "102", "103"] {
            let command = channels_command(&["register", channel, "--community", "7"]);
            execute(command, &registry).await.unwrap();
        }
        execute(channels_command(&["deregister", "103"]), &registry)
            .await
            .unwrap();
        execute(channels_command(&["partner", "7"]), &registry)
            .await
            .unwrap();
        store.close().await;
    }

    let store = Arc::new(SqliteStore::connect(&url).await.unwrap());
    let registry = ChannelRegistry::new(store, Duration::from_secs(30));

    let active = registry.list_active().await.unwrap();
    assert_eq!(active.len(), 2);
    assert!(active.iter().all(|r| r.partner));
    assert_eq!(registry.list_all().await.unwrap().len(), 3);

    // Re-registering a disabled channel re-enables it.
    execute(
        channels_command(&["register", "103", "--community", "7"]),
        &registry,
    )
    .await
    .unwrap();
    assert!(registry.is_registered(&"103".into()).await.unwrap());

    execute(channels_command(&["purge", "7"]), &registry)
        .await
        .unwrap();
    assert!(registry.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_deregister_unknown_channel_fails() {
    let store = Arc::new(SqliteStore::connect(":memory:").await.unwrap());
    let registry = ChannelRegistry::new(store, Duration::from_secs(30));
    assert!(execute(channels_command(&["deregister", "404"]), &registry)
        .await
        .is_err());
}
