//! Configuration management commands.

use clap::Args;
use crosschat_core::config::Config;
use crosschat_core::paths;
use std::path::{Path, PathBuf};

/// Config command arguments.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(clap::Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration (secrets redacted)
    Show,

    /// Validate configuration
    Validate,

    /// Write a default configuration file
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Show configuration file path
    Path,
}

const REDACTED: &str = "********";

fn target_path(config_path: Option<&Path>) -> anyhow::Result<PathBuf> {
    match config_path {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(paths::config_file()?),
    }
}

/// Serialize a config for display with secrets replaced.
pub fn redacted_json(config: &Config) -> anyhow::Result<serde_json::Value> {
    let mut json = serde_json::to_value(config)?;
    if let Some(token) = json.pointer_mut("/discord/bot_token") {
        *token = serde_json::Value::String(REDACTED.to_string());
    }
    Ok(json)
}

/// Run the config command.
pub async fn run(args: ConfigArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => {
            let config = Config::resolve(config_path)?;
            println!("{}", serde_json::to_string_pretty(&redacted_json(&config)?)?);
        }

        ConfigCommand::Validate => match Config::resolve(config_path) {
            Ok(config) => match config.validate() {
                Ok(()) => println!("Configuration is valid"),
                Err(e) => anyhow::bail!("Configuration error: {}", e),
            },
            Err(e) => anyhow::bail!("Failed to load config: {}", e),
        },

        ConfigCommand::Init { force } => {
            let path = target_path(config_path)?;
            init(&path, force)?;
            println!("Created config file: {}", path.display());
        }

        ConfigCommand::Path => {
            println!("{}", target_path(config_path)?.display());
        }
    }

    Ok(())
}

/// Write the default configuration to `path`.
pub fn init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            path.display()
        );
    }
    Config::default().save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosschat_core::config::DiscordConfig;

    #[test]
    fn test_redacted_json_hides_token() {
        let mut config = Config::default();
        config.discord = Some(DiscordConfig {
            bot_token: "super-secret".into(),
        });

        let json = redacted_json(&config).unwrap();
        assert_eq!(json["discord"]["bot_token"], REDACTED);
        assert!(!json.to_string().contains("super-secret"));
        assert_eq!(json["relay"]["tier_delays_ms"]["elite_vip"], 250);
    }

    #[test]
    fn test_init_refuses_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crosschat.json5");

        init(&path, false).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert!(loaded.validate().is_ok());

        assert!(init(&path, false).is_err());
        assert!(init(&path, true).is_ok());
    }
}
