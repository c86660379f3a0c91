//! Diagnostic commands.

use super::{open_store, registry};
use console::{style, Emoji};
use crosschat_core::config::Config;
use crosschat_core::{paths, ConfigError};
use std::path::Path;

static CHECK: Emoji = Emoji("✓", "+");
static CROSS: Emoji = Emoji("✗", "x");
static WARN: Emoji = Emoji("⚠", "!");

/// Run the doctor command.
pub async fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    println!("CrossChat Doctor\n");

    let mut errors = 0;
    let mut warnings = 0;

    println!("Checking directories...");
    match paths::base_dir() {
        Ok(dir) if dir.exists() => {
            println!("  {} Base directory exists: {}", style(CHECK).green(), dir.display());
        }
        Ok(dir) => {
            println!("  {} Base directory missing: {}", style(WARN).yellow(), dir.display());
            warnings += 1;
        }
        Err(e) => {
            println!("  {} Failed to determine base directory: {}", style(CROSS).red(), e);
            errors += 1;
        }
    }

    println!("\nChecking configuration...");
    let config = match Config::resolve(config_path) {
        Ok(config) => {
            println!("  {} Configuration loaded", style(CHECK).green());
            match config.validate() {
                Ok(()) => println!("  {} Configuration valid", style(CHECK).green()),
                Err(e) => {
                    println!("  {} Configuration invalid: {}", style(CROSS).red(), e);
                    errors += 1;
                }
            }
            Some(config)
        }
        Err(ConfigError::NotFound(path)) => {
            println!("  {} Configuration file not found: {}", style(WARN).yellow(), path.display());
            println!("    Run 'crosschat config init' to create one");
            warnings += 1;
            None
        }
        Err(e) => {
            println!("  {} Configuration error: {}", style(CROSS).red(), e);
            errors += 1;
            None
        }
    };

    if let Some(config) = config {
        println!("\nChecking store...");
        match open_store(&config).await {
            Ok(store) => {
                println!("  {} Store opened: {}", style(CHECK).green(), config.store.database_url);
                match registry(&config, store).list_active().await {
                    Ok(active) if active.len() >= 2 => {
                        println!("  {} {} active channel(s)", style(CHECK).green(), active.len());
                    }
                    Ok(active) => {
                        println!(
                            "  {} {} active channel(s); relaying needs at least two",
                            style(WARN).yellow(),
                            active.len()
                        );
                        warnings += 1;
                    }
                    Err(e) => {
                        println!("  {} Registry unavailable: {}", style(CROSS).red(), e);
                        errors += 1;
                    }
                }
            }
            Err(e) => {
                println!("  {} {:#}", style(CROSS).red(), e);
                errors += 1;
            }
        }

        println!("\nChecking moderation...");
        match &config.moderation.endpoint {
            Some(endpoint) => println!("  {} Moderation endpoint: {}", style(CHECK).green(), endpoint),
            None if config.moderation.disabled => {
                println!("  {} Moderation disabled; ban checks are off", style(WARN).yellow());
                warnings += 1;
            }
            None => {
                println!(
                    "  {} No moderation endpoint; serve refuses to start (set moderation.endpoint or moderation.disabled)",
                    style(CROSS).red()
                );
                errors += 1;
            }
        }

        println!("\nChecking platform...");
        match (&config.discord, cfg!(feature = "discord")) {
            (Some(_), true) => println!("  {} Discord token configured", style(CHECK).green()),
            (Some(_), false) => {
                println!("  {} Discord configured but this build lacks the discord feature", style(WARN).yellow());
                warnings += 1;
            }
            (None, _) => {
                println!("  {} Discord token not configured", style(WARN).yellow());
                warnings += 1;
            }
        }
    }

    println!("\n{}", style("Summary").bold());
    println!("  Errors: {}", if errors > 0 { style(errors).red() } else { style(errors).green() });
    println!("  Warnings: {}", if warnings > 0 { style(warnings).yellow() } else { style(warnings).green() });

    if errors > 0 {
        anyhow::bail!("{} error(s) found", errors);
    }

    Ok(())
}
