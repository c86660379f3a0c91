//! CrossChat CLI entry point.

use clap::Parser;
use crosschat_cli::{run, Cli};
use crosschat_core::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging settings come from config; a broken config is reported by the command itself.
    let logging = Config::resolve(cli.config.as_deref())
        .map(|c| c.logging)
        .unwrap_or_default();

    let default_filter = match cli.verbose {
        0 => logging.level.clone(),
        1 => "crosschat=debug".to_string(),
        _ => "crosschat=trace".to_string(),
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    run(cli).await
}
