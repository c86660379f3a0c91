//! Environment variable handling.

use std::env;

/// Get an environment variable, returning None if not set or empty.
pub fn get_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Common environment variable names.
pub mod vars {
    /// CrossChat home directory override.
    pub const CROSSCHAT_HOME: &str = "CROSSCHAT_HOME";

    /// CrossChat config file override.
    pub const CROSSCHAT_CONFIG: &str = "CROSSCHAT_CONFIG";

    /// Backing store location override.
    pub const CROSSCHAT_DATABASE_URL: &str = "CROSSCHAT_DATABASE_URL";

    /// Moderation subsystem base URL override.
    pub const CROSSCHAT_MODERATION_URL: &str = "CROSSCHAT_MODERATION_URL";

    /// Discord bot token.
    pub const DISCORD_BOT_TOKEN: &str = "DISCORD_BOT_TOKEN";
}
