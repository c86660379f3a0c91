//! # crosschat-core
//!
//! Core types, configuration, and utilities for CrossChat.
//!
//! This crate provides shared functionality used across all CrossChat crates:
//!
//! - **Configuration**: Loading, validation, and environment overrides
//! - **Types**: Identifiers, sender tiers, registrations, and delivery records
//! - **Utilities**: Path resolution and correlation id minting

pub mod config;
pub mod env;
pub mod error;
pub mod id;
pub mod paths;
pub mod secret;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use error::ConfigError;
pub use secret::SecretString;
pub use types::*;
