//! Environment-based configuration
//!
//! All settings come from the process environment (a `.env` file is loaded
//! by the binary before this runs).

use anyhow::{Context, Result};

/// Runtime configuration for the bot
#[derive(Debug, Clone)]
pub struct Config {
    /// Discord bot token
    pub discord_token: String,
    /// Path to the SQLite database file
    pub database_path: String,
    /// Default log level when RUST_LOG is not set
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let discord_token = std::env::var("DISCORD_TOKEN")
            .context("DISCORD_TOKEN environment variable is required")?;

        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "concierge.db".to_string());

        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Config {
            discord_token,
            database_path,
            log_level,
        })
    }
}
