//! # Core Module
//!
//! Core domain types, configuration, and outbound message shaping for the
//! concierge bot.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.0.0: Initial creation with config and response modules

pub mod config;
pub mod response;

// Re-export commonly used items
pub use config::Config;
pub use response::{truncate_for_message, Attachment, Button, Reply, MESSAGE_LIMIT};
