//! Transport boundary
//!
//! The dialogue engine and the scheduler never touch Discord types. Inbound
//! traffic arrives as [`Event`]s tied to a [`ChatUser`]; reminder delivery
//! goes out through the [`Notifier`] trait. `bin/bot.rs` provides the
//! serenity-backed implementations.

use anyhow::Result;
use async_trait::async_trait;

/// Identity of the person behind an inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUser {
    /// External identity (Discord user id as a string); unique and immutable
    pub external_id: String,
    /// Display name, if the transport knows one
    pub username: Option<String>,
}

impl ChatUser {
    pub fn new(external_id: impl Into<String>, username: Option<String>) -> Self {
        ChatUser {
            external_id: external_id.into(),
            username,
        }
    }
}

/// One inbound event from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Free-form text, interpreted by the user's current dialogue stage
    Text(String),
    /// An opaque button-selection tag
    Button(String),
}

/// Delivery callback for fired reminders
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one reminder notification to `recipient` (external user id).
    /// Failures are terminal for that firing; callers log and move on.
    async fn deliver(&self, recipient: &str, title: &str, message: &str) -> Result<()>;
}
