//! Menu keyboards and lazy user registration
//!
//! The button-tag vocabulary lives here: top-level `notes` / `reminders` /
//! `schedule` / `main`, per-domain action tags, and the `day:<label>`
//! selection tags built from the canonical week.

use anyhow::Result;
use log::{debug, error};

use super::schedule::WEEK_DAYS;
use super::DialogueEngine;
use crate::core::{Button, Reply};
use crate::transport::ChatUser;

impl DialogueEngine {
    /// Top-level entry. Registration only happens here: the user row is
    /// created lazily, and a store failure must not take the menu down.
    pub(crate) async fn open_main_menu(&self, chat: &ChatUser) -> Result<Vec<Reply>> {
        match self
            .db
            .get_or_create_user(&chat.external_id, chat.username.as_deref())
            .await
        {
            Ok(user) => debug!("User {} resolved to id {}", chat.external_id, user.id),
            Err(e) => error!("Failed to register user {}: {e}", chat.external_id),
        }
        Ok(vec![main_menu()])
    }
}

pub fn main_menu() -> Reply {
    Reply::text(
        "👋 Welcome!\n\nThis bot can:\n📓 Keep your notes\n⏰ Fire one-off reminders\n📅 Track a weekly schedule\n\nPick where to start:",
    )
    .with_keyboard(vec![
        vec![Button::new("📓 Notes", "notes")],
        vec![Button::new("⏰ Reminders", "reminders")],
        vec![Button::new("📅 Schedule", "schedule")],
    ])
}

pub fn notes_menu() -> Reply {
    Reply::text("📓 Note management:\n\nWhat would you like to do?").with_keyboard(vec![
        vec![Button::new("✍️ Add", "add-note")],
        vec![Button::new("👁 View", "view-notes")],
        vec![Button::new("❌ Delete", "delete-note")],
        vec![Button::new("📤 Export", "export-notes")],
        vec![Button::new("🔙 Back", "main")],
    ])
}

pub fn reminders_menu() -> Reply {
    Reply::text("⏰ Reminder management:\n\nWhat would you like to do?").with_keyboard(vec![
        vec![Button::new("⏰ Add reminder", "add-reminder")],
        vec![Button::new("👁 View reminders", "view-reminders")],
        vec![Button::new("❌ Delete reminder", "delete-reminder")],
        vec![Button::new("🔙 Back", "main")],
    ])
}

pub fn schedule_menu() -> Reply {
    Reply::text("📅 Schedule management:\n\nWhat would you like to do?").with_keyboard(vec![
        vec![Button::new("➕ Add entry", "add-entry")],
        vec![Button::new("🗑 Delete entry", "delete-entry")],
        vec![Button::new("📋 View schedule", "view-schedule")],
        vec![Button::new("🔙 Back", "main")],
    ])
}

/// The seven canonical day buttons, split to fit a Discord action row
pub fn day_keyboard() -> Vec<Vec<Button>> {
    WEEK_DAYS
        .chunks(4)
        .map(|chunk| {
            chunk
                .iter()
                .map(|day| Button::new(*day, format!("day:{day}")))
                .collect()
        })
        .collect()
}
