//! Reminder flow handlers
//!
//! Handles: add-reminder, view-reminders, delete-reminder
//!
//! The time stage is the only input in the system that re-prompts in place:
//! a malformed timestamp keeps the stage and the collected fields so the
//! user can retry.

use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use log::info;

use super::{not_registered, parse_id_tag, DialogueEngine, Stage, UNKNOWN_ACTION};
use crate::core::{truncate_for_message, Button, Reply};
use crate::database::TIMESTAMP_FORMAT;
use crate::scheduler::ReminderNotice;
use crate::transport::ChatUser;

/// The strict input format users type
pub const TIME_INPUT_FORMAT: &str = "%Y-%m-%d %H:%M";

impl DialogueEngine {
    pub(crate) async fn start_add_reminder(&self, chat: &ChatUser) -> Result<Vec<Reply>> {
        self.sessions.set(&chat.external_id, Stage::ReminderTitle);
        Ok(vec![Reply::text("⏰ Send me the reminder title:")])
    }

    pub(crate) async fn reminder_title(
        &self,
        chat: &ChatUser,
        title: String,
    ) -> Result<Vec<Reply>> {
        self.sessions
            .set(&chat.external_id, Stage::ReminderMessage { title });
        Ok(vec![Reply::text("⏰ Now send the reminder message:")])
    }

    pub(crate) async fn reminder_message(
        &self,
        chat: &ChatUser,
        title: String,
        message: String,
    ) -> Result<Vec<Reply>> {
        self.sessions
            .set(&chat.external_id, Stage::ReminderTime { title, message });
        Ok(vec![Reply::text(
            "⏰ When should I remind you? (format: YYYY-MM-DD HH:MM)",
        )])
    }

    pub(crate) async fn reminder_time(
        &self,
        chat: &ChatUser,
        title: String,
        message: String,
        text: &str,
    ) -> Result<Vec<Reply>> {
        let Ok(naive) = NaiveDateTime::parse_from_str(text.trim(), TIME_INPUT_FORMAT) else {
            // stage and collected fields stay put; the user retries in place
            return Ok(vec![Reply::text(
                "❗ Invalid format. Try: YYYY-MM-DD HH:MM",
            )]);
        };
        let Some(user) = self.known_user(chat).await? else {
            return Ok(not_registered());
        };

        let fire_at = DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc);
        let remind_at = fire_at.format(TIMESTAMP_FORMAT).to_string();
        let reminder_id = self
            .db
            .add_reminder(user.id, &title, &message, &remind_at)
            .await?;
        self.sessions.clear(&chat.external_id);
        info!(
            "User {} set reminder {reminder_id} for {remind_at}",
            chat.external_id
        );

        self.scheduler
            .schedule(
                fire_at,
                ReminderNotice {
                    reminder_id,
                    recipient: chat.external_id.clone(),
                    title: title.clone(),
                    message,
                },
            )
            .await?;

        Ok(vec![Reply::text(format!(
            "✅ Reminder '{title}' set for {}.",
            fire_at.format(TIME_INPUT_FORMAT)
        ))])
    }

    pub(crate) async fn view_reminders(&self, chat: &ChatUser) -> Result<Vec<Reply>> {
        let Some(user) = self.known_user(chat).await? else {
            return Ok(not_registered());
        };
        let reminders = self.db.get_reminders(user.id).await?;
        if reminders.is_empty() {
            return Ok(vec![Reply::text("You don't have any reminders.")]);
        }
        let listing = reminders
            .iter()
            .map(|r| format!("⏰ {}\n{}\n{}", r.title, r.message, r.remind_at))
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(vec![Reply::text(truncate_for_message(&listing))])
    }

    pub(crate) async fn delete_reminder_menu(&self, chat: &ChatUser) -> Result<Vec<Reply>> {
        let Some(user) = self.known_user(chat).await? else {
            return Ok(not_registered());
        };
        let reminders = self.db.get_reminders(user.id).await?;
        if reminders.is_empty() {
            return Ok(vec![Reply::text("You have no reminders to delete.")]);
        }
        let mut keyboard: Vec<Vec<Button>> = reminders
            .iter()
            .map(|r| vec![Button::new(&r.title, format!("delete-reminder:{}", r.id))])
            .collect();
        keyboard.push(vec![Button::new("🔙 Back", "reminders")]);
        Ok(vec![
            Reply::text("Pick a reminder to delete:").with_keyboard(keyboard)
        ])
    }

    /// Deletes the row and cancels any queued delivery for it, so a deleted
    /// reminder stays silent.
    pub(crate) async fn delete_reminder_by_tag(
        &self,
        chat: &ChatUser,
        tag: &str,
    ) -> Result<Vec<Reply>> {
        let Some(id) = parse_id_tag(tag, "delete-reminder:") else {
            return Ok(vec![Reply::text(UNKNOWN_ACTION)]);
        };
        if self.db.delete_reminder(id).await? {
            self.scheduler.cancel(id);
            info!("User {} deleted reminder {id}", chat.external_id);
            Ok(vec![Reply::text("❌ Reminder deleted.")])
        } else {
            Ok(vec![Reply::text("❗ Reminder not found.")])
        }
    }
}
