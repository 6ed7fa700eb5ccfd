//! # Dialogue engine
//!
//! Threads each user through multi-turn input collection: add-note,
//! add-reminder, and add/delete-schedule-entry flows. Free text is
//! interpreted by the user's current [`Stage`]; button tags either start
//! flows or select records. Terminal stages commit to the store and clear
//! the session.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.0.0: Initial release with note, reminder and schedule flows

pub mod menus;
pub mod notes;
pub mod reminders;
pub mod schedule;
pub mod stage;

pub use stage::{EntryRef, SessionStore, Stage};

use anyhow::Result;
use log::info;

use crate::core::Reply;
use crate::database::{Database, User};
use crate::scheduler::SchedulerHandle;
use crate::transport::{ChatUser, Event};

pub(crate) const NOT_REGISTERED: &str = "❗ You are not registered yet. Send /start first.";
pub(crate) const PICK_FROM_MENU: &str =
    "❗ Please pick an action from the menu first (for example \"✍️ Add note\").";
pub(crate) const ANSWER_WITH_BUTTONS: &str = "Please answer with the buttons shown above.";
pub(crate) const UNKNOWN_ACTION: &str = "Unknown action.";

/// The per-user dialogue state machine
pub struct DialogueEngine {
    db: Database,
    sessions: SessionStore,
    scheduler: SchedulerHandle,
}

impl DialogueEngine {
    pub fn new(db: Database, scheduler: SchedulerHandle) -> Self {
        DialogueEngine {
            db,
            sessions: SessionStore::new(),
            scheduler,
        }
    }

    /// Advance the user's dialogue by one inbound event
    pub async fn advance(&self, chat: &ChatUser, event: Event) -> Result<Vec<Reply>> {
        match event {
            Event::Text(text) => self.on_text(chat, text).await,
            Event::Button(tag) => self.on_button(chat, &tag).await,
        }
    }

    /// Free text is interpreted strictly as the input the current stage
    /// expects; with no active stage it is a no-op prompt back to the menu.
    async fn on_text(&self, chat: &ChatUser, text: String) -> Result<Vec<Reply>> {
        let Some(stage) = self.sessions.get(&chat.external_id) else {
            return Ok(vec![Reply::text(PICK_FROM_MENU)]);
        };
        match stage {
            Stage::NoteTitle => self.note_title(chat, text).await,
            Stage::NoteContent { title } => self.note_content(chat, title, text).await,
            Stage::ReminderTitle => self.reminder_title(chat, text).await,
            Stage::ReminderMessage { title } => self.reminder_message(chat, title, text).await,
            Stage::ReminderTime { title, message } => {
                self.reminder_time(chat, title, message, &text).await
            }
            Stage::ScheduleTitle { day } => self.schedule_title(chat, day, text).await,
            Stage::ScheduleTime { day, title } => self.schedule_time(chat, day, title, text).await,
            Stage::ScheduleDay | Stage::ScheduleDeleteDay | Stage::ScheduleDeleteEntry { .. } => {
                Ok(vec![Reply::text(ANSWER_WITH_BUTTONS)])
            }
        }
    }

    async fn on_button(&self, chat: &ChatUser, tag: &str) -> Result<Vec<Reply>> {
        info!("Processing button {tag} from user {}", chat.external_id);

        match tag {
            "main" | "back" => self.open_main_menu(chat).await,
            "notes" => Ok(vec![menus::notes_menu()]),
            "reminders" => Ok(vec![menus::reminders_menu()]),
            "schedule" => Ok(vec![menus::schedule_menu()]),
            "add-note" => self.start_add_note(chat).await,
            "view-notes" => self.view_notes(chat).await,
            "delete-note" => self.delete_note_menu(chat).await,
            "export-notes" => self.export_notes(chat).await,
            "add-reminder" => self.start_add_reminder(chat).await,
            "view-reminders" => self.view_reminders(chat).await,
            "delete-reminder" => self.delete_reminder_menu(chat).await,
            "add-entry" => self.start_add_entry(chat).await,
            "delete-entry" => self.start_delete_entry(chat).await,
            "view-schedule" => self.view_schedule(chat).await,
            id if id.starts_with("day:") => {
                let day = id.trim_start_matches("day:").to_string();
                self.choose_day(chat, day).await
            }
            id if id.starts_with("delete-note:") => self.delete_note_by_tag(chat, id).await,
            id if id.starts_with("delete-reminder:") => {
                self.delete_reminder_by_tag(chat, id).await
            }
            id if id.starts_with("delete-entry:") => self.delete_entry_by_tag(chat, id).await,
            _ => Ok(vec![Reply::text(UNKNOWN_ACTION)]),
        }
    }

    /// Look up the registered user behind an event. A missing user aborts
    /// whatever flow was in progress; the caller replies "not registered".
    pub(crate) async fn known_user(&self, chat: &ChatUser) -> Result<Option<User>> {
        let user = self.db.find_user(&chat.external_id).await?;
        if user.is_none() {
            self.sessions.clear(&chat.external_id);
        }
        Ok(user)
    }
}

pub(crate) fn not_registered() -> Vec<Reply> {
    vec![Reply::text(NOT_REGISTERED)]
}

/// Extract the numeric suffix of tags like `delete-note:17`
pub(crate) fn parse_id_tag(tag: &str, prefix: &str) -> Option<i64> {
    tag.strip_prefix(prefix)?.parse().ok()
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::scheduler::ReminderScheduler;
    use crate::transport::testing::{recording, RecordingNotifier};
    use std::sync::Arc;

    pub async fn engine() -> (DialogueEngine, Arc<RecordingNotifier>) {
        let db = Database::new(":memory:").await.unwrap();
        let notifier = recording();
        let scheduler = ReminderScheduler::new(notifier.clone());
        let handle = scheduler.handle();
        tokio::spawn(scheduler.run());
        (DialogueEngine::new(db, handle), notifier)
    }

    pub fn chat() -> ChatUser {
        ChatUser::new("42", Some("ada".to_string()))
    }

    /// Open the main menu once, which lazily registers the user
    pub async fn register(engine: &DialogueEngine, chat: &ChatUser) {
        engine
            .advance(chat, Event::Button("main".to_string()))
            .await
            .unwrap();
    }

    pub async fn text(engine: &DialogueEngine, chat: &ChatUser, s: &str) -> Vec<Reply> {
        engine
            .advance(chat, Event::Text(s.to_string()))
            .await
            .unwrap()
    }

    pub async fn button(engine: &DialogueEngine, chat: &ChatUser, tag: &str) -> Vec<Reply> {
        engine
            .advance(chat, Event::Button(tag.to_string()))
            .await
            .unwrap()
    }
}
