//! Weekly schedule flow handlers
//!
//! Handles: add-entry, delete-entry, view-schedule, and the `day:<label>`
//! selection buttons shared by the add and delete flows.

use anyhow::Result;
use log::info;

use super::{menus, not_registered, DialogueEngine, EntryRef, Stage, PICK_FROM_MENU, UNKNOWN_ACTION};
use crate::core::{truncate_for_message, Button, Reply};
use crate::transport::ChatUser;

/// Canonical day labels in fixed week order
pub const WEEK_DAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

impl DialogueEngine {
    pub(crate) async fn start_add_entry(&self, chat: &ChatUser) -> Result<Vec<Reply>> {
        self.sessions.set(&chat.external_id, Stage::ScheduleDay);
        Ok(vec![
            Reply::text("Pick a day of the week:").with_keyboard(menus::day_keyboard())
        ])
    }

    pub(crate) async fn start_delete_entry(&self, chat: &ChatUser) -> Result<Vec<Reply>> {
        self.sessions
            .set(&chat.external_id, Stage::ScheduleDeleteDay);
        Ok(vec![
            Reply::text("Pick a day to delete from:").with_keyboard(menus::day_keyboard())
        ])
    }

    /// A `day:<label>` button; meaning depends on which flow is waiting
    pub(crate) async fn choose_day(&self, chat: &ChatUser, day: String) -> Result<Vec<Reply>> {
        if !WEEK_DAYS.contains(&day.as_str()) {
            return Ok(vec![Reply::text(UNKNOWN_ACTION)]);
        }
        match self.sessions.get(&chat.external_id) {
            Some(Stage::ScheduleDay) => {
                let reply = Reply::text(format!("Day: {day}\nNow send the task title:"));
                self.sessions
                    .set(&chat.external_id, Stage::ScheduleTitle { day });
                Ok(vec![reply])
            }
            Some(Stage::ScheduleDeleteDay) => self.delete_day_listing(chat, day).await,
            Some(_) => Ok(vec![Reply::text(UNKNOWN_ACTION)]),
            None => Ok(vec![Reply::text(PICK_FROM_MENU)]),
        }
    }

    pub(crate) async fn schedule_title(
        &self,
        chat: &ChatUser,
        day: String,
        title: String,
    ) -> Result<Vec<Reply>> {
        self.sessions
            .set(&chat.external_id, Stage::ScheduleTime { day, title });
        Ok(vec![Reply::text("Now send the time (e.g. 18:30):")])
    }

    pub(crate) async fn schedule_time(
        &self,
        chat: &ChatUser,
        day: String,
        title: String,
        time: String,
    ) -> Result<Vec<Reply>> {
        let Some(user) = self.known_user(chat).await? else {
            return Ok(not_registered());
        };
        self.db
            .add_schedule_entry(user.id, &day, &title, &time)
            .await?;
        self.sessions.clear(&chat.external_id);
        info!(
            "User {} added schedule entry {day} {time} {title:?}",
            chat.external_id
        );
        Ok(vec![Reply::text(format!("✅ Added: {day} — {time} {title}"))])
    }

    /// List the day's entries, number them 1..N, and snapshot (id, label)
    /// pairs into the stage. Deletion later goes through the snapshotted id.
    async fn delete_day_listing(&self, chat: &ChatUser, day: String) -> Result<Vec<Reply>> {
        let Some(user) = self.known_user(chat).await? else {
            return Ok(not_registered());
        };
        let entries = self.db.entries_for_day(user.id, &day).await?;
        if entries.is_empty() {
            self.sessions.clear(&chat.external_id);
            return Ok(vec![Reply::text(format!("Nothing scheduled for {day}."))]);
        }

        let snapshot: Vec<EntryRef> = entries
            .iter()
            .map(|entry| EntryRef {
                id: entry.id,
                label: format!("{} — {}", entry.time, entry.title),
            })
            .collect();

        let mut listing = format!("Tasks on {day}:\n");
        for (i, entry) in snapshot.iter().enumerate() {
            listing.push_str(&format!("{}. {}\n", i + 1, entry.label));
        }

        let mut keyboard: Vec<Vec<Button>> = (1..=snapshot.len())
            .map(|i| Button::new(i.to_string(), format!("delete-entry:{i}")))
            .collect::<Vec<_>>()
            .chunks(5)
            .map(|chunk| chunk.to_vec())
            .collect();
        keyboard.push(vec![Button::new("🔙 Back", "schedule")]);

        self.sessions
            .set(&chat.external_id, Stage::ScheduleDeleteEntry { day, entries: snapshot });
        Ok(vec![Reply::text(truncate_for_message(&listing)).with_keyboard(keyboard)])
    }

    /// A `delete-entry:<index>` button. Single-shot: any outcome other than
    /// a successful in-range delete still clears the stage.
    pub(crate) async fn delete_entry_by_tag(
        &self,
        chat: &ChatUser,
        tag: &str,
    ) -> Result<Vec<Reply>> {
        let Some(Stage::ScheduleDeleteEntry { entries, .. }) =
            self.sessions.get(&chat.external_id)
        else {
            // stale button from an old listing
            return Ok(vec![Reply::text(UNKNOWN_ACTION)]);
        };
        self.sessions.clear(&chat.external_id);

        let index: usize = match tag
            .strip_prefix("delete-entry:")
            .and_then(|raw| raw.parse().ok())
        {
            Some(i) => i,
            None => return Ok(vec![Reply::text("❗ Invalid selection.")]),
        };
        let Some(target) = index.checked_sub(1).and_then(|i| entries.get(i)) else {
            return Ok(vec![Reply::text("❗ Invalid selection.")]);
        };

        if self.db.delete_schedule_entry(target.id).await? {
            info!(
                "User {} deleted schedule entry {}",
                chat.external_id, target.id
            );
            Ok(vec![Reply::text("🗑 Task removed.")])
        } else {
            Ok(vec![Reply::text("❗ Task not found.")])
        }
    }

    /// Read-only weekly view: fixed day order, per-day "HH:MM" ascending
    pub(crate) async fn view_schedule(&self, chat: &ChatUser) -> Result<Vec<Reply>> {
        let Some(user) = self.known_user(chat).await? else {
            return Ok(not_registered());
        };
        let mut listing = String::from("📅 Your schedule:\n");
        let mut any = false;
        for day in WEEK_DAYS {
            let entries = self.db.day_schedule(user.id, day).await?;
            if entries.is_empty() {
                continue;
            }
            any = true;
            listing.push_str(&format!("\n{day}\n"));
            for entry in entries {
                listing.push_str(&format!("• {} — {}\n", entry.time, entry.title));
            }
        }
        if !any {
            return Ok(vec![Reply::text("Your schedule is empty.")]);
        }
        Ok(vec![Reply::text(truncate_for_message(&listing))])
    }
}
