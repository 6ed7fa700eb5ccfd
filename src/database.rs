//! # SQLite persistence layer
//!
//! Durable storage for users, notes, reminders, and weekly schedule entries.
//! A single connection behind an async mutex; each operation is a short-lived
//! unit of work. The store is the sole source of truth for pending reminder
//! recovery after a restart.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.0.0: Initial release with users/notes/reminders/schedule tables

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use log::warn;
use serde::Serialize;
use sqlite::{Connection, ConnectionWithFullMutex, State};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Storage format for reminder timestamps (UTC)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    external_id TEXT NOT NULL UNIQUE,
    username TEXT
);
CREATE TABLE IF NOT EXISTS notes (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    content TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS reminders (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    message TEXT NOT NULL,
    remind_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS schedule_entries (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    day TEXT NOT NULL,
    title TEXT NOT NULL,
    time TEXT NOT NULL
);
";

/// Identity anchor; owns notes, reminders and schedule entries
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub external_id: String,
    pub username: Option<String>,
}

/// A titled free-text memo
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Note {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub content: String,
}

/// A one-shot scheduled notification; rows survive firing as history
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Reminder {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub message: String,
    /// Target fire timestamp, immutable once persisted
    pub remind_at: String,
}

/// A recurring weekly-template item
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub id: i64,
    pub user_id: i64,
    pub day: String,
    pub title: String,
    pub time: String,
}

/// A still-future reminder joined with its recipient, for startup recovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReminder {
    pub id: i64,
    pub recipient: String,
    pub title: String,
    pub message: String,
    pub remind_at: DateTime<Utc>,
}

/// Cheap-to-clone handle to the SQLite store
#[derive(Clone)]
pub struct Database {
    connection: Arc<Mutex<ConnectionWithFullMutex>>,
}

impl Database {
    /// Open (or create) the database at `path` and initialize the schema.
    /// `":memory:"` gives an isolated in-memory store for tests.
    pub async fn new(path: &str) -> Result<Self> {
        let connection = Connection::open_with_full_mutex(path)
            .with_context(|| format!("Failed to open database at {path}"))?;
        connection.execute("PRAGMA foreign_keys = ON;")?;
        connection.execute(SCHEMA)?;
        Ok(Database {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    // ---- users ----

    /// Look up a user by external identity
    pub async fn find_user(&self, external_id: &str) -> Result<Option<User>> {
        let conn = self.connection.lock().await;
        let mut stmt =
            conn.prepare("SELECT id, external_id, username FROM users WHERE external_id = ?")?;
        stmt.bind((1, external_id))?;
        if let State::Row = stmt.next()? {
            Ok(Some(User {
                id: stmt.read::<i64, _>(0)?,
                external_id: stmt.read::<String, _>(1)?,
                username: stmt.read::<Option<String>, _>(2)?,
            }))
        } else {
            Ok(None)
        }
    }

    /// Fetch the user for `external_id`, creating the row if absent
    pub async fn get_or_create_user(
        &self,
        external_id: &str,
        username: Option<&str>,
    ) -> Result<User> {
        if let Some(user) = self.find_user(external_id).await? {
            return Ok(user);
        }
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare("INSERT INTO users (external_id, username) VALUES (?, ?)")?;
        stmt.bind((1, external_id))?;
        stmt.bind((2, username))?;
        stmt.next()?;
        let id = last_insert_rowid(&conn)?;
        Ok(User {
            id,
            external_id: external_id.to_string(),
            username: username.map(str::to_string),
        })
    }

    /// Delete a user and, via foreign keys, everything they own
    pub async fn delete_user(&self, external_id: &str) -> Result<bool> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare("DELETE FROM users WHERE external_id = ?")?;
        stmt.bind((1, external_id))?;
        stmt.next()?;
        Ok(conn.change_count() > 0)
    }

    // ---- notes ----

    pub async fn add_note(&self, user_id: i64, title: &str, content: &str) -> Result<i64> {
        let conn = self.connection.lock().await;
        let mut stmt =
            conn.prepare("INSERT INTO notes (user_id, title, content) VALUES (?, ?, ?)")?;
        stmt.bind((1, user_id))?;
        stmt.bind((2, title))?;
        stmt.bind((3, content))?;
        stmt.next()?;
        last_insert_rowid(&conn)
    }

    pub async fn get_notes(&self, user_id: i64) -> Result<Vec<Note>> {
        let conn = self.connection.lock().await;
        let mut stmt = conn
            .prepare("SELECT id, user_id, title, content FROM notes WHERE user_id = ? ORDER BY id")?;
        stmt.bind((1, user_id))?;
        let mut notes = Vec::new();
        while let State::Row = stmt.next()? {
            notes.push(Note {
                id: stmt.read::<i64, _>(0)?,
                user_id: stmt.read::<i64, _>(1)?,
                title: stmt.read::<String, _>(2)?,
                content: stmt.read::<String, _>(3)?,
            });
        }
        Ok(notes)
    }

    pub async fn delete_note(&self, id: i64) -> Result<bool> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare("DELETE FROM notes WHERE id = ?")?;
        stmt.bind((1, id))?;
        stmt.next()?;
        Ok(conn.change_count() > 0)
    }

    // ---- reminders ----

    pub async fn add_reminder(
        &self,
        user_id: i64,
        title: &str,
        message: &str,
        remind_at: &str,
    ) -> Result<i64> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "INSERT INTO reminders (user_id, title, message, remind_at) VALUES (?, ?, ?, ?)",
        )?;
        stmt.bind((1, user_id))?;
        stmt.bind((2, title))?;
        stmt.bind((3, message))?;
        stmt.bind((4, remind_at))?;
        stmt.next()?;
        last_insert_rowid(&conn)
    }

    pub async fn get_reminders(&self, user_id: i64) -> Result<Vec<Reminder>> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, title, message, remind_at FROM reminders \
             WHERE user_id = ? ORDER BY remind_at",
        )?;
        stmt.bind((1, user_id))?;
        let mut reminders = Vec::new();
        while let State::Row = stmt.next()? {
            reminders.push(Reminder {
                id: stmt.read::<i64, _>(0)?,
                user_id: stmt.read::<i64, _>(1)?,
                title: stmt.read::<String, _>(2)?,
                message: stmt.read::<String, _>(3)?,
                remind_at: stmt.read::<String, _>(4)?,
            });
        }
        Ok(reminders)
    }

    pub async fn delete_reminder(&self, id: i64) -> Result<bool> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare("DELETE FROM reminders WHERE id = ?")?;
        stmt.bind((1, id))?;
        stmt.next()?;
        Ok(conn.change_count() > 0)
    }

    /// All reminders with a fire timestamp strictly after `now`, joined with
    /// their recipient's external id. Used once, at startup recovery.
    pub async fn pending_reminders(&self, now: DateTime<Utc>) -> Result<Vec<PendingReminder>> {
        let cutoff = now.format(TIMESTAMP_FORMAT).to_string();
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "SELECT r.id, u.external_id, r.title, r.message, r.remind_at \
             FROM reminders r JOIN users u ON u.id = r.user_id \
             WHERE r.remind_at > ? ORDER BY r.remind_at",
        )?;
        stmt.bind((1, cutoff.as_str()))?;
        let mut pending = Vec::new();
        while let State::Row = stmt.next()? {
            let id = stmt.read::<i64, _>(0)?;
            let raw = stmt.read::<String, _>(4)?;
            let remind_at = match NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT) {
                Ok(naive) => DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc),
                Err(e) => {
                    warn!("Skipping reminder {id} with unparseable timestamp {raw:?}: {e}");
                    continue;
                }
            };
            pending.push(PendingReminder {
                id,
                recipient: stmt.read::<String, _>(1)?,
                title: stmt.read::<String, _>(2)?,
                message: stmt.read::<String, _>(3)?,
                remind_at,
            });
        }
        Ok(pending)
    }

    // ---- schedule ----

    pub async fn add_schedule_entry(
        &self,
        user_id: i64,
        day: &str,
        title: &str,
        time: &str,
    ) -> Result<i64> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "INSERT INTO schedule_entries (user_id, day, title, time) VALUES (?, ?, ?, ?)",
        )?;
        stmt.bind((1, user_id))?;
        stmt.bind((2, day))?;
        stmt.bind((3, title))?;
        stmt.bind((4, time))?;
        stmt.next()?;
        last_insert_rowid(&conn)
    }

    /// Entries for one day in storage order, for numbered delete listings
    pub async fn entries_for_day(&self, user_id: i64, day: &str) -> Result<Vec<ScheduleEntry>> {
        self.query_entries(
            user_id,
            day,
            "SELECT id, user_id, day, title, time FROM schedule_entries \
             WHERE user_id = ? AND day = ? ORDER BY id",
        )
        .await
    }

    /// Entries for one day ordered by time label ("HH:MM" lexical order)
    pub async fn day_schedule(&self, user_id: i64, day: &str) -> Result<Vec<ScheduleEntry>> {
        self.query_entries(
            user_id,
            day,
            "SELECT id, user_id, day, title, time FROM schedule_entries \
             WHERE user_id = ? AND day = ? ORDER BY time, id",
        )
        .await
    }

    pub async fn delete_schedule_entry(&self, id: i64) -> Result<bool> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare("DELETE FROM schedule_entries WHERE id = ?")?;
        stmt.bind((1, id))?;
        stmt.next()?;
        Ok(conn.change_count() > 0)
    }

    async fn query_entries(&self, user_id: i64, day: &str, sql: &str) -> Result<Vec<ScheduleEntry>> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(sql)?;
        stmt.bind((1, user_id))?;
        stmt.bind((2, day))?;
        let mut entries = Vec::new();
        while let State::Row = stmt.next()? {
            entries.push(ScheduleEntry {
                id: stmt.read::<i64, _>(0)?,
                user_id: stmt.read::<i64, _>(1)?,
                day: stmt.read::<String, _>(2)?,
                title: stmt.read::<String, _>(3)?,
                time: stmt.read::<String, _>(4)?,
            });
        }
        Ok(entries)
    }
}

fn last_insert_rowid(conn: &Connection) -> Result<i64> {
    let mut stmt = conn.prepare("SELECT last_insert_rowid()")?;
    stmt.next()?;
    Ok(stmt.read::<i64, _>(0)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn db() -> Database {
        Database::new(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_get_or_create_user_is_idempotent() {
        let db = db().await;
        let first = db.get_or_create_user("42", Some("ada")).await.unwrap();
        let second = db.get_or_create_user("42", Some("ada")).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.username.as_deref(), Some("ada"));
    }

    #[tokio::test]
    async fn test_user_without_username() {
        let db = db().await;
        let user = db.get_or_create_user("7", None).await.unwrap();
        let found = db.find_user("7").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.username, None);
    }

    #[tokio::test]
    async fn test_note_roundtrip_and_delete() {
        let db = db().await;
        let user = db.get_or_create_user("1", None).await.unwrap();
        let id = db.add_note(user.id, "groceries", "milk, eggs").await.unwrap();

        let notes = db.get_notes(user.id).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "groceries");
        assert_eq!(notes[0].content, "milk, eggs");

        assert!(db.delete_note(id).await.unwrap());
        assert!(!db.delete_note(id).await.unwrap());
        assert!(db.get_notes(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pending_reminders_only_future() {
        let db = db().await;
        let user = db.get_or_create_user("9", Some("grace")).await.unwrap();
        let now = Utc::now();

        let past = (now - Duration::hours(1)).format(TIMESTAMP_FORMAT).to_string();
        let future = (now + Duration::hours(1)).format(TIMESTAMP_FORMAT).to_string();
        db.add_reminder(user.id, "old", "already happened", &past)
            .await
            .unwrap();
        let future_id = db
            .add_reminder(user.id, "standup", "daily sync", &future)
            .await
            .unwrap();

        let pending = db.pending_reminders(now).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, future_id);
        assert_eq!(pending[0].recipient, "9");
        assert_eq!(pending[0].title, "standup");
        assert!(pending[0].remind_at > now);
    }

    #[tokio::test]
    async fn test_day_schedule_ordered_by_time() {
        let db = db().await;
        let user = db.get_or_create_user("3", None).await.unwrap();
        db.add_schedule_entry(user.id, "Mon", "lunch", "12:30")
            .await
            .unwrap();
        db.add_schedule_entry(user.id, "Mon", "gym", "07:00")
            .await
            .unwrap();
        db.add_schedule_entry(user.id, "Mon", "review", "09:15")
            .await
            .unwrap();

        let times: Vec<String> = db
            .day_schedule(user.id, "Mon")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.time)
            .collect();
        assert_eq!(times, vec!["07:00", "09:15", "12:30"]);

        // storage order keeps insertion order
        let titles: Vec<String> = db
            .entries_for_day(user.id, "Mon")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, vec!["lunch", "gym", "review"]);
    }

    #[tokio::test]
    async fn test_delete_user_cascades() {
        let db = db().await;
        let user = db.get_or_create_user("5", None).await.unwrap();
        db.add_note(user.id, "n", "c").await.unwrap();
        db.add_reminder(user.id, "r", "m", "2030-01-01 10:00:00")
            .await
            .unwrap();
        db.add_schedule_entry(user.id, "Fri", "demo", "15:00")
            .await
            .unwrap();

        assert!(db.delete_user("5").await.unwrap());

        assert!(db.get_notes(user.id).await.unwrap().is_empty());
        assert!(db.get_reminders(user.id).await.unwrap().is_empty());
        assert!(db.entries_for_day(user.id, "Fri").await.unwrap().is_empty());
        assert!(db.find_user("5").await.unwrap().is_none());
    }
}
