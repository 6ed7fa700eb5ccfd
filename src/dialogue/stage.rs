//! Per-user dialogue stage and the session store
//!
//! A stage exists only while a flow is in progress. Each variant carries
//! exactly the fields collected so far, so a stale or mismatched event can
//! never observe a half-typed scratch value from another flow. Sessions live
//! in memory only; a restart abandons every in-flight flow.

use dashmap::DashMap;

/// A schedule entry captured at listing time: stable record id plus the
/// label that was shown to the user. Deleting goes through the id, so a
/// concurrent mutation cannot redirect an index selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRef {
    pub id: i64,
    pub label: String,
}

/// Current position of a user inside a flow
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Add-note: waiting for the title
    NoteTitle,
    /// Add-note: waiting for the content
    NoteContent { title: String },
    /// Add-reminder: waiting for the title
    ReminderTitle,
    /// Add-reminder: waiting for the message body
    ReminderMessage { title: String },
    /// Add-reminder: waiting for the `YYYY-MM-DD HH:MM` timestamp
    ReminderTime { title: String, message: String },
    /// Add-schedule-entry: waiting for a day button
    ScheduleDay,
    /// Add-schedule-entry: waiting for the task title
    ScheduleTitle { day: String },
    /// Add-schedule-entry: waiting for the time label
    ScheduleTime { day: String, title: String },
    /// Delete-schedule-entry: waiting for a day button
    ScheduleDeleteDay,
    /// Delete-schedule-entry: waiting for a 1-based index into the snapshot
    ScheduleDeleteEntry { day: String, entries: Vec<EntryRef> },
}

/// In-memory map of active dialogue stages, keyed by external user id.
/// At most one active flow per user; starting a new flow overwrites any
/// stale one.
#[derive(Default)]
pub struct SessionStore {
    stages: DashMap<String, Stage>,
}

impl SessionStore {
    pub fn new() -> Self {
        SessionStore {
            stages: DashMap::new(),
        }
    }

    pub fn get(&self, external_id: &str) -> Option<Stage> {
        self.stages.get(external_id).map(|entry| entry.value().clone())
    }

    pub fn set(&self, external_id: &str, stage: Stage) {
        self.stages.insert(external_id.to_string(), stage);
    }

    pub fn clear(&self, external_id: &str) {
        self.stages.remove(external_id);
    }
}
