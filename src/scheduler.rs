//! # Reminder scheduler
//!
//! One-shot delayed delivery of persisted reminders. A single tokio task
//! owns a time-ordered min-heap of (fire-at, notice) entries, fed through a
//! command channel; cancellation is a tombstone keyed by reminder id,
//! honored when the entry surfaces. On startup the pending set is re-derived
//! from the store alone.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Cancellation keyed by reminder id
//! - 1.0.0: Initial release with heap-based one-shot delivery

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Duration, Instant};

use crate::database::Database;
use crate::transport::Notifier;

/// Payload delivered when a reminder fires
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderNotice {
    pub reminder_id: i64,
    /// External user id of the recipient
    pub recipient: String,
    pub title: String,
    pub message: String,
}

enum Command {
    Schedule {
        fire_at: DateTime<Utc>,
        notice: ReminderNotice,
    },
    Cancel {
        reminder_id: i64,
    },
}

struct HeapEntry {
    deadline: Instant,
    seq: u64,
    notice: ReminderNotice,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Cheap-to-clone handle for scheduling and cancelling reminders
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Command>,
    notifier: Arc<dyn Notifier>,
}

impl SchedulerHandle {
    /// Register a one-shot delivery for `fire_at`. A non-positive delay is
    /// delivered immediately, before this returns, instead of being queued.
    pub async fn schedule(&self, fire_at: DateTime<Utc>, notice: ReminderNotice) -> Result<()> {
        if fire_at <= Utc::now() {
            debug!(
                "Reminder {} is already due, delivering immediately",
                notice.reminder_id
            );
            deliver(&*self.notifier, &notice).await;
            return Ok(());
        }
        self.tx
            .send(Command::Schedule { fire_at, notice })
            .map_err(|_| anyhow::anyhow!("Reminder scheduler is not running"))
    }

    /// Drop any queued delivery for `reminder_id`. Safe to call for ids that
    /// were never scheduled or have already fired.
    pub fn cancel(&self, reminder_id: i64) {
        // An error here means the scheduler task is gone; nothing left to cancel.
        let _ = self.tx.send(Command::Cancel { reminder_id });
    }

    /// Re-derive the pending set from the store and schedule every reminder
    /// whose fire timestamp is still in the future. Returns how many were
    /// scheduled.
    pub async fn recover_pending(&self, database: &Database) -> Result<usize> {
        let pending = database.pending_reminders(Utc::now()).await?;
        let count = pending.len();
        for reminder in pending {
            let notice = ReminderNotice {
                reminder_id: reminder.id,
                recipient: reminder.recipient,
                title: reminder.title,
                message: reminder.message,
            };
            self.schedule(reminder.remind_at, notice).await?;
        }
        info!("Recovered {count} pending reminder(s) from the store");
        Ok(count)
    }
}

/// The scheduler task. Create it, keep a [`SchedulerHandle`], and hand the
/// task itself to `tokio::spawn(scheduler.run())`.
pub struct ReminderScheduler {
    rx: mpsc::UnboundedReceiver<Command>,
    notifier: Arc<dyn Notifier>,
    handle: SchedulerHandle,
}

impl ReminderScheduler {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SchedulerHandle {
            tx,
            notifier: notifier.clone(),
        };
        ReminderScheduler {
            rx,
            notifier,
            handle,
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Drive the timer loop until every handle is dropped
    pub async fn run(mut self) {
        let mut heap: BinaryHeap<Reverse<HeapEntry>> = BinaryHeap::new();
        let mut cancelled: HashSet<i64> = HashSet::new();
        let mut seq: u64 = 0;

        loop {
            let next_deadline = heap.peek().map(|Reverse(entry)| entry.deadline);
            let sleep_target = next_deadline.unwrap_or_else(Instant::now);

            tokio::select! {
                command = self.rx.recv() => {
                    match command {
                        Some(Command::Schedule { fire_at, notice }) => {
                            let delay = (fire_at - Utc::now())
                                .to_std()
                                .unwrap_or(Duration::ZERO);
                            debug!(
                                "Queueing reminder {} to fire in {}s",
                                notice.reminder_id,
                                delay.as_secs()
                            );
                            cancelled.remove(&notice.reminder_id);
                            heap.push(Reverse(HeapEntry {
                                deadline: Instant::now() + delay,
                                seq,
                                notice,
                            }));
                            seq += 1;
                        }
                        Some(Command::Cancel { reminder_id }) => {
                            debug!("Cancelling reminder {reminder_id}");
                            cancelled.insert(reminder_id);
                        }
                        None => break,
                    }
                }
                _ = sleep_until(sleep_target), if next_deadline.is_some() => {
                    let now = Instant::now();
                    while heap
                        .peek()
                        .map(|Reverse(entry)| entry.deadline <= now)
                        .unwrap_or(false)
                    {
                        if let Some(Reverse(entry)) = heap.pop() {
                            if cancelled.remove(&entry.notice.reminder_id) {
                                debug!(
                                    "Skipping cancelled reminder {}",
                                    entry.notice.reminder_id
                                );
                                continue;
                            }
                            deliver(&*self.notifier, &entry.notice).await;
                        }
                    }
                }
            }
        }
        debug!("Reminder scheduler stopped");
    }
}

/// Fire one notification. Delivery failures are terminal for this firing:
/// logged, never retried, never written back to the store.
async fn deliver(notifier: &dyn Notifier, notice: &ReminderNotice) {
    match notifier
        .deliver(&notice.recipient, &notice.title, &notice.message)
        .await
    {
        Ok(()) => info!(
            "Delivered reminder {} to user {}",
            notice.reminder_id, notice.recipient
        ),
        Err(e) => warn!(
            "Failed to deliver reminder {} to user {}: {e}",
            notice.reminder_id, notice.recipient
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::TIMESTAMP_FORMAT;
    use crate::transport::testing::{recording, FailingNotifier};
    use chrono::Duration as ChronoDuration;

    fn notice(id: i64) -> ReminderNotice {
        ReminderNotice {
            reminder_id: id,
            recipient: "42".to_string(),
            title: "standup".to_string(),
            message: "daily sync".to_string(),
        }
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_exactly_once_at_target_time() {
        let notifier = recording();
        let scheduler = ReminderScheduler::new(notifier.clone());
        let handle = scheduler.handle();
        tokio::spawn(scheduler.run());

        handle
            .schedule(Utc::now() + ChronoDuration::hours(1), notice(1))
            .await
            .unwrap();
        settle().await;
        assert!(notifier.deliveries().is_empty());

        tokio::time::advance(Duration::from_secs(3601)).await;
        settle().await;
        let sent = notifier.deliveries();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], ("42".into(), "standup".into(), "daily sync".into()));

        // advancing further must not produce a second delivery
        tokio::time::advance(Duration::from_secs(7200)).await;
        settle().await;
        assert_eq!(notifier.deliveries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_due_reminders_fire_in_deadline_order() {
        let notifier = recording();
        let scheduler = ReminderScheduler::new(notifier.clone());
        let handle = scheduler.handle();
        tokio::spawn(scheduler.run());

        let mut late = notice(2);
        late.title = "late".to_string();
        let mut early = notice(3);
        early.title = "early".to_string();

        handle
            .schedule(Utc::now() + ChronoDuration::minutes(30), late)
            .await
            .unwrap();
        handle
            .schedule(Utc::now() + ChronoDuration::minutes(10), early)
            .await
            .unwrap();
        settle().await;

        tokio::time::advance(Duration::from_secs(3600)).await;
        settle().await;
        let sent = notifier.deliveries();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].1, "early");
        assert_eq!(sent[1].1, "late");
    }

    #[tokio::test]
    async fn test_past_timestamp_delivers_immediately() {
        let notifier = recording();
        let scheduler = ReminderScheduler::new(notifier.clone());
        let handle = scheduler.handle();
        // no run() task: an already-due notice is delivered inline
        drop(scheduler);

        handle
            .schedule(Utc::now() - ChronoDuration::minutes(5), notice(4))
            .await
            .unwrap();
        assert_eq!(notifier.deliveries().len(), 1);
    }

    // The legacy system deleted the reminder row but let an already-queued
    // delivery fire anyway. This pins the corrected behavior: a cancelled
    // reminder stays silent.
    #[tokio::test(start_paused = true)]
    async fn test_cancelled_reminder_does_not_fire() {
        let notifier = recording();
        let scheduler = ReminderScheduler::new(notifier.clone());
        let handle = scheduler.handle();
        tokio::spawn(scheduler.run());

        handle
            .schedule(Utc::now() + ChronoDuration::minutes(10), notice(5))
            .await
            .unwrap();
        settle().await;
        handle.cancel(5);
        settle().await;

        tokio::time::advance(Duration::from_secs(1200)).await;
        settle().await;
        assert!(notifier.deliveries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_failure_is_swallowed() {
        let notifier = Arc::new(FailingNotifier);
        let scheduler = ReminderScheduler::new(notifier);
        let handle = scheduler.handle();
        tokio::spawn(scheduler.run());

        handle
            .schedule(Utc::now() + ChronoDuration::minutes(1), notice(6))
            .await
            .unwrap();
        settle().await;
        tokio::time::advance(Duration::from_secs(120)).await;
        settle().await;

        // the loop survives the failure and keeps serving
        handle
            .schedule(Utc::now() + ChronoDuration::minutes(1), notice(7))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_recovery_fires_once() {
        let db = Database::new(":memory:").await.unwrap();
        let user = db.get_or_create_user("42", Some("ada")).await.unwrap();
        let remind_at = (Utc::now() + ChronoDuration::hours(2))
            .format(TIMESTAMP_FORMAT)
            .to_string();
        db.add_reminder(user.id, "dentist", "checkup at 9", &remind_at)
            .await
            .unwrap();

        let notifier = recording();
        let scheduler = ReminderScheduler::new(notifier.clone());
        let handle = scheduler.handle();
        tokio::spawn(scheduler.run());

        let recovered = handle.recover_pending(&db).await.unwrap();
        assert_eq!(recovered, 1);
        settle().await;
        assert!(notifier.deliveries().is_empty());

        tokio::time::advance(Duration::from_secs(2 * 3600 + 60)).await;
        settle().await;
        let sent = notifier.deliveries();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "dentist");

        tokio::time::advance(Duration::from_secs(3600)).await;
        settle().await;
        assert_eq!(notifier.deliveries().len(), 1);
    }
}
