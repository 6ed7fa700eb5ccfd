// Core layer - shared types and configuration
pub mod core;

// Infrastructure - persistence
pub mod database;

// Transport boundary - inbound events, outbound notifier
pub mod transport;

// Application layer - dialogue engine and flows
pub mod dialogue;

// Reminder scheduling
pub mod scheduler;

// Re-export core config for convenience
pub use crate::core::Config;

pub use database::Database;
pub use dialogue::DialogueEngine;
pub use scheduler::{ReminderNotice, ReminderScheduler, SchedulerHandle};
pub use transport::{ChatUser, Event, Notifier};
