//! Booking workflow and background jobs.

pub mod outbox;
pub mod reminders;
pub mod scheduler;
pub mod slots;

pub use outbox::{OutboxSettings, OutboxWorker};
pub use reminders::{ReminderJob, ReminderSummary};
pub use scheduler::{create_booking, has_conflict, transition_booking, NewBooking, SchedulingError};
pub use slots::{available_slots, Slot};
