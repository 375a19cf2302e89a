//! Reminder lifecycle: overdue-MoM scanning, queue dispatch over the
//! configured channels, and the daily digest.

pub mod digest;
pub mod dispatcher;
pub mod scheduler;
pub mod sweeps;

pub use digest::{DigestReport, DigestService, DigestSummary};
pub use dispatcher::{
    ChannelMode, DispatchResult, DispatchStatus, DispatcherConfig, NotificationDispatcher,
};
pub use scheduler::{DEFAULT_OVERDUE_HOURS, QueuedReminder, ReminderScheduler};
pub use sweeps::{spawn_digest_cron, spawn_reminder_sweep};
