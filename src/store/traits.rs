//! Unified `Database` trait — single async interface for all persistence.
//!
//! Classified emails, tracked meetings and queued reminders all live behind
//! this trait so components receive an injected `Arc<dyn Database>` and tests
//! can run against the in-memory backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;

/// Reminder type emitted for meetings whose minutes are overdue.
pub const REMINDER_TYPE_MOM_ALERT: &str = "mom_alert";

/// A classified email as persisted in `email_logs`.
#[derive(Debug, Clone)]
pub struct EmailRecord {
    pub email_id: String,
    pub thread_id: Option<String>,
    pub sender: String,
    pub subject: String,
    pub body_preview: String,
    pub category: String,
    pub priority: String,
    pub confidence: f64,
    pub is_hierarchy: bool,
    pub is_client: bool,
    pub is_escalation: bool,
    pub is_urgent: bool,
    pub mom_missing: bool,
    pub analysis_json: String,
    pub received_at: DateTime<Utc>,
}

/// Lifecycle status of a tracked meeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeetingStatus {
    /// Awaiting minutes.
    Tracking,
    /// Minutes received; terminal.
    Completed,
}

impl MeetingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingStatus::Tracking => "tracking",
            MeetingStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tracking" => Some(MeetingStatus::Tracking),
            "completed" => Some(MeetingStatus::Completed),
            _ => None,
        }
    }
}

/// A meeting awaiting (or having received) its minutes, as persisted in
/// `mom_tracker`.
#[derive(Debug, Clone)]
pub struct MeetingRecord {
    pub meeting_id: String,
    pub email_id: String,
    pub subject: String,
    pub meeting_date: DateTime<Utc>,
    pub participants: Vec<String>,
    pub status: MeetingStatus,
    pub mom_received: bool,
    pub mom_email_id: Option<String>,
    pub reminder_sent: bool,
    pub created_at: DateTime<Utc>,
}

/// Delivery status of a queued reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderStatus {
    /// Queued, not yet dispatched.
    Pending,
    /// Dispatched on at least one channel.
    Sent,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStatus::Pending => "pending",
            ReminderStatus::Sent => "sent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReminderStatus::Pending),
            "sent" => Some(ReminderStatus::Sent),
            _ => None,
        }
    }
}

/// A queued notification as persisted in `reminder_queue`.
#[derive(Debug, Clone)]
pub struct ReminderRecord {
    pub id: i64,
    pub email_id: String,
    pub reminder_type: String,
    pub scheduled_time: DateTime<Utc>,
    pub status: ReminderStatus,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Fields for queueing a new reminder; the row id and status are assigned
/// by the store.
#[derive(Debug, Clone)]
pub struct NewReminder {
    pub email_id: String,
    pub reminder_type: String,
    pub scheduled_time: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// Backend-agnostic database trait covering emails, meetings, and reminders.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Emails ──────────────────────────────────────────────────────

    /// Insert a classified email, or refresh category/priority/analysis
    /// when the email_id was already logged.
    async fn upsert_email(&self, record: &EmailRecord) -> Result<(), DatabaseError>;

    /// Get an email log by its email_id.
    async fn get_email(&self, email_id: &str) -> Result<Option<EmailRecord>, DatabaseError>;

    /// Get High-priority emails received at or after `since`, newest first.
    async fn recent_high_priority(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<EmailRecord>, DatabaseError>;

    // ── Meetings ────────────────────────────────────────────────────

    /// Insert a meeting to track. Returns false when the meeting_id was
    /// already tracked (the existing row is left untouched).
    async fn insert_meeting(&self, record: &MeetingRecord) -> Result<bool, DatabaseError>;

    /// Get a tracked meeting by its meeting_id.
    async fn get_meeting(&self, meeting_id: &str)
    -> Result<Option<MeetingRecord>, DatabaseError>;

    /// Get meetings whose originating email belongs to `thread_id`.
    async fn find_meetings_by_thread(
        &self,
        thread_id: &str,
    ) -> Result<Vec<MeetingRecord>, DatabaseError>;

    /// Mark every meeting on `thread_id` completed with minutes received
    /// from `mom_email_id`. Returns the number of meetings transitioned.
    async fn complete_meetings_in_thread(
        &self,
        thread_id: &str,
        mom_email_id: &str,
    ) -> Result<u64, DatabaseError>;

    /// Get tracking meetings without minutes whose date is strictly older
    /// than `cutoff`, oldest first. Callers decide how to handle meetings
    /// already flagged `reminder_sent`.
    async fn find_overdue_meetings(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MeetingRecord>, DatabaseError>;

    /// Flag a meeting as having had its reminder queued.
    async fn mark_reminder_sent(&self, meeting_id: &str) -> Result<(), DatabaseError>;

    /// Get all tracking meetings still missing minutes, oldest first.
    async fn open_meetings(&self) -> Result<Vec<MeetingRecord>, DatabaseError>;

    // ── Reminders ───────────────────────────────────────────────────

    /// Queue a reminder for dispatch. Returns the assigned row id.
    async fn queue_reminder(&self, reminder: &NewReminder) -> Result<i64, DatabaseError>;

    /// Get pending reminders scheduled at or before `now`, oldest first.
    async fn pending_reminders(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReminderRecord>, DatabaseError>;

    /// Get every pending reminder regardless of schedule, oldest first.
    /// Used by the digest, which reports the full backlog.
    async fn all_pending_reminders(&self) -> Result<Vec<ReminderRecord>, DatabaseError>;

    /// Update a reminder's delivery status.
    async fn update_reminder_status(
        &self,
        id: i64,
        status: ReminderStatus,
    ) -> Result<(), DatabaseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meeting_status_roundtrip() {
        for status in [MeetingStatus::Tracking, MeetingStatus::Completed] {
            assert_eq!(MeetingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MeetingStatus::parse("archived"), None);
    }

    #[test]
    fn test_reminder_status_roundtrip() {
        for status in [ReminderStatus::Pending, ReminderStatus::Sent] {
            assert_eq!(ReminderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ReminderStatus::parse("failed"), None);
    }
}
