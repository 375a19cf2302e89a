//! Overdue-MoM scan — queues a reminder for every tracked meeting whose
//! minutes never arrived.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::{Database, NewReminder, REMINDER_TYPE_MOM_ALERT};

/// Hours a tracked meeting may sit without minutes before it counts as
/// overdue.
pub const DEFAULT_OVERDUE_HOURS: i64 = 24;

/// A reminder queued by one scan pass.
#[derive(Debug, Clone, Serialize)]
pub struct QueuedReminder {
    pub reminder_id: i64,
    pub meeting_id: String,
    pub email_id: String,
    pub reminder_type: String,
    pub scheduled_time: DateTime<Utc>,
}

/// Scans tracked meetings and queues `mom_alert` reminders for the
/// overdue ones.
pub struct ReminderScheduler {
    db: Arc<dyn Database>,
    overdue_after: Duration,
}

impl ReminderScheduler {
    pub fn new(db: Arc<dyn Database>, overdue_after: Duration) -> Self {
        Self { db, overdue_after }
    }

    /// One scan pass: queue a reminder for each overdue meeting that has
    /// not been reminded yet, flipping `reminder_sent` so the next pass
    /// skips it. Deliberately at-least-once: two racing scans may both
    /// queue for the same meeting.
    pub async fn scan_and_queue(&self) -> Result<Vec<QueuedReminder>, DatabaseError> {
        let now = Utc::now();
        let cutoff = now - self.overdue_after;
        let overdue = self.db.find_overdue_meetings(cutoff).await?;
        debug!(count = overdue.len(), %cutoff, "Scanned for overdue meetings");

        let mut queued = Vec::new();
        for meeting in overdue {
            if meeting.reminder_sent {
                debug!(meeting_id = %meeting.meeting_id, "Reminder already queued, skipping");
                continue;
            }

            let reminder_id = self
                .db
                .queue_reminder(&NewReminder {
                    email_id: meeting.email_id.clone(),
                    reminder_type: REMINDER_TYPE_MOM_ALERT.to_string(),
                    scheduled_time: now,
                    metadata: json!({
                        "subject": meeting.subject,
                        "meeting_date": meeting.meeting_date.to_rfc3339(),
                        "participants": meeting.participants,
                    }),
                })
                .await?;
            self.db.mark_reminder_sent(&meeting.meeting_id).await?;

            info!(
                reminder_id,
                meeting_id = %meeting.meeting_id,
                subject = %meeting.subject,
                "Queued MoM reminder"
            );
            queued.push(QueuedReminder {
                reminder_id,
                meeting_id: meeting.meeting_id,
                email_id: meeting.email_id,
                reminder_type: REMINDER_TYPE_MOM_ALERT.to_string(),
                scheduled_time: now,
            });
        }

        if !queued.is_empty() {
            info!(count = queued.len(), "MoM scan queued reminders");
        }
        Ok(queued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LibSqlBackend, MeetingRecord, MeetingStatus};

    fn meeting(id: &str, meeting_date: DateTime<Utc>) -> MeetingRecord {
        MeetingRecord {
            meeting_id: id.to_string(),
            email_id: id.to_string(),
            subject: format!("Sync {id}"),
            meeting_date,
            participants: vec!["a@client.com".to_string(), "b@yourcompany.com".to_string()],
            status: MeetingStatus::Tracking,
            mom_received: false,
            mom_email_id: None,
            reminder_sent: false,
            created_at: Utc::now(),
        }
    }

    async fn scheduler_with_db() -> (Arc<LibSqlBackend>, ReminderScheduler) {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let scheduler =
            ReminderScheduler::new(db.clone(), Duration::hours(DEFAULT_OVERDUE_HOURS));
        (db, scheduler)
    }

    #[tokio::test]
    async fn overdue_meeting_gets_one_reminder() {
        let (db, scheduler) = scheduler_with_db().await;
        db.insert_meeting(&meeting("m1", Utc::now() - Duration::hours(25)))
            .await
            .unwrap();

        let queued = scheduler.scan_and_queue().await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].meeting_id, "m1");
        assert_eq!(queued[0].email_id, "m1");
        assert_eq!(queued[0].reminder_type, REMINDER_TYPE_MOM_ALERT);

        let pending = db.pending_reminders(Utc::now()).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, queued[0].reminder_id);
        assert_eq!(pending[0].metadata["subject"], "Sync m1");
        assert_eq!(
            pending[0].metadata["participants"][0],
            "a@client.com"
        );

        let tracked = db.get_meeting("m1").await.unwrap().unwrap();
        assert!(tracked.reminder_sent);
    }

    #[tokio::test]
    async fn second_scan_skips_reminded_meeting() {
        let (db, scheduler) = scheduler_with_db().await;
        db.insert_meeting(&meeting("m1", Utc::now() - Duration::hours(48)))
            .await
            .unwrap();

        assert_eq!(scheduler.scan_and_queue().await.unwrap().len(), 1);
        assert!(scheduler.scan_and_queue().await.unwrap().is_empty());
        assert_eq!(db.all_pending_reminders().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fresh_meeting_is_not_queued() {
        let (db, scheduler) = scheduler_with_db().await;
        db.insert_meeting(&meeting("m1", Utc::now() - Duration::hours(2)))
            .await
            .unwrap();

        assert!(scheduler.scan_and_queue().await.unwrap().is_empty());
        assert!(db.all_pending_reminders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn completed_meeting_is_not_queued() {
        let (db, scheduler) = scheduler_with_db().await;
        let mut done = meeting("m1", Utc::now() - Duration::hours(48));
        done.status = MeetingStatus::Completed;
        done.mom_received = true;
        db.insert_meeting(&done).await.unwrap();

        assert!(scheduler.scan_and_queue().await.unwrap().is_empty());
    }
}
