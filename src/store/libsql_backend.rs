//! libSQL backend — async `Database` trait implementation.
//!
//! Backs the triage pipeline with a local libsql database. Supports local
//! file and in-memory databases; file-backed connections run in WAL mode
//! so the reminder sweep can read while the API handlers write.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{
    Database, EmailRecord, MeetingRecord, MeetingStatus, NewReminder, ReminderRecord,
    ReminderStatus,
};

/// libsql-backed implementation of the `Database` trait.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run pending migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DatabaseError::Pool(format!("Failed to create db dir: {e}")))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to connect: {e}")))?;

        // WAL keeps readers unblocked during reminder/digest writes.
        conn.query("PRAGMA journal_mode=WAL", ())
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to enable WAL: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// In-memory database for tests.
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open in-memory db: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to connect: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Row mapping helpers ──────────────────────────────────────────────

/// Parse a datetime stored as either RFC3339 or SQLite's `datetime('now')`
/// format. Falls back to epoch for unparseable values rather than erroring.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                .map(|ndt| ndt.and_utc())
        })
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC)
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(v) => libsql::Value::Text(v.to_string()),
        None => libsql::Value::Null,
    }
}

const EMAIL_COLUMNS: &str = "email_id, thread_id, sender, subject, body_preview, category, \
     priority, confidence, is_hierarchy, is_client, is_escalation, is_urgent, mom_missing, \
     analysis_json, received_at";

fn row_to_email(row: &libsql::Row) -> Result<EmailRecord, libsql::Error> {
    let thread_id: Option<String> = row.get(1).ok();
    let received_at: String = row.get(14)?;
    Ok(EmailRecord {
        email_id: row.get(0)?,
        thread_id,
        sender: row.get(2)?,
        subject: row.get(3)?,
        body_preview: row.get(4)?,
        category: row.get(5)?,
        priority: row.get(6)?,
        confidence: row.get(7)?,
        is_hierarchy: row.get::<i64>(8)? != 0,
        is_client: row.get::<i64>(9)? != 0,
        is_escalation: row.get::<i64>(10)? != 0,
        is_urgent: row.get::<i64>(11)? != 0,
        mom_missing: row.get::<i64>(12)? != 0,
        analysis_json: row.get(13)?,
        received_at: parse_datetime(&received_at),
    })
}

const MEETING_COLUMNS: &str = "meeting_id, email_id, subject, meeting_date, participants, \
     status, mom_received, mom_email_id, reminder_sent, created_at";

fn row_to_meeting(row: &libsql::Row) -> Result<MeetingRecord, libsql::Error> {
    let meeting_date: String = row.get(3)?;
    let participants_json: String = row.get(4)?;
    let status: String = row.get(5)?;
    let mom_email_id: Option<String> = row.get(7).ok();
    let created_at: String = row.get(9)?;
    Ok(MeetingRecord {
        meeting_id: row.get(0)?,
        email_id: row.get(1)?,
        subject: row.get(2)?,
        meeting_date: parse_datetime(&meeting_date),
        participants: serde_json::from_str(&participants_json).unwrap_or_default(),
        status: MeetingStatus::parse(&status).unwrap_or(MeetingStatus::Tracking),
        mom_received: row.get::<i64>(6)? != 0,
        mom_email_id,
        reminder_sent: row.get::<i64>(8)? != 0,
        created_at: parse_datetime(&created_at),
    })
}

const REMINDER_COLUMNS: &str =
    "id, email_id, reminder_type, scheduled_time, status, metadata, created_at";

fn row_to_reminder(row: &libsql::Row) -> Result<ReminderRecord, libsql::Error> {
    let scheduled_time: String = row.get(3)?;
    let status: String = row.get(4)?;
    let metadata_json: String = row.get(5)?;
    let created_at: String = row.get(6)?;
    Ok(ReminderRecord {
        id: row.get(0)?,
        email_id: row.get(1)?,
        reminder_type: row.get(2)?,
        scheduled_time: parse_datetime(&scheduled_time),
        status: ReminderStatus::parse(&status).unwrap_or(ReminderStatus::Pending),
        metadata: serde_json::from_str(&metadata_json).unwrap_or_else(|_| serde_json::json!({})),
        created_at: parse_datetime(&created_at),
    })
}

// ── Trait implementation ─────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Emails ──

    async fn upsert_email(&self, record: &EmailRecord) -> Result<(), DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO email_logs (email_id, thread_id, sender, subject, body_preview, \
             category, priority, confidence, is_hierarchy, is_client, is_escalation, \
             is_urgent, mom_missing, analysis_json, received_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15) \
             ON CONFLICT(email_id) DO UPDATE SET \
                 category = excluded.category, \
                 priority = excluded.priority, \
                 analysis_json = excluded.analysis_json",
            params![
                record.email_id.clone(),
                opt_text(record.thread_id.as_deref()),
                record.sender.clone(),
                record.subject.clone(),
                record.body_preview.clone(),
                record.category.clone(),
                record.priority.clone(),
                record.confidence,
                record.is_hierarchy as i64,
                record.is_client as i64,
                record.is_escalation as i64,
                record.is_urgent as i64,
                record.mom_missing as i64,
                record.analysis_json.clone(),
                record.received_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("upsert_email: {e}")))?;

        debug!(email_id = %record.email_id, "Email log upserted");
        Ok(())
    }

    async fn get_email(&self, email_id: &str) -> Result<Option<EmailRecord>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {EMAIL_COLUMNS} FROM email_logs WHERE email_id = ?1"),
                params![email_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_email: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let record = row_to_email(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_email row: {e}")))?;
                Ok(Some(record))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_email next: {e}"))),
        }
    }

    async fn recent_high_priority(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<EmailRecord>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {EMAIL_COLUMNS} FROM email_logs \
                     WHERE priority = 'High' AND received_at >= ?1 \
                     ORDER BY received_at DESC"
                ),
                params![since.to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("recent_high_priority: {e}")))?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_email(&row) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping malformed email row: {e}"),
            }
        }
        Ok(records)
    }

    // ── Meetings ──

    async fn insert_meeting(&self, record: &MeetingRecord) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        let participants = serde_json::to_string(&record.participants)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        let count = conn
            .execute(
                "INSERT INTO mom_tracker (meeting_id, email_id, subject, meeting_date, participants) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(meeting_id) DO NOTHING",
                params![
                    record.meeting_id.clone(),
                    record.email_id.clone(),
                    record.subject.clone(),
                    record.meeting_date.to_rfc3339(),
                    participants,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_meeting: {e}")))?;

        if count > 0 {
            debug!(meeting_id = %record.meeting_id, "Meeting tracked");
        }
        Ok(count > 0)
    }

    async fn get_meeting(&self, meeting_id: &str) -> Result<Option<MeetingRecord>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {MEETING_COLUMNS} FROM mom_tracker WHERE meeting_id = ?1"),
                params![meeting_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_meeting: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let record = row_to_meeting(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_meeting row: {e}")))?;
                Ok(Some(record))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_meeting next: {e}"))),
        }
    }

    async fn find_meetings_by_thread(
        &self,
        thread_id: &str,
    ) -> Result<Vec<MeetingRecord>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {MEETING_COLUMNS} FROM mom_tracker \
                     WHERE email_id IN (SELECT email_id FROM email_logs WHERE thread_id = ?1) \
                     ORDER BY created_at ASC"
                ),
                params![thread_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_meetings_by_thread: {e}")))?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_meeting(&row) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping malformed meeting row: {e}"),
            }
        }
        Ok(records)
    }

    async fn complete_meetings_in_thread(
        &self,
        thread_id: &str,
        mom_email_id: &str,
    ) -> Result<u64, DatabaseError> {
        let conn = self.conn();
        let count = conn
            .execute(
                "UPDATE mom_tracker SET mom_received = 1, mom_email_id = ?1, status = 'completed' \
                 WHERE email_id IN (SELECT email_id FROM email_logs WHERE thread_id = ?2)",
                params![mom_email_id, thread_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("complete_meetings_in_thread: {e}")))?;

        if count > 0 {
            info!(count, thread_id = %thread_id, "Meetings marked completed");
        }
        Ok(count)
    }

    async fn find_overdue_meetings(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MeetingRecord>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {MEETING_COLUMNS} FROM mom_tracker \
                     WHERE status = 'tracking' AND mom_received = 0 AND meeting_date < ?1 \
                     ORDER BY meeting_date ASC"
                ),
                params![cutoff.to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_overdue_meetings: {e}")))?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_meeting(&row) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping malformed meeting row: {e}"),
            }
        }
        Ok(records)
    }

    async fn mark_reminder_sent(&self, meeting_id: &str) -> Result<(), DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE mom_tracker SET reminder_sent = 1 WHERE meeting_id = ?1",
            params![meeting_id],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("mark_reminder_sent: {e}")))?;
        Ok(())
    }

    async fn open_meetings(&self) -> Result<Vec<MeetingRecord>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {MEETING_COLUMNS} FROM mom_tracker \
                     WHERE status = 'tracking' AND mom_received = 0 \
                     ORDER BY meeting_date ASC"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("open_meetings: {e}")))?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_meeting(&row) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping malformed meeting row: {e}"),
            }
        }
        Ok(records)
    }

    // ── Reminders ──

    async fn queue_reminder(&self, reminder: &NewReminder) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        let metadata = serde_json::to_string(&reminder.metadata)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO reminder_queue (email_id, reminder_type, scheduled_time, metadata) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                reminder.email_id.clone(),
                reminder.reminder_type.clone(),
                reminder.scheduled_time.to_rfc3339(),
                metadata,
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("queue_reminder: {e}")))?;

        let id = conn.last_insert_rowid();
        debug!(id, email_id = %reminder.email_id, reminder_type = %reminder.reminder_type, "Reminder queued");
        Ok(id)
    }

    async fn pending_reminders(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReminderRecord>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {REMINDER_COLUMNS} FROM reminder_queue \
                     WHERE status = 'pending' AND scheduled_time <= ?1 \
                     ORDER BY scheduled_time ASC"
                ),
                params![now.to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("pending_reminders: {e}")))?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_reminder(&row) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping malformed reminder row: {e}"),
            }
        }
        Ok(records)
    }

    async fn all_pending_reminders(&self) -> Result<Vec<ReminderRecord>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {REMINDER_COLUMNS} FROM reminder_queue \
                     WHERE status = 'pending' \
                     ORDER BY scheduled_time ASC"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("all_pending_reminders: {e}")))?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_reminder(&row) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping malformed reminder row: {e}"),
            }
        }
        Ok(records)
    }

    async fn update_reminder_status(
        &self,
        id: i64,
        status: ReminderStatus,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE reminder_queue SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("update_reminder_status: {e}")))?;
        Ok(())
    }
}
