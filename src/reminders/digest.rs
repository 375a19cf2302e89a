//! Daily digest — high-priority mail, meetings still missing minutes,
//! and the reminder backlog, rendered into one report and emailed.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::channels::{NotificationChannel, OutboundMessage, SendOutcome};
use crate::error::Result;
use crate::store::{Database, EmailRecord, MeetingRecord, ReminderRecord};

/// Look-back window for the high-priority section.
const DIGEST_WINDOW_HOURS: i64 = 24;

/// Everything one digest reports.
#[derive(Debug, Clone)]
pub struct DigestReport {
    pub generated_at: DateTime<Utc>,
    pub high_priority: Vec<EmailRecord>,
    pub missing_moms: Vec<MeetingRecord>,
    pub pending_reminders: Vec<ReminderRecord>,
}

impl DigestReport {
    pub fn subject(&self) -> String {
        format!("Daily Digest - {}", self.generated_at.format("%Y-%m-%d"))
    }
}

/// Section counts and delivery outcome returned after sending a digest.
#[derive(Debug, Clone)]
pub struct DigestSummary {
    pub high_priority: usize,
    pub missing_moms: usize,
    pub pending_reminders: usize,
    pub outcome: SendOutcome,
}

/// Builds and emails the daily digest. Read-only over the store: no
/// reminder or meeting changes state because it appeared in a digest.
pub struct DigestService {
    db: Arc<dyn Database>,
    email: Arc<dyn NotificationChannel>,
}

impl DigestService {
    pub fn new(db: Arc<dyn Database>, email: Arc<dyn NotificationChannel>) -> Self {
        Self { db, email }
    }

    /// Collect the report: High-priority mail from the last 24 hours,
    /// open meetings awaiting minutes, and every pending reminder.
    pub async fn build(&self) -> Result<DigestReport> {
        let generated_at = Utc::now();
        let since = generated_at - Duration::hours(DIGEST_WINDOW_HOURS);

        let high_priority = self.db.recent_high_priority(since).await?;
        let missing_moms = self.db.open_meetings().await?;
        let pending_reminders = self.db.all_pending_reminders().await?;

        Ok(DigestReport {
            generated_at,
            high_priority,
            missing_moms,
            pending_reminders,
        })
    }

    /// Build today's digest and email it to `recipient`.
    pub async fn send(&self, recipient: &str) -> Result<DigestSummary> {
        let report = self.build().await?;
        let message = OutboundMessage {
            subject: report.subject(),
            text: render_text(&report),
            html: Some(render_html(&report)),
        };

        let outcome = self.email.send(recipient, &message).await?;
        info!(
            to = %recipient,
            high_priority = report.high_priority.len(),
            missing_moms = report.missing_moms.len(),
            pending_reminders = report.pending_reminders.len(),
            "Digest dispatched"
        );

        Ok(DigestSummary {
            high_priority: report.high_priority.len(),
            missing_moms: report.missing_moms.len(),
            pending_reminders: report.pending_reminders.len(),
            outcome,
        })
    }
}

// ── Rendering ───────────────────────────────────────────────────────

pub fn render_html(report: &DigestReport) -> String {
    let mut html = String::from("<h1>Daily Email Digest</h1>");

    html.push_str(&format!(
        "<h2>🚨 High Priority Emails ({})</h2>",
        report.high_priority.len()
    ));
    if report.high_priority.is_empty() {
        html.push_str("<p>No high priority emails today.</p>");
    } else {
        html.push_str("<ul>");
        for email in &report.high_priority {
            html.push_str(&format!(
                "<li><strong>{}</strong> from {}<br/><em>{}</em>",
                email.subject, email.sender, email.category
            ));
            if let Some(thread_id) = &email.thread_id {
                html.push_str(&format!(
                    " - <a href=\"https://mail.google.com/mail/u/0/#inbox/{thread_id}\">View</a>"
                ));
            }
            html.push_str("</li>");
        }
        html.push_str("</ul>");
    }

    html.push_str(&format!(
        "<h2>📝 Missing MoMs ({})</h2>",
        report.missing_moms.len()
    ));
    if report.missing_moms.is_empty() {
        html.push_str("<p>No meetings awaiting minutes.</p>");
    } else {
        html.push_str("<ul>");
        for meeting in &report.missing_moms {
            html.push_str(&format!(
                "<li>Meeting: <strong>{}</strong> ({})<br/>Participants: {}</li>",
                meeting.subject,
                meeting.meeting_date.format("%Y-%m-%d"),
                meeting.participants.join(", ")
            ));
        }
        html.push_str("</ul>");
    }

    html.push_str(&format!(
        "<h2>⏰ Pending Reminders ({})</h2>",
        report.pending_reminders.len()
    ));
    if report.pending_reminders.is_empty() {
        html.push_str("<p>No reminders queued.</p>");
    } else {
        html.push_str("<ul>");
        for reminder in &report.pending_reminders {
            let subject = reminder.metadata["subject"].as_str().unwrap_or("No Subject");
            html.push_str(&format!("<li>{}: {}</li>", reminder.reminder_type, subject));
        }
        html.push_str("</ul>");
    }

    html
}

pub fn render_text(report: &DigestReport) -> String {
    let mut text = String::from("Daily Email Digest\n");

    text.push_str(&format!(
        "\nHigh Priority Emails ({})\n",
        report.high_priority.len()
    ));
    if report.high_priority.is_empty() {
        text.push_str("  No high priority emails today.\n");
    } else {
        for email in &report.high_priority {
            text.push_str(&format!(
                "  - {} from {} [{}]\n",
                email.subject, email.sender, email.category
            ));
        }
    }

    text.push_str(&format!("\nMissing MoMs ({})\n", report.missing_moms.len()));
    if report.missing_moms.is_empty() {
        text.push_str("  No meetings awaiting minutes.\n");
    } else {
        for meeting in &report.missing_moms {
            text.push_str(&format!(
                "  - {} ({}) with {}\n",
                meeting.subject,
                meeting.meeting_date.format("%Y-%m-%d"),
                meeting.participants.join(", ")
            ));
        }
    }

    text.push_str(&format!(
        "\nPending Reminders ({})\n",
        report.pending_reminders.len()
    ));
    if report.pending_reminders.is_empty() {
        text.push_str("  No reminders queued.\n");
    } else {
        for reminder in &report.pending_reminders {
            let subject = reminder.metadata["subject"].as_str().unwrap_or("No Subject");
            text.push_str(&format!("  - {}: {}\n", reminder.reminder_type, subject));
        }
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::error::ChannelError;
    use crate::store::{
        LibSqlBackend, MeetingStatus, NewReminder, REMINDER_TYPE_MOM_ALERT, ReminderStatus,
    };

    struct RecordingChannel {
        sends: Mutex<Vec<(String, OutboundMessage)>>,
    }

    impl RecordingChannel {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sends: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> Vec<(String, OutboundMessage)> {
            self.sends.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl NotificationChannel for RecordingChannel {
        fn name(&self) -> &str {
            "email"
        }

        async fn send(
            &self,
            recipient: &str,
            message: &OutboundMessage,
        ) -> std::result::Result<SendOutcome, ChannelError> {
            self.sends
                .lock()
                .unwrap()
                .push((recipient.to_string(), message.clone()));
            Ok(SendOutcome::Delivered {
                provider_message_id: None,
            })
        }
    }

    fn email(id: &str, priority: &str, received_at: DateTime<Utc>) -> EmailRecord {
        EmailRecord {
            email_id: id.to_string(),
            thread_id: Some(format!("t-{id}")),
            sender: "ceo@yourcompany.com".to_string(),
            subject: format!("Subject {id}"),
            body_preview: "preview".to_string(),
            category: "Work".to_string(),
            priority: priority.to_string(),
            confidence: 0.9,
            is_hierarchy: true,
            is_client: false,
            is_escalation: false,
            is_urgent: false,
            mom_missing: false,
            analysis_json: "{}".to_string(),
            received_at,
        }
    }

    fn meeting(id: &str) -> MeetingRecord {
        MeetingRecord {
            meeting_id: id.to_string(),
            email_id: id.to_string(),
            subject: "Kickoff".to_string(),
            meeting_date: Utc::now() - Duration::days(2),
            participants: vec!["a@client.com".to_string()],
            status: MeetingStatus::Tracking,
            mom_received: false,
            mom_email_id: None,
            reminder_sent: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn digest_collects_all_three_sections() {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let now = Utc::now();

        db.upsert_email(&email("e1", "High", now - Duration::hours(2)))
            .await
            .unwrap();
        db.upsert_email(&email("e2", "Low", now - Duration::hours(2)))
            .await
            .unwrap();
        db.upsert_email(&email("e3", "High", now - Duration::days(3)))
            .await
            .unwrap();
        db.insert_meeting(&meeting("m1")).await.unwrap();
        db.queue_reminder(&NewReminder {
            email_id: "m1".to_string(),
            reminder_type: REMINDER_TYPE_MOM_ALERT.to_string(),
            scheduled_time: now + Duration::hours(5),
            metadata: serde_json::json!({"subject": "Kickoff"}),
        })
        .await
        .unwrap();

        let service = DigestService::new(db, RecordingChannel::new());
        let report = service.build().await.unwrap();

        // Only the recent High email, and the backlog includes the
        // not-yet-due reminder.
        assert_eq!(report.high_priority.len(), 1);
        assert_eq!(report.high_priority[0].email_id, "e1");
        assert_eq!(report.missing_moms.len(), 1);
        assert_eq!(report.pending_reminders.len(), 1);
        assert!(report.subject().starts_with("Daily Digest - "));
    }

    #[tokio::test]
    async fn send_reports_counts_and_uses_email_channel() {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        db.upsert_email(&email("e1", "High", Utc::now())).await.unwrap();

        let channel = RecordingChannel::new();
        let service = DigestService::new(db.clone(), channel.clone());
        let summary = service.send("ops@yourcompany.com").await.unwrap();

        assert_eq!(summary.high_priority, 1);
        assert_eq!(summary.missing_moms, 0);
        assert_eq!(summary.pending_reminders, 0);
        assert!(matches!(summary.outcome, SendOutcome::Delivered { .. }));

        let sends = channel.sent();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].0, "ops@yourcompany.com");
        assert!(sends[0].1.html.as_deref().unwrap().contains("Daily Email Digest"));
    }

    #[tokio::test]
    async fn digest_does_not_transition_reminders() {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let id = db
            .queue_reminder(&NewReminder {
                email_id: "e1".to_string(),
                reminder_type: REMINDER_TYPE_MOM_ALERT.to_string(),
                scheduled_time: Utc::now(),
                metadata: serde_json::json!({}),
            })
            .await
            .unwrap();

        let service = DigestService::new(db.clone(), RecordingChannel::new());
        service.send("ops@yourcompany.com").await.unwrap();

        let all = db.all_pending_reminders().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
        assert_eq!(all[0].status, ReminderStatus::Pending);
    }

    #[test]
    fn html_rendering_covers_every_section() {
        let report = DigestReport {
            generated_at: Utc::now(),
            high_priority: vec![email("e1", "High", Utc::now())],
            missing_moms: vec![meeting("m1")],
            pending_reminders: vec![ReminderRecord {
                id: 1,
                email_id: "m1".to_string(),
                reminder_type: REMINDER_TYPE_MOM_ALERT.to_string(),
                scheduled_time: Utc::now(),
                status: ReminderStatus::Pending,
                metadata: serde_json::json!({}),
                created_at: Utc::now(),
            }],
        };

        let html = render_html(&report);
        assert!(html.contains("<h1>Daily Email Digest</h1>"));
        assert!(html.contains("🚨 High Priority Emails (1)"));
        assert!(html.contains("https://mail.google.com/mail/u/0/#inbox/t-e1"));
        assert!(html.contains("📝 Missing MoMs (1)"));
        assert!(html.contains("Participants: a@client.com"));
        assert!(html.contains("⏰ Pending Reminders (1)"));
        // Metadata without a subject falls back.
        assert!(html.contains("mom_alert: No Subject"));
    }

    #[test]
    fn empty_report_renders_placeholders() {
        let report = DigestReport {
            generated_at: Utc::now(),
            high_priority: Vec::new(),
            missing_moms: Vec::new(),
            pending_reminders: Vec::new(),
        };

        let html = render_html(&report);
        assert!(html.contains("No high priority emails today."));
        assert!(html.contains("No meetings awaiting minutes."));
        assert!(html.contains("No reminders queued."));

        let text = render_text(&report);
        assert!(text.contains("No high priority emails today."));
    }
}
