//! Reminder dispatch — renders queued reminders and fans them out over
//! the configured notification channel(s).

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::channels::{NotificationChannel, OutboundMessage, SendOutcome};
use crate::error::{ChannelError, Result};
use crate::store::{Database, REMINDER_TYPE_MOM_ALERT, ReminderRecord, ReminderStatus};

// ── Channel selection ───────────────────────────────────────────────

/// Which channel(s) reminders go out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelMode {
    #[default]
    Email,
    WhatsApp,
    Both,
}

impl ChannelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelMode::Email => "email",
            ChannelMode::WhatsApp => "whatsapp",
            ChannelMode::Both => "both",
        }
    }

    /// Parse a mode name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "email" => Some(ChannelMode::Email),
            "whatsapp" => Some(ChannelMode::WhatsApp),
            "both" => Some(ChannelMode::Both),
            _ => None,
        }
    }
}

/// Dispatch configuration: channel mode plus per-channel recipients.
#[derive(Debug, Clone, Default)]
pub struct DispatcherConfig {
    pub mode: ChannelMode,
    /// Recipient address for email reminders.
    pub email_to: Option<String>,
    /// Recipient handle for WhatsApp reminders.
    pub whatsapp_to: Option<String>,
}

impl DispatcherConfig {
    /// Build config from environment variables. Unknown `NOTIFY_CHANNEL`
    /// values fall back to email.
    pub fn from_env() -> Self {
        let mode = match std::env::var("NOTIFY_CHANNEL") {
            Ok(raw) => ChannelMode::parse(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "Unknown NOTIFY_CHANNEL, defaulting to email");
                ChannelMode::Email
            }),
            Err(_) => ChannelMode::Email,
        };
        Self {
            mode,
            email_to: std::env::var("NOTIFY_EMAIL_TO").ok(),
            whatsapp_to: std::env::var("WHATSAPP_TO").ok(),
        }
    }
}

// ── Dispatch results ────────────────────────────────────────────────

/// How one channel fared for one reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    Sent,
    Mocked,
    Failed,
}

/// Per-channel slice of a dispatch result.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelDispatch {
    pub channel: String,
    pub status: DispatchStatus,
    /// Provider message id on success, error text on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Outcome of dispatching one queued reminder.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchResult {
    pub reminder_id: i64,
    pub reminder_type: String,
    pub delivered: bool,
    pub channels: Vec<ChannelDispatch>,
}

// ── Dispatcher ──────────────────────────────────────────────────────

/// Drains the reminder queue: renders each due reminder and sends it
/// over the configured channel(s), marking records sent only after a
/// channel accepted them.
pub struct NotificationDispatcher {
    db: Arc<dyn Database>,
    email: Arc<dyn NotificationChannel>,
    whatsapp: Arc<dyn NotificationChannel>,
    config: DispatcherConfig,
}

impl NotificationDispatcher {
    pub fn new(
        db: Arc<dyn Database>,
        email: Arc<dyn NotificationChannel>,
        whatsapp: Arc<dyn NotificationChannel>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            db,
            email,
            whatsapp,
            config,
        }
    }

    /// Dispatch every pending reminder that is due. A reminder reaching
    /// at least one channel (real or mock) moves to `sent`; under `Both`
    /// a reminder whose channels all fail stays pending for the next
    /// drain. In single-channel mode a send failure propagates and stops
    /// the drain, leaving the remaining records pending.
    pub async fn drain_pending(&self) -> Result<Vec<DispatchResult>> {
        let due = self.db.pending_reminders(Utc::now()).await?;
        if due.is_empty() {
            return Ok(Vec::new());
        }
        info!(
            count = due.len(),
            mode = self.config.mode.as_str(),
            "Dispatching due reminders"
        );

        let mut results = Vec::with_capacity(due.len());
        for reminder in due {
            let message = render_reminder(&reminder);
            let entries = match self.config.mode {
                ChannelMode::Email => {
                    let outcome = self
                        .send_via(&self.email, self.config.email_to.as_deref(), &message)
                        .await?;
                    vec![dispatch_entry(self.email.name(), Ok(outcome))]
                }
                ChannelMode::WhatsApp => {
                    let outcome = self
                        .send_via(&self.whatsapp, self.config.whatsapp_to.as_deref(), &message)
                        .await?;
                    vec![dispatch_entry(self.whatsapp.name(), Ok(outcome))]
                }
                ChannelMode::Both => {
                    let (email_outcome, whatsapp_outcome) = futures::future::join(
                        self.send_via(&self.email, self.config.email_to.as_deref(), &message),
                        self.send_via(&self.whatsapp, self.config.whatsapp_to.as_deref(), &message),
                    )
                    .await;
                    vec![
                        dispatch_entry(self.email.name(), email_outcome),
                        dispatch_entry(self.whatsapp.name(), whatsapp_outcome),
                    ]
                }
            };

            let delivered = entries.iter().any(|e| e.status != DispatchStatus::Failed);
            if delivered {
                self.db
                    .update_reminder_status(reminder.id, ReminderStatus::Sent)
                    .await?;
            } else {
                warn!(
                    reminder_id = reminder.id,
                    "Every channel failed, reminder stays pending"
                );
            }

            results.push(DispatchResult {
                reminder_id: reminder.id,
                reminder_type: reminder.reminder_type.clone(),
                delivered,
                channels: entries,
            });
        }
        Ok(results)
    }

    /// Send over one channel, or record a mock send when no recipient is
    /// configured for it.
    async fn send_via(
        &self,
        channel: &Arc<dyn NotificationChannel>,
        recipient: Option<&str>,
        message: &OutboundMessage,
    ) -> std::result::Result<SendOutcome, ChannelError> {
        match recipient {
            Some(to) => channel.send(to, message).await,
            None => {
                warn!(
                    channel = channel.name(),
                    "No recipient configured, recording mock send"
                );
                Ok(SendOutcome::Mocked)
            }
        }
    }
}

fn dispatch_entry(
    channel: &str,
    outcome: std::result::Result<SendOutcome, ChannelError>,
) -> ChannelDispatch {
    match outcome {
        Ok(SendOutcome::Delivered {
            provider_message_id,
        }) => ChannelDispatch {
            channel: channel.to_string(),
            status: DispatchStatus::Sent,
            detail: provider_message_id,
        },
        Ok(SendOutcome::Mocked) => ChannelDispatch {
            channel: channel.to_string(),
            status: DispatchStatus::Mocked,
            detail: None,
        },
        Err(e) => {
            warn!(channel, error = %e, "Channel send failed");
            ChannelDispatch {
                channel: channel.to_string(),
                status: DispatchStatus::Failed,
                detail: Some(e.to_string()),
            }
        }
    }
}

// ── Rendering ───────────────────────────────────────────────────────

/// Render a queued reminder into an outbound message by type.
fn render_reminder(reminder: &ReminderRecord) -> OutboundMessage {
    match reminder.reminder_type.as_str() {
        REMINDER_TYPE_MOM_ALERT => render_mom_alert(reminder),
        other => OutboundMessage {
            subject: format!("Reminder: {other}"),
            text: reminder.metadata.to_string(),
            html: None,
        },
    }
}

fn render_mom_alert(reminder: &ReminderRecord) -> OutboundMessage {
    let subject = reminder.metadata["subject"].as_str().unwrap_or("No Subject");
    let meeting_date = reminder.metadata["meeting_date"]
        .as_str()
        .unwrap_or("an earlier date");
    let participants = reminder.metadata["participants"]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .filter(|joined| !joined.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    let text = format!(
        "Minutes of meeting are still missing for \"{subject}\" ({meeting_date}).\n\
         Participants: {participants}\n\n\
         Please share the minutes or action items for this meeting."
    );
    let html = format!(
        "<h2>⏰ MoM Reminder</h2>\
         <p>Minutes of meeting are still missing for <strong>{subject}</strong> ({meeting_date}).</p>\
         <p>Participants: {participants}</p>\
         <p>Please share the minutes or action items for this meeting.</p>"
    );

    OutboundMessage {
        subject: format!("MoM Reminder: {subject}"),
        text,
        html: Some(html),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use chrono::Duration;

    use crate::store::{LibSqlBackend, NewReminder};

    struct RecordingChannel {
        channel_name: &'static str,
        sends: Mutex<Vec<(String, OutboundMessage)>>,
    }

    impl RecordingChannel {
        fn new(channel_name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                channel_name,
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
            self.channel_name
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
                provider_message_id: Some("msg-1".to_string()),
            })
        }
    }

    struct FailingChannel {
        channel_name: &'static str,
    }

    #[async_trait::async_trait]
    impl NotificationChannel for FailingChannel {
        fn name(&self) -> &str {
            self.channel_name
        }

        async fn send(
            &self,
            _recipient: &str,
            _message: &OutboundMessage,
        ) -> std::result::Result<SendOutcome, ChannelError> {
            Err(ChannelError::SendFailed {
                name: self.channel_name.to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }

    async fn queue_due_mom_alert(db: &LibSqlBackend) -> i64 {
        db.queue_reminder(&NewReminder {
            email_id: "e1".to_string(),
            reminder_type: REMINDER_TYPE_MOM_ALERT.to_string(),
            scheduled_time: Utc::now() - Duration::minutes(1),
            metadata: serde_json::json!({
                "subject": "Q3 Planning",
                "meeting_date": "2026-08-20T10:00:00+00:00",
                "participants": ["alice@client.com", "bob@yourcompany.com"],
            }),
        })
        .await
        .unwrap()
    }

    fn config(mode: ChannelMode) -> DispatcherConfig {
        DispatcherConfig {
            mode,
            email_to: Some("ops@yourcompany.com".to_string()),
            whatsapp_to: Some("15551234567".to_string()),
        }
    }

    #[test]
    fn channel_mode_parses_case_insensitively() {
        assert_eq!(ChannelMode::parse("EMAIL"), Some(ChannelMode::Email));
        assert_eq!(ChannelMode::parse("WhatsApp"), Some(ChannelMode::WhatsApp));
        assert_eq!(ChannelMode::parse(" both "), Some(ChannelMode::Both));
        assert_eq!(ChannelMode::parse("pager"), None);
    }

    #[tokio::test]
    async fn email_mode_sends_and_marks_sent() {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let id = queue_due_mom_alert(&db).await;

        let email = RecordingChannel::new("email");
        let whatsapp = RecordingChannel::new("whatsapp");
        let dispatcher = NotificationDispatcher::new(
            db.clone(),
            email.clone(),
            whatsapp.clone(),
            config(ChannelMode::Email),
        );

        let results = dispatcher.drain_pending().await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].reminder_id, id);
        assert!(results[0].delivered);
        assert_eq!(results[0].channels.len(), 1);
        assert_eq!(results[0].channels[0].channel, "email");
        assert_eq!(results[0].channels[0].status, DispatchStatus::Sent);

        let sends = email.sent();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].0, "ops@yourcompany.com");
        assert_eq!(sends[0].1.subject, "MoM Reminder: Q3 Planning");
        assert!(sends[0].1.text.contains("alice@client.com"));
        assert!(whatsapp.sent().is_empty());

        assert!(db.pending_reminders(Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn future_reminders_are_left_alone() {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        db.queue_reminder(&NewReminder {
            email_id: "e1".to_string(),
            reminder_type: REMINDER_TYPE_MOM_ALERT.to_string(),
            scheduled_time: Utc::now() + Duration::hours(1),
            metadata: serde_json::json!({}),
        })
        .await
        .unwrap();

        let email = RecordingChannel::new("email");
        let whatsapp = RecordingChannel::new("whatsapp");
        let dispatcher = NotificationDispatcher::new(
            db.clone(),
            email.clone(),
            whatsapp,
            config(ChannelMode::Email),
        );

        assert!(dispatcher.drain_pending().await.unwrap().is_empty());
        assert!(email.sent().is_empty());
        assert_eq!(db.all_pending_reminders().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn both_mode_survives_one_channel_failing() {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        queue_due_mom_alert(&db).await;

        let email = RecordingChannel::new("email");
        let whatsapp = Arc::new(FailingChannel {
            channel_name: "whatsapp",
        });
        let dispatcher = NotificationDispatcher::new(
            db.clone(),
            email.clone(),
            whatsapp,
            config(ChannelMode::Both),
        );

        let results = dispatcher.drain_pending().await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].delivered);
        assert_eq!(results[0].channels.len(), 2);
        assert_eq!(results[0].channels[0].status, DispatchStatus::Sent);
        assert_eq!(results[0].channels[1].status, DispatchStatus::Failed);
        assert!(
            results[0].channels[1]
                .detail
                .as_deref()
                .unwrap()
                .contains("connection refused")
        );

        // One channel reached, so the record is sent.
        assert!(db.pending_reminders(Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn both_mode_keeps_record_pending_when_all_fail() {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        queue_due_mom_alert(&db).await;

        let email = Arc::new(FailingChannel {
            channel_name: "email",
        });
        let whatsapp = Arc::new(FailingChannel {
            channel_name: "whatsapp",
        });
        let dispatcher =
            NotificationDispatcher::new(db.clone(), email, whatsapp, config(ChannelMode::Both));

        let results = dispatcher.drain_pending().await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(!results[0].delivered);

        // Still pending for the next drain.
        assert_eq!(db.pending_reminders(Utc::now()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn single_mode_failure_stops_the_drain() {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        queue_due_mom_alert(&db).await;

        let email = Arc::new(FailingChannel {
            channel_name: "email",
        });
        let whatsapp = RecordingChannel::new("whatsapp");
        let dispatcher =
            NotificationDispatcher::new(db.clone(), email, whatsapp, config(ChannelMode::Email));

        assert!(dispatcher.drain_pending().await.is_err());
        assert_eq!(db.pending_reminders(Utc::now()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_recipient_records_mock_send() {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        queue_due_mom_alert(&db).await;

        let email = RecordingChannel::new("email");
        let whatsapp = RecordingChannel::new("whatsapp");
        let dispatcher = NotificationDispatcher::new(
            db.clone(),
            email.clone(),
            whatsapp,
            DispatcherConfig {
                mode: ChannelMode::Email,
                email_to: None,
                whatsapp_to: None,
            },
        );

        let results = dispatcher.drain_pending().await.unwrap();
        assert_eq!(results[0].channels[0].status, DispatchStatus::Mocked);
        assert!(results[0].delivered);
        assert!(email.sent().is_empty());
        assert!(db.pending_reminders(Utc::now()).await.unwrap().is_empty());
    }

    #[test]
    fn mom_alert_rendering_includes_meeting_details() {
        let reminder = ReminderRecord {
            id: 7,
            email_id: "e1".to_string(),
            reminder_type: REMINDER_TYPE_MOM_ALERT.to_string(),
            scheduled_time: Utc::now(),
            status: ReminderStatus::Pending,
            metadata: serde_json::json!({
                "subject": "Roadmap Review",
                "meeting_date": "2026-08-19T09:00:00+00:00",
                "participants": ["pm@client.com"],
            }),
            created_at: Utc::now(),
        };

        let message = render_reminder(&reminder);
        assert_eq!(message.subject, "MoM Reminder: Roadmap Review");
        assert!(message.text.contains("Roadmap Review"));
        assert!(message.text.contains("pm@client.com"));
        assert!(message.html.as_deref().unwrap().contains("<strong>Roadmap Review</strong>"));
    }

    #[test]
    fn unknown_reminder_type_gets_generic_rendering() {
        let reminder = ReminderRecord {
            id: 8,
            email_id: "e2".to_string(),
            reminder_type: "follow_up".to_string(),
            scheduled_time: Utc::now(),
            status: ReminderStatus::Pending,
            metadata: serde_json::json!({"note": "call back"}),
            created_at: Utc::now(),
        };

        let message = render_reminder(&reminder);
        assert_eq!(message.subject, "Reminder: follow_up");
        assert!(message.text.contains("call back"));
        assert!(message.html.is_none());
    }
}
