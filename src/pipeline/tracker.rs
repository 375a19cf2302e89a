//! Meeting lifecycle tracker — opens tracked meetings and matches MoM
//! replies to them via thread correlation.
//!
//! State machine per meeting: `tracking` (created when a message is
//! classified `is_meeting=true` and `is_mom=false`) → `completed`
//! (terminal, set when a correlated minutes message arrives). The two
//! guards are mutually exclusive, so one message never both opens and
//! completes a meeting.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::pipeline::types::{ClassificationResult, InboundEmail};
use crate::store::{Database, MeetingRecord, MeetingStatus};

/// What the tracker did with one classified email.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackingOutcome {
    /// A new meeting record was created.
    pub meeting_tracked: bool,
    /// Open meetings completed by this MoM (0 when not a MoM or no match).
    pub meetings_completed: u64,
}

/// Applies classification outcomes to meeting state.
pub struct MeetingTracker {
    db: Arc<dyn Database>,
}

impl MeetingTracker {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Update meeting state for a classified email.
    ///
    /// No-match MoM messages are an explicit no-op outcome, not an
    /// error.
    pub async fn apply(
        &self,
        email: &InboundEmail,
        result: &ClassificationResult,
    ) -> Result<TrackingOutcome, DatabaseError> {
        let mut outcome = TrackingOutcome::default();

        // A meeting message (that is not itself minutes) opens a
        // tracked meeting. Meeting id is the message id: one meeting
        // per qualifying message, absent calendar metadata.
        if result.is_meeting && !result.is_mom {
            let mut participants = Vec::with_capacity(email.to.len() + 1);
            participants.push(email.from.clone());
            participants.extend(email.to.iter().cloned());

            let record = MeetingRecord {
                meeting_id: email.id.clone(),
                email_id: email.id.clone(),
                subject: email.subject.clone(),
                meeting_date: email.received_at_or_now(),
                participants,
                status: MeetingStatus::Tracking,
                mom_received: false,
                mom_email_id: None,
                reminder_sent: false,
                created_at: Utc::now(),
            };

            outcome.meeting_tracked = self.db.insert_meeting(&record).await?;
            if outcome.meeting_tracked {
                info!(
                    meeting_id = %record.meeting_id,
                    subject = %record.subject,
                    "Tracking meeting"
                );
            }
        }

        // A minutes message completes every open meeting on its thread.
        if result.is_mom {
            info!(id = %email.id, subject = %email.subject, "Received MoM");
            match email.thread_id.as_deref() {
                Some(thread_id) => {
                    outcome.meetings_completed = self
                        .db
                        .complete_meetings_in_thread(thread_id, &email.id)
                        .await?;
                    if outcome.meetings_completed == 0 {
                        debug!(thread_id = %thread_id, "MoM matched no tracked meeting");
                    }
                }
                None => {
                    debug!(id = %email.id, "MoM carries no thread id, nothing to correlate");
                }
            }
        }

        Ok(outcome)
    }
}
