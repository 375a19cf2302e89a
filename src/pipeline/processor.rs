//! Triage processor — runs one email through the full pipeline.
//!
//! Flow:
//! 1. `ClassificationEngine::classify` (rules → retrieval → LLM)
//! 2. Store upsert — the durable email log, keyed by message id
//! 3. `MeetingTracker::apply` — meeting lifecycle transitions
//!
//! The store write happens only after classification succeeds, so a
//! failed classification leaves no record behind.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::error::{DatabaseError, Result};
use crate::pipeline::engine::ClassificationEngine;
use crate::pipeline::tracker::MeetingTracker;
use crate::pipeline::types::{ClassificationResult, InboundEmail, ProcessedEmail};
use crate::store::{Database, EmailRecord};

/// Chars of the body kept in the store's preview column.
const BODY_PREVIEW_CHARS: usize = 200;

/// Orchestrates classification, logging, and meeting tracking.
pub struct TriageProcessor {
    engine: ClassificationEngine,
    tracker: MeetingTracker,
    db: Arc<dyn Database>,
}

impl TriageProcessor {
    pub fn new(
        engine: ClassificationEngine,
        tracker: MeetingTracker,
        db: Arc<dyn Database>,
    ) -> Self {
        Self {
            engine,
            tracker,
            db,
        }
    }

    /// Process a single inbound email.
    ///
    /// Reprocessing the same message id updates the stored
    /// classification in place, never duplicates.
    pub async fn process(&self, email: InboundEmail) -> Result<ProcessedEmail> {
        info!(
            id = %email.id,
            from = %email.from,
            subject = %email.subject,
            "Processing inbound email"
        );

        let classification = self.engine.classify(&email).await?;

        self.db
            .upsert_email(&email_record(&email, &classification)?)
            .await?;

        let tracking = self.tracker.apply(&email, &classification).await?;

        Ok(ProcessedEmail {
            email_id: email.id,
            classification,
            meeting_tracked: tracking.meeting_tracked,
            meetings_completed: tracking.meetings_completed,
            processed_at: Utc::now(),
        })
    }
}

/// Build the store row for a classified email.
fn email_record(
    email: &InboundEmail,
    result: &ClassificationResult,
) -> std::result::Result<EmailRecord, DatabaseError> {
    let analysis_json = serde_json::to_string(result)
        .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

    Ok(EmailRecord {
        email_id: email.id.clone(),
        thread_id: email.thread_id.clone(),
        sender: email.from.clone(),
        subject: email.subject.clone(),
        body_preview: email.body.chars().take(BODY_PREVIEW_CHARS).collect(),
        category: result.category.as_str().to_string(),
        priority: result.priority.as_str().to_string(),
        confidence: result.confidence,
        is_hierarchy: result.is_hierarchy,
        is_client: result.is_client,
        is_escalation: result.is_escalation,
        is_urgent: result.is_urgent,
        mom_missing: result.mom_missing,
        analysis_json,
        received_at: email.received_at_or_now(),
    })
}
