//! REST endpoints for message classification, reminder scan/drain, and
//! the daily digest.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::channels::SendOutcome;
use crate::pipeline::{InboundEmail, TriageProcessor};
use crate::reminders::{DigestService, NotificationDispatcher, ReminderScheduler};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct ApiState {
    pub processor: Arc<TriageProcessor>,
    pub scheduler: Arc<ReminderScheduler>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub digest: Arc<DigestService>,
}

/// Build the axum router with the triage REST routes.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/classify", post(classify))
        .route("/api/reminders/scan", post(scan_reminders))
        .route("/api/reminders/drain", post(drain_reminders))
        .route("/api/digest", post(send_digest))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Internal failures surface as a 5xx with an `error` field; nothing is
/// half-reported as success.
fn internal_error(e: impl std::fmt::Display) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": e.to_string()})),
    )
}

// ── Health ──────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "mail-sentinel"
    }))
}

// ── Classification ──────────────────────────────────────────────────

/// POST /api/classify
///
/// Classify one normalized message, persist the result, and update
/// meeting lifecycle state. Returns the processed outcome.
async fn classify(
    State(state): State<ApiState>,
    Json(email): Json<InboundEmail>,
) -> impl IntoResponse {
    match state.processor.process(email).await {
        Ok(processed) => (StatusCode::OK, Json(serde_json::json!(processed))).into_response(),
        Err(e) => {
            error!(error = %e, "Classification failed");
            internal_error(e).into_response()
        }
    }
}

// ── Reminders ───────────────────────────────────────────────────────

/// POST /api/reminders/scan
///
/// Queue a `mom_alert` reminder for every overdue meeting not yet
/// reminded.
async fn scan_reminders(State(state): State<ApiState>) -> impl IntoResponse {
    match state.scheduler.scan_and_queue().await {
        Ok(queued) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "queued": queued.len(),
                "reminders": queued,
            })),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Reminder scan failed");
            internal_error(e).into_response()
        }
    }
}

/// POST /api/reminders/drain
///
/// Dispatch every due pending reminder over the configured channel(s).
async fn drain_reminders(State(state): State<ApiState>) -> impl IntoResponse {
    match state.dispatcher.drain_pending().await {
        Ok(results) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "dispatched": results.len(),
                "results": results,
            })),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Reminder drain failed");
            internal_error(e).into_response()
        }
    }
}

// ── Digest ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct DigestRequest {
    recipient: String,
}

/// POST /api/digest
///
/// Build today's digest and email it to the requested recipient.
async fn send_digest(
    State(state): State<ApiState>,
    Json(body): Json<DigestRequest>,
) -> impl IntoResponse {
    match state.digest.send(&body.recipient).await {
        Ok(summary) => {
            let status = match summary.outcome {
                SendOutcome::Delivered { .. } => "sent",
                SendOutcome::Mocked => "mocked",
            };
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "status": status,
                    "high_priority": summary.high_priority,
                    "missing_moms": summary.missing_moms,
                    "pending_reminders": summary.pending_reminders,
                })),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "Digest send failed");
            internal_error(e).into_response()
        }
    }
}
