//! Background sweeps — periodic overdue scan plus queue drain, and the
//! daily digest on a cron schedule.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::reminders::digest::DigestService;
use crate::reminders::dispatcher::NotificationDispatcher;
use crate::reminders::scheduler::ReminderScheduler;

/// Default reminder sweep interval: 1 hour.
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

/// Spawn a background task that periodically queues reminders for
/// overdue meetings and drains the reminder queue.
///
/// Returns a `JoinHandle` and shutdown flag.
pub fn spawn_reminder_sweep(
    scheduler: Arc<ReminderScheduler>,
    dispatcher: Arc<NotificationDispatcher>,
    interval_secs: Option<u64>,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let interval = interval_secs.unwrap_or_else(|| {
        std::env::var("REMINDER_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS)
    });

    let handle = tokio::spawn(async move {
        info!("Reminder sweep started — scanning every {interval}s");

        let mut tick = tokio::time::interval(Duration::from_secs(interval));

        // Run immediately on first tick
        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Reminder sweep shutting down");
                return;
            }

            run_sweep(&scheduler, &dispatcher).await;
        }
    });

    (handle, shutdown_flag)
}

/// One sweep pass: queue reminders for overdue meetings, then dispatch
/// whatever is due. Failures are logged; the next tick retries.
async fn run_sweep(scheduler: &Arc<ReminderScheduler>, dispatcher: &Arc<NotificationDispatcher>) {
    match scheduler.scan_and_queue().await {
        Ok(queued) if !queued.is_empty() => {
            info!("Queued {} MoM reminder(s)", queued.len());
        }
        Ok(_) => {}
        Err(e) => error!("Overdue meeting scan failed: {e}"),
    }

    match dispatcher.drain_pending().await {
        Ok(results) => {
            let undelivered = results.iter().filter(|r| !r.delivered).count();
            if undelivered > 0 {
                warn!("{undelivered} reminder(s) still pending after dispatch");
            }
        }
        Err(e) => error!("Reminder dispatch failed: {e}"),
    }
}

/// Spawn a background task that emails the daily digest to `recipient`
/// on a cron schedule.
///
/// Returns a `JoinHandle` and shutdown flag.
pub fn spawn_digest_cron(
    digest: Arc<DigestService>,
    recipient: String,
    schedule: Schedule,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(%recipient, "Digest cron started");

        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                warn!("Digest schedule has no upcoming runs, stopping");
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            debug!(next = %next, "Next digest run scheduled");
            tokio::time::sleep(wait).await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Digest cron shutting down");
                return;
            }

            match digest.send(&recipient).await {
                Ok(summary) => info!(
                    high_priority = summary.high_priority,
                    missing_moms = summary.missing_moms,
                    pending_reminders = summary.pending_reminders,
                    "Daily digest sent"
                ),
                Err(e) => error!("Daily digest failed: {e}"),
            }
        }
    });

    (handle, shutdown_flag)
}
