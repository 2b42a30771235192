//! Scheduled classification trigger.
//!
//! A single recurring tick drives the whole pipeline. Overlap protection
//! lives here, not in the job: a tick that finds a previous run still
//! active is a no-op, and the continuation loop (more pending work after a
//! pass) runs under the same lock until the backlog drains or the lock TTL
//! runs out.

use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::state::AppState;

/// Spawn the recurring scheduler task.
pub fn start_classification_scheduler(state: Arc<AppState>) {
    let interval = std::time::Duration::from_secs(state.config.schedule_interval_secs);
    tokio::spawn(async move {
        info!(
            "Classification scheduler started (every {}s)",
            interval.as_secs()
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so startup isn't a burst.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            run_scheduled_pass(&state).await;
        }
    });
}

/// One scheduled trigger: acquire the overlap lock and drain pending work.
pub async fn run_scheduled_pass(state: &AppState) {
    match state.store.count_pending() {
        Ok(0) => {
            debug!("No pending products, skipping scheduled run");
            return;
        }
        Ok(pending) => {
            info!("Scheduled run starting with {} pending products", pending);
        }
        Err(e) => {
            error!("Failed to count pending products: {}", e);
            return;
        }
    }

    if !state.overlap_lock.try_acquire() {
        info!("Previous classification run still active, skipping trigger");
        return;
    }

    loop {
        match state.job.run_with_retries().await {
            Ok(outcome) if outcome.remaining == 0 => break,
            Ok(outcome) => {
                if !state.overlap_lock.still_held() {
                    // The TTL lapsed; the next trigger may already own the
                    // lock, so leave it alone and stop here.
                    warn!(
                        "Overlap lock TTL expired mid-run ({} products remaining), \
                         yielding to the next trigger",
                        outcome.remaining
                    );
                    return;
                }
                tokio::time::sleep(state.job.config().inter_pass_delay).await;
            }
            Err(e) => {
                error!("Scheduled classification run failed: {}", e);
                break;
            }
        }
    }

    state.overlap_lock.release();
}
