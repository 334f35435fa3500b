//! Idle monitor: the periodic sweep over resident workers.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::supervisor::Supervisor;

/// Start the sweep loop. Each tick takes the supervisor lock once and
/// stops every worker that crashed, idled past the timeout, or hit the
/// request-count ceiling. A tick that outlasts the interval causes the
/// next one to be skipped, not queued.
pub fn start(supervisor: Arc<Supervisor>, shutdown: CancellationToken) -> JoinHandle<()> {
    let interval = supervisor.policy().sweep_interval;
    let idle_timeout = supervisor.policy().idle_timeout;
    let max_requests = supervisor.policy().max_requests_before_restart;

    tokio::spawn(async move {
        info!(
            interval_secs = interval.as_secs(),
            idle_timeout_secs = idle_timeout.as_secs(),
            max_requests,
            "idle monitor started"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // interval fires immediately; consume the first tick so the
        // first sweep happens one full period after startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let summary = supervisor.sweep_once().await;
                    if summary.total() > 0 {
                        info!(
                            crashed = summary.crashed,
                            idle = summary.idle,
                            recycled = summary.recycled,
                            "sweep stopped workers"
                        );
                    }
                }
            }
        }

        info!("idle monitor stopped");
    })
}
