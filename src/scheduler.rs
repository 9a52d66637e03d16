use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

use crate::refresh::Orchestrator;

/// Periodically asks the orchestrator for a non-forced refresh. The first
/// tick fires immediately, so a cold start fills the store right away.
/// Each tick is a no-op while the stored data is fresh.
pub fn spawn_scheduler(orchestrator: Arc<Orchestrator>, tick: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = orchestrator.refresh(false).await;
            debug!(
                source = ?report.source,
                refreshed = report.refreshed,
                matches = report.matches,
                "scheduled refresh check"
            );
        }
    })
}
