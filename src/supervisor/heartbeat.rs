//! Periodic heartbeat written to the mission store.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::persistence::mission_repo::MissionRepo;

/// Spawn the heartbeat ticker. Store failures are logged and retried on the
/// next tick.
#[must_use]
pub fn spawn_heartbeat(
    repo: MissionRepo,
    mission_id: String,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match repo.update_heartbeat(&mission_id).await {
                        Ok(()) => debug!(mission_id, "heartbeat"),
                        Err(err) => warn!(mission_id, %err, "heartbeat update failed"),
                    }
                }
            }
        }
    })
}
