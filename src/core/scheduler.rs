// ─── Background Update Checks ───
// One check shortly after startup, then one per interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::core::config::UpdaterConfig;
use crate::core::error::UpdaterError;
use crate::core::session::UpdateManager;

/// Periodic check task. Aborted when stopped or dropped.
pub struct UpdateScheduler {
    handle: JoinHandle<()>,
}

impl UpdateScheduler {
    pub fn spawn(manager: Arc<UpdateManager>, initial_delay: Duration, interval: Duration) -> Self {
        info!(
            "Scheduling update checks: first in {:?}, then every {:?}",
            initial_delay, interval
        );
        let handle = tokio::spawn(async move {
            tokio::time::sleep(initial_delay).await;
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                run_check(&manager).await;
            }
        });
        Self { handle }
    }

    /// `None` when automatic checks are disabled.
    pub fn from_config(manager: Arc<UpdateManager>, config: &UpdaterConfig) -> Option<Self> {
        if !config.auto_check {
            info!("Automatic update checks disabled");
            return None;
        }
        Some(Self::spawn(
            manager,
            config.initial_check_delay(),
            config.check_interval(),
        ))
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for UpdateScheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run_check(manager: &UpdateManager) {
    match manager.check().await {
        Ok(session) => info!("Scheduled check finished: {}", session.state),
        Err(UpdaterError::Busy) => debug!("Scheduled check skipped: update in progress"),
        Err(UpdaterError::Superseded) => debug!("Scheduled check superseded by a manual one"),
        Err(e) => warn!("Scheduled check failed: {}", e),
    }
}
