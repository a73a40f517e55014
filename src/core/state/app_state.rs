use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::info;

use super::last_check::LastCheckStore;
use crate::core::backend::{PlatformUpdater, UpdateBackend};
use crate::core::config::UpdaterConfig;
use crate::core::error::UpdaterResult;
use crate::core::relaunch::Relauncher;
use crate::core::scheduler::UpdateScheduler;
use crate::core::session::{EventSink, UpdateManager};
use crate::core::version::VersionProbe;

/// Everything the host keeps alive for the updater.
pub struct AppState {
    pub data_dir: PathBuf,
    pub config: UpdaterConfig,
    pub manager: Arc<UpdateManager>,
    scheduler: Mutex<Option<UpdateScheduler>>,
}

impl AppState {
    pub fn build(
        data_dir: PathBuf,
        config: UpdaterConfig,
        platform_updater: Option<Arc<dyn PlatformUpdater>>,
        probe: Arc<dyn VersionProbe>,
        relauncher: Arc<dyn Relauncher>,
        sink: Arc<dyn EventSink>,
    ) -> UpdaterResult<Self> {
        let backend = UpdateBackend::from_config(&config, platform_updater)?;
        info!(
            "Updater ready: backend {:?}, platform {}, current version {}",
            backend.kind(),
            config.platform_id(),
            probe.current()
        );

        let manager = UpdateManager::new(backend, probe, relauncher, sink)
            .with_relaunch_grace(config.relaunch_grace())
            .with_last_check_store(LastCheckStore::new(&data_dir));

        Ok(Self {
            data_dir,
            config,
            manager: Arc::new(manager),
            scheduler: Mutex::new(None),
        })
    }

    /// Start background checks if enabled and not already running. Must be
    /// called inside a tokio runtime.
    pub fn start_scheduler(&self) -> bool {
        let mut slot = self.scheduler.lock().unwrap_or_else(|p| p.into_inner());
        if slot.as_ref().map(|s| s.is_running()).unwrap_or(false) {
            return false;
        }
        *slot = UpdateScheduler::from_config(self.manager.clone(), &self.config);
        slot.is_some()
    }

    pub fn stop_scheduler(&self) {
        let mut slot = self.scheduler.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(scheduler) = slot.take() {
            scheduler.stop();
        }
    }

    pub fn last_checked(&self) -> Option<DateTime<Utc>> {
        self.manager.last_check_store().and_then(|s| s.last_checked())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;

    use crate::core::config::BackendKind;
    use crate::core::error::UpdaterError;
    use crate::core::relaunch::ProcessRelauncher;
    use crate::core::session::NullSink;
    use crate::core::version::PackageVersion;

    fn build(dir: &std::path::Path, config: UpdaterConfig) -> UpdaterResult<AppState> {
        AppState::build(
            dir.to_path_buf(),
            config,
            None,
            Arc::new(PackageVersion::new(Version::new(1, 0, 0))),
            Arc::new(ProcessRelauncher::new()),
            Arc::new(NullSink),
        )
    }

    #[tokio::test]
    async fn scheduler_starts_once() {
        let dir = tempfile::tempdir().unwrap();
        let state = build(dir.path(), UpdaterConfig::default()).unwrap();
        assert_eq!(state.manager.backend_kind(), BackendKind::Custom);
        assert_eq!(state.last_checked(), None);

        assert!(state.start_scheduler());
        assert!(!state.start_scheduler());
        state.stop_scheduler();
        assert!(state.start_scheduler());
        state.stop_scheduler();
    }

    #[test]
    fn platform_backend_requires_host_updater() {
        let dir = tempfile::tempdir().unwrap();
        let config = UpdaterConfig {
            backend: BackendKind::PlatformPlugin,
            ..UpdaterConfig::default()
        };
        assert!(matches!(build(dir.path(), config), Err(UpdaterError::Other(_))));
    }
}
