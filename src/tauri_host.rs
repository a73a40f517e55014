// ─── Tauri Host Integration ───
// Event emission, app restart and the updater plugin as platform backend.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tauri::{AppHandle, Emitter, Manager};
use tauri_plugin_updater::UpdaterExt;
use tracing::{info, warn};

use crate::core::backend::{PlatformCallback, PlatformEvent, PlatformRelease, PlatformUpdater};
use crate::core::config::{default_data_dir, UpdaterConfig};
use crate::core::error::{UpdaterError, UpdaterResult};
use crate::core::relaunch::Relauncher;
use crate::core::session::{EventSink, SessionEvent};
use crate::core::state::AppState;
use crate::core::version::PackageVersion;

pub const PROGRESS_EVENT: &str = "update-download-progress";
pub const STATUS_EVENT: &str = "update-status";

/// Forwards progress and state changes to the webview.
pub struct TauriEventSink {
    app: AppHandle,
}

impl TauriEventSink {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl EventSink for TauriEventSink {
    fn emit(&self, event: SessionEvent) {
        let result = match &event {
            SessionEvent::Progress { event, .. } => self.app.emit(PROGRESS_EVENT, event),
            SessionEvent::Status { session } => self.app.emit(STATUS_EVENT, session),
        };
        if let Err(e) = result {
            warn!("Failed to emit update event: {}", e);
        }
    }
}

pub struct TauriRelauncher {
    app: AppHandle,
}

impl TauriRelauncher {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl Relauncher for TauriRelauncher {
    fn relaunch(&self) -> UpdaterResult<()> {
        info!("Restarting application to apply update");
        self.app.restart()
    }
}

fn platform_error(e: tauri_plugin_updater::Error) -> UpdaterError {
    UpdaterError::Platform(e.to_string())
}

/// `tauri-plugin-updater` as a [`PlatformUpdater`]. The release found by
/// `check` is kept until `download_and_install` consumes it.
pub struct TauriPlatformUpdater {
    app: AppHandle,
    pending: tokio::sync::Mutex<Option<tauri_plugin_updater::Update>>,
}

impl TauriPlatformUpdater {
    pub fn new(app: AppHandle) -> Self {
        Self {
            app,
            pending: tokio::sync::Mutex::new(None),
        }
    }
}

#[async_trait]
impl PlatformUpdater for TauriPlatformUpdater {
    async fn check(&self) -> UpdaterResult<Option<PlatformRelease>> {
        let updater = self.app.updater().map_err(platform_error)?;
        let update = updater.check().await.map_err(platform_error)?;

        let release = update.as_ref().map(|u| PlatformRelease {
            version: u.version.clone(),
            body: u.body.clone(),
            date: u
                .date
                .and_then(|d| DateTime::<Utc>::from_timestamp(d.unix_timestamp(), 0)),
        });
        *self.pending.lock().await = update;
        Ok(release)
    }

    async fn download_and_install(&self, on_event: PlatformCallback) -> UpdaterResult<()> {
        let update = self
            .pending
            .lock()
            .await
            .take()
            .ok_or(UpdaterError::NothingToInstall)?;

        let on_event = Arc::new(Mutex::new(on_event));
        let on_chunk = {
            let on_event = on_event.clone();
            let mut started = false;
            let mut downloaded: u64 = 0;
            move |chunk: usize, content_length: Option<u64>| {
                let mut callback = on_event.lock().unwrap_or_else(|p| p.into_inner());
                if !started {
                    started = true;
                    (*callback)(PlatformEvent::Started { content_length });
                }
                downloaded += chunk as u64;
                (*callback)(PlatformEvent::Progress {
                    downloaded,
                    content_length,
                });
            }
        };
        let on_finish = move || {
            let mut callback = on_event.lock().unwrap_or_else(|p| p.into_inner());
            (*callback)(PlatformEvent::Finished);
        };

        update
            .download_and_install(on_chunk, on_finish)
            .await
            .map_err(platform_error)
    }
}

/// Build the updater state from the settings in the data directory and
/// register it with the app. Starts background checks when enabled.
pub fn setup(app: &AppHandle) -> UpdaterResult<()> {
    let data_dir = default_data_dir();
    let config = UpdaterConfig::load(&data_dir);
    let platform: Arc<dyn PlatformUpdater> = Arc::new(TauriPlatformUpdater::new(app.clone()));

    let state = AppState::build(
        data_dir,
        config,
        Some(platform),
        Arc::new(PackageVersion::new(app.package_info().version.clone())),
        Arc::new(TauriRelauncher::new(app.clone())),
        Arc::new(TauriEventSink::new(app.clone())),
    )?;

    {
        let runtime = tauri::async_runtime::handle();
        let _guard = runtime.inner().enter();
        state.start_scheduler();
    }

    app.manage(state);
    Ok(())
}
