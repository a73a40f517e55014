use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::core::config::UpdaterConfig;
use crate::core::error::UpdaterError;
use crate::core::session::UpdateSession;
use crate::core::state::AppState;

#[derive(Debug, Serialize)]
pub struct UpdaterInfo {
    pub current_version: String,
    pub last_checked: Option<DateTime<Utc>>,
    pub settings: UpdaterConfig,
}

#[tauri::command]
pub async fn check_for_updates(state: tauri::State<'_, AppState>) -> Result<UpdateSession, UpdaterError> {
    info!("Manual update check requested");
    state.manager.check().await
}

#[tauri::command]
pub async fn download_and_install_update(
    state: tauri::State<'_, AppState>,
) -> Result<UpdateSession, UpdaterError> {
    state.manager.download_and_install().await
}

#[tauri::command]
pub async fn cancel_update(state: tauri::State<'_, AppState>) -> Result<bool, UpdaterError> {
    Ok(state.manager.cancel().await)
}

#[tauri::command]
pub async fn get_update_status(
    state: tauri::State<'_, AppState>,
) -> Result<Option<UpdateSession>, UpdaterError> {
    Ok(state.manager.status().await)
}

#[tauri::command]
pub fn get_updater_info(state: tauri::State<'_, AppState>) -> UpdaterInfo {
    UpdaterInfo {
        current_version: state.manager.current_version().to_string(),
        last_checked: state.last_checked(),
        settings: state.config.clone(),
    }
}
