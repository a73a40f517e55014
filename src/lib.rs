pub mod core;

#[cfg(feature = "tauri")]
mod commands;
#[cfg(feature = "tauri")]
pub mod tauri_host;

use tracing_subscriber::EnvFilter;

pub use crate::core::backend::{CheckOutcome, UpdateBackend};
pub use crate::core::classify::{ClassifiedError, ErrorCategory};
pub use crate::core::config::UpdaterConfig;
pub use crate::core::downloader::ProgressEvent;
pub use crate::core::error::{UpdaterError, UpdaterResult};
pub use crate::core::session::{SessionEvent, SessionState, UpdateManager, UpdateSession};
pub use crate::core::state::AppState;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter. Safe to call more than once.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,app_updater=debug")),
        )
        .try_init();
}

/// A Tauri builder with the updater plugin, state and commands registered.
/// The host finishes it with `.run(tauri::generate_context!())`.
#[cfg(feature = "tauri")]
pub fn builder() -> tauri::Builder<tauri::Wry> {
    init_logging();
    tracing::info!("Updater starting (version {})", env!("CARGO_PKG_VERSION"));

    tauri::Builder::default()
        .plugin(tauri_plugin_updater::Builder::new().build())
        .setup(|app| {
            tauri_host::setup(app.handle())?;
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::check_for_updates,
            commands::download_and_install_update,
            commands::cancel_update,
            commands::get_update_status,
            commands::get_updater_info,
        ])
}
