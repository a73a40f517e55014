// ─── Relaunch Coordinator ───
// Replaces the running process with the freshly installed binary.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::core::error::{UpdaterError, UpdaterResult};

/// Host hook that terminates this process and starts the installed one.
/// Implementations that succeed normally never return.
pub trait Relauncher: Send + Sync {
    fn relaunch(&self) -> UpdaterResult<()>;
}

/// Spawns the executable (by default the one currently running, which the
/// installer has just replaced) with the same arguments, then exits.
#[derive(Debug, Clone, Default)]
pub struct ProcessRelauncher {
    executable: Option<PathBuf>,
}

impl ProcessRelauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_executable(executable: PathBuf) -> Self {
        Self {
            executable: Some(executable),
        }
    }
}

impl Relauncher for ProcessRelauncher {
    fn relaunch(&self) -> UpdaterResult<()> {
        let exe = match &self.executable {
            Some(path) => path.clone(),
            None => std::env::current_exe()?,
        };
        let args: Vec<OsString> = std::env::args_os().skip(1).collect();

        info!("Relaunching {}", exe.display());
        std::process::Command::new(&exe)
            .args(&args)
            .spawn()
            .map_err(|e| UpdaterError::io(&exe, e))?;

        info!("New version started, exiting current process");
        std::process::exit(0);
    }
}

/// Runs the relaunch at most once, after a grace delay that lets the UI
/// render the completed state.
pub struct RelaunchCoordinator {
    relauncher: Arc<dyn Relauncher>,
    grace: Duration,
    fired: AtomicBool,
}

impl RelaunchCoordinator {
    pub fn new(relauncher: Arc<dyn Relauncher>, grace: Duration) -> Self {
        Self {
            relauncher,
            grace,
            fired: AtomicBool::new(false),
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Returns `Ok(false)` without doing anything if a relaunch already ran
    /// or is running. A failed relaunch can be retried.
    pub async fn relaunch(&self) -> UpdaterResult<bool> {
        if self.fired.swap(true, Ordering::SeqCst) {
            warn!("Relaunch already triggered, ignoring repeated request");
            return Ok(false);
        }
        tokio::time::sleep(self.grace).await;
        if let Err(e) = self.relauncher.relaunch() {
            self.fired.store(false, Ordering::SeqCst);
            return Err(e);
        }
        Ok(true)
    }
}
