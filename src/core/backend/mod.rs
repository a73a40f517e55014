pub mod custom;
pub mod platform;

use std::sync::Arc;

use async_trait::async_trait;
use semver::Version;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::core::config::{BackendKind, UpdaterConfig};
use crate::core::downloader::ProgressSender;
use crate::core::error::{UpdaterError, UpdaterResult};
use crate::core::manifest::{ArtifactSelection, UpdateManifest};

pub use custom::CustomBackend;
pub use platform::{
    PlatformCallback, PlatformEvent, PlatformPluginBackend, PlatformRelease, PlatformUpdater,
};

/// Outcome of a successful check.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    UpToDate,
    Available(AvailableUpdate),
}

/// A newer release and the artifact chosen for this platform, if any.
/// `artifact` is `None` when the backend picks the artifact itself, or when
/// the manifest has nothing for the running platform.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvailableUpdate {
    pub manifest: UpdateManifest,
    pub artifact: Option<ArtifactSelection>,
}

/// One way of checking for and applying updates.
///
/// `download_and_install` reports through `progress` and must emit
/// `Installing` only after the artifact passed verification.
#[async_trait]
pub trait UpdateStrategy: Send + Sync {
    async fn check(&self, current: &Version) -> UpdaterResult<CheckOutcome>;

    async fn download_and_install(
        &self,
        update: &AvailableUpdate,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> UpdaterResult<()>;
}

/// Dispatcher over the two backends, selected by configuration.
pub enum UpdateBackend {
    Custom(CustomBackend),
    PlatformPlugin(PlatformPluginBackend),
}

impl UpdateBackend {
    /// Build the configured backend. The platform backend needs a host
    /// updater; the custom one is self-contained.
    pub fn from_config(
        config: &UpdaterConfig,
        platform_updater: Option<Arc<dyn PlatformUpdater>>,
    ) -> UpdaterResult<Self> {
        match config.backend {
            BackendKind::Custom => Ok(Self::Custom(CustomBackend::from_config(config)?)),
            BackendKind::PlatformPlugin => {
                let updater = platform_updater.ok_or_else(|| {
                    UpdaterError::Other("platform_plugin backend selected but no host updater provided".into())
                })?;
                Ok(Self::PlatformPlugin(PlatformPluginBackend::new(
                    updater,
                    config.check_timeout(),
                )))
            }
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            UpdateBackend::Custom(_) => BackendKind::Custom,
            UpdateBackend::PlatformPlugin(_) => BackendKind::PlatformPlugin,
        }
    }

    pub async fn check(&self, current: &Version) -> UpdaterResult<CheckOutcome> {
        match self {
            UpdateBackend::Custom(b) => b.check(current).await,
            UpdateBackend::PlatformPlugin(b) => b.check(current).await,
        }
    }

    pub async fn download_and_install(
        &self,
        update: &AvailableUpdate,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> UpdaterResult<()> {
        match self {
            UpdateBackend::Custom(b) => b.download_and_install(update, progress, cancel).await,
            UpdateBackend::PlatformPlugin(b) => {
                b.download_and_install(update, progress, cancel).await
            }
        }
    }
}
