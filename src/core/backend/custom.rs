use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use semver::Version;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{AvailableUpdate, CheckOutcome, UpdateStrategy};
use crate::core::config::{ArtifactPreference, UpdaterConfig};
use crate::core::downloader::{Downloader, ProgressEvent, ProgressSender};
use crate::core::error::{UpdaterError, UpdaterResult};
use crate::core::http::build_http_client;
use crate::core::installer::{ArtifactInstaller, NativeInstaller};
use crate::core::integrity::IntegrityVerifier;
use crate::core::manifest::{ManifestClient, ManifestOutcome};

const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// Manifest check, streamed download, SHA-256 verification and native
/// installer, all driven in-process.
pub struct CustomBackend {
    manifests: ManifestClient,
    downloader: Downloader,
    verifier: IntegrityVerifier,
    installer: Arc<dyn ArtifactInstaller>,
    platform: String,
    preference: ArtifactPreference,
    check_timeout: Duration,
}

impl CustomBackend {
    pub fn new(
        manifests: ManifestClient,
        downloader: Downloader,
        verifier: IntegrityVerifier,
        installer: Arc<dyn ArtifactInstaller>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            manifests,
            downloader,
            verifier,
            installer,
            platform: platform.into(),
            preference: ArtifactPreference::Primary,
            check_timeout: DEFAULT_CHECK_TIMEOUT,
        }
    }

    pub fn with_preference(mut self, preference: ArtifactPreference) -> Self {
        self.preference = preference;
        self
    }

    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    pub fn from_config(config: &UpdaterConfig) -> UpdaterResult<Self> {
        let check_client = build_http_client(&config.user_agent, None)?;
        let download_client = build_http_client(&config.user_agent, Some(config.download_timeout()))?;
        let updates_dir = config.updates_dir();

        let installer = NativeInstaller::new(updates_dir.join("staging"))
            .with_command(config.installer_command.clone());

        Ok(Self::new(
            ManifestClient::new(check_client, config.endpoint.clone()),
            Downloader::new(download_client, updates_dir),
            IntegrityVerifier::new(config.checksum_policy),
            Arc::new(installer),
            config.platform_id(),
        )
        .with_preference(config.artifact)
        .with_check_timeout(config.check_timeout()))
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    async fn run(
        &self,
        update: &AvailableUpdate,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> UpdaterResult<()> {
        let artifact = update
            .artifact
            .as_ref()
            .ok_or_else(|| UpdaterError::NoArtifact(self.platform.clone()))?;

        match self.downloader.cleanup().await {
            Ok(0) => {}
            Ok(n) => info!("Removed {} stale update file(s)", n),
            Err(e) => warn!("Could not clean updates directory: {}", e),
        }

        let downloaded = self.downloader.download(artifact, progress, cancel).await?;
        let verified = self
            .verifier
            .verify_download(downloaded, artifact.checksum.as_ref())
            .await?;

        progress.emit(ProgressEvent::Installing).await;
        info!(
            "Installing {} ({} bytes)",
            update.manifest.version,
            verified.len()
        );
        self.installer.install(&verified, cancel).await?;

        if let Err(e) = tokio::fs::remove_file(verified.path()).await {
            warn!("Could not remove {}: {}", verified.path().display(), e);
        }
        Ok(())
    }
}

#[async_trait]
impl UpdateStrategy for CustomBackend {
    async fn check(&self, current: &Version) -> UpdaterResult<CheckOutcome> {
        match self.manifests.fetch(current, self.check_timeout).await? {
            ManifestOutcome::NoUpdate => Ok(CheckOutcome::UpToDate),
            ManifestOutcome::UpdateAvailable(manifest) => {
                let artifact = match manifest.select_artifact(&self.platform, self.preference) {
                    Ok(selection) => Some(selection),
                    Err(e) => {
                        warn!("{}", e);
                        None
                    }
                };
                Ok(CheckOutcome::Available(AvailableUpdate { manifest, artifact }))
            }
        }
    }

    async fn download_and_install(
        &self,
        update: &AvailableUpdate,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> UpdaterResult<()> {
        let result = self.run(update, &progress, &cancel).await;
        if let Err(e) = &result {
            error!("Update to {} failed: {}", update.manifest.version, e);
            progress
                .emit(ProgressEvent::Error {
                    message: e.to_string(),
                })
                .await;
        }
        result
    }
}
