use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use semver::Version;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{AvailableUpdate, CheckOutcome, UpdateStrategy};
use crate::core::downloader::{ProgressEvent, ProgressSender, ProgressTracker};
use crate::core::error::{UpdaterError, UpdaterResult};
use crate::core::manifest::UpdateManifest;
use crate::core::version::{is_newer, parse_version};

/// What the host updater reports about the latest release.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformRelease {
    pub version: String,
    pub body: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

/// Download callbacks from the host updater. `downloaded` is cumulative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformEvent {
    Started { content_length: Option<u64> },
    Progress { downloaded: u64, content_length: Option<u64> },
    Finished,
}

pub type PlatformCallback = Box<dyn FnMut(PlatformEvent) + Send>;

/// A host-provided updater that picks, downloads, verifies and installs
/// the artifact itself.
#[async_trait]
pub trait PlatformUpdater: Send + Sync {
    /// `Ok(None)` when the host reports nothing newer.
    async fn check(&self) -> UpdaterResult<Option<PlatformRelease>>;

    /// Download and install the release found by the last `check`. The
    /// host installs right after `Finished`.
    async fn download_and_install(&self, on_event: PlatformCallback) -> UpdaterResult<()>;
}

/// Adapts a [`PlatformUpdater`] to the session's progress protocol.
pub struct PlatformPluginBackend {
    updater: Arc<dyn PlatformUpdater>,
    check_timeout: Duration,
}

impl PlatformPluginBackend {
    pub fn new(updater: Arc<dyn PlatformUpdater>, check_timeout: Duration) -> Self {
        Self {
            updater,
            check_timeout,
        }
    }
}

fn release_manifest(release: PlatformRelease, version: Version) -> UpdateManifest {
    UpdateManifest {
        version,
        release_notes: release.body.unwrap_or_default(),
        publish_date: release.date,
        platforms: HashMap::new(),
    }
}

/// Translates host callbacks into throttled progress events, followed by
/// `Installing` once the download is finished.
fn progress_bridge(progress: ProgressSender, installing: Arc<AtomicBool>) -> PlatformCallback {
    let mut tracker = ProgressTracker::new(None);
    Box::new(move |event| match event {
        PlatformEvent::Started { content_length } => {
            info!("Platform download started ({:?} bytes)", content_length);
            tracker = ProgressTracker::new(content_length);
            progress.try_emit(ProgressEvent::Started { content_length });
        }
        PlatformEvent::Progress {
            downloaded,
            content_length,
        } => {
            if tracker.total().is_none() && content_length.is_some() {
                tracker = ProgressTracker::new(content_length);
            }
            if let Some(event) = tracker.set_downloaded(downloaded) {
                debug!("Platform download progress: {:?}", event);
                progress.try_emit(event);
            }
        }
        PlatformEvent::Finished => {
            if let Some(event) = tracker.finish() {
                progress.try_emit(event);
            }
            progress.try_emit(ProgressEvent::Finished);
            installing.store(true, Ordering::SeqCst);
            progress.try_emit(ProgressEvent::Installing);
        }
    })
}

#[async_trait]
impl UpdateStrategy for PlatformPluginBackend {
    async fn check(&self, current: &Version) -> UpdaterResult<CheckOutcome> {
        let release = tokio::time::timeout(self.check_timeout, self.updater.check())
            .await
            .map_err(|_| {
                warn!("Platform update check timed out after {:?}", self.check_timeout);
                UpdaterError::Timeout(self.check_timeout)
            })??;

        let Some(release) = release else {
            info!("Platform updater reports no update");
            return Ok(CheckOutcome::UpToDate);
        };

        let version = parse_version(&release.version)?;
        if !is_newer(&version, current) {
            info!("Platform release {} is not newer than {}", version, current);
            return Ok(CheckOutcome::UpToDate);
        }

        info!("Update available: {} -> {}", current, version);
        Ok(CheckOutcome::Available(AvailableUpdate {
            manifest: release_manifest(release, version),
            artifact: None,
        }))
    }

    async fn download_and_install(
        &self,
        update: &AvailableUpdate,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> UpdaterResult<()> {
        let installing = Arc::new(AtomicBool::new(false));
        let callback = progress_bridge(progress.clone(), installing.clone());

        let install = self.updater.download_and_install(callback);
        tokio::pin!(install);

        // Cancellation is honored only while downloading; once the host
        // starts installing, the install runs to completion.
        let mut cancel_ignored = false;
        let result = loop {
            tokio::select! {
                biased;
                result = &mut install => break result,
                _ = cancel.cancelled(), if !cancel_ignored => {
                    if installing.load(Ordering::SeqCst) {
                        warn!("Cancel requested during install, letting installer finish");
                        cancel_ignored = true;
                    } else {
                        warn!("Platform download cancelled");
                        break Err(UpdaterError::Cancelled);
                    }
                }
            }
        };

        if let Err(e) = &result {
            error!("Platform update to {} failed: {}", update.manifest.version, e);
            progress
                .emit(ProgressEvent::Error {
                    message: e.to_string(),
                })
                .await;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classify::{category_of, ErrorCategory};
    use crate::core::downloader::{subscribe, ProgressSubscription};

    struct FakeHost {
        release: Option<PlatformRelease>,
        events: Vec<PlatformEvent>,
        outcome: Result<(), String>,
        hang_check: bool,
        hang_install: bool,
    }

    impl FakeHost {
        fn offering(version: &str) -> Self {
            Self {
                release: Some(PlatformRelease {
                    version: version.into(),
                    body: Some("notes".into()),
                    date: None,
                }),
                events: vec![
                    PlatformEvent::Started {
                        content_length: Some(100),
                    },
                    PlatformEvent::Progress {
                        downloaded: 50,
                        content_length: Some(100),
                    },
                    PlatformEvent::Progress {
                        downloaded: 100,
                        content_length: Some(100),
                    },
                    PlatformEvent::Finished,
                ],
                outcome: Ok(()),
                hang_check: false,
                hang_install: false,
            }
        }
    }

    #[async_trait]
    impl PlatformUpdater for FakeHost {
        async fn check(&self) -> UpdaterResult<Option<PlatformRelease>> {
            if self.hang_check {
                std::future::pending::<()>().await;
            }
            Ok(self.release.clone())
        }

        async fn download_and_install(&self, mut on_event: PlatformCallback) -> UpdaterResult<()> {
            for event in &self.events {
                on_event(*event);
            }
            if self.hang_install {
                std::future::pending::<()>().await;
            }
            self.outcome.clone().map_err(UpdaterError::Platform)
        }
    }

    async fn drain(mut subscription: ProgressSubscription) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = subscription.recv().await {
            events.push(event);
        }
        events
    }

    async fn available(backend: &PlatformPluginBackend) -> AvailableUpdate {
        match backend.check(&Version::new(1, 0, 0)).await.unwrap() {
            CheckOutcome::Available(update) => update,
            other => panic!("expected an update, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn reports_release_without_artifact_selection() {
        let backend = PlatformPluginBackend::new(Arc::new(FakeHost::offering("v1.1.0")), Duration::from_secs(5));
        let update = available(&backend).await;
        assert_eq!(update.manifest.version, Version::new(1, 1, 0));
        assert_eq!(update.manifest.release_notes, "notes");
        assert!(update.artifact.is_none());

        let older = PlatformPluginBackend::new(Arc::new(FakeHost::offering("0.9.0")), Duration::from_secs(5));
        assert_eq!(older.check(&Version::new(1, 0, 0)).await.unwrap(), CheckOutcome::UpToDate);
    }

    #[tokio::test]
    async fn host_callbacks_become_progress_then_installing() {
        let backend = PlatformPluginBackend::new(Arc::new(FakeHost::offering("1.1.0")), Duration::from_secs(5));
        let update = available(&backend).await;

        let (subscription, sender) = subscribe();
        let collector = tokio::spawn(drain(subscription));
        backend
            .download_and_install(&update, sender, CancellationToken::new())
            .await
            .unwrap();
        let events = collector.await.unwrap();

        assert_eq!(
            events,
            vec![
                ProgressEvent::Started {
                    content_length: Some(100)
                },
                ProgressEvent::Progress {
                    downloaded: 50,
                    total: 100,
                    percent: 50
                },
                ProgressEvent::Progress {
                    downloaded: 100,
                    total: 100,
                    percent: 100
                },
                ProgressEvent::Finished,
                ProgressEvent::Installing,
            ]
        );
    }

    #[tokio::test]
    async fn host_failure_is_classified_from_message() {
        let mut host = FakeHost::offering("1.1.0");
        host.outcome = Err("signature verification failed".into());
        let backend = PlatformPluginBackend::new(Arc::new(host), Duration::from_secs(5));
        let update = available(&backend).await;

        let (subscription, sender) = subscribe();
        let collector = tokio::spawn(drain(subscription));
        let err = backend
            .download_and_install(&update, sender, CancellationToken::new())
            .await
            .unwrap_err();
        let events = collector.await.unwrap();

        assert_eq!(category_of(&err), ErrorCategory::Signature);
        assert!(matches!(events.last(), Some(ProgressEvent::Error { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_check_times_out() {
        let mut host = FakeHost::offering("1.1.0");
        host.hang_check = true;
        let backend = PlatformPluginBackend::new(Arc::new(host), Duration::from_secs(30));
        let err = backend.check(&Version::new(1, 0, 0)).await.unwrap_err();
        assert_eq!(category_of(&err), ErrorCategory::Timeout);
    }

    #[tokio::test]
    async fn cancel_after_finished_waits_for_install() {
        let mut host = FakeHost::offering("1.1.0");
        host.hang_install = true;
        let backend = Arc::new(PlatformPluginBackend::new(Arc::new(host), Duration::from_secs(5)));
        let update = available(&backend).await;

        let (_subscription, sender) = subscribe();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let run = tokio::spawn({
            let backend = backend.clone();
            async move { backend.download_and_install(&update, sender, cancel).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!run.is_finished());
        run.abort();
    }

    #[tokio::test]
    async fn cancel_before_download_finishes_aborts() {
        let mut host = FakeHost::offering("1.1.0");
        host.events.truncate(2);
        host.hang_install = true;
        let backend = PlatformPluginBackend::new(Arc::new(host), Duration::from_secs(5));
        let update = AvailableUpdate {
            manifest: release_manifest(
                PlatformRelease {
                    version: "1.1.0".into(),
                    body: None,
                    date: None,
                },
                Version::new(1, 1, 0),
            ),
            artifact: None,
        };

        let (_subscription, sender) = subscribe();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = backend
            .download_and_install(&update, sender, cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, UpdaterError::Cancelled));
    }
}
