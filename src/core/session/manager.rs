use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use semver::Version;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::{EventSink, SessionEvent};
use super::model::UpdateSession;
use super::state::SessionState;
use crate::core::backend::{AvailableUpdate, CheckOutcome, UpdateBackend};
use crate::core::classify::classify;
use crate::core::config::BackendKind;
use crate::core::downloader::{subscribe, ProgressEvent};
use crate::core::error::{UpdaterError, UpdaterResult};
use crate::core::relaunch::{RelaunchCoordinator, Relauncher};
use crate::core::state::LastCheckStore;
use crate::core::version::VersionProbe;

const DEFAULT_RELAUNCH_GRACE: Duration = Duration::from_secs(1);

struct Inner {
    generation: u64,
    session: Option<UpdateSession>,
    pending: Option<AvailableUpdate>,
    cancel: CancellationToken,
}

/// Drives update sessions through the state graph.
///
/// A new `check` supersedes whatever session came before it unless that
/// session is downloading or installing, in which case it is refused with
/// [`UpdaterError::Busy`]. Events from a superseded session are dropped.
pub struct UpdateManager {
    backend: Arc<UpdateBackend>,
    probe: Arc<dyn VersionProbe>,
    relauncher: Arc<dyn Relauncher>,
    relaunch: RelaunchCoordinator,
    sink: Arc<dyn EventSink>,
    last_check: Option<LastCheckStore>,
    inner: Mutex<Inner>,
}

impl UpdateManager {
    pub fn new(
        backend: UpdateBackend,
        probe: Arc<dyn VersionProbe>,
        relauncher: Arc<dyn Relauncher>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            backend: Arc::new(backend),
            probe,
            relaunch: RelaunchCoordinator::new(relauncher.clone(), DEFAULT_RELAUNCH_GRACE),
            relauncher,
            sink,
            last_check: None,
            inner: Mutex::new(Inner {
                generation: 0,
                session: None,
                pending: None,
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn with_relaunch_grace(mut self, grace: Duration) -> Self {
        self.relaunch = RelaunchCoordinator::new(self.relauncher.clone(), grace);
        self
    }

    pub fn with_last_check_store(mut self, store: LastCheckStore) -> Self {
        self.last_check = Some(store);
        self
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn current_version(&self) -> Version {
        self.probe.current()
    }

    pub fn last_check_store(&self) -> Option<&LastCheckStore> {
        self.last_check.as_ref()
    }

    /// Snapshot of the latest session, if any check ran.
    pub async fn status(&self) -> Option<UpdateSession> {
        self.inner.lock().await.session.clone()
    }

    /// Start a new session and ask the backend whether a newer release exists.
    ///
    /// Failures of the check itself end the session in `ERROR` and are
    /// returned as `Ok`; `Err` is reserved for `Busy` and `Superseded`.
    pub async fn check(&self) -> UpdaterResult<UpdateSession> {
        let (generation, current, cancel) = self.begin_check().await?;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UpdaterError::Cancelled),
            result = self.backend.check(&current) => result,
        };

        self.finish_check(generation, result).await
    }

    async fn begin_check(&self) -> UpdaterResult<(u64, Version, CancellationToken)> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        if let Some(previous) = &inner.session {
            if previous.state.is_busy() {
                warn!(
                    "Check refused: session {} is {}",
                    previous.id, previous.state
                );
                return Err(UpdaterError::Busy);
            }
            if !previous.state.is_terminal() {
                info!("Superseding session {} ({})", previous.id, previous.state);
            }
        }

        inner.cancel.cancel();
        inner.cancel = CancellationToken::new();
        inner.generation += 1;
        inner.pending = None;

        let current = self.probe.current();
        let mut session = UpdateSession::new(inner.generation, current.clone());
        session.transition(SessionState::Checking)?;
        info!("Session {}: checking for updates (current {})", session.id, current);
        self.sink.emit(SessionEvent::Status {
            session: session.clone(),
        });
        inner.session = Some(session);

        Ok((inner.generation, current, inner.cancel.clone()))
    }

    async fn finish_check(
        &self,
        generation: u64,
        result: UpdaterResult<CheckOutcome>,
    ) -> UpdaterResult<UpdateSession> {
        let (snapshot, checked) = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            if inner.generation != generation {
                debug!("Dropping check result of superseded session {}", generation);
                return Err(UpdaterError::Superseded);
            }
            let session = inner.session.as_mut().ok_or(UpdaterError::Superseded)?;

            let checked = match result {
                Ok(CheckOutcome::UpToDate) => {
                    session.transition(SessionState::UpToDate)?;
                    Some(None)
                }
                Ok(CheckOutcome::Available(update)) => {
                    session.record_update(&update);
                    session.transition(SessionState::UpdateAvailable)?;
                    let latest = update.manifest.version.to_string();
                    inner.pending = Some(update);
                    Some(Some(latest))
                }
                Err(e) => {
                    let classified = classify(&e);
                    warn!("Session {}: check failed: {}", session.id, classified);
                    session.fail(classified)?;
                    None
                }
            };

            let snapshot = session.clone();
            self.sink.emit(SessionEvent::Status {
                session: snapshot.clone(),
            });
            (snapshot, checked)
        };

        if let Some(latest_version) = checked {
            self.record_check(latest_version).await;
        }
        Ok(snapshot)
    }

    async fn record_check(&self, latest_version: Option<String>) {
        if let Some(store) = &self.last_check {
            if let Err(e) = store.record(Utc::now(), latest_version).await {
                warn!("Could not record last update check: {}", e);
            }
        }
    }

    /// Download, verify and install the update found by the last check,
    /// then relaunch.
    ///
    /// Progress subscription is in place before the backend starts, so the
    /// first event is never lost. The session reaches 100% before
    /// `INSTALLING` and `INSTALLING` before `COMPLETED`.
    pub async fn download_and_install(&self) -> UpdaterResult<UpdateSession> {
        let (generation, update, cancel) = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            let session = match inner.session.as_mut() {
                Some(s) if s.state == SessionState::UpdateAvailable => s,
                Some(s) if s.state.is_busy() => return Err(UpdaterError::Busy),
                _ => return Err(UpdaterError::NothingToInstall),
            };
            let update = inner.pending.clone().ok_or(UpdaterError::NothingToInstall)?;

            session.transition(SessionState::Downloading)?;
            info!(
                "Session {}: downloading {}",
                session.id, update.manifest.version
            );
            self.sink.emit(SessionEvent::Status {
                session: session.clone(),
            });
            (inner.generation, update, inner.cancel.clone())
        };

        let (mut subscription, sender) = subscribe();
        let work = self.backend.download_and_install(&update, sender, cancel);
        let pump = async move {
            while let Some(event) = subscription.recv().await {
                self.on_progress(generation, event).await;
            }
        };
        let (result, ()) = tokio::join!(work, pump);

        let outcome = self.finish_install(generation, result).await?;
        if outcome.state == SessionState::Completed {
            match self.relaunch.relaunch().await {
                Ok(true) => {}
                Ok(false) => debug!("Relaunch already triggered"),
                Err(e) => error!("Update installed but relaunch failed: {}", e),
            }
        }
        Ok(outcome)
    }

    async fn on_progress(&self, generation: u64, event: ProgressEvent) {
        let mut guard = self.inner.lock().await;
        if guard.generation != generation {
            debug!("Dropping progress of superseded session {}", generation);
            return;
        }
        let Some(session) = guard.session.as_mut() else {
            return;
        };

        let state_changed = match session.apply_progress(&event) {
            Ok(changed) => changed,
            Err(e) => {
                warn!("Session {}: {}", session.id, e);
                false
            }
        };
        self.sink.emit(SessionEvent::Progress {
            session_id: session.id,
            event,
        });
        if state_changed {
            self.sink.emit(SessionEvent::Status {
                session: session.clone(),
            });
        }
    }

    async fn finish_install(
        &self,
        generation: u64,
        result: UpdaterResult<()>,
    ) -> UpdaterResult<UpdateSession> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if inner.generation != generation {
            return Err(UpdaterError::Superseded);
        }
        inner.pending = None;
        let session = inner.session.as_mut().ok_or(UpdaterError::Superseded)?;

        match result {
            Ok(()) => {
                if session.state == SessionState::Downloading {
                    session.transition(SessionState::Installing)?;
                    self.sink.emit(SessionEvent::Status {
                        session: session.clone(),
                    });
                }
                session.transition(SessionState::Completed)?;
                info!("Session {}: update installed", session.id);
            }
            Err(e) => {
                let classified = classify(&e);
                error!("Session {}: update failed: {}", session.id, classified);
                session.fail(classified)?;
            }
        }

        let snapshot = session.clone();
        self.sink.emit(SessionEvent::Status {
            session: snapshot.clone(),
        });
        Ok(snapshot)
    }

    /// Abort an in-flight check or download. An installer that already
    /// started is left to finish. Returns false when nothing was running.
    pub async fn cancel(&self) -> bool {
        let inner = self.inner.lock().await;
        match &inner.session {
            Some(session)
                if matches!(
                    session.state,
                    SessionState::Checking | SessionState::Downloading | SessionState::Installing
                ) =>
            {
                info!("Session {}: cancel requested ({})", session.id, session.state);
                inner.cancel.cancel();
                true
            }
            _ => false,
        }
    }
}
