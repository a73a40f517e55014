use chrono::{DateTime, Utc};
use semver::Version;
use serde::Serialize;
use tracing::debug;

use super::state::SessionState;
use crate::core::backend::AvailableUpdate;
use crate::core::classify::ClassifiedError;
use crate::core::downloader::ProgressEvent;
use crate::core::error::{UpdaterError, UpdaterResult};
use crate::core::manifest::{ArtifactSelection, UpdateManifest};

/// One check-and-maybe-install attempt. Cloned out as the snapshot that
/// observers and commands see.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UpdateSession {
    pub id: u64,
    pub state: SessionState,
    pub current_version: Version,
    pub manifest: Option<UpdateManifest>,
    pub artifact: Option<ArtifactSelection>,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    pub percent: u8,
    pub last_error: Option<ClassifiedError>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UpdateSession {
    pub fn new(id: u64, current_version: Version) -> Self {
        let now = Utc::now();
        Self {
            id,
            state: SessionState::Idle,
            current_version,
            manifest: None,
            artifact: None,
            downloaded_bytes: 0,
            total_bytes: None,
            percent: 0,
            last_error: None,
            started_at: now,
            updated_at: now,
        }
    }

    /// Move along the state graph, rejecting anything else.
    pub fn transition(&mut self, next: SessionState) -> UpdaterResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(UpdaterError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        debug!("Session {}: {} -> {}", self.id, self.state, next);
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn record_update(&mut self, update: &AvailableUpdate) {
        self.manifest = Some(update.manifest.clone());
        self.artifact = update.artifact.clone();
    }

    pub fn fail(&mut self, error: ClassifiedError) -> UpdaterResult<()> {
        self.last_error = Some(error);
        self.transition(SessionState::Error)
    }

    /// Fold a progress event into the counters. Returns true when the state
    /// changed as a result (`Installing`).
    pub fn apply_progress(&mut self, event: &ProgressEvent) -> UpdaterResult<bool> {
        match event {
            ProgressEvent::Started { content_length } => {
                self.downloaded_bytes = 0;
                self.total_bytes = *content_length;
                self.percent = 0;
            }
            ProgressEvent::Progress {
                downloaded,
                total,
                percent,
            } => {
                self.downloaded_bytes = *downloaded;
                self.total_bytes = Some(*total);
                self.percent = self.percent.max(*percent);
            }
            ProgressEvent::Finished | ProgressEvent::Error { .. } => {}
            ProgressEvent::Installing => {
                if self.state == SessionState::Downloading {
                    self.transition(SessionState::Installing)?;
                    return Ok(true);
                }
            }
        }
        self.updated_at = Utc::now();
        Ok(false)
    }
}
