use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of one update session.
///
/// ```text
/// IDLE -> CHECKING -> UP_TO_DATE | UPDATE_AVAILABLE | ERROR
/// UPDATE_AVAILABLE -> DOWNLOADING -> INSTALLING -> COMPLETED
/// DOWNLOADING | INSTALLING -> ERROR
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Idle,
    Checking,
    UpToDate,
    UpdateAvailable,
    Downloading,
    Installing,
    Completed,
    Error,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Checking)
                | (Checking, UpToDate)
                | (Checking, UpdateAvailable)
                | (Checking, Error)
                | (UpdateAvailable, Downloading)
                | (Downloading, Installing)
                | (Downloading, Error)
                | (Installing, Completed)
                | (Installing, Error)
        )
    }

    /// No transition leaves these states; a new check starts a new session.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::UpToDate | SessionState::Completed | SessionState::Error
        )
    }

    /// A download or install is in flight and must not be superseded.
    pub fn is_busy(self) -> bool {
        matches!(self, SessionState::Downloading | SessionState::Installing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "IDLE",
            SessionState::Checking => "CHECKING",
            SessionState::UpToDate => "UP_TO_DATE",
            SessionState::UpdateAvailable => "UPDATE_AVAILABLE",
            SessionState::Downloading => "DOWNLOADING",
            SessionState::Installing => "INSTALLING",
            SessionState::Completed => "COMPLETED",
            SessionState::Error => "ERROR",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
