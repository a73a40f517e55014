use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Raw failure type for the whole updater.
/// Every component returns `Result<T, UpdaterError>`; the session layer turns
/// these into a [`ClassifiedError`](crate::core::classify::ClassifiedError)
/// before they are stored or shown.
#[derive(Debug, Error)]
pub enum UpdaterError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request to {url} failed: HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Download incomplete: expected {expected} bytes, got {actual}")]
    IncompleteDownload { expected: u64, actual: u64 },

    // ── Manifest ────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid update manifest: {0}")]
    ManifestFormat(String),

    #[error("No artifact for platform {0}")]
    NoArtifact(String),

    // ── Integrity ───────────────────────────────────────
    #[error("SHA-256 mismatch for {path:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Manifest declares no SHA-256 for {0}")]
    ChecksumMissing(String),

    #[error("Invalid SHA-256 digest: {0}")]
    InvalidDigest(String),

    // ── Install ─────────────────────────────────────────
    #[error("Not enough disk space: {available} bytes available, {required} required")]
    InsufficientDisk { available: u64, required: u64 },

    #[error("Installer exited with code {code:?}")]
    InstallerExit { code: Option<i32> },

    #[error("Platform updater failed: {0}")]
    Platform(String),

    // ── Session ─────────────────────────────────────────
    #[error("An update is already downloading or installing")]
    Busy,

    #[error("Invalid session transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("No update is available to install")]
    NothingToInstall,

    #[error("Update cancelled")]
    Cancelled,

    #[error("Session was replaced by a newer check")]
    Superseded,

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type UpdaterResult<T> = Result<T, UpdaterError>;

impl From<std::io::Error> for UpdaterError {
    fn from(source: std::io::Error) -> Self {
        UpdaterError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

impl UpdaterError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        UpdaterError::Io {
            path: path.into(),
            source,
        }
    }
}

// ── Serialization for Tauri IPC ─────────────────────────
// Tauri commands require the error type to implement `Serialize`.
impl serde::Serialize for UpdaterError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
