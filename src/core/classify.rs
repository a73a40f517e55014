// ─── Error Classifier ───
// Maps raw updater failures onto the closed category set the UI understands.

use serde::{Deserialize, Serialize};

use super::error::UpdaterError;

/// Windows: ERROR_ACCESS_DENIED, ERROR_ELEVATION_REQUIRED,
/// ERROR_INSTALL_PACKAGE_REJECTED. Unix: "found but not executable".
const PERMISSION_EXIT_CODES: &[i32] = &[5, 740, 1625, 126];

/// Windows: ERROR_HANDLE_DISK_FULL, ERROR_DISK_FULL.
const DISK_FULL_EXIT_CODES: &[i32] = &[39, 112];

/// ENOSPC on unix, ERROR_DISK_FULL / ERROR_HANDLE_DISK_FULL on Windows.
const DISK_FULL_OS_ERRORS: &[i32] = &[28, 39, 112];

/// Closed failure taxonomy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    Network,
    Timeout,
    ManifestFormat,
    EndpointUnavailable,
    AccessDenied,
    Signature,
    DiskSpace,
    Permission,
    Server,
    Unknown,
}

impl ErrorCategory {
    /// Short remediation hint shown next to the error.
    pub fn hint(self) -> &'static str {
        match self {
            ErrorCategory::Network => "Check your internet connection and try again.",
            ErrorCategory::Timeout => {
                "The update server did not respond in time. Check your connection and try again."
            }
            ErrorCategory::ManifestFormat => "The update information is invalid. Try again later.",
            ErrorCategory::EndpointUnavailable => {
                "The update server is temporarily unavailable. Try again later."
            }
            ErrorCategory::AccessDenied => "Access to the update server was denied.",
            ErrorCategory::Signature => {
                "The update file failed its integrity check. Try again later."
            }
            ErrorCategory::DiskSpace => "Free up disk space and retry.",
            ErrorCategory::Permission => {
                "Permission denied. Try running the application as administrator."
            }
            ErrorCategory::Server => "The update server returned an error. Try again later.",
            ErrorCategory::Unknown => "The update could not be completed. Try again later.",
        }
    }

    fn summary(self) -> &'static str {
        match self {
            ErrorCategory::Network => "Network error while updating",
            ErrorCategory::Timeout => "Update check timed out",
            ErrorCategory::ManifestFormat => "Invalid update manifest",
            ErrorCategory::EndpointUnavailable => "Update endpoint not found",
            ErrorCategory::AccessDenied => "Access denied to update server",
            ErrorCategory::Signature => "Update integrity verification failed",
            ErrorCategory::DiskSpace => "Insufficient disk space",
            ErrorCategory::Permission => "Insufficient permissions to install the update",
            ErrorCategory::Server => "Update server error",
            ErrorCategory::Unknown => "Update failed",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::ManifestFormat => "manifest-format",
            ErrorCategory::EndpointUnavailable => "endpoint-unavailable",
            ErrorCategory::AccessDenied => "access-denied",
            ErrorCategory::Signature => "signature",
            ErrorCategory::DiskSpace => "disk-space",
            ErrorCategory::Permission => "permission",
            ErrorCategory::Server => "server",
            ErrorCategory::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A failure as stored on the session and shown to the user.
///
/// `technical_detail` keeps the raw message for diagnostics; the UI shows
/// `message` and `hint` by default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    pub message: String,
    pub hint: String,
    pub technical_detail: String,
}

impl ClassifiedError {
    pub fn new(category: ErrorCategory, technical_detail: impl Into<String>) -> Self {
        Self {
            category,
            message: category.summary().to_string(),
            hint: category.hint().to_string(),
            technical_detail: technical_detail.into(),
        }
    }
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.message, self.category, self.technical_detail)
    }
}

impl From<UpdaterError> for ClassifiedError {
    fn from(err: UpdaterError) -> Self {
        classify(&err)
    }
}

/// Classify a raw failure.
pub fn classify(err: &UpdaterError) -> ClassifiedError {
    ClassifiedError::new(category_of(err), err.to_string())
}

pub fn category_of(err: &UpdaterError) -> ErrorCategory {
    match err {
        UpdaterError::Io { source, .. } => io_category(source),
        UpdaterError::Http(e) => {
            if e.is_timeout() {
                ErrorCategory::Timeout
            } else if let Some(status) = e.status() {
                status_category(status.as_u16())
            } else {
                ErrorCategory::Network
            }
        }
        UpdaterError::HttpStatus { status, .. } => status_category(*status),
        UpdaterError::Timeout(_) => ErrorCategory::Timeout,
        UpdaterError::IncompleteDownload { .. } => ErrorCategory::Network,
        UpdaterError::Json(_) | UpdaterError::ManifestFormat(_) | UpdaterError::NoArtifact(_) => {
            ErrorCategory::ManifestFormat
        }
        UpdaterError::ChecksumMismatch { .. }
        | UpdaterError::ChecksumMissing(_)
        | UpdaterError::InvalidDigest(_) => ErrorCategory::Signature,
        UpdaterError::InsufficientDisk { .. } => ErrorCategory::DiskSpace,
        UpdaterError::InstallerExit { code } => exit_code_category(*code),
        UpdaterError::Platform(message) => message_category(message),
        UpdaterError::Busy
        | UpdaterError::InvalidTransition { .. }
        | UpdaterError::NothingToInstall
        | UpdaterError::Cancelled
        | UpdaterError::Superseded
        | UpdaterError::Other(_) => ErrorCategory::Unknown,
    }
}

fn status_category(status: u16) -> ErrorCategory {
    match status {
        404 => ErrorCategory::EndpointUnavailable,
        403 => ErrorCategory::AccessDenied,
        _ => ErrorCategory::Server,
    }
}

fn io_category(source: &std::io::Error) -> ErrorCategory {
    if source.kind() == std::io::ErrorKind::PermissionDenied {
        return ErrorCategory::Permission;
    }
    match source.raw_os_error() {
        Some(code) if DISK_FULL_OS_ERRORS.contains(&code) => ErrorCategory::DiskSpace,
        _ => ErrorCategory::Unknown,
    }
}

fn exit_code_category(code: Option<i32>) -> ErrorCategory {
    match code {
        Some(c) if DISK_FULL_EXIT_CODES.contains(&c) => ErrorCategory::DiskSpace,
        Some(c) if PERMISSION_EXIT_CODES.contains(&c) => ErrorCategory::Permission,
        _ => ErrorCategory::Unknown,
    }
}

/// Platform updaters only hand back strings, so fall back to keyword matching.
fn message_category(message: &str) -> ErrorCategory {
    let lower = message.to_ascii_lowercase();
    if lower.contains("timed out") || lower.contains("timeout") {
        ErrorCategory::Timeout
    } else if lower.contains("signature") || lower.contains("verification") {
        ErrorCategory::Signature
    } else if lower.contains("404") {
        ErrorCategory::EndpointUnavailable
    } else if lower.contains("403") {
        ErrorCategory::AccessDenied
    } else if lower.contains("parse") || lower.contains("json") {
        ErrorCategory::ManifestFormat
    } else if lower.contains("disk") || lower.contains("space") {
        ErrorCategory::DiskSpace
    } else if lower.contains("permission") || lower.contains("access is denied") {
        ErrorCategory::Permission
    } else if lower.contains("network") || lower.contains("fetch") || lower.contains("connect") {
        ErrorCategory::Network
    } else {
        ErrorCategory::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn http_status_maps_to_endpoint_categories() {
        let status = |status| UpdaterError::HttpStatus {
            url: "https://example.com/latest.json".into(),
            status,
        };
        assert_eq!(category_of(&status(404)), ErrorCategory::EndpointUnavailable);
        assert_eq!(category_of(&status(403)), ErrorCategory::AccessDenied);
        assert_eq!(category_of(&status(500)), ErrorCategory::Server);
        assert_eq!(category_of(&status(418)), ErrorCategory::Server);
    }

    #[test]
    fn checksum_failures_are_signature() {
        let err = UpdaterError::ChecksumMismatch {
            path: "update.exe".into(),
            expected: "aa".into(),
            actual: "bb".into(),
        };
        let classified = classify(&err);
        assert_eq!(classified.category, ErrorCategory::Signature);
        assert!(classified.technical_detail.contains("expected aa"));
        assert!(classified.hint.contains("integrity"));
    }

    #[test]
    fn installer_exit_codes_are_classified() {
        let exit = |code| UpdaterError::InstallerExit { code };
        assert_eq!(category_of(&exit(Some(112))), ErrorCategory::DiskSpace);
        assert_eq!(category_of(&exit(Some(740))), ErrorCategory::Permission);
        assert_eq!(category_of(&exit(Some(1603))), ErrorCategory::Unknown);
        assert_eq!(category_of(&exit(None)), ErrorCategory::Unknown);
    }

    #[test]
    fn io_errors_distinguish_permission_and_disk_full() {
        let denied = UpdaterError::io(
            "/tmp/x",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert_eq!(category_of(&denied), ErrorCategory::Permission);

        let full = UpdaterError::io("/tmp/x", std::io::Error::from_raw_os_error(28));
        assert_eq!(category_of(&full), ErrorCategory::DiskSpace);
    }

    #[test]
    fn platform_messages_use_keywords() {
        let platform = |m: &str| category_of(&UpdaterError::Platform(m.into()));
        assert_eq!(platform("signature verification failed"), ErrorCategory::Signature);
        assert_eq!(platform("request returned 404"), ErrorCategory::EndpointUnavailable);
        assert_eq!(platform("failed to connect"), ErrorCategory::Network);
        assert_eq!(platform("something odd"), ErrorCategory::Unknown);
    }

    #[test]
    fn timeout_and_category_serialization() {
        let classified = classify(&UpdaterError::Timeout(Duration::from_secs(30)));
        assert_eq!(classified.category, ErrorCategory::Timeout);

        let json = serde_json::to_string(&ErrorCategory::EndpointUnavailable).unwrap();
        assert_eq!(json, "\"endpoint-unavailable\"");
        assert_eq!(ErrorCategory::ManifestFormat.to_string(), "manifest-format");
    }
}
