// ─── Integrity Verifier ───
// SHA-256 verification of downloaded installers against the manifest digest.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{error, info, warn};

use crate::core::downloader::DownloadedArtifact;
use crate::core::error::{UpdaterError, UpdaterResult};

const READ_BUFFER_BYTES: usize = 64 * 1024;

/// A SHA-256 digest, always stored as 64 lower-case hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sha256Digest(String);

impl Sha256Digest {
    pub fn parse(raw: &str) -> UpdaterResult<Self> {
        let hex = raw.trim().to_ascii_lowercase();
        if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(UpdaterError::InvalidDigest(raw.to_string()));
        }
        Ok(Self(hex))
    }

    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self::from_hasher(hasher)
    }

    pub(crate) fn from_hasher(hasher: Sha256) -> Self {
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Sha256Digest {
    type Err = UpdaterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Sha256Digest {
    type Error = UpdaterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Sha256Digest> for String {
    fn from(digest: Sha256Digest) -> Self {
        digest.0
    }
}

/// What to do when the manifest carries no digest for the chosen artifact.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumPolicy {
    /// Refuse to install an artifact that cannot be verified.
    Require,
    /// Legacy behaviour: install unverified artifacts with a warning.
    /// This is a known security gap and must be opted into.
    WarnAndSkip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Ok,
    Mismatch {
        expected: Sha256Digest,
        actual: Sha256Digest,
    },
}

impl Verification {
    pub fn is_ok(&self) -> bool {
        matches!(self, Verification::Ok)
    }
}

/// An artifact whose bytes passed verification. Only [`IntegrityVerifier`]
/// can build one, so an installer taking `&VerifiedArtifact` cannot be handed
/// unchecked bytes.
#[derive(Debug, Clone)]
pub struct VerifiedArtifact {
    path: PathBuf,
    len: u64,
    digest: Sha256Digest,
    declared: bool,
}

impl VerifiedArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn digest(&self) -> &Sha256Digest {
        &self.digest
    }

    /// False only when [`ChecksumPolicy::WarnAndSkip`] let a digest-less
    /// artifact through.
    pub fn matched_declared_digest(&self) -> bool {
        self.declared
    }
}

#[derive(Debug, Clone)]
pub struct IntegrityVerifier {
    policy: ChecksumPolicy,
}

impl IntegrityVerifier {
    pub fn new(policy: ChecksumPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ChecksumPolicy {
        self.policy
    }

    /// Compare the SHA-256 of `bytes` with `expected`.
    pub fn verify(bytes: &[u8], expected: &Sha256Digest) -> Verification {
        compare(Sha256Digest::of(bytes), expected)
    }

    /// Hash a file in fixed-size chunks and compare it with `expected`.
    pub async fn verify_file(path: &Path, expected: &Sha256Digest) -> UpdaterResult<Verification> {
        let actual = compute_file_digest(path).await?;
        Ok(compare(actual, expected))
    }

    /// Turn a finished download into a [`VerifiedArtifact`].
    ///
    /// On mismatch, or a missing digest under [`ChecksumPolicy::Require`],
    /// the downloaded file is removed and an error returned.
    pub async fn verify_download(
        &self,
        artifact: DownloadedArtifact,
        expected: Option<&Sha256Digest>,
    ) -> UpdaterResult<VerifiedArtifact> {
        let Some(expected) = expected else {
            return match self.policy {
                ChecksumPolicy::Require => {
                    error!(
                        "Refusing unverifiable artifact {}: manifest declares no SHA-256",
                        artifact.url
                    );
                    discard(&artifact.path).await;
                    Err(UpdaterError::ChecksumMissing(artifact.url))
                }
                ChecksumPolicy::WarnAndSkip => {
                    warn!("NO CHECKSUM PROVIDED for {}: skipping verification", artifact.url);
                    warn!("Installing an unverified artifact is a security risk");
                    Ok(VerifiedArtifact {
                        path: artifact.path,
                        len: artifact.len,
                        digest: artifact.digest,
                        declared: false,
                    })
                }
            };
        };

        match compare(artifact.digest.clone(), expected) {
            Verification::Ok => {
                info!("Checksum verified: {}", expected);
                Ok(VerifiedArtifact {
                    path: artifact.path,
                    len: artifact.len,
                    digest: artifact.digest,
                    declared: true,
                })
            }
            Verification::Mismatch { expected, actual } => {
                error!(
                    "Checksum mismatch for {}: expected {}, got {} ({} bytes)",
                    artifact.url, expected, actual, artifact.len
                );
                discard(&artifact.path).await;
                Err(UpdaterError::ChecksumMismatch {
                    path: artifact.path,
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                })
            }
        }
    }
}

fn compare(actual: Sha256Digest, expected: &Sha256Digest) -> Verification {
    if &actual == expected {
        Verification::Ok
    } else {
        Verification::Mismatch {
            expected: expected.clone(),
            actual,
        }
    }
}

pub async fn compute_file_digest(path: &Path) -> UpdaterResult<Sha256Digest> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| UpdaterError::io(path, e))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_BUFFER_BYTES];
    loop {
        let read = file
            .read(&mut buffer)
            .await
            .map_err(|e| UpdaterError::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(Sha256Digest::from_hasher(hasher))
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("Failed to remove rejected artifact {}: {}", path.display(), e);
    }
}
