pub mod native;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::error::UpdaterResult;
use crate::core::integrity::VerifiedArtifact;

pub use native::{CopyRetry, NativeInstaller, ARTIFACT_PLACEHOLDER};

/// Installs an artifact that already passed integrity verification.
///
/// Never retried: a failed install ends the session.
#[async_trait]
pub trait ArtifactInstaller: Send + Sync {
    async fn install(&self, artifact: &VerifiedArtifact, cancel: &CancellationToken) -> UpdaterResult<()>;
}
