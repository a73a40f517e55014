// ─── Native Installer ───
// Runs the platform installer against a verified artifact and waits for it.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::ArtifactInstaller;
use crate::core::error::{UpdaterError, UpdaterResult};
use crate::core::integrity::{IntegrityVerifier, VerifiedArtifact};

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Placeholder replaced by the staged installer path in custom commands.
pub const ARTIFACT_PLACEHOLDER: &str = "{artifact}";

/// Retry schedule for copying the installer out of the download location.
/// Antivirus scanners commonly hold a lock on freshly written executables.
#[derive(Debug, Clone)]
pub struct CopyRetry {
    pub attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for CopyRetry {
    fn default() -> Self {
        Self {
            attempts: 10,
            initial_backoff: Duration::from_millis(700),
            max_backoff: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NativeInstaller {
    staging_dir: PathBuf,
    command: Option<Vec<String>>,
    copy_retry: CopyRetry,
}

impl NativeInstaller {
    pub fn new(staging_dir: PathBuf) -> Self {
        Self {
            staging_dir,
            command: None,
            copy_retry: CopyRetry::default(),
        }
    }

    /// Replace the extension-based installer invocation, e.g.
    /// `["pkexec", "dpkg", "-i", "{artifact}"]`.
    pub fn with_command(mut self, command: Option<Vec<String>>) -> Self {
        self.command = command.filter(|c| !c.is_empty());
        self
    }

    pub fn with_copy_retry(mut self, retry: CopyRetry) -> Self {
        self.copy_retry = retry;
        self
    }

    /// Copy the artifact to a fresh staging file and re-check its digest.
    async fn stage(&self, artifact: &VerifiedArtifact) -> UpdaterResult<PathBuf> {
        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .map_err(|e| UpdaterError::io(&self.staging_dir, e))?;

        let extension = artifact
            .path()
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_else(|| "bin".into());
        let staged = self
            .staging_dir
            .join(format!("installer_{}.{}", Uuid::new_v4(), extension));

        let mut attempt = 0;
        let mut backoff = self.copy_retry.initial_backoff;
        loop {
            match tokio::fs::copy(artifact.path(), &staged).await {
                Ok(_) => break,
                Err(e) if attempt < self.copy_retry.attempts => {
                    attempt += 1;
                    warn!(
                        "Installer copy failed (attempt {}), retrying in {:?}: {}",
                        attempt, backoff, e
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.copy_retry.max_backoff);
                }
                Err(e) => {
                    error!("Failed to copy installer after {} attempts: {}", attempt, e);
                    return Err(UpdaterError::io(&staged, e));
                }
            }
        }

        let check = IntegrityVerifier::verify_file(&staged, artifact.digest()).await?;
        if let crate::core::integrity::Verification::Mismatch { expected, actual } = check {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(UpdaterError::ChecksumMismatch {
                path: staged,
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }

        Ok(staged)
    }

    fn build_command(&self, staged: &Path) -> tokio::process::Command {
        let (program, args) = match &self.command {
            Some(template) => expand_template(template, staged),
            None => default_invocation(staged),
        };

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());
        configure_platform_spawn(&mut cmd);
        cmd
    }
}

#[async_trait]
impl ArtifactInstaller for NativeInstaller {
    async fn install(
        &self,
        artifact: &VerifiedArtifact,
        cancel: &CancellationToken,
    ) -> UpdaterResult<()> {
        ensure_min_disk_space(&self.staging_dir, artifact.len().saturating_mul(2))?;

        let staged = self.stage(artifact).await?;

        // Last point at which the install can be abandoned.
        if cancel.is_cancelled() {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(UpdaterError::Cancelled);
        }

        let mut cmd = self.build_command(&staged);
        info!("Running installer: {:?}", cmd.as_std());

        let result = cmd.output().await;
        let _ = tokio::fs::remove_file(&staged).await;

        let output = result.map_err(|e| UpdaterError::io(&staged, e))?;
        if output.status.success() {
            info!("Installer finished successfully");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        error!(
            "Installer exited with {:?}: {}",
            output.status.code(),
            stderr.trim()
        );
        Err(UpdaterError::InstallerExit {
            code: output.status.code(),
        })
    }
}

fn expand_template(template: &[String], staged: &Path) -> (OsString, Vec<OsString>) {
    let expand = |part: &String| -> OsString {
        if part == ARTIFACT_PLACEHOLDER {
            staged.as_os_str().to_os_string()
        } else {
            OsString::from(part.replace(ARTIFACT_PLACEHOLDER, &staged.to_string_lossy()))
        }
    };
    let program = expand(&template[0]);
    let args = template[1..].iter().map(expand).collect();
    (program, args)
}

/// `.msi` through msiexec, NSIS `.exe` silently, anything else executed as is.
fn default_invocation(staged: &Path) -> (OsString, Vec<OsString>) {
    let extension = staged
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "msi" => (
            OsString::from("msiexec"),
            vec![
                OsString::from("/i"),
                staged.as_os_str().to_os_string(),
                OsString::from("/qn"),
                OsString::from("/norestart"),
            ],
        ),
        "exe" => (staged.as_os_str().to_os_string(), vec![OsString::from("/S")]),
        _ => (staged.as_os_str().to_os_string(), Vec::new()),
    }
}

#[cfg(target_os = "windows")]
fn configure_platform_spawn(cmd: &mut tokio::process::Command) {
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(target_os = "windows"))]
fn configure_platform_spawn(_cmd: &mut tokio::process::Command) {}

/// Fail early with a disk-space error instead of letting the installer die
/// half-way through.
fn ensure_min_disk_space(path: &Path, minimum_bytes: u64) -> UpdaterResult<()> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let mut best_len = 0usize;
    let mut available = None;
    for disk in disks.list() {
        let mount = disk.mount_point();
        if canonical.starts_with(mount) {
            let len = mount.as_os_str().len();
            if len >= best_len {
                best_len = len;
                available = Some(disk.available_space());
            }
        }
    }
    debug!(
        "Free space near {}: {:?} bytes (need {})",
        canonical.display(),
        available,
        minimum_bytes
    );
    match available {
        Some(bytes) if bytes < minimum_bytes => Err(UpdaterError::InsufficientDisk {
            available: bytes,
            required: minimum_bytes,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classify::{category_of, ErrorCategory};
    use crate::core::downloader::DownloadedArtifact;
    use crate::core::integrity::{ChecksumPolicy, Sha256Digest};

    async fn verified(dir: &Path, name: &str, bytes: &[u8]) -> VerifiedArtifact {
        let path = dir.join(name);
        tokio::fs::write(&path, bytes).await.unwrap();
        let digest = Sha256Digest::of(bytes);
        IntegrityVerifier::new(ChecksumPolicy::Require)
            .verify_download(
                DownloadedArtifact {
                    url: format!("https://example.com/{}", name),
                    path,
                    len: bytes.len() as u64,
                    digest: digest.clone(),
                },
                Some(&digest),
            )
            .await
            .unwrap()
    }

    fn sh_installer(staging: &Path) -> NativeInstaller {
        NativeInstaller::new(staging.to_path_buf())
            .with_command(Some(vec!["sh".into(), ARTIFACT_PLACEHOLDER.into()]))
    }

    #[test]
    fn default_invocation_by_extension() {
        let (program, args) = default_invocation(Path::new("/tmp/installer_1.msi"));
        assert_eq!(program, OsString::from("msiexec"));
        assert_eq!(args[0], OsString::from("/i"));
        assert!(args.contains(&OsString::from("/qn")));

        let (program, args) = default_invocation(Path::new("/tmp/installer_1.exe"));
        assert_eq!(program, OsString::from("/tmp/installer_1.exe"));
        assert_eq!(args, vec![OsString::from("/S")]);
    }

    #[test]
    fn template_expands_artifact_placeholder() {
        let template = vec![
            "pkexec".to_string(),
            "dpkg".to_string(),
            "-i".to_string(),
            "{artifact}".to_string(),
        ];
        let (program, args) = expand_template(&template, Path::new("/tmp/pkg.deb"));
        assert_eq!(program, OsString::from("pkexec"));
        assert_eq!(args.last(), Some(&OsString::from("/tmp/pkg.deb")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_installer_cleans_staging_copy() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        let artifact = verified(dir.path(), "update_ok.sh", b"exit 0\n").await;

        sh_installer(&staging)
            .install(&artifact, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(std::fs::read_dir(&staging).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_installer_is_classified_by_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");

        let generic = verified(dir.path(), "update_fail.sh", b"exit 3\n").await;
        let err = sh_installer(&staging)
            .install(&generic, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, UpdaterError::InstallerExit { code: Some(3) }));
        assert_eq!(category_of(&err), ErrorCategory::Unknown);

        let denied = verified(dir.path(), "update_denied.sh", b"exit 126\n").await;
        let err = sh_installer(&staging)
            .install(&denied, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(category_of(&err), ErrorCategory::Permission);
    }

    #[tokio::test]
    async fn cancelled_before_spawn_never_runs_installer() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        let marker = dir.path().join("ran");
        let script = format!("touch '{}'\n", marker.display());
        let artifact = verified(dir.path(), "update_cancel.sh", script.as_bytes()).await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = sh_installer(&staging)
            .install(&artifact, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, UpdaterError::Cancelled));
        assert!(!marker.exists());
    }

    #[test]
    fn absurd_space_requirement_is_disk_space_error() {
        let dir = tempfile::tempdir().unwrap();
        match ensure_min_disk_space(dir.path(), u64::MAX) {
            Err(err) => assert_eq!(category_of(&err), ErrorCategory::DiskSpace),
            // No disk matched the path (e.g. minimal containers): nothing to enforce.
            Ok(()) => {}
        }
    }
}
