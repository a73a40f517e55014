use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::channel::ProgressSender;
use super::events::{ProgressEvent, ProgressTracker};
use crate::core::error::{UpdaterError, UpdaterResult};
use crate::core::integrity::Sha256Digest;
use crate::core::manifest::ArtifactSelection;

const DOWNLOAD_PREFIX: &str = "update_";

/// A fully received artifact, hashed while it was streamed to disk.
#[derive(Debug, Clone)]
pub struct DownloadedArtifact {
    pub url: String,
    pub path: PathBuf,
    pub len: u64,
    pub digest: Sha256Digest,
}

/// Streams installer artifacts into the updates directory.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    updates_dir: PathBuf,
}

impl Downloader {
    pub fn new(client: Client, updates_dir: PathBuf) -> Self {
        Self { client, updates_dir }
    }

    pub fn updates_dir(&self) -> &Path {
        &self.updates_dir
    }

    /// Download `artifact`, reporting through `progress`.
    ///
    /// Emits `Started`, throttled `Progress` events ending at 100%, then
    /// `Finished`. Any failure removes the partial file.
    pub async fn download(
        &self,
        artifact: &ArtifactSelection,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> UpdaterResult<DownloadedArtifact> {
        tokio::fs::create_dir_all(&self.updates_dir)
            .await
            .map_err(|e| UpdaterError::io(&self.updates_dir, e))?;

        let dest = self.updates_dir.join(format!(
            "{}{}.{}",
            DOWNLOAD_PREFIX,
            Uuid::new_v4(),
            artifact.kind.file_extension()
        ));

        match self.stream_to_file(&artifact.url, &dest, progress, cancel).await {
            Ok((len, digest)) => {
                info!("Download complete: {} bytes -> {}", len, dest.display());
                Ok(DownloadedArtifact {
                    url: artifact.url.clone(),
                    path: dest,
                    len,
                    digest,
                })
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&dest).await;
                Err(e)
            }
        }
    }

    async fn stream_to_file(
        &self,
        url: &str,
        dest: &Path,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> UpdaterResult<(u64, Sha256Digest)> {
        info!("Downloading update from {}", url);
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdaterError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_length = response.content_length();
        info!("Download size: {:?} bytes", content_length);
        progress
            .emit(ProgressEvent::Started { content_length })
            .await;

        let mut tracker = ProgressTracker::new(content_length);
        let mut hasher = Sha256::new();

        // Scope the handle so it is closed before the installer touches the file.
        {
            let mut file = tokio::fs::File::create(dest)
                .await
                .map_err(|e| UpdaterError::io(dest, e))?;

            let mut stream = response.bytes_stream();
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        warn!("Download cancelled after {} bytes", tracker.downloaded());
                        return Err(UpdaterError::Cancelled);
                    }
                    next = stream.next() => next,
                };
                let Some(chunk) = next else { break };
                let chunk = chunk?;

                hasher.update(&chunk);
                file.write_all(&chunk)
                    .await
                    .map_err(|e| UpdaterError::io(dest, e))?;

                if let Some(event) = tracker.advance(chunk.len() as u64) {
                    debug!("Download progress: {:?}", event);
                    progress.emit(event).await;
                }
            }

            file.flush().await.map_err(|e| UpdaterError::io(dest, e))?;
        }

        let downloaded = tracker.downloaded();
        if let Some(expected) = content_length {
            if downloaded != expected {
                warn!(
                    "Downloaded size mismatch: expected {}, got {}",
                    expected, downloaded
                );
                return Err(UpdaterError::IncompleteDownload {
                    expected,
                    actual: downloaded,
                });
            }
        }

        if let Some(event) = tracker.finish() {
            progress.emit(event).await;
        }
        progress.emit(ProgressEvent::Finished).await;

        Ok((downloaded, Sha256Digest::from_hasher(hasher)))
    }

    /// Remove installers left behind by earlier sessions.
    pub async fn cleanup(&self) -> UpdaterResult<usize> {
        cleanup_updates(&self.updates_dir).await
    }
}

pub async fn cleanup_updates(updates_dir: &Path) -> UpdaterResult<usize> {
    if !updates_dir.exists() {
        return Ok(0);
    }

    let mut entries = tokio::fs::read_dir(updates_dir)
        .await
        .map_err(|e| UpdaterError::io(updates_dir, e))?;

    let mut removed = 0;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| UpdaterError::io(updates_dir, e))?
    {
        let path = entry.path();
        let is_ours = path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with(DOWNLOAD_PREFIX))
            .unwrap_or(false);
        if is_ours && path.is_file() {
            info!("Cleaning up old update file: {}", path.display());
            if tokio::fs::remove_file(&path).await.is_ok() {
                removed += 1;
            }
        }
    }
    Ok(removed)
}
