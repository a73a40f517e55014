use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::error::{UpdaterError, UpdaterResult};

const LAST_CHECK_FILE: &str = "last_update_check.json";

#[derive(Debug, Serialize, Deserialize)]
struct LastCheckRecord {
    checked_at: DateTime<Utc>,
    latest_version: Option<String>,
}

/// Remembers when the last successful check ran.
#[derive(Debug, Clone)]
pub struct LastCheckStore {
    path: PathBuf,
}

impl LastCheckStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(LAST_CHECK_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_checked(&self) -> Option<DateTime<Utc>> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<LastCheckRecord>(&raw) {
            Ok(record) => Some(record.checked_at),
            Err(e) => {
                warn!("Ignoring malformed {}: {}", self.path.display(), e);
                None
            }
        }
    }

    pub async fn record(&self, checked_at: DateTime<Utc>, latest_version: Option<String>) -> UpdaterResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| UpdaterError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(&LastCheckRecord {
            checked_at,
            latest_version,
        })?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| UpdaterError::io(&self.path, e))
    }
}
