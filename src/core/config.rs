use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::integrity::ChecksumPolicy;

pub const APP_DIR_NAME: &str = "app-updater";
const SETTINGS_FILE: &str = "updater_settings.json";

pub const DEFAULT_ENDPOINT: &str =
    "https://github.com/iborntowin/Cession-App/releases/latest/download/latest.json";

/// Which backend drives the download/install half of a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Manifest + streamed download + SHA-256 + native installer, all in-process.
    Custom,
    /// Host-provided updater (e.g. the Tauri updater plugin).
    PlatformPlugin,
}

/// Which of the two installers a platform entry may carry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactPreference {
    /// The `url`/`sha256` pair (NSIS .exe on Windows).
    Primary,
    /// The `msi_url`/`msi_sha256` pair, falling back to primary when absent.
    Alternate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
    pub endpoint: String,
    /// Overrides the platform id derived from the running target.
    pub platform: Option<String>,
    pub backend: BackendKind,
    pub artifact: ArtifactPreference,
    pub checksum_policy: ChecksumPolicy,
    pub check_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub initial_check_delay_secs: u64,
    pub check_interval_secs: u64,
    pub relaunch_grace_ms: u64,
    pub auto_check: bool,
    pub updates_dir: Option<PathBuf>,
    /// Custom installer invocation; `{artifact}` is replaced by the staged
    /// installer path. `None` picks msiexec / silent NSIS / direct execution
    /// from the file extension.
    pub installer_command: Option<Vec<String>>,
    pub user_agent: String,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            platform: None,
            backend: BackendKind::Custom,
            artifact: ArtifactPreference::Primary,
            checksum_policy: ChecksumPolicy::Require,
            check_timeout_secs: 30,
            download_timeout_secs: 600,
            initial_check_delay_secs: 30,
            check_interval_secs: 24 * 60 * 60,
            relaunch_grace_ms: 1000,
            auto_check: true,
            updates_dir: None,
            installer_command: None,
            user_agent: crate::core::http::APP_USER_AGENT.to_string(),
        }
    }
}

impl UpdaterConfig {
    /// Load settings from `<data_dir>/updater_settings.json`, falling back to
    /// defaults when the file is missing or unreadable.
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(SETTINGS_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&raw) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring malformed {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self, data_dir: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(data_dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(data_dir.join(SETTINGS_FILE), json)
    }

    pub fn platform_id(&self) -> String {
        self.platform.clone().unwrap_or_else(current_platform_id)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn initial_check_delay(&self) -> Duration {
        Duration::from_secs(self.initial_check_delay_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn relaunch_grace(&self) -> Duration {
        Duration::from_millis(self.relaunch_grace_ms)
    }

    pub fn updates_dir(&self) -> PathBuf {
        self.updates_dir.clone().unwrap_or_else(default_updates_dir)
    }
}

/// Manifest platform key for the running target, e.g. `windows-x86_64`.
pub fn current_platform_id() -> String {
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    format!("{}-{}", os, std::env::consts::ARCH)
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

fn default_updates_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
        .join("updates")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_update_schedule() {
        let config = UpdaterConfig::default();
        assert_eq!(config.check_timeout(), Duration::from_secs(30));
        assert_eq!(config.initial_check_delay(), Duration::from_secs(30));
        assert_eq!(config.check_interval(), Duration::from_secs(86_400));
        assert_eq!(config.relaunch_grace(), Duration::from_secs(1));
        assert_eq!(config.checksum_policy, ChecksumPolicy::Require);
        assert_eq!(config.backend, BackendKind::Custom);
    }

    #[test]
    fn partial_settings_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{ "backend": "platform_plugin", "platform": "windows-x86_64" }"#,
        )
        .unwrap();

        let config = UpdaterConfig::load(dir.path());
        assert_eq!(config.backend, BackendKind::PlatformPlugin);
        assert_eq!(config.platform_id(), "windows-x86_64");
        assert_eq!(config.check_timeout_secs, 30);
    }

    #[test]
    fn save_then_load_preserves_fields() {
        let dir = tempfile::tempdir().unwrap();
        let config = UpdaterConfig {
            artifact: ArtifactPreference::Alternate,
            relaunch_grace_ms: 250,
            ..UpdaterConfig::default()
        };
        config.save(dir.path()).unwrap();

        let loaded = UpdaterConfig::load(dir.path());
        assert_eq!(loaded.artifact, ArtifactPreference::Alternate);
        assert_eq!(loaded.relaunch_grace_ms, 250);
    }

    #[test]
    fn malformed_settings_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "{ not json").unwrap();
        let config = UpdaterConfig::load(dir.path());
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn platform_id_uses_manifest_naming() {
        let id = current_platform_id();
        assert!(!id.starts_with("macos"));
        assert!(id.contains('-'));
    }
}
