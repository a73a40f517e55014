use std::collections::HashMap;

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::config::ArtifactPreference;
use crate::core::error::{UpdaterError, UpdaterResult};
use crate::core::integrity::Sha256Digest;
use crate::core::version::parse_version;

// ── Wire format ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawManifest {
    version: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    pub_date: Option<String>,
    platforms: Option<HashMap<String, RawPlatform>>,
}

#[derive(Debug, Deserialize)]
struct RawPlatform {
    url: Option<String>,
    #[serde(default)]
    sha256: Option<String>,
    #[serde(default)]
    msi_url: Option<String>,
    #[serde(default)]
    msi_sha256: Option<String>,
}

// ── Validated model ─────────────────────────────────────

/// Release descriptor published by the update server. Immutable once fetched.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UpdateManifest {
    pub version: Version,
    pub release_notes: String,
    pub publish_date: Option<DateTime<Utc>>,
    pub platforms: HashMap<String, ArtifactDescriptor>,
}

/// The installers published for one platform: an EXE-style primary and an
/// optional MSI-style alternate.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ArtifactDescriptor {
    pub primary_url: String,
    pub primary_checksum: Option<Sha256Digest>,
    pub alternate_url: Option<String>,
    pub alternate_checksum: Option<Sha256Digest>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Exe,
    Msi,
    Other,
}

impl ArtifactKind {
    pub fn from_url(url: &str) -> Self {
        let path = url
            .split(['?', '#'])
            .next()
            .unwrap_or(url)
            .to_ascii_lowercase();
        if path.ends_with(".msi") {
            ArtifactKind::Msi
        } else if path.ends_with(".exe") {
            ArtifactKind::Exe
        } else {
            ArtifactKind::Other
        }
    }

    pub fn file_extension(self) -> &'static str {
        match self {
            ArtifactKind::Exe => "exe",
            ArtifactKind::Msi => "msi",
            ArtifactKind::Other => "bin",
        }
    }
}

/// The single artifact chosen for the running platform.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ArtifactSelection {
    pub url: String,
    pub checksum: Option<Sha256Digest>,
    pub kind: ArtifactKind,
}

impl UpdateManifest {
    /// Parse a manifest body. A `null` or blank body means "no update".
    pub fn from_json(body: &str) -> UpdaterResult<Option<Self>> {
        if body.trim().is_empty() {
            return Ok(None);
        }
        let raw: Option<RawManifest> = serde_json::from_str(body)?;
        raw.map(Self::from_raw).transpose()
    }

    fn from_raw(raw: RawManifest) -> UpdaterResult<Self> {
        let version = raw
            .version
            .ok_or_else(|| UpdaterError::ManifestFormat("missing field `version`".into()))?;
        let version = parse_version(&version)?;

        let raw_platforms = raw
            .platforms
            .ok_or_else(|| UpdaterError::ManifestFormat("missing field `platforms`".into()))?;

        let mut platforms = HashMap::with_capacity(raw_platforms.len());
        for (id, entry) in raw_platforms {
            let descriptor = ArtifactDescriptor::from_raw(&id, entry)?;
            platforms.insert(id, descriptor);
        }

        let publish_date = raw.pub_date.as_deref().and_then(|date| {
            match DateTime::parse_from_rfc3339(date) {
                Ok(parsed) => Some(parsed.with_timezone(&Utc)),
                Err(e) => {
                    debug!("Ignoring unparseable pub_date '{}': {}", date, e);
                    None
                }
            }
        });

        Ok(Self {
            version,
            release_notes: raw.notes.unwrap_or_default(),
            publish_date,
            platforms,
        })
    }

    /// Pick exactly one artifact for `platform`.
    pub fn select_artifact(
        &self,
        platform: &str,
        preference: ArtifactPreference,
    ) -> UpdaterResult<ArtifactSelection> {
        let descriptor = self
            .platforms
            .get(platform)
            .ok_or_else(|| UpdaterError::NoArtifact(platform.to_string()))?;
        Ok(descriptor.select(preference))
    }
}

impl ArtifactDescriptor {
    fn from_raw(platform: &str, raw: RawPlatform) -> UpdaterResult<Self> {
        let primary_url = non_empty(raw.url).ok_or_else(|| {
            UpdaterError::ManifestFormat(format!("platform `{}` has no url", platform))
        })?;
        validate_url(&primary_url)?;

        let alternate_url = non_empty(raw.msi_url);
        if let Some(url) = &alternate_url {
            validate_url(url)?;
        }

        Ok(Self {
            primary_url,
            primary_checksum: parse_checksum(platform, raw.sha256)?,
            alternate_url,
            alternate_checksum: parse_checksum(platform, raw.msi_sha256)?,
        })
    }

    pub fn select(&self, preference: ArtifactPreference) -> ArtifactSelection {
        let (url, checksum) = match (preference, &self.alternate_url) {
            (ArtifactPreference::Alternate, Some(url)) => (url.clone(), self.alternate_checksum.clone()),
            _ => (self.primary_url.clone(), self.primary_checksum.clone()),
        };
        let kind = ArtifactKind::from_url(&url);
        ArtifactSelection { url, checksum, kind }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn validate_url(url: &str) -> UpdaterResult<()> {
    reqwest::Url::parse(url)
        .map(|_| ())
        .map_err(|e| UpdaterError::ManifestFormat(format!("invalid url '{}': {}", url, e)))
}

fn parse_checksum(platform: &str, raw: Option<String>) -> UpdaterResult<Option<Sha256Digest>> {
    match non_empty(raw) {
        None => Ok(None),
        Some(hex) => Sha256Digest::parse(&hex).map(Some).map_err(|_| {
            UpdaterError::ManifestFormat(format!("platform `{}` has a malformed sha256", platform))
        }),
    }
}
