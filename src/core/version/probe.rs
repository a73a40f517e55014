// ─── Version Probe ───
// Reports the version of the application that is currently installed.

use std::cmp::Ordering;

use semver::Version;

use crate::core::error::{UpdaterError, UpdaterResult};

/// Source of the installed application version.
///
/// Treated as always available: implementations resolve the version once at
/// construction and never fail afterwards.
pub trait VersionProbe: Send + Sync {
    fn current(&self) -> Version;
}

/// A version fixed at construction (build metadata, host package info, tests).
#[derive(Debug, Clone)]
pub struct PackageVersion {
    version: Version,
}

impl PackageVersion {
    pub fn new(version: Version) -> Self {
        Self { version }
    }

    pub fn parse(raw: &str) -> UpdaterResult<Self> {
        parse_version(raw).map(Self::new)
    }

    /// Version of the crate being built.
    pub fn from_build() -> Self {
        // CARGO_PKG_VERSION is always valid semver.
        Self::new(Version::parse(env!("CARGO_PKG_VERSION")).unwrap_or_else(|_| Version::new(0, 0, 0)))
    }
}

impl VersionProbe for PackageVersion {
    fn current(&self) -> Version {
        self.version.clone()
    }
}

/// Parse a release version, tolerating a leading `v` as used in release tags.
pub fn parse_version(raw: &str) -> UpdaterResult<Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(trimmed)
        .map_err(|e| UpdaterError::ManifestFormat(format!("invalid version '{}': {}", raw, e)))
}

/// True when `remote` is strictly newer than `current`. Build metadata is
/// ignored.
pub fn is_newer(remote: &Version, current: &Version) -> bool {
    remote.cmp_precedence(current) == Ordering::Greater
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_compares_major_minor_patch() {
        let v = |s| Version::parse(s).unwrap();
        assert!(is_newer(&v("1.2.0"), &v("1.0.0")));
        assert!(is_newer(&v("2.0.0"), &v("1.9.9")));
        assert!(is_newer(&v("1.0.1"), &v("1.0.0")));
        assert!(!is_newer(&v("1.0.0"), &v("1.0.0")));
        assert!(!is_newer(&v("0.9.0"), &v("1.0.0")));
        assert!(!is_newer(&v("1.0.0+build.2"), &v("1.0.0+build.1")));
    }

    #[test]
    fn parse_tolerates_tag_prefix() {
        assert_eq!(parse_version("v1.2.3").unwrap(), Version::new(1, 2, 3));
        assert_eq!(parse_version(" 0.3.1 ").unwrap(), Version::new(0, 3, 1));
        assert!(parse_version("latest").is_err());
    }

    #[test]
    fn package_version_reports_fixed_value() {
        let probe = PackageVersion::parse("1.0.0").unwrap();
        assert_eq!(probe.current(), Version::new(1, 0, 0));
        assert!(!PackageVersion::from_build().current().to_string().is_empty());
    }
}
