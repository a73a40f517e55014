pub mod probe;

pub use probe::{is_newer, parse_version, PackageVersion, VersionProbe};
