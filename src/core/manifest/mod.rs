pub mod client;
pub mod model;

pub use client::{ManifestClient, ManifestOutcome};
pub use model::{ArtifactDescriptor, ArtifactKind, ArtifactSelection, UpdateManifest};
