pub mod channel;
pub mod client;
pub mod events;

pub use channel::{subscribe, ProgressSender, ProgressSubscription};
pub use client::{cleanup_updates, DownloadedArtifact, Downloader};
pub use events::{ProgressEvent, ProgressTracker};
