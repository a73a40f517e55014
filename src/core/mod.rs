// ─── Updater Core ───
// Self-update pipeline for a desktop application.
//
// Architecture:
//   core/
//     manifest/   — Release manifest model + fetch with timeout
//     version/    — Running version probe + semver comparison
//     downloader/ — Streamed download, progress protocol, subscriptions
//     integrity/  — SHA-256 digests and verified artifacts
//     installer/  — Native installer invocation with staging copy
//     backend/    — Custom pipeline or host-provided updater
//     session/    — State machine, events, update manager
//     scheduler   — Startup and periodic checks
//     relaunch    — Restart into the installed version
//     state/      — Application state + last-check record

pub mod backend;
pub mod classify;
pub mod config;
pub mod downloader;
pub mod error;
pub mod http;
pub mod installer;
pub mod integrity;
pub mod manifest;
pub mod relaunch;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod version;
