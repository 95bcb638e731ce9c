// src/sync/mod.rs
pub mod config;
pub mod error;
pub mod github;

pub use config::{load_sync_target_default, PublishMode, RepoCoords, SyncTarget};
pub use error::SyncError;
pub use github::{encode_snapshot, timestamped_path, GithubSync, PublishOutcome};
