// src/lib.rs
// Public library surface for the service binary, the CLI, and integration tests.

pub mod api;
pub mod export;
pub mod ingest;
pub mod metrics;
pub mod sync;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::ingest::config::{load_registry_default, load_registry_from, Registry};
pub use crate::ingest::types::{FeedSource, NormalizedItem, Snapshot, SourceFetcher, SourceKind};
pub use crate::ingest::window::TimeWindow;
pub use crate::ingest::{aggregate, aggregate_at, RunOptions};
pub use crate::sync::{GithubSync, PublishMode, PublishOutcome, SyncError, SyncTarget};
