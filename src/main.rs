//! Feed Snapshot Service: binary entrypoint.
//! Boots the Axum HTTP server: loads the feed registry and sync target,
//! wires routes, shared state, and the /metrics endpoint.

use feed_snapshot::api::{self, AppState};
use feed_snapshot::metrics::Metrics;
use feed_snapshot::sync::{load_sync_target_default, GithubSync};
use feed_snapshot::load_registry_default;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - FEEDS_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("FEEDS_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("feed_snapshot=debug,ingest=info,sync=info,warn"));

    // The runtime may already own the global subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let registry = load_registry_default()?;
    let sync_target = load_sync_target_default()?;
    if sync_target.is_none() {
        tracing::info!("no sync target configured; POST /sync will be rejected");
    }

    let metrics = Metrics::init(registry.window_hours)?;
    let github = GithubSync::new().map_err(anyhow::Error::from)?;
    let state = AppState::new(registry, sync_target, github)?;

    let router = api::router(state).merge(metrics.router());

    Ok(router.into())
}
