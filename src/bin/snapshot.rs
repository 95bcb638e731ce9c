//! One-shot CLI: aggregate all enabled sources, write `unified.json`, and
//! optionally publish the snapshot.
//!
//! Environment:
//!   FEEDS_REGISTRY_PATH   registry file (default config/feeds.toml)
//!   SNAPSHOT_OUT_DIR      where unified.json goes (default ".")
//!   SNAPSHOT_SYNC_MODE    "upsert" | "append" to publish after export
//!   SYNC_CONFIG_PATH / SYNC_*   sync target, see README

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use feed_snapshot::export::write_unified;
use feed_snapshot::sync::{load_sync_target_default, GithubSync, PublishMode};
use feed_snapshot::{aggregate, load_registry_default};
use tracing_subscriber::EnvFilter;

async fn run() -> anyhow::Result<()> {
    let registry = load_registry_default()?;

    // Fatal configuration problems surface before any fetch happens.
    let sync_plan = match std::env::var("SNAPSHOT_SYNC_MODE").ok().filter(|m| !m.trim().is_empty()) {
        Some(raw) => {
            let mode: PublishMode = raw.parse()?;
            let target = load_sync_target_default()?
                .context("SNAPSHOT_SYNC_MODE is set but no sync target is configured")?;
            target.validate_for(mode)?;
            Some((mode, target))
        }
        None => None,
    };

    let fetcher = registry.build_fetcher()?;
    let snapshot = aggregate(&registry.enabled_sources(), &fetcher, &registry.run_options()).await;

    let out_dir = std::env::var("SNAPSHOT_OUT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."));
    let path = write_unified(&snapshot, &out_dir)?;
    println!("unified.json written to {}", path.display());

    if let Some((mode, target)) = sync_plan {
        let outcome = GithubSync::new()?.publish(&target, mode, &snapshot).await?;
        println!(
            "snapshot published to {} ({})",
            outcome.path,
            if outcome.created { "created" } else { "updated" }
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("snapshot failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}
