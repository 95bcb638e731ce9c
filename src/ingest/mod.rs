// src/ingest/mod.rs
pub mod config;
pub mod fetcher;
pub mod providers;
pub mod types;
pub mod window;

use crate::ingest::types::{FeedSource, NormalizedItem, Snapshot, SourceFetcher};
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use std::time::Duration;

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 20;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("feeds_items_total", "Items kept across all sources.");
        describe_counter!(
            "feeds_source_errors_total",
            "Sources that failed to fetch or parse."
        );
        describe_histogram!("feeds_fetch_ms", "Source fetch time in milliseconds.");
        describe_gauge!(
            "feeds_snapshot_last_run_ts",
            "Unix ts when the last snapshot was assembled."
        );
    });
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Max sources fetched at once.
    pub concurrency: usize,
    /// Upper bound for a single fetch; hitting it counts as a failure.
    pub fetch_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }
}

/// Placeholder stored for a source whose fetch failed.
pub fn error_item(source: &FeedSource, err: &anyhow::Error, now: DateTime<Utc>) -> NormalizedItem {
    NormalizedItem {
        source: source.id.clone(),
        title: providers::truncate_title(&format!("[ERROR] {}", source.display_label())),
        text: format!("{err:#}"),
        link: source.url.clone(),
        author: String::new(),
        created_at: Some(now),
    }
}

async fn fetch_isolated(
    source: &FeedSource,
    fetcher: &dyn SourceFetcher,
    opts: &RunOptions,
    now: DateTime<Utc>,
) -> Vec<NormalizedItem> {
    let outcome = match tokio::time::timeout(opts.fetch_timeout, fetcher.fetch(source, now)).await {
        Ok(res) => res,
        Err(_) => Err(anyhow!(
            "fetch of {} timed out after {}s",
            source.url,
            opts.fetch_timeout.as_secs()
        )),
    };

    match outcome {
        Ok(items) => {
            counter!("feeds_items_total").increment(items.len() as u64);
            tracing::debug!(source = %source.id, items = items.len(), "source fetched");
            items
        }
        Err(e) => {
            tracing::warn!(error = ?e, source = %source.id, "source error");
            counter!("feeds_source_errors_total").increment(1);
            vec![error_item(source, &e, now)]
        }
    }
}

/// Fetch every enabled source and assemble the snapshot, judging the time
/// window against `now`. A failing source contributes a single error item,
/// so every enabled source gets exactly one entry. Keys follow registry order.
///
/// Source ids must be unique; [`Registry`](config::Registry) loading rejects
/// duplicates, and a duplicate here would collapse two entries into one key.
pub async fn aggregate_at(
    sources: &[FeedSource],
    fetcher: &dyn SourceFetcher,
    opts: &RunOptions,
    now: DateTime<Utc>,
) -> Snapshot {
    ensure_metrics_described();

    let enabled: Vec<FeedSource> = sources.iter().filter(|s| s.enabled).cloned().collect();
    let total = enabled.len();
    debug_assert!(
        enabled.iter().map(|s| s.id.as_str()).collect::<HashSet<_>>().len() == total,
        "duplicate source ids passed to aggregate_at"
    );

    // `buffered` keeps at most `concurrency` fetches in flight and yields
    // results in input order.
    let results: Vec<(String, Vec<NormalizedItem>)> = stream::iter(enabled)
        .map(|source| async move {
            let items = fetch_isolated(&source, fetcher, opts, now).await;
            (source.id, items)
        })
        .buffered(opts.concurrency.max(1))
        .collect()
        .await;

    let map: IndexMap<String, Vec<NormalizedItem>> = results.into_iter().collect();

    gauge!("feeds_snapshot_last_run_ts").set(now.timestamp() as f64);
    let snapshot = Snapshot {
        generated_at: now,
        sources: map,
    };
    tracing::info!(
        target: "ingest",
        sources = total,
        items = snapshot.item_count(),
        "snapshot assembled"
    );
    snapshot
}

/// [`aggregate_at`] with the current instant.
pub async fn aggregate(
    sources: &[FeedSource],
    fetcher: &dyn SourceFetcher,
    opts: &RunOptions,
) -> Snapshot {
    aggregate_at(sources, fetcher, opts, Utc::now()).await
}
