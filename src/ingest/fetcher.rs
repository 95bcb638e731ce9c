// src/ingest/fetcher.rs
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use reqwest::header::ACCEPT;
use reqwest::Client;
use std::time::Duration;

use crate::ingest::providers::{message_stream, syndication};
use crate::ingest::types::{FeedSource, NormalizedItem, SourceFetcher, SourceKind};
use crate::ingest::window::TimeWindow;

pub const DEFAULT_USER_AGENT: &str = concat!("feed-snapshot/", env!("CARGO_PKG_VERSION"));

/// Fetches sources over HTTP and hands the body to the matching normalizer.
/// Errors are returned as-is; isolating them per source is the caller's job.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    window: TimeWindow,
}

impl HttpFetcher {
    pub fn new(window: TimeWindow, timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("building feed http client")?;
        Ok(Self { client, window })
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    async fn get_body(&self, source: &FeedSource) -> Result<String> {
        let resp = self
            .client
            .get(&source.url)
            .header(ACCEPT, source.kind.accept_header())
            .send()
            .await
            .with_context(|| format!("GET {}", source.url))?;

        let status = resp.status();
        if !status.is_success() {
            bail!("HTTP {} reading {}", status.as_u16(), source.url);
        }
        resp.text()
            .await
            .with_context(|| format!("reading body of {}", source.url))
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, source: &FeedSource, now: DateTime<Utc>) -> Result<Vec<NormalizedItem>> {
        let t0 = std::time::Instant::now();
        let body = self.get_body(source).await?;
        histogram!("feeds_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        match source.kind {
            SourceKind::Syndication => syndication::parse_feed(source, &body, &self.window, now),
            SourceKind::MessageStream => {
                message_stream::parse_messages(source, &body, &self.window, now)
            }
        }
    }
}
