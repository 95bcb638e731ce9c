// src/ingest/config.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::fetcher::{HttpFetcher, DEFAULT_USER_AGENT};
use crate::ingest::types::FeedSource;
use crate::ingest::window::{TimeWindow, DEFAULT_WINDOW_HOURS, MAX_WINDOW_HOURS};
use crate::ingest::{RunOptions, DEFAULT_CONCURRENCY, DEFAULT_FETCH_TIMEOUT_SECS};

pub const ENV_REGISTRY_PATH: &str = "FEEDS_REGISTRY_PATH";

fn default_window_hours() -> u32 {
    DEFAULT_WINDOW_HOURS
}
fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}
fn default_fetch_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

/// Loaded feed registry plus the run options that travel with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub sources: Vec<FeedSource>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            concurrency: default_concurrency(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            user_agent: default_user_agent(),
            sources: Vec::new(),
        }
    }
}

impl Registry {
    pub fn with_sources(sources: Vec<FeedSource>) -> Self {
        Self {
            sources,
            ..Self::default()
        }
    }

    /// Entries the pipeline actually fetches, in registry order.
    pub fn enabled_sources(&self) -> Vec<FeedSource> {
        self.sources.iter().filter(|s| s.enabled).cloned().collect()
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow::with_hours(self.window_hours)
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            concurrency: self.concurrency,
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
        }
    }

    pub fn build_fetcher(&self) -> Result<HttpFetcher> {
        HttpFetcher::new(
            self.window(),
            Duration::from_secs(self.fetch_timeout_secs),
            &self.user_agent,
        )
    }

    /// Clamp options into usable ranges and trim identifiers.
    fn sanitize(mut self) -> Self {
        self.window_hours = self.window_hours.clamp(1, MAX_WINDOW_HOURS);
        self.concurrency = self.concurrency.max(1);
        self.fetch_timeout_secs = self.fetch_timeout_secs.max(1);
        if self.user_agent.trim().is_empty() {
            self.user_agent = default_user_agent();
        }
        for s in &mut self.sources {
            s.id = s.id.trim().to_string();
            s.url = s.url.trim().to_string();
        }
        self
    }

    /// Shape checks only: ids and urls present, ids unique.
    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (idx, s) in self.sources.iter().enumerate() {
            if s.id.is_empty() {
                bail!("source #{idx} has an empty id");
            }
            if s.url.is_empty() {
                bail!("source {} has an empty url", s.id);
            }
            if !seen.insert(s.id.as_str()) {
                bail!("duplicate source id {}", s.id);
            }
        }
        Ok(())
    }
}

/// Load the registry from an explicit path. Supports TOML or JSON formats.
pub fn load_registry_from(path: &Path) -> Result<Registry> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading feed registry from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_registry(&content, ext.as_str())
        .with_context(|| format!("parsing feed registry {}", path.display()))
}

/// Load the registry using env var + fallbacks:
/// 1) $FEEDS_REGISTRY_PATH
/// 2) config/feeds.toml
/// 3) config/feeds.json
pub fn load_registry_default() -> Result<Registry> {
    if let Ok(p) = std::env::var(ENV_REGISTRY_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_registry_from(&pb);
        } else {
            return Err(anyhow!("FEEDS_REGISTRY_PATH points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/feeds.toml");
    if toml_p.exists() {
        return load_registry_from(&toml_p);
    }
    let json_p = PathBuf::from("config/feeds.json");
    if json_p.exists() {
        return load_registry_from(&json_p);
    }
    tracing::warn!("no feed registry found; snapshot will be empty");
    Ok(Registry::default())
}

fn parse_registry(s: &str, hint_ext: &str) -> Result<Registry> {
    let parsed = if hint_ext == "json" {
        parse_json(s)
    } else {
        // TOML first, JSON as a fallback for extension-less files.
        parse_toml(s).or_else(|toml_err| parse_json(s).map_err(|_| toml_err))
    }?;
    let reg = parsed.sanitize();
    reg.validate()?;
    Ok(reg)
}

fn parse_toml(s: &str) -> Result<Registry> {
    Ok(toml::from_str(s)?)
}

fn parse_json(s: &str) -> Result<Registry> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum JsonRegistry {
        Full(Registry),
        List(Vec<FeedSource>),
    }
    Ok(match serde_json::from_str(s)? {
        JsonRegistry::Full(r) => r,
        JsonRegistry::List(sources) => Registry::with_sources(sources),
    })
}
