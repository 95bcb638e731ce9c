// src/sync/config.rs
use anyhow::{anyhow, Context};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{env, fmt, fs, path::Path, str::FromStr};

use super::error::SyncError;

pub const ENV_SYNC_CONFIG_PATH: &str = "SYNC_CONFIG_PATH";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_UPSERT_PATH: &str = "unified.json";
pub const DEFAULT_PATH_BASE: &str = "snapshots";

static SEGMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").unwrap());

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

/// How a snapshot lands in the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublishMode {
    /// Overwrite one well-known object, passing its current hash.
    Upsert,
    /// Create a new timestamped object on every publish.
    #[serde(alias = "append-timestamped")]
    Append,
}

impl FromStr for PublishMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upsert" => Ok(PublishMode::Upsert),
            "append" | "append-timestamped" => Ok(PublishMode::Append),
            other => Err(anyhow!("unknown publish mode: {other}")),
        }
    }
}

/// Where snapshots are published. The token is never serialized or logged.
#[derive(Clone, Serialize, Deserialize)]
pub struct SyncTarget {
    #[serde(default)]
    pub owner: String,
    /// Repository name, or a combined `owner/repo`.
    #[serde(default)]
    pub repository: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Fixed object path for upsert mode.
    #[serde(default)]
    pub path: Option<String>,
    /// Directory for append mode.
    #[serde(default)]
    pub path_base: Option<String>,
    /// "ENV" means: read from SYNC_TOKEN / GITHUB_TOKEN.
    #[serde(default, skip_serializing)]
    pub token: String,
}

impl Default for SyncTarget {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repository: String::new(),
            branch: default_branch(),
            path: None,
            path_base: None,
            token: String::new(),
        }
    }
}

impl fmt::Debug for SyncTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncTarget")
            .field("owner", &self.owner)
            .field("repository", &self.repository)
            .field("branch", &self.branch)
            .field("path", &self.path)
            .field("path_base", &self.path_base)
            .field("token_len", &self.token.len())
            .finish()
    }
}

/// Validated repository coordinates, ready for network calls.
#[derive(Clone)]
pub struct RepoCoords {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub(crate) token: String,
}

impl fmt::Debug for RepoCoords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repo, self.branch)
    }
}

fn env_token() -> Option<String> {
    env::var("SYNC_TOKEN")
        .or_else(|_| env::var("GITHUB_TOKEN"))
        .ok()
        .filter(|t| !t.trim().is_empty())
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn valid_segment(s: &str) -> bool {
    SEGMENT_RE.is_match(s) && s != "." && s != ".."
}

/// Trim slashes and reject empty or `..` segments.
fn clean_path(raw: &str, what: &str, allow_empty: bool) -> Result<String, SyncError> {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() && !allow_empty {
        return Err(SyncError::Validation(format!("{what} is empty")));
    }
    if trimmed
        .split('/')
        .any(|seg| seg == ".." || (seg.is_empty() && !trimmed.is_empty()))
    {
        return Err(SyncError::Validation(format!("{what} {raw:?} is malformed")));
    }
    Ok(trimmed.to_string())
}

impl SyncTarget {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading sync target from {}", path.display()))?;
        let is_json = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let mut cfg: SyncTarget = if is_json {
            serde_json::from_str(&data)?
        } else {
            toml::from_str(&data)?
        };

        // Resolve token if "ENV"
        if cfg.token.trim().eq_ignore_ascii_case("env") {
            cfg.token = env_token().ok_or_else(|| anyhow!("Missing SYNC_TOKEN/GITHUB_TOKEN env var"))?;
        }
        if cfg.branch.trim().is_empty() {
            cfg.branch = default_branch();
        }
        Ok(cfg)
    }

    /// Build from SYNC_* env vars. `None` when no repository is configured.
    pub fn from_env() -> Option<Self> {
        let repository = non_blank(env::var("SYNC_REPO").ok())?;
        Some(Self {
            owner: non_blank(env::var("SYNC_OWNER").ok()).unwrap_or_default(),
            repository,
            branch: non_blank(env::var("SYNC_BRANCH").ok()).unwrap_or_else(default_branch),
            path: non_blank(env::var("SYNC_PATH").ok()),
            path_base: non_blank(env::var("SYNC_PATH_BASE").ok()),
            token: env_token().unwrap_or_default(),
        })
    }

    /// Resolve owner/repository into exactly one `owner/repo` pair and check
    /// branch and token. No network access.
    pub fn resolve(&self) -> Result<RepoCoords, SyncError> {
        let owner_field = self.owner.trim();
        let repo_field = self.repository.trim();
        if repo_field.is_empty() {
            return Err(SyncError::Validation("repository is required".into()));
        }

        let (owner, repo) = match repo_field.split_once('/') {
            Some((o, r)) => {
                if r.contains('/') {
                    return Err(SyncError::Validation(format!(
                        "repository {repo_field:?} is not a single owner/repo pair"
                    )));
                }
                if !owner_field.is_empty() && owner_field != o {
                    return Err(SyncError::Validation(format!(
                        "owner {owner_field:?} conflicts with repository {repo_field:?}"
                    )));
                }
                (o, r)
            }
            None => (owner_field, repo_field),
        };

        if owner.is_empty() {
            return Err(SyncError::Validation("owner is required".into()));
        }
        if !valid_segment(owner) || !valid_segment(repo) {
            return Err(SyncError::Validation(format!(
                "{owner}/{repo} is not a valid repository"
            )));
        }

        let branch = self.branch.trim();
        if branch.is_empty() {
            return Err(SyncError::Validation("branch is required".into()));
        }

        let token = self.token.trim();
        if token.is_empty() || token.eq_ignore_ascii_case("env") {
            return Err(SyncError::Validation("token is required for writes".into()));
        }

        Ok(RepoCoords {
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: branch.to_string(),
            token: token.to_string(),
        })
    }

    /// Everything a publish in `mode` needs, checked up front.
    pub fn validate_for(&self, mode: PublishMode) -> Result<RepoCoords, SyncError> {
        let coords = self.resolve()?;
        match mode {
            PublishMode::Upsert => self.upsert_path().map(|_| ())?,
            PublishMode::Append => self.path_base().map(|_| ())?,
        }
        Ok(coords)
    }

    /// Object path used by upsert mode.
    pub fn upsert_path(&self) -> Result<String, SyncError> {
        clean_path(
            self.path.as_deref().unwrap_or(DEFAULT_UPSERT_PATH),
            "path",
            false,
        )
    }

    /// Directory used by append mode ("" means repository root).
    pub fn path_base(&self) -> Result<String, SyncError> {
        clean_path(
            self.path_base.as_deref().unwrap_or(DEFAULT_PATH_BASE),
            "path base",
            true,
        )
    }
}

/// Load the sync target: $SYNC_CONFIG_PATH file first, then SYNC_* env vars.
pub fn load_sync_target_default() -> anyhow::Result<Option<SyncTarget>> {
    if let Ok(p) = env::var(ENV_SYNC_CONFIG_PATH) {
        return SyncTarget::load_from_file(&p).map(Some);
    }
    Ok(SyncTarget::from_env())
}
