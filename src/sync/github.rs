//! GitHub contents API client.
//!
//! Upsert reads the object's current blob sha and sends it back with the
//! write, so the store rejects the write if someone changed the object in
//! between. Append writes a fresh timestamped path and never needs a sha.
//! Neither mode retries; a conflict is returned to the caller.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use metrics::counter;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use super::config::{PublishMode, RepoCoords, SyncTarget};
use super::error::SyncError;
use crate::ingest::fetcher::DEFAULT_USER_AGENT;
use crate::ingest::types::{iso_millis, Snapshot};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Result of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    pub mode: PublishMode,
    pub path: String,
    /// True when the store created a new object (HTTP 201).
    pub created: bool,
    /// Blob sha that was replaced, for upserts over an existing object.
    pub previous_sha: Option<String>,
    pub content_sha: Option<String>,
    pub commit_sha: Option<String>,
}

#[derive(Serialize)]
struct PutContents<'a> {
    message: &'a str,
    content: &'a str,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Deserialize)]
struct ShaRef {
    #[serde(default)]
    sha: Option<String>,
}

#[derive(Deserialize, Default)]
struct PutResponse {
    #[serde(default)]
    content: Option<ShaRef>,
    #[serde(default)]
    commit: Option<ShaRef>,
}

/// Base64 of the pretty-printed snapshot document.
pub fn encode_snapshot(snapshot: &Snapshot) -> Result<String, SyncError> {
    Ok(STANDARD.encode(snapshot.to_json_pretty()?))
}

/// `<base>/unified-<instant>.json`, with `:` and `.` in the instant replaced
/// so the name is filesystem-safe.
pub fn timestamped_path(base: &str, now: DateTime<Utc>) -> String {
    let stamp = iso_millis::format(&now).replace([':', '.'], "-");
    let file = format!("unified-{stamp}.json");
    let base = base.trim_matches('/');
    if base.is_empty() {
        file
    } else {
        format!("{base}/{file}")
    }
}

/// Pull GitHub's `{"message": ...}` out of an error body, else the raw text.
async fn error_message(resp: Response) -> String {
    let text = resp.text().await.unwrap_or_default();
    serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| text.chars().take(300).collect())
}

fn is_stale_sha(status: StatusCode, message: &str) -> bool {
    status == StatusCode::CONFLICT
        || (status == StatusCode::UNPROCESSABLE_ENTITY && message.to_ascii_lowercase().contains("sha"))
}

#[derive(Clone)]
pub struct GithubSync {
    client: Client,
    api_base: String,
}

impl GithubSync {
    pub fn new() -> Result<Self, SyncError> {
        Self::with_timeout(Duration::from_secs(20))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, SyncError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }

    /// Point at a different API root (GitHub Enterprise, test servers).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn contents_url(&self, coords: &RepoCoords, path: &str) -> Result<Url, SyncError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| SyncError::Validation(format!("invalid api base {}: {e}", self.api_base)))?;
        {
            let mut segs = url
                .path_segments_mut()
                .map_err(|_| SyncError::Validation(format!("api base {} cannot hold a path", self.api_base)))?;
            segs.pop_if_empty()
                .extend(["repos", coords.owner.as_str(), coords.repo.as_str(), "contents"])
                .extend(path.split('/'));
        }
        Ok(url)
    }

    fn headers(&self, coords: &RepoCoords) -> Result<HeaderMap, SyncError> {
        let mut h = HeaderMap::new();
        h.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        h.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        h.insert("x-github-api-version", HeaderValue::from_static("2022-11-28"));
        let auth = format!("Bearer {}", coords.token);
        h.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| SyncError::Validation("token contains invalid characters".into()))?,
        );
        Ok(h)
    }

    /// Current blob sha at `path` on the target branch; `None` if absent.
    pub async fn lookup_sha(&self, coords: &RepoCoords, path: &str) -> Result<Option<String>, SyncError> {
        let resp = self
            .client
            .get(self.contents_url(coords, path)?)
            .headers(self.headers(coords)?)
            .query(&[("ref", coords.branch.as_str())])
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => {
                let body: serde_json::Value = resp.json().await?;
                match body.get("sha").and_then(|s| s.as_str()) {
                    Some(sha) => Ok(Some(sha.to_string())),
                    None => Err(SyncError::Lookup {
                        path: path.to_string(),
                        status: 200,
                        message: "response has no sha (is the path a directory?)".into(),
                    }),
                }
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(SyncError::Lookup {
                path: path.to_string(),
                status: status.as_u16(),
                message: error_message(resp).await,
            }),
        }
    }

    /// Write `content_b64` to `path`. `sha` is sent only when present.
    pub async fn put_contents(
        &self,
        coords: &RepoCoords,
        path: &str,
        content_b64: &str,
        message: &str,
        sha: Option<&str>,
    ) -> Result<(bool, Option<String>, Option<String>), SyncError> {
        let body = PutContents {
            message,
            content: content_b64,
            branch: &coords.branch,
            sha,
        };
        let resp = self
            .client
            .put(self.contents_url(coords, path)?)
            .headers(self.headers(coords)?)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            let created = status == StatusCode::CREATED;
            let parsed: PutResponse = resp.json().await.unwrap_or_default();
            return Ok((
                created,
                parsed.content.and_then(|c| c.sha),
                parsed.commit.and_then(|c| c.sha),
            ));
        }

        let message = error_message(resp).await;
        let path = path.to_string();
        let status_code = status.as_u16();
        if is_stale_sha(status, &message) {
            Err(SyncError::Conflict {
                path,
                status: status_code,
                message,
            })
        } else {
            Err(SyncError::Remote {
                path,
                status: status_code,
                message,
            })
        }
    }

    /// Validate `target`, then publish `snapshot` in the given mode.
    pub async fn publish(
        &self,
        target: &SyncTarget,
        mode: PublishMode,
        snapshot: &Snapshot,
    ) -> Result<PublishOutcome, SyncError> {
        self.publish_at(target, mode, snapshot, Utc::now()).await
    }

    /// [`publish`](Self::publish) with an explicit instant for the commit
    /// message and timestamped path.
    pub async fn publish_at(
        &self,
        target: &SyncTarget,
        mode: PublishMode,
        snapshot: &Snapshot,
        now: DateTime<Utc>,
    ) -> Result<PublishOutcome, SyncError> {
        let res = self.publish_inner(target, mode, snapshot, now).await;
        match &res {
            Ok(out) => {
                counter!("sync_publish_total").increment(1);
                info!(target: "sync", path = %out.path, created = out.created, ?mode, "snapshot published");
            }
            Err(e) => {
                counter!("sync_errors_total").increment(1);
                warn!(target: "sync", error = %e, retryable = e.is_retryable(), ?mode, "snapshot publish failed");
            }
        }
        res
    }

    async fn publish_inner(
        &self,
        target: &SyncTarget,
        mode: PublishMode,
        snapshot: &Snapshot,
        now: DateTime<Utc>,
    ) -> Result<PublishOutcome, SyncError> {
        let coords = target.validate_for(mode)?;
        let path = match mode {
            PublishMode::Upsert => target.upsert_path()?,
            PublishMode::Append => timestamped_path(&target.path_base()?, now),
        };
        let content = encode_snapshot(snapshot)?;
        let stamp = iso_millis::format(&now);

        let (message, previous_sha) = match mode {
            PublishMode::Upsert => (
                format!("Update unified snapshot {stamp}"),
                self.lookup_sha(&coords, &path).await?,
            ),
            PublishMode::Append => (format!("Add unified snapshot {stamp}"), None),
        };

        let (created, content_sha, commit_sha) = self
            .put_contents(&coords, &path, &content, &message, previous_sha.as_deref())
            .await?;

        Ok(PublishOutcome {
            mode,
            path,
            created,
            previous_sha,
            content_sha,
            commit_sha,
        })
    }
}
