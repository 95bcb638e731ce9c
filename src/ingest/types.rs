// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use indexmap::IndexMap;

/// Titles are cut to this many characters after normalization.
pub const MAX_TITLE_CHARS: usize = 240;

/// Kind of origin a source points at. Selects the fetch/parse path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// RSS 2.0 or Atom document.
    #[serde(alias = "rss", alias = "atom")]
    Syndication,
    /// JSON payload carrying a `messages` array (Stocktwits-style streams).
    #[serde(alias = "stocktwits", alias = "json")]
    MessageStream,
}

impl SourceKind {
    /// Accept header sent when fetching this kind of source.
    pub fn accept_header(self) -> &'static str {
        match self {
            SourceKind::Syndication => {
                "application/rss+xml, application/xml;q=0.9, text/xml;q=0.8, */*;q=0.7"
            }
            SourceKind::MessageStream => "application/json, */*;q=0.8",
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// One registry entry. Read-only for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub id: String,
    #[serde(default)]
    pub label: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl FeedSource {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        url: impl Into<String>,
        kind: SourceKind,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            url: url.into(),
            kind,
            enabled: true,
        }
    }

    /// Label for display, falling back to the id when the label is blank.
    pub fn display_label(&self) -> &str {
        if self.label.trim().is_empty() {
            &self.id
        } else {
            &self.label
        }
    }
}

/// Common item shape every source is normalized into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedItem {
    pub source: String,
    pub title: String,
    pub text: String,
    pub link: String,
    pub author: String,
    #[serde(default, with = "iso_millis::option")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Merged output of one aggregation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(with = "iso_millis")]
    pub generated_at: DateTime<Utc>,
    /// Source id to items, in registry order.
    pub sources: IndexMap<String, Vec<NormalizedItem>>,
}

impl Snapshot {
    pub fn item_count(&self) -> usize {
        self.sources.values().map(Vec::len).sum()
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Capability every source kind is reached through: fetch one source and
/// normalize it, judging the time window against `now`.
#[async_trait::async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &FeedSource, now: DateTime<Utc>) -> Result<Vec<NormalizedItem>>;
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format(dt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            dt: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match dt {
                Some(dt) => s.serialize_str(&super::format(dt)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw: Option<String> = Option::deserialize(d)?;
            raw.map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
        }
    }
}
