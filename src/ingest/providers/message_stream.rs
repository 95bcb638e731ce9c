// src/ingest/providers/message_stream.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{parse_datetime, truncate_title};
use crate::ingest::types::{FeedSource, NormalizedItem};
use crate::ingest::window::TimeWindow;

/// Title prefix used when the source carries no label.
const DEFAULT_TITLE_PREFIX: &str = "Message";

fn str_field<'a>(v: &'a Value, key: &str) -> &'a str {
    v.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn id_string(v: Option<&Value>) -> String {
    match v {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Normalize a JSON message stream (`{"messages": [...]}`). Invalid JSON is
/// an error; a missing or non-array `messages` key yields no items.
pub fn parse_messages(
    source: &FeedSource,
    body: &str,
    window: &TimeWindow,
    now: DateTime<Utc>,
) -> Result<Vec<NormalizedItem>> {
    let data: Value = serde_json::from_str(body)
        .with_context(|| format!("message stream {} is not valid json", source.id))?;

    let messages = data
        .get("messages")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let prefix = if source.label.trim().is_empty() {
        DEFAULT_TITLE_PREFIX
    } else {
        source.label.trim()
    };

    let mut out = Vec::with_capacity(messages.len());
    for m in messages {
        let created_at = parse_datetime(str_field(m, "created_at"));
        if !window.contains(Some(created_at.unwrap_or(now)), now) {
            continue;
        }

        let author = m
            .get("user")
            .map(|u| str_field(u, "username"))
            .unwrap_or_default();

        out.push(NormalizedItem {
            source: source.id.clone(),
            title: truncate_title(&format!("{prefix} #{}", id_string(m.get("id")))),
            text: str_field(m, "body").trim().to_string(),
            link: str_field(m, "url").to_string(),
            author: author.to_string(),
            created_at,
        });
    }

    tracing::debug!(source = %source.id, kept = out.len(), "message stream parsed");
    Ok(out)
}
