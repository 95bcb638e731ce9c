// src/ingest/providers/mod.rs
pub mod message_stream;
pub mod syndication;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::ingest::types::MAX_TITLE_CHARS;

/// Parse a feed timestamp. Tries RFC 3339, RFC 2822, then a few ISO-like
/// shapes (read as UTC). Returns `None` when nothing matches.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(dt) = parse_rfc2822(s) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn parse_rfc2822(s: &str) -> Option<DateTime<Utc>> {
    let dt = OffsetDateTime::parse(s, &Rfc2822).ok()?;
    DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond())
}

/// Cut `s` to at most `MAX_TITLE_CHARS` characters (not bytes).
pub fn truncate_title(s: &str) -> String {
    s.chars().take(MAX_TITLE_CHARS).collect()
}
