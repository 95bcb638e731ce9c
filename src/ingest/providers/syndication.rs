// src/ingest/providers/syndication.rs
//
// RSS 2.0 / Atom normalizer. The document is parsed whole into a small
// element tree; every `item`/`entry` element becomes at most one item.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{parse_datetime, truncate_title};
use crate::ingest::types::{FeedSource, NormalizedItem};
use crate::ingest::window::TimeWindow;

/// Date fields tried in order; the first non-empty one wins.
const DATE_FIELDS: [&str; 4] = ["pubDate", "published", "updated", "date"];

#[derive(Debug, Default)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
}

#[derive(Debug)]
enum Node {
    Element(Element),
    Text(String),
}

impl Element {
    fn from_start(e: &BytesStart<'_>) -> Result<Self> {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let mut attrs = Vec::new();
        for attr in e.attributes() {
            let attr = attr.with_context(|| format!("bad attribute on <{name}>"))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attrs.push((key, value));
        }
        Ok(Self {
            name,
            attrs,
            children: Vec::new(),
        })
    }

    /// Name without namespace prefix (`dc:creator` → `creator`).
    fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn text_content(&self) -> String {
        let mut out = String::new();
        self.push_text(&mut out);
        out
    }

    fn push_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => e.push_text(out),
            }
        }
    }

    /// First descendant (document order) with the given local name.
    fn find_first(&self, local: &str) -> Option<&Element> {
        for child in &self.children {
            if let Node::Element(e) = child {
                if e.local_name() == local {
                    return Some(e);
                }
                if let Some(found) = e.find_first(local) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Trimmed text of the first descendant named `local`, or "".
    fn child_text(&self, local: &str) -> String {
        self.find_first(local)
            .map(|e| e.text_content().trim().to_string())
            .unwrap_or_default()
    }

    fn collect_entries<'a>(&'a self, out: &mut Vec<&'a Element>) {
        if matches!(self.local_name(), "item" | "entry") {
            out.push(self);
            return;
        }
        for child in &self.children {
            if let Node::Element(e) = child {
                e.collect_entries(out);
            }
        }
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(el)),
        None if root.is_none() => *root = Some(el),
        None => bail!("multiple root elements"),
    }
    Ok(())
}

fn parse_tree(xml: &str) -> Result<Element> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event().context("parsing feed xml")? {
            Event::Start(e) => stack.push(Element::from_start(&e)?),
            Event::Empty(e) => {
                let el = Element::from_start(&e)?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::End(_) => {
                let el = stack.pop().context("unbalanced closing tag")?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    top.children.push(Node::Text(t.unescape()?.into_owned()));
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    top.children.push(Node::Text(text));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        bail!("unexpected end of document inside <{}>", stack[stack.len() - 1].name);
    }
    root.context("document has no root element")
}

/// Replace HTML-only entities that would otherwise make the XML reader fail.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&hellip;", "...")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

/// Normalize an RSS/Atom document. A malformed document is an error as a
/// whole; individual entries are only ever dropped, never fail.
pub fn parse_feed(
    source: &FeedSource,
    body: &str,
    window: &TimeWindow,
    now: DateTime<Utc>,
) -> Result<Vec<NormalizedItem>> {
    let xml_clean = scrub_html_entities_for_xml(body);
    let root = parse_tree(&xml_clean).with_context(|| format!("feed {} is not valid xml", source.id))?;

    let mut entries = Vec::new();
    root.collect_entries(&mut entries);

    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let raw_date = DATE_FIELDS
            .iter()
            .map(|f| entry.child_text(f))
            .find(|s| !s.is_empty())
            .unwrap_or_default();
        let created_at = parse_datetime(&raw_date);
        let raw_title = entry.child_text("title");

        // Nothing to anchor an undated entry on.
        if created_at.is_none() && raw_title.is_empty() {
            continue;
        }
        if !window.contains(Some(created_at.unwrap_or(now)), now) {
            continue;
        }

        let title = if raw_title.is_empty() {
            format!("{} item", source.id)
        } else {
            raw_title
        };
        let text = match entry.child_text("description") {
            d if !d.is_empty() => d,
            _ => entry.child_text("summary"),
        };
        let link = entry
            .find_first("link")
            .map(|l| match l.attr("href") {
                Some(href) if !href.is_empty() => href.to_string(),
                _ => l.text_content().trim().to_string(),
            })
            .unwrap_or_default();
        // Atom nests <name>/<uri> under <author>; RSS puts plain text there.
        let author = match entry.find_first("author") {
            Some(a) => match a.child_text("name") {
                name if !name.is_empty() => name,
                _ => a.text_content().trim().to_string(),
            },
            None => entry.child_text("creator"),
        };

        out.push(NormalizedItem {
            source: source.id.clone(),
            title: truncate_title(&title),
            text,
            link,
            author,
            created_at,
        });
    }

    tracing::debug!(source = %source.id, kept = out.len(), "syndication feed parsed");
    Ok(out)
}
