// src/feed.rs
//! RSS 2.0 / Atom parsing into a uniform item list.
//!
//! The payload is streamed through `quick_xml::Reader` into a small element
//! tree; the shape (`rss > channel > item` or `feed > entry`) is then walked
//! by local name, so namespace prefixes do not matter. Any other root yields
//! no items.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;
use url::Url;

use crate::error::PipelineError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedItem {
    pub title: String,
    /// Absolute when the feed link could be resolved against the request URL.
    pub link: String,
    pub description: Option<String>,
    /// Source-reported, free-form; see [`parse_published`].
    pub pub_date: Option<String>,
    /// RSS `guid` / Atom `id`.
    pub guid: Option<String>,
    pub source: Option<String>,
}

/* ----------------------------
Element tree
---------------------------- */

#[derive(Debug, Default)]
struct XmlElement {
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<XmlElement>,
}

impl XmlElement {
    fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn as_field(&self) -> FieldValue<'_> {
        if self.attrs.is_empty() && self.children.is_empty() {
            FieldValue::Plain(&self.text)
        } else {
            FieldValue::Element(self)
        }
    }

    /// Text of the first child called `name`, if non-empty.
    fn field(&self, name: &str) -> Option<String> {
        self.child(name)
            .map(|c| field_text(c.as_field()))
            .filter(|s| !s.is_empty())
    }
}

/// A text-bearing field either arrives as bare text or as an element that
/// carries attributes or nested nodes.
enum FieldValue<'a> {
    Plain(&'a str),
    Element(&'a XmlElement),
}

fn field_text(value: FieldValue<'_>) -> String {
    match value {
        FieldValue::Plain(s) => s.trim().to_string(),
        FieldValue::Element(el) => {
            let own = el.text.trim();
            if !own.is_empty() {
                return own.to_string();
            }
            ["text", "value"]
                .iter()
                .find_map(|k| {
                    el.child(k)
                        .map(|c| c.text.trim().to_string())
                        .or_else(|| el.attr(k).map(|v| v.trim().to_string()))
                        .filter(|s| !s.is_empty())
                })
                .unwrap_or_default()
        }
    }
}

fn local(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn element_from(start: &BytesStart<'_>) -> XmlElement {
    let attrs = start
        .attributes()
        .flatten()
        .map(|a| {
            let key = local(a.key.local_name().as_ref());
            let value = a
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&a.value).into_owned());
            (key, value)
        })
        .collect();
    XmlElement {
        name: local(start.local_name().as_ref()),
        attrs,
        ..Default::default()
    }
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, el: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(el),
        None => {
            if root.is_none() {
                *root = Some(el);
            }
        }
    }
}

fn parse_tree(xml: &str) -> Result<Option<XmlElement>, PipelineError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => stack.push(element_from(&e)),
            Event::Empty(e) => {
                let el = element_from(&e);
                attach(&mut stack, &mut root, el);
            }
            Event::End(_) => {
                if let Some(el) = stack.pop() {
                    attach(&mut stack, &mut root, el);
                }
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    let text = t
                        .unescape()
                        .map(|c| c.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                    top.text.push_str(&text);
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(PipelineError::ParseFailure(format!(
            "unexpected end of document inside <{}>",
            open.name
        )));
    }
    Ok(root)
}

/* ----------------------------
Feed shapes
---------------------------- */

fn absolutize(link: &str, base: &str) -> String {
    if link.is_empty() {
        return String::new();
    }
    Url::parse(base)
        .and_then(|b| b.join(link))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| link.to_string())
}

fn rss_items(rss: &XmlElement, request_url: &str) -> Vec<FeedItem> {
    let Some(channel) = rss.child("channel") else {
        return Vec::new();
    };
    let channel_title = channel.field("title");

    channel
        .children_named("item")
        .map(|item| {
            let link = item.field("link").unwrap_or_default();
            FeedItem {
                title: item.field("title").unwrap_or_default(),
                link: absolutize(&link, request_url),
                description: item.field("description"),
                // `dc:date` shows up when `pubDate` is absent
                pub_date: item.field("pubDate").or_else(|| item.field("date")),
                guid: item.field("guid"),
                source: item.field("source").or_else(|| channel_title.clone()),
            }
        })
        .collect()
}

fn atom_link(entry: &XmlElement) -> String {
    let links: Vec<&XmlElement> = entry.children_named("link").collect();
    let chosen = links
        .iter()
        .find(|l| l.attr("rel") == Some("alternate"))
        .or_else(|| links.first());
    let Some(link) = chosen else {
        return String::new();
    };
    link.attr("href")
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| field_text(link.as_field()))
}

fn atom_items(feed: &XmlElement, request_url: &str) -> Vec<FeedItem> {
    let feed_title = feed.field("title");

    feed.children_named("entry")
        .map(|entry| FeedItem {
            title: entry.field("title").unwrap_or_default(),
            link: absolutize(&atom_link(entry), request_url),
            description: entry.field("summary").or_else(|| entry.field("content")),
            pub_date: entry.field("updated").or_else(|| entry.field("published")),
            guid: entry.field("id"),
            source: feed_title.clone(),
        })
        .collect()
}

/// Parse an RSS 2.0 or Atom payload. Relative links resolve against
/// `request_url`.
pub fn parse_feed(xml: &str, request_url: &str) -> Result<Vec<FeedItem>, PipelineError> {
    let Some(root) = parse_tree(xml)? else {
        return Ok(Vec::new());
    };
    let items = match root.name.as_str() {
        "rss" => rss_items(&root, request_url),
        "feed" => atom_items(&root, request_url),
        other => {
            tracing::debug!(target: "fetch", root = other, "unrecognised feed root");
            Vec::new()
        }
    };
    Ok(items)
}

fn to_chrono(dt: OffsetDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond())
}

/// RFC 2822 (RSS) or RFC 3339 (Atom) publish date, as UTC.
pub fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc2822) {
        return to_chrono(dt);
    }
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc3339) {
        return to_chrono(dt);
    }
    // named zones like "EST" only parse with chrono
    DateTime::parse_from_rfc2822(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
