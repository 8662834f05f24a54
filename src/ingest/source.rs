// src/ingest/source.rs
//! Publisher label and coarse language for a resolved article.

use std::collections::BTreeMap;

use once_cell::sync::OnceCell;
use regex::Regex;
use url::Url;

use crate::config::pipeline::strip_www;
use super::types::ArticleLang;

/// Label precedence: feed-provided label, publisher table by host, bare host,
/// then `aggregator_label`.
pub fn derive_source_name(
    final_url: &str,
    fallback: Option<&str>,
    publishers: &BTreeMap<String, String>,
    aggregator_label: &str,
) -> String {
    if let Some(label) = fallback.map(str::trim).filter(|s| !s.is_empty()) {
        return label.to_string();
    }
    let host = Url::parse(final_url)
        .ok()
        .and_then(|u| u.host_str().map(strip_www))
        .filter(|h| !h.is_empty());
    match host {
        Some(h) => publishers.get(&h).cloned().unwrap_or(h),
        None => aggregator_label.to_string(),
    }
}

/// `ja` for any kana or CJK ideograph, `en` for any ASCII letter, else `und`.
pub fn guess_lang(text: &str) -> ArticleLang {
    static JA: OnceCell<Regex> = OnceCell::new();
    static EN: OnceCell<Regex> = OnceCell::new();
    let ja = JA.get_or_init(|| {
        Regex::new(r"[\p{Hiragana}\p{Katakana}\p{Han}]").expect("ja script regex")
    });
    let en = EN.get_or_init(|| Regex::new(r"[A-Za-z]").expect("latin regex"));

    if ja.is_match(text) {
        ArticleLang::Ja
    } else if en.is_match(text) {
        ArticleLang::En
    } else {
        ArticleLang::Und
    }
}
