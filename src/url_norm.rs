// src/url_norm.rs
//! URL normalization used as the article dedup key.
//!
//! Two URLs that differ only in tracking noise, host case, default port,
//! fragment or parameter order normalize to the same string.

use std::collections::HashSet;

use url::Url;

use crate::error::PipelineError;

/// Query keys dropped during normalization (compared lower-cased).
pub const DEFAULT_TRACKING_KEYS: &[&str] = &[
    "gclid",
    "fbclid",
    "igshid",
    "si",
    "spm",
    "mc_cid",
    "mc_eid",
    "yclid",
    "sc_channel",
];

/// Query key prefixes dropped during normalization.
pub const DEFAULT_TRACKING_PREFIXES: &[&str] = &["utm_"];

#[derive(Debug, Clone)]
pub struct UrlNormalizer {
    keys: HashSet<String>,
    prefixes: Vec<String>,
}

impl Default for UrlNormalizer {
    fn default() -> Self {
        Self::new(
            DEFAULT_TRACKING_KEYS.iter().map(|s| s.to_string()),
            DEFAULT_TRACKING_PREFIXES.iter().map(|s| s.to_string()),
        )
    }
}

impl UrlNormalizer {
    pub fn new<K, P>(keys: K, prefixes: P) -> Self
    where
        K: IntoIterator<Item = String>,
        P: IntoIterator<Item = String>,
    {
        Self {
            keys: keys.into_iter().map(|k| k.to_ascii_lowercase()).collect(),
            prefixes: prefixes
                .into_iter()
                .map(|p| p.to_ascii_lowercase())
                .collect(),
        }
    }

    fn is_tracking_key(&self, key: &str) -> bool {
        let lower = key.to_lowercase();
        self.keys.contains(&lower) || self.prefixes.iter().any(|p| lower.starts_with(p))
    }

    pub fn normalize(&self, input: &str) -> Result<String, PipelineError> {
        // The url crate already lower-cases scheme and host, converts the host
        // to punycode and drops default ports.
        let mut url = Url::parse(input.trim()).map_err(|e| PipelineError::invalid_url(input, e))?;
        if url.cannot_be_a_base() {
            return Err(PipelineError::invalid_url(input, "not a hierarchical URL"));
        }

        let path = normalize_path(url.path());
        url.set_path(&path);
        url.set_fragment(None);

        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, v)| !v.trim().is_empty() && !self.is_tracking_key(k))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        params.sort();

        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params.iter());
        }

        Ok(url.to_string())
    }
}

/// Normalize with the default tracking block-list.
pub fn normalize_url(input: &str) -> Result<String, PipelineError> {
    UrlNormalizer::default().normalize(input)
}

/// True if `url_norm` is already among the known normalized URLs.
pub fn is_likely_duplicate<'a, I>(url_norm: &str, existing: I) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    existing.into_iter().any(|e| e == url_norm)
}

/// Lexical path resolution: `.`/`..` segments and duplicate slashes collapse,
/// a single trailing slash is dropped, root stays `/`.
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        return "/".to_string();
    }
    format!("/{}", segments.join("/"))
}
