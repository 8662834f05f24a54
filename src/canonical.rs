// src/canonical.rs
//! Canonical article URL resolution.
//!
//! One attempt = HEAD probe (failures ignored) → GET following redirects →
//! optional `<link rel="canonical">` substitution → AMP cleanup → normalize.
//! Attempts are retried with exponential backoff unless the input itself is
//! not a valid URL.

use std::time::Duration;

use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use url::Url;

use crate::error::PipelineError;
use crate::fetch::{FollowResult, Fetcher, Method};
use crate::url_norm::UrlNormalizer;

pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_millis(7_000);
pub const HEAD_TIMEOUT_CAP: Duration = Duration::from_secs(4);
pub const MAX_RETRIES: u32 = 2;
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    pub timeout: Duration,
    pub follow_html_canonical: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_RESOLVE_TIMEOUT,
            follow_html_canonical: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalResolution {
    pub input: String,
    pub final_url: String,
    pub url_norm: String,
    /// Starts with `input`; no URL appears twice in a row.
    pub hops: Vec<String>,
}

/// 400ms, 1200ms, 3600ms, ...
pub fn retry_delay(attempt: u32) -> Duration {
    RETRY_BASE_DELAY * 3u32.saturating_pow(attempt)
}

#[derive(Clone)]
pub struct CanonicalResolver {
    fetcher: Fetcher,
    normalizer: UrlNormalizer,
}

impl CanonicalResolver {
    pub fn new(fetcher: Fetcher, normalizer: UrlNormalizer) -> Self {
        Self {
            fetcher,
            normalizer,
        }
    }

    pub async fn resolve(
        &self,
        input: &str,
        opts: ResolveOptions,
    ) -> Result<CanonicalResolution, PipelineError> {
        Url::parse(input).map_err(|e| PipelineError::invalid_url(input, e))?;

        let mut attempt = 0;
        loop {
            match self.attempt(input, opts).await {
                Ok(res) => return Ok(res),
                Err(e) if e.is_retryable() && attempt < MAX_RETRIES => {
                    let delay = retry_delay(attempt);
                    attempt += 1;
                    counter!("canonical_retries_total").increment(1);
                    tracing::debug!(
                        target: "canonical",
                        %input,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying canonical resolution"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(
        &self,
        input: &str,
        opts: ResolveOptions,
    ) -> Result<CanonicalResolution, PipelineError> {
        let head_timeout = opts.timeout.min(HEAD_TIMEOUT_CAP);
        let (probe_url, probe_hops) = match self
            .fetcher
            .follow_redirects(Method::Head, input, head_timeout, vec![input.to_string()])
            .await
        {
            Ok(probe) => (probe.url, probe.hops),
            Err(e) => {
                tracing::debug!(target: "canonical", %input, error = %e, "HEAD probe failed, falling back to GET");
                (input.to_string(), vec![input.to_string()])
            }
        };

        let FollowResult {
            response,
            url: mut final_url,
            mut hops,
        } = self
            .fetcher
            .follow_redirects(Method::Get, &probe_url, opts.timeout, probe_hops)
            .await?;

        let content_type = response.header("content-type").unwrap_or_default();
        if opts.follow_html_canonical && is_html(&content_type) {
            let body = match tokio::time::timeout(opts.timeout, response.text()).await {
                Ok(Ok(body)) => Some(body),
                _ => None,
            };
            let canonical = body
                .as_deref()
                .and_then(extract_canonical_href)
                .and_then(|href| {
                    Url::parse(&final_url)
                        .and_then(|base| base.join(&href))
                        .ok()
                })
                .map(|u| u.to_string());
            if let Some(canonical) = canonical {
                if canonical != final_url {
                    if hops.last() != Some(&canonical) {
                        hops.push(canonical.clone());
                    }
                    final_url = canonical;
                }
            }
        } else {
            drop(response);
        }

        let final_url = strip_amp_artifacts(&final_url);
        let url_norm = self.normalizer.normalize(&final_url)?;

        Ok(CanonicalResolution {
            input: input.to_string(),
            final_url,
            url_norm,
            hops,
        })
    }
}

fn is_html(content_type: &str) -> bool {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\btext/html\b").expect("html regex"));
    RE.is_match(content_type)
}

static LINK_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<link\b[^>]*>").expect("link tag regex"));
static TAG_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)([a-z_:][a-z0-9_:.-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("attr regex")
});

/// First `<link rel="canonical" href="...">` in the document, entity-decoded.
pub fn extract_canonical_href(html: &str) -> Option<String> {
    for tag in LINK_TAG.find_iter(html) {
        let mut rel = None;
        let mut href = None;
        for cap in TAG_ATTR.captures_iter(tag.as_str()) {
            let value = cap
                .get(2)
                .or_else(|| cap.get(3))
                .or_else(|| cap.get(4))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match cap[1].to_ascii_lowercase().as_str() {
                "rel" => rel = Some(value),
                "href" => href = Some(value),
                _ => {}
            }
        }
        let is_canonical = rel.is_some_and(|r| {
            r.split_whitespace()
                .any(|t| t.eq_ignore_ascii_case("canonical"))
        });
        if !is_canonical {
            continue;
        }
        if let Some(href) = href {
            let decoded = html_escape::decode_html_entities(href).trim().to_string();
            if !decoded.is_empty() {
                return Some(decoded);
            }
        }
    }
    None
}

/// Drop AMP path suffixes and `amp` / `output=amp` query parameters.
pub fn strip_amp_artifacts(raw: &str) -> String {
    static AMP_DIR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)/amp/?$").expect("amp dir regex"));
    static AMP_HTML: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)/amp\.html$").expect("amp html regex"));
    static SLASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"/{2,}").expect("slash regex"));

    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };

    let path = AMP_DIR.replace(url.path(), "/").into_owned();
    let path = AMP_HTML.replace(&path, ".html");
    let path = SLASHES.replace_all(&path, "/").into_owned();
    url.set_path(if path.is_empty() { "/" } else { &path });

    if url.query().is_some() {
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let kept: Vec<&(String, String)> = pairs
            .iter()
            .filter(|(k, v)| {
                let k = k.to_ascii_lowercase();
                !(k == "amp" || (k == "output" && v.eq_ignore_ascii_case("amp")))
            })
            .collect();
        if kept.len() != pairs.len() {
            if kept.is_empty() {
                url.set_query(None);
            } else {
                url.query_pairs_mut()
                    .clear()
                    .extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            }
        }
    }

    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_link_any_attribute_order() {
        let html = r#"<html><head>
            <link rel="stylesheet" href="/s.css">
            <link href='https://ex.example/a?x=1&amp;y=2' data-x="1" rel='Canonical'>
            </head></html>"#;
        assert_eq!(
            extract_canonical_href(html).as_deref(),
            Some("https://ex.example/a?x=1&y=2")
        );
        assert_eq!(extract_canonical_href("<p>no links</p>"), None);
    }

    #[test]
    fn amp_cleanup() {
        assert_eq!(
            strip_amp_artifacts("https://www.example.com/story/amp?output=amp"),
            "https://www.example.com/story/"
        );
        assert_eq!(
            strip_amp_artifacts("https://ex.example/news/item/amp.html"),
            "https://ex.example/news/item.html"
        );
        assert_eq!(
            strip_amp_artifacts("https://ex.example//a///b?amp=1&id=7"),
            "https://ex.example/a/b?id=7"
        );
        assert_eq!(strip_amp_artifacts("not a url"), "not a url");
    }

    #[test]
    fn backoff_grows_by_three() {
        assert_eq!(retry_delay(0), Duration::from_millis(400));
        assert_eq!(retry_delay(1), Duration::from_millis(1_200));
    }
}
