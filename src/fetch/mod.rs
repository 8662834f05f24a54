// src/fetch/mod.rs
//! Rate-limited HTTP fetch layer.
//!
//! Every request goes through one shared [`RateLimiter`] and is bounded by a
//! per-call timeout. Redirects are followed manually so callers can record
//! the hop chain.

pub mod limiter;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::error::PipelineError;
use crate::feed::{parse_feed, FeedItem};

pub use limiter::RateLimiter;
pub use transport::{
    HttpResponse, HttpTransport, Method, ReqwestTransport, ScriptedResponse, ScriptedTransport,
};

pub const MAX_REDIRECTS: usize = 5;

/// Terminal response of a redirect chain plus the URLs visited on the way.
pub struct FollowResult {
    pub response: Box<dyn HttpResponse>,
    pub url: String,
    pub hops: Vec<String>,
}

#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn HttpTransport>,
    limiter: Arc<RateLimiter>,
    user_agent: String,
}

impl Fetcher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        limiter: Arc<RateLimiter>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            limiter,
            user_agent: user_agent.into(),
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// One request: take a token, then send with `timeout`.
    pub async fn fetch(
        &self,
        method: Method,
        url: &str,
        timeout: Duration,
    ) -> Result<Box<dyn HttpResponse>, PipelineError> {
        self.limiter.acquire().await;
        tracing::debug!(target: "fetch", method = method.as_str(), %url, "request");
        match tokio::time::timeout(timeout, self.transport.send(method, url, &self.user_agent))
            .await
        {
            Ok(res) => res,
            Err(_) => Err(PipelineError::FetchTimeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Follow up to [`MAX_REDIRECTS`] redirects starting at `initial`.
    ///
    /// `seed_hops` carries hops recorded by an earlier probe; when empty the
    /// chain starts with `initial`. A 3xx without `Location` is terminal.
    pub async fn follow_redirects(
        &self,
        method: Method,
        initial: &str,
        timeout: Duration,
        seed_hops: Vec<String>,
    ) -> Result<FollowResult, PipelineError> {
        let mut hops = seed_hops;
        if hops.is_empty() {
            hops.push(initial.to_string());
        } else if !hops.iter().any(|h| h == initial) {
            hops.push(initial.to_string());
        }

        let mut current = initial.to_string();
        for _ in 0..=MAX_REDIRECTS {
            let response = self.fetch(method, &current, timeout).await?;
            let status = response.status();

            if (300..400).contains(&status) {
                let Some(location) = response.header("location") else {
                    return Ok(FollowResult {
                        response,
                        url: current,
                        hops,
                    });
                };
                let next = Url::parse(&current)
                    .and_then(|base| base.join(location.trim()))
                    .map_err(|e| PipelineError::invalid_url(&location, e))?
                    .to_string();
                drop(response);
                if hops.last() != Some(&next) {
                    hops.push(next.clone());
                }
                current = next;
                continue;
            }

            if status >= 400 {
                return Err(PipelineError::HttpFailure {
                    url: current,
                    status,
                    message: format!("{} returned {status}", method.as_str()),
                });
            }

            return Ok(FollowResult {
                response,
                url: current,
                hops,
            });
        }

        Err(PipelineError::TooManyRedirects {
            url: initial.to_string(),
            max: MAX_REDIRECTS,
        })
    }

    /// GET a feed, require 2xx, parse it and label sourceless items with
    /// `aggregator_label`.
    pub async fn fetch_feed(
        &self,
        url: &str,
        timeout: Duration,
        aggregator_label: &str,
    ) -> Result<Vec<FeedItem>, PipelineError> {
        let FollowResult {
            response,
            url: final_url,
            ..
        } = self
            .follow_redirects(Method::Get, url, timeout, Vec::new())
            .await?;

        let status = response.status();
        if !(200..300).contains(&status) {
            return Err(PipelineError::HttpFailure {
                url: final_url,
                status,
                message: "feed fetch did not return 2xx".to_string(),
            });
        }

        let body = match tokio::time::timeout(timeout, response.text()).await {
            Ok(body) => body?,
            Err(_) => {
                return Err(PipelineError::FetchTimeout {
                    url: final_url,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        };

        let mut items = parse_feed(&body, &final_url)?;
        for item in &mut items {
            let missing = item.source.as_deref().map_or(true, |s| s.trim().is_empty());
            if missing {
                item.source = Some(aggregator_label.to_string());
            }
        }
        tracing::debug!(target: "fetch", %url, items = items.len(), "feed fetched");
        Ok(items)
    }
}
