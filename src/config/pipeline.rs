// src/config/pipeline.rs
//! Pipeline configuration loaded from TOML.
//!
//! Lookup order:
//! 1) `$PIPELINE_CONFIG_PATH` (must exist when set)
//! 2) `config/pipeline.toml`
//! 3) built-in defaults
//!
//! Every section is optional; missing keys fall back to the defaults below.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::fetch::RateLimiter;
use crate::url_norm::{UrlNormalizer, DEFAULT_TRACKING_KEYS, DEFAULT_TRACKING_PREFIXES};
use crate::vip::VipSeed;

pub const DEFAULT_PIPELINE_CONFIG_PATH: &str = "config/pipeline.toml";
pub const ENV_PIPELINE_CONFIG_PATH: &str = "PIPELINE_CONFIG_PATH";

pub const DEFAULT_USER_AGENT: &str = "vip-news-ingest/0.1 (+https://example.org)";
pub const DEFAULT_SEARCH_BASE: &str = "https://news.google.com/rss/search";
pub const DEFAULT_AGGREGATOR_LABEL: &str = "Google News";

const DEFAULT_KEYWORDS: &[&str] = &[
    "speech",
    "remarks",
    "statement",
    "comment",
    "発言",
    "講演",
    "声明",
    "会見",
];

const DEFAULT_PUBLISHERS: &[(&str, &str)] = &[
    ("reuters.com", "Reuters"),
    ("jp.reuters.com", "Reuters"),
    ("bloomberg.com", "Bloomberg"),
    ("nhk.or.jp", "NHK"),
    ("www3.nhk.or.jp", "NHK"),
    ("nikkei.com", "Nikkei"),
    ("asia.nikkei.com", "Nikkei"),
    ("ft.com", "Financial Times"),
    ("wsj.com", "Wall Street Journal"),
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub rate_limit: RateLimitCfg,
    pub fetch: FetchCfg,
    pub search: SearchCfg,
    pub tracking: TrackingCfg,
    /// Host (lower-case, `www.` stripped) → publisher display name.
    pub publishers: BTreeMap<String, String>,
    pub vips: Vec<VipSeed>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitCfg::default(),
            fetch: FetchCfg::default(),
            search: SearchCfg::default(),
            tracking: TrackingCfg::default(),
            publishers: DEFAULT_PUBLISHERS
                .iter()
                .map(|(h, n)| (h.to_string(), n.to_string()))
                .collect(),
            vips: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RateLimitCfg {
    pub rps: u32,
    pub burst: u32,
}

impl Default for RateLimitCfg {
    fn default() -> Self {
        Self { rps: 2, burst: 4 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchCfg {
    /// Feed fetch timeout.
    pub timeout_ms: u64,
    /// Default canonical resolution timeout.
    pub resolve_timeout_ms: u64,
    pub user_agent: String,
}

impl Default for FetchCfg {
    fn default() -> Self {
        Self {
            timeout_ms: 8_000,
            resolve_timeout_ms: 7_000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetchCfg {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchCfg {
    pub base_url: String,
    /// Source label used when neither the feed nor the URL yields one.
    pub aggregator_label: String,
    pub keywords: Vec<String>,
    pub locales: LocalesCfg,
}

impl Default for SearchCfg {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SEARCH_BASE.to_string(),
            aggregator_label: DEFAULT_AGGREGATOR_LABEL.to_string(),
            keywords: DEFAULT_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            locales: LocalesCfg::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalesCfg {
    pub ja: LocaleCfg,
    pub en: LocaleCfg,
}

impl Default for LocalesCfg {
    fn default() -> Self {
        Self {
            ja: LocaleCfg::new("ja", "JP", "JP:ja"),
            en: LocaleCfg::new("en-US", "US", "US:en"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LocaleCfg {
    pub hl: String,
    pub gl: String,
    pub ceid: String,
}

impl LocaleCfg {
    pub fn new(hl: &str, gl: &str, ceid: &str) -> Self {
        Self {
            hl: hl.to_string(),
            gl: gl.to_string(),
            ceid: ceid.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackingCfg {
    pub keys: Vec<String>,
    pub prefixes: Vec<String>,
}

impl Default for TrackingCfg {
    fn default() -> Self {
        Self {
            keys: DEFAULT_TRACKING_KEYS.iter().map(|s| s.to_string()).collect(),
            prefixes: DEFAULT_TRACKING_PREFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl PipelineConfig {
    /// Load using env var + fallbacks (see module docs).
    pub fn load() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PIPELINE_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!(
                "{ENV_PIPELINE_CONFIG_PATH} points to non-existent path {}",
                pb.display()
            ));
        }
        let default_path = PathBuf::from(DEFAULT_PIPELINE_CONFIG_PATH);
        if default_path.exists() {
            return Self::load_from(&default_path);
        }
        tracing::info!(target: "config", "no pipeline config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing pipeline config {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: PipelineConfig = toml::from_str(s)?;
        cfg.sanitize();
        Ok(cfg)
    }

    fn sanitize(&mut self) {
        self.rate_limit.rps = self.rate_limit.rps.max(1);
        self.rate_limit.burst = self.rate_limit.burst.max(1);
        self.fetch.timeout_ms = self.fetch.timeout_ms.max(1);
        self.fetch.resolve_timeout_ms = self.fetch.resolve_timeout_ms.max(1);
        if self.fetch.user_agent.trim().is_empty() {
            self.fetch.user_agent = DEFAULT_USER_AGENT.to_string();
        }
        if self.search.aggregator_label.trim().is_empty() {
            self.search.aggregator_label = DEFAULT_AGGREGATOR_LABEL.to_string();
        }
        self.publishers = std::mem::take(&mut self.publishers)
            .into_iter()
            .map(|(host, name)| (strip_www(&host), name))
            .collect();
        self.vips.retain(|v| !v.name.trim().is_empty());
    }

    pub fn normalizer(&self) -> UrlNormalizer {
        UrlNormalizer::new(
            self.tracking.keys.iter().cloned(),
            self.tracking.prefixes.iter().cloned(),
        )
    }

    pub fn limiter(&self) -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(self.rate_limit.rps, self.rate_limit.burst))
    }
}

/// Lower-case a host and drop a leading `www.`.
pub(crate) fn strip_www(host: &str) -> String {
    let lower = host.trim().to_lowercase();
    match lower.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => lower,
    }
}
