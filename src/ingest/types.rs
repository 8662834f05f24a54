// src/ingest/types.rs
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_RECENT_HOURS: f64 = 24.0;

#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Restrict the run to these VIP ids. Blank ids are ignored.
    pub vip_ids: Option<Vec<String>>,
    /// Items older than this are skipped silently; `None` or `<= 0` disables the window.
    pub recent_hours: Option<f64>,
    pub follow_html_canonical: bool,
    pub dry_run: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            vip_ids: None,
            recent_hours: Some(DEFAULT_RECENT_HOURS),
            follow_html_canonical: true,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub new: u64,
    pub skip: u64,
    pub error: u64,
    pub seen: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VipStats {
    pub queries: u64,
    pub items: u64,
    pub new: u64,
    pub skip: u64,
    pub error: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub job_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub totals: Totals,
    pub per_vip: BTreeMap<String, VipStats>,
}

/// Persisted once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestLog {
    pub job_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub totals: Totals,
    pub per_vip: BTreeMap<String, VipStats>,
}

impl From<&RunResult> for IngestLog {
    fn from(r: &RunResult) -> Self {
        Self {
            job_id: r.job_id.clone(),
            started_at: r.started_at,
            ended_at: r.ended_at,
            totals: r.totals,
            per_vip: r.per_vip.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonMatch {
    /// VIP whose query surfaced the item.
    pub feed_vip_id: String,
    /// `feed_vip_id` first, then matched VIPs by rank, unique.
    pub vip_ids: Vec<String>,
    pub terms: Vec<String>,
}

/// Script-based language tag of a stored article; `Und` when neither
/// Japanese nor Latin script is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleLang {
    Ja,
    En,
    Und,
}

impl ArticleLang {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleLang::Ja => "ja",
            ArticleLang::En => "en",
            ArticleLang::Und => "und",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ArticleStatus {
    New,
}

impl ArticleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::New => "NEW",
        }
    }
}

/// Article row as the orchestrator writes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewArticle {
    pub url: String,
    pub url_norm: String,
    pub source_name: String,
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
    pub lang: ArticleLang,
    pub person_match: PersonMatch,
    pub status: ArticleStatus,
}
