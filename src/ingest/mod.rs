// src/ingest/mod.rs
pub mod source;
pub mod types;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;

use crate::canonical::{CanonicalResolver, ResolveOptions};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::feed::{parse_published, FeedItem};
use crate::fetch::{Fetcher, HttpTransport};
use crate::matcher::{match_vips, ArticleText};
use crate::query::QueryBuilder;
use crate::storage::Storage;
use crate::vip::Vip;

use source::{derive_source_name, guess_lang};
use types::{
    ArticleStatus, IngestLog, NewArticle, PersonMatch, RunOptions, RunResult, Totals, VipStats,
};

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_runs_total", "Completed ingest runs.");
        describe_counter!("ingest_items_seen_total", "Feed items inspected.");
        describe_counter!("ingest_articles_new_total", "Articles stored as new.");
        describe_counter!(
            "ingest_articles_skipped_total",
            "Items skipped because their normalized URL was already stored."
        );
        describe_counter!(
            "ingest_errors_total",
            "Feed fetch/parse failures plus per-item failures."
        );
        describe_counter!(
            "canonical_retries_total",
            "Canonical resolution attempts retried after a transient failure."
        );
        describe_histogram!("ingest_run_duration_ms", "Wall time of one ingest run.");
        describe_gauge!("ingest_last_run_ts", "Unix ts when the last ingest run finished.");
    });
}

static LAST_JOB_MS: AtomicI64 = AtomicI64::new(0);

/// `ingest-<unix millis>`, strictly increasing within the process even when
/// two runs start in the same millisecond.
pub fn next_job_id(now: DateTime<Utc>) -> String {
    let now_ms = now.timestamp_millis();
    let mut assigned = now_ms;
    let _ = LAST_JOB_MS.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
        assigned = now_ms.max(last + 1);
        Some(assigned)
    });
    format!("ingest-{assigned}")
}

/// Trim ids and drop blanks; an empty result means "no filter".
pub fn normalize_vip_ids(ids: Option<Vec<String>>) -> Option<Vec<String>> {
    let cleaned: Vec<String> = ids?
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    (!cleaned.is_empty()).then_some(cleaned)
}

/// An item is stale only if it has a parseable date older than the window.
fn is_stale(item: &FeedItem, window: Option<ChronoDuration>, now: DateTime<Utc>) -> bool {
    let Some(window) = window else {
        return false;
    };
    item.pub_date
        .as_deref()
        .and_then(parse_published)
        .is_some_and(|published| now - published > window)
}

fn recency_window(hours: Option<f64>) -> Option<ChronoDuration> {
    let hours = hours.filter(|h| h.is_finite() && *h > 0.0)?;
    Some(ChronoDuration::milliseconds((hours * 3_600_000.0) as i64))
}

enum ItemOutcome {
    New,
    Skipped,
}

pub struct Ingestor {
    store: Arc<dyn Storage>,
    fetcher: Fetcher,
    resolver: CanonicalResolver,
    queries: QueryBuilder,
    config: Arc<PipelineConfig>,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn Storage>,
        fetcher: Fetcher,
        config: Arc<PipelineConfig>,
    ) -> Result<Self, PipelineError> {
        let queries = QueryBuilder::new(&config.search)?;
        let resolver = CanonicalResolver::new(fetcher.clone(), config.normalizer());
        Ok(Self {
            store,
            fetcher,
            resolver,
            queries,
            config,
        })
    }

    /// Wire a fetcher (with its own limiter) around `transport`.
    pub fn from_config(
        store: Arc<dyn Storage>,
        transport: Arc<dyn HttpTransport>,
        config: Arc<PipelineConfig>,
    ) -> Result<Self, PipelineError> {
        let fetcher = Fetcher::new(transport, config.limiter(), config.fetch.user_agent.clone());
        Self::new(store, fetcher, config)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run(&self, opts: RunOptions) -> Result<RunResult, PipelineError> {
        ensure_metrics_described();
        let t0 = Instant::now();
        let started_at = Utc::now();
        let job_id = next_job_id(started_at);

        let filter = normalize_vip_ids(opts.vip_ids.clone());
        let vips = self.store.active_vips(filter.as_deref()).await?;
        let window = recency_window(opts.recent_hours);
        let resolve_opts = ResolveOptions {
            timeout: self.config.fetch.resolve_timeout(),
            follow_html_canonical: opts.follow_html_canonical,
        };

        tracing::info!(
            target: "ingest",
            %job_id,
            vips = vips.len(),
            dry_run = opts.dry_run,
            "ingest run started"
        );

        let mut totals = Totals::default();
        let mut per_vip: BTreeMap<String, VipStats> = BTreeMap::new();

        for vip in &vips {
            let mut stats = VipStats::default();
            let queries = self.queries.build(vip);
            stats.queries = queries.len() as u64;

            for query in &queries {
                let items = match self
                    .fetcher
                    .fetch_feed(
                        &query.url,
                        self.config.fetch.timeout(),
                        &self.config.search.aggregator_label,
                    )
                    .await
                {
                    Ok(items) => items,
                    Err(e) => {
                        tracing::warn!(target: "ingest", vip = %vip.id, lang = %query.lang, error = %e, "feed fetch failed");
                        counter!("ingest_errors_total").increment(1);
                        stats.error += 1;
                        totals.error += 1;
                        continue;
                    }
                };
                stats.items += items.len() as u64;

                for item in &items {
                    totals.seen += 1;
                    counter!("ingest_items_seen_total").increment(1);

                    if is_stale(item, window, Utc::now()) {
                        continue;
                    }

                    match self
                        .process_item(&job_id, vip, item, &vips, resolve_opts, opts.dry_run)
                        .await
                    {
                        Ok(ItemOutcome::New) => {
                            counter!("ingest_articles_new_total").increment(1);
                            stats.new += 1;
                            totals.new += 1;
                        }
                        Ok(ItemOutcome::Skipped) => {
                            counter!("ingest_articles_skipped_total").increment(1);
                            stats.skip += 1;
                            totals.skip += 1;
                        }
                        Err(e) => {
                            tracing::warn!(target: "ingest", vip = %vip.id, link = %item.link, error = %e, "item failed");
                            counter!("ingest_errors_total").increment(1);
                            stats.error += 1;
                            totals.error += 1;
                        }
                    }
                }
            }

            per_vip.insert(vip.id.clone(), stats);
        }

        let ended_at = Utc::now();
        let result = RunResult {
            job_id,
            started_at,
            ended_at,
            totals,
            per_vip,
        };

        if let Err(e) = self.store.insert_run_log(&IngestLog::from(&result)).await {
            tracing::warn!(target: "ingest", job_id = %result.job_id, error = %e, "failed to persist run log");
        }

        counter!("ingest_runs_total").increment(1);
        histogram!("ingest_run_duration_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        gauge!("ingest_last_run_ts").set(ended_at.timestamp() as f64);

        tracing::info!(
            target: "ingest",
            job_id = %result.job_id,
            new = totals.new,
            skip = totals.skip,
            error = totals.error,
            seen = totals.seen,
            "ingest run finished"
        );
        Ok(result)
    }

    async fn process_item(
        &self,
        job_id: &str,
        vip: &Vip,
        item: &FeedItem,
        all_vips: &[Vip],
        resolve_opts: ResolveOptions,
        dry_run: bool,
    ) -> Result<ItemOutcome, PipelineError> {
        let resolved = self.resolver.resolve(&item.link, resolve_opts).await?;

        if self
            .store
            .find_article_by_url_norm(&resolved.url_norm)
            .await?
            .is_some()
        {
            return Ok(ItemOutcome::Skipped);
        }

        let matched = match_vips(
            all_vips,
            &ArticleText {
                title: Some(&item.title),
                description: item.description.as_deref(),
                content: None,
            },
        );

        let mut vip_ids = vec![vip.id.clone()];
        for id in matched.vip_ids {
            if !vip_ids.contains(&id) {
                vip_ids.push(id);
            }
        }

        // tagged from the headline; the snippet only when there is none
        let lang_probe = match item.title.trim() {
            "" => item.description.as_deref().unwrap_or_default(),
            title => title,
        };
        let article = NewArticle {
            url: resolved.final_url.clone(),
            url_norm: resolved.url_norm.clone(),
            source_name: derive_source_name(
                &resolved.final_url,
                item.source.as_deref(),
                &self.config.publishers,
                &self.config.search.aggregator_label,
            ),
            title: item.title.clone(),
            description: item.description.clone(),
            content: None,
            published_at: item.pub_date.as_deref().and_then(parse_published),
            fetched_at: Utc::now(),
            lang: guess_lang(lang_probe),
            person_match: PersonMatch {
                feed_vip_id: vip.id.clone(),
                vip_ids,
                terms: matched.terms,
            },
            status: ArticleStatus::New,
        };

        if dry_run {
            tracing::debug!(target: "ingest", %job_id, url_norm = %article.url_norm, "dry run, article not stored");
        } else {
            self.store.insert_article(&article).await?;
        }
        Ok(ItemOutcome::New)
    }
}
