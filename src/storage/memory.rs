// src/storage/memory.rs
//! In-process store for tests and local runs without a database.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ArticleId, Storage};
use crate::error::PipelineError;
use crate::ingest::types::{IngestLog, NewArticle};
use crate::vip::Vip;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCalls {
    pub active_vips: usize,
    pub lookups: usize,
    pub inserts: usize,
    pub run_logs: usize,
}

#[derive(Default)]
pub struct MemoryStore {
    vips: Mutex<Vec<Vip>>,
    articles: Mutex<Vec<(ArticleId, NewArticle)>>,
    logs: Mutex<Vec<IngestLog>>,
    fail_vips: AtomicBool,
    fail_run_logs: AtomicBool,
    active_calls: AtomicUsize,
    lookup_calls: AtomicUsize,
    insert_calls: AtomicUsize,
    log_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vips(vips: Vec<Vip>) -> Self {
        let store = Self::default();
        store.seed_vips(vips);
        store
    }

    /// Insert, or update the VIP with the same name. Returns how many were new.
    pub fn seed_vips(&self, vips: Vec<Vip>) -> usize {
        let mut guard = self.vips.lock().unwrap_or_else(|p| p.into_inner());
        let mut created = 0;
        for vip in vips {
            match guard.iter_mut().find(|v| v.name == vip.name) {
                Some(existing) => {
                    let id = existing.id.clone();
                    *existing = Vip { id, ..vip };
                }
                None => {
                    guard.push(vip);
                    created += 1;
                }
            }
        }
        created
    }

    /// Make `active_vips` fail, as a lost database would.
    pub fn fail_vip_loads(&self, fail: bool) {
        self.fail_vips.store(fail, Ordering::SeqCst);
    }

    pub fn fail_run_logs(&self, fail: bool) {
        self.fail_run_logs.store(fail, Ordering::SeqCst);
    }

    pub fn articles(&self) -> Vec<NewArticle> {
        self.articles
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(|(_, a)| a.clone())
            .collect()
    }

    pub fn run_logs(&self) -> Vec<IngestLog> {
        self.logs.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn calls(&self) -> StoreCalls {
        StoreCalls {
            active_vips: self.active_calls.load(Ordering::SeqCst),
            lookups: self.lookup_calls.load(Ordering::SeqCst),
            inserts: self.insert_calls.load(Ordering::SeqCst),
            run_logs: self.log_calls.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn active_vips(&self, ids: Option<&[String]>) -> Result<Vec<Vip>, PipelineError> {
        self.active_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_vips.load(Ordering::SeqCst) {
            return Err(PipelineError::StorageFailure("vip table unavailable".into()));
        }
        let guard = self.vips.lock().unwrap_or_else(|p| p.into_inner());
        Ok(guard
            .iter()
            .filter(|v| v.is_active)
            .filter(|v| ids.map_or(true, |ids| ids.contains(&v.id)))
            .cloned()
            .collect())
    }

    async fn find_article_by_url_norm(
        &self,
        url_norm: &str,
    ) -> Result<Option<ArticleId>, PipelineError> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        let guard = self.articles.lock().unwrap_or_else(|p| p.into_inner());
        Ok(guard
            .iter()
            .find(|(_, a)| a.url_norm == url_norm)
            .map(|(id, _)| id.clone()))
    }

    async fn insert_article(&self, article: &NewArticle) -> Result<ArticleId, PipelineError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.articles.lock().unwrap_or_else(|p| p.into_inner());
        if guard.iter().any(|(_, a)| a.url_norm == article.url_norm) {
            return Err(PipelineError::StorageFailure(format!(
                "duplicate url_norm {}",
                article.url_norm
            )));
        }
        let id = format!("art-{}", guard.len() + 1);
        guard.push((id.clone(), article.clone()));
        Ok(id)
    }

    async fn insert_run_log(&self, log: &IngestLog) -> Result<(), PipelineError> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_run_logs.load(Ordering::SeqCst) {
            return Err(PipelineError::StorageFailure("log table unavailable".into()));
        }
        self.logs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(log.clone());
        Ok(())
    }
}
