// src/storage/mod.rs
//! Persistence seam for the orchestrator.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::ingest::types::{IngestLog, NewArticle};
use crate::vip::Vip;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub type ArticleId = String;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Active VIPs, optionally restricted to `ids`.
    async fn active_vips(&self, ids: Option<&[String]>) -> Result<Vec<Vip>, PipelineError>;

    async fn find_article_by_url_norm(
        &self,
        url_norm: &str,
    ) -> Result<Option<ArticleId>, PipelineError>;

    async fn insert_article(&self, article: &NewArticle) -> Result<ArticleId, PipelineError>;

    async fn insert_run_log(&self, log: &IngestLog) -> Result<(), PipelineError>;
}
