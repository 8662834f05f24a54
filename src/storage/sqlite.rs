// src/storage/sqlite.rs
//! SQLite-backed store. `url_norm` carries a UNIQUE constraint, so the dedup
//! gate holds even if two runs race.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, QueryBuilder, Sqlite};
use tracing::info;

use super::{ArticleId, Storage};
use crate::error::PipelineError;
use crate::ingest::types::{IngestLog, NewArticle};
use crate::vip::Vip;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS vips (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    aliases TEXT NOT NULL DEFAULT '[]',
    title TEXT,
    org TEXT,
    query_extra TEXT,
    is_active BOOLEAN NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    url_norm TEXT NOT NULL UNIQUE,
    source_name TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    content TEXT,
    published_at TEXT,
    fetched_at TEXT NOT NULL,
    lang TEXT NOT NULL,
    person_match TEXT NOT NULL,
    status TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_articles_published_at ON articles (published_at);
CREATE TABLE IF NOT EXISTS ingest_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT NOT NULL,
    level TEXT NOT NULL DEFAULT 'info',
    started_at TEXT NOT NULL,
    ended_at TEXT NOT NULL,
    stats TEXT NOT NULL
);
"#;

#[derive(Debug, sqlx::FromRow)]
struct VipRow {
    id: String,
    name: String,
    aliases: String,
    title: Option<String>,
    org: Option<String>,
    query_extra: Option<String>,
    is_active: bool,
}

impl VipRow {
    fn into_vip(self) -> Vip {
        // a corrupt alias column degrades to "no aliases"
        let aliases = serde_json::from_str(&self.aliases).unwrap_or_default();
        Vip {
            id: self.id,
            name: self.name,
            aliases,
            title: self.title,
            org: self.org,
            query_extra: self.query_extra,
            is_active: self.is_active,
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, PipelineError> {
    serde_json::to_string(value).map_err(|e| PipelineError::StorageFailure(e.to_string()))
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Connect (creating the file if needed) and make sure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self, PipelineError> {
        info!(target: "storage", %database_url, "opening sqlite store");
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .synchronous(SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    /// Private in-memory database. A single connection, since every sqlite
    /// memory connection is its own database.
    pub async fn in_memory() -> Result<Self, PipelineError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn initialize_schema(&self) -> Result<(), PipelineError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Insert each VIP, or refresh the row that already has its name.
    pub async fn seed_vips(&self, vips: &[Vip]) -> Result<usize, PipelineError> {
        for vip in vips {
            sqlx::query(
                r#"
                INSERT INTO vips (id, name, aliases, title, org, query_extra, is_active)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(name) DO UPDATE SET
                    aliases = excluded.aliases,
                    title = excluded.title,
                    org = excluded.org,
                    query_extra = excluded.query_extra,
                    is_active = excluded.is_active
                "#,
            )
            .bind(&vip.id)
            .bind(&vip.name)
            .bind(to_json(&vip.aliases)?)
            .bind(&vip.title)
            .bind(&vip.org)
            .bind(&vip.query_extra)
            .bind(vip.is_active)
            .execute(&self.pool)
            .await?;
        }
        info!(target: "storage", count = vips.len(), "vips seeded");
        Ok(vips.len())
    }

    pub async fn article_count(&self) -> Result<i64, PipelineError> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn run_log_count(&self) -> Result<i64, PipelineError> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM ingest_logs")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[async_trait]
impl Storage for SqliteStore {
    async fn active_vips(&self, ids: Option<&[String]>) -> Result<Vec<Vip>, PipelineError> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, name, aliases, title, org, query_extra, is_active FROM vips WHERE is_active = 1",
        );
        if let Some(ids) = ids.filter(|ids| !ids.is_empty()) {
            qb.push(" AND id IN (");
            let mut list = qb.separated(", ");
            for id in ids {
                list.push_bind(id.clone());
            }
            list.push_unseparated(")");
        }
        qb.push(" ORDER BY rowid");

        let rows = qb.build_query_as::<VipRow>().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(VipRow::into_vip).collect())
    }

    async fn find_article_by_url_norm(
        &self,
        url_norm: &str,
    ) -> Result<Option<ArticleId>, PipelineError> {
        let id = sqlx::query_scalar::<_, i64>("SELECT id FROM articles WHERE url_norm = ?")
            .bind(url_norm)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id.map(|id| id.to_string()))
    }

    async fn insert_article(&self, article: &NewArticle) -> Result<ArticleId, PipelineError> {
        let (id,) = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO articles (url, url_norm, source_name, title, description, content,
                                  published_at, fetched_at, lang, person_match, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            RETURNING id
            "#,
        )
        .bind(&article.url)
        .bind(&article.url_norm)
        .bind(&article.source_name)
        .bind(&article.title)
        .bind(&article.description)
        .bind(&article.content)
        .bind(article.published_at.map(|d| d.to_rfc3339()))
        .bind(article.fetched_at.to_rfc3339())
        .bind(article.lang.as_str())
        .bind(to_json(&article.person_match)?)
        .bind(article.status.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(id.to_string())
    }

    async fn insert_run_log(&self, log: &IngestLog) -> Result<(), PipelineError> {
        #[derive(serde::Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Stats<'a> {
            totals: &'a crate::ingest::types::Totals,
            per_vip: &'a std::collections::BTreeMap<String, crate::ingest::types::VipStats>,
        }

        sqlx::query(
            "INSERT INTO ingest_logs (job_id, level, started_at, ended_at, stats) VALUES (?1, 'info', ?2, ?3, ?4)",
        )
        .bind(&log.job_id)
        .bind(log.started_at.to_rfc3339())
        .bind(log.ended_at.to_rfc3339())
        .bind(to_json(&Stats {
            totals: &log.totals,
            per_vip: &log.per_vip,
        })?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
