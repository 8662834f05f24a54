// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod error;
pub mod vip;

// Pipeline stages, leaf-first
pub mod url_norm;
pub mod feed;
pub mod fetch;
pub mod canonical;
pub mod query;
pub mod matcher;
pub mod ingest;

pub mod storage;
pub mod config;

// HTTP surface
pub mod api;
pub mod metrics;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::canonical::{CanonicalResolution, CanonicalResolver, ResolveOptions};
pub use crate::config::PipelineConfig;
pub use crate::error::PipelineError;
pub use crate::feed::{parse_feed, FeedItem};
pub use crate::ingest::types::{RunOptions, RunResult};
pub use crate::ingest::Ingestor;
pub use crate::matcher::{match_vips, ArticleText, MatchResult};
pub use crate::query::{build_queries, Lang, Query};
pub use crate::storage::{MemoryStore, SqliteStore, Storage};
pub use crate::url_norm::normalize_url;
pub use crate::vip::Vip;
