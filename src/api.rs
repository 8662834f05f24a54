// src/api.rs
//! HTTP surface: health probe and the authenticated ingest trigger.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tower_http::cors::CorsLayer;

use crate::error::PipelineError;
use crate::ingest::types::{RunOptions, RunResult};
use crate::ingest::{normalize_vip_ids, Ingestor};

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";
pub const ENV_API_KEY: &str = "API_KEY";

#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<Ingestor>,
    /// Shared secret; `None` rejects every trigger.
    pub api_key: Option<String>,
}

impl AppState {
    pub fn new(ingestor: Arc<Ingestor>, api_key: Option<String>) -> Self {
        Self { ingestor, api_key }
    }

    /// Secret from `API_KEY`.
    pub fn from_env(ingestor: Arc<Ingestor>) -> Self {
        Self::new(ingestor, std::env::var(ENV_API_KEY).ok())
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/jobs/ingest/run", post(run_ingest))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Constant-length comparison through SHA-256 digests.
pub fn authorize(presented: Option<&str>, configured: Option<&str>) -> Result<(), PipelineError> {
    let (Some(presented), Some(configured)) = (presented, configured) else {
        return Err(PipelineError::Unauthorized);
    };
    if configured.is_empty() {
        return Err(PipelineError::Unauthorized);
    }
    let a = Sha256::digest(presented.as_bytes());
    let b = Sha256::digest(configured.as_bytes());
    let diff = a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y));
    if diff == 0 {
        Ok(())
    } else {
        Err(PipelineError::Unauthorized)
    }
}

/// Trigger body after lenient normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerRequest {
    pub vip_ids: Option<Vec<String>>,
    pub recent_hours: Option<f64>,
    pub dry_run: bool,
}

impl TriggerRequest {
    /// Malformed or non-object JSON is treated as `{}`; unusable fields are
    /// ignored individually.
    pub fn from_body(body: &[u8]) -> Self {
        let value: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
        let Some(obj) = value.as_object() else {
            return Self::default();
        };

        let vip_ids = obj.get("vipIds").and_then(Value::as_array).map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect::<Vec<_>>()
        });

        let recent_hours = obj.get("recentHours").and_then(Value::as_f64);

        let dry_run = match obj.get("dryRun") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        };

        Self {
            vip_ids: normalize_vip_ids(vip_ids),
            recent_hours,
            dry_run,
        }
    }

    pub fn into_run_options(self) -> RunOptions {
        let defaults = RunOptions::default();
        RunOptions {
            vip_ids: self.vip_ids,
            recent_hours: self.recent_hours.or(defaults.recent_hours),
            follow_html_canonical: defaults.follow_html_canonical,
            dry_run: self.dry_run,
        }
    }
}

#[derive(Serialize)]
struct RunResponse<'a> {
    ok: bool,
    #[serde(flatten)]
    result: &'a RunResult,
}

fn error_body(status: StatusCode, code: &str) -> Response {
    (status, Json(json!({ "ok": false, "error": code }))).into_response()
}

async fn run_ingest(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let presented = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    if authorize(presented, state.api_key.as_deref()).is_err() {
        tracing::warn!(target: "api", "ingest trigger rejected: bad or missing admin key");
        return error_body(StatusCode::UNAUTHORIZED, "unauthorized");
    }

    let opts = TriggerRequest::from_body(&body).into_run_options();
    // runs to completion even if the client disconnects
    let ingestor = state.ingestor.clone();
    let run = tokio::spawn(async move { ingestor.run(opts).await });
    match run.await {
        Ok(Ok(result)) => (
            StatusCode::OK,
            Json(RunResponse {
                ok: true,
                result: &result,
            }),
        )
            .into_response(),
        Ok(Err(e)) => {
            tracing::error!(target: "api", error = %e, "ingest run failed");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        }
        Err(e) => {
            tracing::error!(target: "api", error = %e, "ingest task panicked");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        }
    }
}
