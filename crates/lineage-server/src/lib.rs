//! HTTP host for the Lineage store.
//!
//! Mounts [`lineage_api::api_router`] under `/api` next to a liveness probe,
//! wrapped in request tracing.

use std::{path::PathBuf, sync::Arc};

use axum::{Json, Router, routing::get};
use lineage_core::store::LineageStore;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `lineage.toml` and
/// `LINEAGE_*` environment variables.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
  pub host:              String,
  pub port:              u16,
  pub store_path:        PathBuf,
  /// Events per transaction during a projection rebuild.
  pub rebuild_page_size: usize,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:              "127.0.0.1".to_owned(),
      port:              8080,
      store_path:        PathBuf::from("lineage.db"),
      rebuild_page_size: 500,
    }
  }
}

impl ServerConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

// ─── Router ──────────────────────────────────────────────────────────────────

async fn health() -> Json<Value> { Json(json!({ "status": "ok" })) }

/// Build the complete application router for `store`.
pub fn router<S>(store: Arc<S>) -> Router
where
  S: LineageStore + 'static,
{
  Router::new()
    .route("/health", get(health))
    .nest("/api", lineage_api::api_router(store))
    .layer(TraceLayer::new_for_http())
}
