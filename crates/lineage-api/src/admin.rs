//! Snapshots and projection maintenance.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/snapshots` | Newest first |
//! | `POST`   | `/snapshots` | Body: `{"name":"...","description":"..."}`; returns 201 |
//! | `GET`    | `/snapshots/:id` | 404 if not found |
//! | `DELETE` | `/snapshots/:id` | 204, or 404 if not found |
//! | `GET`    | `/position` | `{"position": n}`, the head of the log |
//! | `POST`   | `/rebuild` | Body: [`RebuildBody`] |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use lineage_core::{
  snapshot::Snapshot,
  store::{ProjectionEngine, RebuildReport, SnapshotStore},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

// ─── Snapshots ───────────────────────────────────────────────────────────────

/// `GET /snapshots`
pub async fn list_snapshots<S>(
  State(store): State<Arc<S>>,
) -> Result<Json<Vec<Snapshot>>, ApiError>
where
  S: SnapshotStore,
{
  let snapshots = store.list_snapshots().await.map_err(ApiError::store)?;
  Ok(Json(snapshots))
}

#[derive(Debug, Deserialize)]
pub struct SnapshotBody {
  pub name:        String,
  pub description: Option<String>,
}

/// `POST /snapshots`
pub async fn create_snapshot<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<SnapshotBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SnapshotStore,
{
  if body.name.trim().is_empty() {
    return Err(ApiError::BadRequest("snapshot name is required".to_owned()));
  }
  let snapshot = store
    .create_snapshot(body.name, body.description)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(snapshot)))
}

/// `GET /snapshots/:id`
pub async fn get_snapshot<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Snapshot>, ApiError>
where
  S: SnapshotStore,
{
  let snapshot = store
    .get_snapshot(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("snapshot {id} not found")))?;
  Ok(Json(snapshot))
}

/// `DELETE /snapshots/:id`
pub async fn delete_snapshot<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: SnapshotStore,
{
  store.delete_snapshot(id).await.map_err(ApiError::store)?;
  Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PositionBody {
  pub position: i64,
}

/// `GET /position`
pub async fn position<S>(
  State(store): State<Arc<S>>,
) -> Result<Json<PositionBody>, ApiError>
where
  S: SnapshotStore,
{
  let position = store.get_max_position().await.map_err(ApiError::store)?;
  Ok(Json(PositionBody { position }))
}

// ─── Rebuild ─────────────────────────────────────────────────────────────────

/// `{"from_position": 0}` replays from scratch; `{"resume": true}` continues
/// from the last checkpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RebuildBody {
  pub from_position: i64,
  pub resume:        bool,
}

/// `POST /rebuild`
pub async fn rebuild<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<RebuildBody>,
) -> Result<Json<RebuildReport>, ApiError>
where
  S: ProjectionEngine,
{
  let report = if body.resume {
    store.resume_rebuild().await
  } else {
    store.rebuild(body.from_position).await
  }
  .map_err(ApiError::store)?;
  Ok(Json(report))
}
