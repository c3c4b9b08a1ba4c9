//! Handlers for `/streams` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/streams/:id` | Stream header; 404 if it has no events |
//! | `GET`  | `/streams/:id/version` | `{"version": n}`, `0` for unknown streams |
//! | `GET`  | `/streams/:id/events` | Every event of the stream, by version |
//! | `POST` | `/streams/:id/events` | Body: [`AppendBody`]; returns 201 + stored events |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use lineage_core::{
  event::{ExpectedVersion, NewEvent, Stream, StoredEvent, StreamType},
  store::EventStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

// ─── Append ──────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /streams/:id/events`.
#[derive(Debug, Deserialize)]
pub struct AppendBody {
  pub stream_type:      StreamType,
  /// `-1` to create the stream, otherwise the version the caller last saw.
  pub expected_version: ExpectedVersion,
  pub events:           Vec<NewEvent>,
}

/// `POST /streams/:id/events`
pub async fn append<S>(
  State(store): State<Arc<S>>,
  Path(stream_id): Path<Uuid>,
  Json(body): Json<AppendBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: EventStore,
{
  let stored = store
    .append(stream_id, body.stream_type, body.events, body.expected_version)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(stored)))
}

// ─── Read ────────────────────────────────────────────────────────────────────

/// `GET /streams/:id/events`
pub async fn events<S>(
  State(store): State<Arc<S>>,
  Path(stream_id): Path<Uuid>,
) -> Result<Json<Vec<StoredEvent>>, ApiError>
where
  S: EventStore,
{
  let events = store.read_stream(stream_id).await.map_err(ApiError::store)?;
  Ok(Json(events))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VersionBody {
  pub version: i64,
}

/// `GET /streams/:id/version`
pub async fn version<S>(
  State(store): State<Arc<S>>,
  Path(stream_id): Path<Uuid>,
) -> Result<Json<VersionBody>, ApiError>
where
  S: EventStore,
{
  let version = store
    .get_stream_version(stream_id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(VersionBody { version }))
}

/// `GET /streams/:id`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(stream_id): Path<Uuid>,
) -> Result<Json<Stream>, ApiError>
where
  S: EventStore,
{
  let stream = store
    .get_stream(stream_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("stream {stream_id} not found")))?;
  Ok(Json(stream))
}
