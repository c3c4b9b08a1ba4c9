//! Handlers for `/events`: the global log.
//!
//! `event_types` is accepted as a comma-separated string.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use lineage_core::{
  event::{EventPage, EventQuery, StoredEvent, StreamType},
  store::EventStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Deserialize, Default)]
pub struct LogParams {
  /// Only events after this position.
  pub after:       Option<i64>,
  pub limit:       Option<usize>,
  pub since:       Option<DateTime<Utc>>,
  pub until:       Option<DateTime<Utc>>,
  /// Comma-separated event type names, e.g. `PersonCreated,PersonUpdated`.
  pub event_types: Option<String>,
  pub stream_type: Option<String>,
}

impl LogParams {
  fn into_query(self) -> Result<EventQuery, ApiError> {
    let stream_type = self
      .stream_type
      .as_deref()
      .map(str::parse::<StreamType>)
      .transpose()
      .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    Ok(EventQuery {
      after_position: self.after.unwrap_or(0),
      limit: self.limit.unwrap_or(0),
      since: self.since,
      until: self.until,
      event_types: self
        .event_types
        .map(|s| {
          s.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
            .collect()
        })
        .unwrap_or_default(),
      stream_type,
    })
  }
}

/// `GET /events[?after=...][&limit=...][&since=...][&until=...][&event_types=...][&stream_type=...]`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<LogParams>,
) -> Result<Json<EventPage>, ApiError>
where
  S: EventStore,
{
  let query = params.into_query()?;
  let page = store.read_filtered(&query).await.map_err(ApiError::store)?;
  Ok(Json(page))
}

/// `GET /events/:id`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(event_id): Path<Uuid>,
) -> Result<Json<StoredEvent>, ApiError>
where
  S: EventStore,
{
  let event = store
    .get_event(event_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("event {event_id} not found")))?;
  Ok(Json(event))
}
