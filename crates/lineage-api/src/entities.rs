//! Generic read-model handlers, mounted once per entity kind.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/<kind>` | Paged listing; see [`ListParams`] |
//! | `GET`  | `/<kind>/:id` | 404 if not found |
//!
//! A listing switches to a relation lookup with `?by=person_id&id=<uuid>` and
//! to a text search with `?q=...`.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use lineage_core::{
  model::{EntityData, Record},
  store::{ListOptions, Page, ReadModelStore, SortOrder},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
  pub limit:  Option<usize>,
  pub offset: Option<usize>,
  pub sort:   Option<String>,
  pub order:  Option<SortOrder>,
  pub status: Option<String>,
  /// Relation column to match, e.g. `person_id`. Requires `id`.
  pub by:     Option<String>,
  pub id:     Option<Uuid>,
  /// Free-text search over the kind's text columns.
  pub q:      Option<String>,
}

impl ListParams {
  fn options(&self) -> ListOptions {
    ListOptions {
      limit:  self.limit.unwrap_or(0),
      offset: self.offset.unwrap_or(0),
      sort:   self.sort.clone(),
      order:  self.order.unwrap_or_default(),
      status: self.status.clone(),
    }
  }
}

/// Wrap an unpaged result so every listing has the same shape.
fn whole<T>(items: Vec<T>) -> Page<T> {
  let n = items.len();
  Page { total: n as i64, limit: n, offset: 0, items }
}

/// `GET /<kind>[?limit=...][&offset=...][&sort=...][&order=asc|desc][&status=...]`
pub async fn list<S, D>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Page<Record<D>>>, ApiError>
where
  S: ReadModelStore,
  D: EntityData,
{
  match (&params.by, params.id, &params.q) {
    (Some(relation), Some(id), _) => {
      let rows = store
        .list_related::<D>(relation, id)
        .await
        .map_err(ApiError::store)?;
      Ok(Json(whole(rows)))
    }
    (Some(_), None, _) | (None, Some(_), _) => Err(ApiError::BadRequest(
      "`by` and `id` must be given together".to_owned(),
    )),
    (None, None, Some(q)) => {
      let options = params.options();
      let rows = store
        .search_text::<D>(q, options.effective_limit())
        .await
        .map_err(ApiError::store)?;
      Ok(Json(whole(rows)))
    }
    (None, None, None) => {
      let options = params.options();
      let page = store.list::<D>(&options).await.map_err(ApiError::store)?;
      Ok(Json(page))
    }
  }
}

/// `GET /<kind>/:id`
pub async fn get_one<S, D>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Record<D>>, ApiError>
where
  S: ReadModelStore,
  D: EntityData,
{
  let record = store
    .get::<D>(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("{} {id} not found", D::KIND)))?;
  Ok(Json(record))
}
