//! Handler for `GET /search/persons`.
//!
//! Query params map directly to [`SearchQuery`] fields, with the search text
//! passed as `q`.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use lineage_core::{
  search::{PersonHit, SearchMode, SearchQuery, SearchSort},
  store::ReadModelStore,
};
use serde::Deserialize;

use crate::error::ApiError;

#[derive(Debug, Deserialize, Default)]
pub struct SearchParams {
  pub q:              Option<String>,
  pub mode:           Option<SearchMode>,
  pub birth_year_min: Option<i64>,
  pub birth_year_max: Option<i64>,
  pub death_year_min: Option<i64>,
  pub death_year_max: Option<i64>,
  /// Substring of a birth or death place.
  pub place:          Option<String>,
  pub sort:           Option<SearchSort>,
  pub limit:          Option<usize>,
  /// Fuzzy-mode score threshold in `0.0..=1.0`.
  pub min_similarity: Option<f64>,
}

impl From<SearchParams> for SearchQuery {
  fn from(p: SearchParams) -> Self {
    SearchQuery {
      text:           p.q,
      mode:           p.mode.unwrap_or_default(),
      birth_year_min: p.birth_year_min,
      birth_year_max: p.birth_year_max,
      death_year_min: p.death_year_min,
      death_year_max: p.death_year_max,
      place:          p.place,
      sort:           p.sort.unwrap_or_default(),
      limit:          p.limit.unwrap_or(0),
      min_similarity: p.min_similarity,
    }
  }
}

/// `GET /search/persons[?q=...][&mode=exact|fuzzy|phonetic][&birth_year_min=...]...`
///
/// A query with neither text nor filters returns an empty list.
pub async fn persons<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<SearchParams>,
) -> Result<Json<Vec<PersonHit>>, ApiError>
where
  S: ReadModelStore,
{
  if params.min_similarity.is_some_and(|m| !(0.0..=1.0).contains(&m)) {
    return Err(ApiError::BadRequest(
      "min_similarity must be between 0 and 1".to_owned(),
    ));
  }
  let query = SearchQuery::from(params);
  let hits = store.search_persons(&query).await.map_err(ApiError::store)?;
  Ok(Json(hits))
}
