//! Tree navigation and browse views.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/persons/:id/ancestors` | `?generations=n`, default 4 |
//! | `GET`  | `/persons/:id/pedigree` | Parent references; 404 if none |
//! | `GET`  | `/persons/:id/parent-families` | Families the person is a child of |
//! | `GET`  | `/families/:id/children` | Child links of a family |
//! | `GET`  | `/surnames` | `?letter=D` narrows the surname list |
//! | `GET`  | `/places` | `?parent=Illinois, USA` drills down one level |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use lineage_core::{
  aggregate::{PlaceNode, SurnameIndex},
  model::FamilyChild,
  pedigree::{AncestorNode, MAX_GENERATIONS, PedigreeEdge},
  store::ReadModelStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

// ─── Pedigree ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AncestorParams {
  #[serde(default = "default_generations")]
  pub generations: u32,
}

fn default_generations() -> u32 { 4 }

/// `GET /persons/:id/ancestors[?generations=n]`
pub async fn ancestors<S>(
  State(store): State<Arc<S>>,
  Path(person_id): Path<Uuid>,
  Query(params): Query<AncestorParams>,
) -> Result<Json<Vec<AncestorNode>>, ApiError>
where
  S: ReadModelStore,
{
  if params.generations > MAX_GENERATIONS {
    return Err(ApiError::BadRequest(format!(
      "at most {MAX_GENERATIONS} generations"
    )));
  }
  let chart = store
    .ancestors(person_id, params.generations)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(chart))
}

/// `GET /persons/:id/pedigree`
pub async fn pedigree<S>(
  State(store): State<Arc<S>>,
  Path(person_id): Path<Uuid>,
) -> Result<Json<PedigreeEdge>, ApiError>
where
  S: ReadModelStore,
{
  let edge = store
    .pedigree_edge(person_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| {
      ApiError::NotFound(format!("no parents recorded for {person_id}"))
    })?;
  Ok(Json(edge))
}

/// `GET /persons/:id/parent-families`
pub async fn parent_families<S>(
  State(store): State<Arc<S>>,
  Path(person_id): Path<Uuid>,
) -> Result<Json<Vec<FamilyChild>>, ApiError>
where
  S: ReadModelStore,
{
  let links = store.child_families(person_id).await.map_err(ApiError::store)?;
  Ok(Json(links))
}

/// `GET /families/:id/children`
pub async fn children<S>(
  State(store): State<Arc<S>>,
  Path(family_id): Path<Uuid>,
) -> Result<Json<Vec<FamilyChild>>, ApiError>
where
  S: ReadModelStore,
{
  let links = store.family_children(family_id).await.map_err(ApiError::store)?;
  Ok(Json(links))
}

// ─── Browse ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct SurnameParams {
  pub letter: Option<String>,
}

/// `GET /surnames[?letter=D]`
pub async fn surnames<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<SurnameParams>,
) -> Result<Json<SurnameIndex>, ApiError>
where
  S: ReadModelStore,
{
  let index = store
    .surname_index(params.letter.as_deref())
    .await
    .map_err(ApiError::store)?;
  Ok(Json(index))
}

#[derive(Debug, Deserialize, Default)]
pub struct PlaceParams {
  pub parent: Option<String>,
}

/// `GET /places[?parent=...]`
pub async fn places<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<PlaceParams>,
) -> Result<Json<Vec<PlaceNode>>, ApiError>
where
  S: ReadModelStore,
{
  let nodes = store
    .place_hierarchy(params.parent.as_deref())
    .await
    .map_err(ApiError::store)?;
  Ok(Json(nodes))
}
