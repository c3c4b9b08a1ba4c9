//! JSON REST API for Lineage.
//!
//! Exposes an axum [`Router`] backed by any
//! [`lineage_core::store::LineageStore`]. Auth, TLS, and transport concerns
//! are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", lineage_api::api_router(store.clone()))
//! ```

pub mod admin;
pub mod entities;
pub mod error;
pub mod events;
pub mod search;
pub mod streams;
pub mod tree;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use lineage_core::{
  model::{
    AssociationData, AttributeData, CitationData, EntityData, FamilyData,
    LifeEventData, MediaData, NoteData, OrdinanceData, PersonData,
    PersonNameData, SourceData, SubmitterData,
  },
  store::LineageStore,
};

pub use error::{ApiError, CONFLICT_MESSAGE};

/// Mount `GET path` and `GET path/{id}` for one entity kind.
fn entity<S, D>(router: Router<Arc<S>>, path: &str) -> Router<Arc<S>>
where
  S: LineageStore + 'static,
  D: EntityData,
{
  router
    .route(path, get(entities::list::<S, D>))
    .route(&format!("{path}/{{id}}"), get(entities::get_one::<S, D>))
}

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: LineageStore + 'static,
{
  let mut router = Router::new()
    // Streams
    .route(
      "/streams/{id}/events",
      get(streams::events::<S>).post(streams::append::<S>),
    )
    .route("/streams/{id}/version", get(streams::version::<S>))
    .route("/streams/{id}", get(streams::get_one::<S>))
    // Global log
    .route("/events", get(events::list::<S>))
    .route("/events/{id}", get(events::get_one::<S>))
    // Search and tree navigation
    .route("/search/persons", get(search::persons::<S>))
    .route("/persons/{id}/ancestors", get(tree::ancestors::<S>))
    .route("/persons/{id}/pedigree", get(tree::pedigree::<S>))
    .route("/persons/{id}/parent-families", get(tree::parent_families::<S>))
    .route("/families/{id}/children", get(tree::children::<S>))
    .route("/surnames", get(tree::surnames::<S>))
    .route("/places", get(tree::places::<S>))
    // Snapshots and maintenance
    .route(
      "/snapshots",
      get(admin::list_snapshots::<S>).post(admin::create_snapshot::<S>),
    )
    .route(
      "/snapshots/{id}",
      get(admin::get_snapshot::<S>).delete(admin::delete_snapshot::<S>),
    )
    .route("/position", get(admin::position::<S>))
    .route("/rebuild", post(admin::rebuild::<S>));

  // Entities
  router = entity::<S, PersonData>(router, "/persons");
  router = entity::<S, PersonNameData>(router, "/person-names");
  router = entity::<S, FamilyData>(router, "/families");
  router = entity::<S, SourceData>(router, "/sources");
  router = entity::<S, CitationData>(router, "/citations");
  router = entity::<S, MediaData>(router, "/media");
  router = entity::<S, LifeEventData>(router, "/life-events");
  router = entity::<S, AttributeData>(router, "/attributes");
  router = entity::<S, NoteData>(router, "/notes");
  router = entity::<S, SubmitterData>(router, "/submitters");
  router = entity::<S, AssociationData>(router, "/associations");
  router = entity::<S, OrdinanceData>(router, "/ordinances");

  router.with_state(store)
}
