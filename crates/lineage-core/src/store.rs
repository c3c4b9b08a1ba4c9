//! The storage traits and their supporting query types.
//!
//! The traits are implemented by storage backends (e.g.
//! `lineage-store-sqlite`). Higher layers (`lineage-api`, `lineage-server`)
//! depend on these abstractions, not on any concrete backend.

use std::future::Future;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  DomainError,
  aggregate::{PlaceNode, SurnameIndex},
  event::{
    EventPage, EventQuery, ExpectedVersion, NewEvent, Stream, StoredEvent,
    StreamType,
  },
  model::{EntityData, FamilyChild, Record},
  pedigree::{AncestorNode, PedigreeEdge},
  search::{PersonHit, SearchQuery},
  snapshot::Snapshot,
};

// ─── Query types ─────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
  #[default]
  Asc,
  Desc,
}

/// Parameters for [`ReadModelStore::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListOptions {
  /// `0` means [`ListOptions::DEFAULT_LIMIT`].
  pub limit:  usize,
  pub offset: usize,
  /// A sortable column of the listed kind; unknown names are rejected.
  pub sort:   Option<String>,
  pub order:  SortOrder,
  /// Status filter for kinds that have one (research status for persons,
  /// ordinance status).
  pub status: Option<String>,
}

impl ListOptions {
  pub const DEFAULT_LIMIT: usize = 50;
  pub const MAX_LIMIT: usize = 1000;

  pub fn effective_limit(&self) -> usize {
    match self.limit {
      0 => Self::DEFAULT_LIMIT,
      n => n.min(Self::MAX_LIMIT),
    }
  }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
  pub items:  Vec<T>,
  /// Rows matching the filters, ignoring limit and offset.
  pub total:  i64,
  pub limit:  usize,
  pub offset: usize,
}

/// Outcome of a projection rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildReport {
  /// Events projected.
  pub applied:       u64,
  /// Events skipped because this build cannot decode them.
  pub skipped:       u64,
  /// Position of the last event read; the checkpoint after this run.
  pub last_position: i64,
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// What every backend shares: its error type.
///
/// Keeping the error on one supertrait lets code generic over several of the
/// store traits name `S::Error` unambiguously.
pub trait Storage: Send + Sync {
  type Error: std::error::Error + DomainError + Send + Sync + 'static;
}

/// The append-only event log.
///
/// All methods return `Send` futures so the traits can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait EventStore: Storage {
  /// Append `events` to `stream_id`, creating the stream on first use.
  ///
  /// The version check, the inserts and the synchronous projection of every
  /// event happen in one atomic unit. Returns the stored envelopes in order.
  /// Fails with [`crate::Error::ConcurrencyConflict`] if the stream is not at
  /// `expected`.
  fn append(
    &self,
    stream_id: Uuid,
    stream_type: StreamType,
    events: Vec<NewEvent>,
    expected: ExpectedVersion,
  ) -> impl Future<Output = Result<Vec<StoredEvent>, Self::Error>> + Send + '_;

  /// All events of one stream, by version ascending.
  fn read_stream(
    &self,
    stream_id: Uuid,
  ) -> impl Future<Output = Result<Vec<StoredEvent>, Self::Error>> + Send + '_;

  /// Up to `limit` events with a position strictly greater than
  /// `from_position`, by position ascending.
  fn read_all(
    &self,
    from_position: i64,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<StoredEvent>, Self::Error>> + Send + '_;

  /// Filtered, paginated read over the global log.
  fn read_filtered<'a>(
    &'a self,
    query: &'a EventQuery,
  ) -> impl Future<Output = Result<EventPage, Self::Error>> + Send + 'a;

  /// Current version of a stream; `0` if it has no events.
  fn get_stream_version(
    &self,
    stream_id: Uuid,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;

  fn get_event(
    &self,
    event_id: Uuid,
  ) -> impl Future<Output = Result<Option<StoredEvent>, Self::Error>> + Send + '_;

  fn get_stream(
    &self,
    stream_id: Uuid,
  ) -> impl Future<Output = Result<Option<Stream>, Self::Error>> + Send + '_;
}

/// Applies events to the read model.
pub trait ProjectionEngine: Storage {
  /// Project one stored event. Idempotent: rows already at or past the
  /// event's version are left alone.
  fn apply<'a>(
    &'a self,
    event: &'a StoredEvent,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Replay the log after `from_position`. From `0` the read model is
  /// cleared first. Undecodable events are skipped and counted.
  fn rebuild(
    &self,
    from_position: i64,
  ) -> impl Future<Output = Result<RebuildReport, Self::Error>> + Send + '_;

  /// Continue an interrupted rebuild from its last committed checkpoint.
  fn resume_rebuild(
    &self,
  ) -> impl Future<Output = Result<RebuildReport, Self::Error>> + Send + '_;
}

/// Denormalized, query-shaped views of the log.
pub trait ReadModelStore: Storage {
  // ── Generic entity access ─────────────────────────────────────────────

  fn get<D: EntityData>(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Record<D>>, Self::Error>> + Send + '_;

  fn list<'a, D: EntityData>(
    &'a self,
    options: &'a ListOptions,
  ) -> impl Future<Output = Result<Page<Record<D>>, Self::Error>> + Send + 'a;

  /// Rows whose `relation` column (e.g. `person_id`) equals `id`.
  fn list_related<'a, D: EntityData>(
    &'a self,
    relation: &'a str,
    id: Uuid,
  ) -> impl Future<Output = Result<Vec<Record<D>>, Self::Error>> + Send + 'a;

  /// Case-insensitive substring search over the kind's text columns.
  fn search_text<'a, D: EntityData>(
    &'a self,
    text: &'a str,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Record<D>>, Self::Error>> + Send + 'a;

  /// Upsert by id, bypassing the log. For bulk import only.
  fn save<D: EntityData>(
    &self,
    record: Record<D>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Remove by id, bypassing the log. Returns whether a row was removed.
  fn delete<D: EntityData>(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── People ────────────────────────────────────────────────────────────

  fn search_persons<'a>(
    &'a self,
    query: &'a SearchQuery,
  ) -> impl Future<Output = Result<Vec<PersonHit>, Self::Error>> + Send + 'a;

  fn family_children(
    &self,
    family_id: Uuid,
  ) -> impl Future<Output = Result<Vec<FamilyChild>, Self::Error>> + Send + '_;

  /// Families `person_id` is linked into as a child.
  fn child_families(
    &self,
    person_id: Uuid,
  ) -> impl Future<Output = Result<Vec<FamilyChild>, Self::Error>> + Send + '_;

  // ── Pedigree ──────────────────────────────────────────────────────────

  fn pedigree_edge(
    &self,
    person_id: Uuid,
  ) -> impl Future<Output = Result<Option<PedigreeEdge>, Self::Error>> + Send + '_;

  /// Ancestor chart rooted at `person_id`, at most `generations` deep.
  fn ancestors(
    &self,
    person_id: Uuid,
    generations: u32,
  ) -> impl Future<Output = Result<Vec<AncestorNode>, Self::Error>> + Send + '_;

  // ── Aggregations ──────────────────────────────────────────────────────

  fn surname_index<'a>(
    &'a self,
    letter: Option<&'a str>,
  ) -> impl Future<Output = Result<SurnameIndex, Self::Error>> + Send + 'a;

  fn place_hierarchy<'a>(
    &'a self,
    parent: Option<&'a str>,
  ) -> impl Future<Output = Result<Vec<PlaceNode>, Self::Error>> + Send + 'a;
}

/// Named markers on the global log.
pub trait SnapshotStore: Storage {
  /// Record the current maximum log position under `name`.
  fn create_snapshot(
    &self,
    name: String,
    description: Option<String>,
  ) -> impl Future<Output = Result<Snapshot, Self::Error>> + Send + '_;

  fn get_snapshot(
    &self,
    snapshot_id: Uuid,
  ) -> impl Future<Output = Result<Option<Snapshot>, Self::Error>> + Send + '_;

  /// Newest first.
  fn list_snapshots(
    &self,
  ) -> impl Future<Output = Result<Vec<Snapshot>, Self::Error>> + Send + '_;

  /// Fails with [`crate::Error::SnapshotNotFound`] if absent.
  fn delete_snapshot(
    &self,
    snapshot_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Highest position in the log; `0` when empty.
  fn get_max_position(
    &self,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;
}

/// A complete backend.
pub trait LineageStore:
  EventStore + ProjectionEngine + ReadModelStore + SnapshotStore
{
}

impl<T> LineageStore for T where
  T: EventStore + ProjectionEngine + ReadModelStore + SnapshotStore
{
}
