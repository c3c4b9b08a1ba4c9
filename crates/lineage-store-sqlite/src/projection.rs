//! Projection engine: deterministic per-event-type transitions on the read
//! model.
//!
//! Live appends call [`project`] inside the append transaction. Rebuilds
//! replay the log page by page, each page committed together with the
//! `projection_checkpoints` row so an interrupted rebuild can resume.
//!
//! Every handler is guarded by the aggregate row's `version`: a row already
//! at or past the event's version is left untouched, which makes replaying
//! the same event a no-op. Timestamps come from the event's `recorded_at`, so
//! a rebuilt row is identical to the live one.

use chrono::{DateTime, Utc};
use lineage_core::{
  event::{ChildLinked, DomainEvent, NameAdded, NameUpdated, StoredEvent},
  model::{
    AssociationData, AttributeData, CitationData, EntityData, FamilyData,
    LifeEventData, MediaData, NoteData, OrdinanceData, PersonData,
    PersonNameData, Record, SourceData, SubmitterData, apply_changes, touches,
  },
  store::{ProjectionEngine, RebuildReport},
};
use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Result, SqliteStore,
  encode::{encode_dt, encode_uuid, now},
  events::events_after,
  read_model::{load, load_where, person_name, remove, remove_where, upsert},
  schema::READ_MODEL_TABLES,
};

/// Name of the checkpoint row maintained by rebuilds.
const CHECKPOINT: &str = "read_model";

// ─── Dispatch ────────────────────────────────────────────────────────────────

/// The event being applied, as seen by a handler.
struct Step<'a> {
  conn:       &'a Connection,
  stream_id:  Uuid,
  version:    i64,
  at:         DateTime<Utc>,
  event_type: &'a str,
}

impl Step<'_> {
  /// Has the aggregate row already seen this event?
  fn already_applied(&self, row_version: i64) -> bool {
    let seen = row_version >= self.version;
    if seen {
      debug!(
        stream_id = %self.stream_id,
        event_type = self.event_type,
        version = self.version,
        row_version,
        "event already applied; skipping"
      );
    }
    seen
  }

  fn missing(&self, what: &str) {
    warn!(
      stream_id = %self.stream_id,
      event_type = self.event_type,
      version = self.version,
      "{what} not in read model; event has no effect"
    );
  }
}

/// Decode `event` and apply it. Every failure is returned; the caller decides
/// whether it is fatal.
pub(crate) fn project(conn: &Connection, event: &StoredEvent) -> Result<()> {
  let decoded = event.decode()?;
  apply_decoded(conn, event, decoded)
}

fn apply_decoded(
  conn: &Connection,
  event: &StoredEvent,
  decoded: DomainEvent,
) -> Result<()> {
  let s = Step {
    conn,
    stream_id: event.stream_id,
    version: event.version,
    at: event.recorded_at,
    event_type: &event.event_type,
  };

  use DomainEvent as E;
  match decoded {
    E::PersonCreated(data) => person_created(&s, data),
    E::PersonUpdated(c) => person_updated(&s, &c.changes),
    E::PersonDeleted(_) => person_deleted(&s),
    E::NameAdded(added) => name_added(&s, added),
    E::NameUpdated(updated) => name_updated(&s, updated),
    E::NameRemoved(removed) => name_removed(&s, removed.name_id),

    E::FamilyCreated(data) => family_created(&s, data),
    E::FamilyUpdated(c) => family_updated(&s, &c.changes),
    E::FamilyDeleted(_) => family_deleted(&s),
    E::ChildLinkedToFamily(link) => child_linked(&s, link),
    E::ChildUnlinkedFromFamily(u) => child_unlinked(&s, u.child_id),

    E::SourceCreated(data) => created(&s, data),
    E::SourceUpdated(c) => updated::<SourceData>(&s, &c.changes),
    E::SourceDeleted(_) => deleted::<SourceData>(&s),

    E::CitationCreated(data) => created(&s, data),
    E::CitationUpdated(c) => updated::<CitationData>(&s, &c.changes),
    E::CitationDeleted(_) => deleted::<CitationData>(&s),

    E::MediaCreated(data) => created(&s, data),
    E::MediaUpdated(c) => updated::<MediaData>(&s, &c.changes),
    E::MediaDeleted(_) => deleted::<MediaData>(&s),

    E::LifeEventCreated(data) => created(&s, data),
    E::LifeEventUpdated(c) => updated::<LifeEventData>(&s, &c.changes),
    E::LifeEventDeleted(_) => deleted::<LifeEventData>(&s),

    E::AttributeCreated(data) => created(&s, data),
    E::AttributeUpdated(c) => updated::<AttributeData>(&s, &c.changes),
    E::AttributeDeleted(_) => deleted::<AttributeData>(&s),

    E::NoteCreated(data) => created(&s, data),
    E::NoteUpdated(c) => updated::<NoteData>(&s, &c.changes),
    E::NoteDeleted(_) => deleted::<NoteData>(&s),

    E::SubmitterCreated(data) => created(&s, data),
    E::SubmitterUpdated(c) => updated::<SubmitterData>(&s, &c.changes),
    E::SubmitterDeleted(_) => deleted::<SubmitterData>(&s),

    E::AssociationCreated(data) => created(&s, data),
    E::AssociationUpdated(c) => updated::<AssociationData>(&s, &c.changes),
    E::AssociationDeleted(_) => deleted::<AssociationData>(&s),

    E::OrdinanceCreated(data) => created(&s, data),
    E::OrdinanceUpdated(c) => updated::<OrdinanceData>(&s, &c.changes),
    E::OrdinanceDeleted(_) => deleted::<OrdinanceData>(&s),
  }
}

// ─── Generic handlers ────────────────────────────────────────────────────────

fn created<D: EntityData>(s: &Step<'_>, data: D) -> Result<()> {
  if let Some(row) = load::<D>(s.conn, s.stream_id)?
    && s.already_applied(row.version)
  {
    return Ok(());
  }
  upsert(s.conn, &Record::new(s.stream_id, data, s.version, s.at))
}

/// Load the stream's row, apply `changes` and bump its version, without
/// saving. `None` if there is nothing to do.
fn patched<D: EntityData>(
  s: &Step<'_>,
  changes: &Map<String, Value>,
) -> Result<Option<Record<D>>> {
  let Some(mut row) = load::<D>(s.conn, s.stream_id)? else {
    s.missing(D::KIND.as_str());
    return Ok(None);
  };
  if s.already_applied(row.version) {
    return Ok(None);
  }

  let (data, ignored) = apply_changes(&row.data, changes)?;
  if !ignored.is_empty() {
    debug!(
      stream_id = %s.stream_id,
      event_type = s.event_type,
      fields = ?ignored,
      "ignoring read-only or unknown fields"
    );
  }
  row.data = data;
  row.touch(s.version, s.at);
  Ok(Some(row))
}

fn updated<D: EntityData>(
  s: &Step<'_>,
  changes: &Map<String, Value>,
) -> Result<()> {
  match patched::<D>(s, changes)? {
    Some(row) => upsert(s.conn, &row),
    None => Ok(()),
  }
}

fn deleted<D: EntityData>(s: &Step<'_>) -> Result<()> {
  let Some(row) = load::<D>(s.conn, s.stream_id)? else {
    s.missing(D::KIND.as_str());
    return Ok(());
  };
  if s.already_applied(row.version) {
    return Ok(());
  }
  remove::<D>(s.conn, s.stream_id)?;
  Ok(())
}

// ─── People ──────────────────────────────────────────────────────────────────

fn person_created(s: &Step<'_>, data: PersonData) -> Result<()> {
  if let Some(row) = load::<PersonData>(s.conn, s.stream_id)?
    && s.already_applied(row.version)
  {
    return Ok(());
  }

  let person = Record::new(s.stream_id, data, s.version, s.at);
  let name = person.data.primary_name(s.stream_id);
  upsert(s.conn, &person)?;
  upsert(s.conn, &Record::new(s.stream_id, name, s.version, s.at))?;
  // Families or children may have referenced this id before it existed.
  refresh_person_name(s.conn, s.stream_id, &person.data.full_name, s.at)
}

fn person_updated(s: &Step<'_>, changes: &Map<String, Value>) -> Result<()> {
  let Some(person) = patched::<PersonData>(s, changes)? else {
    return Ok(());
  };
  upsert(s.conn, &person)?;

  if touches(changes, PersonData::NAME_FIELDS) {
    sync_primary_name(s, &person)?;
    refresh_person_name(s.conn, person.id, &person.data.full_name, s.at)?;
  }
  Ok(())
}

fn person_deleted(s: &Step<'_>) -> Result<()> {
  let Some(person) = load::<PersonData>(s.conn, s.stream_id)? else {
    s.missing("person");
    return Ok(());
  };
  if s.already_applied(person.version) {
    return Ok(());
  }

  remove::<PersonData>(s.conn, s.stream_id)?;
  remove_where(s.conn, "person_names", "person_id", s.stream_id)?;
  remove_where(s.conn, "pedigree_edges", "person_id", s.stream_id)?;
  Ok(())
}

/// Load the stream's person for a name event, or `None` if the event should
/// be skipped.
fn person_for_name_event(s: &Step<'_>) -> Result<Option<Record<PersonData>>> {
  let Some(person) = load::<PersonData>(s.conn, s.stream_id)? else {
    s.missing("person");
    return Ok(None);
  };
  if s.already_applied(person.version) {
    return Ok(None);
  }
  Ok(Some(person))
}

fn name_added(s: &Step<'_>, added: NameAdded) -> Result<()> {
  let Some(mut person) = person_for_name_event(s)? else {
    return Ok(());
  };

  let NameAdded { name_id, name: mut data } = added;
  data.person_id = s.stream_id;
  let name = Record::new(name_id, data, s.version, s.at);

  if name.data.is_primary {
    demote_other_names(s, name_id)?;
    person.data.adopt_name(&name.data);
    refresh_person_name(s.conn, person.id, &person.data.full_name, s.at)?;
  }
  upsert(s.conn, &name)?;

  person.touch(s.version, s.at);
  upsert(s.conn, &person)
}

fn name_updated(s: &Step<'_>, update: NameUpdated) -> Result<()> {
  let Some(mut person) = person_for_name_event(s)? else {
    return Ok(());
  };
  let Some(mut name) = load::<PersonNameData>(s.conn, update.name_id)?
    .filter(|n| n.data.person_id == s.stream_id)
  else {
    s.missing("name variant");
    return Ok(());
  };

  let (mut data, _) = apply_changes(&name.data, &update.changes)?;
  if name.data.is_primary && !data.is_primary {
    warn!(
      stream_id = %s.stream_id,
      name_id = %update.name_id,
      "a primary name cannot be demoted directly; promote another name instead"
    );
    data.is_primary = true;
  }
  let promoted = data.is_primary && !name.data.is_primary;
  name.data = data;
  name.touch(s.version, s.at);

  if promoted {
    demote_other_names(s, name.id)?;
  }
  upsert(s.conn, &name)?;

  if name.data.is_primary {
    person.data.adopt_name(&name.data);
    refresh_person_name(s.conn, person.id, &person.data.full_name, s.at)?;
  }
  person.touch(s.version, s.at);
  upsert(s.conn, &person)
}

fn name_removed(s: &Step<'_>, name_id: Uuid) -> Result<()> {
  let Some(mut person) = person_for_name_event(s)? else {
    return Ok(());
  };

  match load::<PersonNameData>(s.conn, name_id)?
    .filter(|n| n.data.person_id == s.stream_id)
  {
    Some(name) if name.data.is_primary => {
      warn!(
        stream_id = %s.stream_id,
        %name_id,
        "a person's primary name cannot be removed; ignoring"
      );
    }
    Some(_) => {
      remove::<PersonNameData>(s.conn, name_id)?;
    }
    None => s.missing("name variant"),
  }

  person.touch(s.version, s.at);
  upsert(s.conn, &person)
}

/// Point the primary name variant at the person's current name parts.
fn sync_primary_name(s: &Step<'_>, person: &Record<PersonData>) -> Result<()> {
  let primary = load_where::<PersonNameData>(s.conn, "person_id", person.id)?
    .into_iter()
    .find(|n| n.data.is_primary);

  let mut data = person.data.primary_name(person.id);
  match primary {
    Some(mut name) => {
      data.name_type = name.data.name_type.take();
      name.data = data;
      name.touch(s.version, s.at);
      upsert(s.conn, &name)
    }
    None => upsert(s.conn, &Record::new(person.id, data, s.version, s.at)),
  }
}

fn demote_other_names(s: &Step<'_>, keep: Uuid) -> Result<()> {
  s.conn.execute(
    "UPDATE person_names
     SET is_primary = 0, version = ?3, updated_at = ?4
     WHERE person_id = ?1 AND id <> ?2 AND is_primary = 1",
    rusqlite::params![
      encode_uuid(s.stream_id),
      encode_uuid(keep),
      s.version,
      encode_dt(s.at),
    ],
  )?;
  Ok(())
}

/// Rewrite every denormalized copy of a person's display name.
fn refresh_person_name(
  conn: &Connection,
  person_id: Uuid,
  full_name: &str,
  at: DateTime<Utc>,
) -> Result<()> {
  let id = encode_uuid(person_id);
  let name = Some(full_name).filter(|n| !n.is_empty());
  let at = encode_dt(at);

  for (id_col, name_col) in [
    ("partner1_id", "partner1_name"),
    ("partner2_id", "partner2_name"),
  ] {
    conn.execute(
      &format!(
        "UPDATE families SET {name_col} = ?2
         WHERE {id_col} = ?1 AND {name_col} IS NOT ?2"
      ),
      rusqlite::params![id, name],
    )?;
  }
  for (id_col, name_col) in
    [("father_id", "father_name"), ("mother_id", "mother_name")]
  {
    conn.execute(
      &format!(
        "UPDATE pedigree_edges SET {name_col} = ?2, updated_at = ?3
         WHERE {id_col} = ?1 AND {name_col} IS NOT ?2"
      ),
      rusqlite::params![id, name, at],
    )?;
  }
  Ok(())
}

// ─── Families ────────────────────────────────────────────────────────────────

fn family_created(s: &Step<'_>, data: FamilyData) -> Result<()> {
  if let Some(row) = load::<FamilyData>(s.conn, s.stream_id)?
    && s.already_applied(row.version)
  {
    return Ok(());
  }

  let mut family = Record::new(s.stream_id, data, s.version, s.at);
  fill_partner_names(s.conn, &mut family.data)?;
  family.data.child_count = child_count(s.conn, s.stream_id)?;
  upsert(s.conn, &family)
}

fn family_updated(s: &Step<'_>, changes: &Map<String, Value>) -> Result<()> {
  let Some(mut family) = patched::<FamilyData>(s, changes)? else {
    return Ok(());
  };
  if touches(changes, FamilyData::PARTNER_FIELDS) {
    fill_partner_names(s.conn, &mut family.data)?;
    refresh_child_edges(s, &family)?;
  }
  upsert(s.conn, &family)
}

fn family_deleted(s: &Step<'_>) -> Result<()> {
  let Some(family) = load::<FamilyData>(s.conn, s.stream_id)? else {
    s.missing("family");
    return Ok(());
  };
  if s.already_applied(family.version) {
    return Ok(());
  }

  remove::<FamilyData>(s.conn, s.stream_id)?;
  remove_where(s.conn, "family_children", "family_id", s.stream_id)?;
  remove_where(s.conn, "pedigree_edges", "family_id", s.stream_id)?;
  Ok(())
}

fn child_linked(s: &Step<'_>, link: ChildLinked) -> Result<()> {
  let Some(mut family) = load::<FamilyData>(s.conn, s.stream_id)? else {
    s.missing("family");
    return Ok(());
  };
  if s.already_applied(family.version) {
    return Ok(());
  }

  let family_id = encode_uuid(s.stream_id);
  let child_id = encode_uuid(link.child_id);
  let at = encode_dt(s.at);

  s.conn.execute(
    "INSERT INTO family_children (
       family_id, person_id, relationship_to_father,
       relationship_to_mother, sequence, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
     ON CONFLICT(family_id, person_id) DO UPDATE SET
       relationship_to_father = excluded.relationship_to_father,
       relationship_to_mother = excluded.relationship_to_mother,
       sequence               = excluded.sequence",
    rusqlite::params![
      family_id,
      child_id,
      link.relationship_to_father,
      link.relationship_to_mother,
      link.sequence,
      at,
    ],
  )?;

  // The most recent link wins the child's pedigree edge.
  s.conn.execute(
    "INSERT INTO pedigree_edges (
       person_id, family_id, father_id, father_name,
       mother_id, mother_name, updated_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
     ON CONFLICT(person_id) DO UPDATE SET
       family_id   = excluded.family_id,
       father_id   = excluded.father_id,
       father_name = excluded.father_name,
       mother_id   = excluded.mother_id,
       mother_name = excluded.mother_name,
       updated_at  = excluded.updated_at",
    rusqlite::params![
      child_id,
      family_id,
      family.data.partner1_id.map(encode_uuid),
      family.data.partner1_name,
      family.data.partner2_id.map(encode_uuid),
      family.data.partner2_name,
      at,
    ],
  )?;

  family.data.child_count = child_count(s.conn, s.stream_id)?;
  family.touch(s.version, s.at);
  upsert(s.conn, &family)
}

fn child_unlinked(s: &Step<'_>, child_id: Uuid) -> Result<()> {
  let Some(mut family) = load::<FamilyData>(s.conn, s.stream_id)? else {
    s.missing("family");
    return Ok(());
  };
  if s.already_applied(family.version) {
    return Ok(());
  }

  let family_id = encode_uuid(s.stream_id);
  let child_id = encode_uuid(child_id);
  s.conn.execute(
    "DELETE FROM family_children WHERE family_id = ?1 AND person_id = ?2",
    [&family_id, &child_id],
  )?;
  // Only clear the edge if this family produced it.
  s.conn.execute(
    "DELETE FROM pedigree_edges WHERE person_id = ?2 AND family_id = ?1",
    [&family_id, &child_id],
  )?;

  family.data.child_count = child_count(s.conn, s.stream_id)?;
  family.touch(s.version, s.at);
  upsert(s.conn, &family)
}

fn fill_partner_names(conn: &Connection, family: &mut FamilyData) -> Result<()> {
  family.partner1_name = match family.partner1_id {
    Some(id) => person_name(conn, id)?,
    None => None,
  };
  family.partner2_name = match family.partner2_id {
    Some(id) => person_name(conn, id)?,
    None => None,
  };
  Ok(())
}

fn refresh_child_edges(s: &Step<'_>, family: &Record<FamilyData>) -> Result<()> {
  s.conn.execute(
    "UPDATE pedigree_edges
     SET father_id = ?2, father_name = ?3,
         mother_id = ?4, mother_name = ?5,
         updated_at = ?6
     WHERE family_id = ?1",
    rusqlite::params![
      encode_uuid(family.id),
      family.data.partner1_id.map(encode_uuid),
      family.data.partner1_name,
      family.data.partner2_id.map(encode_uuid),
      family.data.partner2_name,
      encode_dt(s.at),
    ],
  )?;
  Ok(())
}

/// Children linked to a family. Recounting keeps the counter exact under
/// replays and never lets it go below zero.
fn child_count(conn: &Connection, family_id: Uuid) -> Result<i64> {
  Ok(conn.query_row(
    "SELECT COUNT(*) FROM family_children WHERE family_id = ?1",
    [encode_uuid(family_id)],
    |r| r.get(0),
  )?)
}

// ─── Rebuild ─────────────────────────────────────────────────────────────────

fn clear_read_model(conn: &Connection) -> Result<()> {
  for table in READ_MODEL_TABLES {
    conn.execute(&format!("DELETE FROM {table}"), [])?;
  }
  Ok(())
}

pub(crate) fn checkpoint(conn: &Connection) -> Result<Option<i64>> {
  Ok(
    conn
      .query_row(
        "SELECT position FROM projection_checkpoints WHERE name = ?1",
        [CHECKPOINT],
        |r| r.get(0),
      )
      .optional()?,
  )
}

fn save_checkpoint(conn: &Connection, position: i64) -> Result<()> {
  conn.execute(
    "INSERT INTO projection_checkpoints (name, position, updated_at)
     VALUES (?1, ?2, ?3)
     ON CONFLICT(name) DO UPDATE SET
       position   = excluded.position,
       updated_at = excluded.updated_at",
    rusqlite::params![CHECKPOINT, position, encode_dt(now())],
  )?;
  Ok(())
}

/// Result of one rebuild transaction.
struct PageOutcome {
  read:          usize,
  applied:       u64,
  skipped:       u64,
  last_position: i64,
}

/// Apply one page of the log after `after`, committing it together with the
/// checkpoint. With `clear`, the read model is emptied in the same
/// transaction first.
fn rebuild_page(
  conn: &mut Connection,
  after: i64,
  page_size: usize,
  clear: bool,
) -> Result<PageOutcome> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  if clear {
    clear_read_model(&tx)?;
  }

  let events = events_after(&tx, after, page_size)?;
  let mut outcome = PageOutcome {
    read:          events.len(),
    applied:       0,
    skipped:       0,
    last_position: after,
  };

  for event in &events {
    match event.decode() {
      Ok(decoded) => {
        apply_decoded(&tx, event, decoded)?;
        outcome.applied += 1;
      }
      Err(e) if e.is_codec_failure() => {
        warn!(
          position = event.position,
          event_id = %event.event_id,
          event_type = %event.event_type,
          error = %e,
          "skipping event this build cannot decode"
        );
        outcome.skipped += 1;
      }
      Err(e) => return Err(e.into()),
    }
    outcome.last_position = event.position;
  }

  save_checkpoint(&tx, outcome.last_position)?;
  tx.commit()?;
  Ok(outcome)
}

impl SqliteStore {
  async fn run_rebuild(&self, from_position: i64) -> Result<RebuildReport> {
    let _guard = self.append_lock.lock().await;
    let page_size = self.page_size;
    let from_position = from_position.max(0);
    let mut clear = from_position == 0;
    let mut report =
      RebuildReport { last_position: from_position, ..Default::default() };

    info!(from_position, page_size, "rebuilding read model");
    loop {
      let after = report.last_position;
      let page = self
        .write(move |conn| rebuild_page(conn, after, page_size, clear))
        .await?;
      clear = false;

      report.applied += page.applied;
      report.skipped += page.skipped;
      report.last_position = page.last_position;

      if page.read < page_size {
        break;
      }
      info!(
        applied = report.applied,
        skipped = report.skipped,
        position = report.last_position,
        "rebuild progress"
      );
    }

    info!(
      applied = report.applied,
      skipped = report.skipped,
      position = report.last_position,
      "rebuild complete"
    );
    Ok(report)
  }
}

// ─── ProjectionEngine impl ───────────────────────────────────────────────────

impl ProjectionEngine for SqliteStore {
  async fn apply(&self, event: &StoredEvent) -> Result<()> {
    let _guard = self.append_lock.lock().await;
    let event = event.clone();
    self
      .write(move |conn| {
        let tx = conn.transaction()?;
        project(&tx, &event)?;
        tx.commit()?;
        Ok(())
      })
      .await
  }

  async fn rebuild(&self, from_position: i64) -> Result<RebuildReport> {
    self.run_rebuild(from_position).await
  }

  async fn resume_rebuild(&self) -> Result<RebuildReport> {
    let from = self.read(checkpoint).await?.unwrap_or(0);
    self.run_rebuild(from).await
  }
}
