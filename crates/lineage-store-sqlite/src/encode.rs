//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings with microsecond
//! precision, so string order is time order. Metadata is stored as compact
//! JSON. UUIDs are stored as hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, SubsecRound as _, Utc};
use lineage_core::{
  event::{Stream, StoredEvent, StreamType},
  model::FamilyChild,
  pedigree::PedigreeEdge,
  snapshot::Snapshot,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

/// The current time at the precision the store keeps.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Select list matching [`RawEvent`]'s field order.
pub const EVENT_COLUMNS: &str = "position, event_id, stream_id, stream_type, \
                                 version, event_type, payload, metadata, \
                                 recorded_at";

/// Raw values read directly from an `events` row.
pub struct RawEvent {
  pub position:    i64,
  pub event_id:    String,
  pub stream_id:   String,
  pub stream_type: String,
  pub version:     i64,
  pub event_type:  String,
  pub payload:     Vec<u8>,
  pub metadata:    Option<String>,
  pub recorded_at: String,
}

impl RawEvent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      position:    row.get(0)?,
      event_id:    row.get(1)?,
      stream_id:   row.get(2)?,
      stream_type: row.get(3)?,
      version:     row.get(4)?,
      event_type:  row.get(5)?,
      payload:     row.get(6)?,
      metadata:    row.get(7)?,
      recorded_at: row.get(8)?,
    })
  }

  pub fn into_event(self) -> Result<StoredEvent> {
    Ok(StoredEvent {
      event_id:    decode_uuid(&self.event_id)?,
      stream_id:   decode_uuid(&self.stream_id)?,
      stream_type: self.stream_type.parse::<StreamType>()?,
      version:     self.version,
      event_type:  self.event_type,
      payload:     self.payload,
      metadata:    self
        .metadata
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?,
      recorded_at: decode_dt(&self.recorded_at)?,
      position:    self.position,
    })
  }
}

/// Raw strings read directly from a `streams` row.
pub struct RawStream {
  pub stream_id:   String,
  pub stream_type: String,
  pub created_at:  String,
}

impl RawStream {
  pub fn into_stream(self) -> Result<Stream> {
    Ok(Stream {
      stream_id:   decode_uuid(&self.stream_id)?,
      stream_type: self.stream_type.parse::<StreamType>()?,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

pub const SNAPSHOT_COLUMNS: &str =
  "snapshot_id, name, description, position, created_at";

/// Raw values read directly from a `snapshots` row.
pub struct RawSnapshot {
  pub snapshot_id: String,
  pub name:        String,
  pub description: Option<String>,
  pub position:    i64,
  pub created_at:  String,
}

impl RawSnapshot {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      snapshot_id: row.get(0)?,
      name:        row.get(1)?,
      description: row.get(2)?,
      position:    row.get(3)?,
      created_at:  row.get(4)?,
    })
  }

  pub fn into_snapshot(self) -> Result<Snapshot> {
    Ok(Snapshot {
      snapshot_id: decode_uuid(&self.snapshot_id)?,
      name:        self.name,
      description: self.description,
      position:    self.position,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

pub const EDGE_COLUMNS: &str = "person_id, family_id, father_id, father_name, \
                                mother_id, mother_name, updated_at";

/// Raw strings read directly from a `pedigree_edges` row.
pub struct RawEdge {
  pub person_id:   String,
  pub family_id:   Option<String>,
  pub father_id:   Option<String>,
  pub father_name: Option<String>,
  pub mother_id:   Option<String>,
  pub mother_name: Option<String>,
  pub updated_at:  String,
}

impl RawEdge {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      person_id:   row.get(0)?,
      family_id:   row.get(1)?,
      father_id:   row.get(2)?,
      father_name: row.get(3)?,
      mother_id:   row.get(4)?,
      mother_name: row.get(5)?,
      updated_at:  row.get(6)?,
    })
  }

  pub fn into_edge(self) -> Result<PedigreeEdge> {
    Ok(PedigreeEdge {
      person_id:   decode_uuid(&self.person_id)?,
      family_id:   decode_opt_uuid(self.family_id)?,
      father_id:   decode_opt_uuid(self.father_id)?,
      father_name: self.father_name,
      mother_id:   decode_opt_uuid(self.mother_id)?,
      mother_name: self.mother_name,
      updated_at:  decode_dt(&self.updated_at)?,
    })
  }
}

pub const CHILD_COLUMNS: &str = "family_id, person_id, relationship_to_father, \
                                 relationship_to_mother, sequence, created_at";

/// Raw values read directly from a `family_children` row.
pub struct RawChild {
  pub family_id:              String,
  pub person_id:              String,
  pub relationship_to_father: Option<String>,
  pub relationship_to_mother: Option<String>,
  pub sequence:               Option<i64>,
  pub created_at:             String,
}

impl RawChild {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      family_id:              row.get(0)?,
      person_id:              row.get(1)?,
      relationship_to_father: row.get(2)?,
      relationship_to_mother: row.get(3)?,
      sequence:               row.get(4)?,
      created_at:             row.get(5)?,
    })
  }

  pub fn into_child(self) -> Result<FamilyChild> {
    Ok(FamilyChild {
      family_id:              decode_uuid(&self.family_id)?,
      person_id:              decode_uuid(&self.person_id)?,
      relationship_to_father: self.relationship_to_father,
      relationship_to_mother: self.relationship_to_mother,
      sequence:               self.sequence,
      created_at:             decode_dt(&self.created_at)?,
    })
  }
}
