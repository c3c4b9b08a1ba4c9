//! Domain events and the durable event envelope.
//!
//! A [`DomainEvent`] is an immutable fact about one aggregate. The aggregate
//! is identified by the stream the event is appended to, so payloads never
//! repeat the aggregate id. A [`StoredEvent`] is the envelope the event store
//! persists around the encoded payload.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
  Error, Result, codec,
  model::{
    AssociationData, AttributeData, CitationData, FamilyData, LifeEventData,
    MediaData, NoteData, OrdinanceData, PersonData, PersonNameData, SourceData,
    SubmitterData,
  },
};

// ─── Streams ─────────────────────────────────────────────────────────────────

/// The aggregate type a stream holds the history of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamType {
  Person,
  Family,
  Source,
  Citation,
  Media,
  Event,
  Attribute,
  Note,
  Submitter,
  Association,
  Ordinance,
}

impl StreamType {
  pub const ALL: [StreamType; 11] = [
    Self::Person,
    Self::Family,
    Self::Source,
    Self::Citation,
    Self::Media,
    Self::Event,
    Self::Attribute,
    Self::Note,
    Self::Submitter,
    Self::Association,
    Self::Ordinance,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Person => "Person",
      Self::Family => "Family",
      Self::Source => "Source",
      Self::Citation => "Citation",
      Self::Media => "Media",
      Self::Event => "Event",
      Self::Attribute => "Attribute",
      Self::Note => "Note",
      Self::Submitter => "Submitter",
      Self::Association => "Association",
      Self::Ordinance => "Ordinance",
    }
  }
}

impl fmt::Display for StreamType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for StreamType {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    Self::ALL
      .into_iter()
      .find(|t| t.as_str() == s)
      .ok_or_else(|| Error::UnknownStreamType(s.to_owned()))
  }
}

/// One aggregate's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
  pub stream_id:   Uuid,
  pub stream_type: StreamType,
  pub created_at:  DateTime<Utc>,
}

// ─── Optimistic concurrency ──────────────────────────────────────────────────

/// What the caller believes the stream's current version to be.
///
/// On the wire this is a plain integer: `-1` means [`Self::NoStream`], any
/// other value is [`Self::Exact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ExpectedVersion {
  /// The stream must not have any events yet.
  NoStream,
  /// The stream's current version must be exactly this.
  Exact(i64),
}

impl ExpectedVersion {
  /// Does a stream at `current` satisfy this expectation?
  pub fn matches(self, current: i64) -> bool {
    match self {
      Self::NoStream => current == 0,
      Self::Exact(v) => current == v,
    }
  }
}

impl From<i64> for ExpectedVersion {
  fn from(v: i64) -> Self {
    if v == -1 { Self::NoStream } else { Self::Exact(v) }
  }
}

impl From<ExpectedVersion> for i64 {
  fn from(v: ExpectedVersion) -> Self {
    match v {
      ExpectedVersion::NoStream => -1,
      ExpectedVersion::Exact(v) => v,
    }
  }
}

impl fmt::Display for ExpectedVersion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::NoStream => f.write_str("no stream"),
      Self::Exact(v) => write!(f, "version {v}"),
    }
  }
}

// ─── Payloads ────────────────────────────────────────────────────────────────

/// Partial update: only the fields present in `changes` are modified.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldChanges {
  pub changes: Map<String, Value>,
}

impl FieldChanges {
  pub fn new(changes: Map<String, Value>) -> Self { Self { changes } }

  /// Build from a JSON object literal; non-objects yield an empty change set.
  pub fn from_json(value: Value) -> Self {
    match value {
      Value::Object(changes) => Self { changes },
      _ => Self::default(),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Deletion {
  pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameAdded {
  pub name_id: Uuid,
  pub name:    PersonNameData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameUpdated {
  pub name_id: Uuid,
  pub changes: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameRemoved {
  pub name_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildLinked {
  pub child_id:               Uuid,
  #[serde(default)]
  pub relationship_to_father: Option<String>,
  #[serde(default)]
  pub relationship_to_mother: Option<String>,
  #[serde(default)]
  pub sequence:               Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildUnlinked {
  pub child_id: Uuid,
}

// ─── DomainEvent ─────────────────────────────────────────────────────────────

/// Declares the closed set of event types. Each line registers the variant,
/// its payload, and the stream type it belongs to; the variant name is the
/// persisted type name.
macro_rules! domain_events {
  ($( $variant:ident ( $payload:ty ) on $stream:ident ),* $(,)?) => {
    /// Every fact the system knows how to record.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", content = "data")]
    pub enum DomainEvent {
      $( $variant($payload), )*
    }

    impl DomainEvent {
      /// The type name stored alongside the payload.
      pub fn event_type(&self) -> &'static str {
        match self {
          $( Self::$variant(_) => stringify!($variant), )*
        }
      }

      /// The stream type this event must be appended to.
      pub fn stream_type(&self) -> StreamType {
        match self {
          $( Self::$variant(_) => StreamType::$stream, )*
        }
      }
    }

    /// Registry of every type name the codec can decode.
    pub const EVENT_TYPES: &[&str] = &[ $( stringify!($variant), )* ];
  };
}

domain_events! {
  PersonCreated(PersonData)                  on Person,
  PersonUpdated(FieldChanges)                on Person,
  PersonDeleted(Deletion)                    on Person,
  NameAdded(NameAdded)                       on Person,
  NameUpdated(NameUpdated)                   on Person,
  NameRemoved(NameRemoved)                   on Person,

  FamilyCreated(FamilyData)                  on Family,
  FamilyUpdated(FieldChanges)                on Family,
  FamilyDeleted(Deletion)                    on Family,
  ChildLinkedToFamily(ChildLinked)           on Family,
  ChildUnlinkedFromFamily(ChildUnlinked)     on Family,

  SourceCreated(SourceData)                  on Source,
  SourceUpdated(FieldChanges)                on Source,
  SourceDeleted(Deletion)                    on Source,

  CitationCreated(CitationData)              on Citation,
  CitationUpdated(FieldChanges)              on Citation,
  CitationDeleted(Deletion)                  on Citation,

  MediaCreated(MediaData)                    on Media,
  MediaUpdated(FieldChanges)                 on Media,
  MediaDeleted(Deletion)                     on Media,

  LifeEventCreated(LifeEventData)            on Event,
  LifeEventUpdated(FieldChanges)             on Event,
  LifeEventDeleted(Deletion)                 on Event,

  AttributeCreated(AttributeData)            on Attribute,
  AttributeUpdated(FieldChanges)             on Attribute,
  AttributeDeleted(Deletion)                 on Attribute,

  NoteCreated(NoteData)                      on Note,
  NoteUpdated(FieldChanges)                  on Note,
  NoteDeleted(Deletion)                      on Note,

  SubmitterCreated(SubmitterData)            on Submitter,
  SubmitterUpdated(FieldChanges)             on Submitter,
  SubmitterDeleted(Deletion)                 on Submitter,

  AssociationCreated(AssociationData)        on Association,
  AssociationUpdated(FieldChanges)           on Association,
  AssociationDeleted(Deletion)               on Association,

  OrdinanceCreated(OrdinanceData)            on Ordinance,
  OrdinanceUpdated(FieldChanges)             on Ordinance,
  OrdinanceDeleted(Deletion)                 on Ordinance,
}

/// Input to [`crate::store::EventStore::append`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
  pub event:    DomainEvent,
  #[serde(default)]
  pub metadata: Option<Value>,
}

impl NewEvent {
  pub fn with_metadata(event: DomainEvent, metadata: Value) -> Self {
    Self { event, metadata: Some(metadata) }
  }
}

impl From<DomainEvent> for NewEvent {
  fn from(event: DomainEvent) -> Self { Self { event, metadata: None } }
}

// ─── StoredEvent ─────────────────────────────────────────────────────────────

/// The durable envelope around one encoded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
  pub event_id:    Uuid,
  pub stream_id:   Uuid,
  pub stream_type: StreamType,
  /// 1-based, gapless position within the stream.
  pub version:     i64,
  pub event_type:  String,
  /// Opaque encoded payload; see [`crate::codec`].
  #[serde(with = "payload_json")]
  pub payload:     Vec<u8>,
  pub metadata:    Option<Value>,
  pub recorded_at: DateTime<Utc>,
  /// Gapless, strictly increasing position across all streams.
  pub position:    i64,
}

impl StoredEvent {
  /// Decode the payload back into a typed event.
  pub fn decode(&self) -> Result<DomainEvent> {
    codec::decode(&self.event_type, &self.payload)
  }
}

/// Payloads are JSON bytes; show them as embedded JSON rather than a byte
/// array when the envelope itself is serialized.
mod payload_json {
  use serde::{Deserialize, Deserializer, Serialize, Serializer};
  use serde_json::Value;

  pub fn serialize<S: Serializer>(
    bytes: &[u8],
    serializer: S,
  ) -> Result<S::Ok, S::Error> {
    match serde_json::from_slice::<Value>(bytes) {
      Ok(value) => value.serialize(serializer),
      Err(_) => String::from_utf8_lossy(bytes).serialize(serializer),
    }
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(
    deserializer: D,
  ) -> Result<Vec<u8>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    serde_json::to_vec(&value).map_err(serde::de::Error::custom)
  }
}

// ─── Log queries ─────────────────────────────────────────────────────────────

/// Filtered, paginated read over the global log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventQuery {
  /// Only events with a position strictly greater than this.
  pub after_position: i64,
  /// Page size; `0` means [`EventQuery::DEFAULT_LIMIT`]. Capped at
  /// [`EventQuery::MAX_LIMIT`].
  pub limit:          usize,
  /// Inclusive lower bound on `recorded_at`.
  pub since:          Option<DateTime<Utc>>,
  /// Exclusive upper bound on `recorded_at`.
  pub until:          Option<DateTime<Utc>>,
  /// If non-empty, only these event type names.
  pub event_types:    Vec<String>,
  pub stream_type:    Option<StreamType>,
}

impl EventQuery {
  pub const DEFAULT_LIMIT: usize = 100;
  pub const MAX_LIMIT: usize = 1000;

  pub fn effective_limit(&self) -> usize {
    match self.limit {
      0 => Self::DEFAULT_LIMIT,
      n => n.min(Self::MAX_LIMIT),
    }
  }
}

/// One page of a filtered log read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPage {
  pub events:      Vec<StoredEvent>,
  /// Number of events matching the filters, irrespective of the cursor.
  pub total_count: i64,
  /// Whether more matching events follow this page.
  pub has_more:    bool,
}
