//! Read-model row types.
//!
//! Every row is derived from the event log and can be thrown away and rebuilt
//! by replaying it. A row is a [`Record`]: the identity and bookkeeping every
//! kind shares, wrapped around a kind-specific data struct implementing
//! [`EntityData`]. The data structs double as the payloads of the
//! corresponding `…Created` events.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{Error, Result, date, similarity::soundex};

// ─── Kinds ───────────────────────────────────────────────────────────────────

/// The entity kinds held in the read model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
  Person,
  PersonName,
  Family,
  Source,
  Citation,
  Media,
  LifeEvent,
  Attribute,
  Note,
  Submitter,
  Association,
  Ordinance,
}

impl EntityKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Person => "person",
      Self::PersonName => "person_name",
      Self::Family => "family",
      Self::Source => "source",
      Self::Citation => "citation",
      Self::Media => "media",
      Self::LifeEvent => "life_event",
      Self::Attribute => "attribute",
      Self::Note => "note",
      Self::Submitter => "submitter",
      Self::Association => "association",
      Self::Ordinance => "ordinance",
    }
  }
}

impl fmt::Display for EntityKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// Kind-specific row content.
pub trait EntityData:
  Serialize + DeserializeOwned + Clone + Default + Send + Sync + 'static
{
  const KIND: EntityKind;

  /// Fields maintained by the projection engine. Change maps cannot set them.
  const DERIVED: &'static [&'static str] = &[];

  /// Recompute the [`Self::DERIVED`] fields that depend only on this row.
  fn derive(&mut self) {}
}

/// A read-model row: identity, bookkeeping and the kind-specific data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<D> {
  pub id:         Uuid,
  #[serde(flatten)]
  pub data:       D,
  /// Stream version of the last event applied to this row.
  pub version:    i64,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl<D: EntityData> Record<D> {
  /// A fresh row as produced by a `…Created` event.
  pub fn new(id: Uuid, mut data: D, version: i64, at: DateTime<Utc>) -> Self {
    data.derive();
    Self { id, data, version, created_at: at, updated_at: at }
  }

  /// Mark the row as touched by the event at `version`.
  pub fn touch(&mut self, version: i64, at: DateTime<Utc>) {
    self.version = version;
    self.updated_at = at;
  }
}

pub type Person = Record<PersonData>;
pub type PersonName = Record<PersonNameData>;
pub type Family = Record<FamilyData>;
pub type Source = Record<SourceData>;
pub type Citation = Record<CitationData>;
pub type Media = Record<MediaData>;
pub type LifeEvent = Record<LifeEventData>;
pub type Attribute = Record<AttributeData>;
pub type Note = Record<NoteData>;
pub type Submitter = Record<SubmitterData>;
pub type Association = Record<AssociationData>;
pub type Ordinance = Record<OrdinanceData>;

// ─── Change maps ─────────────────────────────────────────────────────────────

/// Apply a partial field-change map to `data`.
///
/// Only keys naming an existing, non-derived field are applied; the rest are
/// returned so the caller can report them. Derived fields are recomputed
/// afterwards.
pub fn apply_changes<D: EntityData>(
  data: &D,
  changes: &Map<String, Value>,
) -> Result<(D, Vec<String>)> {
  let Value::Object(mut fields) = serde_json::to_value(data).map_err(|e| {
    Error::InvalidChange { field: String::new(), reason: e.to_string() }
  })?
  else {
    return Err(Error::InvalidChange {
      field:  String::new(),
      reason: format!("{} data is not a JSON object", D::KIND),
    });
  };

  let mut ignored = Vec::new();
  for (field, value) in changes {
    if D::DERIVED.contains(&field.as_str()) || !fields.contains_key(field) {
      ignored.push(field.clone());
      continue;
    }

    // Validate each field on its own so a bad value names its field.
    let mut trial = fields.clone();
    trial.insert(field.clone(), value.clone());
    if let Err(e) = serde_json::from_value::<D>(Value::Object(trial)) {
      return Err(Error::InvalidChange {
        field:  field.clone(),
        reason: e.to_string(),
      });
    }
    fields.insert(field.clone(), value.clone());
  }

  let mut patched: D =
    serde_json::from_value(Value::Object(fields)).map_err(|e| {
      Error::InvalidChange { field: String::new(), reason: e.to_string() }
    })?;
  patched.derive();
  Ok((patched, ignored))
}

/// Does the change map touch any of `fields`?
pub fn touches(changes: &Map<String, Value>, fields: &[&str]) -> bool {
  fields.iter().any(|f| changes.contains_key(*f))
}

// ─── Names ───────────────────────────────────────────────────────────────────

/// Join the non-empty parts of a personal name with single spaces.
pub fn display_name(parts: &[Option<&str>]) -> String {
  parts
    .iter()
    .flatten()
    .map(|p| p.trim())
    .filter(|p| !p.is_empty())
    .collect::<Vec<_>>()
    .join(" ")
}

// ─── Person ──────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
  Male,
  Female,
  #[default]
  Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonData {
  pub given_name:      Option<String>,
  pub surname:         Option<String>,
  pub name_prefix:     Option<String>,
  pub name_suffix:     Option<String>,
  pub nickname:        Option<String>,
  pub gender:          Gender,
  /// Free-form genealogical date, e.g. `ABT 12 MAR 1850`.
  pub birth_date:      Option<String>,
  pub birth_place:     Option<String>,
  pub death_date:      Option<String>,
  pub death_place:     Option<String>,
  pub notes:           Option<String>,
  /// Research workflow status; the `status` filter of person listings.
  pub research_status: Option<String>,

  pub full_name:       String,
  /// `yyyymmdd` sort key parsed from `birth_date`.
  pub birth_sort:      Option<i64>,
  pub death_sort:      Option<i64>,
}

impl EntityData for PersonData {
  const KIND: EntityKind = EntityKind::Person;
  const DERIVED: &'static [&'static str] =
    &["full_name", "birth_sort", "death_sort"];

  fn derive(&mut self) {
    self.full_name = display_name(&[
      self.name_prefix.as_deref(),
      self.given_name.as_deref(),
      self.surname.as_deref(),
      self.name_suffix.as_deref(),
    ]);
    self.birth_sort = self.birth_date.as_deref().and_then(date::sort_key);
    self.death_sort = self.death_date.as_deref().and_then(date::sort_key);
  }
}

impl PersonData {
  /// Fields mirrored into the primary [`PersonNameData`] row.
  pub const NAME_FIELDS: &'static [&'static str] =
    &["given_name", "surname", "name_prefix", "name_suffix", "nickname"];

  /// The primary name variant for this person.
  pub fn primary_name(&self, person_id: Uuid) -> PersonNameData {
    let mut name = PersonNameData {
      person_id,
      given_name: self.given_name.clone(),
      surname: self.surname.clone(),
      prefix: self.name_prefix.clone(),
      suffix: self.name_suffix.clone(),
      nickname: self.nickname.clone(),
      name_type: Some("birth".to_owned()),
      is_primary: true,
      ..Default::default()
    };
    name.derive();
    name
  }

  /// Copy a (primary) name variant's parts into this person.
  pub fn adopt_name(&mut self, name: &PersonNameData) {
    self.given_name = name.given_name.clone();
    self.surname = name.surname.clone();
    self.name_prefix = name.prefix.clone();
    self.name_suffix = name.suffix.clone();
    self.nickname = name.nickname.clone();
    self.derive();
  }
}

/// One name a person is known by. Every person has exactly one primary name;
/// the name created with the person shares the person's id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonNameData {
  pub person_id:       Uuid,
  pub given_name:      Option<String>,
  pub surname:         Option<String>,
  pub prefix:          Option<String>,
  pub suffix:          Option<String>,
  pub nickname:        Option<String>,
  /// `birth`, `married`, `aka`, ...
  pub name_type:       Option<String>,
  pub is_primary:      bool,

  pub full_name:       String,
  pub soundex_given:   Option<String>,
  pub soundex_surname: Option<String>,
}

impl EntityData for PersonNameData {
  const KIND: EntityKind = EntityKind::PersonName;
  const DERIVED: &'static [&'static str] =
    &["person_id", "full_name", "soundex_given", "soundex_surname"];

  fn derive(&mut self) {
    self.full_name = display_name(&[
      self.prefix.as_deref(),
      self.given_name.as_deref(),
      self.surname.as_deref(),
      self.suffix.as_deref(),
    ]);
    self.soundex_given = self.given_name.as_deref().and_then(soundex);
    self.soundex_surname = self.surname.as_deref().and_then(soundex);
  }
}

// ─── Family ──────────────────────────────────────────────────────────────────

/// A couple and their children. Partner 1 is treated as the father and
/// partner 2 as the mother in pedigree edges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FamilyData {
  pub partner1_id:       Option<Uuid>,
  pub partner2_id:       Option<Uuid>,
  pub relationship_type: Option<String>,
  pub marriage_date:     Option<String>,
  pub marriage_place:    Option<String>,
  pub divorce_date:      Option<String>,
  pub notes:             Option<String>,

  pub partner1_name:     Option<String>,
  pub partner2_name:     Option<String>,
  pub child_count:       i64,
  pub marriage_sort:     Option<i64>,
}

impl EntityData for FamilyData {
  const KIND: EntityKind = EntityKind::Family;
  const DERIVED: &'static [&'static str] =
    &["partner1_name", "partner2_name", "child_count", "marriage_sort"];

  fn derive(&mut self) {
    self.marriage_sort = self.marriage_date.as_deref().and_then(date::sort_key);
  }
}

impl FamilyData {
  pub const PARTNER_FIELDS: &'static [&'static str] =
    &["partner1_id", "partner2_id"];
}

/// Link between a family and one of its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyChild {
  pub family_id:              Uuid,
  pub person_id:              Uuid,
  /// `birth`, `adopted`, `foster`, ...
  pub relationship_to_father: Option<String>,
  pub relationship_to_mother: Option<String>,
  pub sequence:               Option<i64>,
  pub created_at:             DateTime<Utc>,
}

// ─── Sources & evidence ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceData {
  pub title:            String,
  pub author:           Option<String>,
  pub publisher:        Option<String>,
  pub publication_date: Option<String>,
  pub repository:       Option<String>,
  pub call_number:      Option<String>,
  pub notes:            Option<String>,
}

impl EntityData for SourceData {
  const KIND: EntityKind = EntityKind::Source;
}

/// A pointer from a fact to the place in a source that supports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CitationData {
  pub source_id:     Uuid,
  pub person_id:     Option<Uuid>,
  pub family_id:     Option<Uuid>,
  pub life_event_id: Option<Uuid>,
  pub page:          Option<String>,
  /// GEDCOM `QUAY`: 0 (unreliable) to 3 (primary evidence).
  pub quality:       Option<i64>,
  pub text:          Option<String>,
}

impl EntityData for CitationData {
  const KIND: EntityKind = EntityKind::Citation;
}

/// A file on disk; no binary data lives in the read model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaData {
  pub person_id:   Option<Uuid>,
  pub family_id:   Option<Uuid>,
  pub source_id:   Option<Uuid>,
  pub file_path:   String,
  pub mime_type:   Option<String>,
  pub title:       Option<String>,
  pub description: Option<String>,
  pub file_size:   Option<i64>,
}

impl EntityData for MediaData {
  const KIND: EntityKind = EntityKind::Media;
}

// ─── Facts about people ──────────────────────────────────────────────────────

/// A dated happening in a person's or family's life (birth, baptism,
/// census, emigration, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifeEventData {
  pub person_id:   Option<Uuid>,
  pub family_id:   Option<Uuid>,
  pub event_type:  String,
  pub date:        Option<String>,
  pub place:       Option<String>,
  pub description: Option<String>,

  pub date_sort:   Option<i64>,
}

impl EntityData for LifeEventData {
  const KIND: EntityKind = EntityKind::LifeEvent;
  const DERIVED: &'static [&'static str] = &["date_sort"];

  fn derive(&mut self) {
    self.date_sort = self.date.as_deref().and_then(date::sort_key);
  }
}

/// An undated or loosely dated characteristic (occupation, religion, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeData {
  pub person_id:      Uuid,
  pub attribute_type: String,
  pub value:          String,
  pub date:           Option<String>,
  pub place:          Option<String>,
}

impl EntityData for AttributeData {
  const KIND: EntityKind = EntityKind::Attribute;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteData {
  pub person_id: Option<Uuid>,
  pub family_id: Option<Uuid>,
  pub source_id: Option<Uuid>,
  pub text:      String,
}

impl EntityData for NoteData {
  const KIND: EntityKind = EntityKind::Note;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitterData {
  pub name:    String,
  pub address: Option<String>,
  pub email:   Option<String>,
  pub phone:   Option<String>,
  pub notes:   Option<String>,
}

impl EntityData for SubmitterData {
  const KIND: EntityKind = EntityKind::Submitter;
}

/// A non-family relationship between two people (godparent, witness, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssociationData {
  pub person_id:    Uuid,
  pub associate_id: Uuid,
  pub role:         String,
  pub notes:        Option<String>,
}

impl EntityData for AssociationData {
  const KIND: EntityKind = EntityKind::Association;
}

/// An LDS ordinance record (baptism, endowment, sealing, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrdinanceData {
  pub person_id:      Option<Uuid>,
  pub family_id:      Option<Uuid>,
  pub ordinance_type: String,
  pub date:           Option<String>,
  pub temple:         Option<String>,
  pub place:          Option<String>,
  pub status:         Option<String>,
}

impl EntityData for OrdinanceData {
  const KIND: EntityKind = EntityKind::Ordinance;
}
