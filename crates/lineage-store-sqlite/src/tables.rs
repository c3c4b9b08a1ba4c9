//! Read-model table catalogue and the generic row ⇄ [`Record`] bridge.
//!
//! Every entity kind maps to one table whose columns are the bookkeeping
//! columns (`id`, `version`, `created_at`, `updated_at`) followed by one
//! column per field of the kind's data struct, in [`TableSpec::columns`]
//! order. Rows are converted through `serde_json::Value`, so the data structs
//! need no SQL-specific code.

use lineage_core::{
  Error as CoreError,
  model::{EntityData, EntityKind, Record},
};
use rusqlite::types::Value as SqlValue;
use serde_json::{Map, Value};

use crate::{
  Error, Result,
  encode::{decode_dt, decode_uuid, encode_dt, encode_uuid},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
  /// Strings, UUIDs and unit enums.
  Text,
  Integer,
  /// Stored as `0` / `1`.
  Bool,
}

use ColumnType::{Bool, Integer, Text};

/// Columns every read-model table starts with.
pub const BOOKKEEPING: [&str; 4] = ["id", "version", "created_at", "updated_at"];

#[derive(Debug)]
pub struct TableSpec {
  pub kind:         EntityKind,
  pub table:        &'static str,
  /// Data columns, in select order after [`BOOKKEEPING`].
  pub columns:      &'static [(&'static str, ColumnType)],
  pub default_sort: &'static str,
  /// Columns callers may sort by, besides the bookkeeping ones.
  pub sortable:     &'static [&'static str],
  /// Foreign-id columns usable with `list_related`.
  pub relations:    &'static [&'static str],
  /// Columns searched by `search_text`.
  pub text:         &'static [&'static str],
  /// Column matched by the `status` list filter, if the kind has one.
  pub status:       Option<&'static str>,
}

// ─── Catalogue ───────────────────────────────────────────────────────────────

pub static PERSONS: TableSpec = TableSpec {
  kind:         EntityKind::Person,
  table:        "persons",
  columns:      &[
    ("given_name", Text),
    ("surname", Text),
    ("name_prefix", Text),
    ("name_suffix", Text),
    ("nickname", Text),
    ("gender", Text),
    ("birth_date", Text),
    ("birth_place", Text),
    ("death_date", Text),
    ("death_place", Text),
    ("notes", Text),
    ("research_status", Text),
    ("full_name", Text),
    ("birth_sort", Integer),
    ("death_sort", Integer),
  ],
  default_sort: "full_name",
  sortable:     &[
    "full_name",
    "given_name",
    "surname",
    "birth_sort",
    "death_sort",
    "gender",
  ],
  relations:    &[],
  text:         &["full_name", "nickname", "birth_place", "death_place", "notes"],
  status:       Some("research_status"),
};

pub static PERSON_NAMES: TableSpec = TableSpec {
  kind:         EntityKind::PersonName,
  table:        "person_names",
  columns:      &[
    ("person_id", Text),
    ("given_name", Text),
    ("surname", Text),
    ("prefix", Text),
    ("suffix", Text),
    ("nickname", Text),
    ("name_type", Text),
    ("is_primary", Bool),
    ("full_name", Text),
    ("soundex_given", Text),
    ("soundex_surname", Text),
  ],
  default_sort: "full_name",
  sortable:     &["full_name", "surname", "name_type"],
  relations:    &["person_id"],
  text:         &["full_name", "nickname"],
  status:       None,
};

pub static FAMILIES: TableSpec = TableSpec {
  kind:         EntityKind::Family,
  table:        "families",
  columns:      &[
    ("partner1_id", Text),
    ("partner2_id", Text),
    ("relationship_type", Text),
    ("marriage_date", Text),
    ("marriage_place", Text),
    ("divorce_date", Text),
    ("notes", Text),
    ("partner1_name", Text),
    ("partner2_name", Text),
    ("child_count", Integer),
    ("marriage_sort", Integer),
  ],
  default_sort: "marriage_sort",
  sortable:     &["marriage_sort", "partner1_name", "partner2_name", "child_count"],
  relations:    &["partner1_id", "partner2_id"],
  text:         &["partner1_name", "partner2_name", "marriage_place", "notes"],
  status:       None,
};

pub static SOURCES: TableSpec = TableSpec {
  kind:         EntityKind::Source,
  table:        "sources",
  columns:      &[
    ("title", Text),
    ("author", Text),
    ("publisher", Text),
    ("publication_date", Text),
    ("repository", Text),
    ("call_number", Text),
    ("notes", Text),
  ],
  default_sort: "title",
  sortable:     &["title", "author", "publisher", "repository"],
  relations:    &[],
  text:         &["title", "author", "publisher", "repository", "notes"],
  status:       None,
};

pub static CITATIONS: TableSpec = TableSpec {
  kind:         EntityKind::Citation,
  table:        "citations",
  columns:      &[
    ("source_id", Text),
    ("person_id", Text),
    ("family_id", Text),
    ("life_event_id", Text),
    ("page", Text),
    ("quality", Integer),
    ("text", Text),
  ],
  default_sort: "created_at",
  sortable:     &["page", "quality"],
  relations:    &["source_id", "person_id", "family_id", "life_event_id"],
  text:         &["page", "text"],
  status:       None,
};

pub static MEDIA: TableSpec = TableSpec {
  kind:         EntityKind::Media,
  table:        "media",
  columns:      &[
    ("person_id", Text),
    ("family_id", Text),
    ("source_id", Text),
    ("file_path", Text),
    ("mime_type", Text),
    ("title", Text),
    ("description", Text),
    ("file_size", Integer),
  ],
  default_sort: "title",
  sortable:     &["title", "file_path", "mime_type", "file_size"],
  relations:    &["person_id", "family_id", "source_id"],
  text:         &["title", "description", "file_path"],
  status:       None,
};

pub static LIFE_EVENTS: TableSpec = TableSpec {
  kind:         EntityKind::LifeEvent,
  table:        "life_events",
  columns:      &[
    ("person_id", Text),
    ("family_id", Text),
    ("event_type", Text),
    ("date", Text),
    ("place", Text),
    ("description", Text),
    ("date_sort", Integer),
  ],
  default_sort: "date_sort",
  sortable:     &["date_sort", "event_type", "place"],
  relations:    &["person_id", "family_id"],
  text:         &["event_type", "place", "description"],
  status:       None,
};

pub static ATTRIBUTES: TableSpec = TableSpec {
  kind:         EntityKind::Attribute,
  table:        "attributes",
  columns:      &[
    ("person_id", Text),
    ("attribute_type", Text),
    ("value", Text),
    ("date", Text),
    ("place", Text),
  ],
  default_sort: "attribute_type",
  sortable:     &["attribute_type", "value"],
  relations:    &["person_id"],
  text:         &["attribute_type", "value", "place"],
  status:       None,
};

pub static NOTES: TableSpec = TableSpec {
  kind:         EntityKind::Note,
  table:        "notes",
  columns:      &[
    ("person_id", Text),
    ("family_id", Text),
    ("source_id", Text),
    ("text", Text),
  ],
  default_sort: "created_at",
  sortable:     &[],
  relations:    &["person_id", "family_id", "source_id"],
  text:         &["text"],
  status:       None,
};

pub static SUBMITTERS: TableSpec = TableSpec {
  kind:         EntityKind::Submitter,
  table:        "submitters",
  columns:      &[
    ("name", Text),
    ("address", Text),
    ("email", Text),
    ("phone", Text),
    ("notes", Text),
  ],
  default_sort: "name",
  sortable:     &["name", "email"],
  relations:    &[],
  text:         &["name", "address", "email", "notes"],
  status:       None,
};

pub static ASSOCIATIONS: TableSpec = TableSpec {
  kind:         EntityKind::Association,
  table:        "associations",
  columns:      &[
    ("person_id", Text),
    ("associate_id", Text),
    ("role", Text),
    ("notes", Text),
  ],
  default_sort: "role",
  sortable:     &["role"],
  relations:    &["person_id", "associate_id"],
  text:         &["role", "notes"],
  status:       None,
};

pub static ORDINANCES: TableSpec = TableSpec {
  kind:         EntityKind::Ordinance,
  table:        "ordinances",
  columns:      &[
    ("person_id", Text),
    ("family_id", Text),
    ("ordinance_type", Text),
    ("date", Text),
    ("temple", Text),
    ("place", Text),
    ("status", Text),
  ],
  default_sort: "ordinance_type",
  sortable:     &["ordinance_type", "temple", "status"],
  relations:    &["person_id", "family_id"],
  text:         &["ordinance_type", "temple", "place"],
  status:       Some("status"),
};

/// Every table spec, for schema checks.
#[cfg(test)]
pub static ALL: [&TableSpec; 12] = [
  &PERSONS,
  &PERSON_NAMES,
  &FAMILIES,
  &SOURCES,
  &CITATIONS,
  &MEDIA,
  &LIFE_EVENTS,
  &ATTRIBUTES,
  &NOTES,
  &SUBMITTERS,
  &ASSOCIATIONS,
  &ORDINANCES,
];

/// The table holding rows of kind `kind`.
pub fn spec(kind: EntityKind) -> &'static TableSpec {
  match kind {
    EntityKind::Person => &PERSONS,
    EntityKind::PersonName => &PERSON_NAMES,
    EntityKind::Family => &FAMILIES,
    EntityKind::Source => &SOURCES,
    EntityKind::Citation => &CITATIONS,
    EntityKind::Media => &MEDIA,
    EntityKind::LifeEvent => &LIFE_EVENTS,
    EntityKind::Attribute => &ATTRIBUTES,
    EntityKind::Note => &NOTES,
    EntityKind::Submitter => &SUBMITTERS,
    EntityKind::Association => &ASSOCIATIONS,
    EntityKind::Ordinance => &ORDINANCES,
  }
}

// ─── SQL fragments ───────────────────────────────────────────────────────────

impl TableSpec {
  /// Number of selected columns per row.
  pub fn width(&self) -> usize { BOOKKEEPING.len() + self.columns.len() }

  fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
    BOOKKEEPING.into_iter().chain(self.columns.iter().map(|(n, _)| *n))
  }

  /// Comma-separated select list, each column qualified by `alias` if given.
  pub fn select_list(&self, alias: Option<&str>) -> String {
    self
      .column_names()
      .map(|c| match alias {
        Some(a) => format!("{a}.{c}"),
        None => c.to_owned(),
      })
      .collect::<Vec<_>>()
      .join(", ")
  }

  /// `INSERT … ON CONFLICT(id) DO UPDATE` over every column.
  pub fn upsert_sql(&self) -> String {
    let names: Vec<_> = self.column_names().collect();
    let placeholders: Vec<_> =
      (1..=names.len()).map(|i| format!("?{i}")).collect();
    let updates: Vec<_> = names
      .iter()
      .filter(|c| !matches!(**c, "id" | "created_at"))
      .map(|c| format!("{c} = excluded.{c}"))
      .collect();
    format!(
      "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT(id) DO UPDATE SET {}",
      self.table,
      names.join(", "),
      placeholders.join(", "),
      updates.join(", "),
    )
  }

  /// Resolve a caller-supplied sort key to a column expression.
  pub fn sort_expr(&self, requested: Option<&str>) -> Result<String> {
    let column = match requested {
      None => self.default_sort,
      Some(c) => BOOKKEEPING
        .into_iter()
        .chain(self.sortable.iter().copied())
        .find(|s| *s == c)
        .ok_or_else(|| {
          CoreError::InvalidQuery(format!(
            "cannot sort {} by {c:?}",
            self.kind
          ))
        })?,
    };
    let is_text = self
      .columns
      .iter()
      .any(|(n, t)| *n == column && *t == Text);
    Ok(if is_text {
      format!("{column} COLLATE NOCASE")
    } else {
      column.to_owned()
    })
  }

  pub fn relation(&self, requested: &str) -> Result<&'static str> {
    self
      .relations
      .iter()
      .copied()
      .find(|r| *r == requested)
      .ok_or_else(|| {
        CoreError::InvalidQuery(format!(
          "{} has no relation {requested:?}",
          self.kind
        ))
        .into()
      })
  }
}

// ─── Record ⇄ row ────────────────────────────────────────────────────────────

/// Parameters for [`TableSpec::upsert_sql`], in column order.
pub fn to_params<D: EntityData>(
  spec: &TableSpec,
  record: &Record<D>,
) -> Result<Vec<SqlValue>> {
  let Value::Object(mut fields) = serde_json::to_value(&record.data)? else {
    return Err(malformed(spec, "data is not a JSON object"));
  };

  let mut params = Vec::with_capacity(spec.width());
  params.push(SqlValue::Text(encode_uuid(record.id)));
  params.push(SqlValue::Integer(record.version));
  params.push(SqlValue::Text(encode_dt(record.created_at)));
  params.push(SqlValue::Text(encode_dt(record.updated_at)));

  for (name, ty) in spec.columns {
    let value = fields.remove(*name).unwrap_or(Value::Null);
    params.push(json_to_sql(spec, name, *ty, value)?);
  }
  Ok(params)
}

/// Read `spec.width()` raw values starting at column `offset`.
pub fn read_values(
  spec: &TableSpec,
  row: &rusqlite::Row<'_>,
  offset: usize,
) -> rusqlite::Result<Vec<SqlValue>> {
  (offset..offset + spec.width()).map(|i| row.get(i)).collect()
}

/// Rebuild a record from values produced by [`read_values`].
pub fn from_values<D: EntityData>(
  spec: &TableSpec,
  values: Vec<SqlValue>,
) -> Result<Record<D>> {
  if values.len() != spec.width() {
    return Err(malformed(spec, "unexpected column count"));
  }
  let mut values = values.into_iter();
  let mut next = || values.next().unwrap_or(SqlValue::Null);

  let SqlValue::Text(id) = next() else {
    return Err(malformed(spec, "id is not text"));
  };
  let SqlValue::Integer(version) = next() else {
    return Err(malformed(spec, "version is not an integer"));
  };
  let (SqlValue::Text(created_at), SqlValue::Text(updated_at)) = (next(), next())
  else {
    return Err(malformed(spec, "timestamps are not text"));
  };

  let mut fields = Map::new();
  for (name, ty) in spec.columns {
    fields.insert((*name).to_owned(), sql_to_json(spec, name, *ty, next())?);
  }
  let data: D = serde_json::from_value(Value::Object(fields))?;

  Ok(Record {
    id: decode_uuid(&id)?,
    data,
    version,
    created_at: decode_dt(&created_at)?,
    updated_at: decode_dt(&updated_at)?,
  })
}

fn json_to_sql(
  spec: &TableSpec,
  column: &str,
  ty: ColumnType,
  value: Value,
) -> Result<SqlValue> {
  Ok(match (ty, value) {
    (_, Value::Null) => SqlValue::Null,
    (Text, Value::String(s)) => SqlValue::Text(s),
    (Integer, Value::Number(n)) => match n.as_i64() {
      Some(i) => SqlValue::Integer(i),
      None => return Err(malformed(spec, &format!("{column} is not an i64"))),
    },
    (Bool, Value::Bool(b)) => SqlValue::Integer(i64::from(b)),
    (ty, other) => {
      return Err(malformed(
        spec,
        &format!("{column}: cannot store {other} as {ty:?}"),
      ));
    }
  })
}

fn sql_to_json(
  spec: &TableSpec,
  column: &str,
  ty: ColumnType,
  value: SqlValue,
) -> Result<Value> {
  Ok(match (ty, value) {
    (_, SqlValue::Null) => Value::Null,
    (Text, SqlValue::Text(s)) => Value::String(s),
    (Integer, SqlValue::Integer(i)) => Value::from(i),
    (Bool, SqlValue::Integer(i)) => Value::Bool(i != 0),
    (ty, other) => {
      return Err(malformed(
        spec,
        &format!("{column}: unexpected {:?} for {ty:?}", other.data_type()),
      ));
    }
  })
}

fn malformed(spec: &TableSpec, reason: &str) -> Error {
  Error::MalformedRow { table: spec.table, reason: reason.to_owned() }
}

/// Keys the data struct `D` serializes, for checking the catalogue.
#[cfg(test)]
pub fn data_keys<D: EntityData>() -> Vec<String> {
  match serde_json::to_value(D::default()) {
    Ok(Value::Object(map)) => map.keys().cloned().collect(),
    _ => Vec::new(),
  }
}
