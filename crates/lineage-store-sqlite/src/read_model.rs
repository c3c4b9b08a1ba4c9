//! Read-model queries, and the row helpers the projection engine writes
//! through.

use lineage_core::{
  Error as CoreError,
  aggregate::{self, LetterCount, PlaceNode, SurnameCount, SurnameIndex},
  model::{EntityData, EntityKind, FamilyChild, PersonData, PersonNameData, Record},
  pedigree::{AncestorNode, PedigreeEdge, walk_ancestors},
  search::{self, NameCandidate, PersonHit, SearchMode, SearchQuery},
  similarity::soundex_codes,
  store::{ListOptions, Page, ReadModelStore, SortOrder},
};
use rusqlite::{Connection, OptionalExtension as _, types::Value as SqlValue};
use uuid::Uuid;

use crate::{
  Result, SqliteStore,
  encode::{CHILD_COLUMNS, EDGE_COLUMNS, RawChild, RawEdge, encode_uuid},
  tables::{self, TableSpec, from_values, read_values, to_params},
};

// ─── Row helpers ─────────────────────────────────────────────────────────────

fn select_sql(spec: &TableSpec) -> String {
  format!("SELECT {} FROM {}", spec.select_list(None), spec.table)
}

fn query_records<D: EntityData, P: rusqlite::Params>(
  conn: &Connection,
  spec: &TableSpec,
  sql: &str,
  params: P,
) -> Result<Vec<Record<D>>> {
  let mut stmt = conn.prepare(sql)?;
  let rows = stmt
    .query_map(params, |row| read_values(spec, row, 0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  rows.into_iter().map(|v| from_values(spec, v)).collect()
}

pub(crate) fn load<D: EntityData>(
  conn: &Connection,
  id: Uuid,
) -> Result<Option<Record<D>>> {
  let spec = tables::spec(D::KIND);
  let values = conn
    .query_row(
      &format!("{} WHERE id = ?1", select_sql(spec)),
      [encode_uuid(id)],
      |row| read_values(spec, row, 0),
    )
    .optional()?;
  values.map(|v| from_values(spec, v)).transpose()
}

/// Rows whose `column` holds `id`, in the kind's default order.
pub(crate) fn load_where<D: EntityData>(
  conn: &Connection,
  column: &str,
  id: Uuid,
) -> Result<Vec<Record<D>>> {
  let spec = tables::spec(D::KIND);
  let sql = format!(
    "{} WHERE {column} = ?1 ORDER BY {}, id",
    select_sql(spec),
    spec.sort_expr(None)?,
  );
  query_records(conn, spec, &sql, [encode_uuid(id)])
}

pub(crate) fn upsert<D: EntityData>(
  conn: &Connection,
  record: &Record<D>,
) -> Result<()> {
  let spec = tables::spec(D::KIND);
  let params = to_params(spec, record)?;
  conn
    .prepare_cached(&spec.upsert_sql())?
    .execute(rusqlite::params_from_iter(params))?;
  Ok(())
}

pub(crate) fn remove<D: EntityData>(conn: &Connection, id: Uuid) -> Result<bool> {
  let spec = tables::spec(D::KIND);
  let n = conn.execute(
    &format!("DELETE FROM {} WHERE id = ?1", spec.table),
    [encode_uuid(id)],
  )?;
  Ok(n > 0)
}

pub(crate) fn remove_where(
  conn: &Connection,
  table: &str,
  column: &str,
  id: Uuid,
) -> Result<usize> {
  Ok(conn.execute(
    &format!("DELETE FROM {table} WHERE {column} = ?1"),
    [encode_uuid(id)],
  )?)
}

/// Mirror a person row written outside the log into its primary name
/// variant, which search reads. A primary variant under another id (set by
/// `NameAdded`) is left alone.
fn sync_saved_person_name(conn: &Connection, person_id: Uuid) -> Result<()> {
  let Some(person) = load::<PersonData>(conn, person_id)? else {
    return Ok(());
  };
  let id = encode_uuid(person_id);
  let other_primary: bool = conn.query_row(
    "SELECT EXISTS (SELECT 1 FROM person_names
                    WHERE person_id = ?1 AND id <> ?1 AND is_primary = 1)",
    [&id],
    |r| r.get(0),
  )?;
  if other_primary {
    return Ok(());
  }

  let mut name = Record::new(
    person_id,
    person.data.primary_name(person_id),
    person.version,
    person.created_at,
  );
  name.updated_at = person.updated_at;
  upsert(conn, &name)
}

/// Display name of a person, if they exist and have one.
pub(crate) fn person_name(conn: &Connection, person_id: Uuid) -> Result<Option<String>> {
  let name: Option<String> = conn
    .query_row(
      "SELECT full_name FROM persons WHERE id = ?1",
      [encode_uuid(person_id)],
      |r| r.get(0),
    )
    .optional()?;
  Ok(name.filter(|n| !n.is_empty()))
}

/// `%text%` with LIKE wildcards in `text` escaped by `\`.
fn like_pattern(text: &str) -> String {
  let mut escaped = String::with_capacity(text.len() + 2);
  escaped.push('%');
  for c in text.chars() {
    if matches!(c, '%' | '_' | '\\') {
      escaped.push('\\');
    }
    escaped.push(c);
  }
  escaped.push('%');
  escaped
}

/// Incrementally built `WHERE` clause with numbered parameters.
#[derive(Default)]
struct Filter {
  conds:  Vec<String>,
  params: Vec<SqlValue>,
}

impl Filter {
  /// Register `value` and return its placeholder.
  fn bind(&mut self, value: SqlValue) -> String {
    self.params.push(value);
    format!("?{}", self.params.len())
  }

  fn and(&mut self, cond: String) { self.conds.push(cond); }

  fn sql(&self) -> String {
    if self.conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", self.conds.join(" AND "))
    }
  }
}

// ─── Listings ────────────────────────────────────────────────────────────────

fn list_page<D: EntityData>(
  conn: &Connection,
  options: &ListOptions,
) -> Result<Page<Record<D>>> {
  let spec = tables::spec(D::KIND);
  let order = spec.sort_expr(options.sort.as_deref())?;
  let direction = match options.order {
    SortOrder::Asc => "ASC",
    SortOrder::Desc => "DESC",
  };

  let mut filter = Filter::default();
  match (options.status.as_deref(), spec.status) {
    (None, _) => {}
    (Some(status), Some(column)) => {
      let slot = filter.bind(SqlValue::Text(status.to_owned()));
      filter.and(format!("{column} = {slot}"));
    }
    (Some(_), None) => {
      return Err(
        CoreError::InvalidQuery(format!("{} has no status to filter by", spec.kind))
          .into(),
      );
    }
  }

  let total: i64 = conn.query_row(
    &format!("SELECT COUNT(*) FROM {} {}", spec.table, filter.sql()),
    rusqlite::params_from_iter(filter.params.iter()),
    |r| r.get(0),
  )?;

  let limit = options.effective_limit();
  let where_sql = filter.sql();
  let limit_slot = filter.bind(SqlValue::Integer(limit as i64));
  let offset = i64::try_from(options.offset).unwrap_or(i64::MAX);
  let offset_slot = filter.bind(SqlValue::Integer(offset));
  let sql = format!(
    "{} {where_sql} ORDER BY {order} {direction}, id LIMIT {limit_slot} OFFSET \
     {offset_slot}",
    select_sql(spec),
  );
  let items = query_records(
    conn,
    spec,
    &sql,
    rusqlite::params_from_iter(filter.params.iter()),
  )?;

  Ok(Page { items, total, limit, offset: options.offset })
}

fn text_matches<D: EntityData>(
  conn: &Connection,
  text: &str,
  limit: usize,
) -> Result<Vec<Record<D>>> {
  let spec = tables::spec(D::KIND);
  let text = text.trim();
  if text.is_empty() || spec.text.is_empty() {
    return Ok(Vec::new());
  }

  let any = spec
    .text
    .iter()
    .map(|c| format!("{c} LIKE ?1 ESCAPE '\\'"))
    .collect::<Vec<_>>()
    .join(" OR ");
  let sql = format!(
    "{} WHERE {any} ORDER BY {}, id LIMIT ?2",
    select_sql(spec),
    spec.sort_expr(None)?,
  );
  let limit = match limit {
    0 => ListOptions::DEFAULT_LIMIT,
    n => n.min(ListOptions::MAX_LIMIT),
  };
  query_records(
    conn,
    spec,
    &sql,
    rusqlite::params![like_pattern(text), limit as i64],
  )
}

// ─── Person search ───────────────────────────────────────────────────────────

/// Earliest birth/death sort key of `year + offset`.
fn year_bound(year: i64, offset: i64) -> Result<i64> {
  const LIMIT: i64 = 9999;
  if !(-LIMIT..=LIMIT).contains(&year) {
    return Err(
      CoreError::InvalidQuery(format!("year {year} is out of range")).into(),
    );
  }
  Ok((year + offset) * 10_000)
}

/// Name variants (with their person) that pass the structured filters and
/// the text pre-filter of the query's mode. Scoring happens in
/// [`search::rank`].
fn person_candidates(
  conn: &Connection,
  query: &SearchQuery,
) -> Result<Vec<NameCandidate>> {
  let names = &tables::PERSON_NAMES;
  let persons = &tables::PERSONS;
  let mut filter = Filter::default();

  let mut year_range =
    |column: &str, min: Option<i64>, max: Option<i64>| -> Result<()> {
      if let Some(min) = min {
        let slot = filter.bind(SqlValue::Integer(year_bound(min, 0)?));
        filter.and(format!("p.{column} >= {slot}"));
      }
      if let Some(max) = max {
        let slot = filter.bind(SqlValue::Integer(year_bound(max, 1)?));
        filter.and(format!("p.{column} < {slot}"));
      }
      Ok(())
    };
  year_range("birth_sort", query.birth_year_min, query.birth_year_max)?;
  year_range("death_sort", query.death_year_min, query.death_year_max)?;

  if let Some(place) = query.place.as_deref().map(str::trim)
    && !place.is_empty()
  {
    let slot = filter.bind(SqlValue::Text(like_pattern(place)));
    filter.and(format!(
      "(p.birth_place LIKE {slot} ESCAPE '\\' OR p.death_place LIKE {slot} \
       ESCAPE '\\')"
    ));
  }

  if let Some(text) = query.text_term() {
    match query.mode {
      // LIKE folds ASCII case only; non-ASCII text is left to scoring.
      SearchMode::Exact if !text.is_ascii() => {}
      SearchMode::Exact => {
        let slot = filter.bind(SqlValue::Text(like_pattern(text)));
        filter.and(format!(
          "(n.full_name LIKE {slot} ESCAPE '\\' OR n.given_name LIKE {slot} \
           ESCAPE '\\' OR n.surname LIKE {slot} ESCAPE '\\')"
        ));
      }
      SearchMode::Phonetic => {
        let codes = soundex_codes(text);
        if codes.is_empty() {
          return Ok(Vec::new());
        }
        let slots: Vec<_> = codes
          .into_iter()
          .map(|c| filter.bind(SqlValue::Text(c)))
          .collect();
        let set = slots.join(", ");
        filter.and(format!(
          "(n.soundex_given IN ({set}) OR n.soundex_surname IN ({set}))"
        ));
      }
      // Similarity needs every name; the filters above still narrow it.
      SearchMode::Fuzzy => {}
    }
  }

  let sql = format!(
    "SELECT {}, {} FROM person_names n JOIN persons p ON p.id = n.person_id {}",
    names.select_list(Some("n")),
    persons.select_list(Some("p")),
    filter.sql(),
  );
  let mut stmt = conn.prepare(&sql)?;
  let rows = stmt
    .query_map(rusqlite::params_from_iter(filter.params.iter()), |row| {
      Ok((read_values(names, row, 0)?, read_values(persons, row, names.width())?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  rows
    .into_iter()
    .map(|(name, person)| {
      Ok(NameCandidate {
        name:   from_values::<PersonNameData>(names, name)?,
        person: from_values::<PersonData>(persons, person)?,
      })
    })
    .collect()
}

// ─── Families & pedigree ─────────────────────────────────────────────────────

fn children_where(
  conn: &Connection,
  column: &str,
  id: Uuid,
) -> Result<Vec<FamilyChild>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {CHILD_COLUMNS} FROM family_children
     WHERE {column} = ?1
     ORDER BY sequence IS NULL, sequence, created_at, family_id, person_id"
  ))?;
  let raws = stmt
    .query_map([encode_uuid(id)], RawChild::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawChild::into_child).collect()
}

fn edge_of(conn: &Connection, person_id: Uuid) -> Result<Option<PedigreeEdge>> {
  conn
    .query_row(
      &format!("SELECT {EDGE_COLUMNS} FROM pedigree_edges WHERE person_id = ?1"),
      [encode_uuid(person_id)],
      RawEdge::from_row,
    )
    .optional()?
    .map(RawEdge::into_edge)
    .transpose()
}

// ─── Aggregations ────────────────────────────────────────────────────────────

const SURNAME: &str = "TRIM(surname)";
const INITIAL: &str = "UPPER(SUBSTR(TRIM(surname), 1, 1))";

fn surnames(conn: &Connection, letter: Option<&str>) -> Result<SurnameIndex> {
  let has_surname = format!("surname IS NOT NULL AND {SURNAME} <> ''");

  let mut stmt = conn.prepare(&format!(
    "SELECT {INITIAL} AS initial, COUNT(*) FROM persons
     WHERE {has_surname}
     GROUP BY initial
     ORDER BY initial"
  ))?;
  let letters = stmt
    .query_map([], |r| Ok(LetterCount { letter: r.get(0)?, count: r.get(1)? }))?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let letter = letter
    .and_then(|l| l.trim().chars().next())
    .map(|c| c.to_uppercase().to_string());
  let mut filter = Filter::default();
  filter.and(has_surname);
  if let Some(letter) = letter {
    let slot = filter.bind(SqlValue::Text(letter));
    filter.and(format!("{INITIAL} = {slot}"));
  }

  let mut stmt = conn.prepare(&format!(
    "SELECT MIN({SURNAME}), COUNT(*) FROM persons
     {}
     GROUP BY LOWER({SURNAME})
     ORDER BY LOWER({SURNAME})",
    filter.sql(),
  ))?;
  let surnames = stmt
    .query_map(rusqlite::params_from_iter(filter.params.iter()), |r| {
      Ok(SurnameCount { surname: r.get(0)?, count: r.get(1)? })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  Ok(SurnameIndex { letters, surnames })
}

/// Every distinct place string in the read model with its reference count.
fn place_counts(conn: &Connection) -> Result<Vec<(String, i64)>> {
  let mut stmt = conn.prepare(
    "SELECT place, COUNT(*) FROM (
       SELECT birth_place    AS place FROM persons
       UNION ALL SELECT death_place    FROM persons
       UNION ALL SELECT place          FROM life_events
       UNION ALL SELECT marriage_place FROM families
     )
     WHERE place IS NOT NULL AND TRIM(place) <> ''
     GROUP BY place",
  )?;
  let rows = stmt
    .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

// ─── ReadModelStore impl ─────────────────────────────────────────────────────

impl ReadModelStore for SqliteStore {
  async fn get<D: EntityData>(&self, id: Uuid) -> Result<Option<Record<D>>> {
    self.read(move |conn| load::<D>(conn, id)).await
  }

  async fn list<D: EntityData>(
    &self,
    options: &ListOptions,
  ) -> Result<Page<Record<D>>> {
    let options = options.clone();
    self.read(move |conn| list_page::<D>(conn, &options)).await
  }

  async fn list_related<D: EntityData>(
    &self,
    relation: &str,
    id: Uuid,
  ) -> Result<Vec<Record<D>>> {
    let column = tables::spec(D::KIND).relation(relation)?;
    self.read(move |conn| load_where::<D>(conn, column, id)).await
  }

  async fn search_text<D: EntityData>(
    &self,
    text: &str,
    limit: usize,
  ) -> Result<Vec<Record<D>>> {
    let text = text.to_owned();
    self
      .read(move |conn| text_matches::<D>(conn, &text, limit))
      .await
  }

  async fn save<D: EntityData>(&self, record: Record<D>) -> Result<()> {
    self
      .write(move |conn| {
        let tx = conn.transaction()?;
        upsert(&tx, &record)?;
        if D::KIND == EntityKind::Person {
          sync_saved_person_name(&tx, record.id)?;
        }
        tx.commit()?;
        Ok(())
      })
      .await
  }

  async fn delete<D: EntityData>(&self, id: Uuid) -> Result<bool> {
    self
      .write(move |conn| {
        let tx = conn.transaction()?;
        let removed = remove::<D>(&tx, id)?;
        if D::KIND == EntityKind::Person {
          remove_where(&tx, "person_names", "person_id", id)?;
        }
        tx.commit()?;
        Ok(removed)
      })
      .await
  }

  async fn search_persons(&self, query: &SearchQuery) -> Result<Vec<PersonHit>> {
    if query.is_unscoped() {
      return Ok(Vec::new());
    }
    let query = query.clone();
    self
      .read(move |conn| {
        let candidates = person_candidates(conn, &query)?;
        Ok(search::rank(&query, candidates))
      })
      .await
  }

  async fn family_children(&self, family_id: Uuid) -> Result<Vec<FamilyChild>> {
    self
      .read(move |conn| children_where(conn, "family_id", family_id))
      .await
  }

  async fn child_families(&self, person_id: Uuid) -> Result<Vec<FamilyChild>> {
    self
      .read(move |conn| children_where(conn, "person_id", person_id))
      .await
  }

  async fn pedigree_edge(&self, person_id: Uuid) -> Result<Option<PedigreeEdge>> {
    self.read(move |conn| edge_of(conn, person_id)).await
  }

  async fn ancestors(
    &self,
    person_id: Uuid,
    generations: u32,
  ) -> Result<Vec<AncestorNode>> {
    self
      .read(move |conn| {
        if load::<PersonData>(conn, person_id)?.is_none() {
          return Err(
            CoreError::EntityNotFound { kind: EntityKind::Person, id: person_id }
              .into(),
          );
        }
        walk_ancestors(
          person_id,
          generations,
          |id| edge_of(conn, id),
          |id| person_name(conn, id),
        )
      })
      .await
  }

  async fn surname_index(&self, letter: Option<&str>) -> Result<SurnameIndex> {
    let letter = letter.map(str::to_owned);
    self
      .read(move |conn| surnames(conn, letter.as_deref()))
      .await
  }

  async fn place_hierarchy(&self, parent: Option<&str>) -> Result<Vec<PlaceNode>> {
    let parent = parent.map(str::to_owned);
    self
      .read(move |conn| {
        Ok(aggregate::place_hierarchy(place_counts(conn)?, parent.as_deref()))
      })
      .await
  }
}
