//! The append-only event log.

use lineage_core::{
  Error as CoreError, codec,
  event::{
    EventPage, EventQuery, ExpectedVersion, NewEvent, Stream, StoredEvent,
    StreamType,
  },
  store::EventStore,
};
use rusqlite::{OptionalExtension as _, TransactionBehavior, types::Value as SqlValue};
use tracing::debug;
use uuid::Uuid;

use crate::{
  Result, SqliteStore,
  encode::{EVENT_COLUMNS, RawEvent, RawStream, encode_dt, encode_uuid, now},
  projection,
};

/// Current version of `stream_id`; `0` if it has no events.
pub(crate) fn stream_version(
  conn: &rusqlite::Connection,
  stream_id: &str,
) -> Result<i64> {
  Ok(conn.query_row(
    "SELECT COALESCE(MAX(version), 0) FROM events WHERE stream_id = ?1",
    [stream_id],
    |r| r.get(0),
  )?)
}

pub(crate) fn max_position(conn: &rusqlite::Connection) -> Result<i64> {
  Ok(conn.query_row(
    "SELECT COALESCE(MAX(position), 0) FROM events",
    [],
    |r| r.get(0),
  )?)
}

/// Up to `limit` events after `from_position`, in position order.
pub(crate) fn events_after(
  conn: &rusqlite::Connection,
  from_position: i64,
  limit: usize,
) -> Result<Vec<StoredEvent>> {
  let mut stmt = conn.prepare_cached(&format!(
    "SELECT {EVENT_COLUMNS} FROM events
     WHERE position > ?1
     ORDER BY position
     LIMIT ?2"
  ))?;
  let limit = i64::try_from(limit).unwrap_or(i64::MAX);
  let raws = stmt
    .query_map(
      rusqlite::params![from_position, limit],
      RawEvent::from_row,
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawEvent::into_event).collect()
}

/// The whole append: validate, check the version, insert and project, in one
/// `IMMEDIATE` transaction.
fn append_tx(
  conn: &mut rusqlite::Connection,
  stream_id: Uuid,
  stream_type: StreamType,
  events: Vec<NewEvent>,
  expected: ExpectedVersion,
) -> Result<Vec<StoredEvent>> {
  // Everything that can be checked without the database happens first.
  let mut encoded = Vec::with_capacity(events.len());
  for NewEvent { event, metadata } in events {
    if event.stream_type() != stream_type {
      return Err(
        CoreError::StreamTypeMismatch {
          event_type: event.event_type().to_owned(),
          expected:   event.stream_type().to_string(),
          actual:     stream_type.to_string(),
        }
        .into(),
      );
    }
    let (event_type, payload) = codec::encode(&event)?;
    let metadata = metadata.map(|m| m.to_string());
    encoded.push((event_type, payload, metadata));
  }

  let id_str = encode_uuid(stream_id);
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

  let existing: Option<String> = tx
    .query_row(
      "SELECT stream_type FROM streams WHERE stream_id = ?1",
      [&id_str],
      |r| r.get(0),
    )
    .optional()?;
  if let Some(existing) = existing
    && existing != stream_type.as_str()
  {
    return Err(
      CoreError::StreamTypeMismatch {
        event_type: encoded
          .first()
          .map_or_else(String::new, |(t, ..)| (*t).to_owned()),
        expected:   existing,
        actual:     stream_type.to_string(),
      }
      .into(),
    );
  }

  let current = stream_version(&tx, &id_str)?;
  if !expected.matches(current) {
    return Err(
      CoreError::ConcurrencyConflict {
        stream_id,
        expected,
        actual: current,
      }
      .into(),
    );
  }
  if encoded.is_empty() {
    return Ok(Vec::new());
  }

  let recorded_at = now();
  let at_str = encode_dt(recorded_at);
  tx.execute(
    "INSERT OR IGNORE INTO streams (stream_id, stream_type, created_at)
     VALUES (?1, ?2, ?3)",
    rusqlite::params![id_str, stream_type.as_str(), at_str],
  )?;

  let mut stored = Vec::with_capacity(encoded.len());
  for (offset, (event_type, payload, metadata)) in encoded.into_iter().enumerate()
  {
    let event_id = Uuid::new_v4();
    let version = current + offset as i64 + 1;
    tx.execute(
      "INSERT INTO events (
         event_id, stream_id, stream_type, version, event_type,
         payload, metadata, recorded_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
      rusqlite::params![
        encode_uuid(event_id),
        id_str,
        stream_type.as_str(),
        version,
        event_type,
        payload,
        metadata,
        at_str,
      ],
    )?;
    let position = tx.last_insert_rowid();

    let event = StoredEvent {
      event_id,
      stream_id,
      stream_type,
      version,
      event_type: event_type.to_owned(),
      payload,
      metadata: metadata
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?,
      recorded_at,
      position,
    };
    projection::project(&tx, &event)?;
    stored.push(event);
  }

  tx.commit()?;
  Ok(stored)
}

/// Build the `WHERE` clause shared by the count and page queries of
/// [`EventStore::read_filtered`].
fn filter_clause(query: &EventQuery) -> (Vec<String>, Vec<SqlValue>) {
  let mut conds = Vec::new();
  let mut params = Vec::new();

  if let Some(since) = query.since {
    params.push(SqlValue::Text(encode_dt(since)));
    conds.push(format!("recorded_at >= ?{}", params.len()));
  }
  if let Some(until) = query.until {
    params.push(SqlValue::Text(encode_dt(until)));
    conds.push(format!("recorded_at < ?{}", params.len()));
  }
  if let Some(stream_type) = query.stream_type {
    params.push(SqlValue::Text(stream_type.as_str().to_owned()));
    conds.push(format!("stream_type = ?{}", params.len()));
  }
  if !query.event_types.is_empty() {
    let slots: Vec<_> = query
      .event_types
      .iter()
      .map(|t| {
        params.push(SqlValue::Text(t.clone()));
        format!("?{}", params.len())
      })
      .collect();
    conds.push(format!("event_type IN ({})", slots.join(", ")));
  }

  (conds, params)
}

fn where_sql(conds: &[String]) -> String {
  if conds.is_empty() {
    String::new()
  } else {
    format!("WHERE {}", conds.join(" AND "))
  }
}

// ─── EventStore impl ─────────────────────────────────────────────────────────

impl EventStore for SqliteStore {
  async fn append(
    &self,
    stream_id: Uuid,
    stream_type: StreamType,
    events: Vec<NewEvent>,
    expected: ExpectedVersion,
  ) -> Result<Vec<StoredEvent>> {
    let _guard = self.append_lock.lock().await;
    let count = events.len();

    let stored = self
      .write(move |conn| {
        append_tx(conn, stream_id, stream_type, events, expected)
      })
      .await?;

    if let Some(last) = stored.last() {
      debug!(
        %stream_id,
        %stream_type,
        count,
        version = last.version,
        position = last.position,
        "appended events"
      );
    }
    Ok(stored)
  }

  async fn read_stream(&self, stream_id: Uuid) -> Result<Vec<StoredEvent>> {
    let id_str = encode_uuid(stream_id);
    self
      .read(move |conn| {
        let mut stmt = conn.prepare_cached(&format!(
          "SELECT {EVENT_COLUMNS} FROM events
           WHERE stream_id = ?1
           ORDER BY version"
        ))?;
        let raws = stmt
          .query_map([id_str], RawEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawEvent::into_event).collect()
      })
      .await
  }

  async fn read_all(
    &self,
    from_position: i64,
    limit: usize,
  ) -> Result<Vec<StoredEvent>> {
    if limit == 0 {
      return Ok(Vec::new());
    }
    self
      .read(move |conn| events_after(conn, from_position, limit))
      .await
  }

  async fn read_filtered(&self, query: &EventQuery) -> Result<EventPage> {
    let limit = query.effective_limit();
    let after = query.after_position;
    let (conds, params) = filter_clause(query);

    self
      .read(move |conn| {
        let total_count: i64 = conn.query_row(
          &format!("SELECT COUNT(*) FROM events {}", where_sql(&conds)),
          rusqlite::params_from_iter(params.iter()),
          |r| r.get(0),
        )?;

        let mut conds = conds;
        let mut params = params;
        params.push(SqlValue::Integer(after));
        conds.push(format!("position > ?{}", params.len()));
        // One extra row tells us whether another page follows.
        let fetch = i64::try_from(limit).unwrap_or(i64::MAX).saturating_add(1);
        params.push(SqlValue::Integer(fetch));
        let sql = format!(
          "SELECT {EVENT_COLUMNS} FROM events {} ORDER BY position LIMIT ?{}",
          where_sql(&conds),
          params.len(),
        );

        let mut stmt = conn.prepare(&sql)?;
        let raws = stmt
          .query_map(
            rusqlite::params_from_iter(params.iter()),
            RawEvent::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let has_more = raws.len() > limit;
        let events = raws
          .into_iter()
          .take(limit)
          .map(RawEvent::into_event)
          .collect::<Result<Vec<_>>>()?;

        Ok(EventPage { events, total_count, has_more })
      })
      .await
  }

  async fn get_stream_version(&self, stream_id: Uuid) -> Result<i64> {
    let id_str = encode_uuid(stream_id);
    self.read(move |conn| stream_version(conn, &id_str)).await
  }

  async fn get_event(&self, event_id: Uuid) -> Result<Option<StoredEvent>> {
    let id_str = encode_uuid(event_id);
    self
      .read(move |conn| {
        conn
          .query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM events WHERE event_id = ?1"),
            [id_str],
            RawEvent::from_row,
          )
          .optional()?
          .map(RawEvent::into_event)
          .transpose()
      })
      .await
  }

  async fn get_stream(&self, stream_id: Uuid) -> Result<Option<Stream>> {
    let id_str = encode_uuid(stream_id);
    self
      .read(move |conn| {
        conn
          .query_row(
            "SELECT stream_id, stream_type, created_at FROM streams
             WHERE stream_id = ?1",
            [id_str],
            |row| {
              Ok(RawStream {
                stream_id:   row.get(0)?,
                stream_type: row.get(1)?,
                created_at:  row.get(2)?,
              })
            },
          )
          .optional()?
          .map(RawStream::into_stream)
          .transpose()
      })
      .await
  }
}
