//! [`SqliteStore`]: the SQLite implementation of the Lineage storage traits.
//!
//! The trait impls live next to the code they drive: the event log in
//! [`crate::events`], projections in [`crate::projection`], read-model
//! queries in [`crate::read_model`] and snapshots in [`crate::snapshots`].

use std::{path::Path, sync::Arc};

use lineage_core::store::Storage;
use tokio::sync::Mutex;

use crate::{Error, Result, schema::SCHEMA};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Lineage store backed by a single SQLite file.
///
/// Cloning is cheap: connections and the append lock are reference-counted,
/// and clones share them.
#[derive(Clone)]
pub struct SqliteStore {
  /// Every write goes through this connection.
  pub(crate) writer:      tokio_rusqlite::Connection,
  /// Reads use their own connection for file databases, so they run
  /// alongside writes under WAL. In-memory stores reuse the writer.
  pub(crate) reader:      tokio_rusqlite::Connection,
  /// Serializes the append critical section and rebuilds.
  pub(crate) append_lock: Arc<Mutex<()>>,
  pub(crate) page_size:   usize,
}

impl SqliteStore {
  pub const DEFAULT_REBUILD_PAGE_SIZE: usize = 500;

  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref().to_owned();
    let writer = tokio_rusqlite::Connection::open(&path).await?;
    init_schema(&writer).await?;
    let reader = tokio_rusqlite::Connection::open(&path).await?;
    reader
      .call(|conn| {
        conn.execute_batch("PRAGMA query_only = ON;")?;
        Ok(())
      })
      .await?;
    Ok(Self::from_parts(writer, reader))
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    init_schema(&conn).await?;
    Ok(Self::from_parts(conn.clone(), conn))
  }

  fn from_parts(
    writer: tokio_rusqlite::Connection,
    reader: tokio_rusqlite::Connection,
  ) -> Self {
    Self {
      writer,
      reader,
      append_lock: Arc::new(Mutex::new(())),
      page_size: Self::DEFAULT_REBUILD_PAGE_SIZE,
    }
  }

  /// Number of events a rebuild applies per transaction.
  pub fn with_rebuild_page_size(mut self, page_size: usize) -> Self {
    self.page_size = page_size.max(1);
    self
  }

  /// Run `f` on the writer connection.
  ///
  /// Domain errors raised inside `f` travel back as the closure's value, so
  /// they reach the caller unchanged instead of being flattened into a
  /// database error.
  pub(crate) async fn write<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut rusqlite::Connection) -> Result<T> + Send + 'static,
  {
    self.writer.call(move |conn| Ok(f(conn))).await?
  }

  /// Run `f` on the reader connection.
  pub(crate) async fn read<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&rusqlite::Connection) -> Result<T> + Send + 'static,
  {
    self.reader.call(move |conn| Ok(f(conn))).await?
  }
}

async fn init_schema(conn: &tokio_rusqlite::Connection) -> Result<()> {
  conn
    .call(|conn| {
      conn.execute_batch(SCHEMA)?;
      Ok(())
    })
    .await?;
  Ok(())
}

impl Storage for SqliteStore {
  type Error = Error;
}
