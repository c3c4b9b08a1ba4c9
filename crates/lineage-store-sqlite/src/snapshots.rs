//! Named markers on the global log.

use lineage_core::{Error as CoreError, snapshot::Snapshot, store::SnapshotStore};
use rusqlite::OptionalExtension as _;
use tracing::info;
use uuid::Uuid;

use crate::{
  Result, SqliteStore,
  encode::{RawSnapshot, SNAPSHOT_COLUMNS, encode_dt, encode_uuid, now},
  events::max_position,
};

impl SnapshotStore for SqliteStore {
  async fn create_snapshot(
    &self,
    name: String,
    description: Option<String>,
  ) -> Result<Snapshot> {
    let snapshot = self
      .write(move |conn| {
        // Read the position and insert in one transaction so the marker
        // cannot fall behind a concurrent append.
        let tx = conn.transaction()?;
        let snapshot = Snapshot {
          snapshot_id: Uuid::new_v4(),
          name,
          description,
          position: max_position(&tx)?,
          created_at: now(),
        };
        tx.execute(
          "INSERT INTO snapshots (snapshot_id, name, description, position, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![
            encode_uuid(snapshot.snapshot_id),
            snapshot.name,
            snapshot.description,
            snapshot.position,
            encode_dt(snapshot.created_at),
          ],
        )?;
        tx.commit()?;
        Ok(snapshot)
      })
      .await?;

    info!(
      snapshot_id = %snapshot.snapshot_id,
      name = %snapshot.name,
      position = snapshot.position,
      "created snapshot"
    );
    Ok(snapshot)
  }

  async fn get_snapshot(&self, snapshot_id: Uuid) -> Result<Option<Snapshot>> {
    let id_str = encode_uuid(snapshot_id);
    self
      .read(move |conn| {
        conn
          .query_row(
            &format!(
              "SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE snapshot_id = ?1"
            ),
            [id_str],
            RawSnapshot::from_row,
          )
          .optional()?
          .map(RawSnapshot::into_snapshot)
          .transpose()
      })
      .await
  }

  async fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
    self
      .read(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SNAPSHOT_COLUMNS} FROM snapshots
           ORDER BY created_at DESC, position DESC, snapshot_id"
        ))?;
        let raws = stmt
          .query_map([], RawSnapshot::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawSnapshot::into_snapshot).collect()
      })
      .await
  }

  async fn delete_snapshot(&self, snapshot_id: Uuid) -> Result<()> {
    let id_str = encode_uuid(snapshot_id);
    let removed = self
      .write(move |conn| {
        Ok(conn.execute("DELETE FROM snapshots WHERE snapshot_id = ?1", [id_str])?)
      })
      .await?;
    if removed == 0 {
      return Err(CoreError::SnapshotNotFound(snapshot_id).into());
    }
    Ok(())
  }

  async fn get_max_position(&self) -> Result<i64> {
    self.read(max_position).await
  }
}
