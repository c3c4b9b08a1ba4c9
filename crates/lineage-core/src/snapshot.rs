//! Named markers on the global log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The global log position at a moment someone cared to name.
///
/// A snapshot carries no entity state; replaying the log up to `position`
/// reconstructs the read model as it was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
  pub snapshot_id: Uuid,
  pub name:        String,
  pub description: Option<String>,
  /// Highest global position at creation; `0` for an empty log.
  pub position:    i64,
  pub created_at:  DateTime<Utc>,
}
