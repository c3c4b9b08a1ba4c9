//! Pedigree edges and ancestor traversal.
//!
//! The pedigree is an adjacency table keyed by person: each person has at
//! most one father and one mother reference, taken from the family they were
//! last linked into as a child. Edges are written only by the projection
//! engine.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Parent references of one person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PedigreeEdge {
  pub person_id:   Uuid,
  /// The family whose partners these parents are.
  pub family_id:   Option<Uuid>,
  pub father_id:   Option<Uuid>,
  pub father_name: Option<String>,
  pub mother_id:   Option<Uuid>,
  pub mother_name: Option<String>,
  pub updated_at:  DateTime<Utc>,
}

/// One person in an ancestor chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AncestorNode {
  pub person_id:  Uuid,
  pub name:       Option<String>,
  /// `0` for the root person, `1` for parents, ...
  pub generation: u32,
  /// Ahnentafel number: root is 1, a person `n`'s father is `2n` and mother
  /// `2n + 1`.
  pub ahnentafel: u64,
  pub father_id:  Option<Uuid>,
  pub mother_id:  Option<Uuid>,
}

/// Upper bound on chart depth; Ahnentafel numbers overflow `u64` past 63.
pub const MAX_GENERATIONS: u32 = 32;

/// Breadth-first walk up the pedigree from `root`, at most `generations`
/// levels above it.
///
/// `edge_of` and `name_of` look up derived rows. A person reached twice
/// (only possible in inconsistent data) is visited once.
pub fn walk_ancestors<E>(
  root: Uuid,
  generations: u32,
  mut edge_of: impl FnMut(Uuid) -> Result<Option<PedigreeEdge>, E>,
  mut name_of: impl FnMut(Uuid) -> Result<Option<String>, E>,
) -> Result<Vec<AncestorNode>, E> {
  let generations = generations.min(MAX_GENERATIONS);
  let mut nodes = Vec::new();
  let mut seen = HashSet::new();
  let mut queue = VecDeque::from([(root, 0u32, 1u64)]);

  while let Some((person_id, generation, ahnentafel)) = queue.pop_front() {
    if !seen.insert(person_id) {
      continue;
    }

    let edge = edge_of(person_id)?;
    let father_id = edge.as_ref().and_then(|e| e.father_id);
    let mother_id = edge.as_ref().and_then(|e| e.mother_id);

    nodes.push(AncestorNode {
      person_id,
      name: name_of(person_id)?,
      generation,
      ahnentafel,
      father_id,
      mother_id,
    });

    if generation < generations {
      if let Some(f) = father_id {
        queue.push_back((f, generation + 1, ahnentafel * 2));
      }
      if let Some(m) = mother_id {
        queue.push_back((m, generation + 1, ahnentafel * 2 + 1));
      }
    }
  }

  Ok(nodes)
}
