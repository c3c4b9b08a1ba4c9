//! Browse-style aggregations over the read model: the surname index and the
//! place hierarchy.
//!
//! Place names are stored as free text, narrowest part first
//! (`Springfield, Sangamon, Illinois, USA`). The hierarchy is computed by
//! splitting on commas at query time; that is linear in the number of
//! distinct places and is the known scaling limit of this view.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How many people carry surnames starting with `letter`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LetterCount {
  pub letter: String,
  pub count:  i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurnameCount {
  pub surname: String,
  pub count:   i64,
}

/// Alphabetical surname index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurnameIndex {
  /// Every initial letter in use, alphabetically.
  pub letters:  Vec<LetterCount>,
  /// Surnames (restricted to one letter if requested), alphabetically.
  pub surnames: Vec<SurnameCount>,
}

/// One level of the place hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceNode {
  /// This level's own component, e.g. `Illinois`.
  pub name:         String,
  /// The component plus its parents, e.g. `Illinois, USA`.
  pub full_name:    String,
  /// Number of place references at or below this node.
  pub count:        i64,
  pub has_children: bool,
}

/// Split a place string into components, broadest first.
pub fn place_components(place: &str) -> Vec<String> {
  place
    .split(',')
    .map(str::trim)
    .filter(|p| !p.is_empty())
    .rev()
    .map(str::to_owned)
    .collect()
}

/// Children of `parent` (or the top level when `None`) among `places`, each
/// given with its number of references.
pub fn place_hierarchy<I>(places: I, parent: Option<&str>) -> Vec<PlaceNode>
where
  I: IntoIterator<Item = (String, i64)>,
{
  let prefix = parent.map(place_components).unwrap_or_default();
  let depth = prefix.len();

  // Keyed by lower-cased component so spelling case does not split nodes;
  // the first spelling seen is kept for display.
  let mut nodes: BTreeMap<String, PlaceNode> = BTreeMap::new();

  for (place, count) in places {
    let parts = place_components(&place);
    if parts.len() <= depth
      || !parts
        .iter()
        .zip(&prefix)
        .all(|(a, b)| a.eq_ignore_ascii_case(b))
    {
      continue;
    }

    let name = &parts[depth];
    let node = nodes.entry(name.to_lowercase()).or_insert_with(|| {
      let mut path: Vec<&str> =
        parts[..=depth].iter().map(String::as_str).collect();
      path.reverse();
      PlaceNode {
        name:         name.clone(),
        full_name:    path.join(", "),
        count:        0,
        has_children: false,
      }
    });
    node.count += count;
    node.has_children |= parts.len() > depth + 1;
  }

  nodes.into_values().collect()
}
