//! Person search: query type, scoring and ranking.
//!
//! Backends fetch candidate `(person, name variant)` pairs that satisfy the
//! structured filters, then hand them to [`rank`], which scores each name,
//! keeps the best-scoring variant per person and orders the result.

use std::{cmp::Ordering, collections::HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  date::year_of,
  model::{Person, PersonName},
  similarity::{containment_score, fuzzy_score, phonetic_score},
};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
  /// Case-insensitive substring containment.
  #[default]
  Exact,
  /// Trigram / edit-distance similarity.
  Fuzzy,
  /// Soundex sounds-alike matching.
  Phonetic,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SearchSort {
  /// Score descending.
  #[default]
  Relevance,
  /// Primary display name ascending.
  Name,
  /// Birth date ascending, undated last.
  Birth,
}

/// Parameters for [`crate::store::ReadModelStore::search_persons`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
  pub text:           Option<String>,
  pub mode:           SearchMode,
  /// Inclusive birth-year range.
  pub birth_year_min: Option<i64>,
  pub birth_year_max: Option<i64>,
  /// Inclusive death-year range.
  pub death_year_min: Option<i64>,
  pub death_year_max: Option<i64>,
  /// Substring of the birth or death place.
  pub place:          Option<String>,
  pub sort:           SearchSort,
  /// `0` means [`SearchQuery::DEFAULT_LIMIT`].
  pub limit:          usize,
  /// Minimum score for fuzzy matches; defaults to
  /// [`SearchQuery::DEFAULT_MIN_SIMILARITY`].
  pub min_similarity: Option<f64>,
}

impl SearchQuery {
  pub const DEFAULT_LIMIT: usize = 50;
  pub const DEFAULT_MIN_SIMILARITY: f64 = 0.3;

  pub fn text(text: impl Into<String>, mode: SearchMode) -> Self {
    Self { text: Some(text.into()), mode, ..Default::default() }
  }

  /// The trimmed search text, if any.
  pub fn text_term(&self) -> Option<&str> {
    self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
  }

  pub fn has_filters(&self) -> bool {
    self.birth_year_min.is_some()
      || self.birth_year_max.is_some()
      || self.death_year_min.is_some()
      || self.death_year_max.is_some()
      || self.place.as_deref().is_some_and(|p| !p.trim().is_empty())
  }

  /// A query with neither text nor filters. Such queries return nothing
  /// rather than the whole table.
  pub fn is_unscoped(&self) -> bool {
    self.text_term().is_none() && !self.has_filters()
  }

  pub fn effective_limit(&self) -> usize {
    if self.limit == 0 { Self::DEFAULT_LIMIT } else { self.limit }
  }
}

/// A candidate name variant together with its person.
#[derive(Debug, Clone)]
pub struct NameCandidate {
  pub person: Person,
  pub name:   PersonName,
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonHit {
  pub person:          Person,
  /// The name variant that produced the score.
  pub matched_name:    String,
  pub matched_primary: bool,
  pub score:           f64,
}

/// Score one candidate name; `None` if it does not match.
pub fn score(query: &SearchQuery, name: &PersonName) -> Option<f64> {
  let Some(text) = query.text_term() else {
    // Filter-only queries: every candidate matches equally.
    return Some(1.0);
  };
  let n = &name.data;

  match query.mode {
    SearchMode::Exact => [
      Some(n.full_name.as_str()),
      n.given_name.as_deref(),
      n.surname.as_deref(),
    ]
    .into_iter()
    .flatten()
    .filter_map(|field| containment_score(text, field))
    .reduce(f64::max),
    SearchMode::Fuzzy => {
      let threshold =
        query.min_similarity.unwrap_or(SearchQuery::DEFAULT_MIN_SIMILARITY);
      let s = fuzzy_score(text, &n.full_name);
      (s >= threshold).then_some(s)
    }
    SearchMode::Phonetic => phonetic_score(
      text,
      n.soundex_given.as_deref(),
      n.soundex_surname.as_deref(),
      &n.full_name,
    ),
  }
}

/// Does `person` satisfy the structured filters? Backends usually apply
/// these in storage already; this is the reference definition.
pub fn passes_filters(query: &SearchQuery, person: &Person) -> bool {
  let in_range = |sort: Option<i64>, min: Option<i64>, max: Option<i64>| {
    if min.is_none() && max.is_none() {
      return true;
    }
    let Some(year) = sort.map(year_of) else { return false };
    min.is_none_or(|m| year >= m) && max.is_none_or(|m| year <= m)
  };

  let place_ok = match query.place.as_deref().map(str::trim) {
    Some(p) if !p.is_empty() => {
      let needle = p.to_lowercase();
      [&person.data.birth_place, &person.data.death_place]
        .into_iter()
        .flatten()
        .any(|place| place.to_lowercase().contains(&needle))
    }
    _ => true,
  };

  place_ok
    && in_range(person.data.birth_sort, query.birth_year_min, query.birth_year_max)
    && in_range(person.data.death_sort, query.death_year_min, query.death_year_max)
}

/// Score, de-duplicate per person and order the candidates.
///
/// Per person the highest-scoring variant wins; on equal scores the primary
/// name is preferred. Ties in the final order break on person id so results
/// are deterministic.
pub fn rank(
  query: &SearchQuery,
  candidates: impl IntoIterator<Item = NameCandidate>,
) -> Vec<PersonHit> {
  if query.is_unscoped() {
    return Vec::new();
  }

  let mut best: HashMap<Uuid, PersonHit> = HashMap::new();
  for NameCandidate { person, name } in candidates {
    if !passes_filters(query, &person) {
      continue;
    }
    let Some(score) = score(query, &name) else { continue };

    let hit = PersonHit {
      matched_name: name.data.full_name.clone(),
      matched_primary: name.data.is_primary,
      score,
      person,
    };
    match best.get(&hit.person.id) {
      Some(current) if !better(&hit, current) => {}
      _ => {
        best.insert(hit.person.id, hit);
      }
    }
  }

  let mut hits: Vec<PersonHit> = best.into_values().collect();
  hits.sort_by(|a, b| order(query.sort, a, b));
  hits.truncate(query.effective_limit());
  hits
}

fn better(candidate: &PersonHit, current: &PersonHit) -> bool {
  match candidate.score.total_cmp(&current.score) {
    Ordering::Greater => true,
    Ordering::Less => false,
    Ordering::Equal => candidate.matched_primary && !current.matched_primary,
  }
}

fn order(sort: SearchSort, a: &PersonHit, b: &PersonHit) -> Ordering {
  let by_name = |a: &PersonHit, b: &PersonHit| {
    a.person
      .data
      .full_name
      .to_lowercase()
      .cmp(&b.person.data.full_name.to_lowercase())
  };

  let primary = match sort {
    SearchSort::Relevance => b.score.total_cmp(&a.score).then_with(|| by_name(a, b)),
    SearchSort::Name => by_name(a, b),
    SearchSort::Birth => {
      match (a.person.data.birth_sort, b.person.data.birth_sort) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
      }
      .then_with(|| by_name(a, b))
    }
  };
  primary.then_with(|| a.person.id.cmp(&b.person.id))
}
