//! Name matching: substring containment, trigram/edit-distance similarity and
//! American Soundex.
//!
//! All scores are in `0.0..=1.0`, higher is better.

use std::collections::HashSet;

// ─── Containment ─────────────────────────────────────────────────────────────

/// Case-insensitive substring match. An exact match scores `1.0`; a partial
/// match scores by how much of the candidate the query covers.
pub fn containment_score(query: &str, candidate: &str) -> Option<f64> {
  let q = query.trim().to_lowercase();
  let c = candidate.trim().to_lowercase();
  if q.is_empty() || c.is_empty() {
    return None;
  }
  if q == c {
    return Some(1.0);
  }
  c.contains(&q).then(|| {
    let ratio = q.chars().count() as f64 / c.chars().count() as f64;
    0.5 + 0.49 * ratio
  })
}

// ─── Trigrams ────────────────────────────────────────────────────────────────

/// The trigram set of `text`: each lower-cased alphanumeric word is padded
/// with two leading blanks and one trailing blank before windowing.
pub fn trigrams(text: &str) -> HashSet<String> {
  let mut out = HashSet::new();
  for word in words(text) {
    let padded: Vec<char> = format!("  {word} ").chars().collect();
    for window in padded.windows(3) {
      out.insert(window.iter().collect());
    }
  }
  out
}

/// Jaccard similarity of the two trigram sets.
pub fn trigram_similarity(a: &str, b: &str) -> f64 {
  let ta = trigrams(a);
  let tb = trigrams(b);
  if ta.is_empty() || tb.is_empty() {
    return 0.0;
  }
  let shared = ta.intersection(&tb).count();
  let union = ta.len() + tb.len() - shared;
  shared as f64 / union as f64
}

// ─── Edit distance ───────────────────────────────────────────────────────────

/// Levenshtein distance over `char`s.
pub fn levenshtein(a: &str, b: &str) -> usize {
  let a: Vec<char> = a.chars().collect();
  let b: Vec<char> = b.chars().collect();
  if a.is_empty() {
    return b.len();
  }

  let mut prev: Vec<usize> = (0..=b.len()).collect();
  let mut curr = vec![0; b.len() + 1];
  for (i, ca) in a.iter().enumerate() {
    curr[0] = i + 1;
    for (j, cb) in b.iter().enumerate() {
      let substitution = prev[j] + usize::from(ca != cb);
      curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
    }
    std::mem::swap(&mut prev, &mut curr);
  }
  prev[b.len()]
}

/// Edit distance normalised by the longer word's length.
pub fn edit_similarity(a: &str, b: &str) -> f64 {
  let longest = a.chars().count().max(b.chars().count());
  if longest == 0 {
    return 0.0;
  }
  1.0 - levenshtein(a, b) as f64 / longest as f64
}

// ─── Fuzzy ───────────────────────────────────────────────────────────────────

/// Fuzzy similarity of a query against a full name.
///
/// Whole-string trigram similarity rewards multi-word matches; per-word edit
/// similarity (each query word against its best candidate word, averaged)
/// catches spelling variants such as `Kathryn`/`Catherine` whose trigram
/// sets barely overlap.
pub fn fuzzy_score(query: &str, candidate: &str) -> f64 {
  let query_words = words(query);
  let candidate_words = words(candidate);
  if query_words.is_empty() || candidate_words.is_empty() {
    return 0.0;
  }

  let per_word = query_words
    .iter()
    .map(|q| {
      candidate_words
        .iter()
        .map(|c| edit_similarity(q, c))
        .fold(0.0, f64::max)
    })
    .sum::<f64>()
    / query_words.len() as f64;

  trigram_similarity(query, candidate).max(per_word)
}

// ─── Soundex ─────────────────────────────────────────────────────────────────

/// American Soundex code (`Robert` → `R163`). `None` if `word` has no ASCII
/// letters.
pub fn soundex(word: &str) -> Option<String> {
  let mut letters = word
    .chars()
    .filter(char::is_ascii_alphabetic)
    .map(|c| c.to_ascii_uppercase());

  let first = letters.next()?;
  let mut code = String::with_capacity(4);
  code.push(first);
  let mut last = soundex_digit(first);

  for c in letters {
    match soundex_digit(c) {
      Some(d) => {
        if Some(d) != last {
          code.push(d);
          if code.len() == 4 {
            break;
          }
        }
        last = Some(d);
      }
      // H and W do not separate letters with the same code; vowels do.
      None if c == 'H' || c == 'W' => {}
      None => last = None,
    }
  }

  while code.len() < 4 {
    code.push('0');
  }
  Some(code)
}

fn soundex_digit(c: char) -> Option<char> {
  match c {
    'B' | 'F' | 'P' | 'V' => Some('1'),
    'C' | 'G' | 'J' | 'K' | 'Q' | 'S' | 'X' | 'Z' => Some('2'),
    'D' | 'T' => Some('3'),
    'L' => Some('4'),
    'M' | 'N' => Some('5'),
    'R' => Some('6'),
    _ => None,
  }
}

/// Soundex codes of every word in `text`.
pub fn soundex_codes(text: &str) -> Vec<String> {
  words(text).iter().filter_map(|w| soundex(w)).collect()
}

/// Phonetic match of a query against a name's given-name and surname codes.
///
/// The share of query words that sound like either name part dominates the
/// score; fuzzy similarity breaks ties between equally-sounding names.
/// `None` when no query word matches.
pub fn phonetic_score(
  query: &str,
  soundex_given: Option<&str>,
  soundex_surname: Option<&str>,
  full_name: &str,
) -> Option<f64> {
  let codes = soundex_codes(query);
  if codes.is_empty() {
    return None;
  }
  let matched = codes
    .iter()
    .filter(|c| {
      Some(c.as_str()) == soundex_given || Some(c.as_str()) == soundex_surname
    })
    .count();
  if matched == 0 {
    return None;
  }
  let share = matched as f64 / codes.len() as f64;
  Some(0.7 * share + 0.3 * fuzzy_score(query, full_name))
}

fn words(text: &str) -> Vec<String> {
  text
    .split(|c: char| !c.is_alphanumeric())
    .filter(|w| !w.is_empty())
    .map(str::to_lowercase)
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn soundex_reference_values() {
    assert_eq!(soundex("Robert").as_deref(), Some("R163"));
    assert_eq!(soundex("Rupert").as_deref(), Some("R163"));
    assert_eq!(soundex("Ashcraft").as_deref(), Some("A261"));
    assert_eq!(soundex("Tymczak").as_deref(), Some("T522"));
    assert_eq!(soundex("Pfister").as_deref(), Some("P236"));
    assert_eq!(soundex("Doe").as_deref(), Some("D000"));
    assert_eq!(soundex("123"), None);
  }

  #[test]
  fn trigram_similarity_is_symmetric_and_bounded() {
    let ab = trigram_similarity("Williams", "Wilson");
    let ba = trigram_similarity("Wilson", "Williams");
    assert_eq!(ab, ba);
    assert!(ab > 0.0 && ab < 1.0);
    assert_eq!(trigram_similarity("Doe", "doe"), 1.0);
  }

  #[test]
  fn levenshtein_distances() {
    assert_eq!(levenshtein("kitten", "sitting"), 3);
    assert_eq!(levenshtein("", "abc"), 3);
    assert_eq!(levenshtein("kathryn", "katherine"), 3);
  }

  #[test]
  fn fuzzy_ranks_closer_spelling_higher() {
    let katherine = fuzzy_score("Kathryn", "Katherine Williams");
    let catherine = fuzzy_score("Kathryn", "Catherine Wilson");
    let john = fuzzy_score("Kathryn", "John Doe");
    assert!(katherine > catherine);
    assert!(catherine > 0.3);
    assert!(john < 0.3);
  }

  #[test]
  fn containment_prefers_exact() {
    assert_eq!(containment_score("john doe", "John Doe"), Some(1.0));
    let partial = containment_score("Doe", "John Doe").unwrap();
    assert!(partial > 0.5 && partial < 1.0);
    assert_eq!(containment_score("Smith", "John Doe"), None);
  }

  #[test]
  fn phonetic_matches_sound_alikes() {
    let smyth = soundex("Smyth");
    let score =
      phonetic_score("Smith", Some("J500"), smyth.as_deref(), "John Smyth");
    assert!(score.is_some());
    assert_eq!(phonetic_score("Jones", Some("J500"), smyth.as_deref(), "x"), None);
  }
}
