//! Sort keys for free-form genealogical dates.
//!
//! Dates in genealogy data are rarely exact: `ABT 1850`, `BET 1850 AND 1860`,
//! `MAR 1850`. The read model keeps the original text and adds a numeric
//! `yyyymmdd` key (unknown month/day as `00`) for sorting and range filters.

const MONTHS: [&str; 12] = [
  "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV",
  "DEC",
];

/// Parse the first calendar date out of `text` into a `yyyymmdd` key.
///
/// Returns `None` when no year can be found.
pub fn sort_key(text: &str) -> Option<i64> {
  let upper = text.to_ascii_uppercase();
  let mut day = 0i64;
  let mut month = 0i64;

  for token in upper.split(|c: char| c.is_whitespace() || c == ',') {
    if token.is_empty() {
      continue;
    }

    if let Some(key) = iso_key(token) {
      return Some(key);
    }

    if token.chars().all(|c| c.is_ascii_digit()) {
      let n: i64 = token.parse().ok()?;
      if token.len() >= 3 {
        return Some(n * 10_000 + month * 100 + day);
      }
      if month == 0 && (1..=31).contains(&n) {
        day = n;
      }
      continue;
    }

    if let Some(m) = MONTHS
      .iter()
      .position(|m| token.len() >= 3 && token.starts_with(m))
    {
      month = m as i64 + 1;
    }
  }

  None
}

/// `1850-03-12` or `1850-03`.
fn iso_key(token: &str) -> Option<i64> {
  let mut parts = token.split('-');
  let year = parts.next()?;
  if year.len() != 4 || !year.chars().all(|c| c.is_ascii_digit()) {
    return None;
  }
  let month: i64 = parts.next()?.parse().ok()?;
  let day: i64 = parts.next().map(str::parse).transpose().ok()?.unwrap_or(0);
  if !(1..=12).contains(&month) || !(0..=31).contains(&day) {
    return None;
  }
  Some(year.parse::<i64>().ok()? * 10_000 + month * 100 + day)
}

/// The year part of a sort key.
pub fn year_of(key: i64) -> i64 { key / 10_000 }

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn gedcom_style_dates() {
    assert_eq!(sort_key("12 MAR 1850"), Some(18500312));
    assert_eq!(sort_key("MAR 1850"), Some(18500300));
    assert_eq!(sort_key("ABT 1850"), Some(18500000));
    assert_eq!(sort_key("BET 1850 AND 1860"), Some(18500000));
    assert_eq!(sort_key("bef. 3 September 1901"), Some(19010903));
  }

  #[test]
  fn iso_dates() {
    assert_eq!(sort_key("1850-03-12"), Some(18500312));
    assert_eq!(sort_key("1850-03"), Some(18500300));
  }

  #[test]
  fn no_year_means_no_key() {
    assert_eq!(sort_key("unknown"), None);
    assert_eq!(sort_key("12 MAR"), None);
    assert_eq!(sort_key(""), None);
  }

  #[test]
  fn year_of_strips_month_and_day() {
    assert_eq!(year_of(18500312), 1850);
  }
}
