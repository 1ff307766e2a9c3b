//! Small utility helpers used across modules.

use chrono::{NaiveDate, Utc};

/// Route form of an activity title: every whitespace run becomes one '-'.
/// "Loops and  Lists" -> "Loops-and-Lists".
pub fn title_slug(title: &str) -> String {
  title.split_whitespace().collect::<Vec<_>>().join("-")
}

/// Day bucket key for the XP history, e.g. "2024-05-31".
pub fn day_key(date: NaiveDate) -> String {
  date.format("%Y-%m-%d").to_string()
}

pub fn today_key() -> String {
  day_key(Utc::now().date_naive())
}

/// Log-safe truncation for large strings (never splits a char).
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut end = max;
  while !s.is_char_boundary(end) { end -= 1; }
  format!("{}… ({} bytes total)", &s[..end], s.len())
}
