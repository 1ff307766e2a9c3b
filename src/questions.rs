//! Question Set Provider: activity lookup per language track and the presentation shuffle.

use std::collections::HashMap;

use rand::Rng;
use tracing::{info, instrument, warn};

use crate::domain::Activity;
use crate::error::{GraderError, GraderResult};
use crate::progression::COMPLETION_THRESHOLD;
use crate::util::title_slug;

/// Uniform Fisher–Yates shuffle. Returns a new sequence; the input is untouched.
pub fn shuffle<T: Clone, R: Rng>(items: &[T], rng: &mut R) -> Vec<T> {
  let mut out = items.to_vec();
  for i in (1..out.len()).rev() {
    let j = rng.gen_range(0..=i);
    out.swap(i, j);
  }
  out
}

/// Short listing entry for a track.
#[derive(Clone, Debug, serde::Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummary {
  pub title: String,
  pub order: u32,
  pub description: String,
  pub question_count: usize,
}

/// Immutable activity catalogue, keyed by language then order.
#[derive(Clone, Debug, Default)]
pub struct QuestionSetProvider {
  tracks: HashMap<String, Vec<Activity>>,
}

impl QuestionSetProvider {
  /// Build the catalogue. Earlier entries win when two share (language, order).
  pub fn new(activities: impl IntoIterator<Item = Activity>) -> Self {
    let mut tracks: HashMap<String, Vec<Activity>> = HashMap::new();
    for act in activities {
      let track = tracks.entry(act.language.clone()).or_default();
      if track.iter().any(|a| a.order == act.order) {
        warn!(target: "grader", language = %act.language, order = act.order, title = %act.title, "Duplicate activity order; keeping first");
        continue;
      }
      track.push(act);
    }
    for (language, track) in tracks.iter_mut() {
      track.sort_by_key(|a| a.order);
      info!(target: "grader", %language, activities = track.len(), "Activity track loaded");
    }
    Self { tracks }
  }

  /// `title` may be given either verbatim or in its dashed route form.
  #[instrument(level = "debug", skip(self))]
  pub fn load_activity(&self, language: &str, title: &str, order: u32) -> GraderResult<Activity> {
    let wanted = title_slug(title);
    let act = self
      .tracks
      .get(language)
      .and_then(|t| t.iter().find(|a| a.order == order && title_slug(&a.title) == wanted))
      .ok_or_else(|| GraderError::NotFound(format!("activity '{}' #{} in {}", title, order, language)))?;

    if act.questions.len() < COMPLETION_THRESHOLD as usize {
      return Err(GraderError::InvalidActivity(format!(
        "'{}' has {} questions, needs at least {}",
        act.title,
        act.questions.len(),
        COMPLETION_THRESHOLD
      )));
    }
    Ok(act.clone())
  }

  pub fn list(&self, language: &str) -> Vec<ActivitySummary> {
    self
      .tracks
      .get(language)
      .map(|t| {
        t.iter()
          .map(|a| ActivitySummary {
            title: a.title.clone(),
            order: a.order,
            description: a.description.clone(),
            question_count: a.questions.len(),
          })
          .collect()
      })
      .unwrap_or_default()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Question;
  use crate::seeds::seed_activities;
  use rand::{rngs::StdRng, SeedableRng};

  fn sorted(mut v: Vec<u32>) -> Vec<u32> {
    v.sort_unstable();
    v
  }

  #[test]
  fn shuffle_is_a_permutation_for_all_small_lengths() {
    let mut rng = StdRng::seed_from_u64(7);
    for n in 0..40u32 {
      let input: Vec<u32> = (0..n).map(|i| i % 5).collect();
      let out = shuffle(&input, &mut rng);
      assert_eq!(out.len(), input.len());
      assert_eq!(sorted(out), sorted(input));
    }
  }

  #[test]
  fn shuffle_reaches_every_position() {
    let mut rng = StdRng::seed_from_u64(42);
    let input = [0u8, 1, 2, 3];
    let mut first_seen = [false; 4];
    for _ in 0..200 {
      first_seen[shuffle(&input, &mut rng)[0] as usize] = true;
    }
    assert!(first_seen.iter().all(|s| *s));
  }

  #[test]
  fn load_matches_dashed_title() {
    let p = QuestionSetProvider::new(seed_activities());
    let act = p.load_activity("Python", "Loops-and-Lists", 2).unwrap();
    assert_eq!(act.title, "Loops and Lists");
    assert!(p.load_activity("Python", "Loops and Lists", 2).is_ok());
  }

  #[test]
  fn load_reports_not_found_for_wrong_order_or_language() {
    let p = QuestionSetProvider::new(seed_activities());
    assert!(matches!(p.load_activity("Python", "First Functions", 2), Err(GraderError::NotFound(_))));
    assert!(matches!(p.load_activity("JavaScript", "First Functions", 1), Err(GraderError::NotFound(_))));
  }

  #[test]
  fn activities_below_threshold_are_rejected() {
    let small = Activity {
      language: "Python".into(),
      title: "Tiny".into(),
      order: 9,
      description: String::new(),
      questions: vec![Question { id: "a".into(), prompt: "p".into(), function_name: "f".into(), test_count: 1 }],
    };
    let p = QuestionSetProvider::new(vec![small]);
    assert!(matches!(p.load_activity("Python", "Tiny", 9), Err(GraderError::InvalidActivity(_))));
  }

  #[test]
  fn listing_is_sorted_by_order() {
    let mut acts = seed_activities();
    acts.reverse();
    let p = QuestionSetProvider::new(acts);
    let orders: Vec<u32> = p.list("Python").iter().map(|s| s.order).collect();
    assert_eq!(orders, vec![1, 2]);
    assert!(p.list("Rust").is_empty());
  }
}
