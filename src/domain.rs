//! Domain models: activities, questions, per-activity progress, learner profile and grading results.

use serde::{Deserialize, Serialize};

/// One coding question. The expected behavior lives in hidden tests on the execution service.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  pub id: String,
  pub prompt: String,
  pub function_name: String,
  #[serde(default = "default_test_count")]
  pub test_count: u32,
}

fn default_test_count() -> u32 { 3 }

/// A titled, ordered set of questions within a language track.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
  pub language: String,
  pub title: String,
  pub order: u32,
  #[serde(default)] pub description: String,
  pub questions: Vec<Question>,
}

impl Activity {
  pub fn question(&self, id: &str) -> Option<&Question> {
    self.questions.iter().find(|q| q.id == id)
  }
}

/// Per-activity progress document, keyed by (learner, language, activity order).
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
  pub correct_count: u32,
  pub incorrect_count: u32,
  pub completed: bool,
}

/// Merge-style update: `None` fields leave the stored value untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgressPatch {
  pub correct_count: Option<u32>,
  pub incorrect_count: Option<u32>,
  pub completed: Option<bool>,
}

impl ProgressPatch {
  pub fn counters(correct: u32, incorrect: u32) -> Self {
    Self { correct_count: Some(correct), incorrect_count: Some(incorrect), completed: None }
  }

  pub fn apply_to(&self, p: &mut Progress) {
    if let Some(c) = self.correct_count { p.correct_count = c; }
    if let Some(i) = self.incorrect_count { p.incorrect_count = i; }
    if let Some(done) = self.completed { p.completed = done; }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LanguageTrack {
  pub lang_name: String,
  pub current_activity: u32,
}

/// Learner document as the engine sees it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
  pub uid: String,
  #[serde(default)] pub xp: u64,
  #[serde(default)] pub current_activity: u32,
  #[serde(default)] pub current_language: Option<String>,
  #[serde(default)] pub programming_languages: Vec<LanguageTrack>,
}

/// One day bucket of the XP history.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyXp {
  pub day: String,
  pub xp: u64,
}

/// One hidden test as reported by the execution service.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestOutcome {
  #[serde(default)] pub input: serde_json::Value,
  #[serde(default)] pub expected: serde_json::Value,
  #[serde(default)] pub actual: serde_json::Value,
  pub passed: bool,
}

/// Outcome of one submission, delivered through the result channel.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResultEvent {
  pub session_id: String,
  /// Correlation token echoed from the grading request. Older services omit it.
  #[serde(default)] pub attempt: Option<u64>,
  #[serde(default)] pub question_id: Option<String>,
  pub success: bool,
  #[serde(default)] pub message: String,
  #[serde(default)] pub test_results: Vec<TestOutcome>,
}
