//! Progress persistence adapter.
//!
//! `ProgressStore` is the contract the engine sequences against; the production document store
//! lives behind it. `InMemoryStore` keeps every per-learner document in one lock, so a reward
//! grant updates the XP total and the day bucket together.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::domain::{DailyXp, LanguageTrack, Progress, ProgressPatch, UserProfile};
use crate::error::{GraderError, GraderResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum XpGrant {
  Applied { total: u64 },
  /// The grant key was seen before; nothing was credited.
  AlreadyGranted { total: u64 },
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
  async fn load_user(&self, learner: &str) -> GraderResult<UserProfile>;

  /// Missing documents read as zeroed progress.
  async fn load_progress(&self, learner: &str, language: &str, order: u32) -> GraderResult<Progress>;

  /// Merge-write; returns the stored document after the merge.
  async fn save_progress(
    &self,
    learner: &str,
    language: &str,
    order: u32,
    patch: ProgressPatch,
  ) -> GraderResult<Progress>;

  async fn reset_progress(&self, learner: &str, language: &str, order: u32) -> GraderResult<()>;

  /// Credit `amount` to the learner's total and to the `day` bucket, at most once per `grant_key`.
  async fn grant_xp(&self, learner: &str, amount: u64, day: &str, grant_key: &str) -> GraderResult<XpGrant>;

  /// Raise the learner's current activity for `language` to `new_order`. Never lowers it.
  async fn unlock_next_activity(&self, learner: &str, language: &str, new_order: u32) -> GraderResult<()>;

  /// Last submitted code per question.
  async fn save_submission_code(
    &self,
    learner: &str,
    language: &str,
    order: u32,
    question_id: &str,
    function_name: &str,
    code: &str,
  ) -> GraderResult<()>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmittedCode {
  pub function_name: String,
  pub code: String,
}

type ProgressKey = (String, String, u32);
type CodeKey = (String, String, u32, String);

#[derive(Default)]
struct Docs {
  users: HashMap<String, UserProfile>,
  progress: HashMap<ProgressKey, Progress>,
  xp_history: HashMap<String, Vec<DailyXp>>,
  grants: HashSet<(String, String)>,
  code: HashMap<CodeKey, SubmittedCode>,
}

#[derive(Default)]
pub struct InMemoryStore {
  docs: RwLock<Docs>,
  /// When set, unknown learners get a fresh document on this track at their first load.
  default_language: Option<String>,
}

impl InMemoryStore {
  pub fn new() -> Self { Self::default() }

  /// Store pre-populated with `learners` that creates documents for anyone else on demand.
  pub fn provisioning(default_language: impl Into<String>, learners: impl IntoIterator<Item = UserProfile>) -> Self {
    let mut docs = Docs::default();
    for profile in learners {
      docs.xp_history.entry(profile.uid.clone()).or_default();
      docs.users.insert(profile.uid.clone(), profile);
    }
    info!(target: "store", learners = docs.users.len(), "In-memory store provisioned");
    Self { docs: RwLock::new(docs), default_language: Some(default_language.into()) }
  }

  /// Provision (or replace) a learner document.
  pub async fn seed_user(&self, profile: UserProfile) {
    let mut docs = self.docs.write().await;
    info!(target: "store", uid = %profile.uid, "Seeded learner document");
    docs.xp_history.entry(profile.uid.clone()).or_default();
    docs.users.insert(profile.uid.clone(), profile);
  }

  pub async fn user(&self, learner: &str) -> Option<UserProfile> {
    self.docs.read().await.users.get(learner).cloned()
  }

  pub async fn xp_history(&self, learner: &str) -> Vec<DailyXp> {
    self.docs.read().await.xp_history.get(learner).cloned().unwrap_or_default()
  }

  pub async fn submitted_code(&self, learner: &str, language: &str, order: u32, question_id: &str) -> Option<SubmittedCode> {
    let key = (learner.to_string(), language.to_string(), order, question_id.to_string());
    self.docs.read().await.code.get(&key).cloned()
  }
}

fn progress_key(learner: &str, language: &str, order: u32) -> ProgressKey {
  (learner.to_string(), language.to_string(), order)
}

#[async_trait]
impl ProgressStore for InMemoryStore {
  async fn load_user(&self, learner: &str) -> GraderResult<UserProfile> {
    if let Some(user) = self.docs.read().await.users.get(learner) {
      return Ok(user.clone());
    }
    let Some(language) = self.default_language.as_ref() else {
      return Err(GraderError::NotFound(format!("user {}", learner)));
    };

    let mut docs = self.docs.write().await;
    let Docs { users, xp_history, .. } = &mut *docs;
    let user = users.entry(learner.to_string()).or_insert_with(|| {
      info!(target: "store", %learner, %language, "Created learner document");
      UserProfile {
        uid: learner.to_string(),
        xp: 0,
        current_activity: 1,
        current_language: Some(language.clone()),
        programming_languages: vec![LanguageTrack { lang_name: language.clone(), current_activity: 1 }],
      }
    });
    xp_history.entry(learner.to_string()).or_default();
    Ok(user.clone())
  }

  async fn load_progress(&self, learner: &str, language: &str, order: u32) -> GraderResult<Progress> {
    let docs = self.docs.read().await;
    Ok(docs.progress.get(&progress_key(learner, language, order)).copied().unwrap_or_default())
  }

  #[instrument(level = "debug", skip(self))]
  async fn save_progress(
    &self,
    learner: &str,
    language: &str,
    order: u32,
    patch: ProgressPatch,
  ) -> GraderResult<Progress> {
    let mut docs = self.docs.write().await;
    let doc = docs.progress.entry(progress_key(learner, language, order)).or_default();
    patch.apply_to(doc);
    debug!(target: "store", correct = doc.correct_count, incorrect = doc.incorrect_count, completed = doc.completed, "Progress saved");
    Ok(*doc)
  }

  async fn reset_progress(&self, learner: &str, language: &str, order: u32) -> GraderResult<()> {
    let mut docs = self.docs.write().await;
    docs.progress.insert(progress_key(learner, language, order), Progress::default());
    Ok(())
  }

  #[instrument(level = "info", skip(self))]
  async fn grant_xp(&self, learner: &str, amount: u64, day: &str, grant_key: &str) -> GraderResult<XpGrant> {
    let mut docs = self.docs.write().await;
    let Docs { users, xp_history, grants, .. } = &mut *docs;

    let user = users
      .get_mut(learner)
      .ok_or_else(|| GraderError::NotFound(format!("user {}", learner)))?;

    if !grants.insert((learner.to_string(), grant_key.to_string())) {
      info!(target: "store", %grant_key, "XP grant already applied");
      return Ok(XpGrant::AlreadyGranted { total: user.xp });
    }

    user.xp += amount;
    let history = xp_history.entry(learner.to_string()).or_default();
    match history.iter_mut().find(|d| d.day == day) {
      Some(bucket) => bucket.xp += amount,
      None => history.push(DailyXp { day: day.to_string(), xp: amount }),
    }
    Ok(XpGrant::Applied { total: user.xp })
  }

  #[instrument(level = "info", skip(self))]
  async fn unlock_next_activity(&self, learner: &str, language: &str, new_order: u32) -> GraderResult<()> {
    let mut docs = self.docs.write().await;
    let user = docs
      .users
      .get_mut(learner)
      .ok_or_else(|| GraderError::NotFound(format!("user {}", learner)))?;

    user.current_activity = user.current_activity.max(new_order);
    match user.programming_languages.iter_mut().find(|l| l.lang_name == language) {
      Some(track) => track.current_activity = track.current_activity.max(new_order),
      None => user.programming_languages.push(LanguageTrack { lang_name: language.to_string(), current_activity: new_order }),
    }
    info!(target: "store", %learner, %language, new_order, "Next activity unlocked");
    Ok(())
  }

  async fn save_submission_code(
    &self,
    learner: &str,
    language: &str,
    order: u32,
    question_id: &str,
    function_name: &str,
    code: &str,
  ) -> GraderResult<()> {
    let mut docs = self.docs.write().await;
    docs.code.insert(
      (learner.to_string(), language.to_string(), order, question_id.to_string()),
      SubmittedCode { function_name: function_name.to_string(), code: code.to_string() },
    );
    Ok(())
  }
}
