#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::{rngs::StdRng, SeedableRng};

use codequest_grader::config::GradingCfg;
use codequest_grader::domain::{LanguageTrack, Progress, ProgressPatch, ResultEvent, UserProfile};
use codequest_grader::error::{GraderError, GraderResult};
use codequest_grader::execution::{ExecutionService, GradingRequest};
use codequest_grader::questions::QuestionSetProvider;
use codequest_grader::retry::RetryConfig;
use codequest_grader::seeds::seed_activities;
use codequest_grader::session::{GradingSession, SessionDeps};
use codequest_grader::store::{InMemoryStore, ProgressStore, XpGrant};

pub const LEARNER: &str = "kid-1";

/// Records every grading request; can be switched to refuse connections.
#[derive(Default)]
pub struct RecordingExecutor {
  pub sent: Mutex<Vec<GradingRequest>>,
  pub down: AtomicBool,
}

impl RecordingExecutor {
  pub fn last(&self) -> GradingRequest {
    self.sent.lock().unwrap().last().cloned().expect("no request dispatched")
  }

  pub fn count(&self) -> usize {
    self.sent.lock().unwrap().len()
  }
}

#[async_trait]
impl ExecutionService for RecordingExecutor {
  async fn dispatch(&self, req: &GradingRequest) -> GraderResult<()> {
    if self.down.load(Ordering::SeqCst) {
      return Err(GraderError::ServiceUnavailable("connection refused".into()));
    }
    self.sent.lock().unwrap().push(req.clone());
    Ok(())
  }

  async fn check_health(&self) -> String {
    if self.down.load(Ordering::SeqCst) {
      codequest_grader::execution::HEALTH_UNREACHABLE.to_string()
    } else {
      "Server is running".to_string()
    }
  }
}

/// Wraps the in-memory store and fails `save_progress` while `failures_left > 0`
/// (or forever when `always_fail` is set), and `load_user` while `read_failures_left > 0`.
/// Counts grants and unlocks.
pub struct FlakyStore {
  pub inner: InMemoryStore,
  pub failures_left: AtomicUsize,
  pub read_failures_left: AtomicUsize,
  pub always_fail: AtomicBool,
  pub grants: AtomicUsize,
  pub unlocks: AtomicUsize,
}

impl FlakyStore {
  pub fn new(inner: InMemoryStore) -> Self {
    Self {
      inner,
      failures_left: AtomicUsize::new(0),
      read_failures_left: AtomicUsize::new(0),
      always_fail: AtomicBool::new(false),
      grants: AtomicUsize::new(0),
      unlocks: AtomicUsize::new(0),
    }
  }
}

#[async_trait]
impl ProgressStore for FlakyStore {
  async fn load_user(&self, learner: &str) -> GraderResult<UserProfile> {
    let left = self.read_failures_left.load(Ordering::SeqCst);
    if left > 0 {
      self.read_failures_left.store(left - 1, Ordering::SeqCst);
      return Err(GraderError::Persistence("transient read failure".into()));
    }
    self.inner.load_user(learner).await
  }

  async fn load_progress(&self, learner: &str, language: &str, order: u32) -> GraderResult<Progress> {
    self.inner.load_progress(learner, language, order).await
  }

  async fn save_progress(&self, learner: &str, language: &str, order: u32, patch: ProgressPatch) -> GraderResult<Progress> {
    if self.always_fail.load(Ordering::SeqCst) {
      return Err(GraderError::Persistence("store offline".into()));
    }
    let left = self.failures_left.load(Ordering::SeqCst);
    if left > 0 {
      self.failures_left.store(left - 1, Ordering::SeqCst);
      return Err(GraderError::Persistence("transient write failure".into()));
    }
    self.inner.save_progress(learner, language, order, patch).await
  }

  async fn reset_progress(&self, learner: &str, language: &str, order: u32) -> GraderResult<()> {
    self.inner.reset_progress(learner, language, order).await
  }

  async fn grant_xp(&self, learner: &str, amount: u64, day: &str, grant_key: &str) -> GraderResult<XpGrant> {
    self.grants.fetch_add(1, Ordering::SeqCst);
    self.inner.grant_xp(learner, amount, day, grant_key).await
  }

  async fn unlock_next_activity(&self, learner: &str, language: &str, new_order: u32) -> GraderResult<()> {
    self.unlocks.fetch_add(1, Ordering::SeqCst);
    self.inner.unlock_next_activity(learner, language, new_order).await
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
    self.inner.save_submission_code(learner, language, order, question_id, function_name, code).await
  }
}

pub fn learner_profile() -> UserProfile {
  UserProfile {
    uid: LEARNER.into(),
    xp: 0,
    current_activity: 1,
    current_language: Some("Python".into()),
    programming_languages: vec![LanguageTrack { lang_name: "Python".into(), current_activity: 1 }],
  }
}

pub async fn flaky_store() -> Arc<FlakyStore> {
  let inner = InMemoryStore::new();
  inner.seed_user(learner_profile()).await;
  Arc::new(FlakyStore::new(inner))
}

pub fn fast_retry() -> RetryConfig {
  RetryConfig {
    max_attempts: 3,
    base_backoff: Duration::from_millis(1),
    max_backoff: Duration::from_millis(2),
    jitter_max: None,
  }
}

pub fn deps(store: Arc<dyn ProgressStore>, executor: Arc<dyn ExecutionService>) -> SessionDeps {
  SessionDeps { store, executor, grading: GradingCfg::default(), retry: fast_retry() }
}

pub async fn open_first_functions(id: &str, deps: SessionDeps, seed: u64) -> GradingSession {
  let questions = QuestionSetProvider::new(seed_activities());
  GradingSession::open(id.into(), deps, &questions, LEARNER, "First-Functions", 1, StdRng::seed_from_u64(seed))
    .await
    .expect("session opens")
}

/// The event the execution service would push back for `req`.
pub fn verdict(req: &GradingRequest, success: bool) -> ResultEvent {
  ResultEvent {
    session_id: req.session_id.clone(),
    attempt: Some(req.attempt),
    question_id: Some(req.question_id.clone()),
    success,
    message: if success { String::new() } else { "add(2, 2) returned 5, expected 4".into() },
    test_results: vec![],
  }
}
