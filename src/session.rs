//! One learner working one activity.
//!
//! The session owns the progression machine and performs every side effect a transition
//! asks for: persistence (retried, merge-writes), reshuffle on restart, the reward grant and
//! the unlock on completion. At most one submission is in flight; results are matched to it
//! by attempt token and anything else is dropped as stale.

use std::sync::Arc;

use rand::rngs::StdRng;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::config::GradingCfg;
use crate::domain::{Activity, ProgressPatch, Question, ResultEvent, TestOutcome};
use crate::error::{GraderError, GraderResult};
use crate::execution::{ExecutionService, GradingRequest};
use crate::progression::{Phase, Progression, Transition, COMPLETION_XP};
use crate::questions::{shuffle, QuestionSetProvider};
use crate::retry::{retry_async_with_config, RetryConfig};
use crate::store::{ProgressStore, XpGrant};
use crate::util::today_key;

pub const SUCCESS_TEXT: &str = "Success! You got it right.";
pub const RESTART_NOTICE: &str = "You have 3 incorrect answers. Restarting...";
pub const TIMEOUT_NOTICE: &str = "The grading service did not answer in time. Please submit again.";

/// Collaborators shared by every session of the process.
#[derive(Clone)]
pub struct SessionDeps {
  pub store: Arc<dyn ProgressStore>,
  pub executor: Arc<dyn ExecutionService>,
  pub grading: GradingCfg,
  pub retry: RetryConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionHandle {
  pub session_id: String,
  pub attempt: u64,
  pub question_id: String,
}

#[derive(Clone, Debug)]
struct InFlight {
  attempt: u64,
  question_id: String,
  deadline: Instant,
}

/// What happened when a result event reached the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResultOutcome {
  /// Not the in-flight submission; nothing changed.
  Stale,
  Graded(Graded),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Graded {
  pub attempt: u64,
  pub success: bool,
  pub transition: Transition,
  /// Text to keep on screen; `None` when the view moves on (advance, restart).
  pub display: Option<String>,
  pub test_results: Vec<TestOutcome>,
  pub reward: Option<XpGrant>,
  pub unlocked_order: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeadlineEvent {
  /// The in-flight submission was abandoned; submitting is possible again.
  ResultTimedOut { attempt: u64 },
  /// Completion window elapsed; the session is now `Completed`.
  Completed,
}

pub struct GradingSession {
  id: String,
  learner: String,
  language: String,
  activity: Activity,
  progression: Progression,
  rng: StdRng,
  in_flight: Option<InFlight>,
  next_attempt: u64,
  completion_deadline: Option<Instant>,
  rewarded: bool,
  deps: SessionDeps,
}

impl GradingSession {
  /// Load learner, activity and stored progress, and fix a presentation order.
  /// Re-opening an already completed activity resets it for replay.
  #[instrument(level = "info", skip(deps, questions, rng), fields(session = %id))]
  pub async fn open(
    id: String,
    deps: SessionDeps,
    questions: &QuestionSetProvider,
    learner: &str,
    title: &str,
    order: u32,
    mut rng: StdRng,
  ) -> GraderResult<Self> {
    if learner.trim().is_empty() || title.trim().is_empty() || order == 0 {
      return Err(GraderError::BadRequest("Missing activity parameters".into()));
    }

    let store = deps.store.clone();
    let user = retry_async_with_config(&deps.retry, || store.load_user(learner)).await?;
    let language = user
      .current_language
      .clone()
      .filter(|l| !l.is_empty())
      .unwrap_or_else(|| deps.grading.default_language.clone());
    let activity = questions.load_activity(&language, title, order)?;

    let ids: Vec<String> = activity.questions.iter().map(|q| q.id.clone()).collect();
    let permutation = shuffle(&ids, &mut rng);

    let mut stored = retry_async_with_config(&deps.retry, || store.load_progress(learner, &language, order)).await?;
    if stored.completed {
      info!(target: "session", %learner, order, "Activity was completed before; resetting for replay");
      if let Err(e) = retry_async_with_config(&deps.retry, || store.reset_progress(learner, &language, order)).await {
        error!(target: "session", error = %e, "Failed to reset completed progress");
      }
      stored = Default::default();
    }

    let progression = Progression::resume(permutation, stored);
    info!(
      target: "session",
      %learner, %language, order,
      correct = progression.correct_count(),
      incorrect = progression.incorrect_count(),
      cursor = progression.cursor(),
      "Session opened"
    );

    Ok(Self {
      id,
      learner: learner.to_string(),
      language,
      activity,
      progression,
      rng,
      in_flight: None,
      next_attempt: 1,
      completion_deadline: None,
      rewarded: false,
      deps,
    })
  }

  pub fn id(&self) -> &str { &self.id }
  pub fn learner(&self) -> &str { &self.learner }
  pub fn language(&self) -> &str { &self.language }
  pub fn activity(&self) -> &Activity { &self.activity }
  pub fn progression(&self) -> &Progression { &self.progression }
  pub fn phase(&self) -> Phase { self.progression.phase() }
  pub fn is_awaiting_result(&self) -> bool { self.in_flight.is_some() }

  pub fn current_question(&self) -> Option<&Question> {
    self.progression.current_question_id().and_then(|id| self.activity.question(id))
  }

  /// Dispatch `code` for the current question. The verdict arrives later via `on_result`.
  #[instrument(level = "info", skip(self, code), fields(session = %self.id, code_len = code.len()))]
  pub async fn submit(&mut self, code: &str) -> GraderResult<SubmissionHandle> {
    if self.progression.is_completed() {
      return Err(GraderError::ActivityCompleted);
    }
    if self.in_flight.is_some() {
      warn!(target: "session", "Submit rejected: result still pending");
      return Err(GraderError::Busy);
    }
    if code.trim().is_empty() {
      return Err(GraderError::EmptyCode);
    }
    let question = self.current_question().cloned().ok_or(GraderError::ActivityCompleted)?;

    let attempt = self.next_attempt;
    self.next_attempt += 1;
    self.in_flight = Some(InFlight {
      attempt,
      question_id: question.id.clone(),
      deadline: Instant::now() + self.deps.grading.result_timeout(),
    });

    // The stored copy is a convenience for the learner; grading goes ahead without it.
    if let Err(e) = self
      .deps
      .store
      .save_submission_code(&self.learner, &self.language, self.activity.order, &question.id, &question.function_name, code)
      .await
    {
      warn!(target: "session", error = %e, "Could not store submitted code");
    }

    let req = GradingRequest {
      function_name: question.function_name.clone(),
      activity_order: self.activity.order,
      user_id: self.learner.clone(),
      question_id: question.id.clone(),
      user_code: code.to_string(),
      language: self.language.clone(),
      test_count: question.test_count,
      session_id: self.id.clone(),
      attempt,
    };

    if let Err(e) = self.deps.executor.dispatch(&req).await {
      self.in_flight = None;
      error!(target: "session", attempt, error = %e, "Dispatch failed; submission released");
      return Err(e);
    }

    info!(target: "session", attempt, question = %question.id, "Submission in flight");
    Ok(SubmissionHandle { session_id: self.id.clone(), attempt, question_id: question.id })
  }

  fn matches_in_flight(&self, event: &ResultEvent) -> Option<u64> {
    let pending = self.in_flight.as_ref()?;
    if event.session_id != self.id {
      return None;
    }
    if event.attempt.map(|a| a != pending.attempt).unwrap_or(false) {
      return None;
    }
    if event.question_id.as_deref().map(|q| q != pending.question_id).unwrap_or(false) {
      return None;
    }
    Some(pending.attempt)
  }

  #[instrument(level = "info", skip(self, event), fields(session = %self.id, attempt = ?event.attempt, success = event.success))]
  pub async fn on_result(&mut self, event: ResultEvent) -> ResultOutcome {
    let Some(attempt) = self.matches_in_flight(&event) else {
      debug!(target: "session", "Stale result dropped");
      return ResultOutcome::Stale;
    };

    let transition = self.progression.apply(event.success);
    if transition == Transition::Ignored {
      self.in_flight = None;
      return ResultOutcome::Stale;
    }
    self.in_flight = None;

    let mut graded = Graded {
      attempt,
      success: event.success,
      transition,
      display: None,
      test_results: event.test_results,
      reward: None,
      unlocked_order: None,
    };

    match transition {
      Transition::Advanced { cursor } => {
        info!(target: "session", cursor, correct = self.progression.correct_count(), "Correct; advancing");
        self.persist_counters().await;
      }
      Transition::Retry { incorrect } => {
        info!(target: "session", incorrect, "Incorrect; same question");
        graded.display = Some(format!("Incorrect output:\n{}", event.message));
        self.persist_counters().await;
      }
      Transition::Restart => {
        let ids: Vec<String> = self.activity.questions.iter().map(|q| q.id.clone()).collect();
        let reshuffled = shuffle(&ids, &mut self.rng);
        self.progression.restart(reshuffled);
        info!(target: "session", "Restart threshold reached; counters reset and order reshuffled");
        self.persist_counters().await;
      }
      Transition::Completing => {
        graded.display = Some(SUCCESS_TEXT.to_string());
        let (reward, unlocked) = self.complete().await;
        graded.reward = reward;
        graded.unlocked_order = unlocked;
      }
      Transition::Ignored => {}
    }
    ResultOutcome::Graded(graded)
  }

  /// Enter the completion side effects: completed flag, reward, unlock, animation timer.
  async fn complete(&mut self) -> (Option<XpGrant>, Option<u32>) {
    self.completion_deadline = Some(Instant::now() + self.deps.grading.completion_animation());
    let p = self.progression.progress();
    self
      .persist(ProgressPatch {
        correct_count: Some(p.correct_count),
        incorrect_count: Some(p.incorrect_count),
        completed: Some(true),
      })
      .await;

    if self.rewarded {
      return (None, None);
    }
    self.rewarded = true;

    let store = self.deps.store.clone();
    let key = format!("{}:{}:{}", self.language, self.activity.order, self.id);
    let day = today_key();
    let reward = match retry_async_with_config(&self.deps.retry, || {
      store.grant_xp(&self.learner, COMPLETION_XP, &day, &key)
    })
    .await
    {
      Ok(g) => {
        info!(target: "session", ?g, "Completion reward granted");
        Some(g)
      }
      Err(e) => {
        error!(target: "session", error = %e, "Completion reward failed");
        None
      }
    };

    let next = self.activity.order + 1;
    let unlocked = match retry_async_with_config(&self.deps.retry, || {
      store.unlock_next_activity(&self.learner, &self.language, next)
    })
    .await
    {
      Ok(()) => Some(next),
      Err(e) => {
        error!(target: "session", error = %e, next, "Unlock of next activity failed");
        None
      }
    };
    (reward, unlocked)
  }

  async fn persist_counters(&self) {
    let p = self.progression.progress();
    self.persist(ProgressPatch::counters(p.correct_count, p.incorrect_count)).await;
  }

  /// Retried merge-write. On final failure the in-memory state stays authoritative for this connection.
  async fn persist(&self, patch: ProgressPatch) -> bool {
    let store = self.deps.store.clone();
    let res = retry_async_with_config(&self.deps.retry, || {
      store.save_progress(&self.learner, &self.language, self.activity.order, patch)
    })
    .await;
    match res {
      Ok(_) => true,
      Err(e) => {
        error!(target: "store", session = %self.id, error = %e, ?patch, "Progress write failed after retries");
        false
      }
    }
  }

  /// Earliest pending timer: result timeout or end of the completion window.
  pub fn next_deadline(&self) -> Option<Instant> {
    let a = self.in_flight.as_ref().map(|f| f.deadline);
    match (a, self.completion_deadline) {
      (Some(x), Some(y)) => Some(x.min(y)),
      (x, y) => x.or(y),
    }
  }

  pub fn on_deadline(&mut self, now: Instant) -> Vec<DeadlineEvent> {
    let mut out = Vec::new();
    if let Some(f) = self.in_flight.as_ref().filter(|f| f.deadline <= now) {
      let attempt = f.attempt;
      self.in_flight = None;
      warn!(target: "session", session = %self.id, attempt, "Result wait timed out; submission abandoned");
      out.push(DeadlineEvent::ResultTimedOut { attempt });
    }
    if self.completion_deadline.map(|d| d <= now).unwrap_or(false) {
      self.completion_deadline = None;
      if self.progression.finish_completion() {
        info!(target: "session", session = %self.id, "Activity completed");
        out.push(DeadlineEvent::Completed);
      }
    }
    out
  }

  pub async fn check_health(&self) -> String {
    self.deps.executor.check_health().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{LanguageTrack, Progress, UserProfile};
  use crate::progression::COMPLETION_THRESHOLD;
  use crate::seeds::seed_activities;
  use crate::store::InMemoryStore;
  use async_trait::async_trait;
  use rand::SeedableRng;
  use std::sync::Mutex;
  use std::time::Duration;

  #[derive(Default)]
  struct FakeExecutor {
    sent: Mutex<Vec<GradingRequest>>,
    down: std::sync::atomic::AtomicBool,
  }

  #[async_trait]
  impl ExecutionService for FakeExecutor {
    async fn dispatch(&self, req: &GradingRequest) -> GraderResult<()> {
      if self.down.load(std::sync::atomic::Ordering::SeqCst) {
        return Err(GraderError::ServiceUnavailable("connection refused".into()));
      }
      self.sent.lock().unwrap().push(req.clone());
      Ok(())
    }
    async fn check_health(&self) -> String { "pong".into() }
  }

  async fn fixture() -> (Arc<InMemoryStore>, Arc<FakeExecutor>, GradingSession) {
    let store = Arc::new(InMemoryStore::new());
    store
      .seed_user(UserProfile {
        uid: "kid".into(),
        xp: 0,
        current_activity: 1,
        current_language: Some("Python".into()),
        programming_languages: vec![LanguageTrack { lang_name: "Python".into(), current_activity: 1 }],
      })
      .await;
    let exec = Arc::new(FakeExecutor::default());
    let deps = SessionDeps {
      store: store.clone(),
      executor: exec.clone(),
      grading: GradingCfg::default(),
      retry: RetryConfig::once(),
    };
    let qs = QuestionSetProvider::new(seed_activities());
    let s = GradingSession::open("s1".into(), deps, &qs, "kid", "First-Functions", 1, StdRng::seed_from_u64(3))
      .await
      .unwrap();
    (store, exec, s)
  }

  fn result(s: &GradingSession, attempt: u64, success: bool) -> ResultEvent {
    ResultEvent {
      session_id: s.id().to_string(),
      attempt: Some(attempt),
      question_id: None,
      success,
      message: "expected 4, got 5".into(),
      test_results: vec![],
    }
  }

  #[tokio::test]
  async fn submit_carries_identity_and_locks() {
    let (_store, exec, mut s) = fixture().await;
    let q = s.current_question().unwrap().clone();
    let h = s.submit("def add(a, b): return a + b").await.unwrap();
    assert_eq!(h.attempt, 1);
    assert_eq!(h.question_id, q.id);

    let sent = exec.sent.lock().unwrap()[0].clone();
    assert_eq!(sent.function_name, q.function_name);
    assert_eq!(sent.test_count, q.test_count);
    assert_eq!(sent.session_id, "s1");

    assert_eq!(s.submit("again").await, Err(GraderError::Busy));
    assert_eq!(exec.sent.lock().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn empty_code_is_rejected_without_dispatch() {
    let (_store, exec, mut s) = fixture().await;
    assert_eq!(s.submit("   \n").await, Err(GraderError::EmptyCode));
    assert!(exec.sent.lock().unwrap().is_empty());
    assert!(!s.is_awaiting_result());
  }

  #[tokio::test]
  async fn transport_failure_releases_the_lock() {
    let (store, exec, mut s) = fixture().await;
    exec.down.store(true, std::sync::atomic::Ordering::SeqCst);
    let err = s.submit("code").await.unwrap_err();
    assert!(matches!(err, GraderError::ServiceUnavailable(_)));
    assert!(!s.is_awaiting_result());
    assert_eq!(store.load_progress("kid", "Python", 1).await.unwrap(), Progress::default());

    exec.down.store(false, std::sync::atomic::Ordering::SeqCst);
    assert_eq!(s.submit("code").await.unwrap().attempt, 2);
  }

  #[tokio::test]
  async fn wrong_attempt_token_is_stale() {
    let (_store, _exec, mut s) = fixture().await;
    s.submit("code").await.unwrap();
    let out = s.on_result(result(&s, 99, true)).await;
    assert_eq!(out, ResultOutcome::Stale);
    assert!(s.is_awaiting_result());
    assert_eq!(s.progression().correct_count(), 0);
  }

  #[tokio::test]
  async fn completion_runs_side_effects_once() {
    let (store, _exec, mut s) = fixture().await;
    for i in 1..=COMPLETION_THRESHOLD as u64 {
      let h = s.submit("code").await.unwrap();
      assert_eq!(h.attempt, i);
      let out = s.on_result(result(&s, i, true)).await;
      assert!(matches!(out, ResultOutcome::Graded(_)));
    }
    assert_eq!(s.phase(), Phase::Completing);
    assert_eq!(store.load_progress("kid", "Python", 1).await.unwrap().completed, true);
    assert_eq!(store.user("kid").await.unwrap().xp, 100);
    assert_eq!(store.user("kid").await.unwrap().current_activity, 2);

    assert_eq!(s.submit("code").await, Err(GraderError::ActivityCompleted));
    assert_eq!(s.on_result(result(&s, 5, true)).await, ResultOutcome::Stale);
    assert_eq!(store.user("kid").await.unwrap().xp, 100);

    let deadline = s.next_deadline().unwrap();
    assert_eq!(s.on_deadline(deadline), vec![DeadlineEvent::Completed]);
    assert_eq!(s.progression().cursor(), s.activity().questions.len());
  }

  #[tokio::test]
  async fn result_timeout_reopens_submission() {
    let (_store, _exec, mut s) = fixture().await;
    s.submit("code").await.unwrap();
    let later = Instant::now() + Duration::from_secs(3600);
    assert_eq!(s.on_deadline(later), vec![DeadlineEvent::ResultTimedOut { attempt: 1 }]);
    assert!(!s.is_awaiting_result());
    assert_eq!(s.on_result(result(&s, 1, true)).await, ResultOutcome::Stale);
    assert_eq!(s.submit("code").await.unwrap().attempt, 2);
  }
}
