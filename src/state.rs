//! Application state shared by every route: configuration, activity catalogue,
//! persistence adapter, execution client and the result hub.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::channel::ResultHub;
use crate::config::GraderConfig;
use crate::error::GraderResult;
use crate::execution::{ExecutionService, HttpExecutionClient};
use crate::questions::QuestionSetProvider;
use crate::seeds::seed_activities;
use crate::session::SessionDeps;
use crate::store::{InMemoryStore, ProgressStore};

#[derive(Clone)]
pub struct AppState {
  pub config: GraderConfig,
  pub questions: QuestionSetProvider,
  pub store: Arc<dyn ProgressStore>,
  pub executor: Arc<dyn ExecutionService>,
  pub hub: ResultHub,
}

impl AppState {
  /// Production wiring: HTTP execution client and the bundled in-memory store.
  #[instrument(level = "info", skip_all)]
  pub fn new(config: GraderConfig) -> GraderResult<Self> {
    let executor = HttpExecutionClient::new(&config.execution)?;
    info!(target: "grader", base_url = %executor.base_url, "Execution service client ready");
    let store = InMemoryStore::provisioning(config.grading.default_language.clone(), config.learners.clone());
    Ok(Self::with_parts(config, Arc::new(store), Arc::new(executor)))
  }

  /// Wire explicit collaborators. Config activities come first, built-in seeds fill the gaps.
  pub fn with_parts(config: GraderConfig, store: Arc<dyn ProgressStore>, executor: Arc<dyn ExecutionService>) -> Self {
    let mut activities = config.activities.clone();
    activities.extend(seed_activities());
    let questions = QuestionSetProvider::new(activities);
    Self { config, questions, store, executor, hub: ResultHub::new() }
  }

  pub fn session_deps(&self) -> SessionDeps {
    SessionDeps {
      store: self.store.clone(),
      executor: self.executor.clone(),
      grading: self.config.grading.clone(),
      retry: self.config.persistence.retry(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{LanguageTrack, UserProfile};
  use crate::session::GradingSession;
  use rand::{rngs::StdRng, SeedableRng};

  #[tokio::test]
  async fn default_wiring_opens_activities_for_new_learners() {
    let state = AppState::new(GraderConfig::default()).unwrap();
    let session = GradingSession::open(
      "s-new".into(),
      state.session_deps(),
      &state.questions,
      "any-learner",
      "First-Functions",
      1,
      StdRng::seed_from_u64(1),
    )
    .await
    .unwrap();
    assert_eq!(session.language(), "Python");
    assert_eq!(session.progression().correct_count(), 0);
    assert!(session.current_question().is_some());
  }

  #[tokio::test]
  async fn configured_learners_are_loaded_into_the_store() {
    let mut config = GraderConfig::default();
    config.learners.push(UserProfile {
      uid: "kid-7".into(),
      xp: 250,
      current_activity: 2,
      current_language: Some("Python".into()),
      programming_languages: vec![LanguageTrack { lang_name: "Python".into(), current_activity: 2 }],
    });
    let state = AppState::new(config).unwrap();
    let user = state.store.load_user("kid-7").await.unwrap();
    assert_eq!(user.xp, 250);
    assert_eq!(user.current_activity, 2);
  }
}
