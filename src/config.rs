//! Loading grader configuration (execution service, grading timers, retry policy,
//! optional activity bank) from TOML, with a few environment overrides.
//!
//! See `GraderConfig` for the expected schema. Every section is optional.

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::{Activity, UserProfile};
use crate::retry::RetryConfig;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct GraderConfig {
  #[serde(default)]
  pub execution: ExecutionCfg,
  #[serde(default)]
  pub grading: GradingCfg,
  #[serde(default)]
  pub persistence: PersistenceCfg,
  /// Activity bank. Built-in seeds are added on top unless an entry shares their (language, order).
  #[serde(default)]
  pub activities: Vec<Activity>,
  /// Learner documents loaded into the bundled store at startup. Anyone else is created on first open.
  #[serde(default)]
  pub learners: Vec<UserProfile>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ExecutionCfg {
  pub base_url: String,
  pub request_timeout_secs: u64,
}

impl Default for ExecutionCfg {
  fn default() -> Self {
    Self { base_url: "http://localhost:5002".into(), request_timeout_secs: 10 }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GradingCfg {
  /// How long a dispatched submission may wait for its result before it is abandoned.
  pub result_timeout_secs: u64,
  /// Length of the completion animation window between `Completing` and `Completed`.
  pub completion_animation_ms: u64,
  pub default_language: String,
}

impl Default for GradingCfg {
  fn default() -> Self {
    Self { result_timeout_secs: 45, completion_animation_ms: 3000, default_language: "Python".into() }
  }
}

impl GradingCfg {
  pub fn result_timeout(&self) -> Duration { Duration::from_secs(self.result_timeout_secs) }
  pub fn completion_animation(&self) -> Duration { Duration::from_millis(self.completion_animation_ms) }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PersistenceCfg {
  pub max_attempts: usize,
  pub base_backoff_ms: u64,
  pub max_backoff_ms: u64,
}

impl Default for PersistenceCfg {
  fn default() -> Self {
    Self { max_attempts: 4, base_backoff_ms: 50, max_backoff_ms: 800 }
  }
}

impl PersistenceCfg {
  pub fn retry(&self) -> RetryConfig {
    RetryConfig {
      max_attempts: self.max_attempts.max(1),
      base_backoff: Duration::from_millis(self.base_backoff_ms),
      max_backoff: Duration::from_millis(self.max_backoff_ms),
      jitter_max: Some(Duration::from_millis(self.base_backoff_ms / 2)),
    }
  }
}

/// Parse a TOML document into `GraderConfig`.
pub fn parse_config(s: &str) -> Result<GraderConfig, toml::de::Error> {
  toml::from_str::<GraderConfig>(s)
}

/// Load from GRADER_CONFIG_PATH (falls back to defaults on any IO/parse error),
/// then apply EXECUTION_BASE_URL when present.
pub fn load_config_from_env() -> GraderConfig {
  let mut cfg = match std::env::var("GRADER_CONFIG_PATH") {
    Ok(path) => match std::fs::read_to_string(&path) {
      Ok(s) => match parse_config(&s) {
        Ok(cfg) => {
          info!(target: "grader", %path, activities = cfg.activities.len(), learners = cfg.learners.len(), "Loaded grader config (TOML)");
          cfg
        }
        Err(e) => {
          error!(target: "grader", %path, error = %e, "Failed to parse TOML config; using defaults");
          GraderConfig::default()
        }
      },
      Err(e) => {
        error!(target: "grader", %path, error = %e, "Failed to read TOML config file; using defaults");
        GraderConfig::default()
      }
    },
    Err(_) => GraderConfig::default(),
  };

  if let Ok(url) = std::env::var("EXECUTION_BASE_URL") {
    if !url.trim().is_empty() {
      cfg.execution.base_url = url.trim_end_matches('/').to_string();
    }
  }
  cfg
}
