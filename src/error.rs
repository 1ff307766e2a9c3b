//! Error taxonomy for the grading engine.
//!
//! Grading failures (a learner's wrong answer) are NOT errors; they travel as
//! ordinary result events. Everything here is recovered at the session edge.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraderError {
  #[error("Not found: {0}")]
  NotFound(String),

  #[error("Invalid activity: {0}")]
  InvalidActivity(String),

  #[error("A submission is already being graded")]
  Busy,

  #[error("Submitted code is empty")]
  EmptyCode,

  #[error("Activity already completed")]
  ActivityCompleted,

  #[error("Grading service unavailable: {0}")]
  ServiceUnavailable(String),

  #[error("Persistence error: {0}")]
  Persistence(String),

  #[error("No activity is open on this connection")]
  NoActiveSession,

  #[error("Bad request: {0}")]
  BadRequest(String),
}

impl GraderError {
  /// Short machine-readable code used in wire error frames.
  pub fn code(&self) -> &'static str {
    match self {
      GraderError::NotFound(_) => "not_found",
      GraderError::InvalidActivity(_) => "invalid_activity",
      GraderError::Busy => "busy",
      GraderError::EmptyCode => "empty_code",
      GraderError::ActivityCompleted => "activity_completed",
      GraderError::ServiceUnavailable(_) => "service_unavailable",
      GraderError::Persistence(_) => "persistence",
      GraderError::NoActiveSession => "no_active_session",
      GraderError::BadRequest(_) => "bad_request",
    }
  }
}

pub type GraderResult<T> = Result<T, GraderError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn messages_are_learner_readable() {
    assert_eq!(GraderError::NotFound("activity".into()).to_string(), "Not found: activity");
    assert_eq!(
      GraderError::ServiceUnavailable("connection refused".into()).to_string(),
      "Grading service unavailable: connection refused"
    );
  }

  #[test]
  fn codes_distinguish_transport_from_busy() {
    assert_eq!(GraderError::Busy.code(), "busy");
    assert_eq!(GraderError::ServiceUnavailable(String::new()).code(), "service_unavailable");
    assert_ne!(GraderError::Busy.code(), GraderError::EmptyCode.code());
  }
}
