//! Public protocol structs for the learner WebSocket and the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::TestOutcome;
use crate::error::GraderError;
use crate::progression::Phase;
use crate::questions::ActivitySummary;
use crate::session::GradingSession;

/// Messages the learner's page can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
  Ping,
  OpenActivity {
    #[serde(rename = "userId")]
    user_id: String,
    #[serde(rename = "activityTitle")]
    activity_title: String,
    #[serde(rename = "activityOrder")]
    activity_order: u32,
  },
  SubmitCode {
    code: String,
  },
  CheckHealth,
  LeaveActivity,
}

impl ClientWsMessage {
  /// Frame name for logs. Learner code never goes to the log.
  pub fn kind(&self) -> &'static str {
    match self {
      ClientWsMessage::Ping => "ping",
      ClientWsMessage::OpenActivity { .. } => "open_activity",
      ClientWsMessage::SubmitCode { .. } => "submit_code",
      ClientWsMessage::CheckHealth => "check_health",
      ClientWsMessage::LeaveActivity => "leave_activity",
    }
  }
}

/// Messages the engine sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
  Pong,
  ActivityOpened {
    session: SessionView,
  },
  SubmissionAccepted {
    attempt: u64,
    #[serde(rename = "questionId")]
    question_id: String,
  },
  Busy {
    message: String,
  },
  ServiceUnavailable {
    message: String,
  },
  Graded {
    attempt: u64,
    success: bool,
    result: Option<String>,
    #[serde(rename = "testResults")]
    test_results: Vec<TestOutcome>,
    session: SessionView,
  },
  Restarted {
    message: String,
    session: SessionView,
  },
  ActivityCompleting {
    #[serde(rename = "xpGranted")]
    xp_granted: bool,
    #[serde(rename = "unlockedOrder")]
    unlocked_order: Option<u32>,
    session: SessionView,
  },
  ActivityCompleted {
    session: SessionView,
  },
  GradingTimedOut {
    attempt: u64,
    message: String,
  },
  Health {
    status: String,
  },
  ActivityClosed,
  Error {
    code: String,
    message: String,
  },
}

impl ServerWsMessage {
  /// Map an engine error onto the frame the learner should see.
  pub fn from_error(e: &GraderError) -> Self {
    match e {
      GraderError::Busy => ServerWsMessage::Busy { message: e.to_string() },
      GraderError::ServiceUnavailable(_) => ServerWsMessage::ServiceUnavailable { message: e.to_string() },
      _ => ServerWsMessage::Error { code: e.code().to_string(), message: e.to_string() },
    }
  }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
  pub id: String,
  pub prompt: String,
  pub function_name: String,
  pub test_count: u32,
}

/// Everything the question page renders from.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
  pub session_id: String,
  pub language: String,
  pub title: String,
  pub description: String,
  pub order: u32,
  pub cursor: usize,
  pub total_questions: usize,
  pub question: Option<QuestionView>,
  pub correct_count: u32,
  pub incorrect_count: u32,
  pub phase: Phase,
  pub completed: bool,
  pub submitting: bool,
}

pub fn session_view(s: &GradingSession) -> SessionView {
  let p = s.progression();
  SessionView {
    session_id: s.id().to_string(),
    language: s.language().to_string(),
    title: s.activity().title.clone(),
    description: s.activity().description.clone(),
    order: s.activity().order,
    cursor: p.cursor(),
    total_questions: p.order().len(),
    question: s.current_question().map(|q| QuestionView {
      id: q.id.clone(),
      prompt: q.prompt.clone(),
      function_name: q.function_name.clone(),
      test_count: q.test_count,
    }),
    correct_count: p.correct_count(),
    incorrect_count: p.incorrect_count(),
    phase: p.phase(),
    completed: p.is_completed(),
    submitting: s.is_awaiting_result(),
  }
}

//
// HTTP request/response DTOs
//

#[derive(Serialize)]
pub struct HealthOut {
  pub ok: bool,
}

#[derive(Serialize)]
pub struct ExecutionHealthOut {
  pub status: String,
}

#[derive(Serialize)]
pub struct PublishOut {
  pub delivered: bool,
}

#[derive(Serialize)]
pub struct ActivitiesOut {
  pub language: String,
  pub activities: Vec<ActivitySummary>,
}
