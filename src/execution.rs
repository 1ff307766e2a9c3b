//! Client for the external code execution service.
//!
//! `dispatch` is fire-and-forget: a 2xx only means the service accepted the job. The verdict
//! comes back later through the result channel, tagged with `sessionId` and `attempt`.
//! Learner code is never logged, only its length.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::ExecutionCfg;
use crate::error::{GraderError, GraderResult};

/// Status string shown when the liveness probe fails.
pub const HEALTH_UNREACHABLE: &str = "Error: Unable to reach the server.";

/// Body of `POST /test-function`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GradingRequest {
  pub function_name: String,
  pub activity_order: u32,
  pub user_id: String,
  pub question_id: String,
  pub user_code: String,
  pub language: String,
  pub test_count: u32,
  pub session_id: String,
  pub attempt: u64,
}

#[async_trait]
pub trait ExecutionService: Send + Sync {
  /// Hand a grading job to the service. Errors are transport problems, never verdicts.
  async fn dispatch(&self, req: &GradingRequest) -> GraderResult<()>;

  /// Liveness probe; always yields a displayable status string.
  async fn check_health(&self) -> String;
}

#[derive(Clone)]
pub struct HttpExecutionClient {
  client: reqwest::Client,
  pub base_url: String,
}

#[derive(Deserialize)]
struct PingOut {
  #[serde(default)]
  message: String,
}

impl HttpExecutionClient {
  pub fn new(cfg: &ExecutionCfg) -> GraderResult<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(cfg.request_timeout_secs.max(1)))
      .build()
      .map_err(|e| GraderError::ServiceUnavailable(format!("HTTP client init failed: {}", e)))?;
    Ok(Self { client, base_url: cfg.base_url.trim_end_matches('/').to_string() })
  }
}

#[async_trait]
impl ExecutionService for HttpExecutionClient {
  #[instrument(
    level = "info",
    skip(self, req),
    fields(session = %req.session_id, attempt = req.attempt, question = %req.question_id, code_len = req.user_code.len())
  )]
  async fn dispatch(&self, req: &GradingRequest) -> GraderResult<()> {
    let url = format!("{}/test-function", self.base_url);
    let start = std::time::Instant::now();
    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "codequest-grader/0.1")
      .header(CONTENT_TYPE, "application/json")
      .json(req)
      .send()
      .await
      .map_err(|e| {
        error!(target: "execution", error = %e, "Dispatch failed");
        GraderError::ServiceUnavailable(e.to_string())
      })?;

    let status = res.status();
    if !status.is_success() {
      let body = res.text().await.unwrap_or_default();
      error!(target: "execution", %status, body = %crate::util::trunc_for_log(&body, 200), "Execution service rejected job");
      return Err(GraderError::ServiceUnavailable(format!("HTTP {}", status)));
    }
    info!(target: "execution", elapsed = ?start.elapsed(), "Grading job accepted");
    Ok(())
  }

  #[instrument(level = "info", skip(self))]
  async fn check_health(&self) -> String {
    let url = format!("{}/ping", self.base_url);
    let res = match self.client.get(&url).send().await {
      Ok(r) if r.status().is_success() => r,
      Ok(r) => {
        error!(target: "execution", status = %r.status(), "Health probe failed");
        return HEALTH_UNREACHABLE.to_string();
      }
      Err(e) => {
        error!(target: "execution", error = %e, "Health probe failed");
        return HEALTH_UNREACHABLE.to_string();
      }
    };
    match res.json::<PingOut>().await {
      Ok(p) if !p.message.is_empty() => p.message,
      Ok(_) => "ok".to_string(),
      Err(e) => {
        error!(target: "execution", error = %e, "Health probe returned unreadable body");
        HEALTH_UNREACHABLE.to_string()
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample_request() -> GradingRequest {
    GradingRequest {
      function_name: "add".into(),
      activity_order: 1,
      user_id: "u1".into(),
      question_id: "ff-add".into(),
      user_code: "def add(a, b):\n  return a + b".into(),
      language: "Python".into(),
      test_count: 3,
      session_id: "s1".into(),
      attempt: 7,
    }
  }

  #[test]
  fn request_serializes_in_camel_case() {
    let req = sample_request();
    let v = serde_json::to_value(&req).unwrap();
    for key in ["functionName", "activityOrder", "userId", "questionId", "userCode", "language", "testCount", "sessionId", "attempt"] {
      assert!(v.get(key).is_some(), "missing {}", key);
    }
    assert_eq!(v["attempt"], 7);
  }

  #[tokio::test]
  async fn unreachable_service_is_a_transport_error() {
    // Port 9 (discard) on localhost is expected to refuse connections.
    let cfg = ExecutionCfg { base_url: "http://127.0.0.1:9".into(), request_timeout_secs: 1 };
    let client = HttpExecutionClient::new(&cfg).unwrap();
    assert_eq!(client.check_health().await, HEALTH_UNREACHABLE);

    let err = client.dispatch(&sample_request()).await.unwrap_err();
    assert!(matches!(err, GraderError::ServiceUnavailable(_)), "got {:?}", err);
  }

  async fn stub_service(status: axum::http::StatusCode) -> ExecutionCfg {
    let app = axum::Router::new()
      .route("/test-function", axum::routing::post(move || async move { (status, "runner says no") }))
      .route("/ping", axum::routing::get(|| async { axum::Json(serde_json::json!({ "message": "Server is running" })) }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      let _ = axum::serve(listener, app).await;
    });
    ExecutionCfg { base_url: format!("http://{}", addr), request_timeout_secs: 2 }
  }

  #[tokio::test]
  async fn rejected_job_is_a_transport_error() {
    let client = HttpExecutionClient::new(&stub_service(axum::http::StatusCode::SERVICE_UNAVAILABLE).await).unwrap();
    assert_eq!(client.check_health().await, "Server is running");
    let err = client.dispatch(&sample_request()).await.unwrap_err();
    assert_eq!(err, GraderError::ServiceUnavailable("HTTP 503 Service Unavailable".into()));
  }

  #[tokio::test]
  async fn accepted_job_dispatches_cleanly() {
    let client = HttpExecutionClient::new(&stub_service(axum::http::StatusCode::ACCEPTED).await).unwrap();
    assert_eq!(client.dispatch(&sample_request()).await, Ok(()));
  }
}
