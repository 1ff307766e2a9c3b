//! HTTP endpoint handlers. These are thin wrappers around state and the result hub.

use std::sync::Arc;
use axum::{extract::{Path, State}, http::StatusCode, Json, response::IntoResponse};
use tracing::{info, instrument};

use crate::channel::Delivery;
use crate::domain::ResultEvent;
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

/// Liveness probe of the execution service. Never touches any session.
#[instrument(level = "info", skip(state))]
pub async fn http_execution_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let status = state.executor.check_health().await;
  Json(ExecutionHealthOut { status })
}

/// One-shot result ingress for execution services that call back over HTTP.
/// 202 when a session took the event, 200 with `delivered: false` when it was stale.
#[instrument(level = "info", skip(state, body), fields(session = %body.session_id, attempt = ?body.attempt, success = body.success))]
pub async fn http_post_result(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ResultEvent>,
) -> impl IntoResponse {
  match state.hub.publish(body) {
    Delivery::Delivered => (StatusCode::ACCEPTED, Json(PublishOut { delivered: true })),
    Delivery::NoSubscriber => {
      info!(target: "results", "HTTP result for unknown or closed session discarded");
      (StatusCode::OK, Json(PublishOut { delivered: false }))
    }
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_list_activities(
  State(state): State<Arc<AppState>>,
  Path(language): Path<String>,
) -> impl IntoResponse {
  let activities = state.questions.list(&language);
  Json(ActivitiesOut { language, activities })
}
