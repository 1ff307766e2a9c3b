//! WebSocket endpoints.
//!
//! `/ws` is the learner channel: one grading session per opened activity, driven by learner
//! frames, result events for that session, and the session's timers.
//! `/results/ws` is the execution service's push channel: every frame is a `ResultEvent`
//! for some session and is handed to the result hub.

use std::sync::Arc;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use rand::{rngs::StdRng, SeedableRng};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::channel::{Delivery, Subscription};
use crate::domain::ResultEvent;
use crate::protocol::{session_view, ClientWsMessage, ServerWsMessage};
use crate::progression::Transition;
use crate::session::{DeadlineEvent, GradingSession, ResultOutcome, RESTART_NOTICE, TIMEOUT_NOTICE};
use crate::state::AppState;
use crate::store::XpGrant;

type Active = Option<(GradingSession, Subscription)>;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "grader", "Learner WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(ws, state))]
pub async fn results_ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "results", "Execution service result channel upgrade requested");
  ws.on_upgrade(move |socket| handle_results_ws(socket, state))
}

async fn next_result(active: &mut Active) -> ResultEvent {
  if let Some((_, sub)) = active.as_mut() {
    if let Some(ev) = sub.recv().await {
      return ev;
    }
  }
  std::future::pending().await
}

async fn sleep_until_opt(deadline: Option<Instant>) {
  match deadline {
    Some(d) => tokio::time::sleep_until(d).await,
    None => std::future::pending().await,
  }
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "grader", "Learner WebSocket connected");
  let mut active: Active = None;

  loop {
    let deadline = active.as_ref().and_then(|(s, _)| s.next_deadline());

    let replies = tokio::select! {
      msg = socket.recv() => match msg {
        Some(Ok(Message::Text(txt))) => match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "grader", frame = incoming.kind(), "WS received");
            handle_client_ws(incoming, &state, &mut active).await
          }
          Err(e) => vec![ServerWsMessage::Error { code: "bad_request".into(), message: format!("Invalid JSON: {}", e) }],
        },
        Some(Ok(Message::Ping(payload))) => {
          let _ = socket.send(Message::Pong(payload)).await;
          continue;
        }
        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
        Some(Ok(_)) => continue,
      },

      ev = next_result(&mut active) => match active.as_mut() {
        Some((session, _)) => {
          let outcome = session.on_result(ev).await;
          result_frames(session, outcome)
        }
        None => continue,
      },

      _ = sleep_until_opt(deadline) => match active.as_mut() {
        Some((session, _)) => {
          let events = session.on_deadline(Instant::now());
          deadline_frames(session, events)
        }
        None => continue,
      },
    };

    for reply in replies {
      let out = serde_json::to_string(&reply).unwrap_or_else(|e| {
        serde_json::json!({ "type": "error", "code": "internal", "message": format!("Serialization error: {}", e) }).to_string()
      });
      if let Err(e) = socket.send(Message::Text(out)).await {
        error!(target: "grader", error = %e, "WS send error");
        return;
      }
    }
  }
  // Dropping `active` unsubscribes; late results for this session are discarded by the hub.
  drop(active);
  info!(target: "grader", open_sessions = state.hub.subscriber_count(), "Learner WebSocket disconnected");
}

#[instrument(level = "info", skip_all)]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState, active: &mut Active) -> Vec<ServerWsMessage> {
  match msg {
    ClientWsMessage::Ping => vec![ServerWsMessage::Pong],

    ClientWsMessage::OpenActivity { user_id, activity_title, activity_order } => {
      let session_id = Uuid::new_v4().to_string();
      // Leave the previous activity first so its results can no longer reach us.
      *active = None;
      match GradingSession::open(
        session_id.clone(),
        state.session_deps(),
        &state.questions,
        &user_id,
        &activity_title,
        activity_order,
        StdRng::from_entropy(),
      )
      .await
      {
        Ok(session) => {
          let sub = state.hub.subscribe(&session_id);
          let view = session_view(&session);
          *active = Some((session, sub));
          debug!(target: "results", open_sessions = state.hub.subscriber_count(), "Session subscribed");
          vec![ServerWsMessage::ActivityOpened { session: view }]
        }
        Err(e) => {
          warn!(target: "session", %user_id, %activity_title, activity_order, error = %e, "Open activity failed");
          vec![ServerWsMessage::from_error(&e)]
        }
      }
    }

    ClientWsMessage::SubmitCode { code } => match active.as_mut() {
      Some((session, _)) => match session.submit(&code).await {
        Ok(h) => vec![ServerWsMessage::SubmissionAccepted { attempt: h.attempt, question_id: h.question_id }],
        Err(e) => vec![ServerWsMessage::from_error(&e)],
      },
      None => vec![ServerWsMessage::from_error(&crate::error::GraderError::NoActiveSession)],
    },

    ClientWsMessage::CheckHealth => {
      let status = state.executor.check_health().await;
      vec![ServerWsMessage::Health { status }]
    }

    ClientWsMessage::LeaveActivity => {
      if let Some((session, sub)) = active.take() {
        info!(target: "session", session = %sub.session_id(), awaiting = session.is_awaiting_result(), "Activity left");
      }
      vec![ServerWsMessage::ActivityClosed]
    }
  }
}

/// Frames for a result that reached the session.
pub fn result_frames(session: &GradingSession, outcome: ResultOutcome) -> Vec<ServerWsMessage> {
  let graded = match outcome {
    ResultOutcome::Stale => return vec![],
    ResultOutcome::Graded(g) => g,
  };
  let view = session_view(session);
  let mut out = vec![ServerWsMessage::Graded {
    attempt: graded.attempt,
    success: graded.success,
    result: graded.display,
    test_results: graded.test_results,
    session: view.clone(),
  }];
  match graded.transition {
    Transition::Restart => out.push(ServerWsMessage::Restarted { message: RESTART_NOTICE.into(), session: view }),
    Transition::Completing => out.push(ServerWsMessage::ActivityCompleting {
      xp_granted: matches!(graded.reward, Some(XpGrant::Applied { .. })),
      unlocked_order: graded.unlocked_order,
      session: view,
    }),
    _ => {}
  }
  out
}

pub fn deadline_frames(session: &GradingSession, events: Vec<DeadlineEvent>) -> Vec<ServerWsMessage> {
  events
    .into_iter()
    .map(|ev| match ev {
      DeadlineEvent::ResultTimedOut { attempt } => ServerWsMessage::GradingTimedOut { attempt, message: TIMEOUT_NOTICE.into() },
      DeadlineEvent::Completed => ServerWsMessage::ActivityCompleted { session: session_view(session) },
    })
    .collect()
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_results_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "results", "Result channel connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => match serde_json::from_str::<ResultEvent>(&txt) {
        Ok(ev) => {
          let session = ev.session_id.clone();
          if state.hub.publish(ev) == Delivery::NoSubscriber {
            info!(target: "results", %session, "Result for unknown or closed session discarded");
          }
        }
        Err(e) => warn!(target: "results", error = %e, "Unreadable result frame"),
      },
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "results", "Result channel disconnected");
}
