//! CodeQuest · Coding Challenge Grading Engine
//!
//! - Axum HTTP + WebSocket API for learners
//! - Result channel ingress for the external execution service
//! - Built-in Python activity seeds, optional TOML activity bank
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   EXECUTION_BASE_URL  : execution service base URL (default "http://localhost:5002")
//!   GRADER_CONFIG_PATH  : path to TOML config (timers, retry policy, activity bank)
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use codequest_grader::config::load_config_from_env;
use codequest_grader::routes::build_router;
use codequest_grader::state::AppState;
use codequest_grader::telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let config = load_config_from_env();
  let state = Arc::new(AppState::new(config)?);

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "grader", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      info!(target: "grader", "Shutdown signal received");
    })
    .await?;
  Ok(())
}
