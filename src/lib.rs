//! CodeQuest grading engine.
//!
//! Accepts a learner's code submission, dispatches it to the external execution service,
//! receives the verdict asynchronously through the result channel, and drives the
//! per-activity progression (counters, restart, completion, reward, unlock).

pub mod channel;
pub mod config;
pub mod domain;
pub mod error;
pub mod execution;
pub mod progression;
pub mod protocol;
pub mod questions;
pub mod retry;
pub mod routes;
pub mod seeds;
pub mod session;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod util;
