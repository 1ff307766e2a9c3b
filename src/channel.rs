//! Result channel: publish/subscribe of grading results, keyed by session id.
//!
//! The execution service pushes results for every session through one ingress; each session
//! holds a `Subscription` for exactly its own id. Dropping the subscription unsubscribes,
//! and anything published afterwards is dropped as stale.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::ResultEvent;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
  Delivered,
  NoSubscriber,
}

#[derive(Clone, Default)]
pub struct ResultHub {
  subscribers: Arc<Mutex<HashMap<String, (u64, mpsc::UnboundedSender<ResultEvent>)>>>,
  next_id: Arc<std::sync::atomic::AtomicU64>,
}

/// Receiving end for one session. FIFO per session.
pub struct Subscription {
  session_id: String,
  id: u64,
  rx: mpsc::UnboundedReceiver<ResultEvent>,
  hub: ResultHub,
}

impl ResultHub {
  pub fn new() -> Self { Self::default() }

  /// Subscribe `session_id`. A newer subscription for the same id replaces the older one.
  pub fn subscribe(&self, session_id: &str) -> Subscription {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    let mut subs = self.subscribers.lock().unwrap_or_else(|p| p.into_inner());
    if subs.insert(session_id.to_string(), (id, tx)).is_some() {
      warn!(target: "results", session = %session_id, "Replaced existing subscription");
    }
    debug!(target: "results", session = %session_id, "Subscribed");
    Subscription { session_id: session_id.to_string(), id, rx, hub: self.clone() }
  }

  pub fn publish(&self, event: ResultEvent) -> Delivery {
    let subs = self.subscribers.lock().unwrap_or_else(|p| p.into_inner());
    match subs.get(&event.session_id) {
      Some((_, tx)) => {
        let session = event.session_id.clone();
        if tx.send(event).is_ok() {
          debug!(target: "results", %session, "Result delivered");
          Delivery::Delivered
        } else {
          Delivery::NoSubscriber
        }
      }
      None => {
        debug!(target: "results", session = %event.session_id, "No subscriber; result dropped");
        Delivery::NoSubscriber
      }
    }
  }

  pub fn subscriber_count(&self) -> usize {
    self.subscribers.lock().unwrap_or_else(|p| p.into_inner()).len()
  }

  fn unsubscribe(&self, session_id: &str, id: u64) {
    let mut subs = self.subscribers.lock().unwrap_or_else(|p| p.into_inner());
    // Only remove our own entry; a replacement subscription must survive.
    if subs.get(session_id).map(|(sid, _)| *sid == id).unwrap_or(false) {
      subs.remove(session_id);
      debug!(target: "results", session = %session_id, "Unsubscribed");
    }
  }
}

impl Subscription {
  pub fn session_id(&self) -> &str { &self.session_id }

  /// Next result for this session. `None` only if the hub side was replaced.
  pub async fn recv(&mut self) -> Option<ResultEvent> {
    self.rx.recv().await
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.hub.unsubscribe(&self.session_id, self.id);
  }
}
