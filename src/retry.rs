//! Exponential backoff with jitter for fallible, retryable store writes.

use std::future::Future;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct RetryConfig {
  pub max_attempts: usize,
  pub base_backoff: Duration,
  pub max_backoff: Duration,
  pub jitter_max: Option<Duration>,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_attempts: 4,
      base_backoff: Duration::from_millis(50),
      max_backoff: Duration::from_millis(800),
      jitter_max: Some(Duration::from_millis(25)),
    }
  }
}

impl RetryConfig {
  /// Single attempt, no waiting.
  pub fn once() -> Self {
    Self { max_attempts: 1, base_backoff: Duration::ZERO, max_backoff: Duration::ZERO, jitter_max: None }
  }
}

pub async fn retry_async_with_config<F, Fut, T, E>(config: &RetryConfig, mut f: F) -> Result<T, E>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, E>>,
{
  let mut attempts_left = config.max_attempts.max(1);
  let mut backoff = config.base_backoff;

  loop {
    match f().await {
      Ok(v) => return Ok(v),
      Err(e) => {
        attempts_left -= 1;
        if attempts_left == 0 {
          return Err(e);
        }

        let extra = match config.jitter_max {
          Some(j) if j.as_millis() > 0 => {
            let jitter_ms = j.as_millis() as u64;
            Duration::from_millis(rand::random::<u64>() % (jitter_ms + 1))
          }
          _ => Duration::ZERO,
        };
        tokio::time::sleep(backoff + extra).await;
        backoff = std::cmp::min(backoff * 2, config.max_backoff);
      }
    }
  }
}
