//! Per-activity progression state machine.
//!
//! Pure and synchronous: it only decides transitions. The owning session performs the
//! side effects a transition asks for (persist, reshuffle, reward, unlock, timers).
//!
//! ```text
//! AnsweringQuestion(c) --success, correct<5--> AnsweringQuestion(c+1)
//! AnsweringQuestion(c) --success, correct=5--> Completing --timer--> Completed
//! AnsweringQuestion(c) --failure, incorrect<3--> AnsweringQuestion(c)
//! AnsweringQuestion(c) --failure, incorrect=3--> Restarting --reshuffle--> AnsweringQuestion(0)
//! ```

use serde::Serialize;

use crate::domain::Progress;

pub const COMPLETION_THRESHOLD: u32 = 5;
pub const RESTART_THRESHOLD: u32 = 3;
pub const COMPLETION_XP: u64 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Phase {
  AnsweringQuestion { cursor: usize },
  Restarting,
  Completing,
  Completed,
}

/// What a graded result did to the machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
  /// Correct answer, moved on to `cursor`.
  Advanced { cursor: usize },
  /// Correct answer that reached the completion threshold.
  Completing,
  /// Wrong answer, same question stays up.
  Retry { incorrect: u32 },
  /// Wrong answer that reached the restart threshold. Call `restart` with a fresh order.
  Restart,
  /// Not waiting for a result; nothing changed.
  Ignored,
}

#[derive(Clone, Debug)]
pub struct Progression {
  order: Vec<String>,
  phase: Phase,
  correct: u32,
  incorrect: u32,
}

impl Progression {
  pub fn new(order: Vec<String>) -> Self {
    Self { order, phase: Phase::AnsweringQuestion { cursor: 0 }, correct: 0, incorrect: 0 }
  }

  /// Rebuild from a persisted progress document. The cursor only moves on correct answers and
  /// resets together with the counters, so it is recovered as `correct_count`.
  /// Out-of-range counters (an interrupted transition) are pulled back below their thresholds.
  pub fn resume(order: Vec<String>, stored: Progress) -> Self {
    let mut correct = stored.correct_count.min(COMPLETION_THRESHOLD - 1);
    let mut incorrect = stored.incorrect_count;
    if incorrect >= RESTART_THRESHOLD {
      correct = 0;
      incorrect = 0;
    }
    let last = order.len().saturating_sub(1);
    let cursor = (correct as usize).min(last);
    Self { order, phase: Phase::AnsweringQuestion { cursor }, correct, incorrect }
  }

  pub fn phase(&self) -> Phase { self.phase }
  pub fn correct_count(&self) -> u32 { self.correct }
  pub fn incorrect_count(&self) -> u32 { self.incorrect }
  pub fn order(&self) -> &[String] { &self.order }
  pub fn is_completed(&self) -> bool { matches!(self.phase, Phase::Completing | Phase::Completed) }

  /// Index into `order`. `order.len()` once completed, which renders the completion screen.
  pub fn cursor(&self) -> usize {
    match self.phase {
      Phase::AnsweringQuestion { cursor } => cursor,
      Phase::Restarting => 0,
      Phase::Completing => (self.correct as usize).saturating_sub(1).min(self.order.len()),
      Phase::Completed => self.order.len(),
    }
  }

  /// Question currently awaiting an answer, if any.
  pub fn current_question_id(&self) -> Option<&str> {
    match self.phase {
      Phase::AnsweringQuestion { cursor } => self.order.get(cursor).map(String::as_str),
      _ => None,
    }
  }

  /// Snapshot of what must be persisted after the latest transition.
  pub fn progress(&self) -> Progress {
    Progress {
      correct_count: self.correct,
      incorrect_count: self.incorrect,
      completed: self.is_completed(),
    }
  }

  pub fn apply(&mut self, success: bool) -> Transition {
    let cursor = match self.phase {
      Phase::AnsweringQuestion { cursor } => cursor,
      _ => return Transition::Ignored,
    };

    if success {
      self.correct += 1;
      if self.correct >= COMPLETION_THRESHOLD {
        self.phase = Phase::Completing;
        return Transition::Completing;
      }
      let next = cursor + 1;
      self.phase = Phase::AnsweringQuestion { cursor: next };
      Transition::Advanced { cursor: next }
    } else {
      self.incorrect += 1;
      if self.incorrect >= RESTART_THRESHOLD {
        self.phase = Phase::Restarting;
        self.correct = 0;
        self.incorrect = 0;
        return Transition::Restart;
      }
      Transition::Retry { incorrect: self.incorrect }
    }
  }

  /// Leave `Restarting` with a reshuffled question order. Returns false in any other phase.
  pub fn restart(&mut self, reshuffled: Vec<String>) -> bool {
    if self.phase != Phase::Restarting {
      return false;
    }
    self.order = reshuffled;
    self.correct = 0;
    self.incorrect = 0;
    self.phase = Phase::AnsweringQuestion { cursor: 0 };
    true
  }

  /// End of the completion window. Returns false unless currently `Completing`.
  pub fn finish_completion(&mut self) -> bool {
    if self.phase != Phase::Completing {
      return false;
    }
    self.phase = Phase::Completed;
    true
  }
}
