use simsweep_config::RetryConfig;
use simsweep_queue::TaskOutcome;
use simsweep_worker::{RunFailure, WorkerId};

/// Retry bounds per failure class.
///
/// | class          | retried                      |
/// |----------------|------------------------------|
/// | timeout        | up to `timeout_retries` times |
/// | crash          | up to `crash_retries` times, preferably on another worker |
/// | output missing | never                        |
/// | rejected       | never                        |
/// | cancelled      | never                        |
///
/// Transport errors count as crashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub timeout_retries: u32,
  pub crash_retries: u32,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::from(RetryConfig::default())
  }
}

impl From<RetryConfig> for RetryPolicy {
  fn from(config: RetryConfig) -> Self {
    Self {
      timeout_retries: config.timeout_retries,
      crash_retries: config.crash_retries,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
  Timeout,
  Crash,
  OutputMissing,
  Rejected,
  Cancelled,
}

impl FailureClass {
  pub fn of(failure: &RunFailure) -> Self {
    match failure {
      RunFailure::Timeout { .. } => FailureClass::Timeout,
      RunFailure::Crash { .. } | RunFailure::Transport { .. } => FailureClass::Crash,
      RunFailure::OutputMissing { .. } => FailureClass::OutputMissing,
      RunFailure::Rejected { .. } => FailureClass::Rejected,
      RunFailure::Cancelled => FailureClass::Cancelled,
    }
  }
}

/// Failures seen so far for one task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureHistory {
  pub timeouts: u32,
  pub crashes: u32,
  /// Worker of the most recent crash, avoided for the next attempt.
  pub crashed_on: Option<WorkerId>,
}

impl FailureHistory {
  pub fn record(&mut self, failure: &RunFailure, worker: &WorkerId) {
    match FailureClass::of(failure) {
      FailureClass::Timeout => self.timeouts += 1,
      FailureClass::Crash => {
        self.crashes += 1;
        self.crashed_on = Some(worker.clone());
      }
      _ => {}
    }
  }
}

impl RetryPolicy {
  /// Outcome for an attempt that ended in `failure`, with `history` already
  /// including it.
  pub fn decide(&self, failure: &RunFailure, history: &FailureHistory) -> TaskOutcome {
    let reason = failure.to_string();
    match FailureClass::of(failure) {
      FailureClass::Timeout if history.timeouts <= self.timeout_retries => {
        TaskOutcome::Retry { reason }
      }
      FailureClass::Crash if history.crashes <= self.crash_retries => TaskOutcome::Retry { reason },
      FailureClass::Cancelled => TaskOutcome::Cancelled,
      _ => TaskOutcome::Failed { reason },
    }
  }
}
