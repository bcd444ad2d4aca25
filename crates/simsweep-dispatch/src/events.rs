//! Dispatch events and notifiers.
//!
//! The dispatcher reports every attempt transition so callers can show
//! progress or keep an audit trail.

use serde::{Deserialize, Serialize};
use simsweep_queue::TaskId;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchEvent {
  /// An attempt was handed to a worker.
  TaskStarted {
    task_id: TaskId,
    attempt: u32,
    worker: String,
  },

  /// An attempt failed and the task went back to the queue.
  TaskRetrying {
    task_id: TaskId,
    attempt: u32,
    worker: String,
    reason: String,
  },

  TaskSucceeded {
    task_id: TaskId,
    attempt: u32,
    worker: String,
  },

  /// The task failed for good.
  TaskFailed {
    task_id: TaskId,
    attempts: u32,
    error: String,
  },

  TaskCancelled { task_id: TaskId },

  /// Every task is terminal and no attempt is in flight.
  DispatchFinished {
    succeeded: usize,
    failed: usize,
    cancelled: usize,
  },
}

pub trait DispatchNotifier: Send + Sync {
  fn notify(&self, event: DispatchEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl DispatchNotifier for NoopNotifier {
  fn notify(&self, _event: DispatchEvent) {}
}

/// Sends events to an unbounded channel.
///
/// Unbounded so a slow consumer never stalls dispatch; there are only a few
/// events per attempt.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<DispatchEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<DispatchEvent>) -> Self {
    Self { sender }
  }
}

impl DispatchNotifier for ChannelNotifier {
  fn notify(&self, event: DispatchEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
