use crate::task::{TaskId, TaskStatus};

/// Errors returned by queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
  #[error("unknown task {task_id}")]
  UnknownTask { task_id: TaskId },

  /// The task is not in the state the operation requires.
  #[error("task {task_id} is {actual:?}, expected {expected:?}")]
  InvalidTransition {
    task_id: TaskId,
    actual: TaskStatus,
    expected: TaskStatus,
  },
}
