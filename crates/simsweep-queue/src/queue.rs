use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::QueueError;
use crate::task::{Task, TaskId, TaskStatus};

/// How a dispatched attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
  Succeeded,
  /// Give up: the task becomes `Failed`.
  Failed { reason: String },
  /// Put the task back at the end of the queue.
  Retry { reason: String },
  Cancelled,
}

/// Number of tasks in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
  pub pending: usize,
  pub running: usize,
  pub succeeded: usize,
  pub failed: usize,
  pub cancelled: usize,
}

impl QueueCounts {
  pub fn total(&self) -> usize {
    self.pending + self.running + self.succeeded + self.failed + self.cancelled
  }
}

#[derive(Default)]
struct Inner {
  tasks: HashMap<TaskId, Task>,
  submitted: Vec<TaskId>,
  pending: VecDeque<TaskId>,
}

/// FIFO queue of tasks with status tracking and advisory cancellation.
///
/// # Usage
///
/// ```ignore
/// let queue = Arc::new(TaskQueue::new());
/// let id = queue.submit(Task::new("rc.net", coordinate));
///
/// while let Some(task) = queue.next() {
///   // run it
///   queue.complete(task.id, TaskOutcome::Succeeded)?;
/// }
/// ```
pub struct TaskQueue {
  inner: Mutex<Inner>,
  changed: Notify,
  cancel: CancellationToken,
}

impl Default for TaskQueue {
  fn default() -> Self {
    Self::new()
  }
}

impl TaskQueue {
  pub fn new() -> Self {
    Self {
      inner: Mutex::new(Inner::default()),
      changed: Notify::new(),
      cancel: CancellationToken::new(),
    }
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Add a task at the back of the queue.
  ///
  /// Lifecycle fields of `task` are reset. A task submitted after
  /// [`cancel_all`](Self::cancel_all) is recorded as `Cancelled`.
  pub fn submit(&self, mut task: Task) -> TaskId {
    let id = task.id;
    task.attempts = 0;
    task.worker = None;
    task.last_error = None;
    task.started_at = None;
    task.cancel_requested = false;

    let mut inner = self.lock();
    if self.cancel.is_cancelled() {
      task.status = TaskStatus::Cancelled;
      task.finished_at = Some(Utc::now());
    } else {
      task.status = TaskStatus::Pending;
      task.finished_at = None;
      inner.pending.push_back(id);
    }
    debug!(task_id = %id, coordinate = %task.coordinate, status = ?task.status, "task_submitted");
    if inner.tasks.insert(id, task).is_none() {
      inner.submitted.push(id);
    }
    drop(inner);

    self.changed.notify_one();
    id
  }

  /// Take the oldest pending task and mark it `Running`.
  ///
  /// Returns a snapshot of the task, or `None` when nothing is pending or the
  /// queue has been cancelled.
  pub fn next(&self) -> Option<Task> {
    if self.cancel.is_cancelled() {
      return None;
    }

    let mut inner = self.lock();
    while let Some(id) = inner.pending.pop_front() {
      let Some(task) = inner.tasks.get_mut(&id) else {
        continue;
      };
      if task.status != TaskStatus::Pending {
        continue;
      }
      task.status = TaskStatus::Running;
      task.attempts += 1;
      task.worker = None;
      task.started_at = Some(Utc::now());
      return Some(task.clone());
    }
    None
  }

  /// Record which worker runs the current attempt of a running task.
  pub fn assign(&self, id: TaskId, worker: &str) -> Result<(), QueueError> {
    let mut inner = self.lock();
    let task = running_task(&mut inner, id)?;
    task.worker = Some(worker.to_string());
    Ok(())
  }

  /// Resolve the current attempt of a running task. Returns the new status.
  ///
  /// A task whose cancellation was requested while it ran ends `Cancelled`
  /// unless the attempt itself failed.
  pub fn complete(&self, id: TaskId, outcome: TaskOutcome) -> Result<TaskStatus, QueueError> {
    let mut inner = self.lock();
    let task = running_task(&mut inner, id)?;
    let cancel_requested = task.cancel_requested;

    let status = match outcome {
      TaskOutcome::Succeeded if cancel_requested => TaskStatus::Cancelled,
      TaskOutcome::Succeeded => TaskStatus::Succeeded,
      TaskOutcome::Failed { reason } => {
        task.last_error = Some(reason);
        TaskStatus::Failed
      }
      TaskOutcome::Retry { reason } => {
        task.last_error = Some(reason);
        if cancel_requested {
          TaskStatus::Cancelled
        } else {
          TaskStatus::Pending
        }
      }
      TaskOutcome::Cancelled => TaskStatus::Cancelled,
    };

    task.status = status;
    if status.is_terminal() {
      task.finished_at = Some(Utc::now());
    } else {
      inner.pending.push_back(id);
    }
    drop(inner);

    self.changed.notify_one();
    Ok(status)
  }

  /// Cancel every task that has not finished.
  ///
  /// Pending tasks become `Cancelled` immediately. Running tasks are flagged
  /// and resolve when their attempt completes; the queue-wide cancellation
  /// token tells workers to stop them. Idempotent. Returns the number of
  /// tasks cancelled by this call.
  pub fn cancel_all(&self) -> usize {
    self.cancel.cancel();

    let mut inner = self.lock();
    let now = Utc::now();
    let mut cancelled = 0;
    let mut in_flight = 0;
    for task in inner.tasks.values_mut() {
      match task.status {
        TaskStatus::Pending => {
          task.status = TaskStatus::Cancelled;
          task.finished_at = Some(now);
          cancelled += 1;
        }
        TaskStatus::Running if !task.cancel_requested => {
          task.cancel_requested = true;
          in_flight += 1;
        }
        _ => {}
      }
    }
    inner.pending.clear();
    drop(inner);

    if cancelled > 0 || in_flight > 0 {
      info!(cancelled, in_flight, "queue_cancelled");
    }
    self.changed.notify_one();
    cancelled
  }

  pub fn get(&self, id: TaskId) -> Option<Task> {
    self.lock().tasks.get(&id).cloned()
  }

  /// All tasks in submission order.
  pub fn snapshot(&self) -> Vec<Task> {
    let inner = self.lock();
    inner
      .submitted
      .iter()
      .filter_map(|id| inner.tasks.get(id).cloned())
      .collect()
  }

  pub fn counts(&self) -> QueueCounts {
    let inner = self.lock();
    let mut counts = QueueCounts::default();
    for task in inner.tasks.values() {
      match task.status {
        TaskStatus::Pending => counts.pending += 1,
        TaskStatus::Running => counts.running += 1,
        TaskStatus::Succeeded => counts.succeeded += 1,
        TaskStatus::Failed => counts.failed += 1,
        TaskStatus::Cancelled => counts.cancelled += 1,
      }
    }
    counts
  }

  /// `true` when every task is terminal.
  pub fn is_drained(&self) -> bool {
    self
      .lock()
      .tasks
      .values()
      .all(|task| task.status.is_terminal())
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }

  /// Token cancelled by [`cancel_all`](Self::cancel_all).
  pub fn cancellation(&self) -> CancellationToken {
    self.cancel.clone()
  }

  /// Wait until the queue changes (submission, completion or cancellation).
  ///
  /// A change that happened while nobody was waiting wakes the next caller
  /// immediately.
  pub async fn changed(&self) {
    self.changed.notified().await;
  }
}

fn running_task(inner: &mut Inner, id: TaskId) -> Result<&mut Task, QueueError> {
  let task = inner
    .tasks
    .get_mut(&id)
    .ok_or(QueueError::UnknownTask { task_id: id })?;
  if task.status != TaskStatus::Running {
    return Err(QueueError::InvalidTransition {
      task_id: id,
      actual: task.status,
      expected: TaskStatus::Running,
    });
  }
  Ok(task)
}

#[cfg(test)]
mod tests {
  use super::*;
  use simsweep_raw::StepCoordinate;

  fn task(k: i32) -> Task {
    Task::new("rc.net", StepCoordinate::new().with("k", k))
  }

  #[test]
  fn test_fifo() {
    let queue = TaskQueue::new();
    let ids: Vec<_> = (0..3).map(|k| queue.submit(task(k))).collect();

    let taken: Vec<_> = std::iter::from_fn(|| queue.next()).map(|t| t.id).collect();
    assert_eq!(taken, ids);
    assert!(queue.next().is_none());
  }

  #[test]
  fn test_next_marks_running_and_counts_attempts() {
    let queue = TaskQueue::new();
    let id = queue.submit(task(0));
    let running = queue.next().unwrap();
    assert_eq!(running.id, id);
    assert_eq!(running.status(), TaskStatus::Running);
    assert_eq!(running.attempts(), 1);
    assert!(running.started_at().is_some());
  }

  #[test]
  fn test_retry_goes_to_the_back() {
    let queue = TaskQueue::new();
    let first = queue.submit(task(0));
    let second = queue.submit(task(1));

    let t = queue.next().unwrap();
    assert_eq!(t.id, first);
    let status = queue
      .complete(first, TaskOutcome::Retry { reason: "timeout".to_string() })
      .unwrap();
    assert_eq!(status, TaskStatus::Pending);

    assert_eq!(queue.next().unwrap().id, second);
    let retried = queue.next().unwrap();
    assert_eq!(retried.id, first);
    assert_eq!(retried.attempts(), 2);
    assert_eq!(retried.last_error(), Some("timeout"));
  }

  #[test]
  fn test_complete_requires_running() {
    let queue = TaskQueue::new();
    let id = queue.submit(task(0));
    assert!(matches!(
      queue.complete(id, TaskOutcome::Succeeded),
      Err(QueueError::InvalidTransition { .. })
    ));
    assert!(matches!(
      queue.complete(TaskId::new(), TaskOutcome::Succeeded),
      Err(QueueError::UnknownTask { .. })
    ));

    queue.next().unwrap();
    queue.complete(id, TaskOutcome::Succeeded).unwrap();
    // terminal states never move again
    assert!(queue.complete(id, TaskOutcome::Failed { reason: "late".to_string() }).is_err());
    assert_eq!(queue.get(id).unwrap().status(), TaskStatus::Succeeded);
  }

  #[test]
  fn test_cancel_all_three_pending_one_running() {
    let queue = TaskQueue::new();
    let ids: Vec<_> = (0..4).map(|k| queue.submit(task(k))).collect();
    let running = queue.next().unwrap();
    assert_eq!(running.id, ids[0]);

    assert_eq!(queue.cancel_all(), 3);
    let counts = queue.counts();
    assert_eq!(counts.cancelled, 3);
    assert_eq!(counts.running, 1);
    assert!(queue.get(ids[0]).unwrap().cancel_requested());
    assert!(queue.cancellation().is_cancelled());
    assert!(queue.next().is_none());
    assert!(!queue.is_drained());

    // the in-flight attempt resolves into a terminal state
    let status = queue
      .complete(ids[0], TaskOutcome::Retry { reason: "killed".to_string() })
      .unwrap();
    assert_eq!(status, TaskStatus::Cancelled);
    assert!(queue.is_drained());
    assert_eq!(queue.counts().total(), 4);
  }

  #[test]
  fn test_cancel_all_is_idempotent() {
    let queue = TaskQueue::new();
    queue.submit(task(0));
    queue.submit(task(1));
    assert_eq!(queue.cancel_all(), 2);
    assert_eq!(queue.cancel_all(), 0);
    assert_eq!(queue.counts().cancelled, 2);
  }

  #[test]
  fn test_failed_attempt_stays_failed_after_cancel() {
    let queue = TaskQueue::new();
    let id = queue.submit(task(0));
    queue.next().unwrap();
    queue.cancel_all();
    let status = queue
      .complete(id, TaskOutcome::Failed { reason: "crash".to_string() })
      .unwrap();
    assert_eq!(status, TaskStatus::Failed);
  }

  #[test]
  fn test_submit_after_cancel() {
    let queue = TaskQueue::new();
    queue.cancel_all();
    let id = queue.submit(task(0));
    assert_eq!(queue.get(id).unwrap().status(), TaskStatus::Cancelled);
    assert!(queue.is_drained());
  }

  #[test]
  fn test_snapshot_in_submission_order() {
    let queue = TaskQueue::new();
    let ids: Vec<_> = (0..5).map(|k| queue.submit(task(k))).collect();
    let snapshot: Vec<_> = queue.snapshot().iter().map(|t| t.id).collect();
    assert_eq!(snapshot, ids);
  }

  #[tokio::test]
  async fn test_changed_wakes_after_submit() {
    let queue = std::sync::Arc::new(TaskQueue::new());
    let waiter = {
      let queue = queue.clone();
      tokio::spawn(async move { queue.changed().await })
    };
    queue.submit(task(0));
    tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
      .await
      .expect("waiter woke")
      .unwrap();
  }
}
