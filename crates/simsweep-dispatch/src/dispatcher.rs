use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use simsweep_config::RunnerConfig;
use simsweep_queue::{QueueCounts, Task, TaskId, TaskOutcome, TaskQueue, TaskStatus};
use simsweep_worker::{RunFailure, RunOutput, RunRequest, Worker, WorkerId};
use tokio::sync::mpsc;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::DispatchError;
use crate::events::{DispatchEvent, DispatchNotifier, NoopNotifier};
use crate::retry::{FailureHistory, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
  /// Upper bound on simultaneously running attempts across all workers.
  pub max_concurrency: usize,
  /// Used for tasks without their own timeout.
  pub default_timeout: Duration,
  pub retry: RetryPolicy,
}

impl DispatcherConfig {
  pub fn from_runner(config: &RunnerConfig) -> Self {
    Self {
      max_concurrency: config.max_concurrency,
      default_timeout: Duration::from_millis(config.timeout_ms),
      retry: RetryPolicy::from(config.retry),
    }
  }
}

/// A successful attempt, ready for collection.
#[derive(Debug, Clone)]
pub struct Completion {
  /// Task snapshot after it was marked `Succeeded`.
  pub task: Task,
  pub output: RunOutput,
}

/// Per-worker counters for one dispatch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerLoad {
  pub worker: WorkerId,
  pub capacity: usize,
  pub attempts: usize,
  pub succeeded: usize,
  pub failed_attempts: usize,
  /// Highest number of attempts this worker ran at the same time.
  pub peak_running: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSummary {
  pub counts: QueueCounts,
  pub workers: Vec<WorkerLoad>,
  /// Highest number of attempts in flight at the same time.
  pub peak_in_flight: usize,
}

struct Slot {
  worker: Arc<dyn Worker>,
  running: usize,
  load: WorkerLoad,
}

impl Slot {
  fn has_room(&self) -> bool {
    self.running < self.load.capacity
  }
}

struct Attempt {
  task: Task,
  slot: usize,
  result: Result<RunOutput, RunFailure>,
}

/// Runs queued tasks on a fixed set of workers.
///
/// Generic over `N: DispatchNotifier`. Use [`Dispatcher::new`] to discard
/// events or [`Dispatcher::with_notifier`] to observe them.
pub struct Dispatcher<N: DispatchNotifier = NoopNotifier> {
  config: DispatcherConfig,
  workers: Vec<Arc<dyn Worker>>,
  notifier: N,
}

impl Dispatcher<NoopNotifier> {
  pub fn new(
    config: DispatcherConfig,
    workers: Vec<Arc<dyn Worker>>,
  ) -> Result<Self, DispatchError> {
    Self::with_notifier(config, workers, NoopNotifier)
  }
}

impl<N: DispatchNotifier> Dispatcher<N> {
  pub fn with_notifier(
    config: DispatcherConfig,
    workers: Vec<Arc<dyn Worker>>,
    notifier: N,
  ) -> Result<Self, DispatchError> {
    if workers.is_empty() {
      return Err(DispatchError::NoWorkers);
    }
    if config.max_concurrency == 0 {
      return Err(DispatchError::ZeroConcurrency {
        message: "max_concurrency must be at least 1".to_string(),
      });
    }
    if workers.iter().all(|w| w.capacity() == 0) {
      return Err(DispatchError::ZeroConcurrency {
        message: "no worker has a free slot".to_string(),
      });
    }
    Ok(Self {
      config,
      workers,
      notifier,
    })
  }

  /// Attempts that may run at once: the configured limit, capped by the
  /// total slot count of the workers.
  pub fn concurrency(&self) -> usize {
    let slots: usize = self.workers.iter().map(|w| w.capacity()).sum();
    self.config.max_concurrency.min(slots)
  }

  /// Dispatch until every task in `queue` is terminal.
  ///
  /// Successful attempts are sent on `completions` in completion order.
  /// Cancelling the queue stops the launch of new attempts and kills the
  /// running ones; this returns once they have all been resolved.
  #[instrument(name = "dispatch", skip_all, fields(concurrency = self.concurrency()))]
  pub async fn run(
    &self,
    queue: Arc<TaskQueue>,
    completions: mpsc::UnboundedSender<Completion>,
  ) -> Result<DispatchSummary, DispatchError> {
    let limit = self.concurrency();
    let cancel = queue.cancellation();
    let mut slots: Vec<Slot> = self
      .workers
      .iter()
      .map(|worker| Slot {
        worker: worker.clone(),
        running: 0,
        load: WorkerLoad {
          worker: worker.id().clone(),
          capacity: worker.capacity(),
          attempts: 0,
          succeeded: 0,
          failed_attempts: 0,
          peak_running: 0,
        },
      })
      .collect();
    let mut in_flight: JoinSet<Attempt> = JoinSet::new();
    let mut launched: HashMap<Id, (Task, usize)> = HashMap::new();
    let mut history: HashMap<TaskId, FailureHistory> = HashMap::new();
    let mut peak_in_flight = 0;

    info!(workers = slots.len(), "dispatch_started");

    loop {
      while in_flight.len() < limit && !cancel.is_cancelled() {
        if !slots.iter().any(Slot::has_room) {
          break;
        }
        let Some(task) = queue.next() else {
          break;
        };

        let avoid = history.get(&task.id).and_then(|h| h.crashed_on.as_ref());
        let index = pick_slot(&slots, avoid);
        let slot = &mut slots[index];
        slot.running += 1;
        slot.load.attempts += 1;
        slot.load.peak_running = slot.load.peak_running.max(slot.running);

        queue.assign(task.id, slot.worker.id().as_str())?;
        debug!(
          task_id = %task.id,
          attempt = task.attempts(),
          worker = %slot.worker.id(),
          "attempt_launched"
        );
        self.notifier.notify(DispatchEvent::TaskStarted {
          task_id: task.id,
          attempt: task.attempts(),
          worker: slot.worker.id().to_string(),
        });

        let request = RunRequest::for_task(&task, self.config.default_timeout);
        let worker = slot.worker.clone();
        let token = cancel.child_token();
        let attempt_task = task.clone();
        let handle = in_flight.spawn(async move {
          let result = worker.run(request, token).await;
          Attempt {
            task: attempt_task,
            slot: index,
            result,
          }
        });
        launched.insert(handle.id(), (task, index));
        peak_in_flight = peak_in_flight.max(in_flight.len());
      }

      if in_flight.is_empty() {
        if queue.is_drained() {
          break;
        }
        // Nothing runnable yet; wait for a submission or cancellation.
        tokio::select! {
          _ = queue.changed() => {}
          _ = cancel.cancelled() => {}
        }
        continue;
      }

      let joined = tokio::select! {
        joined = in_flight.join_next_with_id() => joined,
        _ = queue.changed() => continue,
      };

      let attempt = match joined {
        Some(Ok((id, attempt))) => {
          launched.remove(&id);
          attempt
        }
        Some(Err(join_error)) => match launched.remove(&join_error.id()) {
          Some((task, slot)) => Attempt {
            task,
            slot,
            result: Err(panicked(&join_error)),
          },
          None => {
            error!(error = %join_error, "unknown_attempt_failed");
            continue;
          }
        },
        None => continue,
      };

      self.resolve(&queue, &cancel, &mut slots, &mut history, &completions, attempt)?;
    }

    let counts = queue.counts();
    info!(
      succeeded = counts.succeeded,
      failed = counts.failed,
      cancelled = counts.cancelled,
      peak_in_flight,
      "dispatch_finished"
    );
    self.notifier.notify(DispatchEvent::DispatchFinished {
      succeeded: counts.succeeded,
      failed: counts.failed,
      cancelled: counts.cancelled,
    });

    Ok(DispatchSummary {
      counts,
      workers: slots.into_iter().map(|slot| slot.load).collect(),
      peak_in_flight,
    })
  }

  fn resolve(
    &self,
    queue: &TaskQueue,
    cancel: &CancellationToken,
    slots: &mut [Slot],
    history: &mut HashMap<TaskId, FailureHistory>,
    completions: &mpsc::UnboundedSender<Completion>,
    attempt: Attempt,
  ) -> Result<(), DispatchError> {
    let Attempt { task, slot, result } = attempt;
    let slot = &mut slots[slot];
    slot.running -= 1;
    let worker = slot.worker.id().clone();
    let attempt_number = task.attempts();

    match result {
      Ok(output) => {
        let status = queue.complete(task.id, TaskOutcome::Succeeded)?;
        if status != TaskStatus::Succeeded {
          info!(task_id = %task.id, "completed_after_cancel");
          self.notifier.notify(DispatchEvent::TaskCancelled { task_id: task.id });
          return Ok(());
        }

        slot.load.succeeded += 1;
        info!(task_id = %task.id, attempt = attempt_number, worker = %worker, "task_succeeded");
        self.notifier.notify(DispatchEvent::TaskSucceeded {
          task_id: task.id,
          attempt: attempt_number,
          worker: worker.to_string(),
        });

        let task = queue.get(task.id).unwrap_or(task);
        if completions.send(Completion { task, output }).is_err() {
          warn!("completion_receiver_dropped");
        }
      }
      Err(failure) => {
        slot.load.failed_attempts += 1;
        let entry = history.entry(task.id).or_default();
        entry.record(&failure, &worker);
        let outcome = if cancel.is_cancelled() {
          TaskOutcome::Cancelled
        } else {
          self.config.retry.decide(&failure, entry)
        };

        let status = queue.complete(task.id, outcome)?;
        match status {
          TaskStatus::Pending => {
            warn!(
              task_id = %task.id,
              attempt = attempt_number,
              worker = %worker,
              error = %failure,
              "attempt_failed_retrying"
            );
            self.notifier.notify(DispatchEvent::TaskRetrying {
              task_id: task.id,
              attempt: attempt_number,
              worker: worker.to_string(),
              reason: failure.to_string(),
            });
          }
          TaskStatus::Failed => {
            error!(
              task_id = %task.id,
              attempts = attempt_number,
              error = %failure,
              "task_failed"
            );
            self.notifier.notify(DispatchEvent::TaskFailed {
              task_id: task.id,
              attempts: attempt_number,
              error: failure.to_string(),
            });
          }
          _ => {
            info!(task_id = %task.id, "task_cancelled");
            self.notifier.notify(DispatchEvent::TaskCancelled { task_id: task.id });
          }
        }
      }
    }
    Ok(())
  }
}

/// Least busy worker with a free slot, skipping `avoid` when another worker
/// has room. Callers ensure at least one slot is free.
fn pick_slot(slots: &[Slot], avoid: Option<&WorkerId>) -> usize {
  let free = || {
    slots
      .iter()
      .enumerate()
      .filter(|(_, slot)| slot.has_room())
  };
  let preferred = free()
    .filter(|(_, slot)| Some(slot.worker.id()) != avoid)
    .min_by_key(|(_, slot)| slot.running);
  preferred
    .or_else(|| free().min_by_key(|(_, slot)| slot.running))
    .map(|(index, _)| index)
    .unwrap_or(0)
}

fn panicked(join_error: &JoinError) -> RunFailure {
  RunFailure::Crash {
    exit_code: None,
    message: format!("worker task aborted: {join_error}"),
  }
}
