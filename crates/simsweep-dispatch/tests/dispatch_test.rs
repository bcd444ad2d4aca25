//! Dispatcher behaviour against scripted workers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use simsweep_dispatch::{
  ChannelNotifier, Completion, DispatchError, DispatchEvent, Dispatcher, DispatcherConfig,
  RetryPolicy,
};
use simsweep_queue::{Task, TaskQueue, TaskStatus};
use simsweep_raw::StepCoordinate;
use simsweep_worker::{OutputRef, RunFailure, RunOutput, RunRequest, Worker, WorkerId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

enum Script {
  Succeed,
  Always(RunFailure),
  Sequence(Mutex<VecDeque<Result<(), RunFailure>>>),
  Hang,
}

struct ScriptedWorker {
  id: WorkerId,
  capacity: usize,
  delay: Duration,
  script: Script,
  running: AtomicUsize,
  peak: AtomicUsize,
  calls: AtomicUsize,
}

impl ScriptedWorker {
  fn new(id: &str, capacity: usize, script: Script) -> Self {
    Self {
      id: WorkerId::new(id),
      capacity,
      delay: Duration::from_millis(10),
      script,
      running: AtomicUsize::new(0),
      peak: AtomicUsize::new(0),
      calls: AtomicUsize::new(0),
    }
  }

  fn peak(&self) -> usize {
    self.peak.load(Ordering::SeqCst)
  }

  fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Worker for ScriptedWorker {
  fn id(&self) -> &WorkerId {
    &self.id
  }

  fn capacity(&self) -> usize {
    self.capacity
  }

  async fn run(
    &self,
    _request: RunRequest,
    cancel: CancellationToken,
  ) -> Result<RunOutput, RunFailure> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak.fetch_max(now, Ordering::SeqCst);

    let result = match &self.script {
      Script::Hang => {
        cancel.cancelled().await;
        Err(RunFailure::Cancelled)
      }
      script => {
        tokio::time::sleep(self.delay).await;
        match script {
          Script::Succeed => Ok(()),
          Script::Always(failure) => Err(failure.clone()),
          Script::Sequence(steps) => steps.lock().unwrap().pop_front().unwrap_or(Ok(())),
          Script::Hang => unreachable!(),
        }
      }
    };

    self.running.fetch_sub(1, Ordering::SeqCst);
    result.map(|()| RunOutput {
      worker: self.id.clone(),
      raw: OutputRef::Inline(Bytes::from_static(b"raw")),
      log: None,
      scratch_dir: None,
    })
  }
}

fn pool(workers: &[&Arc<ScriptedWorker>]) -> Vec<Arc<dyn Worker>> {
  workers
    .iter()
    .map(|worker| Arc::clone(worker) as Arc<dyn Worker>)
    .collect()
}

fn config(max_concurrency: usize) -> DispatcherConfig {
  DispatcherConfig {
    max_concurrency,
    default_timeout: Duration::from_secs(5),
    retry: RetryPolicy {
      timeout_retries: 2,
      crash_retries: 1,
    },
  }
}

fn queue_with(tasks: usize) -> Arc<TaskQueue> {
  let queue = Arc::new(TaskQueue::new());
  for i in 0..tasks {
    queue.submit(Task::new(
      "rc.net",
      StepCoordinate::new().with("i", i as f64),
    ));
  }
  queue
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Completion>) -> Vec<Completion> {
  let mut out = Vec::new();
  while let Ok(completion) = rx.try_recv() {
    out.push(completion);
  }
  out
}

#[tokio::test]
async fn test_concurrency_limit_holds() {
  let worker = Arc::new(ScriptedWorker::new("local-0", 8, Script::Succeed));
  let dispatcher = Dispatcher::new(config(2), pool(&[&worker])).unwrap();
  assert_eq!(dispatcher.concurrency(), 2);

  let queue = queue_with(6);
  let (tx, mut rx) = mpsc::unbounded_channel();
  let summary = dispatcher.run(queue.clone(), tx).await.unwrap();

  assert!(worker.peak() <= 2);
  assert!(summary.peak_in_flight <= 2);
  assert_eq!(summary.counts.succeeded, 6);
  assert_eq!(drain(&mut rx).len(), 6);
  assert!(queue.is_drained());
}

#[tokio::test]
async fn test_worker_slots_cap_concurrency() {
  let a = Arc::new(ScriptedWorker::new("a", 1, Script::Succeed));
  let b = Arc::new(ScriptedWorker::new("b", 1, Script::Succeed));
  let dispatcher = Dispatcher::new(config(8), pool(&[&a, &b])).unwrap();
  assert_eq!(dispatcher.concurrency(), 2);

  let (tx, _rx) = mpsc::unbounded_channel();
  let summary = dispatcher.run(queue_with(6), tx).await.unwrap();

  assert_eq!(a.peak(), 1);
  assert_eq!(b.peak(), 1);
  assert_eq!(a.calls() + b.calls(), 6);
  let attempts: usize = summary.workers.iter().map(|w| w.attempts).sum();
  assert_eq!(attempts, 6);
}

#[tokio::test]
async fn test_timeout_retried_up_to_bound() {
  let worker = Arc::new(ScriptedWorker::new(
    "w",
    1,
    Script::Always(RunFailure::Timeout { timeout_ms: 5 }),
  ));
  let dispatcher = Dispatcher::new(config(1), pool(&[&worker])).unwrap();

  let queue = queue_with(1);
  let (tx, mut rx) = mpsc::unbounded_channel();
  let summary = dispatcher.run(queue.clone(), tx).await.unwrap();

  let task = &queue.snapshot()[0];
  assert_eq!(task.status(), TaskStatus::Failed);
  assert_eq!(task.attempts(), 3);
  assert_eq!(worker.calls(), 3);
  assert_eq!(summary.counts.failed, 1);
  assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_crash_moves_to_other_worker() {
  let crashing = Arc::new(ScriptedWorker::new(
    "a",
    1,
    Script::Always(RunFailure::Crash {
      exit_code: Some(139),
      message: "segmentation fault".to_string(),
    }),
  ));
  let healthy = Arc::new(ScriptedWorker::new("b", 1, Script::Succeed));
  let dispatcher = Dispatcher::new(config(1), pool(&[&crashing, &healthy])).unwrap();

  let queue = queue_with(1);
  let (tx, mut rx) = mpsc::unbounded_channel();
  dispatcher.run(queue.clone(), tx).await.unwrap();

  let completions = drain(&mut rx);
  assert_eq!(completions.len(), 1);
  assert_eq!(completions[0].output.worker, WorkerId::new("b"));
  assert_eq!(completions[0].task.attempts(), 2);
  assert_eq!(completions[0].task.worker(), Some("b"));
  assert_eq!(crashing.calls(), 1);
}

#[tokio::test]
async fn test_retry_then_success() {
  let worker = Arc::new(ScriptedWorker::new(
    "w",
    1,
    Script::Sequence(Mutex::new(VecDeque::from([
      Err(RunFailure::Timeout { timeout_ms: 5 }),
      Ok(()),
    ]))),
  ));
  let dispatcher = Dispatcher::new(config(1), pool(&[&worker])).unwrap();

  let queue = queue_with(1);
  let (tx, mut rx) = mpsc::unbounded_channel();
  dispatcher.run(queue.clone(), tx).await.unwrap();

  let completions = drain(&mut rx);
  assert_eq!(completions.len(), 1);
  assert_eq!(completions[0].task.status(), TaskStatus::Succeeded);
  assert_eq!(completions[0].task.attempts(), 2);
}

#[tokio::test]
async fn test_missing_output_not_retried() {
  let worker = Arc::new(ScriptedWorker::new(
    "w",
    1,
    Script::Always(RunFailure::OutputMissing {
      message: "no raw file".to_string(),
    }),
  ));
  let dispatcher = Dispatcher::new(config(1), pool(&[&worker])).unwrap();

  let queue = queue_with(1);
  let (tx, _rx) = mpsc::unbounded_channel();
  dispatcher.run(queue.clone(), tx).await.unwrap();

  let task = &queue.snapshot()[0];
  assert_eq!(task.status(), TaskStatus::Failed);
  assert_eq!(task.attempts(), 1);
  assert!(task.last_error().unwrap().contains("no raw file"));
}

#[tokio::test]
async fn test_cancel_all_stops_dispatch() {
  let worker = Arc::new(ScriptedWorker::new("w", 2, Script::Hang));
  let dispatcher = Arc::new(Dispatcher::new(config(2), pool(&[&worker])).unwrap());

  let queue = queue_with(5);
  let (tx, mut rx) = mpsc::unbounded_channel();
  let handle = {
    let dispatcher = dispatcher.clone();
    let queue = queue.clone();
    tokio::spawn(async move { dispatcher.run(queue, tx).await })
  };

  for _ in 0..200 {
    if queue.counts().running == 2 {
      break;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  assert_eq!(queue.counts().running, 2);

  assert_eq!(queue.cancel_all(), 3);
  let summary = tokio::time::timeout(Duration::from_secs(5), handle)
    .await
    .unwrap()
    .unwrap()
    .unwrap();

  assert_eq!(summary.counts.cancelled, 5);
  assert_eq!(worker.calls(), 2);
  assert!(drain(&mut rx).is_empty());
  assert!(queue.is_drained());
}

#[tokio::test]
async fn test_events_follow_attempts() {
  let worker = Arc::new(ScriptedWorker::new(
    "w",
    1,
    Script::Sequence(Mutex::new(VecDeque::from([Err(RunFailure::Crash {
      exit_code: Some(1),
      message: "boom".to_string(),
    })]))),
  ));
  let (events_tx, mut events_rx) = mpsc::unbounded_channel();
  let dispatcher =
    Dispatcher::with_notifier(config(1), pool(&[&worker]), ChannelNotifier::new(events_tx)).unwrap();

  let queue = queue_with(1);
  let task_id = queue.snapshot()[0].id;
  let (tx, _rx) = mpsc::unbounded_channel();
  dispatcher.run(queue, tx).await.unwrap();

  let mut events = Vec::new();
  while let Ok(event) = events_rx.try_recv() {
    events.push(event);
  }
  assert_eq!(events.len(), 5);
  assert!(matches!(&events[0], DispatchEvent::TaskStarted { attempt: 1, .. }));
  assert!(matches!(&events[1], DispatchEvent::TaskRetrying { attempt: 1, .. }));
  assert!(matches!(&events[2], DispatchEvent::TaskStarted { attempt: 2, .. }));
  assert_eq!(
    events[3],
    DispatchEvent::TaskSucceeded {
      task_id,
      attempt: 2,
      worker: "w".to_string(),
    }
  );
  assert_eq!(
    events[4],
    DispatchEvent::DispatchFinished {
      succeeded: 1,
      failed: 0,
      cancelled: 0,
    }
  );
}

#[tokio::test]
async fn test_empty_queue_finishes_immediately() {
  let worker = Arc::new(ScriptedWorker::new("w", 1, Script::Succeed));
  let dispatcher = Dispatcher::new(config(1), pool(&[&worker])).unwrap();
  let (tx, _rx) = mpsc::unbounded_channel();
  let summary = dispatcher.run(Arc::new(TaskQueue::new()), tx).await.unwrap();
  assert_eq!(summary.counts.total(), 0);
  assert_eq!(worker.calls(), 0);
}

#[test]
fn test_rejects_unusable_configuration() {
  assert!(matches!(
    Dispatcher::new(config(1), Vec::new()),
    Err(DispatchError::NoWorkers)
  ));

  let worker: Arc<dyn Worker> = Arc::new(ScriptedWorker::new("w", 1, Script::Succeed));
  assert!(matches!(
    Dispatcher::new(config(0), vec![worker]),
    Err(DispatchError::ZeroConcurrency { .. })
  ));

  let idle: Arc<dyn Worker> = Arc::new(ScriptedWorker::new("w", 0, Script::Succeed));
  assert!(matches!(
    Dispatcher::new(config(4), vec![idle]),
    Err(DispatchError::ZeroConcurrency { .. })
  ));
}
