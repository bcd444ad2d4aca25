use std::collections::{HashMap, VecDeque};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use simsweep_queue::TaskId;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OnceCell, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::framing::{self, FrameError, MAX_FRAME_SIZE};
use crate::wire::{ResultMessage, RunMessage, RunResult};
use crate::{RunFailure, RunRequest, Worker};

type AttemptKey = (TaskId, u32);
type AttemptOutcome = Result<(Bytes, Option<Bytes>), RunFailure>;

const DEFAULT_CACHE_CAPACITY: usize = 256;
const DEFAULT_CACHE_BYTES: usize = 256 * 1024 * 1024;

/// Serves attempts from [`RemoteWorker`](crate::RemoteWorker) clients on top
/// of a local worker.
///
/// Results are remembered per `(task_id, attempt)`: a request that arrives
/// again, for example after the client lost the connection, is answered from
/// the first run instead of invoking the simulator twice. Cancelled runs are
/// not remembered. The cache is bounded both by entry count and by the total
/// size of the remembered waveforms and logs.
pub struct WorkerServer {
  worker: Arc<dyn Worker>,
  inbox_root: PathBuf,
  slots: Arc<Semaphore>,
  results: Mutex<ResultCache>,
}

struct ResultCache {
  entries: HashMap<AttemptKey, Arc<OnceCell<AttemptOutcome>>>,
  order: VecDeque<AttemptKey>,
  /// Payload size of finished entries. In-flight entries have none.
  sizes: HashMap<AttemptKey, usize>,
  total_bytes: usize,
  capacity: usize,
  max_bytes: usize,
}

impl ResultCache {
  fn new(capacity: usize, max_bytes: usize) -> Self {
    Self {
      entries: HashMap::new(),
      order: VecDeque::new(),
      sizes: HashMap::new(),
      total_bytes: 0,
      capacity,
      max_bytes,
    }
  }

  fn cell(&mut self, key: AttemptKey) -> Arc<OnceCell<AttemptOutcome>> {
    if let Some(cell) = self.entries.get(&key) {
      return cell.clone();
    }
    while self.order.len() >= self.capacity {
      match self.order.pop_front() {
        Some(oldest) => self.remove(oldest),
        None => break,
      }
    }
    let cell = Arc::new(OnceCell::new());
    self.entries.insert(key, cell.clone());
    self.order.push_back(key);
    cell
  }

  /// Account for a finished entry, then evict the oldest finished entries
  /// until the total fits. An entry larger than the limit evicts itself.
  fn record(&mut self, key: AttemptKey, cell: &Arc<OnceCell<AttemptOutcome>>, bytes: usize) {
    if !self.is_current(key, cell) || self.sizes.contains_key(&key) {
      return;
    }
    self.sizes.insert(key, bytes);
    self.total_bytes += bytes;

    while self.total_bytes > self.max_bytes {
      let Some(position) = self.order.iter().position(|k| self.sizes.contains_key(k)) else {
        break;
      };
      if let Some(oldest) = self.order.remove(position) {
        self.remove(oldest);
      }
    }
  }

  fn forget(&mut self, key: AttemptKey, cell: &Arc<OnceCell<AttemptOutcome>>) {
    if self.is_current(key, cell) {
      self.order.retain(|k| *k != key);
      self.remove(key);
    }
  }

  fn is_current(&self, key: AttemptKey, cell: &Arc<OnceCell<AttemptOutcome>>) -> bool {
    self
      .entries
      .get(&key)
      .is_some_and(|current| Arc::ptr_eq(current, cell))
  }

  fn remove(&mut self, key: AttemptKey) {
    self.entries.remove(&key);
    if let Some(bytes) = self.sizes.remove(&key) {
      self.total_bytes -= bytes;
    }
  }
}

fn outcome_bytes(outcome: &AttemptOutcome) -> usize {
  match outcome {
    Ok((raw, log)) => raw.len() + log.as_ref().map_or(0, Bytes::len),
    Err(_) => 0,
  }
}

impl WorkerServer {
  /// `inbox_root` receives the netlists shipped by clients.
  pub fn new(worker: Arc<dyn Worker>, inbox_root: impl Into<PathBuf>) -> Self {
    let slots = worker.capacity().max(1);
    Self {
      worker,
      inbox_root: inbox_root.into(),
      slots: Arc::new(Semaphore::new(slots)),
      results: Mutex::new(ResultCache::new(
        DEFAULT_CACHE_CAPACITY,
        DEFAULT_CACHE_BYTES,
      )),
    }
  }

  /// Number of finished attempts remembered for resubmissions.
  pub fn with_cache_capacity(self, capacity: usize) -> Self {
    self
      .results
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .capacity = capacity.max(1);
    self
  }

  /// Total size of waveforms and logs remembered for resubmissions.
  pub fn with_cache_bytes(self, max_bytes: usize) -> Self {
    self
      .results
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .max_bytes = max_bytes;
    self
  }

  /// Accept connections until `shutdown` fires. In-flight attempts are
  /// cancelled with it.
  pub async fn serve(
    self: Arc<Self>,
    listener: TcpListener,
    shutdown: CancellationToken,
  ) -> std::io::Result<()> {
    info!(address = %listener.local_addr()?, worker = %self.worker.id(), "worker_server_started");

    loop {
      tokio::select! {
        _ = shutdown.cancelled() => break,
        accepted = listener.accept() => match accepted {
          Ok((stream, peer)) => {
            let server = self.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
              if let Err(e) = server.handle(stream, shutdown).await {
                warn!(peer = %peer, error = %e, "connection_failed");
              }
            });
          }
          Err(e) => warn!(error = %e, "accept_failed"),
        },
      }
    }

    info!("worker_server_stopped");
    Ok(())
  }

  #[instrument(name = "serve_attempt", skip_all)]
  async fn handle(&self, stream: TcpStream, shutdown: CancellationToken) -> Result<(), FrameError> {
    stream.set_nodelay(true)?;
    let (mut reader, mut writer) = stream.into_split();

    let message: RunMessage = framing::read_message(&mut reader).await?;
    let netlist = framing::read_frame(&mut reader, MAX_FRAME_SIZE).await?;
    let task_id = message.task_id;
    let attempt = message.attempt;
    debug!(task_id = %task_id, attempt, "request_received");

    // The client never sends anything after the netlist; EOF means it hung up.
    let cancel = shutdown.child_token();
    let watcher = {
      let cancel = cancel.clone();
      tokio::spawn(async move {
        let mut byte = [0u8; 1];
        if let Ok(0) | Err(_) = reader.read(&mut byte).await {
          cancel.cancel();
        }
      })
    };

    let outcome = self.execute(message, netlist, cancel).await;
    watcher.abort();

    let result = match &outcome {
      Ok((_, log)) => RunResult::Succeeded {
        has_log: log.is_some(),
      },
      Err(failure) => RunResult::Failed {
        failure: failure.clone(),
      },
    };
    framing::write_message(
      &mut writer,
      &ResultMessage {
        task_id,
        attempt,
        result,
      },
    )
    .await?;
    if let Ok((raw, log)) = &outcome {
      framing::write_frame(&mut writer, raw).await?;
      if let Some(log) = log {
        framing::write_frame(&mut writer, log).await?;
      }
    }
    writer.shutdown().await?;
    debug!(task_id = %task_id, attempt, "response_sent");
    Ok(())
  }

  async fn execute(
    &self,
    message: RunMessage,
    netlist: Vec<u8>,
    cancel: CancellationToken,
  ) -> AttemptOutcome {
    let key = (message.task_id, message.attempt);
    let cell = self
      .results
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .cell(key);

    if cell.initialized() {
      info!(task_id = %key.0, attempt = key.1, "duplicate_request_served_from_cache");
    }

    let outcome = cell
      .get_or_init(|| self.run_fresh(message, netlist, cancel))
      .await
      .clone();

    let mut results = self.results.lock().unwrap_or_else(PoisonError::into_inner);
    if matches!(outcome, Err(RunFailure::Cancelled)) {
      results.forget(key, &cell);
    } else {
      results.record(key, &cell, outcome_bytes(&outcome));
    }
    drop(results);
    outcome
  }

  async fn run_fresh(
    &self,
    message: RunMessage,
    netlist: Vec<u8>,
    cancel: CancellationToken,
  ) -> AttemptOutcome {
    if !is_plain_file_name(&message.netlist_name) {
      return Err(RunFailure::Rejected {
        message: format!("invalid netlist name {:?}", message.netlist_name),
      });
    }

    let _permit = tokio::select! {
      permit = self.slots.clone().acquire_owned() => permit.map_err(|_| RunFailure::Cancelled)?,
      _ = cancel.cancelled() => return Err(RunFailure::Cancelled),
    };

    let inbox = self
      .inbox_root
      .join(format!("{}-{}", message.task_id, message.attempt));
    let outcome = self.run_in(&inbox, message, netlist, cancel).await;
    match tokio::fs::remove_dir_all(&inbox).await {
      Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
        warn!(path = %inbox.display(), error = %e, "inbox_cleanup_failed");
      }
      _ => {}
    }
    outcome
  }

  async fn run_in(
    &self,
    inbox: &Path,
    message: RunMessage,
    netlist: Vec<u8>,
    cancel: CancellationToken,
  ) -> AttemptOutcome {
    let netlist_path = inbox.join(&message.netlist_name);
    let stored = async {
      tokio::fs::create_dir_all(inbox).await?;
      tokio::fs::write(&netlist_path, &netlist).await
    };
    stored.await.map_err(|e| RunFailure::Rejected {
      message: format!("cannot store netlist: {e}"),
    })?;

    let request = RunRequest {
      task_id: message.task_id,
      attempt: message.attempt,
      netlist: netlist_path,
      parameters: message.parameters,
      flags: message.flags,
      timeout: Duration::from_millis(message.limits.timeout_ms),
    };
    let output = self.worker.run(request, cancel).await?;

    let raw = output
      .raw
      .read()
      .await
      .map_err(|e| RunFailure::OutputMissing {
        message: format!("cannot read waveform: {e}"),
      })?;
    let log = match &output.log {
      Some(log) => log.read().await.ok(),
      None => None,
    };

    // The client receives the bytes; nothing on this host needs the files.
    if let Some(dir) = &output.scratch_dir {
      if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        warn!(path = %dir.display(), error = %e, "scratch_cleanup_failed");
      }
    }
    Ok((raw, log))
  }
}

fn is_plain_file_name(name: &str) -> bool {
  !name.contains(['/', '\\'])
    && Path::new(name)
      .file_name()
      .is_some_and(|file_name| file_name == OsStr::new(name))
}
