use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::framing::{self, FrameError, MAX_FRAME_SIZE};
use crate::wire::{ResourceLimits, ResultMessage, RunMessage, RunResult};
use crate::{OutputRef, RunFailure, RunOutput, RunRequest, Worker, WorkerId};

/// Client side of a [`WorkerServer`](crate::WorkerServer) on another host.
///
/// Each attempt uses its own connection. Dropping the connection (timeout or
/// cancellation) tells the server to kill the simulator.
pub struct RemoteWorker {
  id: WorkerId,
  address: String,
  slots: usize,
  grace: Duration,
}

impl RemoteWorker {
  pub fn new(address: impl Into<String>, slots: usize, grace: Duration) -> Self {
    let address = address.into();
    Self {
      id: WorkerId::new(format!("remote:{address}")),
      address,
      slots,
      grace,
    }
  }

  pub fn address(&self) -> &str {
    &self.address
  }

  async fn exchange(
    &self,
    request: &RunRequest,
    netlist_name: String,
    netlist: Vec<u8>,
  ) -> Result<Result<RunOutput, RunFailure>, FrameError> {
    let mut stream = TcpStream::connect(&self.address).await?;
    stream.set_nodelay(true)?;

    let message = RunMessage {
      task_id: request.task_id,
      attempt: request.attempt,
      netlist_name,
      parameters: request.parameters.clone(),
      flags: request.flags.clone(),
      limits: ResourceLimits {
        timeout_ms: request.timeout.as_millis() as u64,
      },
    };
    framing::write_message(&mut stream, &message).await?;
    framing::write_frame(&mut stream, &netlist).await?;
    debug!("request_sent");

    let response: ResultMessage = framing::read_message(&mut stream).await?;
    if response.task_id != request.task_id || response.attempt != request.attempt {
      return Ok(Err(RunFailure::Transport {
        message: format!(
          "response for {}#{} while waiting for {}#{}",
          response.task_id, response.attempt, request.task_id, request.attempt
        ),
      }));
    }

    match response.result {
      RunResult::Failed { failure } => Ok(Err(failure)),
      RunResult::Succeeded { has_log } => {
        let raw = framing::read_frame(&mut stream, MAX_FRAME_SIZE).await?;
        let log = if has_log {
          let log = framing::read_frame(&mut stream, MAX_FRAME_SIZE).await?;
          Some(OutputRef::Inline(Bytes::from(log)))
        } else {
          None
        };
        Ok(Ok(RunOutput {
          worker: self.id.clone(),
          raw: OutputRef::Inline(Bytes::from(raw)),
          log,
          scratch_dir: None,
        }))
      }
    }
  }
}

#[async_trait]
impl Worker for RemoteWorker {
  fn id(&self) -> &WorkerId {
    &self.id
  }

  fn capacity(&self) -> usize {
    self.slots
  }

  #[instrument(
    name = "remote_run",
    skip(self, request, cancel),
    fields(worker = %self.id, task_id = %request.task_id, attempt = request.attempt)
  )]
  async fn run(
    &self,
    request: RunRequest,
    cancel: CancellationToken,
  ) -> Result<RunOutput, RunFailure> {
    if cancel.is_cancelled() {
      return Err(RunFailure::Cancelled);
    }

    let netlist_name = request
      .netlist
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .ok_or_else(|| RunFailure::Rejected {
        message: format!("netlist path has no file name: {}", request.netlist.display()),
      })?;
    let netlist = tokio::fs::read(&request.netlist)
      .await
      .map_err(|e| RunFailure::Rejected {
        message: format!("cannot read {}: {e}", request.netlist.display()),
      })?;

    let deadline = request.timeout + self.grace;
    tokio::select! {
      result = self.exchange(&request, netlist_name, netlist) => match result {
        Ok(outcome) => outcome,
        Err(e) => {
          warn!(error = %e, "remote_transport_failed");
          Err(RunFailure::Transport { message: e.to_string() })
        }
      },
      _ = tokio::time::sleep(deadline) => {
        warn!(deadline_ms = deadline.as_millis() as u64, "remote_deadline_expired");
        Err(RunFailure::Timeout { timeout_ms: request.timeout.as_millis() as u64 })
      }
      _ = cancel.cancelled() => Err(RunFailure::Cancelled),
    }
  }
}
