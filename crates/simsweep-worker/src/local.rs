use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use simsweep_raw::RawRunReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
  Invocation, OutputRef, RunFailure, RunOutput, RunRequest, Simulator, SimulatorExit, Worker,
  WorkerId,
};

/// Runs attempts on this machine, each in `<scratch_root>/<task_id>/<attempt>`.
///
/// Scratch directories of failed attempts are left in place for inspection.
pub struct LocalWorker {
  id: WorkerId,
  slots: usize,
  scratch_root: PathBuf,
  simulator: Arc<dyn Simulator>,
}

impl LocalWorker {
  pub fn new(
    id: WorkerId,
    slots: usize,
    scratch_root: impl Into<PathBuf>,
    simulator: Arc<dyn Simulator>,
  ) -> Self {
    Self {
      id,
      slots,
      scratch_root: scratch_root.into(),
      simulator,
    }
  }

  pub fn scratch_root(&self) -> &Path {
    &self.scratch_root
  }

  async fn prepare(&self, request: &RunRequest) -> Result<Invocation, RunFailure> {
    let file_name = request
      .netlist
      .file_name()
      .ok_or_else(|| RunFailure::Rejected {
        message: format!("netlist path has no file name: {}", request.netlist.display()),
      })?;

    let scratch_dir = self
      .scratch_root
      .join(request.task_id.to_string())
      .join(request.attempt.to_string());

    if tokio::fs::try_exists(&scratch_dir).await.unwrap_or(false) {
      // Leftovers from an earlier process using the same attempt number.
      if let Err(e) = tokio::fs::remove_dir_all(&scratch_dir).await {
        warn!(path = %scratch_dir.display(), error = %e, "stale_scratch_cleanup_failed");
      }
    }
    tokio::fs::create_dir_all(&scratch_dir)
      .await
      .map_err(|e| RunFailure::Rejected {
        message: format!("cannot create {}: {e}", scratch_dir.display()),
      })?;

    let netlist = scratch_dir.join(file_name);
    tokio::fs::copy(&request.netlist, &netlist)
      .await
      .map_err(|e| RunFailure::Rejected {
        message: format!("cannot copy {}: {e}", request.netlist.display()),
      })?;

    Ok(Invocation {
      task_id: request.task_id,
      netlist,
      scratch_dir,
      parameters: request.parameters.clone(),
      flags: request.flags.clone(),
    })
  }

  async fn collect_outputs(&self, invocation: &Invocation) -> Result<RunOutput, RunFailure> {
    let outputs = self.simulator.outputs(invocation);

    let runs = verify_raw(outputs.raw.clone()).await?;
    debug!(runs, "output_verified");

    let log = match tokio::fs::try_exists(&outputs.log).await {
      Ok(true) => Some(OutputRef::Path(outputs.log)),
      _ => None,
    };

    Ok(RunOutput {
      worker: self.id.clone(),
      raw: OutputRef::Path(outputs.raw),
      log,
      scratch_dir: Some(invocation.scratch_dir.clone()),
    })
  }
}

/// Checks that `path` decodes completely: every segment's header and its
/// declared payload. Returns the number of runs.
async fn verify_raw(path: PathBuf) -> Result<usize, RunFailure> {
  let display = path.display().to_string();
  let checked =
    tokio::task::spawn_blocking(move || RawRunReader::open(&path)?.count_runs()).await;

  match checked {
    Ok(Ok(0)) => Err(RunFailure::OutputMissing {
      message: format!("{display} is empty"),
    }),
    Ok(Ok(runs)) => Ok(runs),
    Ok(Err(e)) => Err(RunFailure::OutputMissing {
      message: format!("{display}: {e}"),
    }),
    Err(e) => Err(RunFailure::OutputMissing {
      message: format!("check of {display} failed: {e}"),
    }),
  }
}

async fn stderr_tail(scratch_dir: &Path) -> Option<String> {
  let text = tokio::fs::read_to_string(scratch_dir.join("stderr.txt"))
    .await
    .ok()?;
  text
    .lines()
    .rev()
    .find(|line| !line.trim().is_empty())
    .map(|line| line.trim().to_string())
}

#[async_trait]
impl Worker for LocalWorker {
  fn id(&self) -> &WorkerId {
    &self.id
  }

  fn capacity(&self) -> usize {
    self.slots
  }

  #[instrument(
    name = "local_run",
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

    let invocation = self.prepare(&request).await?;
    debug!(scratch = %invocation.scratch_dir.display(), "attempt_prepared");

    let exit = self
      .simulator
      .simulate(&invocation, request.timeout, &cancel)
      .await
      .map_err(|e| RunFailure::Crash {
        exit_code: None,
        message: format!("failed to run {}: {e}", self.simulator.name()),
      })?;

    match exit {
      SimulatorExit::Exited { code: Some(0) } => {
        let output = self.collect_outputs(&invocation).await;
        match &output {
          Ok(_) => info!("attempt_succeeded"),
          Err(e) => warn!(error = %e, "attempt_output_missing"),
        }
        output
      }
      SimulatorExit::Exited { code } => {
        let message = stderr_tail(&invocation.scratch_dir)
          .await
          .unwrap_or_else(|| "simulator reported an error".to_string());
        warn!(code = ?code, message = %message, "attempt_crashed");
        Err(RunFailure::Crash {
          exit_code: code,
          message,
        })
      }
      SimulatorExit::TimedOut => {
        warn!(timeout_ms = request.timeout.as_millis() as u64, "attempt_timed_out");
        Err(RunFailure::Timeout {
          timeout_ms: request.timeout.as_millis() as u64,
        })
      }
      SimulatorExit::Cancelled => {
        info!("attempt_cancelled");
        Err(RunFailure::Cancelled)
      }
    }
  }
}
