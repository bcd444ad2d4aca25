//! Simsweep Worker
//!
//! A worker runs one task attempt: it invokes the external simulator on the
//! task's netlist in a private scratch directory and reports where the output
//! is, or why there is none.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   run(request, cancel)   ┌──────────────────────────┐
//! │  Dispatcher  │ ───────────────────────▶ │  dyn Worker              │
//! └──────────────┘                          │  - LocalWorker           │
//!                                           │  - RemoteWorker ─── TCP ─┼──▶ WorkerServer
//!                                           └──────────────────────────┘        │
//!                                                        │                      ▼
//!                                                        ▼                 LocalWorker
//!                                               dyn Simulator (ProcessSimulator)
//! ```
//!
//! Local and remote workers are interchangeable; the dispatcher only sees
//! their [`WorkerId`] and slot count.

mod error;
pub mod framing;
mod local;
mod output;
mod remote;
mod server;
mod simulator;
pub mod wire;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use simsweep_queue::{Task, TaskId};
use simsweep_raw::StepCoordinate;
use tokio_util::sync::CancellationToken;

pub use error::RunFailure;
pub use local::LocalWorker;
pub use output::{OutputRef, RunOutput};
pub use remote::RemoteWorker;
pub use server::WorkerServer;
pub use simulator::{Invocation, OutputPaths, ProcessSimulator, Simulator, SimulatorExit};

/// Identity of a worker, used for load reporting and retry affinity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(String);

impl WorkerId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for WorkerId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// One attempt of a task, as handed to a worker.
#[derive(Debug, Clone)]
pub struct RunRequest {
  pub task_id: TaskId,
  /// 1 for the first attempt.
  pub attempt: u32,
  pub netlist: PathBuf,
  /// Coordinate the simulator is asked to run at.
  pub parameters: StepCoordinate,
  pub flags: Vec<String>,
  pub timeout: Duration,
}

impl RunRequest {
  /// Request for the current attempt of `task`.
  pub fn for_task(task: &Task, default_timeout: Duration) -> Self {
    Self {
      task_id: task.id,
      attempt: task.attempts(),
      netlist: task.netlist.clone(),
      parameters: task.coordinate.clone(),
      flags: task.flags.clone(),
      timeout: task.timeout.unwrap_or(default_timeout),
    }
  }
}

/// Something that can run simulations.
#[async_trait]
pub trait Worker: Send + Sync {
  fn id(&self) -> &WorkerId;

  /// Number of attempts this worker runs at the same time.
  fn capacity(&self) -> usize;

  /// Run one attempt. The simulator process is stopped when `cancel` fires
  /// or the request's timeout expires; the call returns once it is gone.
  async fn run(
    &self,
    request: RunRequest,
    cancel: CancellationToken,
  ) -> Result<RunOutput, RunFailure>;
}
