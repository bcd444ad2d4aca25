use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use simsweep_raw::StepCoordinate;
use simsweep_steps::Sweep;
use uuid::Uuid;

/// Unique identifier of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
  pub fn new() -> Self {
    Self(Uuid::new_v4())
  }
}

impl Default for TaskId {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Display for TaskId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.0.fmt(f)
  }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
  Pending,
  Running,
  Succeeded,
  Failed,
  Cancelled,
}

impl TaskStatus {
  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Cancelled
    )
  }
}

/// One simulator invocation of a campaign.
///
/// The definition fields are public. Lifecycle fields are read through
/// accessors and only change through [`TaskQueue`](crate::TaskQueue); a
/// `Task` handed out by the queue is a snapshot.
#[derive(Debug, Clone)]
pub struct Task {
  pub id: TaskId,
  /// Netlist to simulate.
  pub netlist: PathBuf,
  /// Campaign coordinate of this invocation.
  pub coordinate: StepCoordinate,
  /// Steps the netlist sweeps internally (`.step`), one run each.
  pub steps: Option<Sweep>,
  /// Extra simulator flags.
  pub flags: Vec<String>,
  /// Overrides the dispatcher's default timeout.
  pub timeout: Option<Duration>,
  pub(crate) status: TaskStatus,
  pub(crate) attempts: u32,
  pub(crate) worker: Option<String>,
  pub(crate) last_error: Option<String>,
  pub(crate) cancel_requested: bool,
  pub(crate) created_at: DateTime<Utc>,
  pub(crate) started_at: Option<DateTime<Utc>>,
  pub(crate) finished_at: Option<DateTime<Utc>>,
}

impl Task {
  pub fn new(netlist: impl Into<PathBuf>, coordinate: StepCoordinate) -> Self {
    Self {
      id: TaskId::new(),
      netlist: netlist.into(),
      coordinate,
      steps: None,
      flags: Vec::new(),
      timeout: None,
      status: TaskStatus::Pending,
      attempts: 0,
      worker: None,
      last_error: None,
      cancel_requested: false,
      created_at: Utc::now(),
      started_at: None,
      finished_at: None,
    }
  }

  pub fn with_steps(mut self, steps: Sweep) -> Self {
    self.steps = Some(steps);
    self
  }

  pub fn with_flags(mut self, flags: Vec<String>) -> Self {
    self.flags = flags;
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  pub fn status(&self) -> TaskStatus {
    self.status
  }

  /// Number of times the task has been handed to a worker.
  pub fn attempts(&self) -> u32 {
    self.attempts
  }

  /// Worker running (or that last ran) the task.
  pub fn worker(&self) -> Option<&str> {
    self.worker.as_deref()
  }

  pub fn last_error(&self) -> Option<&str> {
    self.last_error.as_deref()
  }

  pub fn cancel_requested(&self) -> bool {
    self.cancel_requested
  }

  pub fn created_at(&self) -> DateTime<Utc> {
    self.created_at
  }

  pub fn started_at(&self) -> Option<DateTime<Utc>> {
    self.started_at
  }

  pub fn finished_at(&self) -> Option<DateTime<Utc>> {
    self.finished_at
  }

  /// Number of runs the simulator output must contain.
  pub fn expected_runs(&self) -> usize {
    self.steps.as_ref().map_or(1, Sweep::len)
  }

  /// Full campaign coordinates this task produces, in run order.
  pub fn expected_coordinates(&self) -> Vec<StepCoordinate> {
    match &self.steps {
      Some(steps) => steps
        .coordinates()
        .map(|inner| self.coordinate.concat(&inner))
        .collect(),
      None => vec![self.coordinate.clone()],
    }
  }
}
