//! Messages exchanged between [`RemoteWorker`](crate::RemoteWorker) and
//! [`WorkerServer`](crate::WorkerServer).
//!
//! One connection carries one attempt:
//!
//! ```text
//! client → server   RunMessage (JSON frame), netlist (binary frame)
//! server → client   ResultMessage (JSON frame)
//!                   on success: raw frame, then log frame if has_log
//! ```
//!
//! The client closing its end before the result is sent cancels the run.

use serde::{Deserialize, Serialize};
use simsweep_queue::TaskId;
use simsweep_raw::StepCoordinate;

use crate::RunFailure;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMessage {
  pub task_id: TaskId,
  pub attempt: u32,
  /// Plain file name the netlist is stored under on the worker.
  pub netlist_name: String,
  #[serde(default, skip_serializing_if = "StepCoordinate::is_empty")]
  pub parameters: StepCoordinate,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub flags: Vec<String>,
  pub limits: ResourceLimits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
  pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMessage {
  pub task_id: TaskId,
  pub attempt: u32,
  pub result: RunResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunResult {
  Succeeded { has_log: bool },
  Failed { failure: RunFailure },
}
