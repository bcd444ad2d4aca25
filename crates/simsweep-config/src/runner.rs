use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Execution settings shared by every campaign run with them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
  /// Maximum simulator processes running at once (CPU or license bound).
  pub max_concurrency: usize,
  /// Per-task timeout unless the campaign overrides it.
  pub timeout_ms: u64,
  pub retry: RetryConfig,
  /// Root of the per-task scratch directories.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub scratch_root: Option<PathBuf>,
  /// Keep scratch directories after their results were collected.
  pub keep_scratch: bool,
  pub simulator: SimulatorDef,
  /// Empty means one local worker with `max_concurrency` slots.
  pub workers: Vec<WorkerDef>,
  /// Extra time a remote worker gets on top of the task timeout before the
  /// connection is abandoned.
  pub remote_grace_ms: u64,
}

impl Default for RunnerConfig {
  fn default() -> Self {
    Self {
      max_concurrency: 4,
      timeout_ms: 600_000,
      retry: RetryConfig::default(),
      scratch_root: None,
      keep_scratch: false,
      simulator: SimulatorDef::default(),
      workers: Vec::new(),
      remote_grace_ms: 30_000,
    }
  }
}

/// Retry bounds per failure class. Missing output is never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
  pub timeout_retries: u32,
  pub crash_retries: u32,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      timeout_retries: 2,
      crash_retries: 1,
    }
  }
}

/// How to invoke the simulator executable.
///
/// `args` may use the placeholders `{netlist}`, `{raw}`, `{log}` and
/// `{scratch}`. Output files are named after the netlist with the configured
/// extensions, inside the scratch directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorDef {
  pub executable: PathBuf,
  pub args: Vec<String>,
  pub raw_extension: String,
  pub log_extension: String,
}

impl Default for SimulatorDef {
  fn default() -> Self {
    Self {
      executable: PathBuf::from("ngspice"),
      args: ["-b", "-o", "{log}", "-r", "{raw}", "{netlist}"]
        .into_iter()
        .map(String::from)
        .collect(),
      raw_extension: "raw".to_string(),
      log_extension: "log".to_string(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerDef {
  Local {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    slots: usize,
  },
  Remote {
    address: String,
    slots: usize,
  },
}
