use serde::{Deserialize, Serialize};

/// Why an attempt produced no usable output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunFailure {
  /// The simulator ran past its timeout and was killed.
  #[error("simulator timed out after {timeout_ms} ms")]
  Timeout { timeout_ms: u64 },

  /// The simulator exited with a non-zero status or could not be launched.
  #[error("simulator crashed (exit code {exit_code:?}): {message}")]
  Crash {
    exit_code: Option<i32>,
    message: String,
  },

  /// The simulator exited cleanly but left no decodable waveform.
  #[error("no decodable output: {message}")]
  OutputMissing { message: String },

  /// The attempt could not be set up (missing netlist, unwritable scratch).
  #[error("attempt rejected: {message}")]
  Rejected { message: String },

  #[error("attempt cancelled")]
  Cancelled,

  /// A remote worker could not be reached or broke the protocol.
  #[error("transport error: {message}")]
  Transport { message: String },
}
