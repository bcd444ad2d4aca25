use simsweep_raw::RawError;

/// Errors raised while correlating runs with sweep coordinates.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
  /// The campaign definition and the simulator output disagree on how many
  /// steps were run (for example because the simulator aborted early).
  #[error("step count mismatch in {context}: expected {expected}, found {actual}")]
  StepCountMismatch {
    context: String,
    expected: usize,
    actual: usize,
  },

  #[error("invalid sweep: {message}")]
  InvalidSweep { message: String },

  #[error("failed to read runs: {0}")]
  Raw(#[from] RawError),
}

impl StepError {
  pub(crate) fn invalid(message: impl Into<String>) -> Self {
    Self::InvalidSweep {
      message: message.into(),
    }
  }
}
