use simsweep_raw::RawError;
use simsweep_steps::StepError;

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
  #[error("{message}: {source}")]
  Io {
    message: String,
    #[source]
    source: std::io::Error,
  },

  #[error("decoding failed: {0}")]
  Decode(#[from] RawError),

  #[error("step assignment failed: {0}")]
  Steps(#[from] StepError),

  #[error("coordinate {coordinate} has parameters {actual:?}, result set has {expected:?}")]
  ArityMismatch {
    coordinate: String,
    expected: Vec<String>,
    actual: Vec<String>,
  },

  #[error("result set has already been finalized")]
  Sealed,

  #[error("{unfinished} task(s) have not reached a terminal state")]
  Incomplete { unfinished: usize },
}

impl CollectError {
  /// Read failures surfacing through step assignment are decode errors.
  pub(crate) fn from_steps(error: StepError) -> Self {
    match error {
      StepError::Raw(e) => CollectError::Decode(e),
      other => CollectError::Steps(other),
    }
  }
}
