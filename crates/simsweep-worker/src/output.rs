use std::path::PathBuf;

use bytes::Bytes;

use crate::WorkerId;

/// Where a piece of simulator output lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputRef {
  /// A file on the local filesystem.
  Path(PathBuf),
  /// Bytes shipped back by a remote worker.
  Inline(Bytes),
}

impl OutputRef {
  pub async fn read(&self) -> std::io::Result<Bytes> {
    match self {
      OutputRef::Path(path) => tokio::fs::read(path).await.map(Bytes::from),
      OutputRef::Inline(bytes) => Ok(bytes.clone()),
    }
  }
}

/// The output of a successful attempt.
#[derive(Debug, Clone)]
pub struct RunOutput {
  pub worker: WorkerId,
  /// Binary waveform file.
  pub raw: OutputRef,
  /// Companion text log with logged measurements, when the simulator wrote one.
  pub log: Option<OutputRef>,
  /// Local scratch directory holding the files, if any.
  pub scratch_dir: Option<PathBuf>,
}
