use simsweep_collector::CollectError;
use simsweep_dispatch::DispatchError;
use simsweep_steps::StepError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  #[error("invalid campaign: {message}")]
  InvalidCampaign { message: String },

  #[error("invalid sweep: {0}")]
  Sweep(#[from] StepError),

  #[error("dispatch failed: {0}")]
  Dispatch(#[from] DispatchError),

  #[error("collection failed: {0}")]
  Collect(#[from] CollectError),
}
