use simsweep_queue::QueueError;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
  #[error("no workers configured")]
  NoWorkers,

  #[error("concurrency limit is zero: {message}")]
  ZeroConcurrency { message: String },

  #[error("queue rejected a transition: {0}")]
  Queue(#[from] QueueError),
}
