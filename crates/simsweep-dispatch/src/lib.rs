//! Simsweep Dispatch
//!
//! Pulls tasks from a [`TaskQueue`](simsweep_queue::TaskQueue), runs them on
//! a set of workers and resolves every attempt:
//!
//! ```text
//!            next()            run()
//! TaskQueue ───────▶ Dispatcher ─────▶ Worker (local / remote)
//!     ▲                  │
//!     └── complete() ────┤  success ──▶ Completion channel ──▶ collector
//!         (retry/fail)   │
//!                        └─ DispatchEvent ──▶ DispatchNotifier
//! ```
//!
//! At most `max_concurrency` attempts run at once, and never more than a
//! worker's slot count on any single worker. Failed attempts are retried per
//! failure class; see [`RetryPolicy`].
//!
//! # Usage
//!
//! ```ignore
//! let dispatcher = Dispatcher::new(DispatcherConfig::from_runner(&config), workers)?;
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let summary = dispatcher.run(queue.clone(), tx).await?;
//! ```

mod dispatcher;
mod error;
mod events;
mod retry;

pub use dispatcher::{Completion, DispatchSummary, Dispatcher, DispatcherConfig, WorkerLoad};
pub use error::DispatchError;
pub use events::{ChannelNotifier, DispatchEvent, DispatchNotifier, NoopNotifier};
pub use retry::{FailureClass, FailureHistory, RetryPolicy};
