//! Simsweep Queue
//!
//! The ordered collection of simulation tasks of a campaign.
//!
//! Tasks move forward through their lifecycle only:
//!
//! ```text
//! Pending ──next()──▶ Running ──complete()──▶ Succeeded | Failed | Cancelled
//!    ▲                   │
//!    └──── Retry ────────┘   (re-queued at the back)
//! ```
//!
//! The queue is shared between the dispatcher and its workers. Every operation
//! is a short critical section and never waits on a simulation.

mod error;
mod queue;
mod task;

pub use error::QueueError;
pub use queue::{QueueCounts, TaskOutcome, TaskQueue};
pub use task::{Task, TaskId, TaskStatus};
