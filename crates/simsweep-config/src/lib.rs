//! Simsweep Config
//!
//! Serializable definitions read from JSON files:
//!
//! - [`CampaignDef`]: what to simulate (netlist, sweep, per-task options)
//! - [`RunnerConfig`]: how to run it (concurrency, timeouts, retries,
//!   simulator invocation, workers)
//!
//! These are plain data. The engine turns them into sweeps, tasks and a
//! dispatcher; nothing here is global.

mod campaign;
mod runner;
mod value;

pub use campaign::{AxisDef, AxisValues, CampaignDef, RangeDef, SweepDef};
pub use runner::{RetryConfig, RunnerConfig, SimulatorDef, WorkerDef};
pub use value::ValueDef;
