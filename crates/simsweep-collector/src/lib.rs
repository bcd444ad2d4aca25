//! Simsweep Collector
//!
//! Turns successful attempts into a [`ResultSet`] keyed by full campaign
//! coordinate (task coordinate followed by the netlist's own `.step`
//! coordinate).
//!
//! ```text
//! RunOutput ─▶ decode_all ─▶ StepIndex (task's inner sweep) ─┐
//!     └─ log ─▶ MeasurementLog::align ───────────────────────┴─▶ ResultSet
//! ```
//!
//! Decoding is all or nothing per output: a file that fails to decode, or
//! whose run count disagrees with the task's sweep, contributes nothing.

mod collector;
mod error;
mod results;
mod text;

pub use collector::{CollectReport, Finalized, ResultCollector};
pub use error::CollectError;
pub use results::{MeasureStats, ResultEntry, ResultSet};
