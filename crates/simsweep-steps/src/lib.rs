//! Simsweep Steps
//!
//! Correlates decoded runs and logged measurements with the sweep coordinates
//! that produced them.
//!
//! The correlation is positional and this is a contract: the k-th run of a
//! simulator output belongs to the k-th coordinate of the declared [`Sweep`],
//! whose enumeration order is row-major (the first declared parameter varies
//! slowest, like nested `.step` loops).

mod error;
mod index;
mod measure;
pub mod ranges;
mod sweep;

pub use error::StepError;
pub use index::StepIndex;
pub use measure::{MeasureValue, MeasurementLog, Measurements};
pub use sweep::Sweep;
