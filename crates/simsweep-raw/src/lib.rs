//! Simsweep Raw
//!
//! Reader and writer for the simulator's binary waveform ("raw") format.
//!
//! A raw file is a textual header followed by a binary payload:
//!
//! ```text
//! Title: rc filter
//! Plotname: Transient Analysis
//! Flags: real forward
//! No. Variables: 2
//! No. Points: 3
//! Byte Order: little
//! Precision: single
//! Command: ngspice-42
//! Variables:
//!     0   time    time
//!     1   V(out)  voltage
//! Binary:
//! <payload>
//! ```
//!
//! Stepped files are either several such segments back to back or, as
//! LTspice writes them, one segment whose axis restarts at every step. Use
//! [`decode`] for a single run held in memory, [`decode_all`] to split a
//! stepped buffer, or [`RawRunReader`] to walk a large stepped file one run
//! at a time.

mod decode;
mod encode;
mod error;
mod header;
mod reader;
mod run;
mod samples;
mod step;

pub use decode::{decode, decode_all, split_steps};
pub use encode::{encode, encode_all, write_run};
pub use error::RawError;
pub use header::{
  ByteOrder, HeaderEncoding, Layout, Numeric, Precision, RawHeader, SegmentHeader, Variable,
  read_header,
};
pub use reader::{RawRunReader, RawRuns};
pub use run::{RawRun, Trace};
pub use samples::{Sample, SampleKind, Samples};
pub use step::{StepCoordinate, StepValue};
