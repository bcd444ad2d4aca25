//! Binary payload encoding.

use std::io::Write;

use crate::header::{self, Layout};
use crate::run::RawRun;

/// Encode one run: header block followed by its payload.
pub fn encode(run: &RawRun) -> Vec<u8> {
  let variables: Vec<(&str, &str)> = run
    .traces()
    .iter()
    .map(|t| (t.name(), t.unit()))
    .collect();
  let mut out = header::render(run.header(), &variables, run.num_points(), run.step());

  let order = run.header().byte_order;
  let traces = run.traces();
  match run.header().layout {
    Layout::Interleaved => {
      for point in 0..run.num_points() {
        for trace in traces {
          trace.samples().write_bytes(point, order, &mut out);
        }
      }
    }
    Layout::Block => {
      for trace in traces {
        for point in 0..run.num_points() {
          trace.samples().write_bytes(point, order, &mut out);
        }
      }
    }
  }
  out
}

/// Encode several runs back to back as one stepped file.
pub fn encode_all(runs: &[RawRun]) -> Vec<u8> {
  runs.iter().flat_map(encode).collect()
}

pub fn write_run<W: Write>(writer: &mut W, run: &RawRun) -> std::io::Result<()> {
  writer.write_all(&encode(run))
}
