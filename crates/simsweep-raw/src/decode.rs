//! Binary payload decoding.

use std::io::{BufRead, Read};

use tracing::{debug, warn};

use crate::error::RawError;
use crate::header::{Layout, SegmentHeader, read_header};
use crate::run::{RawRun, Trace};
use crate::samples::Samples;

/// Decode a buffer holding exactly one run.
///
/// Trailing bytes after the declared payload are a format error: the header
/// and the payload disagree about the run size. A single-header stepped
/// segment is returned as written; use [`decode_all`] to split it.
pub fn decode(bytes: &[u8]) -> Result<RawRun, RawError> {
  let mut cursor = bytes;
  let run = read_segment(&mut cursor)?.ok_or_else(|| RawError::format("empty input"))?;
  if !cursor.is_empty() {
    return Err(RawError::format(format!(
      "declared sizes disagree with payload length: {} trailing bytes",
      cursor.len()
    )));
  }
  flag_retrograde(&run);
  Ok(run)
}

/// Decode every run of a (possibly stepped) buffer, in file order.
///
/// Segments are split into runs by [`split_steps`].
pub fn decode_all(bytes: &[u8]) -> Result<Vec<RawRun>, RawError> {
  let mut cursor = bytes;
  let mut runs = Vec::new();
  while let Some(segment) = read_segment(&mut cursor)? {
    for run in split_steps(segment)? {
      flag_retrograde(&run);
      runs.push(run);
    }
  }
  if runs.is_empty() {
    return Err(RawError::format("empty input"));
  }
  Ok(runs)
}

/// Split a stepped segment written under a single header into its runs.
///
/// A new run starts wherever the axis returns to its first value. Segments
/// that are not flagged `stepped`, or that carry their own `Step:` line, are
/// a single run already and come back unchanged.
pub fn split_steps(segment: RawRun) -> Result<Vec<RawRun>, RawError> {
  if !segment.header().stepped || segment.step().is_some() {
    return Ok(vec![segment]);
  }

  let axis = segment.axis().samples();
  let Some(first) = axis.get(0).map(|s| s.re()) else {
    return Ok(vec![segment]);
  };
  let starts: Vec<usize> = std::iter::once(0)
    .chain((1..axis.len()).filter(|&i| axis.get(i).map(|s| s.re()) == Some(first)))
    .collect();
  if starts.len() == 1 {
    return Ok(vec![segment]);
  }
  debug!(
    plotname = %segment.header().plotname,
    runs = starts.len(),
    points = segment.num_points(),
    "stepped_segment_split"
  );

  let header = segment.header().clone();
  let points = segment.num_points();
  let traces = segment.into_traces();
  starts
    .iter()
    .enumerate()
    .map(|(k, &start)| {
      let end = starts.get(k + 1).copied().unwrap_or(points);
      let pieces = traces
        .iter()
        .map(|t| Trace::new(t.name(), t.unit(), t.samples().slice(start..end)))
        .collect();
      RawRun::new(header.clone(), pieces, None)
    })
    .collect()
}

pub(crate) fn flag_retrograde(run: &RawRun) {
  if let Some(first) = run.retrograde_points().first() {
    warn!(
      plotname = %run.header().plotname,
      retrograde_points = run.retrograde_points().len(),
      first = *first,
      "retrograde_axis"
    );
  }
}

/// Read the next segment from `reader` as written, or `None` at end of input.
pub(crate) fn read_segment<R: BufRead>(reader: &mut R) -> Result<Option<RawRun>, RawError> {
  let Some(segment) = read_header(reader)? else {
    return Ok(None);
  };

  let expected = segment.payload_len()?;
  let mut payload = Vec::new();
  reader
    .by_ref()
    .take(expected as u64)
    .read_to_end(&mut payload)?;
  if payload.len() != expected {
    return Err(RawError::format(format!(
      "payload truncated: header declares {expected} bytes, found {}",
      payload.len()
    )));
  }

  let traces = decode_payload(&segment, &payload);
  RawRun::new(segment.header, traces, segment.step).map(Some)
}

fn decode_payload(segment: &SegmentHeader, payload: &[u8]) -> Vec<Trace> {
  let header = &segment.header;
  let num_points = segment.num_points;
  let order = header.byte_order;

  let kinds: Vec<_> = (0..segment.variables.len())
    .map(|i| header.sample_kind(i))
    .collect();
  let mut columns: Vec<Samples> = kinds
    .iter()
    .map(|kind| Samples::with_capacity(*kind, num_points))
    .collect();

  let mut offset = 0;
  match header.layout {
    Layout::Interleaved => {
      for _ in 0..num_points {
        for (column, kind) in columns.iter_mut().zip(&kinds) {
          let width = kind.width();
          column.push_bytes(&payload[offset..offset + width], order);
          offset += width;
        }
      }
    }
    Layout::Block => {
      for (column, kind) in columns.iter_mut().zip(&kinds) {
        let width = kind.width();
        for _ in 0..num_points {
          column.push_bytes(&payload[offset..offset + width], order);
          offset += width;
        }
      }
    }
  }

  segment
    .variables
    .iter()
    .zip(columns)
    .map(|(variable, samples)| Trace::new(variable.name.clone(), variable.unit.clone(), samples))
    .collect()
}
