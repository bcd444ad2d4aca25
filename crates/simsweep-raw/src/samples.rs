//! Typed sample storage.
//!
//! Each trace stores its values in exactly one fixed-width representation.
//! The representation is a closed set so decoding and encoding match on it
//! exhaustively.

use std::ops::Range;

use num_complex::{Complex32, Complex64};
use serde::{Deserialize, Serialize};

use crate::header::ByteOrder;

/// On-disk representation of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleKind {
  Real32,
  Real64,
  Complex32,
  Complex64,
}

impl SampleKind {
  /// Number of payload bytes occupied by one sample.
  pub fn width(self) -> usize {
    match self {
      SampleKind::Real32 => 4,
      SampleKind::Real64 => 8,
      SampleKind::Complex32 => 8,
      SampleKind::Complex64 => 16,
    }
  }

  pub fn is_complex(self) -> bool {
    matches!(self, SampleKind::Complex32 | SampleKind::Complex64)
  }
}

/// A single sample widened to double precision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
  Real(f64),
  Complex(Complex64),
}

impl Sample {
  /// The real part of the sample.
  pub fn re(self) -> f64 {
    match self {
      Sample::Real(v) => v,
      Sample::Complex(c) => c.re,
    }
  }
}

/// The values of one trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Samples {
  Real32(Vec<f32>),
  Real64(Vec<f64>),
  Complex32(Vec<Complex32>),
  Complex64(Vec<Complex64>),
}

impl Samples {
  pub fn with_capacity(kind: SampleKind, capacity: usize) -> Self {
    match kind {
      SampleKind::Real32 => Samples::Real32(Vec::with_capacity(capacity)),
      SampleKind::Real64 => Samples::Real64(Vec::with_capacity(capacity)),
      SampleKind::Complex32 => Samples::Complex32(Vec::with_capacity(capacity)),
      SampleKind::Complex64 => Samples::Complex64(Vec::with_capacity(capacity)),
    }
  }

  pub fn kind(&self) -> SampleKind {
    match self {
      Samples::Real32(_) => SampleKind::Real32,
      Samples::Real64(_) => SampleKind::Real64,
      Samples::Complex32(_) => SampleKind::Complex32,
      Samples::Complex64(_) => SampleKind::Complex64,
    }
  }

  pub fn len(&self) -> usize {
    match self {
      Samples::Real32(v) => v.len(),
      Samples::Real64(v) => v.len(),
      Samples::Complex32(v) => v.len(),
      Samples::Complex64(v) => v.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn get(&self, index: usize) -> Option<Sample> {
    match self {
      Samples::Real32(v) => v.get(index).map(|x| Sample::Real(f64::from(*x))),
      Samples::Real64(v) => v.get(index).map(|x| Sample::Real(*x)),
      Samples::Complex32(v) => v
        .get(index)
        .map(|c| Sample::Complex(Complex64::new(f64::from(c.re), f64::from(c.im)))),
      Samples::Complex64(v) => v.get(index).map(|c| Sample::Complex(*c)),
    }
  }

  /// Real parts of every sample, widened to `f64`.
  pub fn real_values(&self) -> Vec<f64> {
    (0..self.len())
      .filter_map(|i| self.get(i))
      .map(Sample::re)
      .collect()
  }

  /// Copy of the samples in `range`.
  pub(crate) fn slice(&self, range: Range<usize>) -> Samples {
    match self {
      Samples::Real32(v) => Samples::Real32(v[range].to_vec()),
      Samples::Real64(v) => Samples::Real64(v[range].to_vec()),
      Samples::Complex32(v) => Samples::Complex32(v[range].to_vec()),
      Samples::Complex64(v) => Samples::Complex64(v[range].to_vec()),
    }
  }

  /// Append one sample read from `bytes` (exactly `kind().width()` long).
  pub(crate) fn push_bytes(&mut self, bytes: &[u8], order: ByteOrder) {
    match self {
      Samples::Real32(v) => v.push(read_f32(bytes, order)),
      Samples::Real64(v) => v.push(read_f64(bytes, order)),
      Samples::Complex32(v) => {
        v.push(Complex32::new(read_f32(&bytes[..4], order), read_f32(&bytes[4..], order)))
      }
      Samples::Complex64(v) => {
        v.push(Complex64::new(read_f64(&bytes[..8], order), read_f64(&bytes[8..], order)))
      }
    }
  }

  /// Append the bytes of sample `index` to `out`.
  pub(crate) fn write_bytes(&self, index: usize, order: ByteOrder, out: &mut Vec<u8>) {
    match self {
      Samples::Real32(v) => write_f32(v[index], order, out),
      Samples::Real64(v) => write_f64(v[index], order, out),
      Samples::Complex32(v) => {
        write_f32(v[index].re, order, out);
        write_f32(v[index].im, order, out);
      }
      Samples::Complex64(v) => {
        write_f64(v[index].re, order, out);
        write_f64(v[index].im, order, out);
      }
    }
  }
}

fn read_f32(bytes: &[u8], order: ByteOrder) -> f32 {
  let mut raw = [0u8; 4];
  raw.copy_from_slice(&bytes[..4]);
  match order {
    ByteOrder::Little => f32::from_le_bytes(raw),
    ByteOrder::Big => f32::from_be_bytes(raw),
  }
}

fn read_f64(bytes: &[u8], order: ByteOrder) -> f64 {
  let mut raw = [0u8; 8];
  raw.copy_from_slice(&bytes[..8]);
  match order {
    ByteOrder::Little => f64::from_le_bytes(raw),
    ByteOrder::Big => f64::from_be_bytes(raw),
  }
}

fn write_f32(value: f32, order: ByteOrder, out: &mut Vec<u8>) {
  match order {
    ByteOrder::Little => out.extend_from_slice(&value.to_le_bytes()),
    ByteOrder::Big => out.extend_from_slice(&value.to_be_bytes()),
  }
}

fn write_f64(value: f64, order: ByteOrder, out: &mut Vec<u8>) {
  match order {
    ByteOrder::Little => out.extend_from_slice(&value.to_le_bytes()),
    ByteOrder::Big => out.extend_from_slice(&value.to_be_bytes()),
  }
}
