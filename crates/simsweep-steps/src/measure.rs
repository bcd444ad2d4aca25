//! Measurements logged by the simulator in its companion text log.
//!
//! Two layouts are understood. Stepped simulations print one block per
//! measurement, one row per step:
//!
//! ```text
//! Measurement: vout_max
//!   step  MAX(v(out))  FROM  TO
//!      1  0.998        0     0.001
//!      2  1.021        0     0.001
//! ```
//!
//! Single runs print one line per measurement:
//!
//! ```text
//! vout_max: MAX(v(out))=0.998 FROM 0 TO 0.001
//! ```
//!
//! Lines that are not data (column headings, repeated headings, warnings)
//! are skipped. Single-run lines are only taken from logs without `.step`
//! lines, and never from diagnostics such as `Warning: a=1`.

use std::collections::BTreeMap;
use std::fmt;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use simsweep_raw::StepCoordinate;

use crate::error::StepError;
use crate::sweep::Sweep;

/// Measurement values of one run, by measurement name.
pub type Measurements = BTreeMap<String, MeasureValue>;

/// A logged measurement result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MeasureValue {
  Real(f64),
  Complex(Complex64),
  Text(String),
}

impl MeasureValue {
  /// Numbers first, then `(mag[dB],phase°)` complex values, then text.
  pub fn parse(text: &str) -> Self {
    if let Ok(v) = text.parse::<f64>() {
      return MeasureValue::Real(v);
    }
    match parse_polar(text) {
      Some(c) => MeasureValue::Complex(c),
      None => MeasureValue::Text(text.to_string()),
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      MeasureValue::Real(v) => Some(*v),
      _ => None,
    }
  }
}

impl fmt::Display for MeasureValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      MeasureValue::Real(v) => write!(f, "{v}"),
      MeasureValue::Complex(c) => write!(f, "{c}"),
      MeasureValue::Text(text) => f.write_str(text),
    }
  }
}

/// `(-3.01dB,-45°)` or `(0.707,-45°)`. Magnitudes in dB are voltage ratios.
fn parse_polar(text: &str) -> Option<Complex64> {
  let inner = text.strip_prefix('(')?.strip_suffix(')')?;
  let (magnitude, phase) = inner.split_once(',')?;
  let phase: f64 = phase.trim().strip_suffix('°')?.trim().parse().ok()?;
  let magnitude = magnitude.trim();
  let magnitude = match magnitude.strip_suffix("dB") {
    Some(db) => 10f64.powf(db.trim().parse::<f64>().ok()? / 20.0),
    None => magnitude.parse().ok()?,
  };
  Some(Complex64::from_polar(magnitude, phase.to_radians()))
}

/// Measurements and step lines scraped from a simulator log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementLog {
  measurements: Vec<(String, Vec<MeasureValue>)>,
  steps: Vec<StepCoordinate>,
}

impl MeasurementLog {
  pub fn parse(text: &str) -> Self {
    let mut log = MeasurementLog::default();
    let mut block: Option<String> = None;
    let mut single_run = Vec::new();

    for line in text.lines() {
      let line = line.trim();
      if line.is_empty() {
        block = None;
        continue;
      }

      if let Some(rest) = line.strip_prefix(".step") {
        if let Ok(coordinate) = rest.trim().parse::<StepCoordinate>() {
          log.steps.push(coordinate);
        }
        continue;
      }

      if let Some(name) = line.strip_prefix("Measurement:") {
        let name = name.trim().to_string();
        log.column(&name);
        block = Some(name);
        continue;
      }

      if let Some(name) = &block {
        let mut fields = line.split_whitespace();
        let is_row = fields.next().is_some_and(|f| f.parse::<u64>().is_ok());
        if let (true, Some(value)) = (is_row, fields.next()) {
          log.column(name).push(MeasureValue::parse(value));
        }
        continue;
      }

      if let Some(entry) = single_run_line(line) {
        single_run.push(entry);
      }
    }

    if log.steps.is_empty() {
      for (name, value) in single_run {
        log.column(name).push(MeasureValue::parse(value));
      }
    }
    log
  }

  /// Measurement names in first-seen order.
  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.measurements.iter().map(|(n, _)| n.as_str())
  }

  pub fn values(&self, name: &str) -> Option<&[MeasureValue]> {
    self
      .measurements
      .iter()
      .find(|(n, _)| n == name)
      .map(|(_, v)| v.as_slice())
  }

  /// Coordinates announced by the simulator's own `.step` lines.
  pub fn steps(&self) -> &[StepCoordinate] {
    &self.steps
  }

  pub fn is_empty(&self) -> bool {
    self.measurements.is_empty()
  }

  /// Pair the k-th logged value of every measurement with the k-th
  /// coordinate of `sweep`.
  pub fn align(&self, sweep: &Sweep) -> Result<Vec<(StepCoordinate, Measurements)>, StepError> {
    for (name, values) in &self.measurements {
      if values.len() != sweep.len() {
        return Err(StepError::StepCountMismatch {
          context: format!("measurement '{name}'"),
          expected: sweep.len(),
          actual: values.len(),
        });
      }
    }

    Ok(
      sweep
        .coordinates()
        .enumerate()
        .map(|(k, coordinate)| {
          let measurements = self
            .measurements
            .iter()
            .map(|(name, values)| (name.clone(), values[k].clone()))
            .collect();
          (coordinate, measurements)
        })
        .collect(),
    )
  }

  fn column(&mut self, name: &str) -> &mut Vec<MeasureValue> {
    let position = match self.measurements.iter().position(|(n, _)| n == name) {
      Some(position) => position,
      None => {
        self.measurements.push((name.to_string(), Vec::new()));
        self.measurements.len() - 1
      }
    };
    &mut self.measurements[position].1
  }
}

/// Prefixes the simulator uses for its own messages.
const DIAGNOSTIC_PREFIXES: &[&str] = &["warning", "error", "fatal", "note", "info", "circuit"];

/// `name: expression=value ...` with an identifier name and a space-free
/// expression.
fn single_run_line(line: &str) -> Option<(&str, &str)> {
  let (name, rest) = line.split_once(':')?;
  if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
    return None;
  }
  if DIAGNOSTIC_PREFIXES
    .iter()
    .any(|prefix| name.eq_ignore_ascii_case(prefix))
  {
    return None;
  }
  let (expression, after) = rest.trim_start().split_once('=')?;
  if expression.is_empty() || expression.contains(char::is_whitespace) {
    return None;
  }
  let value = after.split_whitespace().next()?;
  Some((name, value))
}
