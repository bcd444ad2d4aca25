//! In-memory trace table for one simulation run.

use serde::{Deserialize, Serialize};

use crate::error::RawError;
use crate::header::RawHeader;
use crate::samples::Samples;
use crate::step::StepCoordinate;

/// One named signal of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
  name: String,
  unit: String,
  samples: Samples,
}

impl Trace {
  pub fn new(name: impl Into<String>, unit: impl Into<String>, samples: Samples) -> Self {
    Self {
      name: name.into(),
      unit: unit.into(),
      samples,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Physical unit as declared by the simulator (`time`, `voltage`, ...).
  pub fn unit(&self) -> &str {
    &self.unit
  }

  pub fn samples(&self) -> &Samples {
    &self.samples
  }

  pub fn len(&self) -> usize {
    self.samples.len()
  }

  pub fn is_empty(&self) -> bool {
    self.samples.is_empty()
  }
}

/// A decoded run: header, traces and optional step coordinate.
///
/// The first trace is the independent axis. Construction goes through
/// [`RawRun::new`], which checks that the header and traces agree, so a
/// `RawRun` can always be encoded and decoded back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRun {
  header: RawHeader,
  traces: Vec<Trace>,
  step: Option<StepCoordinate>,
  retrograde: Vec<usize>,
}

impl RawRun {
  pub fn new(
    header: RawHeader,
    traces: Vec<Trace>,
    step: Option<StepCoordinate>,
  ) -> Result<Self, RawError> {
    header.validate()?;

    let Some(axis) = traces.first() else {
      return Err(RawError::format("a run needs at least one trace"));
    };
    let num_points = axis.len();

    for (i, trace) in traces.iter().enumerate() {
      check_name(trace.name())?;
      check_name(trace.unit())?;
      if trace.len() != num_points {
        return Err(RawError::format(format!(
          "trace '{}' has {} points, axis has {num_points}",
          trace.name(),
          trace.len()
        )));
      }
      let expected = header.sample_kind(i);
      if trace.samples().kind() != expected {
        return Err(RawError::format(format!(
          "trace '{}' stores {:?} samples but the header requires {expected:?}",
          trace.name(),
          trace.samples().kind()
        )));
      }
    }

    if let Some(step) = &step {
      check_step(step)?;
    }

    let retrograde = retrograde_points(axis);
    Ok(Self {
      header,
      traces,
      step,
      retrograde,
    })
  }

  pub fn header(&self) -> &RawHeader {
    &self.header
  }

  pub fn traces(&self) -> &[Trace] {
    &self.traces
  }

  /// Look up a trace by name, ignoring ASCII case.
  pub fn trace(&self, name: &str) -> Option<&Trace> {
    self
      .traces
      .iter()
      .find(|t| t.name().eq_ignore_ascii_case(name))
  }

  /// The independent axis (time, frequency, swept source).
  pub fn axis(&self) -> &Trace {
    &self.traces[0]
  }

  pub fn num_points(&self) -> usize {
    self.traces[0].len()
  }

  pub fn num_variables(&self) -> usize {
    self.traces.len()
  }

  pub fn step(&self) -> Option<&StepCoordinate> {
    self.step.as_ref()
  }

  pub fn set_step(&mut self, step: StepCoordinate) -> Result<(), RawError> {
    check_step(&step)?;
    self.step = Some(step);
    Ok(())
  }

  /// Indices `i` where the axis value is smaller than at `i - 1`.
  ///
  /// Retrograde points are kept as the simulator wrote them; callers decide
  /// whether to drop them.
  pub fn retrograde_points(&self) -> &[usize] {
    &self.retrograde
  }

  pub fn has_retrograde_axis(&self) -> bool {
    !self.retrograde.is_empty()
  }

  pub fn into_traces(self) -> Vec<Trace> {
    self.traces
  }
}

fn check_name(text: &str) -> Result<(), RawError> {
  if text.is_empty() || text.trim() != text || text.contains(['\t', '\n', '\r']) {
    return Err(RawError::format(format!(
      "invalid variable name or unit '{text}'"
    )));
  }
  Ok(())
}

fn check_step(step: &StepCoordinate) -> Result<(), RawError> {
  if !step.is_representable() {
    return Err(RawError::format(format!(
      "step coordinate '{step}' cannot be written to a header"
    )));
  }
  Ok(())
}

fn retrograde_points(axis: &Trace) -> Vec<usize> {
  let values = axis.samples().real_values();
  values
    .windows(2)
    .enumerate()
    .filter(|(_, pair)| pair[1] < pair[0])
    .map(|(i, _)| i + 1)
    .collect()
}
