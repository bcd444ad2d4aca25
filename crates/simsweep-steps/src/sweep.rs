use std::collections::HashSet;

use simsweep_raw::{StepCoordinate, StepValue};

use crate::error::StepError;
use crate::ranges::MAX_POINTS;

/// A fully enumerated sweep: parameter names plus one value tuple per run.
#[derive(Debug, Clone, PartialEq)]
pub struct Sweep {
  parameters: Vec<String>,
  points: Vec<Vec<StepValue>>,
}

impl Sweep {
  /// A hand-specified list of tuples, used in the given order.
  pub fn from_points(
    parameters: Vec<String>,
    points: Vec<Vec<StepValue>>,
  ) -> Result<Self, StepError> {
    check_unique(&parameters)?;
    if let Some((k, tuple)) = points
      .iter()
      .enumerate()
      .find(|(_, tuple)| tuple.len() != parameters.len())
    {
      return Err(StepError::invalid(format!(
        "point {k} has {} values for {} parameters",
        tuple.len(),
        parameters.len()
      )));
    }
    Ok(Self { parameters, points })
  }

  /// Cartesian product of the axes in row-major order: the first axis varies
  /// slowest and the last axis fastest.
  pub fn cartesian(axes: Vec<(String, Vec<StepValue>)>) -> Result<Self, StepError> {
    let parameters: Vec<String> = axes.iter().map(|(name, _)| name.clone()).collect();
    check_unique(&parameters)?;
    if let Some((name, _)) = axes.iter().find(|(_, values)| values.is_empty()) {
      return Err(StepError::invalid(format!("axis '{name}' has no values")));
    }

    let total = axes
      .iter()
      .try_fold(1usize, |total, (_, values)| total.checked_mul(values.len()))
      .filter(|total| *total <= MAX_POINTS)
      .ok_or_else(|| StepError::invalid(format!("sweep has more than {MAX_POINTS} points")))?;
    let mut points = Vec::with_capacity(total);
    for k in 0..total {
      let mut tuple = Vec::with_capacity(axes.len());
      let mut stride = total;
      for (_, values) in &axes {
        stride /= values.len();
        tuple.push(values[(k / stride) % values.len()].clone());
      }
      points.push(tuple);
    }

    Ok(Self { parameters, points })
  }

  /// One run with an empty coordinate: a simulation without steps.
  pub fn single() -> Self {
    Self {
      parameters: Vec::new(),
      points: vec![Vec::new()],
    }
  }

  pub fn parameters(&self) -> &[String] {
    &self.parameters
  }

  /// Number of runs the sweep enumerates.
  pub fn len(&self) -> usize {
    self.points.len()
  }

  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }

  pub fn coordinate(&self, k: usize) -> Option<StepCoordinate> {
    self.points.get(k).map(|tuple| {
      self
        .parameters
        .iter()
        .zip(tuple)
        .fold(StepCoordinate::new(), |c, (name, value)| {
          c.with(name.clone(), value.clone())
        })
    })
  }

  pub fn coordinates(&self) -> impl Iterator<Item = StepCoordinate> + '_ {
    (0..self.len()).filter_map(|k| self.coordinate(k))
  }
}

fn check_unique(parameters: &[String]) -> Result<(), StepError> {
  let mut seen = HashSet::new();
  for name in parameters {
    if name.is_empty() {
      return Err(StepError::invalid("parameter names cannot be empty"));
    }
    if !seen.insert(name.as_str()) {
      return Err(StepError::invalid(format!(
        "parameter '{name}' is declared twice"
      )));
    }
  }
  Ok(())
}
