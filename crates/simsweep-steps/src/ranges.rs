//! Value generators for sweep axes.
//!
//! All generators accept sweeps in either direction. The end point is
//! included when it falls on the grid, with a small relative tolerance for
//! floating point accumulation. No generator produces more than
//! [`MAX_POINTS`] values.

use crate::error::StepError;

const TOLERANCE: f64 = 1e-9;

/// Upper bound on the values of one axis and on the points of one sweep.
pub const MAX_POINTS: usize = 1_000_000;

/// Number of grid points in `0..=span` steps, rejecting oversized sweeps.
fn grid_points(span: f64) -> Result<usize, StepError> {
  let points = (span + TOLERANCE).floor() + 1.0;
  if !points.is_finite() || points > MAX_POINTS as f64 {
    return Err(StepError::invalid(format!(
      "sweep has more than {MAX_POINTS} points"
    )));
  }
  Ok(points as usize)
}

fn check_count(count: u32) -> Result<(), StepError> {
  if count as usize > MAX_POINTS {
    return Err(StepError::invalid(format!(
      "sweep has more than {MAX_POINTS} points"
    )));
  }
  Ok(())
}

/// `start, start + step, ...` up to `stop`.
///
/// The sign of `step` is ignored: the direction is taken from `start` and
/// `stop`, except that a negative step on an increasing range sweeps from
/// `stop` down to `start`.
pub fn linear(start: f64, stop: f64, step: f64) -> Result<Vec<f64>, StepError> {
  if !start.is_finite() || !stop.is_finite() {
    return Err(StepError::invalid("sweep bounds must be finite"));
  }
  if step == 0.0 || !step.is_finite() {
    return Err(StepError::invalid("linear step must be finite and non-zero"));
  }
  let (start, stop, step) = if step < 0.0 && start < stop {
    (stop, start, step)
  } else if step > 0.0 && stop < start {
    (start, stop, -step)
  } else {
    (start, stop, step)
  };

  let points = grid_points((stop - start) / step)?;
  let slack = step.abs() * TOLERANCE;
  let mut values = Vec::with_capacity(points);
  for i in 0..points {
    let value = start + i as f64 * step;
    let inside = if step > 0.0 {
      value <= stop + slack
    } else {
      value >= stop - slack
    };
    if !inside {
      break;
    }
    values.push(value);
  }
  Ok(values)
}

/// `count` evenly spaced values from `start` to `stop`, both included.
pub fn linear_count(start: f64, stop: f64, count: u32) -> Result<Vec<f64>, StepError> {
  check_count(count)?;
  match count {
    0 => Err(StepError::invalid("a sweep needs at least one point")),
    1 => Ok(vec![start]),
    _ => {
      let step = (stop - start) / f64::from(count - 1);
      Ok((0..count).map(|i| start + f64::from(i) * step).collect())
    }
  }
}

/// `start, start * factor, ...` up to `stop`.
///
/// A factor pointing away from `stop` is inverted for decreasing ranges; on
/// an increasing range a factor below one sweeps from `stop` down to `start`.
pub fn geometric(start: f64, stop: f64, factor: f64) -> Result<Vec<f64>, StepError> {
  if !start.is_finite() || !stop.is_finite() {
    return Err(StepError::invalid("sweep bounds must be finite"));
  }
  if start <= 0.0 || stop <= 0.0 {
    return Err(StepError::invalid("geometric bounds must be positive"));
  }
  if factor <= 0.0 || factor == 1.0 || !factor.is_finite() {
    return Err(StepError::invalid("geometric factor must be positive and not 1"));
  }
  let (start, stop, factor) = if start < stop && factor < 1.0 {
    (stop, start, factor)
  } else if stop < start && factor > 1.0 {
    (start, stop, 1.0 / factor)
  } else {
    (start, stop, factor)
  };

  let points = grid_points((stop / start).ln() / factor.ln())?;
  let mut values = Vec::with_capacity(points);
  let mut value = start;
  for _ in 0..points {
    let inside = if factor > 1.0 {
      value <= stop * (1.0 + TOLERANCE)
    } else {
      value >= stop * (1.0 - TOLERANCE)
    };
    if !inside {
      break;
    }
    values.push(value);
    value *= factor;
  }
  Ok(values)
}

/// `count` logarithmically spaced values from `start` to `stop`, both included.
pub fn geometric_count(start: f64, stop: f64, count: u32) -> Result<Vec<f64>, StepError> {
  if start <= 0.0 || stop <= 0.0 {
    return Err(StepError::invalid("geometric bounds must be positive"));
  }
  check_count(count)?;
  match count {
    0 => Err(StepError::invalid("a sweep needs at least one point")),
    1 => Ok(vec![start]),
    _ => {
      let factor = ((stop / start).ln() / f64::from(count - 1)).exp();
      Ok((0..count).map(|i| start * factor.powf(f64::from(i))).collect())
    }
  }
}
