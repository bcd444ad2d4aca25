//! Positional assignment of decoded runs to sweep coordinates.

use std::collections::HashMap;

use simsweep_raw::{RawError, RawRun, StepCoordinate};
use tracing::{debug, warn};

use crate::error::StepError;
use crate::sweep::Sweep;

/// Runs keyed by the sweep coordinate that produced them.
#[derive(Debug, Clone)]
pub struct StepIndex {
  entries: Vec<(StepCoordinate, RawRun)>,
  lookup: HashMap<StepCoordinate, usize>,
}

impl StepIndex {
  /// Assign the k-th run to the k-th coordinate of `sweep`.
  ///
  /// The number of runs must equal the number of coordinates.
  pub fn build<I>(runs: I, sweep: &Sweep) -> Result<Self, StepError>
  where
    I: IntoIterator<Item = RawRun>,
  {
    Self::try_build(runs.into_iter().map(Ok), sweep)
  }

  /// Like [`build`](Self::build) for a fallible source such as
  /// `RawRunReader::runs`. The first read error aborts the whole index.
  pub fn try_build<I>(runs: I, sweep: &Sweep) -> Result<Self, StepError>
  where
    I: IntoIterator<Item = Result<RawRun, RawError>>,
  {
    let mut entries = Vec::with_capacity(sweep.len());
    let mut actual = 0;

    for run in runs {
      let mut run = run?;
      let Some(coordinate) = sweep.coordinate(actual) else {
        // keep counting so the error reports the real run count
        actual += 1;
        continue;
      };
      actual += 1;

      if let Some(embedded) = run.step() {
        if !embedded.is_empty() && embedded != &coordinate {
          warn!(
            assigned = %coordinate,
            embedded = %embedded,
            "step_metadata_mismatch"
          );
        }
      }
      if let Err(e) = run.set_step(coordinate.clone()) {
        debug!(coordinate = %coordinate, error = %e, "step_coordinate_not_stored");
      }
      entries.push((coordinate, run));
    }

    if actual != sweep.len() {
      return Err(StepError::StepCountMismatch {
        context: "decoded runs".to_string(),
        expected: sweep.len(),
        actual,
      });
    }

    let lookup = entries
      .iter()
      .enumerate()
      .map(|(i, (coordinate, _))| (coordinate.clone(), i))
      .collect();
    Ok(Self { entries, lookup })
  }

  pub fn get(&self, coordinate: &StepCoordinate) -> Option<&RawRun> {
    self.lookup.get(coordinate).map(|&i| &self.entries[i].1)
  }

  /// Entries in sweep order.
  pub fn iter(&self) -> impl Iterator<Item = (&StepCoordinate, &RawRun)> {
    self.entries.iter().map(|(c, r)| (c, r))
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn into_entries(self) -> Vec<(StepCoordinate, RawRun)> {
    self.entries
  }
}
