use std::collections::{BTreeSet, HashMap};
use std::io::Write;

use simsweep_queue::TaskId;
use simsweep_raw::{RawRun, StepCoordinate, StepValue};
use simsweep_steps::{MeasureValue, Measurements};
use tracing::warn;

use crate::error::CollectError;

/// One run with its coordinate and logged measurements.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultEntry {
  pub coordinate: StepCoordinate,
  pub task_id: TaskId,
  pub run: RawRun,
  pub measurements: Measurements,
}

/// Summary of the real values of one measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasureStats {
  pub min: f64,
  pub max: f64,
  pub mean: f64,
  pub count: usize,
}

/// Results keyed by full campaign coordinate, in insertion order.
///
/// Every coordinate uses the same parameter names in the same order.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
  entries: Vec<ResultEntry>,
  lookup: HashMap<StepCoordinate, usize>,
  parameters: Option<Vec<String>>,
  duplicates: usize,
}

impl ResultSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Fails when `coordinate` does not use this set's parameter names.
  pub(crate) fn check_arity(&self, coordinate: &StepCoordinate) -> Result<(), CollectError> {
    let Some(expected) = &self.parameters else {
      return Ok(());
    };
    if expected.iter().map(String::as_str).eq(coordinate.names()) {
      return Ok(());
    }
    Err(CollectError::ArityMismatch {
      coordinate: coordinate.to_string(),
      expected: expected.clone(),
      actual: coordinate.names().map(String::from).collect(),
    })
  }

  /// Insert an entry. A second result for the same coordinate replaces the
  /// first one and is counted as a duplicate.
  pub fn insert(&mut self, entry: ResultEntry) -> Result<Option<ResultEntry>, CollectError> {
    self.check_arity(&entry.coordinate)?;
    if self.parameters.is_none() {
      self.parameters = Some(entry.coordinate.names().map(String::from).collect());
    }

    match self.lookup.get(&entry.coordinate) {
      Some(&index) => {
        self.duplicates += 1;
        warn!(
          coordinate = %entry.coordinate,
          previous_task = %self.entries[index].task_id,
          task_id = %entry.task_id,
          "consistency_warning_duplicate_coordinate"
        );
        Ok(Some(std::mem::replace(&mut self.entries[index], entry)))
      }
      None => {
        self.lookup.insert(entry.coordinate.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(None)
      }
    }
  }

  pub fn get(&self, coordinate: &StepCoordinate) -> Option<&ResultEntry> {
    self.lookup.get(coordinate).map(|&i| &self.entries[i])
  }

  pub fn contains(&self, coordinate: &StepCoordinate) -> bool {
    self.lookup.contains_key(coordinate)
  }

  pub fn iter(&self) -> impl Iterator<Item = &ResultEntry> {
    self.entries.iter()
  }

  pub fn coordinates(&self) -> impl Iterator<Item = &StepCoordinate> {
    self.entries.iter().map(|entry| &entry.coordinate)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Parameter names shared by every coordinate, empty before the first
  /// insert.
  pub fn parameters(&self) -> &[String] {
    self.parameters.as_deref().unwrap_or_default()
  }

  /// Number of inserts that replaced an existing coordinate.
  pub fn duplicates(&self) -> usize {
    self.duplicates
  }

  /// Names of all logged measurements, sorted.
  pub fn measurement_names(&self) -> Vec<&str> {
    self
      .entries
      .iter()
      .flat_map(|entry| entry.measurements.keys().map(String::as_str))
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect()
  }

  /// Values of measurement `name` for every entry that logged it.
  pub fn measurement(&self, name: &str) -> Vec<(&StepCoordinate, &MeasureValue)> {
    self
      .entries
      .iter()
      .filter_map(|entry| entry.measurements.get(name).map(|v| (&entry.coordinate, v)))
      .collect()
  }

  /// Entries whose coordinate matches every `(parameter, value)` condition.
  pub fn select(&self, conditions: &[(&str, StepValue)]) -> Vec<&ResultEntry> {
    self
      .entries
      .iter()
      .filter(|entry| {
        conditions
          .iter()
          .all(|(name, value)| entry.coordinate.get(name) == Some(value))
      })
      .collect()
  }

  /// Min, max and mean over the real values of measurement `name`.
  /// Complex and text values are ignored. `None` without real values.
  pub fn measurement_stats(&self, name: &str) -> Option<MeasureStats> {
    let values: Vec<f64> = self
      .measurement(name)
      .into_iter()
      .filter_map(|(_, value)| value.as_f64())
      .collect();
    if values.is_empty() {
      return None;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Some(MeasureStats {
      min,
      max,
      mean,
      count: values.len(),
    })
  }

  /// Tab separated export: a `step` column numbered from 1, one column per
  /// parameter, one per measurement. Missing measurements are empty cells.
  pub fn write_tsv<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
    let measurements = self.measurement_names();

    let header: Vec<&str> = std::iter::once("step")
      .chain(self.parameters().iter().map(String::as_str))
      .chain(measurements.iter().copied())
      .collect();
    writeln!(writer, "{}", header.join("\t"))?;

    for (index, entry) in self.entries.iter().enumerate() {
      write!(writer, "{}", index + 1)?;
      for value in entry.coordinate.values() {
        write!(writer, "\t{value}")?;
      }
      for name in &measurements {
        match entry.measurements.get(*name) {
          Some(value) => write!(writer, "\t{value}")?,
          None => write!(writer, "\t")?,
        }
      }
      writeln!(writer)?;
    }
    Ok(())
  }
}
