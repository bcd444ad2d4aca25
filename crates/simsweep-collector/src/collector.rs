use std::collections::HashSet;

use simsweep_queue::{Task, TaskId, TaskStatus};
use simsweep_raw::{RawRunReader, StepCoordinate, decode_all};
use simsweep_steps::{MeasurementLog, Measurements, StepIndex, Sweep};
use simsweep_worker::{OutputRef, RunOutput};
use tracing::{debug, info, instrument, warn};

use crate::error::CollectError;
use crate::results::{ResultEntry, ResultSet};
use crate::text::decode_log_text;

/// Accounting produced by [`ResultCollector::finalize`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectReport {
  /// Coordinates the campaign's tasks should have produced.
  pub expected: usize,
  /// Expected coordinates present in the result set.
  pub present: usize,
  /// Expected coordinates without a result, in task order.
  pub missing: Vec<StepCoordinate>,
  pub failed_tasks: Vec<TaskId>,
  pub cancelled_tasks: Vec<TaskId>,
  /// Succeeded tasks whose output could not be collected, with the reason.
  pub collect_failures: Vec<(TaskId, String)>,
  /// Inserts that replaced an existing coordinate.
  pub duplicates: usize,
  /// Coordinates whose run has a decreasing axis. The samples are kept as
  /// written; callers decide whether to trust them.
  pub retrograde: Vec<StepCoordinate>,
}

impl CollectReport {
  pub fn is_complete(&self) -> bool {
    self.missing.is_empty()
  }
}

#[derive(Debug, Clone)]
pub struct Finalized {
  pub results: ResultSet,
  pub report: CollectReport,
}

/// Accumulates results from successful attempts.
///
/// Owned by a single consumer of the dispatcher's completion channel.
#[derive(Debug, Default)]
pub struct ResultCollector {
  results: ResultSet,
  failures: Vec<(TaskId, String)>,
  retrograde: Vec<StepCoordinate>,
  sealed: bool,
}

impl ResultCollector {
  pub fn new() -> Self {
    Self::default()
  }

  /// Results collected so far.
  pub fn results(&self) -> &ResultSet {
    &self.results
  }

  /// Decode `output`, assign its runs to the task's coordinates and insert
  /// them. Returns the number of runs inserted.
  ///
  /// Nothing is inserted when any step fails; the failure is remembered for
  /// the final report.
  #[instrument(name = "collect", skip_all, fields(task_id = %task.id))]
  pub async fn collect(&mut self, task: &Task, output: &RunOutput) -> Result<usize, CollectError> {
    if self.sealed {
      return Err(CollectError::Sealed);
    }
    match self.try_collect(task, output).await {
      Ok(inserted) => {
        debug!(runs = inserted, worker = %output.worker, "output_collected");
        Ok(inserted)
      }
      Err(e) => {
        warn!(error = %e, "output_not_collected");
        self.failures.push((task.id, e.to_string()));
        Err(e)
      }
    }
  }

  async fn try_collect(&mut self, task: &Task, output: &RunOutput) -> Result<usize, CollectError> {
    let sweep = task.steps.clone().unwrap_or_else(Sweep::single);
    let index = index_runs(&output.raw, sweep.clone()).await?;

    let mut measurements = match &output.log {
      Some(log) => {
        let bytes = log.read().await.map_err(|source| CollectError::Io {
          message: "cannot read measurement log".to_string(),
          source,
        })?;
        let log = MeasurementLog::parse(&decode_log_text(&bytes));
        log
          .align(&sweep)?
          .into_iter()
          .map(|(_, measurements)| measurements)
          .collect()
      }
      None => Vec::new(),
    };
    measurements.resize(sweep.len(), Measurements::new());

    let entries: Vec<ResultEntry> = index
      .into_entries()
      .into_iter()
      .zip(measurements)
      .map(|((inner, run), measurements)| ResultEntry {
        coordinate: task.coordinate.concat(&inner),
        task_id: task.id,
        run,
        measurements,
      })
      .collect();

    for entry in &entries {
      self.results.check_arity(&entry.coordinate)?;
    }

    let inserted = entries.len();
    for entry in entries {
      if entry.run.has_retrograde_axis() {
        warn!(
          coordinate = %entry.coordinate,
          points = entry.run.retrograde_points().len(),
          "retrograde_axis_collected"
        );
        self.retrograde.push(entry.coordinate.clone());
      }
      self.results.insert(entry)?;
    }
    Ok(inserted)
  }

  /// Seal the result set and account for every expected coordinate.
  ///
  /// `tasks` must all be terminal. Calling this twice, or collecting after
  /// it, returns [`CollectError::Sealed`].
  pub fn finalize(&mut self, tasks: &[Task]) -> Result<Finalized, CollectError> {
    if self.sealed {
      return Err(CollectError::Sealed);
    }
    let unfinished = tasks
      .iter()
      .filter(|task| !task.status().is_terminal())
      .count();
    if unfinished > 0 {
      return Err(CollectError::Incomplete { unfinished });
    }
    self.sealed = true;

    let results = std::mem::take(&mut self.results);
    let mut report = CollectReport {
      duplicates: results.duplicates(),
      collect_failures: std::mem::take(&mut self.failures),
      ..CollectReport::default()
    };

    let mut seen = HashSet::new();
    for task in tasks {
      match task.status() {
        TaskStatus::Failed => report.failed_tasks.push(task.id),
        TaskStatus::Cancelled => report.cancelled_tasks.push(task.id),
        _ => {}
      }
      for coordinate in task.expected_coordinates() {
        if !seen.insert(coordinate.clone()) {
          continue;
        }
        report.expected += 1;
        if results.contains(&coordinate) {
          report.present += 1;
        } else {
          report.missing.push(coordinate);
        }
      }
    }
    let mut flagged = HashSet::new();
    report.retrograde = std::mem::take(&mut self.retrograde)
      .into_iter()
      .filter(|coordinate| results.contains(coordinate) && flagged.insert(coordinate.clone()))
      .collect();

    info!(
      expected = report.expected,
      present = report.present,
      missing = report.missing.len(),
      duplicates = report.duplicates,
      "results_finalized"
    );
    Ok(Finalized { results, report })
  }
}

/// Decode the runs of `raw` and assign them to `sweep`. Files are streamed
/// one run at a time; inline bytes are decoded in place.
async fn index_runs(raw: &OutputRef, sweep: Sweep) -> Result<StepIndex, CollectError> {
  let raw = raw.clone();
  tokio::task::spawn_blocking(move || match raw {
    OutputRef::Path(path) => {
      let mut reader = RawRunReader::open(&path)?;
      StepIndex::try_build(reader.runs(), &sweep).map_err(CollectError::from_steps)
    }
    OutputRef::Inline(bytes) => {
      let runs = decode_all(&bytes)?;
      Ok(StepIndex::build(runs, &sweep)?)
    }
  })
  .await
  .map_err(|e| CollectError::Io {
    message: "decoder task failed".to_string(),
    source: std::io::Error::other(e),
  })?
}
