//! Collection of worker outputs into a result set.

use bytes::Bytes;
use simsweep_collector::{CollectError, ResultCollector};
use simsweep_queue::{Task, TaskOutcome, TaskQueue, TaskStatus};
use simsweep_raw::{RawHeader, RawRun, Samples, StepCoordinate, StepValue, Trace, encode_all};
use simsweep_steps::{MeasureValue, StepError, Sweep};
use simsweep_worker::{OutputRef, RunOutput, WorkerId};

fn run(level: f32) -> RawRun {
  let mut header = RawHeader::new("Transient Analysis", "test");
  header.stepped = true;
  RawRun::new(
    header,
    vec![
      Trace::new("time", "time", Samples::Real64(vec![0.0, 1.0e-3])),
      Trace::new("V(out)", "voltage", Samples::Real32(vec![0.0, level])),
    ],
    None,
  )
  .unwrap()
}

fn inner_sweep() -> Sweep {
  Sweep::cartesian(vec![(
    "c".to_string(),
    vec![StepValue::from(1.0e-6), StepValue::from(2.0e-6)],
  )])
  .unwrap()
}

fn output(runs: &[RawRun], log: Option<&str>) -> RunOutput {
  RunOutput {
    worker: WorkerId::new("local-0"),
    raw: OutputRef::Inline(Bytes::from(encode_all(runs))),
    log: log.map(|text| OutputRef::Inline(Bytes::from(text.to_string()))),
    scratch_dir: None,
  }
}

/// Submit `tasks` and resolve each with the matching outcome.
fn resolve(tasks: Vec<Task>, outcomes: Vec<TaskOutcome>) -> Vec<Task> {
  let queue = TaskQueue::new();
  for task in tasks {
    queue.submit(task);
  }
  for outcome in outcomes {
    let task = queue.next().unwrap();
    queue.complete(task.id, outcome).unwrap();
  }
  queue.snapshot()
}

const LOG: &str = "\
.step c=1e-06
.step c=2e-06

Measurement: vmax
  step\tMAX(v(out))\tFROM\tTO
     1\t0.5\t0\t0.001
     2\t0.25\t0\t0.001

";

#[tokio::test]
async fn test_collect_prefixes_task_coordinate() {
  let task = Task::new("rc.net", StepCoordinate::new().with("r", 1000.0)).with_steps(inner_sweep());
  let mut collector = ResultCollector::new();

  let inserted = collector
    .collect(&task, &output(&[run(0.5), run(0.25)], Some(LOG)))
    .await
    .unwrap();
  assert_eq!(inserted, 2);

  let results = collector.results();
  assert_eq!(results.parameters(), ["r", "c"]);
  let second = StepCoordinate::new().with("r", 1000.0).with("c", 2.0e-6);
  let entry = results.get(&second).unwrap();
  assert_eq!(entry.task_id, task.id);
  assert_eq!(entry.run.step(), Some(&StepCoordinate::new().with("c", 2.0e-6)));
  assert_eq!(entry.measurements["vmax"], MeasureValue::Real(0.25));
}

#[tokio::test]
async fn test_run_count_mismatch_inserts_nothing() {
  let task = Task::new("rc.net", StepCoordinate::new().with("r", 1.0)).with_steps(inner_sweep());
  let mut collector = ResultCollector::new();

  let err = collector
    .collect(&task, &output(&[run(0.5)], None))
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    CollectError::Steps(StepError::StepCountMismatch {
      expected: 2,
      actual: 1,
      ..
    })
  ));
  assert!(collector.results().is_empty());

  let tasks = resolve(vec![task], vec![TaskOutcome::Succeeded]);
  let finalized = collector.finalize(&tasks).unwrap();
  assert_eq!(finalized.report.present, 0);
  assert_eq!(finalized.report.missing.len(), 2);
  assert_eq!(finalized.report.collect_failures.len(), 1);
}

#[tokio::test]
async fn test_corrupt_output_is_decode_error() {
  let task = Task::new("rc.net", StepCoordinate::new());
  let mut collector = ResultCollector::new();
  let broken = RunOutput {
    raw: OutputRef::Inline(Bytes::from_static(b"Title: nope\n")),
    ..output(&[], None)
  };
  let err = collector.collect(&task, &broken).await.unwrap_err();
  assert!(matches!(err, CollectError::Decode(_)));
}

#[tokio::test]
async fn test_collect_streams_waveform_file() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("rc.raw");
  std::fs::write(&path, encode_all(&[run(0.5), run(0.25)])).unwrap();

  let task = Task::new("rc.net", StepCoordinate::new().with("r", 1.0)).with_steps(inner_sweep());
  let mut collector = ResultCollector::new();
  let from_file = RunOutput {
    raw: OutputRef::Path(path.clone()),
    ..output(&[], None)
  };
  assert_eq!(collector.collect(&task, &from_file).await.unwrap(), 2);
  let second = StepCoordinate::new().with("r", 1.0).with("c", 2.0e-6);
  assert_eq!(
    collector.results().get(&second).unwrap().run.trace("V(out)").unwrap().samples(),
    &Samples::Real32(vec![0.0, 0.25])
  );

  let bytes = std::fs::read(&path).unwrap();
  std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
  let err = collector.collect(&task, &from_file).await.unwrap_err();
  assert!(matches!(err, CollectError::Decode(_)), "{err:?}");
}

#[tokio::test]
async fn test_duplicate_collection_overwrites() {
  let task = Task::new("rc.net", StepCoordinate::new().with("r", 1.0)).with_steps(inner_sweep());
  let mut collector = ResultCollector::new();

  collector
    .collect(&task, &output(&[run(0.5), run(0.25)], None))
    .await
    .unwrap();
  collector
    .collect(&task, &output(&[run(0.7), run(0.35)], None))
    .await
    .unwrap();

  let results = collector.results();
  assert_eq!(results.len(), 2);
  assert_eq!(results.duplicates(), 2);
  let first = results
    .get(&StepCoordinate::new().with("r", 1.0).with("c", 1.0e-6))
    .unwrap();
  assert_eq!(first.run, {
    let mut expected = run(0.7);
    expected
      .set_step(StepCoordinate::new().with("c", 1.0e-6))
      .unwrap();
    expected
  });
}

#[tokio::test]
async fn test_finalize_reports_missing_coordinates() {
  let ok = Task::new("rc.net", StepCoordinate::new().with("r", 1.0)).with_steps(inner_sweep());
  let failed = Task::new("rc.net", StepCoordinate::new().with("r", 2.0)).with_steps(inner_sweep());
  let cancelled = Task::new("rc.net", StepCoordinate::new().with("r", 3.0)).with_steps(inner_sweep());

  let mut collector = ResultCollector::new();
  collector
    .collect(&ok, &output(&[run(0.5), run(0.25)], None))
    .await
    .unwrap();

  let tasks = resolve(
    vec![ok.clone(), failed.clone(), cancelled.clone()],
    vec![
      TaskOutcome::Succeeded,
      TaskOutcome::Failed {
        reason: "crash".to_string(),
      },
      TaskOutcome::Cancelled,
    ],
  );
  let finalized = collector.finalize(&tasks).unwrap();
  let report = &finalized.report;

  assert_eq!(report.expected, 6);
  assert_eq!(report.present, 2);
  assert_eq!(report.missing.len(), 4);
  assert!(!report.is_complete());
  assert_eq!(report.failed_tasks, vec![failed.id]);
  assert_eq!(report.cancelled_tasks, vec![cancelled.id]);
  assert_eq!(
    report.missing[0],
    StepCoordinate::new().with("r", 2.0).with("c", 1.0e-6)
  );
  assert_eq!(finalized.results.len(), 2);
}

#[tokio::test]
async fn test_finalize_requires_terminal_tasks() {
  let queue = TaskQueue::new();
  queue.submit(Task::new("a.net", StepCoordinate::new().with("i", 1)));
  queue.submit(Task::new("b.net", StepCoordinate::new().with("i", 2)));
  queue.next().unwrap();

  let mut collector = ResultCollector::new();
  let err = collector.finalize(&queue.snapshot()).unwrap_err();
  assert!(matches!(err, CollectError::Incomplete { unfinished: 2 }));

  queue.cancel_all();
  let running = queue
    .snapshot()
    .into_iter()
    .find(|task| task.status() == TaskStatus::Running)
    .unwrap();
  queue.complete(running.id, TaskOutcome::Cancelled).unwrap();

  let finalized = collector.finalize(&queue.snapshot()).unwrap();
  assert_eq!(finalized.report.cancelled_tasks.len(), 2);
  assert_eq!(finalized.report.missing.len(), 2);
}

#[tokio::test]
async fn test_sealed_after_finalize() {
  let task = Task::new("rc.net", StepCoordinate::new());
  let mut collector = ResultCollector::new();
  let tasks = resolve(vec![task.clone()], vec![TaskOutcome::Cancelled]);
  collector.finalize(&tasks).unwrap();

  let err = collector
    .collect(&task, &output(&[run(1.0)], None))
    .await
    .unwrap_err();
  assert!(matches!(err, CollectError::Sealed));
  assert!(matches!(
    collector.finalize(&tasks),
    Err(CollectError::Sealed)
  ));
}

#[tokio::test]
async fn test_single_run_log() {
  let task = Task::new("rc.net", StepCoordinate::new().with("corner", "tt"));
  let mut collector = ResultCollector::new();
  let mut header = RawHeader::new("Transient Analysis", "test");
  header.stepped = false;
  let single = RawRun::new(
    header,
    vec![
      Trace::new("time", "time", Samples::Real64(vec![0.0, 1.0])),
      Trace::new("V(out)", "voltage", Samples::Real32(vec![0.0, 1.0])),
    ],
    None,
  )
  .unwrap();

  collector
    .collect(&task, &output(&[single], Some("gain: v(out)/v(in)=12.5 at 1\n")))
    .await
    .unwrap();

  let results = collector.results();
  let entry = results
    .get(&StepCoordinate::new().with("corner", "tt"))
    .unwrap();
  assert_eq!(entry.measurements["gain"], MeasureValue::Real(12.5));
  assert_eq!(results.measurement_stats("gain").unwrap().mean, 12.5);
}
