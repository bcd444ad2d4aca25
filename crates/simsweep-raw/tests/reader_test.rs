//! Stepped file traversal from disk.

use std::io::Write;

use simsweep_raw::{
  RawError, RawHeader, RawRun, RawRunReader, Samples, StepCoordinate, Trace, encode, encode_all,
};

fn step_run(r: f64) -> RawRun {
  let mut header = RawHeader::new("Transient Analysis", "ngspice-42");
  header.stepped = true;
  RawRun::new(
    header,
    vec![
      Trace::new("time", "time", Samples::Real64(vec![0.0, 1.0e-3, 2.0e-3])),
      Trace::new("V(out)", "voltage", Samples::Real32(vec![0.0, (1.0 / r) as f32, 1.0])),
    ],
    Some(StepCoordinate::new().with("r", r)),
  )
  .unwrap()
}

#[test]
fn test_reader_splits_runs_from_file() {
  let runs: Vec<RawRun> = [100.0, 1000.0, 10000.0].into_iter().map(step_run).collect();

  let mut file = tempfile::NamedTempFile::new().unwrap();
  file.write_all(&encode_all(&runs)).unwrap();
  file.flush().unwrap();

  let mut reader = RawRunReader::open(file.path()).unwrap();
  assert_eq!(reader.count_runs().unwrap(), 3);

  let steps: Vec<String> = reader
    .runs()
    .map(|run| run.unwrap().step().unwrap().to_string())
    .collect();
  assert_eq!(steps, vec!["r=100", "r=1000", "r=10000"]);
}

#[test]
fn test_reader_stops_after_truncated_segment() {
  let mut bytes = encode(&step_run(1.0));
  let second = encode(&step_run(2.0));
  bytes.extend_from_slice(&second[..second.len() - 3]);

  let mut reader = RawRunReader::new(std::io::Cursor::new(bytes)).unwrap();
  let results: Vec<_> = reader.runs().collect();
  assert_eq!(results.len(), 2);
  assert!(results[0].is_ok());
  assert!(matches!(results[1], Err(RawError::Format { .. })));
}

#[test]
fn test_reader_starts_at_creation_offset() {
  let mut bytes = b"junk".to_vec();
  bytes.extend_from_slice(&encode(&step_run(5.0)));

  let mut cursor = std::io::Cursor::new(bytes);
  cursor.set_position(4);
  let mut reader = RawRunReader::new(cursor).unwrap();
  assert_eq!(reader.count_runs().unwrap(), 1);
  assert_eq!(reader.count_runs().unwrap(), 1);
}

#[test]
fn test_single_header_stepped_file_yields_one_run_per_step() {
  let mut header = RawHeader::new("Transient Analysis", "LTspice XVII");
  header.stepped = true;
  let axis: Vec<f64> = [0.0, 1.0e-3, 2.0e-3].repeat(3);
  let out: Vec<f32> = (0..9).map(|i| i as f32).collect();
  let segment = RawRun::new(
    header,
    vec![
      Trace::new("time", "time", Samples::Real64(axis)),
      Trace::new("V(out)", "voltage", Samples::Real32(out)),
    ],
    None,
  )
  .unwrap();

  let mut file = tempfile::NamedTempFile::new().unwrap();
  file.write_all(&encode(&segment)).unwrap();
  file.flush().unwrap();

  let mut reader = RawRunReader::open(file.path()).unwrap();
  assert_eq!(reader.count_runs().unwrap(), 3);

  let runs: Vec<RawRun> = reader.runs().collect::<Result<_, _>>().unwrap();
  assert_eq!(runs.len(), 3);
  for (k, run) in runs.iter().enumerate() {
    assert_eq!(run.num_points(), 3);
    assert!(run.step().is_none());
    let first = 3.0 * k as f32;
    assert_eq!(
      run.trace("V(out)").unwrap().samples(),
      &Samples::Real32(vec![first, first + 1.0, first + 2.0])
    );
  }
  assert_eq!(runs, simsweep_raw::decode_all(&encode(&segment)).unwrap());
}
