//! Lazy, restartable traversal of stepped raw files.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::decode::{flag_retrograde, read_segment, split_steps};
use crate::error::RawError;
use crate::run::RawRun;

/// Reads the runs of a raw file one at a time.
///
/// Only the segment being split is held in memory: one run for files with a
/// header per run, the whole segment for single-header stepped files. Every
/// call to
/// [`runs`](Self::runs) starts again from the offset the reader was created
/// at, so a file can be traversed any number of times. Runs come out exactly
/// as [`decode_all`](crate::decode_all) returns them.
///
/// ```ignore
/// let mut reader = RawRunReader::open("sweep.raw")?;
/// for run in reader.runs() {
///   let run = run?;
///   println!("{}", run.num_points());
/// }
/// ```
pub struct RawRunReader<R> {
  source: BufReader<R>,
  start: u64,
}

impl RawRunReader<File> {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, RawError> {
    Self::new(File::open(path)?)
  }
}

impl<R: Read + Seek> RawRunReader<R> {
  pub fn new(mut source: R) -> Result<Self, RawError> {
    let start = source.stream_position()?;
    Ok(Self {
      source: BufReader::new(source),
      start,
    })
  }

  /// A fresh traversal from the first run.
  pub fn runs(&mut self) -> RawRuns<'_, R> {
    RawRuns {
      reader: self,
      pending: VecDeque::new(),
      started: false,
      done: false,
    }
  }

  /// Number of runs in the file. Decodes each run to validate it.
  pub fn count_runs(&mut self) -> Result<usize, RawError> {
    let mut count = 0;
    for run in self.runs() {
      run?;
      count += 1;
    }
    Ok(count)
  }

  pub fn into_inner(self) -> R {
    self.source.into_inner()
  }
}

/// Iterator returned by [`RawRunReader::runs`].
///
/// Stops after the first error.
pub struct RawRuns<'a, R> {
  reader: &'a mut RawRunReader<R>,
  pending: VecDeque<RawRun>,
  started: bool,
  done: bool,
}

impl<R: Read + Seek> Iterator for RawRuns<'_, R> {
  type Item = Result<RawRun, RawError>;

  fn next(&mut self) -> Option<Self::Item> {
    if let Some(run) = self.pending.pop_front() {
      return Some(Ok(run));
    }
    if self.done {
      return None;
    }

    if !self.started {
      self.started = true;
      if let Err(e) = self.reader.source.seek(SeekFrom::Start(self.reader.start)) {
        self.done = true;
        return Some(Err(e.into()));
      }
    }

    let split = read_segment(&mut self.reader.source)
      .and_then(|segment| segment.map(split_steps).transpose());
    match split {
      Ok(Some(runs)) => {
        for run in &runs {
          flag_retrograde(run);
        }
        self.pending.extend(runs);
        self.pending.pop_front().map(Ok)
      }
      Ok(None) => {
        self.done = true;
        None
      }
      Err(e) => {
        self.done = true;
        Some(Err(e))
      }
    }
  }
}
