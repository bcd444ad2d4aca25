#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use simsweep_queue::TaskId;
use simsweep_raw::{RawHeader, RawRun, Samples, StepCoordinate, Trace, encode};
use simsweep_worker::{Invocation, OutputPaths, RunRequest, Simulator, SimulatorExit};
use tokio_util::sync::CancellationToken;

pub enum Behavior {
  Succeed,
  SucceedWithLog(String),
  Exit(i32),
  /// Exits with `code` after writing `stderr.txt` into the scratch dir.
  ExitWithStderr(i32, String),
  NoOutput,
  Garbage,
  /// Writes a complete header whose payload stops short.
  Truncated,
  Hang,
}

/// Simulator double that writes canned outputs instead of running a process.
pub struct FakeSimulator {
  behavior: Behavior,
  pub invocations: AtomicUsize,
  pub killed: AtomicUsize,
}

impl FakeSimulator {
  pub fn new(behavior: Behavior) -> Self {
    Self {
      behavior,
      invocations: AtomicUsize::new(0),
      killed: AtomicUsize::new(0),
    }
  }

  pub fn invocations(&self) -> usize {
    self.invocations.load(Ordering::SeqCst)
  }

  pub fn killed(&self) -> usize {
    self.killed.load(Ordering::SeqCst)
  }
}

pub fn sample_run() -> RawRun {
  RawRun::new(
    RawHeader::new("Transient Analysis", "fake"),
    vec![
      Trace::new("time", "time", Samples::Real64(vec![0.0, 1.0e-3])),
      Trace::new("V(out)", "voltage", Samples::Real32(vec![0.0, 0.5])),
    ],
    None,
  )
  .unwrap()
}

#[async_trait]
impl Simulator for FakeSimulator {
  fn name(&self) -> &str {
    "fake"
  }

  fn outputs(&self, invocation: &Invocation) -> OutputPaths {
    let stem = invocation.netlist.file_stem().unwrap().to_string_lossy();
    OutputPaths {
      raw: invocation.scratch_dir.join(format!("{stem}.raw")),
      log: invocation.scratch_dir.join(format!("{stem}.log")),
    }
  }

  async fn simulate(
    &self,
    invocation: &Invocation,
    timeout: Duration,
    cancel: &CancellationToken,
  ) -> std::io::Result<SimulatorExit> {
    self.invocations.fetch_add(1, Ordering::SeqCst);
    let outputs = self.outputs(invocation);
    match &self.behavior {
      Behavior::Succeed => {
        std::fs::write(&outputs.raw, encode(&sample_run()))?;
        Ok(SimulatorExit::Exited { code: Some(0) })
      }
      Behavior::SucceedWithLog(log) => {
        std::fs::write(&outputs.raw, encode(&sample_run()))?;
        std::fs::write(&outputs.log, log)?;
        Ok(SimulatorExit::Exited { code: Some(0) })
      }
      Behavior::Exit(code) => Ok(SimulatorExit::Exited { code: Some(*code) }),
      Behavior::ExitWithStderr(code, stderr) => {
        std::fs::write(invocation.scratch_dir.join("stderr.txt"), stderr)?;
        Ok(SimulatorExit::Exited { code: Some(*code) })
      }
      Behavior::NoOutput => Ok(SimulatorExit::Exited { code: Some(0) }),
      Behavior::Garbage => {
        std::fs::write(&outputs.raw, b"this is not a waveform")?;
        Ok(SimulatorExit::Exited { code: Some(0) })
      }
      Behavior::Truncated => {
        let bytes = encode(&sample_run());
        std::fs::write(&outputs.raw, &bytes[..bytes.len() - 5])?;
        Ok(SimulatorExit::Exited { code: Some(0) })
      }
      Behavior::Hang => {
        let exit = tokio::select! {
          _ = tokio::time::sleep(timeout) => SimulatorExit::TimedOut,
          _ = cancel.cancelled() => SimulatorExit::Cancelled,
        };
        self.killed.fetch_add(1, Ordering::SeqCst);
        Ok(exit)
      }
    }
  }
}

pub fn write_netlist(dir: &Path) -> PathBuf {
  let path = dir.join("rc.net");
  std::fs::write(&path, "* rc\nR1 in out 1k\nC1 out 0 1u\n.end\n").unwrap();
  path
}

pub fn request(netlist: PathBuf, timeout: Duration) -> RunRequest {
  RunRequest {
    task_id: TaskId::new(),
    attempt: 1,
    netlist,
    parameters: StepCoordinate::new().with("r", 1000.0),
    flags: Vec::new(),
    timeout,
  }
}
