use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use simsweep_config::SimulatorDef;
use simsweep_queue::TaskId;
use simsweep_raw::StepCoordinate;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// A prepared simulator invocation. The netlist already sits inside the
/// scratch directory.
#[derive(Debug, Clone)]
pub struct Invocation {
  pub task_id: TaskId,
  pub netlist: PathBuf,
  pub scratch_dir: PathBuf,
  pub parameters: StepCoordinate,
  pub flags: Vec<String>,
}

/// Files the simulator is expected to leave behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
  pub raw: PathBuf,
  pub log: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatorExit {
  /// The process ended on its own. `None` when it was killed by a signal.
  Exited { code: Option<i32> },
  /// The timeout expired and the process was killed.
  TimedOut,
  /// Cancellation fired and the process was killed.
  Cancelled,
}

/// The external simulator seen as a black box.
#[async_trait]
pub trait Simulator: Send + Sync {
  fn name(&self) -> &str;

  fn outputs(&self, invocation: &Invocation) -> OutputPaths;

  /// Run to completion, timeout or cancellation. When this returns the
  /// process no longer exists.
  async fn simulate(
    &self,
    invocation: &Invocation,
    timeout: Duration,
    cancel: &CancellationToken,
  ) -> std::io::Result<SimulatorExit>;
}

/// Runs a simulator executable as a child process.
///
/// The task's parameters reach the process two ways: `{param:<name>}`
/// placeholders in the argument template and `SIMSWEEP_PARAM_<NAME>`
/// environment variables.
pub struct ProcessSimulator {
  def: SimulatorDef,
  name: String,
}

impl ProcessSimulator {
  pub fn new(def: SimulatorDef) -> Self {
    let name = def
      .executable
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| def.executable.display().to_string());
    Self { def, name }
  }

  /// Command line arguments for `invocation`: extra flags first, then the
  /// configured template with placeholders substituted.
  pub fn arguments(&self, invocation: &Invocation) -> Vec<String> {
    let outputs = self.outputs(invocation);
    let netlist = invocation.netlist.display().to_string();
    let raw = outputs.raw.display().to_string();
    let log = outputs.log.display().to_string();
    let scratch = invocation.scratch_dir.display().to_string();

    invocation
      .flags
      .iter()
      .cloned()
      .chain(self.def.args.iter().map(|arg| {
        let arg = arg
          .replace("{netlist}", &netlist)
          .replace("{raw}", &raw)
          .replace("{log}", &log)
          .replace("{scratch}", &scratch);
        invocation
          .parameters
          .iter()
          .fold(arg, |arg, (name, value)| {
            arg.replace(&format!("{{param:{name}}}"), &value.to_string())
          })
      }))
      .collect()
  }

  /// Environment variables carrying the task's parameters.
  pub fn environment(invocation: &Invocation) -> Vec<(String, String)> {
    invocation
      .parameters
      .iter()
      .map(|(name, value)| {
        let key: String = name
          .chars()
          .map(|c| {
            if c.is_ascii_alphanumeric() {
              c.to_ascii_uppercase()
            } else {
              '_'
            }
          })
          .collect();
        (format!("SIMSWEEP_PARAM_{key}"), value.to_string())
      })
      .collect()
  }
}

fn output_file(dir: &Path, netlist: &Path, extension: &str) -> PathBuf {
  let stem = netlist
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_else(|| "netlist".to_string());
  dir.join(format!("{stem}.{extension}"))
}

#[async_trait]
impl Simulator for ProcessSimulator {
  fn name(&self) -> &str {
    &self.name
  }

  fn outputs(&self, invocation: &Invocation) -> OutputPaths {
    OutputPaths {
      raw: output_file(
        &invocation.scratch_dir,
        &invocation.netlist,
        &self.def.raw_extension,
      ),
      log: output_file(
        &invocation.scratch_dir,
        &invocation.netlist,
        &self.def.log_extension,
      ),
    }
  }

  #[instrument(
    name = "simulate",
    skip(self, invocation, cancel),
    fields(task_id = %invocation.task_id, simulator = %self.name)
  )]
  async fn simulate(
    &self,
    invocation: &Invocation,
    timeout: Duration,
    cancel: &CancellationToken,
  ) -> std::io::Result<SimulatorExit> {
    let stderr = std::fs::File::create(invocation.scratch_dir.join("stderr.txt"))?;
    let mut child = Command::new(&self.def.executable)
      .args(self.arguments(invocation))
      .envs(Self::environment(invocation))
      .current_dir(&invocation.scratch_dir)
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::from(stderr))
      .kill_on_drop(true)
      .spawn()?;

    debug!(pid = ?child.id(), "simulator_started");

    let exit = tokio::select! {
      status = child.wait() => {
        let code = status?.code();
        debug!(code = ?code, "simulator_exited");
        return Ok(SimulatorExit::Exited { code });
      }
      _ = tokio::time::sleep(timeout) => SimulatorExit::TimedOut,
      _ = cancel.cancelled() => SimulatorExit::Cancelled,
    };

    terminate(&mut child).await?;
    debug!(reason = ?exit, "simulator_killed");
    Ok(exit)
  }
}

/// Kill the child and wait until it has been reaped.
async fn terminate(child: &mut Child) -> std::io::Result<()> {
  if let Err(e) = child.start_kill() {
    // Already exited between the timer firing and the kill.
    debug!(error = %e, "kill_failed");
  }
  child.wait().await?;
  Ok(())
}
