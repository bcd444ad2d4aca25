use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use simsweep_config::{RunnerConfig, WorkerDef};
use simsweep_worker::{
  LocalWorker, ProcessSimulator, RemoteWorker, Simulator, Worker, WorkerId, WorkerServer,
};

/// Instantiate the configured workers.
///
/// Without any configured worker the pool is a single local worker with
/// `max_concurrency` slots. All local workers share one process simulator
/// and keep their scratch directories under `scratch_root/<worker>`.
pub fn build_workers(config: &RunnerConfig, scratch_root: &Path) -> Vec<Arc<dyn Worker>> {
  let simulator: Arc<dyn Simulator> = Arc::new(ProcessSimulator::new(config.simulator.clone()));
  build_workers_with(config, scratch_root, simulator)
}

pub(crate) fn build_workers_with(
  config: &RunnerConfig,
  scratch_root: &Path,
  simulator: Arc<dyn Simulator>,
) -> Vec<Arc<dyn Worker>> {
  let local = |name: String, slots: usize| -> Arc<dyn Worker> {
    let root = scratch_root.join(&name);
    Arc::new(LocalWorker::new(WorkerId::new(name), slots, root, simulator.clone()))
  };

  if config.workers.is_empty() {
    return vec![local("local-0".to_string(), config.max_concurrency)];
  }

  let grace = Duration::from_millis(config.remote_grace_ms);
  config
    .workers
    .iter()
    .enumerate()
    .map(|(i, def)| match def {
      WorkerDef::Local { name, slots } => {
        local(name.clone().unwrap_or_else(|| format!("local-{i}")), *slots)
      }
      WorkerDef::Remote { address, slots } => {
        Arc::new(RemoteWorker::new(address.clone(), *slots, grace)) as Arc<dyn Worker>
      }
    })
    .collect()
}

/// The server side of a remote worker: a local worker with
/// `max_concurrency` slots, receiving netlists under `scratch_root/inbox`.
pub fn local_server(config: &RunnerConfig, scratch_root: &Path) -> WorkerServer {
  let simulator: Arc<dyn Simulator> = Arc::new(ProcessSimulator::new(config.simulator.clone()));
  let worker = LocalWorker::new(
    WorkerId::new("server"),
    config.max_concurrency,
    scratch_root.join("runs"),
    simulator,
  );
  WorkerServer::new(Arc::new(worker), scratch_root.join("inbox"))
}
