use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use simsweep_collector::{CollectReport, ResultCollector, ResultSet};
use simsweep_config::RunnerConfig;
use simsweep_dispatch::{
  Completion, DispatchNotifier, DispatchSummary, Dispatcher, DispatcherConfig, NoopNotifier,
};
use simsweep_queue::TaskQueue;
use simsweep_worker::Worker;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::campaign::Campaign;
use crate::error::EngineError;
use crate::workers::build_workers;

/// Everything a finished campaign produced.
#[derive(Debug, Clone)]
pub struct CampaignReport {
  pub campaign: String,
  pub summary: DispatchSummary,
  pub results: ResultSet,
  pub collect: CollectReport,
  pub elapsed: Duration,
}

impl CampaignReport {
  /// Every expected coordinate has a result.
  pub fn is_complete(&self) -> bool {
    self.collect.is_complete()
  }
}

/// Runs campaigns on a fixed worker pool.
pub struct CampaignRunner<N: DispatchNotifier = NoopNotifier> {
  dispatcher: Dispatcher<N>,
  config: RunnerConfig,
}

impl CampaignRunner<NoopNotifier> {
  /// Workers come from `config`; local scratch lives under `scratch_root`.
  pub fn new(config: RunnerConfig, scratch_root: &Path) -> Result<Self, EngineError> {
    let workers = build_workers(&config, scratch_root);
    Self::with_workers(config, workers, NoopNotifier)
  }
}

impl<N: DispatchNotifier> CampaignRunner<N> {
  pub fn with_workers(
    config: RunnerConfig,
    workers: Vec<Arc<dyn Worker>>,
    notifier: N,
  ) -> Result<Self, EngineError> {
    let dispatcher =
      Dispatcher::with_notifier(DispatcherConfig::from_runner(&config), workers, notifier)?;
    Ok(Self { dispatcher, config })
  }

  /// Run every task of `campaign` and collect the results.
  ///
  /// Firing `cancel` cancels the queue: pending tasks never start and
  /// running attempts are killed. The report is still produced from what
  /// was collected up to that point.
  #[instrument(
    name = "campaign",
    skip_all,
    fields(campaign = %campaign.name, tasks = campaign.sweep.len())
  )]
  pub async fn run(
    &self,
    campaign: &Campaign,
    cancel: CancellationToken,
  ) -> Result<CampaignReport, EngineError> {
    let started = Instant::now();
    let queue = Arc::new(TaskQueue::new());
    for task in campaign.tasks() {
      queue.submit(task);
    }
    info!(
      expected_runs = campaign.expected_runs(),
      concurrency = self.dispatcher.concurrency(),
      "campaign_started"
    );

    let finished = CancellationToken::new();
    let watcher = {
      let queue = queue.clone();
      let finished = finished.clone();
      tokio::spawn(async move {
        tokio::select! {
          _ = cancel.cancelled() => {
            let cancelled = queue.cancel_all();
            warn!(pending_cancelled = cancelled, "campaign_cancel_requested");
          }
          _ = finished.cancelled() => {}
        }
      })
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let (dispatched, mut collector) = tokio::join!(
      self.dispatcher.run(queue.clone(), tx),
      self.collect(rx)
    );
    finished.cancel();
    let _ = watcher.await;

    let summary = match dispatched {
      Ok(summary) => summary,
      Err(e) => {
        error!(error = %e, "campaign_failed");
        return Err(e.into());
      }
    };

    let finalized = collector.finalize(&queue.snapshot())?;
    let elapsed = started.elapsed();
    info!(
      succeeded = summary.counts.succeeded,
      failed = summary.counts.failed,
      cancelled = summary.counts.cancelled,
      results = finalized.results.len(),
      missing = finalized.report.missing.len(),
      elapsed_ms = elapsed.as_millis() as u64,
      "campaign_completed"
    );

    Ok(CampaignReport {
      campaign: campaign.name.clone(),
      summary,
      results: finalized.results,
      collect: finalized.report,
      elapsed,
    })
  }

  async fn collect(&self, mut rx: mpsc::UnboundedReceiver<Completion>) -> ResultCollector {
    let mut collector = ResultCollector::new();
    while let Some(Completion { task, output }) = rx.recv().await {
      match collector.collect(&task, &output).await {
        Ok(runs) => {
          debug!(task_id = %task.id, runs, "task_collected");
          if let Some(dir) = output.scratch_dir.filter(|_| !self.config.keep_scratch) {
            remove_scratch(dir).await;
          }
        }
        // Recorded by the collector; scratch stays for inspection.
        Err(e) => warn!(task_id = %task.id, error = %e, "task_collect_failed"),
      }
    }
    collector
  }
}

/// Remove an attempt's scratch directory, then its task directory if no
/// other attempt is left in it.
async fn remove_scratch(dir: PathBuf) {
  if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
    warn!(path = %dir.display(), error = %e, "scratch_cleanup_failed");
    return;
  }
  if let Some(parent) = dir.parent() {
    let _ = tokio::fs::remove_dir(parent).await;
  }
}
