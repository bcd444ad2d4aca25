use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use simsweep_config::{CampaignDef, RunnerConfig};
use simsweep_engine::{Campaign, CampaignReport, CampaignRunner, local_server};

/// Simsweep - parallel parameter sweeps for SPICE simulators
#[derive(Parser)]
#[command(name = "simsweep")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.simsweep)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Runner configuration file (JSON)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a sweep campaign
  Run {
    /// Path to the campaign file (JSON)
    campaign_file: PathBuf,

    /// Write the collected measurements as TSV
    #[arg(long)]
    export: Option<PathBuf>,
  },

  /// Serve this machine as a remote worker
  Serve {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:9400")]
    bind: String,
  },
}

fn main() -> Result<ExitCode> {
  let cli = Cli::parse();
  init_tracing();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".simsweep"),
  };
  let config = load_config(cli.config.as_deref())?;

  match cli.command {
    Some(Commands::Run {
      campaign_file,
      export,
    }) => run_campaign(campaign_file, export, config, data_dir),
    Some(Commands::Serve { bind }) => {
      serve(bind, config, data_dir)?;
      Ok(ExitCode::SUCCESS)
    }
    None => {
      println!("simsweep - use --help to see available commands");
      Ok(ExitCode::SUCCESS)
    }
  }
}

fn init_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .init();
}

fn load_config(path: Option<&Path>) -> Result<RunnerConfig> {
  let Some(path) = path else {
    return Ok(RunnerConfig::default());
  };
  let content = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read config file: {}", path.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse config file: {}", path.display()))
}

fn scratch_root(config: &RunnerConfig, data_dir: &Path) -> PathBuf {
  config
    .scratch_root
    .clone()
    .unwrap_or_else(|| data_dir.join("scratch"))
}

/// Cancel `token` on the first Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupt_received");
      token.cancel();
    }
  });
}

fn run_campaign(
  campaign_file: PathBuf,
  export: Option<PathBuf>,
  config: RunnerConfig,
  data_dir: PathBuf,
) -> Result<ExitCode> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run_campaign_async(campaign_file, export, config, data_dir).await })
}

async fn run_campaign_async(
  campaign_file: PathBuf,
  export: Option<PathBuf>,
  config: RunnerConfig,
  data_dir: PathBuf,
) -> Result<ExitCode> {
  let content = tokio::fs::read_to_string(&campaign_file)
    .await
    .with_context(|| format!("failed to read campaign file: {}", campaign_file.display()))?;
  let def: CampaignDef = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse campaign file: {}", campaign_file.display()))?;

  let campaign = Campaign::from_def(def, campaign_file.parent()).context("invalid campaign")?;
  info!(
    campaign = %campaign.name,
    tasks = campaign.sweep.len(),
    runs = campaign.expected_runs(),
    "campaign_loaded"
  );

  let scratch = scratch_root(&config, &data_dir);
  let runner =
    CampaignRunner::new(config, &scratch).context("failed to set up the worker pool")?;

  let cancel = CancellationToken::new();
  cancel_on_ctrl_c(cancel.clone());
  let report = runner
    .run(&campaign, cancel)
    .await
    .context("campaign execution failed")?;

  if let Some(path) = export {
    let mut file = std::fs::File::create(&path)
      .with_context(|| format!("failed to create export file: {}", path.display()))?;
    report
      .results
      .write_tsv(&mut file)
      .with_context(|| format!("failed to write export file: {}", path.display()))?;
    info!(path = %path.display(), rows = report.results.len(), "results_exported");
  }

  println!("{}", serde_json::to_string_pretty(&summary_json(&report))?);

  Ok(if report.is_complete() {
    ExitCode::SUCCESS
  } else {
    ExitCode::from(2)
  })
}

fn summary_json(report: &CampaignReport) -> serde_json::Value {
  let counts = &report.summary.counts;
  let workers: Vec<serde_json::Value> = report
    .summary
    .workers
    .iter()
    .map(|load| {
      serde_json::json!({
        "worker": load.worker.to_string(),
        "capacity": load.capacity,
        "attempts": load.attempts,
        "succeeded": load.succeeded,
        "failed_attempts": load.failed_attempts,
        "peak_running": load.peak_running,
      })
    })
    .collect();
  let missing: Vec<String> = report
    .collect
    .missing
    .iter()
    .map(ToString::to_string)
    .collect();
  let retrograde: Vec<String> = report
    .collect
    .retrograde
    .iter()
    .map(ToString::to_string)
    .collect();

  serde_json::json!({
    "campaign": report.campaign,
    "complete": report.is_complete(),
    "tasks": {
      "succeeded": counts.succeeded,
      "failed": counts.failed,
      "cancelled": counts.cancelled,
    },
    "runs": {
      "expected": report.collect.expected,
      "collected": report.results.len(),
      "missing": missing,
      "retrograde": retrograde,
    },
    "workers": workers,
    "elapsed_ms": report.elapsed.as_millis() as u64,
  })
}

fn serve(bind: String, config: RunnerConfig, data_dir: PathBuf) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    let listener = tokio::net::TcpListener::bind(&bind)
      .await
      .with_context(|| format!("failed to bind {bind}"))?;
    let scratch = scratch_root(&config, &data_dir);
    let server = Arc::new(local_server(&config, &scratch));

    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());
    server
      .serve(listener, shutdown)
      .await
      .context("worker server failed")
  })
}
