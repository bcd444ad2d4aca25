//! Simsweep Engine
//!
//! Runs a sweep campaign end to end:
//!
//! ```text
//! CampaignDef ─▶ Campaign ─▶ Tasks ─▶ TaskQueue ─▶ Dispatcher ─▶ Workers
//!                                                      │
//!                                          Completion channel
//!                                                      ▼
//!                               CampaignReport ◀─ ResultCollector
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let campaign = Campaign::from_def(def, Some(campaign_dir))?;
//! let runner = CampaignRunner::new(config, scratch_root)?;
//! let report = runner.run(&campaign, CancellationToken::new()).await?;
//! report.results.write_tsv(&mut std::io::stdout())?;
//! ```

mod campaign;
mod error;
mod runner;
mod workers;

pub use campaign::{Campaign, sweep_from_def};
pub use error::EngineError;
pub use runner::{CampaignReport, CampaignRunner};
pub use workers::{build_workers, local_server};
