//! Run command implementation.
//!
//! Values every bumped cell of each instrument's grid against the
//! configured valuation service and exports the resulting vega maps.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tabled::Tabled;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use vegamap_engine::{BatchOrchestrator, InstrumentJob, InstrumentOutcome, StrikeSource};
use vegamap_ext_file::{load_strike_list, ExportOptions, VegaMapExporter};
use vegamap_ext_rest::RestValuationClient;
use vegamap_traits::config::EngineConfig;

use crate::cli::OutputFormat;
use crate::commands::load_instruments;
use crate::error::CliError;
use crate::output::{print_header, print_output, print_success, print_warning};

/// Arguments for the run command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Instrument files (JSON term sheets)
    #[arg(required = true)]
    pub instruments: Vec<PathBuf>,

    /// Absolute strikes (CSV); overrides the strike range
    #[arg(short, long)]
    pub strikes: Option<PathBuf>,

    /// Lowest strike as a fraction of spot. Defaults to the outer band.
    #[arg(long)]
    pub lower: Option<f64>,

    /// Highest strike as a fraction of spot. Defaults to the outer band.
    #[arg(long)]
    pub upper: Option<f64>,

    /// Strike spacing as a fraction of spot. Defaults to the coarse step.
    #[arg(long)]
    pub step: Option<f64>,

    /// Valuation service URL
    #[arg(long, env = "VEGAMAP_VALUATION_URL")]
    pub url: Option<String>,

    /// Maximum valuation calls in flight across all instruments
    #[arg(short = 'j', long)]
    pub max_concurrent: Option<usize>,

    /// Output directory for tables, heatmaps and archives
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Skip heatmap images
    #[arg(long)]
    pub no_images: bool,

    /// Do not write any files
    #[arg(long)]
    pub no_export: bool,
}

/// Per-instrument result row.
#[derive(Debug, Serialize, Tabled)]
struct StatusRow {
    #[tabled(rename = "Instrument")]
    instrument: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Baseline")]
    baseline: String,
    #[tabled(rename = "Average Life")]
    average_life: String,
}

impl From<&InstrumentOutcome> for StatusRow {
    fn from(outcome: &InstrumentOutcome) -> Self {
        let run = outcome.run();
        Self {
            instrument: outcome.instrument_id().to_string(),
            status: outcome.status_text(),
            baseline: run
                .map(|r| format!("{:.6}", r.baseline_value()))
                .unwrap_or_default(),
            average_life: run
                .and_then(|r| r.average_life())
                .map(|y| format!("{y:.2}y"))
                .unwrap_or_default(),
        }
    }
}

fn strike_source(args: &RunArgs, config: &EngineConfig) -> Result<StrikeSource> {
    if let Some(path) = &args.strikes {
        return load_strike_list(path).with_context(|| format!("loading strikes from {}", path.display()));
    }
    let policy = &config.strike_policy;
    let lower = args.lower.unwrap_or(policy.outer_lower);
    let upper = args.upper.unwrap_or(policy.outer_upper);
    let step = args.step.unwrap_or(policy.coarse_step);
    if !(lower > 0.0 && upper >= lower && step > 0.0) {
        return Err(CliError::InvalidStrikeRange(format!("{lower}..{upper} step {step}")).into());
    }
    Ok(StrikeSource::Range { lower, upper, step })
}

/// Execute the run command.
pub async fn execute(args: RunArgs, mut config: EngineConfig, format: OutputFormat) -> Result<()> {
    if let Some(url) = &args.url {
        config.valuation_url = url.clone();
    }
    if let Some(n) = args.max_concurrent {
        config.max_concurrent_calls = n;
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.display().to_string();
    }

    let specs = load_instruments(&args.instruments)?;
    let strikes = strike_source(&args, &config)?;

    let client = RestValuationClient::from_config(&config).context("building valuation client")?;
    let orchestrator = BatchOrchestrator::new(config.clone(), Arc::new(client))
        .context("invalid engine configuration")?;

    let cancel = orchestrator.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            cancel.cancel();
        }
    });

    let mut events = orchestrator.subscribe_progress();
    let progress = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => debug!("{}", event.text()),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let jobs = specs
        .into_iter()
        .map(|spec| InstrumentJob::new(spec, strikes.clone()))
        .collect();
    let report = orchestrator.run(jobs).await.context("batch run aborted")?;
    progress.abort();

    print_header("Vega maps");
    let rows: Vec<StatusRow> = report.outcomes().iter().map(StatusRow::from).collect();
    print_output(&rows, format)?;

    for failure in report.failures() {
        print_warning(&format!("{}: {}", failure.instrument_id(), failure.status_text()));
    }

    if args.no_export {
        return Ok(());
    }
    if report.runs().next().is_none() {
        print_warning("No instrument completed; nothing exported");
        return Ok(());
    }

    let exporter = VegaMapExporter::from_config(&config).with_options(ExportOptions {
        images: !args.no_images,
        ..Default::default()
    });
    let artifact = exporter
        .export(report.runs())
        .with_context(|| format!("exporting to {}", exporter.output_dir().display()))?;
    for path in artifact.paths() {
        print_success(&format!("Wrote {}", path.display()));
    }

    Ok(())
}
