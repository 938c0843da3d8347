//! Summary command implementation.
//!
//! Loads cached surfaces from a directory and reports, per ticker, the
//! grid values nearest a target tenor and strike.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use vegamap_engine::{ResultStore, SummaryIndex, SummaryQuery, SummaryRow};
use vegamap_ext_file::load_surfaces_into;
use vegamap_traits::config::EngineConfig;

use crate::cli::OutputFormat;
use crate::commands::parse_date;
use crate::output::{format_value, print_header, print_output, print_warning};

/// Arguments for the summary command.
#[derive(Args, Debug)]
pub struct SummaryArgs {
    /// Target tenor in months
    #[arg(short, long)]
    pub tenor: f64,

    /// Target strike as a percentage of spot (e.g. 100)
    #[arg(short, long)]
    pub strike: f64,

    /// Valuation date (YYYY-MM-DD) for date-indexed surfaces. Defaults to today.
    #[arg(short, long)]
    pub date: Option<String>,

    /// Nearest tenors reported per ticker
    #[arg(short, long, default_value = "2")]
    pub neighbors: usize,

    /// Directory of cached surfaces. Defaults to the configured output directory.
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Only report values whose magnitude exceeds this threshold
    #[arg(long)]
    pub min_abs: Option<f64>,

    /// Rows per page
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Page to print, starting at 1
    #[arg(long, default_value = "1")]
    pub page: usize,
}

/// One reported grid point.
#[derive(Debug, Serialize, Tabled)]
struct SummaryTableRow {
    #[tabled(rename = "Ticker")]
    ticker: String,
    #[tabled(rename = "Tenor")]
    tenor: String,
    #[tabled(rename = "Strike")]
    strike: String,
    #[tabled(rename = "Vega")]
    value: String,
}

impl From<&SummaryRow> for SummaryTableRow {
    fn from(row: &SummaryRow) -> Self {
        Self {
            ticker: row.ticker.clone(),
            tenor: row.tenor.to_string(),
            strike: format!("{:.1}%", row.strike * 100.0),
            value: format_value(row.value),
        }
    }
}

/// Execute the summary command.
pub fn execute(args: SummaryArgs, config: EngineConfig, format: OutputFormat) -> Result<()> {
    let dir = args
        .dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.output_dir));
    let valuation_date = match &args.date {
        Some(d) => parse_date(d)?,
        None => chrono::Local::now().date_naive(),
    };

    let store = ResultStore::new();
    let loaded = load_surfaces_into(&dir, &store)
        .with_context(|| format!("reading surfaces from {}", dir.display()))?;
    tracing::debug!(loaded, dir = %dir.display(), "surfaces loaded");

    let mut query = SummaryQuery::new(valuation_date, args.tenor, args.strike, args.neighbors);
    if let Some(size) = args.page_size {
        query = query.with_page_size(size);
    }
    if let Some(threshold) = args.min_abs {
        query = query.with_min_abs_value(threshold);
    }

    let outcome = SummaryIndex::from_store(&store)
        .query(&query)
        .context("invalid summary query")?;
    if outcome.is_no_data() {
        if loaded == 0 {
            print_warning(&format!("No cached surfaces in {}", dir.display()));
        } else {
            print_warning(&format!(
                "No grid points matched in {loaded} surface(s) from {}",
                dir.display()
            ));
        }
        return Ok(());
    }

    let page = args.page.max(1) - 1;
    print_header(&format!(
        "Nearest grid points to {}m / {}% (page {} of {})",
        args.tenor,
        args.strike,
        page + 1,
        outcome.page_count()
    ));
    let rows: Vec<SummaryTableRow> = outcome.page(page).iter().map(SummaryTableRow::from).collect();
    print_output(&rows, format)
}
