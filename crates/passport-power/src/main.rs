//! Passport Power CLI
//!
//! Scores single, dual and triad passport reach from a long visa requirement
//! table and writes the row tables and ranked reports as CSV.
//!
//! Usage:
//!   passport-power --requirements exports/PassportIndex_Long.csv \
//!                  --countries exports/countries.csv \
//!                  --metrics "support tables/Pop HDI GDP.csv" \
//!                  --output exports
//!
//!   passport-power --rank-table exports/DualPowerTable.csv --output exports

use anyhow::Result;
use clap::Parser;
use passport_power::engine::Arity;
use passport_power::pipeline::{self, PipelineInputs};
use passport_power::{
    export, loader, CancelToken, DestinationJoin, MetricLookup, PipelineConfig, Report, RunContext,
};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "passport-power",
    about = "Score single, dual and triad passport reach from a visa requirement table"
)]
struct Args {
    /// Long Destination, Origin, Visa Requirements table
    #[arg(short = 'r', long, default_value = "exports/PassportIndex_Long.csv")]
    requirements: PathBuf,

    /// Country, Abbreviation table
    #[arg(short = 'c', long, default_value = "exports/countries.csv")]
    countries: PathBuf,

    /// Country, Population, HDI, GDP table
    #[arg(short = 'm', long, default_value = "support tables/Pop HDI GDP.csv")]
    metrics: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = "exports")]
    output: PathBuf,

    /// JSON pipeline config; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Rebuild the ranked report from a saved dual/triad row table instead of
    /// running the pipeline
    #[arg(long)]
    rank_table: Option<PathBuf>,

    /// Destination set per combination
    #[arg(long, value_enum)]
    join: Option<DestinationJoin>,

    /// Valid countries must number more than this
    #[arg(long)]
    min_countries: Option<usize>,

    /// Skip single passport reach
    #[arg(long)]
    no_single: bool,

    /// Skip pairs
    #[arg(long)]
    no_dual: bool,

    /// Skip triads
    #[arg(long)]
    no_triad: bool,

    /// Do not write the per-destination dual/triad row tables
    #[arg(long)]
    no_subset_tables: bool,

    /// Worker threads for combination scoring
    #[arg(long)]
    threads: Option<usize>,

    /// Ranked rows to log per report
    #[arg(long)]
    top: Option<usize>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(join) = self.join {
            config.join = join;
        }
        if let Some(min) = self.min_countries {
            config.min_countries = min;
        }
        if self.no_single {
            config.single = false;
        }
        if self.no_dual {
            config.dual = false;
        }
        if self.no_triad {
            config.triad = false;
        }
        if self.no_subset_tables {
            config.write_subset_tables = false;
        }
        if self.threads.is_some() {
            config.threads = self.threads;
        }
        if let Some(top) = self.top {
            config.top = top;
        }

        config.validate()?;
        Ok(config)
    }
}

fn log_top(title: &str, report: &Report, top: usize) {
    info!("\nTop {} {} by reach:", top, title);
    for row in report.ranked().into_iter().take(top) {
        info!(
            "  {:>3} | {:60} | pop {:.3e} | gdp {:.3e}",
            row.score.reach,
            row.names.join(" + "),
            row.score.pop_score,
            row.score.gdp_score
        );
    }
}

fn rank_saved_table(args: &Args, table: &Path, top: usize) -> Result<()> {
    let directory = loader::load_countries(&args.countries)?;
    let metrics = MetricLookup::join(&directory, loader::load_metrics(&args.metrics)?)?;
    let report = pipeline::report_from_subset_table(table, &directory, &metrics)?;

    let arity = Arity::try_from(report.width)?;
    let ctx = RunContext::new(&args.output);
    ctx.prepare()?;
    export::write_report(&ctx, &export::report_stem(arity), &report)?;

    log_top(&format!("{} combinations", arity.label().to_lowercase()), &report, top);
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("{}", "=".repeat(60));
    info!("Passport Power");
    info!("{}", "=".repeat(60));

    let config = args.pipeline_config()?;

    if let Some(table) = &args.rank_table {
        return rank_saved_table(&args, table, config.top);
    }

    let inputs = PipelineInputs {
        requirements: args.requirements.clone(),
        countries: args.countries.clone(),
        metrics: args.metrics.clone(),
    };
    let ctx = RunContext::new(&args.output);
    let summary = pipeline::run(&inputs, &config, &ctx, &CancelToken::new())?;

    if let Some(report) = &summary.reports.single {
        log_top("passports", report, config.top);
    }
    if let Some(report) = &summary.reports.dual {
        log_top("passport pairs", report, config.top);
    }
    if let Some(report) = &summary.reports.triad {
        log_top("passport triads", report, config.top);
    }

    // Summary
    info!("\n{}", "=".repeat(60));
    info!("SUMMARY");
    info!("{}", "=".repeat(60));
    info!("Run id: {}", summary.run_id);
    info!(
        "{} origins × {} destinations ({} long rows)",
        summary.origins, summary.destinations, summary.long_rows
    );
    for (what, table) in &summary.exported {
        info!("  {}: {} rows", what, table.rows);
    }

    Ok(())
}
