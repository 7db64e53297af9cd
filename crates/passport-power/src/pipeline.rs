//! End-to-end run: load → long table → enumerate → score → assemble → export
//!
//! Every failure leaves through [`PowerError::at`] so callers see which stage
//! stopped the run. There is no partial-success mode: a report is only
//! written once its every row has been scored and named.

use crate::engine::{Arity, CancelToken, SubsetReachEngine};
use crate::export::{self, ExportedTable};
use crate::loader;
use crate::report::{AggregatedScore, ReportAssembler};
use crate::{
    CountryDirectory, LongTable, LongTableBuilder, MetricLookup, PipelineConfig, PowerError, Report,
    Result, RunContext, Stage, WeightedScorer,
};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// Input table locations
#[derive(Debug, Clone)]
pub struct PipelineInputs {
    /// Long `Destination, Origin, Visa Requirements` table
    pub requirements: PathBuf,
    /// `Country, Abbreviation` table
    pub countries: PathBuf,
    /// `Country, Population, HDI, GDP` table
    pub metrics: PathBuf,
}

/// Everything the computation needs, already in memory
#[derive(Debug, Clone)]
pub struct LoadedInputs {
    /// Requirement rows exactly as read, placeholder codes dropped
    pub long: LongTable,
    pub directory: CountryDirectory,
    pub metrics: MetricLookup,
}

/// Reports for whichever arities were enabled
#[derive(Debug, Clone, Default)]
pub struct PowerReports {
    pub single: Option<Report>,
    pub dual: Option<Report>,
    pub triad: Option<Report>,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub origins: usize,
    pub destinations: usize,
    pub long_rows: usize,
    pub exported: Vec<(String, ExportedTable)>,
    pub reports: PowerReports,
}

pub fn load(inputs: &PipelineInputs) -> Result<LoadedInputs> {
    let read_all = || -> Result<LoadedInputs> {
        let long = loader::load_requirements(&inputs.requirements)?;
        let directory = loader::load_countries(&inputs.countries)?;
        let records = loader::load_metrics(&inputs.metrics)?;
        let metrics = MetricLookup::join(&directory, records)?;
        Ok(LoadedInputs {
            long,
            directory,
            metrics,
        })
    };
    read_all().map_err(|e| e.at(Stage::Load))
}

/// Run `f` on a dedicated rayon pool when a thread count is configured
fn with_pool<T, F>(threads: Option<usize>, f: F) -> Result<T>
where
    T: Send,
    F: FnOnce() -> Result<T> + Send,
{
    match threads {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| PowerError::Configuration(format!("thread pool: {}", e)))?;
            pool.install(f)
        }
        None => f(),
    }
}

fn assemble(width: usize, partials: Vec<AggregatedScore>, directory: &CountryDirectory) -> Result<Report> {
    let mut assembler = ReportAssembler::new(width);
    assembler.absorb_all(partials).map_err(|e| e.at(Stage::Assemble))?;
    assembler.finish(directory).map_err(|e| e.at(Stage::Assemble))
}

fn single_report(
    engine: &SubsetReachEngine,
    scorer: &WeightedScorer,
    directory: &CountryDirectory,
    cancel: &CancelToken,
) -> Result<Report> {
    let partials = engine
        .aggregate_single(scorer, cancel)
        .map_err(|e| e.at(Stage::Enumerate))?;
    assemble(1, partials, directory)
}

fn subset_report(
    engine: &SubsetReachEngine,
    arity: Arity,
    scorer: &WeightedScorer,
    directory: &CountryDirectory,
    cancel: &CancelToken,
) -> Result<Report> {
    let partials = engine
        .aggregate(arity, scorer, cancel)
        .map_err(|e| e.at(Stage::Enumerate))?;
    assemble(arity.k(), partials, directory)
}

fn selected_arities(config: &PipelineConfig) -> Vec<Arity> {
    let mut arities = Vec::new();
    if config.dual {
        arities.push(Arity::Dual);
    }
    if config.triad {
        arities.push(Arity::Triad);
    }
    arities
}

/// Build the engine and scorer shared by every arity.
///
/// Every origin must have a display name before any enumeration starts.
fn prepare(loaded: &LoadedInputs, config: &PipelineConfig) -> Result<(SubsetReachEngine, WeightedScorer)> {
    LongTableBuilder::new(config.min_countries)
        .check_floor(&loaded.long)
        .map_err(|e| e.at(Stage::LongTable))?;
    let engine = SubsetReachEngine::new(&loaded.long, config.join).map_err(|e| e.at(Stage::Enumerate))?;
    let scorer = WeightedScorer::new(engine.destinations(), &loaded.metrics).map_err(|e| e.at(Stage::Score))?;

    let unnamed: Vec<String> = engine
        .origins()
        .iter()
        .filter(|code| loaded.directory.name(code).is_none())
        .cloned()
        .collect();
    if !unnamed.is_empty() {
        return Err(PowerError::Lookup {
            what: "country name",
            codes: unnamed,
        }
        .at(Stage::Assemble));
    }

    Ok((engine, scorer))
}

fn compute_reports(
    engine: &SubsetReachEngine,
    scorer: &WeightedScorer,
    directory: &CountryDirectory,
    config: &PipelineConfig,
    cancel: &CancelToken,
) -> Result<PowerReports> {
    let mut reports = PowerReports::default();
    if config.single {
        reports.single = Some(single_report(engine, scorer, directory, cancel)?);
    }
    for arity in selected_arities(config) {
        let report = subset_report(engine, arity, scorer, directory, cancel)?;
        match arity {
            Arity::Dual => reports.dual = Some(report),
            Arity::Triad => reports.triad = Some(report),
        }
    }
    Ok(reports)
}

/// Compute every enabled report in memory, writing nothing
pub fn compute(loaded: &LoadedInputs, config: &PipelineConfig, cancel: &CancelToken) -> Result<PowerReports> {
    config.validate().map_err(|e| e.at(Stage::Load))?;
    let (engine, scorer) = prepare(loaded, config)?;

    with_pool(config.threads, || {
        compute_reports(&engine, &scorer, &loaded.directory, config, cancel)
    })
}

/// Load inputs, compute every enabled report and write all tables.
///
/// Input-derived tables and the streamed subset tables are written as they
/// are produced; the named reports only once every enabled arity has been
/// scored.
pub fn run(
    inputs: &PipelineInputs,
    config: &PipelineConfig,
    ctx: &RunContext,
    cancel: &CancelToken,
) -> Result<RunSummary> {
    config.validate().map_err(|e| e.at(Stage::Load))?;
    info!("Run {} writing to {:?}", ctx.run_id, ctx.output_dir());

    let loaded = load(inputs)?;
    let (engine, scorer) = prepare(&loaded, config)?;
    let long = &loaded.long;

    let export_err = |e: PowerError| e.at(Stage::Export);
    ctx.prepare().map_err(export_err)?;

    let mut exported = vec![
        (
            "countries".to_string(),
            export::write_countries(ctx, &loaded.directory).map_err(export_err)?,
        ),
        (
            "cross table".to_string(),
            export::write_cross_table(ctx, long).map_err(export_err)?,
        ),
        (
            "long table".to_string(),
            export::write_long_table(ctx, long).map_err(export_err)?,
        ),
    ];

    let reports = with_pool(config.threads, || {
        if config.write_subset_tables {
            for arity in selected_arities(config) {
                exported.push((
                    format!("{} table", arity.label().to_lowercase()),
                    export::write_subset_table(ctx, &engine, arity, cancel).map_err(export_err)?,
                ));
            }
        }
        compute_reports(&engine, &scorer, &loaded.directory, config, cancel)
    })?;

    let named = [
        (export::SINGLE_REPORT_STEM.to_string(), reports.single.as_ref()),
        (export::report_stem(Arity::Dual), reports.dual.as_ref()),
        (export::report_stem(Arity::Triad), reports.triad.as_ref()),
    ];
    for (stem, report) in named {
        if let Some(report) = report {
            exported.push((stem.clone(), export::write_report(ctx, &stem, report).map_err(export_err)?));
        }
    }

    Ok(RunSummary {
        run_id: ctx.run_id,
        origins: engine.origins().len(),
        destinations: engine.destinations().len(),
        long_rows: long.len(),
        exported,
        reports,
    })
}

/// Rebuild a report from a saved dual/triad row table
pub fn report_from_subset_table(
    path: impl AsRef<Path>,
    directory: &CountryDirectory,
    metrics: &MetricLookup,
) -> Result<Report> {
    let path = path.as_ref();
    let mut destinations = std::collections::BTreeSet::new();
    loader::stream_subset_table(path, |row| {
        destinations.insert(row.destination);
        Ok(())
    })
    .map_err(|e| e.at(Stage::Load))?;

    let destinations: Vec<String> = destinations.into_iter().collect();
    let scorer = WeightedScorer::new(&destinations, metrics).map_err(|e| e.at(Stage::Score))?;

    let mut assembler: Option<ReportAssembler> = None;
    loader::stream_subset_table(path, |row| {
        let asm = assembler.get_or_insert_with(|| ReportAssembler::new(row.origins.len()));
        asm.absorb_row(&row, &scorer)
    })
    .map_err(|e| e.at(Stage::Assemble))?;

    match assembler {
        Some(asm) => asm.finish(directory).map_err(|e| e.at(Stage::Assemble)),
        None => Err(PowerError::Data(format!("{:?} has no rows", path)).at(Stage::Load)),
    }
}
