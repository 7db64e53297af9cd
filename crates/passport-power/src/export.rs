//! CSV output: working copies (overwritten each run) and timestamped archives

use crate::engine::{Arity, CancelToken, SubsetReachEngine};
use crate::{CountryDirectory, LongTable, Report, RequirementLevel, Result, RunContext};
use csv::Writer;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const COUNTRIES_STEM: &str = "countries";
pub const CROSS_TABLE_STEM: &str = "PassportIndex";
pub const LONG_TABLE_STEM: &str = "PassportIndex_Long";
pub const SINGLE_REPORT_STEM: &str = "Single Passport Power Scores";

pub fn subset_table_stem(arity: Arity) -> String {
    format!("{}PowerTable", arity.label())
}

pub fn report_stem(arity: Arity) -> String {
    format!("{} Passport Power Scores", arity.label())
}

/// Where a table landed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedTable {
    pub working: Option<PathBuf>,
    pub archive: Option<PathBuf>,
    pub rows: u64,
}

/// Writes every record to a working copy and/or an archive copy in one pass
struct TableWriter {
    working: Option<(PathBuf, Writer<File>)>,
    archive: Option<(PathBuf, Writer<File>)>,
    rows: u64,
}

impl TableWriter {
    fn open(working: Option<PathBuf>, archive: Option<PathBuf>) -> Result<Self> {
        let open = |path: Option<PathBuf>| -> Result<Option<(PathBuf, Writer<File>)>> {
            match path {
                Some(p) => {
                    debug!("Opening {:?}", p);
                    let writer = Writer::from_path(&p)?;
                    Ok(Some((p, writer)))
                }
                None => Ok(None),
            }
        };
        Ok(Self {
            working: open(working)?,
            archive: open(archive)?,
            rows: 0,
        })
    }

    fn writers(&mut self) -> impl Iterator<Item = &mut Writer<File>> {
        self.working
            .iter_mut()
            .chain(self.archive.iter_mut())
            .map(|(_, w)| w)
    }

    fn header<I, T>(&mut self, header: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let header: Vec<T> = header.into_iter().collect();
        for w in self.writers() {
            w.write_record(header.iter())?;
        }
        Ok(())
    }

    fn record<I, T>(&mut self, record: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let record: Vec<T> = record.into_iter().collect();
        for w in self.writers() {
            w.write_record(record.iter())?;
        }
        self.rows += 1;
        Ok(())
    }

    fn serialize<S: Serialize>(&mut self, row: &S) -> Result<()> {
        for w in self.writers() {
            w.serialize(row)?;
        }
        self.rows += 1;
        Ok(())
    }

    fn finish(mut self) -> Result<ExportedTable> {
        for w in self.writers() {
            w.flush()?;
        }
        Ok(ExportedTable {
            working: self.working.map(|(p, _)| p),
            archive: self.archive.map(|(p, _)| p),
            rows: self.rows,
        })
    }
}

fn log_written(what: &str, table: &ExportedTable) {
    let paths: Vec<&Path> = table
        .working
        .iter()
        .chain(table.archive.iter())
        .map(|p| p.as_path())
        .collect();
    info!("Wrote {} ({} rows) to {:?}", what, table.rows, paths);
}

/// `countries.csv` with the same `Country, Abbreviation` layout it is read from
pub fn write_countries(ctx: &RunContext, directory: &CountryDirectory) -> Result<ExportedTable> {
    let mut out = TableWriter::open(Some(ctx.working_path(COUNTRIES_STEM)), None)?;
    out.header(["Country", "Abbreviation"])?;
    for country in directory.countries() {
        out.record([country.name.as_str(), country.code.as_str()])?;
    }
    let table = out.finish()?;
    log_written("countries", &table);
    Ok(table)
}

/// Wide destination × origin table, archive copy only.
///
/// Columns are the origins seen in the long table; a pair with no row is
/// left blank.
pub fn write_cross_table(ctx: &RunContext, long: &LongTable) -> Result<ExportedTable> {
    let mut out = TableWriter::open(None, Some(ctx.archive_path(CROSS_TABLE_STEM)))?;
    let origins = long.origins();

    let mut by_destination: BTreeMap<&str, HashMap<&str, RequirementLevel>> = BTreeMap::new();
    for entry in long.entries() {
        by_destination
            .entry(entry.destination.as_str())
            .or_default()
            .insert(entry.origin.as_str(), entry.requirement);
    }

    out.header(std::iter::once("Destination").chain(origins.iter().map(String::as_str)))?;
    for (destination, row) in &by_destination {
        let record: Vec<&str> = std::iter::once(*destination)
            .chain(origins.iter().map(|origin| {
                row.get(origin.as_str())
                    .map(|level| level.label())
                    .unwrap_or_default()
            }))
            .collect();
        out.record(record)?;
    }

    let table = out.finish()?;
    log_written("cross table", &table);
    Ok(table)
}

pub fn write_long_table(ctx: &RunContext, long: &LongTable) -> Result<ExportedTable> {
    let mut out = TableWriter::open(
        Some(ctx.working_path(LONG_TABLE_STEM)),
        Some(ctx.archive_path(LONG_TABLE_STEM)),
    )?;
    for entry in long.entries() {
        out.serialize(entry)?;
    }
    let table = out.finish()?;
    log_written("long table", &table);
    Ok(table)
}

/// Stream `Destination, Origin1..Origink, maxScore` rows straight from the engine
pub fn write_subset_table(
    ctx: &RunContext,
    engine: &SubsetReachEngine,
    arity: Arity,
    cancel: &CancelToken,
) -> Result<ExportedTable> {
    let stem = subset_table_stem(arity);
    let mut out = TableWriter::open(Some(ctx.working_path(&stem)), Some(ctx.archive_path(&stem)))?;

    let mut header = vec!["Destination".to_string()];
    header.extend((1..=arity.k()).map(|i| format!("Origin{}", i)));
    header.push("maxScore".to_string());
    out.header(&header)?;

    info!(
        "Streaming {} {} combinations to {}",
        engine.combination_count(arity),
        arity.label().to_lowercase(),
        stem
    );

    let mut record: Vec<String> = Vec::with_capacity(arity.k() + 2);
    engine.for_each_subset_row(arity, cancel, |origins, destination, score| {
        record.clear();
        record.push(destination.to_string());
        record.extend(origins.iter().map(|o| o.to_string()));
        record.push(score.to_string());
        out.record(&record)
    })?;

    let table = out.finish()?;
    log_written(&stem, &table);
    Ok(table)
}

/// Final named report, working copy only
pub fn write_report(ctx: &RunContext, stem: &str, report: &Report) -> Result<ExportedTable> {
    let mut out = TableWriter::open(Some(ctx.working_path(stem)), None)?;
    out.header(report.headers())?;

    for row in &report.rows {
        let mut record: Vec<String> = row.names.clone();
        record.push(row.score.reach.to_string());
        record.push(row.score.pop_score.to_string());
        record.push(row.score.hdi_score.to_string());
        record.push(row.score.gdp_score.to_string());
        out.record(record)?;
    }

    let table = out.finish()?;
    log_written(stem, &table);
    Ok(table)
}
