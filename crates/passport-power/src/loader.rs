//! Loading input tables from CSV

use crate::engine::SubsetResult;
use crate::scorer::{CountryMetrics, MetricRecord};
use crate::{is_valid_code, Country, CountryDirectory, LongEntry, LongTable, PowerError, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Deserialize;
use std::fs::File;
use std::path::Path;
use tracing::{info, warn};

fn open(path: &Path) -> Result<csv::Reader<File>> {
    let file = File::open(path)?;
    Ok(ReaderBuilder::new().trim(Trim::All).from_reader(file))
}

/// Normalize a country code the way every table stores it
fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Raw row of the countries table
#[derive(Debug, Deserialize)]
struct RawCountry {
    #[serde(rename = "Country")]
    country: Option<String>,
    #[serde(rename = "Abbreviation")]
    abbreviation: Option<String>,
}

/// Raw row of the long requirement table
#[derive(Debug, Deserialize)]
struct RawRequirement {
    #[serde(rename = "Destination")]
    destination: String,
    #[serde(rename = "Origin")]
    origin: String,
    #[serde(rename = "Visa Requirements")]
    requirement: String,
}

/// Raw row of the metrics table; the long source headers are accepted too
#[derive(Debug, Deserialize)]
struct RawMetric {
    #[serde(rename = "Country")]
    country: String,
    #[serde(rename = "Population", alias = "2015 Population (World Bank or CIA Factbook)")]
    population: f64,
    #[serde(rename = "HDI", alias = "Human Development Index (2014) (UN or World Bank)")]
    hdi: f64,
    #[serde(rename = "GDP", alias = "GDP Nominal ($US, latest avail) (World Bank or Wikipedia)")]
    gdp: f64,
}

/// Load the `Country, Abbreviation` table
pub fn load_countries(path: impl AsRef<Path>) -> Result<CountryDirectory> {
    let path = path.as_ref();
    info!("Loading countries from {:?}", path);

    let mut reader = open(path)?;
    let mut countries = Vec::new();
    let mut skipped = 0;

    for row in reader.deserialize() {
        let raw: RawCountry = row?;
        let (name, code) = match (raw.country, raw.abbreviation) {
            (Some(name), Some(code)) if !name.is_empty() && is_valid_code(&code) => (name, code),
            _ => {
                skipped += 1;
                continue;
            }
        };
        countries.push(Country::new(code, name));
    }

    let directory = CountryDirectory::from_countries(countries)?;
    info!(
        "Loaded {} countries ({} skipped for missing or placeholder codes)",
        directory.len(),
        skipped
    );

    Ok(directory)
}

/// Row-numbered data error for a malformed record; I/O failures pass through
fn row_error(row: usize, err: csv::Error) -> PowerError {
    if matches!(err.kind(), csv::ErrorKind::Io(_)) {
        PowerError::Csv(err)
    } else {
        PowerError::Data(format!("row {}: {}", row, err))
    }
}

/// Load a long `Destination, Origin, Visa Requirements` table as it is.
///
/// Rows with a placeholder code are dropped. Nothing is filled in: a
/// (destination, origin) pair absent from the file stays absent, and a code
/// that only appears as a destination never becomes an origin.
pub fn load_requirements(path: impl AsRef<Path>) -> Result<LongTable> {
    let path = path.as_ref();
    info!("Loading visa requirements from {:?}", path);

    let mut reader = open(path)?;
    let mut entries = Vec::new();
    let mut skipped = 0;

    for (i, row) in reader.deserialize().enumerate() {
        let raw: RawRequirement = row.map_err(|e| row_error(i + 1, e))?;
        let level = raw.requirement.parse().map_err(|e| match e {
            PowerError::Data(msg) => PowerError::Data(format!("row {}: {}", i + 1, msg)),
            other => other,
        })?;
        if !is_valid_code(&raw.destination) || !is_valid_code(&raw.origin) {
            skipped += 1;
            continue;
        }
        entries.push(LongEntry::new(
            normalize_code(&raw.destination),
            normalize_code(&raw.origin),
            level,
        ));
    }

    if entries.is_empty() {
        return Err(PowerError::Data(format!("{:?} has no requirement rows", path)));
    }

    info!(
        "Loaded {} requirement rows ({} skipped for placeholder codes)",
        entries.len(),
        skipped
    );
    LongTable::from_entries(entries)
}

/// Load the population / development index / GDP table
pub fn load_metrics(path: impl AsRef<Path>) -> Result<Vec<MetricRecord>> {
    let path = path.as_ref();
    info!("Loading country metrics from {:?}", path);

    let mut reader = open(path)?;
    let mut records = Vec::new();

    for row in reader.deserialize() {
        let raw: RawMetric = row?;
        records.push(MetricRecord {
            country: raw.country.trim().to_string(),
            metrics: CountryMetrics::new(raw.population, raw.hdi, raw.gdp),
        });
    }

    info!("Loaded metrics for {} countries", records.len());
    Ok(records)
}

/// Column layout of a `Destination, Origin1..Origink, maxScore` table
struct SubsetColumns {
    destination: usize,
    origins: Vec<usize>,
    max_score: usize,
}

impl SubsetColumns {
    fn from_headers(headers: &StringRecord) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h == name);

        let destination = find("Destination")
            .ok_or_else(|| PowerError::Data("subset table has no Destination column".to_string()))?;
        let max_score = find("maxScore")
            .ok_or_else(|| PowerError::Data("subset table has no maxScore column".to_string()))?;
        let origins: Vec<usize> = (1..)
            .map(|i| find(&format!("Origin{}", i)))
            .take_while(Option::is_some)
            .flatten()
            .collect();

        if origins.is_empty() {
            return Err(PowerError::Data("subset table has no Origin1 column".to_string()));
        }

        Ok(Self {
            destination,
            origins,
            max_score,
        })
    }

    fn parse(&self, record: &StringRecord, line: usize) -> Result<SubsetResult> {
        let field = |i: usize| {
            record
                .get(i)
                .ok_or_else(|| PowerError::Data(format!("line {}: missing column {}", line, i)))
        };

        let raw_score = field(self.max_score)?;
        let max_score = match raw_score.parse::<f64>() {
            Ok(s) if s == 0.0 => 0,
            Ok(s) if s == 1.0 => 1,
            _ => {
                return Err(PowerError::Data(format!(
                    "line {}: maxScore {:?} is not 0 or 1",
                    line, raw_score
                )))
            }
        };

        Ok(SubsetResult {
            destination: normalize_code(field(self.destination)?),
            origins: self
                .origins
                .iter()
                .map(|&i| field(i).map(normalize_code))
                .collect::<Result<Vec<_>>>()?,
            max_score,
        })
    }
}

/// Stream a saved dual/triad row table to `sink`.
///
/// Returns the number of origin columns in the table.
pub fn stream_subset_table<F>(path: impl AsRef<Path>, mut sink: F) -> Result<usize>
where
    F: FnMut(SubsetResult) -> Result<()>,
{
    let path = path.as_ref();
    info!("Reading subset table {:?}", path);

    let mut reader = open(path)?;
    let columns = SubsetColumns::from_headers(reader.headers()?)?;

    let mut rows = 0usize;
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        sink(columns.parse(&record, i + 2)?)?;
        rows += 1;
    }

    if rows == 0 {
        warn!("Subset table {:?} has no rows", path);
    }
    info!("Read {} rows with {} origins each", rows, columns.origins.len());

    Ok(columns.origins.len())
}
