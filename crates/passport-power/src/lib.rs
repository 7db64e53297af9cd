//! Passport Power
//!
//! Scores how far a passport, or a holding of two or three passports, reaches
//! across the world given a destination × origin matrix of travel-document
//! requirements.
//!
//! # Pipeline
//!
//! ```text
//! RequirementMatrix → LongTable → ReachEncoder → SubsetReachEngine → WeightedScorer → ReportAssembler
//! ```
//!
//! # Scores
//!
//! | Column     | Definition (per origin combination)                         |
//! |------------|-------------------------------------------------------------|
//! | maxScore   | Σ admissible destinations                                   |
//! | PopScore   | Σ maxScore · population(destination)                        |
//! | HDIScore   | Σ maxScore · HDI(destination) · population(destination)     |
//! | GDPScore   | Σ maxScore · GDP(destination)                               |
//!
//! A destination is admissible for a combination when at least one member
//! passport enters it visa free, with a visa on arrival, or with an
//! electronic travel authorization (or is the member's own country).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;

pub mod combos;
pub mod config;
pub mod context;
pub mod encoder;
pub mod engine;
pub mod export;
pub mod loader;
pub mod long_table;
pub mod matrix;
pub mod pipeline;
pub mod report;
pub mod scorer;

pub use config::{DestinationJoin, PipelineConfig};
pub use context::RunContext;
pub use engine::{Arity, CancelToken, SubsetReachEngine};
pub use long_table::{LongEntry, LongTable, LongTableBuilder};
pub use matrix::{RequirementLevel, RequirementMatrix};
pub use report::{Report, ReportAssembler, ReportRow};
pub use scorer::{CountryMetrics, MetricLookup, WeightedScore, WeightedScorer};

/// Distinct origins a long table must exceed before any scoring
pub const DEFAULT_MIN_COUNTRIES: usize = 180;

/// Placeholder codes emitted by the source country selector
pub const INVALID_CODES: [&str; 2] = ["0", ""];

#[derive(Error, Debug)]
pub enum PowerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Malformed data: {0}")]
    Data(String),
    #[error("No {what} record for: {}", .codes.join(", "))]
    Lookup {
        what: &'static str,
        codes: Vec<String>,
    },
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error("Run cancelled")]
    Cancelled,
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<PowerError>,
    },
}

pub type Result<T> = std::result::Result<T, PowerError>;

/// Pipeline stage, attached to errors surfaced by [`pipeline`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Load,
    LongTable,
    Enumerate,
    Score,
    Assemble,
    Export,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::LongTable => "long-table",
            Stage::Enumerate => "enumerate",
            Stage::Score => "score",
            Stage::Assemble => "assemble",
            Stage::Export => "export",
        };
        f.write_str(name)
    }
}

impl PowerError {
    /// Tag this error with the stage it escaped from
    pub fn at(self, stage: Stage) -> Self {
        match self {
            PowerError::Stage { .. } => self,
            other => PowerError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage the error was tagged with, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PowerError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Innermost error, past any stage tag
    pub fn root(&self) -> &PowerError {
        match self {
            PowerError::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

/// True unless the code is one of the placeholder values ("0" or blank).
///
/// Applied at every boundary where a table of countries is built.
pub fn is_valid_code(code: &str) -> bool {
    !INVALID_CODES.contains(&code.trim())
}

/// A country as listed by the source selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    /// Short code, upper case (e.g. "AR", "AL")
    pub code: String,
    /// Display name used in reports and to join metric tables
    pub name: String,
}

impl Country {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into().trim().to_uppercase(),
            name: name.into().trim().to_string(),
        }
    }
}

/// Code → display name lookup
#[derive(Debug, Clone, Default)]
pub struct CountryDirectory {
    countries: Vec<Country>,
    by_code: HashMap<String, usize>,
}

impl CountryDirectory {
    /// Build from a country list, dropping placeholder codes.
    ///
    /// A code listed twice is a validation error.
    pub fn from_countries(countries: impl IntoIterator<Item = Country>) -> Result<Self> {
        let mut directory = Self::default();
        let mut skipped = 0;

        for country in countries {
            if !is_valid_code(&country.code) {
                skipped += 1;
                continue;
            }
            if directory.by_code.contains_key(&country.code) {
                return Err(PowerError::Validation(format!(
                    "country code {} listed more than once",
                    country.code
                )));
            }
            directory
                .by_code
                .insert(country.code.clone(), directory.countries.len());
            directory.countries.push(country);
        }

        debug!(
            "Country directory: {} countries ({} placeholder codes skipped)",
            directory.countries.len(),
            skipped
        );

        Ok(directory)
    }

    pub fn get(&self, code: &str) -> Option<&Country> {
        self.by_code.get(code).map(|&i| &self.countries[i])
    }

    pub fn name(&self, code: &str) -> Option<&str> {
        self.get(code).map(|c| c.name.as_str())
    }

    pub fn countries(&self) -> &[Country] {
        &self.countries
    }

    pub fn len(&self) -> usize {
        self.countries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_codes_are_invalid() {
        assert!(!is_valid_code("0"));
        assert!(!is_valid_code(""));
        assert!(!is_valid_code("  "));
        assert!(is_valid_code("AR"));
        assert!(is_valid_code("00"));
    }

    #[test]
    fn test_directory_skips_placeholders() {
        let dir = CountryDirectory::from_countries(vec![
            Country::new("ar", "Argentina"),
            Country::new("0", "Select a country"),
            Country::new("AL", "Albania"),
        ])
        .unwrap();

        assert_eq!(dir.len(), 2);
        assert_eq!(dir.name("AR"), Some("Argentina"));
        assert_eq!(dir.name("0"), None);
    }

    #[test]
    fn test_directory_rejects_duplicate_codes() {
        let err = CountryDirectory::from_countries(vec![
            Country::new("AR", "Argentina"),
            Country::new("AR", "Argentina again"),
        ])
        .unwrap_err();

        assert!(matches!(err, PowerError::Validation(_)));
    }

    #[test]
    fn test_stage_tagging() {
        let err = PowerError::Configuration("k=4".into()).at(Stage::Enumerate);
        assert_eq!(err.stage(), Some(Stage::Enumerate));
        assert!(matches!(err.root(), PowerError::Configuration(_)));
        assert!(err.to_string().starts_with("enumerate stage failed"));

        // Re-tagging keeps the innermost stage
        let err = err.at(Stage::Export);
        assert_eq!(err.stage(), Some(Stage::Enumerate));
    }

    #[test]
    fn test_lookup_error_names_codes() {
        let err = PowerError::Lookup {
            what: "metric",
            codes: vec!["XK".into(), "TW".into()],
        };
        assert_eq!(err.to_string(), "No metric record for: XK, TW");
    }
}
