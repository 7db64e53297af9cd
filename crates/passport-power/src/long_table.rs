//! Flattening the requirement matrix into (Destination, Origin, Visa Requirements) rows

use crate::{is_valid_code, PowerError, RequirementLevel, RequirementMatrix, Result, DEFAULT_MIN_COUNTRIES};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info};

/// One row of the long table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LongEntry {
    #[serde(rename = "Destination")]
    pub destination: String,
    #[serde(rename = "Origin")]
    pub origin: String,
    #[serde(rename = "Visa Requirements")]
    pub requirement: RequirementLevel,
}

impl LongEntry {
    pub fn new(destination: impl Into<String>, origin: impl Into<String>, requirement: RequirementLevel) -> Self {
        Self {
            destination: destination.into(),
            origin: origin.into(),
            requirement,
        }
    }
}

/// Tidy requirement relation: at most one row per (destination, origin),
/// no placeholder codes
#[derive(Debug, Clone, Default)]
pub struct LongTable {
    entries: Vec<LongEntry>,
}

impl LongTable {
    /// Wrap rows that are already flat.
    ///
    /// Rows with a placeholder code are a validation error, repeated pairs a
    /// data error.
    pub fn from_entries(entries: Vec<LongEntry>) -> Result<Self> {
        let mut seen: HashSet<(&str, &str)> = HashSet::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if !is_valid_code(&entry.destination) || !is_valid_code(&entry.origin) {
                return Err(PowerError::Validation(format!(
                    "row {} has an invalid code (destination {:?}, origin {:?})",
                    i, entry.destination, entry.origin
                )));
            }
            if !seen.insert((entry.destination.as_str(), entry.origin.as_str())) {
                return Err(PowerError::Data(format!(
                    "duplicate row for destination {} / origin {}",
                    entry.destination, entry.origin
                )));
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[LongEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct origin codes, sorted
    pub fn origins(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.origin.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct destination codes, sorted
    pub fn destinations(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.destination.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Builds a [`LongTable`] from a [`RequirementMatrix`]
#[derive(Debug, Clone)]
pub struct LongTableBuilder {
    /// The matrix must hold strictly more valid origins than this
    pub min_countries: usize,
}

impl Default for LongTableBuilder {
    fn default() -> Self {
        Self {
            min_countries: DEFAULT_MIN_COUNTRIES,
        }
    }
}

impl LongTableBuilder {
    pub fn new(min_countries: usize) -> Self {
        Self { min_countries }
    }

    pub fn build(&self, matrix: &RequirementMatrix) -> Result<LongTable> {
        info!("Flattening {} × {} requirement matrix", matrix.codes().len(), matrix.codes().len());

        let mut entries = Vec::new();
        let mut filtered = 0;
        for (destination, origin, requirement) in matrix.cells() {
            if !is_valid_code(destination) || !is_valid_code(origin) {
                filtered += 1;
                continue;
            }
            entries.push(LongEntry::new(destination, origin, requirement));
        }

        debug!("Dropped {} cells with placeholder codes", filtered);

        // Cells come from a map keyed by (destination, origin), so no pair repeats
        let table = LongTable { entries };
        self.check_floor(&table)?;
        Ok(table)
    }

    /// Fail unless the table holds strictly more distinct origins than the floor.
    ///
    /// Only codes seen in the `Origin` column count; destination-only codes
    /// never become origins.
    pub fn check_floor(&self, table: &LongTable) -> Result<()> {
        let origins: HashSet<&str> = table.entries.iter().map(|e| e.origin.as_str()).collect();
        if origins.len() <= self.min_countries {
            return Err(PowerError::Validation(format!(
                "not enough countries: {} valid origins, need more than {}",
                origins.len(),
                self.min_countries
            )));
        }

        info!("Long table: {} rows over {} origins", table.len(), origins.len());
        Ok(())
    }
}
