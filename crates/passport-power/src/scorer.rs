//! Destination weighting by population, development index and GDP
//!
//! ```text
//! PopScore = maxScore · population
//! HDIScore = maxScore · hdi · population
//! GDPScore = maxScore · gdp
//! ```

use crate::encoder::Admissibility;
use crate::{CountryDirectory, PowerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::{Add, AddAssign};
use tracing::{info, warn};

/// External metrics for one country
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CountryMetrics {
    pub population: f64,
    /// Human development index, 0-1
    pub hdi: f64,
    /// Nominal GDP (USD)
    pub gdp: f64,
}

impl CountryMetrics {
    pub fn new(population: f64, hdi: f64, gdp: f64) -> Self {
        Self { population, hdi, gdp }
    }

    /// Reject values no weighting should be computed from
    pub fn validate(&self, country: &str) -> Result<()> {
        if !self.population.is_finite() || self.population < 0.0 {
            return Err(PowerError::Validation(format!(
                "{}: population {} is not a non-negative number",
                country, self.population
            )));
        }
        if !self.gdp.is_finite() || self.gdp < 0.0 {
            return Err(PowerError::Validation(format!(
                "{}: GDP {} is not a non-negative number",
                country, self.gdp
            )));
        }
        if !(0.0..=1.0).contains(&self.hdi) {
            return Err(PowerError::Validation(format!(
                "{}: development index {} is outside [0, 1]",
                country, self.hdi
            )));
        }
        Ok(())
    }
}

/// A metric row keyed by country display name
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub country: String,
    pub metrics: CountryMetrics,
}

/// Country code → metrics
#[derive(Debug, Clone, Default)]
pub struct MetricLookup {
    by_code: HashMap<String, CountryMetrics>,
}

impl MetricLookup {
    pub fn from_codes(entries: impl IntoIterator<Item = (String, CountryMetrics)>) -> Self {
        Self {
            by_code: entries.into_iter().collect(),
        }
    }

    /// Attach name-keyed metric rows to codes through the country directory.
    ///
    /// Countries with no metric row are left out here; they only fail a run
    /// once a scorer needs them.
    pub fn join(directory: &CountryDirectory, records: Vec<MetricRecord>) -> Result<Self> {
        let mut by_name: HashMap<String, CountryMetrics> = HashMap::with_capacity(records.len());
        for record in records {
            record.metrics.validate(&record.country)?;
            if by_name.insert(record.country.clone(), record.metrics).is_some() {
                return Err(PowerError::Validation(format!(
                    "metrics listed more than once for {}",
                    record.country
                )));
            }
        }

        let mut by_code = HashMap::with_capacity(directory.len());
        for country in directory.countries() {
            if let Some(metrics) = by_name.get(&country.name) {
                by_code.insert(country.code.clone(), *metrics);
            }
        }

        let unmatched = directory.len() - by_code.len();
        if unmatched > 0 {
            warn!("{} countries have no metric record", unmatched);
        }
        info!("Metrics joined for {} of {} countries", by_code.len(), directory.len());

        Ok(Self { by_code })
    }

    pub fn get(&self, code: &str) -> Option<&CountryMetrics> {
        self.by_code.get(code)
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

/// Reach and weighted reach, summable across destinations and across workers
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightedScore {
    pub reach: u64,
    pub pop_score: f64,
    pub hdi_score: f64,
    pub gdp_score: f64,
}

impl Add for WeightedScore {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            reach: self.reach + rhs.reach,
            pop_score: self.pop_score + rhs.pop_score,
            hdi_score: self.hdi_score + rhs.hdi_score,
            gdp_score: self.gdp_score + rhs.gdp_score,
        }
    }
}

impl AddAssign for WeightedScore {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Per-destination weights, resolved once for a fixed destination list
#[derive(Debug, Clone)]
pub struct WeightedScorer {
    destinations: Vec<String>,
    index: HashMap<String, usize>,
    weights: Vec<CountryMetrics>,
}

impl WeightedScorer {
    /// Resolve metrics for every destination.
    ///
    /// Fails naming every destination that has no metric record; no partial
    /// scorer is returned.
    pub fn new(destinations: &[String], lookup: &MetricLookup) -> Result<Self> {
        let mut weights = Vec::with_capacity(destinations.len());
        let mut missing = Vec::new();

        for code in destinations {
            match lookup.get(code) {
                Some(m) => weights.push(*m),
                None => missing.push(code.clone()),
            }
        }

        if !missing.is_empty() {
            return Err(PowerError::Lookup {
                what: "metric",
                codes: missing,
            });
        }

        let index = destinations
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();

        Ok(Self {
            destinations: destinations.to_vec(),
            index,
            weights,
        })
    }

    pub fn destinations(&self) -> &[String] {
        &self.destinations
    }

    /// Weighted contribution of one (combination, destination) row
    pub fn weigh(&self, destination: usize, max_score: Admissibility) -> WeightedScore {
        let m = &self.weights[destination];
        let s = f64::from(max_score);
        WeightedScore {
            reach: u64::from(max_score),
            pop_score: s * m.population,
            hdi_score: s * m.hdi * m.population,
            gdp_score: s * m.gdp,
        }
    }

    /// As [`weigh`](Self::weigh), addressing the destination by code
    pub fn weigh_code(&self, destination: &str, max_score: Admissibility) -> Result<WeightedScore> {
        let i = self.index.get(destination).ok_or_else(|| PowerError::Lookup {
            what: "metric",
            codes: vec![destination.to_string()],
        })?;
        Ok(self.weigh(*i, max_score))
    }
}
