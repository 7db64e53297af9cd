//! Grouping scored rows per origin combination and naming the result

use crate::engine::SubsetResult;
use crate::{CountryDirectory, PowerError, Result, WeightedScore, WeightedScorer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Summed score of one origin combination over all its destinations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedScore {
    pub origins: Vec<String>,
    pub score: WeightedScore,
}

/// One line of a final report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub codes: Vec<String>,
    pub names: Vec<String>,
    pub score: WeightedScore,
}

/// Final per-combination table, keyed (and ordered) by origin codes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub width: usize,
    pub rows: Vec<ReportRow>,
}

impl Report {
    /// Name columns followed by the score columns
    pub fn headers(&self) -> Vec<String> {
        let mut headers: Vec<String> = match self.width {
            1 => vec!["Country".to_string()],
            w => ["x", "y", "z"]
                .iter()
                .chain(std::iter::repeat(&"n"))
                .take(w)
                .map(|suffix| format!("Country_{}", suffix))
                .collect(),
        };
        headers.extend(
            ["maxScore", "PopScore", "HDIScore", "GDPScore"]
                .iter()
                .map(|s| s.to_string()),
        );
        headers
    }

    /// Rows by descending reach, then population reach, then codes
    pub fn ranked(&self) -> Vec<&ReportRow> {
        let mut ranked: Vec<&ReportRow> = self.rows.iter().collect();
        ranked.sort_by(|a, b| {
            b.score
                .reach
                .cmp(&a.score.reach)
                .then_with(|| {
                    b.score
                        .pop_score
                        .partial_cmp(&a.score.pop_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.codes.cmp(&b.codes))
        });
        ranked
    }
}

/// Group-and-sum over origin combinations.
///
/// Partial sums may arrive in any order and from any number of workers; the
/// result only depends on what was absorbed.
#[derive(Debug, Clone)]
pub struct ReportAssembler {
    width: usize,
    groups: BTreeMap<Vec<String>, WeightedScore>,
}

impl ReportAssembler {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            groups: BTreeMap::new(),
        }
    }

    fn check_width(&self, origins: &[String]) -> Result<()> {
        if origins.len() != self.width {
            return Err(PowerError::Data(format!(
                "expected {} origins per row, got {} ({})",
                self.width,
                origins.len(),
                origins.join(", ")
            )));
        }
        Ok(())
    }

    /// Add an already-summed combination
    pub fn absorb(&mut self, partial: AggregatedScore) -> Result<()> {
        self.check_width(&partial.origins)?;
        *self.groups.entry(partial.origins).or_default() += partial.score;
        Ok(())
    }

    /// Weigh a single (combination, destination) row and add it
    pub fn absorb_row(&mut self, row: &SubsetResult, scorer: &WeightedScorer) -> Result<()> {
        self.check_width(&row.origins)?;
        let weighted = scorer.weigh_code(&row.destination, row.max_score)?;
        match self.groups.get_mut(&row.origins) {
            Some(total) => *total += weighted,
            None => {
                self.groups.insert(row.origins.clone(), weighted);
            }
        }
        Ok(())
    }

    pub fn absorb_all(&mut self, partials: impl IntoIterator<Item = AggregatedScore>) -> Result<()> {
        for partial in partials {
            self.absorb(partial)?;
        }
        Ok(())
    }

    /// Fold another assembler's sums into this one
    pub fn merge(&mut self, other: ReportAssembler) -> Result<()> {
        if other.width != self.width {
            return Err(PowerError::Data(format!(
                "cannot merge {}-origin sums into {}-origin sums",
                other.width, self.width
            )));
        }
        for (origins, score) in other.groups {
            *self.groups.entry(origins).or_default() += score;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Attach display names. Any origin code missing from the directory
    /// fails the whole report.
    pub fn finish(self, directory: &CountryDirectory) -> Result<Report> {
        let missing: BTreeSet<&String> = self
            .groups
            .keys()
            .flatten()
            .filter(|code| directory.name(code).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(PowerError::Lookup {
                what: "country name",
                codes: missing.into_iter().cloned().collect(),
            });
        }

        let rows: Vec<ReportRow> = self
            .groups
            .into_iter()
            .map(|(codes, score)| {
                let names = codes
                    .iter()
                    .map(|c| directory.name(c).unwrap_or_default().to_string())
                    .collect();
                ReportRow { codes, names, score }
            })
            .collect();

        debug!("Assembled {}-origin report", self.width);
        info!("Report: {} combinations", rows.len());

        Ok(Report {
            width: self.width,
            rows,
        })
    }
}
