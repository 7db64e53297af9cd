//! Combined reach of passport subsets
//!
//! For every unordered k-subset of origins and every destination, the
//! subset's score is the best admissibility any member achieves:
//!
//! ```text
//! maxScore(S, d) = max_{o ∈ S, (d, o) present} admissibility(d, o)
//! ```
//!
//! Rows are never materialized for the whole subset space. Aggregation folds
//! each subset's destinations into one [`AggregatedScore`] on a rayon worker;
//! row export streams subsets one at a time.

use crate::combos::ComboSpace;
use crate::encoder::{Admissibility, ReachEncoder};
use crate::report::AggregatedScore;
use crate::{DestinationJoin, LongTable, PowerError, Result, WeightedScore, WeightedScorer};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Number of passports held together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arity {
    Dual,
    Triad,
}

impl Arity {
    pub fn k(&self) -> usize {
        match self {
            Arity::Dual => 2,
            Arity::Triad => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Arity::Dual => "Dual",
            Arity::Triad => "Triad",
        }
    }
}

impl TryFrom<usize> for Arity {
    type Error = PowerError;

    fn try_from(k: usize) -> Result<Self> {
        match k {
            2 => Ok(Arity::Dual),
            3 => Ok(Arity::Triad),
            other => Err(PowerError::Configuration(format!(
                "subset size must be 2 or 3, got {}",
                other
            ))),
        }
    }
}

/// Shared stop flag for long enumerations
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(PowerError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// One (subset, destination) row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsetResult {
    pub destination: String,
    pub origins: Vec<String>,
    pub max_score: Admissibility,
}

/// Dense origin × destination admissibility grid built from a long table
#[derive(Debug, Clone)]
pub struct SubsetReachEngine {
    origins: Vec<String>,
    destinations: Vec<String>,
    /// `grid[origin * destinations.len() + destination]`; `None` where the
    /// long table has no row
    grid: Vec<Option<Admissibility>>,
    join: DestinationJoin,
}

impl SubsetReachEngine {
    pub fn new(table: &LongTable, join: DestinationJoin) -> Result<Self> {
        if table.is_empty() {
            return Err(PowerError::Data("long table is empty".to_string()));
        }

        let origins = table.origins();
        let destinations = table.destinations();
        let origin_index: HashMap<&str, usize> =
            origins.iter().enumerate().map(|(i, c)| (c.as_str(), i)).collect();
        let destination_index: HashMap<&str, usize> =
            destinations.iter().enumerate().map(|(i, c)| (c.as_str(), i)).collect();

        let width = destinations.len();
        let mut grid = vec![None; origins.len() * width];
        for entry in table.entries() {
            let o = origin_index[entry.origin.as_str()];
            let d = destination_index[entry.destination.as_str()];
            grid[o * width + d] = Some(ReachEncoder::encode(entry.requirement));
        }

        info!(
            "Reach grid: {} origins × {} destinations ({:?} join)",
            origins.len(),
            destinations.len(),
            join
        );

        Ok(Self {
            origins,
            destinations,
            grid,
            join,
        })
    }

    pub fn origins(&self) -> &[String] {
        &self.origins
    }

    pub fn destinations(&self) -> &[String] {
        &self.destinations
    }

    pub fn join(&self) -> DestinationJoin {
        self.join
    }

    /// C(n, k) for this engine's origins
    pub fn combination_count(&self, arity: Arity) -> u64 {
        crate::combos::binomial(self.origins.len(), arity.k())
    }

    fn cell(&self, origin: usize, destination: usize) -> Option<Admissibility> {
        self.grid[origin * self.destinations.len() + destination]
    }

    /// maxScore for one subset at one destination; `None` drops the row
    fn max_score(&self, combo: &[usize], destination: usize) -> Option<Admissibility> {
        if self.join == DestinationJoin::LeadingOrigin {
            self.cell(*combo.first()?, destination)?;
        }
        combo.iter().filter_map(|&o| self.cell(o, destination)).max()
    }

    /// (destination index, maxScore) for every destination the subset is scored on
    fn combo_scores<'a>(&'a self, combo: &'a [usize]) -> impl Iterator<Item = (usize, Admissibility)> + 'a {
        (0..self.destinations.len()).filter_map(move |d| self.max_score(combo, d).map(|s| (d, s)))
    }

    fn score_combo(&self, combo: &[usize], scorer: &WeightedScorer) -> AggregatedScore {
        let score = self
            .combo_scores(combo)
            .fold(WeightedScore::default(), |acc, (d, s)| acc + scorer.weigh(d, s));
        AggregatedScore {
            origins: combo.iter().map(|&o| self.origins[o].clone()).collect(),
            score,
        }
    }

    fn aggregate_k(&self, k: usize, scorer: &WeightedScorer, cancel: &CancelToken) -> Result<Vec<AggregatedScore>> {
        if scorer.destinations() != self.destinations.as_slice() {
            return Err(PowerError::Configuration(
                "scorer was resolved for a different destination list".to_string(),
            ));
        }

        let space = ComboSpace::new(self.origins.len(), k)?;
        info!("Scoring {} combinations of {} passports", space.len(), k);
        let started = Instant::now();

        let scored = space
            .shards()
            .into_par_iter()
            .flat_map_iter(|lead| space.shard(lead))
            .map(|combo| {
                cancel.check()?;
                Ok(self.score_combo(&combo, scorer))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "Scored {} combinations in {:.2?}",
            scored.len(),
            started.elapsed()
        );

        Ok(scored)
    }

    /// Reach of each origin on its own
    pub fn aggregate_single(&self, scorer: &WeightedScorer, cancel: &CancelToken) -> Result<Vec<AggregatedScore>> {
        self.aggregate_k(1, scorer, cancel)
    }

    /// Summed reach and weighted reach for every subset of the given arity,
    /// in subset enumeration order
    pub fn aggregate(&self, arity: Arity, scorer: &WeightedScorer, cancel: &CancelToken) -> Result<Vec<AggregatedScore>> {
        self.aggregate_k(arity.k(), scorer, cancel)
    }

    /// Stream every (subset, destination) row to `sink`, subset-major.
    ///
    /// Returns the number of rows emitted.
    pub fn for_each_subset_row<F>(&self, arity: Arity, cancel: &CancelToken, mut sink: F) -> Result<u64>
    where
        F: FnMut(&[&str], &str, Admissibility) -> Result<()>,
    {
        let space = ComboSpace::new(self.origins.len(), arity.k())?;
        let mut rows = 0u64;

        for combo in space.iter() {
            cancel.check()?;
            let codes: Vec<&str> = combo.iter().map(|&o| self.origins[o].as_str()).collect();
            for (d, score) in self.combo_scores(&combo) {
                sink(&codes, &self.destinations[d], score)?;
                rows += 1;
            }
        }

        Ok(rows)
    }

    /// Owned rows for every subset of the given arity, lazily
    pub fn subset_rows(&self, arity: Arity) -> Result<impl Iterator<Item = SubsetResult> + '_> {
        let space = ComboSpace::new(self.origins.len(), arity.k())?;
        Ok(space.iter().flat_map(move |combo| {
            let origins: Vec<String> = combo.iter().map(|&o| self.origins[o].clone()).collect();
            (0..self.destinations.len())
                .filter_map(|d| self.max_score(&combo, d).map(|s| (d, s)))
                .map(|(d, max_score)| SubsetResult {
                    destination: self.destinations[d].clone(),
                    origins: origins.clone(),
                    max_score,
                })
                .collect::<Vec<_>>()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CountryMetrics, LongEntry, MetricLookup, RequirementLevel::*};

    /// AR, AL, AM with AR → AL visa free, AR → AM visa required,
    /// AL → AR visa required, AL → AM visa free
    fn sample_table() -> LongTable {
        LongTable::from_entries(vec![
            LongEntry::new("AL", "AR", VisaFree),
            LongEntry::new("AM", "AR", VisaRequired),
            LongEntry::new("AR", "AL", VisaRequired),
            LongEntry::new("AM", "AL", VisaFree),
            LongEntry::new("AL", "AL", SameCountry),
        ])
        .unwrap()
    }

    fn unit_scorer(engine: &SubsetReachEngine) -> WeightedScorer {
        let lookup = MetricLookup::from_codes(
            engine
                .destinations()
                .iter()
                .map(|c| (c.clone(), CountryMetrics::new(1.0, 1.0, 1.0))),
        );
        WeightedScorer::new(engine.destinations(), &lookup).unwrap()
    }

    #[test]
    fn test_pair_reach() {
        let engine = SubsetReachEngine::new(&sample_table(), DestinationJoin::Union).unwrap();
        let rows: Vec<_> = engine.subset_rows(Arity::Dual).unwrap().collect();

        let al = rows.iter().find(|r| r.destination == "AL").unwrap();
        assert_eq!(al.origins, vec!["AL", "AR"]);
        assert_eq!(al.max_score, 1);
        let am = rows.iter().find(|r| r.destination == "AM").unwrap();
        assert_eq!(am.max_score, 1);

        let scored = engine.aggregate(Arity::Dual, &unit_scorer(&engine), &CancelToken::new()).unwrap();
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].score.reach, 2);
    }

    #[test]
    fn test_union_vs_leading_origin_join() {
        // AL has no row for XX; AR does
        let table = LongTable::from_entries(vec![
            LongEntry::new("XX", "AR", VisaFree),
            LongEntry::new("AR", "AL", VisaFree),
        ])
        .unwrap();

        let union = SubsetReachEngine::new(&table, DestinationJoin::Union).unwrap();
        let rows: Vec<_> = union.subset_rows(Arity::Dual).unwrap().collect();
        assert_eq!(rows.len(), 2);

        // AL sorts first, so it leads and XX is dropped
        let leading = SubsetReachEngine::new(&table, DestinationJoin::LeadingOrigin).unwrap();
        let rows: Vec<_> = leading.subset_rows(Arity::Dual).unwrap().collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].destination, "AR");
    }

    #[test]
    fn test_missing_member_row_is_not_visa_required() {
        // AL has no row for AM; AR's visa-free row must carry the destination
        let table = LongTable::from_entries(vec![
            LongEntry::new("AM", "AR", VisaFree),
            LongEntry::new("AM", "AL", VisaRequired),
            LongEntry::new("AL", "AR", VisaRequired),
        ])
        .unwrap();
        let engine = SubsetReachEngine::new(&table, DestinationJoin::Union).unwrap();
        let rows: Vec<_> = engine.subset_rows(Arity::Dual).unwrap().collect();

        let am = rows.iter().find(|r| r.destination == "AM").unwrap();
        assert_eq!(am.max_score, 1);
        let al = rows.iter().find(|r| r.destination == "AL").unwrap();
        assert_eq!(al.max_score, 0);
    }

    #[test]
    fn test_empty_table_is_data_error() {
        let err = SubsetReachEngine::new(&LongTable::default(), DestinationJoin::Union).unwrap_err();
        assert!(matches!(err, PowerError::Data(_)));
    }

    #[test]
    fn test_arity_bounds() {
        assert_eq!(Arity::try_from(2).unwrap(), Arity::Dual);
        assert_eq!(Arity::try_from(3).unwrap(), Arity::Triad);
        for k in [0, 1, 4] {
            assert!(matches!(Arity::try_from(k), Err(PowerError::Configuration(_))));
        }
    }

    #[test]
    fn test_single_reach() {
        let engine = SubsetReachEngine::new(&sample_table(), DestinationJoin::Union).unwrap();
        let scored = engine.aggregate_single(&unit_scorer(&engine), &CancelToken::new()).unwrap();

        assert_eq!(scored.len(), 2);
        assert_eq!(scored[0].origins, vec!["AL"]);
        assert_eq!(scored[0].score.reach, 2); // AL itself, AM
        assert_eq!(scored[1].origins, vec!["AR"]);
        assert_eq!(scored[1].score.reach, 1); // AL
    }

    #[test]
    fn test_cancelled_run_fails() {
        let engine = SubsetReachEngine::new(&sample_table(), DestinationJoin::Union).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = engine.aggregate(Arity::Dual, &unit_scorer(&engine), &cancel).unwrap_err();
        assert!(matches!(err, PowerError::Cancelled));
        let err = engine.for_each_subset_row(Arity::Dual, &cancel, |_, _, _| Ok(())).unwrap_err();
        assert!(matches!(err, PowerError::Cancelled));
    }

    #[test]
    fn test_streamed_rows_match_lazy_rows() {
        let engine = SubsetReachEngine::new(&sample_table(), DestinationJoin::Union).unwrap();
        let mut streamed = Vec::new();
        let count = engine
            .for_each_subset_row(Arity::Dual, &CancelToken::new(), |origins, dest, score| {
                streamed.push((origins.join("+"), dest.to_string(), score));
                Ok(())
            })
            .unwrap();

        let lazy: Vec<_> = engine
            .subset_rows(Arity::Dual)
            .unwrap()
            .map(|r| (r.origins.join("+"), r.destination, r.max_score))
            .collect();
        assert_eq!(count as usize, lazy.len());
        assert_eq!(streamed, lazy);
    }

    #[test]
    fn test_scorer_for_other_destinations_rejected() {
        let engine = SubsetReachEngine::new(&sample_table(), DestinationJoin::Union).unwrap();
        let lookup = MetricLookup::from_codes(vec![("AL".to_string(), CountryMetrics::new(1.0, 1.0, 1.0))]);
        let scorer = WeightedScorer::new(&["AL".to_string()], &lookup).unwrap();

        assert!(matches!(
            engine.aggregate(Arity::Dual, &scorer, &CancelToken::new()),
            Err(PowerError::Configuration(_))
        ));
    }
}

#[cfg(test)]
mod fuzz_tests {
    use super::*;
    use crate::combos::binomial;
    use crate::{CountryMetrics, LongEntry, MetricLookup, RequirementLevel};
    use proptest::prelude::*;
    use std::collections::HashMap;

    // Sparse n × n requirement grids; None leaves the cell out of the long table
    fn table_strategy() -> impl Strategy<Value = LongTable> {
        (3usize..7)
            .prop_flat_map(|n| {
                (
                    Just(n),
                    proptest::collection::vec(proptest::option::weighted(0.9, 0usize..5), n * n),
                )
            })
            .prop_map(|(n, cells)| {
                let code = |i: usize| format!("C{}", i);
                let entries = cells
                    .into_iter()
                    .enumerate()
                    .filter_map(|(i, cell)| {
                        cell.map(|level| LongEntry::new(code(i / n), code(i % n), RequirementLevel::ALL[level]))
                    })
                    .collect();
                LongTable::from_entries(entries).unwrap()
            })
            .prop_filter("needs at least three origins", |t| t.origins().len() >= 3)
    }

    fn unit_scorer(engine: &SubsetReachEngine) -> WeightedScorer {
        let lookup = MetricLookup::from_codes(
            engine
                .destinations()
                .iter()
                .map(|c| (c.clone(), CountryMetrics::new(1.0, 1.0, 1.0))),
        );
        WeightedScorer::new(engine.destinations(), &lookup).unwrap()
    }

    fn by_key(rows: impl Iterator<Item = SubsetResult>) -> HashMap<(Vec<String>, String), Admissibility> {
        rows.map(|r| ((r.origins, r.destination), r.max_score)).collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        // One aggregate per unordered pair, scores binary
        #[test]
        fn fuzz_pair_count_and_binary_scores(table in table_strategy()) {
            let engine = SubsetReachEngine::new(&table, DestinationJoin::Union).unwrap();
            let n = engine.origins().len();

            let scored = engine.aggregate(Arity::Dual, &unit_scorer(&engine), &CancelToken::new()).unwrap();
            prop_assert_eq!(scored.len() as u64, binomial(n, 2));

            for row in engine.subset_rows(Arity::Dual).unwrap() {
                prop_assert!(row.max_score <= 1);
            }
        }

        // Adding a third passport never lowers a shared destination's score
        #[test]
        fn fuzz_triad_dominates_pair(table in table_strategy()) {
            let engine = SubsetReachEngine::new(&table, DestinationJoin::Union).unwrap();
            let pairs = by_key(engine.subset_rows(Arity::Dual).unwrap());

            for triad in engine.subset_rows(Arity::Triad).unwrap() {
                let o = &triad.origins;
                for pair in [[0, 1], [0, 2], [1, 2]] {
                    let key = (vec![o[pair[0]].clone(), o[pair[1]].clone()], triad.destination.clone());
                    if let Some(&pair_score) = pairs.get(&key) {
                        prop_assert!(triad.max_score >= pair_score);
                    }
                }
            }
        }

        // Pair reach = destinations where either member is admitted
        #[test]
        fn fuzz_pair_reach_is_union_count(table in table_strategy()) {
            let engine = SubsetReachEngine::new(&table, DestinationJoin::Union).unwrap();
            let admitted: HashMap<(String, String), Admissibility> = table
                .entries()
                .iter()
                .map(|e| ((e.origin.clone(), e.destination.clone()), ReachEncoder::encode(e.requirement)))
                .collect();

            let scored = engine.aggregate(Arity::Dual, &unit_scorer(&engine), &CancelToken::new()).unwrap();
            for agg in scored {
                let expected = engine
                    .destinations()
                    .iter()
                    .filter(|d| {
                        agg.origins
                            .iter()
                            .any(|o| admitted.get(&(o.clone(), d.to_string())) == Some(&1))
                    })
                    .count() as u64;
                prop_assert_eq!(agg.score.reach, expected);
            }
        }

        // Parallel aggregation agrees with summing the streamed rows
        #[test]
        fn fuzz_aggregate_matches_row_stream(table in table_strategy()) {
            let engine = SubsetReachEngine::new(&table, DestinationJoin::LeadingOrigin).unwrap();
            let scorer = unit_scorer(&engine);

            let mut streamed: Vec<(Vec<String>, u64)> = Vec::new();
            engine
                .for_each_subset_row(Arity::Triad, &CancelToken::new(), |origins, _, score| {
                    let key: Vec<String> = origins.iter().map(|s| s.to_string()).collect();
                    match streamed.last_mut() {
                        Some((last, total)) if *last == key => *total += u64::from(score),
                        _ => streamed.push((key, u64::from(score))),
                    }
                    Ok(())
                })
                .unwrap();

            let scored = engine.aggregate(Arity::Triad, &scorer, &CancelToken::new()).unwrap();
            let nonempty: Vec<(Vec<String>, u64)> = scored
                .into_iter()
                .filter(|a| streamed.iter().any(|(k, _)| *k == a.origins))
                .map(|a| (a.origins, a.score.reach))
                .collect();
            prop_assert_eq!(nonempty, streamed);
        }
    }
}
