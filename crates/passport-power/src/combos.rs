//! Unordered k-subsets of origin indices
//!
//! Subsets are produced in lexicographic order of index, each exactly once.
//! The space can be walked whole with [`ComboSpace::iter`] or split by the
//! leading (smallest) index with [`ComboSpace::shard`]; concatenating the
//! shards in order reproduces [`ComboSpace::iter`].

use crate::{PowerError, Result};
use itertools::Itertools;
use std::ops::Range;

/// All k-subsets of `0..n`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComboSpace {
    n: usize,
    k: usize,
}

impl ComboSpace {
    pub fn new(n: usize, k: usize) -> Result<Self> {
        if k == 0 {
            return Err(PowerError::Configuration(
                "combination size must be at least 1".to_string(),
            ));
        }
        Ok(Self { n, k })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// C(n, k)
    pub fn len(&self) -> u64 {
        binomial(self.n, self.k)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fresh pass over every subset
    pub fn iter(&self) -> impl Iterator<Item = Vec<usize>> {
        (0..self.n).combinations(self.k)
    }

    /// Leading indices that own at least one subset
    pub fn shards(&self) -> Range<usize> {
        if self.n < self.k {
            0..0
        } else {
            0..(self.n - self.k + 1)
        }
    }

    /// Subsets whose smallest index is `lead`
    pub fn shard(&self, lead: usize) -> impl Iterator<Item = Vec<usize>> {
        let tail = (lead + 1)..self.n.max(lead + 1);
        tail.combinations(self.k - 1).map(move |rest| {
            let mut combo = Vec::with_capacity(rest.len() + 1);
            combo.push(lead);
            combo.extend(rest);
            combo
        })
    }
}

/// Binomial coefficient, saturating at `u64::MAX`
pub fn binomial(n: usize, k: usize) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut acc: u128 = 1;
    for i in 0..k {
        acc = acc * (n - i) as u128 / (i + 1) as u128;
    }
    u64::try_from(acc).unwrap_or(u64::MAX)
}
