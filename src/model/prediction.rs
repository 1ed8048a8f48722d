//! # Per-Classifier Prediction
//!
//! Scores every unordered target-type pair against a query genotype under a
//! classifier's haplotype pool, then exposes the three query modes: the
//! best-guess pair, the posterior of one named pair, and the full posterior
//! vector.
//!
//! The raw (pre-normalization) score total doubles as the classifier's
//! confidence weight when ensemble votes are averaged.

use std::sync::Arc;

use crate::data::{n_type_pairs, Genotype, HaplotypePool, TypePair};
use crate::model::kernel::LikelihoodKernel;

/// Scores type pairs for one classifier. Owns the triangular score buffer so
/// repeated queries reuse the allocation.
pub struct Predictor {
    kernel: Arc<LikelihoodKernel>,
    scores: Vec<f64>,
    last_total: f64,
}

impl Predictor {
    pub fn new(kernel: Arc<LikelihoodKernel>) -> Self {
        Self {
            kernel,
            scores: Vec::new(),
            last_total: 0.0,
        }
    }

    /// Pre-normalization score total of the most recent query; the
    /// classifier's confidence weight in ensemble votes.
    pub fn last_total(&self) -> f64 {
        self.last_total
    }

    /// Fill the triangular buffer with unnormalized pair scores and return
    /// their total. A query with no observed marker scores zero everywhere.
    fn fill_scores(&mut self, pool: &HaplotypePool, geno: &Genotype) -> f64 {
        let n_groups = pool.n_groups();
        self.scores.clear();
        self.scores.resize(n_type_pairs(n_groups), 0.0);
        self.last_total = 0.0;

        if geno.n_observed(pool.n_markers()) == 0 {
            return 0.0;
        }

        let mut total = 0.0;
        let mut idx = 0;
        for g1 in 0..n_groups {
            let a = pool.group(g1);
            let s = self.kernel.within_group_sum(geno, a);
            self.scores[idx] = s;
            total += s;
            idx += 1;
            for g2 in (g1 + 1)..n_groups {
                let s = self.kernel.cross_group_sum(geno, a, pool.group(g2));
                self.scores[idx] = s;
                total += s;
                idx += 1;
            }
        }
        self.last_total = total;
        total
    }

    /// Mode 1: the maximum-posterior pair with its posterior probability.
    /// Streams over the pairs without materializing the vector; ties resolve
    /// to the lowest pair index.
    ///
    /// `None` when the query carries no information at the classifier's
    /// markers (all missing, or every pair scores zero).
    pub fn best_guess(&mut self, pool: &HaplotypePool, geno: &Genotype) -> Option<(TypePair, f64)> {
        self.last_total = 0.0;
        if geno.n_observed(pool.n_markers()) == 0 {
            return None;
        }
        let n_groups = pool.n_groups();
        let mut total = 0.0;
        let mut best_score = 0.0;
        let mut best = None;
        for g1 in 0..n_groups {
            let a = pool.group(g1);
            for g2 in g1..n_groups {
                let s = if g1 == g2 {
                    self.kernel.within_group_sum(geno, a)
                } else {
                    self.kernel.cross_group_sum(geno, a, pool.group(g2))
                };
                total += s;
                if s > best_score {
                    best_score = s;
                    best = Some(TypePair::new(g1 as u16, g2 as u16));
                }
            }
        }
        if total <= 0.0 {
            return None;
        }
        self.last_total = total;
        best.map(|pair| (pair, best_score / total))
    }

    /// Mode 2: posterior probability of one named pair.
    pub fn pair_posterior(
        &mut self,
        pool: &HaplotypePool,
        geno: &Genotype,
        pair: TypePair,
    ) -> Option<f64> {
        let total = self.fill_scores(pool, geno);
        if total <= 0.0 {
            return None;
        }
        Some(self.scores[pair.pair_index(pool.n_groups())] / total)
    }

    /// Mode 3: the full normalized posterior vector plus the raw total used
    /// as this classifier's vote weight.
    pub fn posterior(&mut self, pool: &HaplotypePool, geno: &Genotype) -> Option<(&[f64], f64)> {
        let total = self.fill_scores(pool, geno);
        if total <= 0.0 {
            return None;
        }
        for s in &mut self.scores {
            *s /= total;
        }
        Some((&self.scores, total))
    }
}

/// Inverse of [`TypePair::pair_index`] for a pool of `n_types` groups.
pub fn pair_from_index(mut idx: usize, n_types: usize) -> TypePair {
    for a in 0..n_types {
        let row = n_types - a;
        if idx < row {
            return TypePair::new(a as u16, (a + idx) as u16);
        }
        idx -= row;
    }
    unreachable!("triangular index out of range");
}

/// Accumulates votes across classifiers for one query individual.
#[derive(Clone, Debug)]
pub struct VoteBox {
    sums: Vec<f64>,
    n_types: usize,
}

impl VoteBox {
    pub fn new(n_types: usize) -> Self {
        Self {
            sums: vec![0.0; n_type_pairs(n_types)],
            n_types,
        }
    }

    /// Average-posterior voting: add a classifier's normalized posterior
    /// scaled by its confidence weight.
    pub fn add_weighted(&mut self, posterior: &[f64], weight: f64) {
        debug_assert_eq!(posterior.len(), self.sums.len());
        for (s, p) in self.sums.iter_mut().zip(posterior) {
            *s += p * weight;
        }
    }

    /// Plurality voting: one full vote on the classifier's best-guess pair.
    pub fn add_plurality(&mut self, pair: TypePair) {
        self.sums[pair.pair_index(self.n_types)] += 1.0;
    }

    /// Normalize the accumulated sums into a posterior vector.
    /// Returns false when no classifier contributed a vote.
    pub fn normalize(&mut self) -> bool {
        let total: f64 = self.sums.iter().sum();
        if total <= 0.0 {
            return false;
        }
        for s in &mut self.sums {
            *s /= total;
        }
        true
    }

    pub fn sums(&self) -> &[f64] {
        &self.sums
    }

    /// The highest-scoring pair with its (normalized) share. Ties resolve to
    /// the lowest pair index.
    pub fn best(&self) -> Option<(TypePair, f64)> {
        let total: f64 = self.sums.iter().sum();
        if total <= 0.0 {
            return None;
        }
        let mut best_idx = 0;
        for (idx, &s) in self.sums.iter().enumerate() {
            if s > self.sums[best_idx] {
                best_idx = idx;
            }
        }
        Some((
            pair_from_index(best_idx, self.n_types),
            self.sums[best_idx] / total,
        ))
    }
}
