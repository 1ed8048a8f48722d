//! # Likelihood Kernel
//!
//! The Hamming-distance primitive every probability in this crate is built
//! on, the genotyping-error weight table, and the execution strategy for the
//! pairwise likelihood sums.
//!
//! ## Hamming distance
//! For a genotype with packed planes `(s1, s2, m)` (allele-1 bits, allele-2
//! bits, observed mask) and an unordered haplotype pair `(h1, h2)`, per word:
//!
//! ```text
//! mask = ((h1 ^ s2) | (h2 ^ s1)) & m
//! dist = popcount((h1 ^ s1) & mask) + popcount((h2 ^ s2) & mask)
//! ```
//!
//! The count is symmetric in `(h1, h2)`, missing markers never contribute,
//! and an exact match yields 0. Every execution strategy computes this exact
//! count; strategies may only differ in floating-point summation order.
//!
//! ## Error model
//! A mismatch at `d` marker positions down-weights a haplotype pair by
//! `decay^d`: genotyping errors are tolerated but penalized exponentially,
//! so an exact-match pair dominates whenever one exists. The decay constant
//! is an empirically calibrated parameter, not a derived quantity.

use std::sync::OnceLock;

use wide::f64x4;

use crate::data::packed::{MAX_MARKERS, PLANE_WORDS};
use crate::data::{Genotype, Haplotype};

/// Count of active-marker positions where the unordered pair `(h1, h2)`
/// disagrees with the genotype's two alleles, missing markers excluded.
#[inline]
pub fn hamming_distance(geno: &Genotype, h1: &Haplotype, h2: &Haplotype) -> u32 {
    let s1 = geno.allele1_words();
    let s2 = geno.allele2_words();
    let m = geno.observed_words();
    let a = h1.allele_words();
    let b = h2.allele_words();
    let mut dist = 0u32;
    for w in 0..PLANE_WORDS {
        let mask = ((a[w] ^ s2[w]) | (b[w] ^ s1[w])) & m[w];
        dist += ((a[w] ^ s1[w]) & mask).count_ones() + ((b[w] ^ s2[w]) & mask).count_ones();
    }
    dist
}

/// Precomputed `decay^d` table for Hamming distances up to two full planes.
#[derive(Clone, Debug)]
pub struct ErrorWeights {
    decay: f64,
    table: Vec<f64>,
}

impl ErrorWeights {
    pub fn new(decay: f64) -> Self {
        debug_assert!(decay > 0.0 && decay < 1.0);
        let mut table = Vec::with_capacity(2 * MAX_MARKERS + 1);
        let mut w = 1.0;
        for _ in 0..=2 * MAX_MARKERS {
            table.push(w);
            w *= decay;
        }
        Self { decay, table }
    }

    #[inline]
    pub fn decay(&self) -> f64 {
        self.decay
    }

    #[inline]
    pub fn weight(&self, dist: u32) -> f64 {
        self.table[dist as usize]
    }
}

/// How the pairwise likelihood sums are executed. Chosen once at startup;
/// never re-probed per call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Reference implementation, one pair at a time.
    Scalar,
    /// Batched accumulation, four pairs per step via `wide::f64x4`.
    Vector,
}

impl Strategy {
    /// The process-wide strategy. Probes CPU capability on first call and
    /// memoizes; every later call returns the cached answer.
    pub fn detect() -> Self {
        static DETECTED: OnceLock<Strategy> = OnceLock::new();
        *DETECTED.get_or_init(Self::probe)
    }

    fn probe() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            if std::arch::is_x86_feature_detected!("avx2") {
                return Strategy::Vector;
            }
        }
        Strategy::Scalar
    }
}

/// The shared inner loop of EM screening and prediction: error-weighted
/// frequency sums over haplotype pairs.
#[derive(Clone, Debug)]
pub struct LikelihoodKernel {
    strategy: Strategy,
    weights: ErrorWeights,
}

impl LikelihoodKernel {
    pub fn new(strategy: Strategy, decay: f64) -> Self {
        Self {
            strategy,
            weights: ErrorWeights::new(decay),
        }
    }

    #[inline]
    pub fn weight(&self, dist: u32) -> f64 {
        self.weights.weight(dist)
    }

    #[inline]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    #[inline]
    pub fn decay(&self) -> f64 {
        self.weights.decay()
    }

    /// `factor * sum over h in row of freq(h) * w(dist(geno, anchor, h))`.
    fn row_sum(&self, geno: &Genotype, anchor: &Haplotype, row: &[Haplotype], factor: f64) -> f64 {
        let sum = match self.strategy {
            Strategy::Scalar => row
                .iter()
                .map(|h| h.freq * self.weights.weight(hamming_distance(geno, anchor, h)))
                .sum(),
            Strategy::Vector => {
                let mut acc = f64x4::splat(0.0);
                let mut chunks = row.chunks_exact(4);
                for chunk in &mut chunks {
                    let w = [
                        self.weights.weight(hamming_distance(geno, anchor, &chunk[0])),
                        self.weights.weight(hamming_distance(geno, anchor, &chunk[1])),
                        self.weights.weight(hamming_distance(geno, anchor, &chunk[2])),
                        self.weights.weight(hamming_distance(geno, anchor, &chunk[3])),
                    ];
                    let f = [chunk[0].freq, chunk[1].freq, chunk[2].freq, chunk[3].freq];
                    acc += f64x4::from(w) * f64x4::from(f);
                }
                let mut sum = acc.reduce_add();
                for h in chunks.remainder() {
                    sum += h.freq * self.weights.weight(hamming_distance(geno, anchor, h));
                }
                sum
            }
        };
        factor * sum
    }

    /// Likelihood mass of a genotype over all ordered-once pairs from two
    /// disjoint groups: `sum 2 * f_i * f_j * w(dist)`.
    pub fn cross_group_sum(&self, geno: &Genotype, a: &[Haplotype], b: &[Haplotype]) -> f64 {
        let mut sum = 0.0;
        for h in a {
            sum += self.row_sum(geno, h, b, 2.0 * h.freq);
        }
        sum
    }

    /// Likelihood mass over unordered pairs within one group; self-pairs
    /// contribute `f_i^2` once, distinct pairs `2 * f_i * f_j`.
    pub fn within_group_sum(&self, geno: &Genotype, group: &[Haplotype]) -> f64 {
        let mut sum = 0.0;
        for (i, h) in group.iter().enumerate() {
            sum += h.freq * h.freq * self.weights.weight(hamming_distance(geno, h, h));
            sum += self.row_sum(geno, h, &group[i + 1..], 2.0 * h.freq);
        }
        sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MISSING;

    fn hap(alleles: &str) -> Haplotype {
        Haplotype::from_allele_string(alleles, 0.25, 0)
    }

    fn geno(values: &[i8]) -> Genotype {
        let mut g = Genotype::new();
        for (i, &v) in values.iter().enumerate() {
            g.set_genotype(i, v);
        }
        g
    }

    #[test]
    fn test_exact_match_distance_zero() {
        // genotype 0/1/2/1 is explained exactly by 0010 + 0111
        let g = geno(&[0, 1, 2, 1]);
        assert_eq!(hamming_distance(&g, &hap("0010"), &hap("0111")), 0);
    }

    #[test]
    fn test_distance_symmetry() {
        let g = geno(&[0, 1, 2, 1, 0, 2]);
        let h1 = hap("011010");
        let h2 = hap("110101");
        assert_eq!(
            hamming_distance(&g, &h1, &h2),
            hamming_distance(&g, &h2, &h1)
        );
    }

    #[test]
    fn test_missing_markers_excluded() {
        let g_full = geno(&[0, 0, 0, 0]);
        let g_holes = geno(&[0, MISSING, 0, MISSING]);
        let ones = hap("1111");
        let zeros = hap("0000");
        assert_eq!(hamming_distance(&g_full, &ones, &ones), 8);
        assert_eq!(hamming_distance(&g_holes, &ones, &ones), 4);
        assert_eq!(hamming_distance(&g_holes, &zeros, &zeros), 0);
        // entirely missing genotype: nothing to count
        let g_empty = geno(&[MISSING, MISSING, MISSING, MISSING]);
        assert_eq!(hamming_distance(&g_empty, &ones, &zeros), 0);
    }

    #[test]
    fn test_het_genotype_counts() {
        // genotype 1 against (0,0) or (1,1) is one mismatch, (0,1) none
        let g = geno(&[1]);
        assert_eq!(hamming_distance(&g, &hap("0"), &hap("0")), 1);
        assert_eq!(hamming_distance(&g, &hap("1"), &hap("1")), 1);
        assert_eq!(hamming_distance(&g, &hap("0"), &hap("1")), 0);
    }

    #[test]
    fn test_error_weights_decay() {
        let w = ErrorWeights::new(0.1);
        assert_eq!(w.weight(0), 1.0);
        assert!((w.weight(1) - 0.1).abs() < 1e-15);
        assert!((w.weight(3) - 1e-3).abs() < 1e-15);
        assert!(w.weight(2 * MAX_MARKERS as u32) >= 0.0);
    }

    #[test]
    fn test_detect_is_memoized() {
        // repeated calls return the single process-wide probe result,
        // including from other threads
        let first = Strategy::detect();
        assert_eq!(first, Strategy::detect());
        let from_thread = std::thread::spawn(Strategy::detect).join().unwrap();
        assert_eq!(first, from_thread);
    }

    #[test]
    fn test_strategies_agree() {
        let scalar = LikelihoodKernel::new(Strategy::Scalar, 1e-5);
        let vector = LikelihoodKernel::new(Strategy::Vector, 1e-5);
        let g = geno(&[0, 1, 2, MISSING, 1, 0, 2, 1, 1]);
        let group: Vec<Haplotype> = [
            "001101101",
            "010110110",
            "011011011",
            "000000000",
            "111111111",
            "010101010",
        ]
        .iter()
        .enumerate()
        .map(|(i, s)| Haplotype::from_allele_string(s, 0.1 + 0.02 * i as f64, 0))
        .collect();
        let other: Vec<Haplotype> = group.iter().rev().cloned().collect();

        let s1 = scalar.within_group_sum(&g, &group);
        let v1 = vector.within_group_sum(&g, &group);
        assert!((s1 - v1).abs() <= 1e-12 * s1.abs().max(1.0));

        let s2 = scalar.cross_group_sum(&g, &group, &other);
        let v2 = vector.cross_group_sum(&g, &group, &other);
        assert!((s2 - v2).abs() <= 1e-12 * s2.abs().max(1.0));
    }
}
