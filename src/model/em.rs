//! # EM Haplotype-Frequency Estimator
//!
//! Estimates haplotype frequencies consistent with the observed marker
//! genotypes and the known target types of the in-bag individuals.
//!
//! Two-phase protocol, run once per candidate marker:
//! 1. [`EmEstimator::prepare_haplotypes`] doubles the current pool under the
//!    upcoming marker and enumerates, per in-bag individual, the haplotype
//!    pairs from the individual's known target-type groups that achieve the
//!    minimum Hamming distance to its genotype.
//! 2. [`EmEstimator::prepare_new_marker`] screens one candidate marker
//!    (rejecting monomorphic/uninformative ones), appends it to the genotype
//!    pool, seeds the doubled child frequencies from the in-bag allele
//!    frequency, and activates the child pair combinations consistent with
//!    each individual's call at the new marker.
//!
//! [`EmEstimator::run`] then iterates expectation/maximization until the
//! relative log-likelihood change drops below tolerance or the iteration cap
//! is reached. Hitting the cap is not an error: the last estimate stands and
//! a warning is emitted.

use std::sync::Arc;

use tracing::warn;

use crate::data::{GenotypePool, HaplotypePool, MarkerIdx, SnpMatrix};
use crate::model::kernel::{hamming_distance, LikelihoodKernel};

/// EM tuning parameters. Passed explicitly; never global state.
#[derive(Clone, Copy, Debug)]
pub struct EmConfig {
    /// Iteration cap; reaching it keeps the last estimate.
    pub max_iterations: usize,
    /// Relative log-likelihood convergence tolerance.
    pub rel_tol: f64,
}

impl Default for EmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            rel_tol: f64::EPSILON.sqrt(),
        }
    }
}

/// Result of one EM run.
#[derive(Clone, Copy, Debug)]
pub struct EmOutcome {
    /// Final in-bag log-likelihood.
    pub log_lik: f64,
    /// Iterations actually performed.
    pub iterations: usize,
    /// False when the iteration cap was reached before tolerance.
    pub converged: bool,
}

/// One candidate explanation of an individual: an unordered pair of
/// haplotype indices into the doubled pool.
#[derive(Clone, Copy, Debug)]
struct HaploPair {
    h1: u32,
    h2: u32,
    /// Compatible with the individual's call at the marker under trial.
    active: bool,
    /// Genotyping-error weight of this pair's Hamming distance.
    weight: f64,
    /// E-step scratch: this pair's share of the individual's likelihood.
    geno_freq: f64,
}

/// All compatible pairs for one in-bag individual.
#[derive(Clone, Debug)]
struct SamplePairs {
    sample: u32,
    multiplicity: f64,
    pairs: Vec<HaploPair>,
}

/// Expectation-Maximization over a doubled haplotype pool.
pub struct EmEstimator {
    config: EmConfig,
    kernel: Arc<LikelihoodKernel>,
    sample_pairs: Vec<SamplePairs>,
}

impl EmEstimator {
    pub fn new(config: EmConfig, kernel: Arc<LikelihoodKernel>) -> Self {
        Self {
            config,
            kernel,
            sample_pairs: Vec::new(),
        }
    }

    /// Phase 1: double `cur` under the upcoming marker and rebuild the
    /// per-individual minimum-distance pair lists against `cur`.
    ///
    /// Pair indices refer to the returned doubled pool: parent `i` becomes
    /// children `2i` (allele 0) and `2i+1` (allele 1); each parent pair
    /// expands to its child combinations, all active until
    /// [`Self::prepare_new_marker`] filters them.
    pub fn prepare_haplotypes(&mut self, cur: &HaplotypePool, genos: &GenotypePool) -> HaplotypePool {
        let next = cur.double();
        self.sample_pairs.clear();

        let mut parent_pairs: Vec<(u32, u32)> = Vec::new();
        for (sample, geno) in genos.iter().enumerate() {
            if geno.bootstrap == 0 {
                continue;
            }
            let Some(known) = geno.known else { continue };
            let (g1, g2) = (known.first() as usize, known.second() as usize);
            let start1 = cur.group_start(g1);
            let start2 = cur.group_start(g2);
            let n1 = cur.group_sizes()[g1] as usize;
            let n2 = cur.group_sizes()[g2] as usize;

            // scan for the minimum Hamming distance over the type-consistent
            // pairs, then keep exactly the pairs achieving it
            parent_pairs.clear();
            let mut min_dist = u32::MAX;
            let mut scan = |i: usize, j: usize| {
                let d = hamming_distance(geno, cur.get(i), cur.get(j));
                match d.cmp(&min_dist) {
                    std::cmp::Ordering::Less => {
                        min_dist = d;
                        parent_pairs.clear();
                        parent_pairs.push((i as u32, j as u32));
                    }
                    std::cmp::Ordering::Equal => parent_pairs.push((i as u32, j as u32)),
                    std::cmp::Ordering::Greater => {}
                }
            };
            if g1 == g2 {
                for a in 0..n1 {
                    for b in a..n1 {
                        scan(start1 + a, start1 + b);
                    }
                }
            } else {
                for a in 0..n1 {
                    for b in 0..n2 {
                        scan(start1 + a, start2 + b);
                    }
                }
            }

            let weight = self.kernel.weight(min_dist);
            let mut pairs = Vec::with_capacity(parent_pairs.len() * 4);
            for &(i, j) in &parent_pairs {
                let (z1, o1) = (2 * i, 2 * i + 1);
                let (z2, o2) = (2 * j, 2 * j + 1);
                if i == j {
                    // unordered child combinations of a self-pair
                    pairs.push(HaploPair::new(z1, z2, weight));
                    pairs.push(HaploPair::new(z1, o2, weight));
                    pairs.push(HaploPair::new(o1, o2, weight));
                } else {
                    pairs.push(HaploPair::new(z1, z2, weight));
                    pairs.push(HaploPair::new(z1, o2, weight));
                    pairs.push(HaploPair::new(o1, z2, weight));
                    pairs.push(HaploPair::new(o1, o2, weight));
                }
            }
            self.sample_pairs.push(SamplePairs {
                sample: sample as u32,
                multiplicity: f64::from(geno.bootstrap),
                pairs,
            });
        }
        next
    }

    /// Phase 2 entry: screen `marker`, append it to the genotype pool, seed
    /// the doubled child frequencies, and set pair-compatibility flags.
    ///
    /// Returns `false` when the marker is uninformative for the in-bag
    /// individuals (monomorphic or entirely missing); the genotype pool is
    /// left untouched in that case and the caller must reject the marker.
    pub fn prepare_new_marker(
        &mut self,
        marker: MarkerIdx,
        cur: &HaplotypePool,
        matrix: &SnpMatrix,
        genos: &mut GenotypePool,
        next: &mut HaplotypePool,
    ) -> bool {
        // in-bag allele frequency of the candidate
        let mut allele_cnt = 0u64;
        let mut valid_cnt = 0u64;
        for (sample, geno) in genos.iter().enumerate() {
            if geno.bootstrap == 0 {
                continue;
            }
            let g = matrix.get(sample, marker.as_usize());
            if (0..=2).contains(&g) {
                allele_cnt += u64::from(geno.bootstrap) * g as u64;
                valid_cnt += u64::from(geno.bootstrap) * 2;
            }
        }
        if valid_cnt == 0 || allele_cnt == 0 || allele_cnt == valid_cnt {
            return false;
        }
        let af = allele_cnt as f64 / valid_cnt as f64;

        genos.add_marker(marker, matrix);
        next.init_child_freq(cur, af);

        let new_idx = next.n_markers() - 1;
        for sp in &mut self.sample_pairs {
            let call = genos.get(sp.sample as usize).genotype(new_idx);
            match call {
                None => {
                    for p in &mut sp.pairs {
                        p.active = true;
                    }
                }
                Some(g) => {
                    for p in &mut sp.pairs {
                        // child parity encodes the new-marker allele
                        let a = (p.h1 & 1) as u8;
                        let b = (p.h2 & 1) as u8;
                        p.active = match g {
                            0 => a == 0 && b == 0,
                            2 => a == 1 && b == 1,
                            _ => a != b,
                        };
                    }
                }
            }
        }
        true
    }

    /// Iterate EM on the prepared doubled pool until convergence or cap.
    pub fn run(&mut self, next: &mut HaplotypePool) -> EmOutcome {
        let total_mult: f64 = self.sample_pairs.iter().map(|sp| sp.multiplicity).sum();
        debug_assert!(total_mult > 0.0);

        let mut log_lik = f64::NEG_INFINITY;
        let mut tol = 0.0;
        let mut iterations = 0;
        let mut converged = false;

        for iter in 0..self.config.max_iterations {
            iterations = iter + 1;
            let prev_log_lik = log_lik;
            next.save_clear_freq();

            log_lik = 0.0;
            for sp in &mut self.sample_pairs {
                // E-step: responsibilities over this individual's pairs
                let mut psum = 0.0;
                for p in &mut sp.pairs {
                    if p.active {
                        let het = if p.h1 != p.h2 { 2.0 } else { 1.0 };
                        p.geno_freq = het
                            * next.saved_freq(p.h1 as usize)
                            * next.saved_freq(p.h2 as usize)
                            * p.weight;
                        psum += p.geno_freq;
                    }
                }
                let psum = psum.max(f64::MIN_POSITIVE);
                log_lik += sp.multiplicity * psum.ln();

                // M-step accumulation, weighted by bootstrap multiplicity
                let scale = sp.multiplicity / psum;
                for p in &sp.pairs {
                    if p.active {
                        let r = p.geno_freq * scale;
                        next.add_freq(p.h1 as usize, r);
                        next.add_freq(p.h2 as usize, r);
                    }
                }
            }
            next.scale_freq(0.5 / total_mult);

            if iter == 0 {
                tol = self.config.rel_tol * (log_lik.abs() + self.config.rel_tol);
            } else if (log_lik - prev_log_lik).abs() <= tol {
                converged = true;
                break;
            }
        }

        if !converged {
            warn!(
                iterations,
                log_lik, "EM reached the iteration cap before converging; keeping last estimate"
            );
        }
        EmOutcome {
            log_lik,
            iterations,
            converged,
        }
    }
}

impl HaploPair {
    fn new(h1: u32, h2: u32, weight: f64) -> Self {
        Self {
            h1,
            h2,
            active: true,
            weight,
            geno_freq: 0.0,
        }
    }
}
