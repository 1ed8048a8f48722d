//! # Greedy Marker Selection
//!
//! Grows one classifier from a bootstrap resample: each round draws `mtry`
//! candidate markers, fits haplotype frequencies with EM for each candidate,
//! and commits the candidate with the best out-of-bag accuracy (ties broken
//! by in-bag loss). With pruning on, a round whose winner does not beat the
//! global (accuracy, loss) pair commits nothing, and growth stops after
//! `patience` such rounds in a row; with pruning off every round winner is
//! committed and growth runs until the candidate pool empties or the marker
//! cap is hit.

use std::sync::Arc;

use rand::Rng;
use tracing::debug;

use crate::data::{
    GenotypePool, HaplotypePool, MarkerIdx, SnpMatrix, TypePair, MAX_MARKERS,
};
use crate::model::em::{EmConfig, EmEstimator};
use crate::model::kernel::LikelihoodKernel;
use crate::model::prediction::Predictor;
use crate::model::sampling::MarkerSampler;

/// Fraction of a single haplotype's mass below which a frequency is folded
/// away after each commit.
const RARE_FRACTION: f64 = 0.1;

/// Growth parameters for a single classifier.
#[derive(Clone, Copy, Debug)]
pub struct SelectorConfig {
    /// Candidates drawn per round; `None` means `sqrt(n_markers)`.
    pub mtry: Option<usize>,
    /// Hard cap on committed markers, clamped to the packed-plane capacity.
    pub max_markers: usize,
    /// Skip non-improving round winners and stop after `patience` of them.
    /// When off, every round winner is committed until exhaustion.
    pub prune: bool,
    /// Consecutive non-improving rounds tolerated before growth stops.
    /// Ignored when `prune` is off.
    pub patience: usize,
    pub em: EmConfig,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            mtry: None,
            max_markers: MAX_MARKERS,
            prune: true,
            patience: 1,
            em: EmConfig::default(),
        }
    }
}

/// A grown classifier: its committed markers (in commit order), the fitted
/// haplotype pool over those markers, and its out-of-bag accuracy.
#[derive(Clone, Debug)]
pub struct GrownClassifier {
    pub markers: Vec<MarkerIdx>,
    pub pool: HaplotypePool,
    pub oob_accuracy: f64,
}

/// Grows classifiers against a fixed training matrix and known types.
pub struct VariableSelector<'a> {
    matrix: &'a SnpMatrix,
    known: &'a [TypePair],
    n_types: usize,
    kernel: Arc<LikelihoodKernel>,
    config: SelectorConfig,
}

impl<'a> VariableSelector<'a> {
    pub fn new(
        matrix: &'a SnpMatrix,
        known: &'a [TypePair],
        n_types: usize,
        kernel: Arc<LikelihoodKernel>,
        config: SelectorConfig,
    ) -> Self {
        debug_assert_eq!(matrix.n_samples(), known.len());
        Self {
            matrix,
            known,
            n_types,
            kernel,
            config,
        }
    }

    /// Starting pool: one zero-marker haplotype per type group, weighted by
    /// the in-bag allele share of that group.
    fn initial_pool(&self, genos: &GenotypePool) -> HaplotypePool {
        let mut counts = vec![0u64; self.n_types];
        let mut total = 0u64;
        for geno in genos.iter() {
            if geno.bootstrap == 0 {
                continue;
            }
            let Some(pair) = geno.known else { continue };
            let w = u64::from(geno.bootstrap);
            counts[pair.first() as usize] += w;
            counts[pair.second() as usize] += w;
            total += 2 * w;
        }
        let freqs: Vec<f64> = counts
            .iter()
            .map(|&c| if total > 0 { c as f64 / total as f64 } else { 0.0 })
            .collect();
        HaplotypePool::initial(&freqs)
    }

    /// Allele-level out-of-bag accuracy of `pool` over the hold-out samples.
    /// A classifier with no out-of-bag sample scores a vacuous 1.0.
    fn oob_accuracy(&self, pred: &mut Predictor, pool: &HaplotypePool, genos: &GenotypePool) -> f64 {
        let mut correct = 0u64;
        let mut total = 0u64;
        for geno in genos.iter() {
            if geno.bootstrap != 0 {
                continue;
            }
            let Some(known) = geno.known else { continue };
            total += 2;
            if let Some((guess, _)) = pred.best_guess(pool, geno) {
                correct += u64::from(guess.n_matching(known));
            }
        }
        if total == 0 {
            1.0
        } else {
            correct as f64 / total as f64
        }
    }

    /// In-bag deviance: `-2 * sum mult * ln P(true pair)`.
    fn in_bag_loss(&self, pred: &mut Predictor, pool: &HaplotypePool, genos: &GenotypePool) -> f64 {
        let mut loss = 0.0;
        for geno in genos.iter() {
            if geno.bootstrap == 0 {
                continue;
            }
            let Some(known) = geno.known else { continue };
            let p = pred
                .pair_posterior(pool, geno, known)
                .unwrap_or(0.0)
                .max(f64::MIN_POSITIVE);
            loss += -2.0 * f64::from(geno.bootstrap) * p.ln();
        }
        loss
    }

    /// Grow one classifier from the given bootstrap counts.
    pub fn grow<R: Rng + ?Sized>(&self, bootstrap: &[u32], rng: &mut R) -> GrownClassifier {
        let mut genos = GenotypePool::from_known_types(self.known);
        genos.set_bootstrap(bootstrap);

        let n_samples = self.matrix.n_samples();
        let rare_prob = (RARE_FRACTION / (2.0 * n_samples as f64)).max(self.kernel.decay());
        let mtry = self
            .config
            .mtry
            .unwrap_or_else(|| (self.matrix.n_markers() as f64).sqrt().round().max(1.0) as usize);
        let max_markers = self.config.max_markers.min(MAX_MARKERS);

        let mut cur = self.initial_pool(&genos);
        let mut em = EmEstimator::new(self.config.em, Arc::clone(&self.kernel));
        let mut pred = Predictor::new(Arc::clone(&self.kernel));
        let mut sampler = MarkerSampler::new(self.matrix.n_markers());

        let mut markers = Vec::new();
        let mut global_acc = -1.0;
        let mut global_loss = f64::INFINITY;
        let mut stagnant_rounds = 0;

        while sampler.total() > 0 && markers.len() < max_markers {
            sampler.random_select(mtry, rng);
            let mut next = em.prepare_haplotypes(&cur, &genos);

            let mut best: Option<(f64, f64, MarkerIdx, HaplotypePool)> = None;
            let trial: Vec<MarkerIdx> = sampler.selection().collect();
            for marker in trial {
                if !em.prepare_new_marker(marker, &cur, self.matrix, &mut genos, &mut next) {
                    sampler.reject(marker);
                    continue;
                }
                em.run(&mut next);
                let acc = self.oob_accuracy(&mut pred, &next, &genos);
                let loss = self.in_bag_loss(&mut pred, &next, &genos);
                genos.pop_marker();

                let better = match &best {
                    None => true,
                    Some((b_acc, b_loss, _, _)) => {
                        acc > *b_acc || (acc == *b_acc && loss < *b_loss)
                    }
                };
                if better {
                    best = Some((acc, loss, marker, next.clone()));
                }
            }
            sampler.purge_rejected();

            let Some((acc, loss, marker, pool)) = best else {
                // every candidate this round was uninformative
                continue;
            };
            let improved = acc > global_acc || (acc == global_acc && loss < global_loss);
            if improved {
                global_acc = acc;
                global_loss = loss;
                stagnant_rounds = 0;
            } else if self.config.prune {
                stagnant_rounds += 1;
                if stagnant_rounds >= self.config.patience {
                    break;
                }
                continue;
            }
            cur = pool.erase_rare(rare_prob);
            genos.add_marker(marker, self.matrix);
            sampler.remove(marker);
            markers.push(marker);
            debug!(
                marker = marker.as_usize(),
                n_markers = markers.len(),
                oob_accuracy = acc,
                in_bag_loss = loss,
                "committed marker"
            );
        }

        let oob_accuracy = self.oob_accuracy(&mut pred, &cur, &genos);
        GrownClassifier {
            markers,
            pool: cur,
            oob_accuracy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::kernel::Strategy;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Six samples, two type groups cleanly separated by markers 0 and 1;
    /// marker 2 is monomorphic noise.
    fn fixture() -> (SnpMatrix, Vec<TypePair>) {
        let matrix = SnpMatrix::new(
            6,
            3,
            vec![
                0, 0, 0, //
                0, 0, 0, //
                1, 1, 0, //
                1, 1, 0, //
                2, 2, 0, //
                2, 2, 0,
            ],
        )
        .unwrap();
        let known = vec![
            TypePair::new(0, 0),
            TypePair::new(0, 0),
            TypePair::new(0, 1),
            TypePair::new(0, 1),
            TypePair::new(1, 1),
            TypePair::new(1, 1),
        ];
        (matrix, known)
    }

    fn kernel() -> Arc<LikelihoodKernel> {
        Arc::new(LikelihoodKernel::new(Strategy::Scalar, 1e-5))
    }

    #[test]
    fn test_grow_separable_classifier() {
        let (matrix, known) = fixture();
        let selector = VariableSelector::new(
            &matrix,
            &known,
            2,
            kernel(),
            SelectorConfig {
                mtry: Some(3),
                ..SelectorConfig::default()
            },
        );
        // everyone in-bag: growth is driven by in-bag loss
        let mut rng = StdRng::seed_from_u64(42);
        let grown = selector.grow(&[1; 6], &mut rng);
        assert!(!grown.markers.is_empty());
        // monomorphic marker 2 must never be committed
        assert!(grown.markers.iter().all(|m| m.as_usize() != 2));
        assert_eq!(grown.pool.n_markers(), grown.markers.len());
        // vacuous accuracy: no out-of-bag samples exist
        assert_eq!(grown.oob_accuracy, 1.0);
    }

    #[test]
    fn test_grow_with_holdout_reaches_full_accuracy() {
        let (matrix, known) = fixture();
        let selector = VariableSelector::new(
            &matrix,
            &known,
            2,
            kernel(),
            SelectorConfig {
                mtry: Some(3),
                ..SelectorConfig::default()
            },
        );
        // hold out one sample of each type as out-of-bag
        let mut rng = StdRng::seed_from_u64(7);
        let grown = selector.grow(&[2, 0, 1, 1, 0, 2], &mut rng);
        assert!(!grown.markers.is_empty());
        assert!(
            grown.oob_accuracy > 0.99,
            "separable data should be fully recovered, got {}",
            grown.oob_accuracy
        );
    }

    #[test]
    fn test_prune_disabled_grows_to_exhaustion() {
        // both type groups see identical marker data, so nothing can ever
        // separate them; with everyone in-bag the out-of-bag accuracy is
        // pinned at the vacuous 1.0 from the first round on
        let matrix = SnpMatrix::new(
            4,
            3,
            vec![
                0, 2, 1, //
                2, 0, 0, //
                0, 2, 1, //
                2, 0, 0,
            ],
        )
        .unwrap();
        let known = vec![
            TypePair::new(0, 0),
            TypePair::new(0, 0),
            TypePair::new(1, 1),
            TypePair::new(1, 1),
        ];
        let selector = VariableSelector::new(
            &matrix,
            &known,
            2,
            kernel(),
            SelectorConfig {
                mtry: Some(3),
                prune: false,
                ..SelectorConfig::default()
            },
        );
        let mut rng = StdRng::seed_from_u64(17);
        let grown = selector.grow(&[1; 4], &mut rng);
        // every polymorphic marker is committed regardless of improvement
        assert_eq!(grown.markers.len(), 3);
        assert_eq!(grown.pool.n_markers(), 3);
        let mut committed: Vec<usize> = grown.markers.iter().map(|m| m.as_usize()).collect();
        committed.sort_unstable();
        assert_eq!(committed, [0, 1, 2]);
    }

    #[test]
    fn test_marker_cap_respected() {
        let (matrix, known) = fixture();
        let selector = VariableSelector::new(
            &matrix,
            &known,
            2,
            kernel(),
            SelectorConfig {
                mtry: Some(3),
                max_markers: 1,
                ..SelectorConfig::default()
            },
        );
        let mut rng = StdRng::seed_from_u64(9);
        let grown = selector.grow(&[1; 6], &mut rng);
        assert_eq!(grown.markers.len(), 1);
    }
}
