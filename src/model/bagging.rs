//! # Attribute-Bagging Ensemble
//!
//! Trains a bag of independent classifiers, each grown from its own
//! multinomial bootstrap resample and its own greedily selected marker
//! subset, then combines their predictions for query genotypes.
//!
//! Classifiers train in parallel on the rayon pool. Reproducibility comes
//! from per-classifier RNGs seeded as `seed.wrapping_add(index)`, so the
//! result is independent of thread scheduling.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::{Genotype, HaplotypePool, MarkerIdx, SnpMatrix, TypeCorpus, TypePair};
use crate::error::{AttribagError, Result};
use crate::model::em::EmConfig;
use crate::model::kernel::{LikelihoodKernel, Strategy};
use crate::model::prediction::{Predictor, VoteBox};
use crate::model::selector::{GrownClassifier, SelectorConfig, VariableSelector};
use crate::utils::ProgressSink;

/// How classifier votes are combined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteMethod {
    /// Sum each classifier's posterior vector, weighted by its raw score
    /// total, then renormalize.
    AveragePosterior,
    /// One full vote per classifier on its best-guess pair.
    Majority,
}

/// Ensemble training parameters.
#[derive(Clone, Copy, Debug)]
pub struct TrainConfig {
    pub n_classifiers: usize,
    /// Candidate markers per selection round; `None` means `sqrt(n_markers)`.
    pub mtry: Option<usize>,
    pub max_markers: usize,
    /// Skip non-improving growth rounds and stop after `patience` of them;
    /// with pruning off classifiers grow until their candidates run out.
    pub prune: bool,
    pub patience: usize,
    /// Genotyping-error weight decay per mismatched allele.
    pub decay: f64,
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            n_classifiers: 100,
            mtry: None,
            max_markers: crate::data::MAX_MARKERS,
            prune: true,
            patience: 1,
            decay: 1e-5,
            seed: 0,
        }
    }
}

/// One trained ensemble member.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Classifier {
    markers: Vec<MarkerIdx>,
    pool: HaplotypePool,
    /// Bootstrap multiplicities this member was grown from; zero entries
    /// mark its out-of-bag individuals.
    bootstrap: Vec<u32>,
    oob_accuracy: f64,
}

impl Classifier {
    fn from_grown(grown: GrownClassifier, bootstrap: Vec<u32>) -> Self {
        Self {
            markers: grown.markers,
            pool: grown.pool,
            bootstrap,
            oob_accuracy: grown.oob_accuracy,
        }
    }

    pub fn bootstrap(&self) -> &[u32] {
        &self.bootstrap
    }

    pub fn markers(&self) -> &[MarkerIdx] {
        &self.markers
    }

    pub fn n_markers(&self) -> usize {
        self.markers.len()
    }

    pub fn n_haplotypes(&self) -> usize {
        self.pool.len()
    }

    pub fn oob_accuracy(&self) -> f64 {
        self.oob_accuracy
    }

    /// Pack a full-width query row down to this classifier's markers, in
    /// commit order.
    fn project(&self, row: &[i8]) -> Genotype {
        let mut geno = Genotype::new();
        for (k, marker) in self.markers.iter().enumerate() {
            geno.set_genotype(k, row[marker.as_usize()]);
        }
        geno
    }
}

/// Combined prediction for one query individual.
#[derive(Clone, Debug)]
pub struct Prediction {
    /// `None` when every classifier abstained (no informative marker
    /// observed anywhere in the ensemble).
    pub pair: Option<TypePair>,
    /// Ensemble probability of `pair`; 0 on abstention.
    pub probability: f64,
    /// Mean of the classifiers' pre-normalization score totals. Gauges how
    /// well the query resembles the training haplotypes at all; near-zero
    /// values flag a query the model has never seen the likes of.
    pub matching: f64,
    /// Normalized vote shares over all unordered type pairs, triangular
    /// order. All zero on abstention.
    pub posterior: Vec<f64>,
}

/// A trained attribute-bagging model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttrBagModel {
    n_markers: usize,
    corpus: TypeCorpus,
    decay: f64,
    classifiers: Vec<Classifier>,
}

impl AttrBagModel {
    /// Train an ensemble on `matrix` (samples x markers) with per-sample
    /// known type pairs coded against `corpus`.
    pub fn train(
        matrix: &SnpMatrix,
        known: &[TypePair],
        corpus: TypeCorpus,
        config: &TrainConfig,
        progress: &dyn ProgressSink,
    ) -> Result<Self> {
        if matrix.n_samples() == 0 || matrix.n_markers() == 0 {
            return Err(AttribagError::invalid_data("training matrix is empty"));
        }
        if known.len() != matrix.n_samples() {
            return Err(AttribagError::invalid_data(format!(
                "{} known types for {} samples",
                known.len(),
                matrix.n_samples()
            )));
        }
        let n_types = corpus.n_types();
        if n_types < 2 {
            return Err(AttribagError::invalid_data(
                "need at least two distinct target types",
            ));
        }
        if let Some(pair) = known
            .iter()
            .find(|p| p.second() as usize >= n_types)
        {
            return Err(AttribagError::invalid_data(format!(
                "known type pair {:?} out of range for {} types",
                pair, n_types
            )));
        }
        if config.n_classifiers == 0 {
            return Err(AttribagError::config("ensemble size must be positive"));
        }
        if !(config.decay > 0.0 && config.decay < 1.0) {
            return Err(AttribagError::config("decay must be in (0, 1)"));
        }

        let kernel = Arc::new(LikelihoodKernel::new(Strategy::detect(), config.decay));
        info!(
            n_samples = matrix.n_samples(),
            n_markers = matrix.n_markers(),
            n_types,
            n_classifiers = config.n_classifiers,
            strategy = ?kernel.strategy(),
            "training ensemble"
        );
        let selector_config = SelectorConfig {
            mtry: config.mtry,
            max_markers: config.max_markers,
            prune: config.prune,
            patience: config.patience,
            em: EmConfig::default(),
        };
        let selector = VariableSelector::new(matrix, known, n_types, kernel, selector_config);

        let n_samples = matrix.n_samples();
        let classifiers: Vec<Classifier> = (0..config.n_classifiers)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(i as u64));
                let mut bootstrap = vec![0u32; n_samples];
                for _ in 0..n_samples {
                    bootstrap[rng.gen_range(0..n_samples)] += 1;
                }
                let grown = selector.grow(&bootstrap, &mut rng);
                progress.classifier_done(config.n_classifiers, grown.oob_accuracy);
                Classifier::from_grown(grown, bootstrap)
            })
            .collect();

        let model = Self {
            n_markers: matrix.n_markers(),
            corpus,
            decay: config.decay,
            classifiers,
        };
        info!(
            mean_oob_accuracy = model.mean_oob_accuracy(),
            mean_markers = model.mean_markers(),
            "ensemble trained"
        );
        Ok(model)
    }

    /// Predict type pairs for every row of `queries`, whose marker columns
    /// must match the training matrix.
    pub fn predict(&self, queries: &SnpMatrix, method: VoteMethod) -> Result<Vec<Prediction>> {
        if queries.n_markers() != self.n_markers {
            return Err(AttribagError::invalid_data(format!(
                "query matrix has {} markers, model was trained on {}",
                queries.n_markers(),
                self.n_markers
            )));
        }
        let n_types = self.corpus.n_types();
        let kernel = Arc::new(LikelihoodKernel::new(Strategy::detect(), self.decay));
        let predictions = (0..queries.n_samples())
            .into_par_iter()
            .map(|sample| {
                let row = queries.row(sample);
                let mut pred = Predictor::new(Arc::clone(&kernel));
                let mut votes = VoteBox::new(n_types);
                let mut total_sum = 0.0;
                for classifier in &self.classifiers {
                    let geno = classifier.project(row);
                    match method {
                        VoteMethod::AveragePosterior => {
                            if let Some((posterior, total)) =
                                pred.posterior(&classifier.pool, &geno)
                            {
                                votes.add_weighted(posterior, total);
                                total_sum += total;
                            }
                        }
                        VoteMethod::Majority => {
                            if let Some((pair, _)) = pred.best_guess(&classifier.pool, &geno) {
                                votes.add_plurality(pair);
                                total_sum += pred.last_total();
                            }
                        }
                    }
                }
                let matching = total_sum / self.classifiers.len() as f64;
                if votes.normalize() {
                    let (pair, probability) = votes.best().unwrap_or((TypePair::new(0, 0), 0.0));
                    Prediction {
                        pair: Some(pair),
                        probability,
                        matching,
                        posterior: votes.sums().to_vec(),
                    }
                } else {
                    Prediction {
                        pair: None,
                        probability: 0.0,
                        matching: 0.0,
                        posterior: votes.sums().to_vec(),
                    }
                }
            })
            .collect();
        Ok(predictions)
    }

    pub fn n_markers(&self) -> usize {
        self.n_markers
    }

    pub fn n_classifiers(&self) -> usize {
        self.classifiers.len()
    }

    pub fn corpus(&self) -> &TypeCorpus {
        &self.corpus
    }

    pub fn decay(&self) -> f64 {
        self.decay
    }

    pub fn classifiers(&self) -> &[Classifier] {
        &self.classifiers
    }

    pub fn mean_oob_accuracy(&self) -> f64 {
        if self.classifiers.is_empty() {
            return 0.0;
        }
        self.classifiers.iter().map(|c| c.oob_accuracy).sum::<f64>() / self.classifiers.len() as f64
    }

    pub fn mean_markers(&self) -> f64 {
        if self.classifiers.is_empty() {
            return 0.0;
        }
        self.classifiers
            .iter()
            .map(|c| c.markers.len() as f64)
            .sum::<f64>()
            / self.classifiers.len() as f64
    }
}
