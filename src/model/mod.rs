//! # Model Module
//!
//! The estimation pipeline, bottom to top:
//! - [`kernel`]: packed Hamming distances and error-weighted likelihood sums.
//! - [`em`]: haplotype-frequency estimation over a doubled pool.
//! - [`sampling`]: candidate-marker draws without replacement.
//! - [`selector`]: greedy marker selection for one classifier.
//! - [`prediction`]: per-classifier scoring and vote accumulation.
//! - [`bagging`]: the trained ensemble and its public train/predict API.

pub mod bagging;
pub mod em;
pub mod kernel;
pub mod prediction;
pub mod sampling;
pub mod selector;

pub use bagging::{AttrBagModel, Classifier, Prediction, TrainConfig, VoteMethod};
pub use kernel::{hamming_distance, ErrorWeights, LikelihoodKernel, Strategy};
pub use prediction::Predictor;
pub use selector::{GrownClassifier, SelectorConfig, VariableSelector};
