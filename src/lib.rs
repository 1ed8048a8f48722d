//! # Attribag Library Root
//!
//! Attribute-bagging imputation of a multi-allelic target type from
//! bi-allelic marker genotypes. An ensemble of weak classifiers is trained,
//! each on its own bootstrap resample over a greedily selected marker
//! subset; their votes combine into a posterior over unordered type pairs.
//!
//! ## Module Structure
//! ```text
//! attribag
//! ├── data    # Packed planes, haplotype/genotype pools, type codes
//! ├── model   # Hamming kernel, EM, marker selection, ensemble
//! ├── io      # TSV matrix adapters, JSON model persistence
//! └── utils   # Progress sinks
//! ```
//!
//! ## Library usage
//! ```no_run
//! use attribag::data::{SnpMatrix, TypeCorpus, TypePair};
//! use attribag::model::{AttrBagModel, TrainConfig, VoteMethod};
//! use attribag::utils::NullProgress;
//!
//! # fn main() -> attribag::error::Result<()> {
//! let matrix = SnpMatrix::new(2, 1, vec![0, 2])?;
//! let known = vec![TypePair::new(0, 0), TypePair::new(1, 1)];
//! let corpus = TypeCorpus::from_labels(vec!["A".into(), "B".into()]);
//! let model = AttrBagModel::train(
//!     &matrix, &known, corpus, &TrainConfig::default(), &NullProgress,
//! )?;
//! let calls = model.predict(&matrix, VoteMethod::AveragePosterior)?;
//! # let _ = calls;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod io;
pub mod model;
pub mod utils;

pub use data::{SnpMatrix, TypeCorpus, TypePair};
pub use error::{AttribagError, Result};
pub use model::{AttrBagModel, Prediction, TrainConfig, VoteMethod};
