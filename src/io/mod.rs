//! # I/O Module
//!
//! Text adapters for marker matrices and JSON persistence for trained
//! models. Everything here is a thin boundary layer; no estimation logic.

pub mod matrix;
pub mod model_file;

pub use matrix::{read_queries, read_training, write_predictions, QueryData, TrainingData};
