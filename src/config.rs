//! # Configuration Logic
//!
//! CLI argument parsing and validation. Everything downstream receives
//! plain config structs; no global parameter state.
//!
//! ## Example CLI
//! ```bash
//! attribag train --input typed.tsv --out model.json --n-classifiers 100
//! attribag predict --model model.json --input queries.tsv --out calls.tsv
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::error::{AttribagError, Result};
use crate::model::{TrainConfig, VoteMethod};

#[derive(Parser, Debug)]
#[command(name = "attribag", version, about = "Attribute-bagging genotype classifier")]
pub struct Config {
    #[command(subcommand)]
    pub command: Command,

    /// Worker threads (0 = all cores)
    #[arg(long, global = true, default_value_t = 0)]
    pub nthreads: usize,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Train an ensemble from typed training samples
    Train(TrainArgs),
    /// Impute type pairs for query samples with a trained model
    Predict(PredictArgs),
}

#[derive(clap::Args, Debug)]
pub struct TrainArgs {
    /// Training matrix: sample id, two type alleles, marker calls (TSV)
    #[arg(long)]
    pub input: PathBuf,

    /// Output path for the trained model (JSON)
    #[arg(long)]
    pub out: PathBuf,

    /// Number of ensemble members
    #[arg(long, default_value_t = 100)]
    pub n_classifiers: usize,

    /// Candidate markers per selection round (default: sqrt of marker count)
    #[arg(long)]
    pub mtry: Option<usize>,

    /// Maximum markers per classifier
    #[arg(long, default_value_t = crate::data::MAX_MARKERS)]
    pub max_markers: usize,

    /// Commit every selection round's winner instead of pruning
    /// non-improving rounds
    #[arg(long)]
    pub no_prune: bool,

    /// Non-improving selection rounds tolerated before a classifier stops
    /// (ignored with --no-prune)
    #[arg(long, default_value_t = 1)]
    pub patience: usize,

    /// Genotyping-error weight decay per mismatched allele
    #[arg(long, default_value_t = 1e-5)]
    pub decay: f64,

    /// Random seed
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

#[derive(clap::Args, Debug)]
pub struct PredictArgs {
    /// Trained model file
    #[arg(long)]
    pub model: PathBuf,

    /// Query matrix: sample id, marker calls (TSV)
    #[arg(long)]
    pub input: PathBuf,

    /// Output path (default: stdout)
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// How classifier votes are combined
    #[arg(long, value_enum, default_value_t = VoteArg::Average)]
    pub vote: VoteArg,

    /// Emit the full posterior over all type pairs
    #[arg(long)]
    pub full_posterior: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum VoteArg {
    /// Confidence-weighted average of classifier posteriors
    Average,
    /// One vote per classifier on its best guess
    Majority,
}

impl From<VoteArg> for VoteMethod {
    fn from(v: VoteArg) -> Self {
        match v {
            VoteArg::Average => VoteMethod::AveragePosterior,
            VoteArg::Majority => VoteMethod::Majority,
        }
    }
}

impl Config {
    /// Parse CLI arguments and validate cross-field constraints.
    pub fn parse_and_validate() -> Result<Self> {
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if let Command::Train(args) = &self.command {
            if args.n_classifiers == 0 {
                return Err(AttribagError::config("--n-classifiers must be positive"));
            }
            if !(args.decay > 0.0 && args.decay < 1.0) {
                return Err(AttribagError::config("--decay must be in (0, 1)"));
            }
            if args.max_markers == 0 || args.max_markers > crate::data::MAX_MARKERS {
                return Err(AttribagError::config(format!(
                    "--max-markers must be in 1..={}",
                    crate::data::MAX_MARKERS
                )));
            }
            if args.mtry == Some(0) {
                return Err(AttribagError::config("--mtry must be positive"));
            }
        }
        Ok(())
    }

    /// Worker thread count, resolved against the machine.
    pub fn resolved_nthreads(&self) -> usize {
        if self.nthreads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.nthreads
        }
    }
}

impl TrainArgs {
    pub fn train_config(&self) -> TrainConfig {
        TrainConfig {
            n_classifiers: self.n_classifiers,
            mtry: self.mtry,
            max_markers: self.max_markers,
            prune: !self.no_prune,
            patience: self.patience,
            decay: self.decay,
            seed: self.seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_train_defaults() {
        let config = parse(&["attribag", "train", "--input", "t.tsv", "--out", "m.json"]);
        assert!(config.validate().is_ok());
        let Command::Train(args) = &config.command else {
            panic!("expected train command");
        };
        let tc = args.train_config();
        assert_eq!(tc.n_classifiers, 100);
        assert_eq!(tc.mtry, None);
        assert!(tc.prune);
        assert_eq!(tc.patience, 1);
        assert_eq!(tc.decay, 1e-5);
    }

    #[test]
    fn test_no_prune_flag() {
        let config = parse(&[
            "attribag", "train", "--input", "t.tsv", "--out", "m.json", "--no-prune",
        ]);
        let Command::Train(args) = &config.command else {
            panic!("expected train command");
        };
        assert!(!args.train_config().prune);
    }

    #[test]
    fn test_rejects_bad_decay() {
        let config = parse(&[
            "attribag", "train", "--input", "t.tsv", "--out", "m.json", "--decay", "2.0",
        ]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_oversized_marker_cap() {
        let config = parse(&[
            "attribag",
            "train",
            "--input",
            "t.tsv",
            "--out",
            "m.json",
            "--max-markers",
            "500",
        ]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_vote_arg_maps() {
        let config = parse(&[
            "attribag", "predict", "--model", "m.json", "--input", "q.tsv", "--vote", "majority",
        ]);
        let Command::Predict(args) = &config.command else {
            panic!("expected predict command");
        };
        assert_eq!(VoteMethod::from(args.vote), VoteMethod::Majority);
    }
}
