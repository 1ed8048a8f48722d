//! # Attribag: Attribute-Bagging Genotype Classification
//!
//! Imputes a multi-allelic target type from bi-allelic marker genotypes.
//!
//! ## Usage
//! ```bash
//! # Train an ensemble
//! attribag train --input typed.tsv --out model.json
//!
//! # Impute query samples
//! attribag predict --model model.json --input queries.tsv --out calls.tsv
//! ```

use std::fs::File;
use std::time::Instant;

use tracing::info;
use tracing_subscriber::EnvFilter;

use attribag::config::{Command, Config, PredictArgs, TrainArgs};
use attribag::error::Result;
use attribag::io::{model_file, read_queries, read_training, write_predictions};
use attribag::model::AttrBagModel;
use attribag::utils::TracingProgress;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let start = Instant::now();
    let config = Config::parse_and_validate()?;

    rayon::ThreadPoolBuilder::new()
        .num_threads(config.resolved_nthreads())
        .build_global()
        .ok();
    info!(threads = config.resolved_nthreads(), "attribag starting");

    match &config.command {
        Command::Train(args) => run_train(args)?,
        Command::Predict(args) => run_predict(args)?,
    }

    info!(elapsed_s = start.elapsed().as_secs_f64(), "done");
    Ok(())
}

fn run_train(args: &TrainArgs) -> Result<()> {
    let data = read_training(&args.input)?;
    info!(
        n_samples = data.matrix.n_samples(),
        n_markers = data.matrix.n_markers(),
        n_types = data.corpus.n_types(),
        "training data loaded"
    );
    let model = AttrBagModel::train(
        &data.matrix,
        &data.known,
        data.corpus,
        &args.train_config(),
        &TracingProgress::new(),
    )?;
    info!(
        mean_oob_accuracy = model.mean_oob_accuracy(),
        mean_markers = model.mean_markers(),
        "ensemble summary"
    );
    model_file::save(&model, &args.out)
}

fn run_predict(args: &PredictArgs) -> Result<()> {
    let model = model_file::load(&args.model)?;
    let data = read_queries(&args.input)?;
    info!(
        n_queries = data.matrix.n_samples(),
        n_classifiers = model.n_classifiers(),
        "predicting"
    );
    let predictions = model.predict(&data.matrix, args.vote.into())?;

    match &args.out {
        Some(path) => {
            let file = File::create(path)?;
            write_predictions(
                file,
                &data.ids,
                &predictions,
                model.corpus(),
                args.full_posterior,
            )?;
            info!(path = %path.display(), "predictions written");
        }
        None => {
            let stdout = std::io::stdout();
            write_predictions(
                stdout.lock(),
                &data.ids,
                &predictions,
                model.corpus(),
                args.full_posterior,
            )?;
        }
    }
    Ok(())
}
