//! End-to-end ensemble tests on synthetic three-type data.
//!
//! The type groups carry haplotypes "000000", "111000" and "111111", so
//! every unordered pair produces a distinct genotype row and a correct model
//! must recover all six pairs exactly.

use std::io::Write as _;

use attribag::data::{SnpMatrix, TypeCorpus, TypePair};
use attribag::io::{model_file, read_queries, read_training, write_predictions};
use attribag::model::{AttrBagModel, TrainConfig, VoteMethod};
use attribag::utils::NullProgress;

const N_MARKERS: usize = 6;

/// Per-type haplotypes over the six markers.
const HAPLOS: [[i8; N_MARKERS]; 3] = [
    [0, 0, 0, 0, 0, 0],
    [1, 1, 1, 0, 0, 0],
    [1, 1, 1, 1, 1, 1],
];

fn genotype_of(pair: TypePair) -> Vec<i8> {
    let a = &HAPLOS[pair.first() as usize];
    let b = &HAPLOS[pair.second() as usize];
    a.iter().zip(b).map(|(x, y)| x + y).collect()
}

fn all_pairs() -> Vec<TypePair> {
    let mut pairs = Vec::new();
    for a in 0..3u16 {
        for b in a..3u16 {
            pairs.push(TypePair::new(a, b));
        }
    }
    pairs
}

/// Three copies of every unordered pair: 18 training samples.
fn training_set() -> (SnpMatrix, Vec<TypePair>, TypeCorpus) {
    let mut values = Vec::new();
    let mut known = Vec::new();
    for pair in all_pairs() {
        for _ in 0..3 {
            values.extend(genotype_of(pair));
            known.push(pair);
        }
    }
    let matrix = SnpMatrix::new(known.len(), N_MARKERS, values).unwrap();
    let corpus = TypeCorpus::from_labels(vec!["A".into(), "B".into(), "C".into()]);
    (matrix, known, corpus)
}

fn config() -> TrainConfig {
    TrainConfig {
        n_classifiers: 12,
        mtry: Some(N_MARKERS),
        seed: 1234,
        ..TrainConfig::default()
    }
}

fn train() -> AttrBagModel {
    let (matrix, known, corpus) = training_set();
    AttrBagModel::train(&matrix, &known, corpus, &config(), &NullProgress).unwrap()
}

#[test]
fn recovers_every_pair_with_both_vote_methods() {
    let model = train();
    let pairs = all_pairs();
    let mut values = Vec::new();
    for &pair in &pairs {
        values.extend(genotype_of(pair));
    }
    let queries = SnpMatrix::new(pairs.len(), N_MARKERS, values).unwrap();

    for method in [VoteMethod::AveragePosterior, VoteMethod::Majority] {
        let predictions = model.predict(&queries, method).unwrap();
        for (pred, &expected) in predictions.iter().zip(&pairs) {
            assert_eq!(pred.pair, Some(expected), "method {method:?}");
            assert!(
                pred.probability > 0.9,
                "pair {expected:?} predicted with probability {}",
                pred.probability
            );
            let sum: f64 = pred.posterior.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9);
            assert!(pred.matching > 0.0);
        }
    }
}

#[test]
fn partially_missing_query_is_still_called() {
    let model = train();
    // pair (B, C) with half the markers dropped
    let mut row = genotype_of(TypePair::new(1, 2));
    row[1] = -1;
    row[3] = -1;
    row[5] = -1;
    let queries = SnpMatrix::new(1, N_MARKERS, row).unwrap();
    let predictions = model
        .predict(&queries, VoteMethod::AveragePosterior)
        .unwrap();
    assert_eq!(predictions[0].pair, Some(TypePair::new(1, 2)));
}

#[test]
fn all_missing_query_abstains() {
    let model = train();
    let queries = SnpMatrix::new(1, N_MARKERS, vec![-1; N_MARKERS]).unwrap();
    let predictions = model
        .predict(&queries, VoteMethod::AveragePosterior)
        .unwrap();
    assert_eq!(predictions[0].pair, None);
    assert_eq!(predictions[0].probability, 0.0);
    assert_eq!(predictions[0].matching, 0.0);
}

#[test]
fn single_classifier_with_all_markers_is_perfect_out_of_bag() {
    let (matrix, known, corpus) = training_set();
    let cfg = TrainConfig {
        n_classifiers: 1,
        mtry: Some(N_MARKERS),
        patience: 2,
        seed: 2024,
        ..TrainConfig::default()
    };
    let model = AttrBagModel::train(&matrix, &known, corpus, &cfg, &NullProgress).unwrap();
    assert_eq!(model.n_classifiers(), 1);
    assert!(
        (model.mean_oob_accuracy() - 1.0).abs() < 1e-12,
        "out-of-bag accuracy {} on fully separable data",
        model.mean_oob_accuracy()
    );
}

#[test]
fn out_of_bag_accuracy_is_high_on_separable_data() {
    let model = train();
    assert!(
        model.mean_oob_accuracy() > 0.8,
        "mean out-of-bag accuracy {} too low for separable data",
        model.mean_oob_accuracy()
    );
}

#[test]
fn file_pipeline_roundtrip() {
    // training TSV: three copies of every pair, labeled A/B/C
    let dir = tempfile::tempdir().unwrap();
    let train_path = dir.path().join("train.tsv");
    let labels = ["A", "B", "C"];
    {
        let mut f = std::fs::File::create(&train_path).unwrap();
        writeln!(f, "# synthetic training data").unwrap();
        let mut sample = 0;
        for pair in all_pairs() {
            for _ in 0..3 {
                let calls: Vec<String> = genotype_of(pair)
                    .iter()
                    .map(|&g| if g < 0 { "NA".into() } else { g.to_string() })
                    .collect();
                writeln!(
                    f,
                    "s{sample}\t{}\t{}\t{}",
                    labels[pair.first() as usize],
                    labels[pair.second() as usize],
                    calls.join("\t")
                )
                .unwrap();
                sample += 1;
            }
        }
    }

    let data = read_training(&train_path).unwrap();
    assert_eq!(data.corpus.labels(), labels);
    let model = AttrBagModel::train(
        &data.matrix,
        &data.known,
        data.corpus,
        &config(),
        &NullProgress,
    )
    .unwrap();

    // persistence round-trip
    let model_path = dir.path().join("model.json");
    model_file::save(&model, &model_path).unwrap();
    let model = model_file::load(&model_path).unwrap();

    // query file: one row per pair, with one missing call
    let query_path = dir.path().join("queries.tsv");
    {
        let mut f = std::fs::File::create(&query_path).unwrap();
        for (i, pair) in all_pairs().iter().enumerate() {
            let mut row = genotype_of(*pair);
            if i == 0 {
                row[2] = -1;
            }
            let calls: Vec<String> = row
                .iter()
                .map(|&g| if g < 0 { "NA".into() } else { g.to_string() })
                .collect();
            writeln!(f, "q{i}\t{}", calls.join("\t")).unwrap();
        }
    }
    let queries = read_queries(&query_path).unwrap();
    let predictions = model
        .predict(&queries.matrix, VoteMethod::AveragePosterior)
        .unwrap();

    let mut out = Vec::new();
    write_predictions(&mut out, &queries.ids, &predictions, model.corpus(), false).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), all_pairs().len() + 1);
    for (line, pair) in lines[1..].iter().zip(all_pairs()) {
        let fields: Vec<&str> = line.split('\t').collect();
        assert_eq!(fields[1], labels[pair.first() as usize]);
        assert_eq!(fields[2], labels[pair.second() as usize]);
        let prob: f64 = fields[3].parse().unwrap();
        assert!(prob > 0.5);
    }
}
