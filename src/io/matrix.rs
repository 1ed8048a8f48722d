//! # Tab-Separated Matrix Adapters
//!
//! Thin text adapters so the binary runs end to end. One row per individual,
//! tab-separated; marker calls are `0`/`1`/`2` copies of the counted allele
//! or `NA` for missing. Lines starting with `#` are comments.
//!
//! Training rows: `sample_id  type_allele1  type_allele2  call...`
//! Query rows:    `sample_id  call...`

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::data::{SnpMatrix, TypeCorpus, TypePair, MISSING};
use crate::error::{AttribagError, Result};
use crate::model::Prediction;

/// A parsed training set: sample ids, the raw marker matrix, per-sample
/// known type pairs, and the label corpus the pairs are coded against.
#[derive(Clone, Debug)]
pub struct TrainingData {
    pub ids: Vec<String>,
    pub matrix: SnpMatrix,
    pub known: Vec<TypePair>,
    pub corpus: TypeCorpus,
}

/// A parsed query set.
#[derive(Clone, Debug)]
pub struct QueryData {
    pub ids: Vec<String>,
    pub matrix: SnpMatrix,
}

fn open(path: &Path) -> Result<BufReader<File>> {
    match File::open(path) {
        Ok(f) => Ok(BufReader::new(f)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AttribagError::FileNotFound {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(e.into()),
    }
}

fn parse_call(field: &str, line: usize) -> Result<i8> {
    match field {
        "0" => Ok(0),
        "1" => Ok(1),
        "2" => Ok(2),
        "NA" | "na" | "." => Ok(MISSING),
        other => Err(AttribagError::parse(
            line,
            format!("marker call must be 0, 1, 2 or NA, got {other:?}"),
        )),
    }
}

/// Read a training file. The type corpus is the sorted set of distinct
/// labels seen in the two type columns.
pub fn read_training(path: &Path) -> Result<TrainingData> {
    let reader = open(path)?;
    let mut ids = Vec::new();
    let mut label_pairs: Vec<(String, String)> = Vec::new();
    let mut values: Vec<i8> = Vec::new();
    let mut n_markers = None;

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let lineno = lineno + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = trimmed.split('\t').collect();
        if fields.len() < 4 {
            return Err(AttribagError::parse(
                lineno,
                "expected sample id, two type alleles and at least one marker call",
            ));
        }
        let calls = &fields[3..];
        match n_markers {
            None => n_markers = Some(calls.len()),
            Some(n) if n != calls.len() => {
                return Err(AttribagError::parse(
                    lineno,
                    format!("expected {n} marker calls, got {}", calls.len()),
                ));
            }
            Some(_) => {}
        }
        ids.push(fields[0].to_owned());
        label_pairs.push((fields[1].to_owned(), fields[2].to_owned()));
        for field in calls {
            values.push(parse_call(field, lineno)?);
        }
    }

    let n_markers = n_markers
        .ok_or_else(|| AttribagError::invalid_data("training file contains no data rows"))?;
    let labels: BTreeSet<String> = label_pairs
        .iter()
        .flat_map(|(a, b)| [a.clone(), b.clone()])
        .collect();
    let corpus = TypeCorpus::from_labels(labels.into_iter().collect());
    let known = label_pairs
        .iter()
        .map(|(a, b)| Ok(TypePair::new(corpus.code_of(a)?, corpus.code_of(b)?)))
        .collect::<Result<Vec<_>>>()?;
    let matrix = SnpMatrix::new(ids.len(), n_markers, values)?;
    Ok(TrainingData {
        ids,
        matrix,
        known,
        corpus,
    })
}

/// Read a query file with the same call encoding but no type columns.
pub fn read_queries(path: &Path) -> Result<QueryData> {
    let reader = open(path)?;
    let mut ids = Vec::new();
    let mut values: Vec<i8> = Vec::new();
    let mut n_markers = None;

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let lineno = lineno + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = trimmed.split('\t').collect();
        if fields.len() < 2 {
            return Err(AttribagError::parse(
                lineno,
                "expected sample id and at least one marker call",
            ));
        }
        let calls = &fields[1..];
        match n_markers {
            None => n_markers = Some(calls.len()),
            Some(n) if n != calls.len() => {
                return Err(AttribagError::parse(
                    lineno,
                    format!("expected {n} marker calls, got {}", calls.len()),
                ));
            }
            Some(_) => {}
        }
        ids.push(fields[0].to_owned());
        for field in calls {
            values.push(parse_call(field, lineno)?);
        }
    }

    let n_markers =
        n_markers.ok_or_else(|| AttribagError::invalid_data("query file contains no data rows"))?;
    let matrix = SnpMatrix::new(ids.len(), n_markers, values)?;
    Ok(QueryData { ids, matrix })
}

/// Write predictions, one row per query: id, the two type labels (`NA` on
/// abstention), the ensemble probability and the matching score. With
/// `full_posterior`, the normalized share of every unordered pair follows.
pub fn write_predictions<W: Write>(
    out: W,
    ids: &[String],
    predictions: &[Prediction],
    corpus: &TypeCorpus,
    full_posterior: bool,
) -> Result<()> {
    let mut out = BufWriter::new(out);
    write!(out, "sample_id\tallele1\tallele2\tprob\tmatching")?;
    if full_posterior {
        for a in 0..corpus.n_types() {
            for b in a..corpus.n_types() {
                write!(out, "\t{}/{}", corpus.label(a as u16), corpus.label(b as u16))?;
            }
        }
    }
    writeln!(out)?;

    for (id, pred) in ids.iter().zip(predictions) {
        match pred.pair {
            Some(pair) => write!(
                out,
                "{id}\t{}\t{}\t{:.6}\t{:.6e}",
                corpus.label(pair.first()),
                corpus.label(pair.second()),
                pred.probability,
                pred.matching
            )?,
            None => write!(out, "{id}\tNA\tNA\t0.000000\t0.0e0")?,
        }
        if full_posterior {
            for p in &pred.posterior {
                write!(out, "\t{p:.6}")?;
            }
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}
