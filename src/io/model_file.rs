//! # Model Persistence
//!
//! Trained ensembles are stored as JSON under a small versioned envelope so
//! incompatible files fail with a clear error instead of a deserialization
//! trace. Haplotype alleles travel as "0"/"1" strings inside the pool's
//! serde representation, which keeps model files diffable.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AttribagError, Result};
use crate::model::AttrBagModel;

const FORMAT: &str = "attribag-model";
const VERSION: u32 = 1;

#[derive(Deserialize)]
struct Envelope {
    format: String,
    version: u32,
    model: AttrBagModel,
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    format: &'static str,
    version: u32,
    model: &'a AttrBagModel,
}

/// Write a trained model to `path`, replacing any existing file.
pub fn save(model: &AttrBagModel, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let envelope = EnvelopeRef {
        format: FORMAT,
        version: VERSION,
        model,
    };
    serde_json::to_writer(BufWriter::new(file), &envelope)?;
    info!(
        path = %path.display(),
        n_classifiers = model.n_classifiers(),
        "model saved"
    );
    Ok(())
}

/// Load a model saved by [`save`].
pub fn load(path: &Path) -> Result<AttrBagModel> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AttribagError::FileNotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(e.into()),
    };
    let envelope: Envelope = serde_json::from_reader(BufReader::new(file))?;
    if envelope.format != FORMAT {
        return Err(AttribagError::model(format!(
            "not an attribag model file: format {:?}",
            envelope.format
        )));
    }
    if envelope.version != VERSION {
        return Err(AttribagError::model(format!(
            "unsupported model version {} (expected {VERSION})",
            envelope.version
        )));
    }
    info!(
        path = %path.display(),
        n_classifiers = envelope.model.n_classifiers(),
        "model loaded"
    );
    Ok(envelope.model)
}
