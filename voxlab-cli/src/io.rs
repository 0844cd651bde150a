//! JSON file I/O for models, matrices and results.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use ndarray::{Array2, ArrayView2};
use serde::de::DeserializeOwned;
use serde::Serialize;
use voxlab_hmm::model::{matrix_from_rows, matrix_to_rows};
use voxlab_hmm::{concat_hmms, Hmm, HmmSpec};

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", path.display()))
}

/// Pretty-print `value` to `output`, or stdout when `None`.
///
/// Non-finite numbers (e.g. `ln 0` in a lattice) are written as `null`.
pub fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("creating {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
            tracing::info!(path = %path.display(), "wrote output");
        }
        None => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            serde_json::to_writer_pretty(&mut lock, value)?;
            lock.write_all(b"\n")?;
        }
    }
    Ok(())
}

/// Read a `frames x features` matrix stored as nested arrays.
pub fn load_matrix(path: &Path) -> Result<Array2<f64>> {
    let rows: Vec<Vec<f64>> = read_json(path)?;
    let matrix = matrix_from_rows("matrix", &rows)
        .with_context(|| format!("reading matrix {}", path.display()))?;
    tracing::debug!(path = %path.display(), shape = ?matrix.dim(), "loaded matrix");
    Ok(matrix)
}

pub fn rows(matrix: ArrayView2<'_, f64>) -> Vec<Vec<f64>> {
    matrix_to_rows(matrix)
}

/// Read a model inventory (`name -> HmmSpec`). Unnamed models take their key.
pub fn load_models(path: &Path) -> Result<HashMap<String, Hmm>> {
    let specs: HashMap<String, HmmSpec> = read_json(path)?;
    let mut models = HashMap::with_capacity(specs.len());
    for (key, mut spec) in specs {
        if spec.name.is_empty() {
            spec.name = key.clone();
        }
        let hmm = Hmm::try_from(spec).with_context(|| format!("invalid model '{key}'"))?;
        models.insert(key, hmm);
    }
    tracing::info!(path = %path.display(), models = models.len(), "loaded models");
    Ok(models)
}

/// Look up `name`, or concatenate `a+b+c` left to right.
pub fn resolve_model(models: &HashMap<String, Hmm>, name: &str) -> Result<Hmm> {
    let parts: Vec<&str> = name.split('+').collect();
    let hmm = if let [single] = parts.as_slice() {
        models
            .get(*single)
            .cloned()
            .with_context(|| format!("unknown model '{single}'"))?
    } else {
        concat_hmms(models, &parts)?
    };
    Ok(hmm)
}
