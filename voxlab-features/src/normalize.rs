//! Feature standardisation and context stacking.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use voxlab_core::{Result, VoxlabError};

/// Per-dimension z-score parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Standardizer {
    mean: Array1<f64>,
    std: Array1<f64>,
}

impl Standardizer {
    /// Estimate mean and (population) standard deviation of every column.
    pub fn fit(frames: ArrayView2<'_, f64>) -> Result<Self> {
        if frames.nrows() == 0 {
            return Err(VoxlabError::InvalidInput("empty data".into()));
        }
        let mean = frames
            .mean_axis(Axis(0))
            .ok_or_else(|| VoxlabError::InvalidInput("empty data".into()))?;
        let std = frames.std_axis(Axis(0), 0.0);
        Ok(Self { mean, std })
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn std(&self) -> &Array1<f64> {
        &self.std
    }

    /// Apply the fitted scaling; zero-variance dimensions map to 0.
    pub fn transform(&self, frames: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if frames.ncols() != self.mean.len() {
            return Err(VoxlabError::dimension("feature width", self.mean.len(), frames.ncols()));
        }
        let mut out = frames.to_owned();
        for mut row in out.rows_mut() {
            for ((v, &mu), &sd) in row.iter_mut().zip(&self.mean).zip(&self.std) {
                *v = if sd == 0.0 { 0.0 } else { (*v - mu) / sd };
            }
        }
        Ok(out)
    }
}

/// Standardise one utterance with its own statistics.
pub fn standardize_utterance(frames: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
    Standardizer::fit(frames)?.transform(frames)
}

/// Mirror index `i + offset` back into `0..n`.
fn reflect(i: usize, offset: isize, n: usize) -> usize {
    let last = n as isize - 1;
    let mut k = i as isize + offset;
    if k < 0 {
        k = -k;
    }
    if k > last {
        k = 2 * last - k;
    }
    k.clamp(0, last) as usize
}

/// Concatenate every frame with `context` neighbours on each side
/// (`frames x (2 * context + 1) * features`).
///
/// Neighbours past either end are mirrored: frame `-1` is frame `1`.
pub fn stack_frames(features: ArrayView2<'_, f64>, context: usize) -> Result<Array2<f64>> {
    let (n, d) = features.dim();
    if n == 0 {
        return Err(VoxlabError::InvalidInput("empty data".into()));
    }
    let width = 2 * context + 1;
    let c = context as isize;
    let mut out = Array2::zeros((n, width * d));
    for (i, mut row) in out.rows_mut().into_iter().enumerate() {
        for (slot, offset) in (-c..=c).enumerate() {
            let src = features.row(reflect(i, offset, n));
            row.slice_mut(ndarray::s![slot * d..(slot + 1) * d]).assign(&src);
        }
    }
    Ok(out)
}
