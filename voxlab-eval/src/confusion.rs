//! Confusion matrix over frame labels.

use ndarray::Array2;
use voxlab_core::{Result, Summarizable, VoxlabError};

/// Entry `(i, j)` counts frames whose **actual** class is `i` and whose
/// **predicted** class is `j`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    counts: Array2<usize>,
}

impl ConfusionMatrix {
    /// Count `(actual, predicted)` pairs.
    ///
    /// `n_classes` is inferred from the largest label when `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the slices are empty, differ in length, or a label
    /// is outside `0..n_classes`.
    pub fn from_labels(
        actual: &[usize],
        predicted: &[usize],
        n_classes: Option<usize>,
    ) -> Result<Self> {
        if actual.is_empty() {
            return Err(VoxlabError::InvalidInput("empty label vectors".into()));
        }
        if actual.len() != predicted.len() {
            return Err(VoxlabError::dimension(
                "predicted labels",
                actual.len(),
                predicted.len(),
            ));
        }

        let largest = actual.iter().chain(predicted).copied().max().unwrap_or(0);
        let nc = n_classes.unwrap_or(largest + 1);
        if largest >= nc {
            return Err(VoxlabError::InvalidInput(format!(
                "label {largest} out of range for {nc} classes"
            )));
        }

        let mut counts = Array2::zeros((nc, nc));
        for (&a, &p) in actual.iter().zip(predicted) {
            counts[[a, p]] += 1;
        }
        Ok(Self { counts })
    }

    pub fn n_classes(&self) -> usize {
        self.counts.nrows()
    }

    #[inline]
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        self.counts[[actual, predicted]]
    }

    pub fn counts(&self) -> &Array2<usize> {
        &self.counts
    }

    pub fn total(&self) -> usize {
        self.counts.sum()
    }

    /// Fraction of frames on the diagonal.
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.counts.diag().sum() as f64 / total as f64
    }

    /// `TP / (TP + FN)`, or 0.0 when the class never occurs.
    pub fn recall(&self, class: usize) -> f64 {
        let row: usize = self.counts.row(class).sum();
        if row == 0 {
            0.0
        } else {
            self.get(class, class) as f64 / row as f64
        }
    }

    /// `TP / (TP + FP)`, or 0.0 when the class is never predicted.
    pub fn precision(&self, class: usize) -> f64 {
        let col: usize = self.counts.column(class).sum();
        if col == 0 {
            0.0
        } else {
            self.get(class, class) as f64 / col as f64
        }
    }

    /// Each row divided by its total; empty rows stay zero.
    pub fn row_normalized(&self) -> Array2<f64> {
        let mut out = self.counts.mapv(|c| c as f64);
        for mut row in out.rows_mut() {
            let total = row.sum();
            if total > 0.0 {
                row /= total;
            }
        }
        out
    }

    /// Zero the diagonal so only the confusions remain.
    pub fn clear_diagonal_entries(&mut self) {
        self.counts.diag_mut().fill(0);
    }
}

impl Summarizable for ConfusionMatrix {
    fn summary(&self) -> String {
        format!(
            "ConfusionMatrix: {} classes, {} frames, accuracy={:.4}",
            self.n_classes(),
            self.total(),
            self.accuracy()
        )
    }
}
