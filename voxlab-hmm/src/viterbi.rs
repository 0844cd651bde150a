//! Viterbi decoding: the single most likely state sequence.

use ndarray::{Array2, ArrayView1, ArrayView2};
use voxlab_core::{argmax, Result, VoxlabError};

/// Best path through the lattice and its log-likelihood.
#[derive(Debug, Clone, PartialEq)]
pub struct ViterbiPath {
    /// One state index per frame, oldest first.
    pub states: Vec<usize>,
    pub log_likelihood: f64,
}

/// Full dynamic-programming tables, kept for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct ViterbiTrellis {
    /// `scores[i, j]`: best log score of any path ending in state `j` at frame `i`.
    pub scores: Array2<f64>,
    /// `backpointers[i, j]`: predecessor of state `j` on that path. Row 0 is unused.
    pub backpointers: Array2<usize>,
}

impl ViterbiTrellis {
    /// Fill the trellis.
    ///
    /// Ties between predecessors resolve to the lowest state index.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty sequence or inconsistent shapes.
    pub fn compute(
        log_emlik: ArrayView2<'_, f64>,
        log_start: ArrayView1<'_, f64>,
        log_trans: ArrayView2<'_, f64>,
    ) -> Result<Self> {
        let (n, m) = log_emlik.dim();
        if n == 0 {
            return Err(VoxlabError::InvalidInput(
                "observation sequence is empty".into(),
            ));
        }
        if log_start.len() != m {
            return Err(VoxlabError::dimension("log start probabilities", m, log_start.len()));
        }
        if log_trans.dim() != (m, m) {
            return Err(VoxlabError::dimension("log transition rows", m, log_trans.nrows()));
        }

        let mut scores = Array2::from_elem((n, m), f64::NEG_INFINITY);
        let mut backpointers = Array2::zeros((n, m));
        for j in 0..m {
            scores[[0, j]] = log_start[j] + log_emlik[[0, j]];
        }

        for i in 1..n {
            for j in 0..m {
                let mut best_state = 0;
                let mut best_val = f64::NEG_INFINITY;
                for k in 0..m {
                    let v = scores[[i - 1, k]] + log_trans[[k, j]];
                    if v > best_val {
                        best_val = v;
                        best_state = k;
                    }
                }
                scores[[i, j]] = best_val + log_emlik[[i, j]];
                backpointers[[i, j]] = best_state;
            }
        }

        Ok(Self {
            scores,
            backpointers,
        })
    }

    /// Walk the backpointers from the best final state.
    pub fn best_path(&self) -> ViterbiPath {
        let n = self.scores.nrows();
        let (last, log_likelihood) =
            argmax(self.scores.row(n - 1)).unwrap_or((0, f64::NEG_INFINITY));

        let mut states = vec![0usize; n];
        states[n - 1] = last;
        for i in (0..n - 1).rev() {
            states[i] = self.backpointers[[i + 1, states[i + 1]]];
        }
        ViterbiPath {
            states,
            log_likelihood,
        }
    }
}

/// Most likely state sequence for `log_emlik` (`frames x states`).
///
/// All inputs are in log domain.
pub fn viterbi(
    log_emlik: ArrayView2<'_, f64>,
    log_start: ArrayView1<'_, f64>,
    log_trans: ArrayView2<'_, f64>,
) -> Result<ViterbiPath> {
    Ok(ViterbiTrellis::compute(log_emlik, log_start, log_trans)?.best_path())
}
