//! State posteriors (gamma) from a forward/backward pass.

use ndarray::{Array2, ArrayView2};
use voxlab_core::{Result, VoxlabError};

use crate::lattice::total_log_likelihood;

/// Log state posteriors, `frames x states`:
/// `log_gamma[i, j] = alpha[i, j] + beta[i, j] - logsumexp(alpha[N-1, :])`.
///
/// # Errors
///
/// Returns [`VoxlabError::DimensionMismatch`] if `alpha` and `beta` differ
/// in shape, and [`VoxlabError::InvalidInput`] if the sequence is empty or
/// has zero likelihood under the model (every path impossible), since the
/// posteriors would then be `NaN`.
pub fn state_posteriors(
    alpha: ArrayView2<'_, f64>,
    beta: ArrayView2<'_, f64>,
) -> Result<Array2<f64>> {
    if alpha.nrows() != beta.nrows() {
        return Err(VoxlabError::dimension("beta frames", alpha.nrows(), beta.nrows()));
    }
    if alpha.ncols() != beta.ncols() {
        return Err(VoxlabError::dimension("beta states", alpha.ncols(), beta.ncols()));
    }
    if alpha.nrows() == 0 {
        return Err(VoxlabError::InvalidInput(
            "observation sequence is empty".into(),
        ));
    }
    let total = total_log_likelihood(alpha);
    if !total.is_finite() {
        return Err(VoxlabError::InvalidInput(format!(
            "observation sequence has log-likelihood {total} under the model"
        )));
    }
    Ok((&alpha + &beta) - total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::Lattice;
    use ndarray::array;

    #[test]
    fn rows_are_normalised_posteriors() {
        let log_emlik = array![
            [-1.0, -2.0, -0.5],
            [-3.0, -0.5, -1.0],
            [-0.1, -0.2, -4.0],
            [-2.0, -2.5, -0.3]
        ];
        let log_start = array![0.5_f64, 0.3, 0.2].mapv(f64::ln);
        let log_trans = array![[0.6, 0.3, 0.1], [0.2, 0.6, 0.2], [0.1, 0.1, 0.8]].mapv(f64::ln);
        let lattice = Lattice::compute(log_emlik, log_start.view(), log_trans.view()).unwrap();
        let log_gamma = lattice.posteriors().unwrap();

        for row in log_gamma.rows() {
            let mass: f64 = row.iter().map(|v| v.exp()).sum();
            assert!((mass - 1.0).abs() < 1e-9, "row mass {mass}");
        }
    }

    #[test]
    fn unreachable_states_get_zero_posterior() {
        let log_emlik = Array2::zeros((2, 2));
        let log_start = array![1.0_f64, 0.0].mapv(f64::ln);
        let log_trans = array![[1.0, 0.0], [0.0, 1.0]].mapv(f64::ln);
        let lattice = Lattice::compute(log_emlik, log_start.view(), log_trans.view()).unwrap();
        let log_gamma = lattice.posteriors().unwrap();
        assert_eq!(log_gamma[[0, 0]], 0.0);
        assert_eq!(log_gamma[[1, 1]], f64::NEG_INFINITY);
    }

    #[test]
    fn impossible_sequence_is_rejected() {
        let alpha = array![[f64::NEG_INFINITY, f64::NEG_INFINITY]];
        let beta = array![[0.0, 0.0]];
        assert!(state_posteriors(alpha.view(), beta.view()).is_err());
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let alpha = Array2::<f64>::zeros((3, 2));
        let beta = Array2::<f64>::zeros((3, 3));
        assert!(matches!(
            state_posteriors(alpha.view(), beta.view()),
            Err(VoxlabError::DimensionMismatch { .. })
        ));
    }
}
