//! M-step: re-estimate Gaussian means and variances from state posteriors.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use voxlab_core::{Result, VoxlabError};

use crate::gaussian::DiagonalGaussians;

/// Posterior-weighted means and floored variances.
///
/// With `gamma = exp(log_gamma)` (`frames x states`) and features `x`
/// (`frames x features`):
///
/// ```text
/// means[j]  = sum_i gamma[i, j] x[i] / sum_i gamma[i, j]
/// covars[j] = max(sum_i gamma[i, j] (x[i] - means[j])^2 / sum_i gamma[i, j], floor)
/// ```
///
/// The floor is applied per state and per dimension.
///
/// # Errors
///
/// - [`VoxlabError::DimensionMismatch`] if the frame counts differ
/// - [`VoxlabError::DegenerateState`] if a state has zero (or non-finite)
///   posterior mass, which would otherwise turn its update into `NaN`
/// - [`VoxlabError::InvalidInput`] for a non-positive floor
pub fn update_mean_and_var(
    features: ArrayView2<'_, f64>,
    log_gamma: ArrayView2<'_, f64>,
    variance_floor: f64,
) -> Result<DiagonalGaussians> {
    let (n, d) = features.dim();
    if log_gamma.nrows() != n {
        return Err(VoxlabError::dimension("posterior frames", n, log_gamma.nrows()));
    }
    let m = log_gamma.ncols();

    let gamma = log_gamma.mapv(f64::exp);
    let mass: Array1<f64> = gamma.sum_axis(Axis(0));
    for (state, &w) in mass.iter().enumerate() {
        if !(w.is_finite() && w > 0.0) {
            return Err(VoxlabError::DegenerateState { state, mass: w });
        }
    }

    // (states x frames) . (frames x features)
    let mut means: Array2<f64> = gamma.t().dot(&features);
    for (mut row, &w) in means.rows_mut().into_iter().zip(mass.iter()) {
        row /= w;
    }

    let mut covars = Array2::zeros((m, d));
    for j in 0..m {
        let mu = means.row(j);
        let mut acc = covars.row_mut(j);
        for (x, &g) in features.rows().into_iter().zip(gamma.column(j).iter()) {
            for ((a, &xd), &md) in acc.iter_mut().zip(x.iter()).zip(mu.iter()) {
                *a += g * (xd - md) * (xd - md);
            }
        }
        acc /= mass[j];
    }

    DiagonalGaussians::new(means, covars, variance_floor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn hard_assignments_give_sample_statistics() {
        // Frames 0-1 belong to state 0, frames 2-4 to state 1.
        let x = array![[0.0, 10.0], [2.0, 14.0], [5.0, -1.0], [7.0, 1.0], [6.0, 0.0]];
        let gamma = array![[1.0, 0.0], [1.0, 0.0], [0.0, 1.0], [0.0, 1.0], [0.0, 1.0]];
        let g = update_mean_and_var(x.view(), gamma.mapv(f64::ln).view(), 1e-6).unwrap();

        let means = g.means();
        assert!((means[[0, 0]] - 1.0).abs() < 1e-12);
        assert!((means[[0, 1]] - 12.0).abs() < 1e-12);
        assert!((means[[1, 0]] - 6.0).abs() < 1e-12);
        assert!((means[[1, 1]] - 0.0).abs() < 1e-12);

        let covars = g.covars();
        assert!((covars[[0, 0]] - 1.0).abs() < 1e-12);
        assert!((covars[[0, 1]] - 4.0).abs() < 1e-12);
        assert!((covars[[1, 0]] - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn variance_floor_applies_per_dimension() {
        let x = array![[0.0, 0.0], [10.0, 0.1]];
        let gamma = array![[1.0], [1.0]];
        let g = update_mean_and_var(x.view(), gamma.mapv(f64::ln).view(), 5.0).unwrap();
        // dimension 0 variance is 25, above the floor; dimension 1 is tiny.
        assert!((g.covars()[[0, 0]] - 25.0).abs() < 1e-12);
        assert_eq!(g.covars()[[0, 1]], 5.0);
    }

    #[test]
    fn soft_assignments_weight_frames() {
        let x = array![[0.0], [4.0]];
        let gamma = array![[0.75, 0.25], [0.25, 0.75]];
        let g = update_mean_and_var(x.view(), gamma.mapv(f64::ln).view(), 1e-6).unwrap();
        assert!((g.means()[[0, 0]] - 1.0).abs() < 1e-12);
        assert!((g.means()[[1, 0]] - 3.0).abs() < 1e-12);
        // 0.75 * 1 + 0.25 * 9 = 3
        assert!((g.covars()[[0, 0]] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn state_without_mass_is_degenerate() {
        let x = array![[0.0], [1.0]];
        let log_gamma = array![[0.0, f64::NEG_INFINITY], [0.0, f64::NEG_INFINITY]];
        let err = update_mean_and_var(x.view(), log_gamma.view(), 5.0).unwrap_err();
        match err {
            VoxlabError::DegenerateState { state, mass } => {
                assert_eq!(state, 1);
                assert_eq!(mass, 0.0);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn nan_posteriors_are_degenerate_not_propagated() {
        let x = array![[0.0]];
        let log_gamma = array![[f64::NAN]];
        assert!(matches!(
            update_mean_and_var(x.view(), log_gamma.view(), 5.0),
            Err(VoxlabError::DegenerateState { .. })
        ));
    }

    #[test]
    fn frame_count_mismatch() {
        let x = array![[0.0], [1.0], [2.0]];
        let log_gamma = array![[0.0], [0.0]];
        assert!(matches!(
            update_mean_and_var(x.view(), log_gamma.view(), 5.0),
            Err(VoxlabError::DimensionMismatch { .. })
        ));
    }
}
