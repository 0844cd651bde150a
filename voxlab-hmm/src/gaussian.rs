//! Diagonal-covariance Gaussian emission densities.
//!
//! For a feature vector `x` and state `j`,
//!
//! ```text
//! ln N(x; mu_j, sigma_j^2) = -0.5 * sum_d [ ln(2 pi sigma_jd^2) + (x_d - mu_jd)^2 / sigma_jd^2 ]
//! ```
//!
//! Variances are clamped to a floor both when the parameters are built and
//! again when densities are evaluated, so a zero variance never reaches the
//! division.

use std::f64::consts::PI;

use ndarray::{Array2, ArrayView2};
use voxlab_core::{Result, VoxlabError};

/// Variance floor used by Baum-Welch re-estimation unless configured otherwise.
pub const DEFAULT_VARIANCE_FLOOR: f64 = 5.0;

/// Smallest floor used when scoring with pre-trained parameters.
pub const MIN_VARIANCE: f64 = 1e-10;

/// Anything that can score a sequence of feature frames against a set of states.
pub trait EmissionModel {
    /// Number of states scored.
    fn n_states(&self) -> usize;

    /// Feature dimension expected on axis 1 of the input.
    fn n_features(&self) -> usize;

    /// Log-likelihood matrix of shape `frames x states`.
    fn log_likelihoods(&self, features: ArrayView2<'_, f64>) -> Result<Array2<f64>>;
}

/// Per-state independent Gaussians with floored diagonal variances.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagonalGaussians {
    /// `states x features`.
    means: Array2<f64>,
    /// `states x features`, every entry `>= variance_floor`.
    covars: Array2<f64>,
    variance_floor: f64,
}

impl DiagonalGaussians {
    /// Build emissions, clamping `covars` to `variance_floor`.
    ///
    /// # Errors
    ///
    /// Returns an error if the floor is not a positive finite number or if
    /// `means` and `covars` differ in shape.
    pub fn new(means: Array2<f64>, mut covars: Array2<f64>, variance_floor: f64) -> Result<Self> {
        check_floor(variance_floor)?;
        check_same_shape(means.view(), covars.view())?;
        covars.mapv_inplace(|v| v.max(variance_floor));
        Ok(Self {
            means,
            covars,
            variance_floor,
        })
    }

    pub fn means(&self) -> ArrayView2<'_, f64> {
        self.means.view()
    }

    pub fn covars(&self) -> ArrayView2<'_, f64> {
        self.covars.view()
    }

    pub fn variance_floor(&self) -> f64 {
        self.variance_floor
    }

    /// Consume into `(means, covars)`.
    pub fn into_parts(self) -> (Array2<f64>, Array2<f64>) {
        (self.means, self.covars)
    }
}

impl EmissionModel for DiagonalGaussians {
    fn n_states(&self) -> usize {
        self.means.nrows()
    }

    fn n_features(&self) -> usize {
        self.means.ncols()
    }

    fn log_likelihoods(&self, features: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        log_multivariate_normal_density_diag(
            features,
            self.means.view(),
            self.covars.view(),
            self.variance_floor,
        )
    }
}

/// Emission log-likelihoods of `features` (`N x D`) under `M` diagonal
/// Gaussians given by `means` and `covars` (`M x D`).
///
/// Variances below `variance_floor` are clamped before evaluation.
///
/// # Errors
///
/// Returns [`VoxlabError::DimensionMismatch`] if the feature width differs
/// from the parameter width or `covars` does not match `means`, and
/// [`VoxlabError::InvalidInput`] for a non-positive floor.
pub fn log_multivariate_normal_density_diag(
    features: ArrayView2<'_, f64>,
    means: ArrayView2<'_, f64>,
    covars: ArrayView2<'_, f64>,
    variance_floor: f64,
) -> Result<Array2<f64>> {
    check_floor(variance_floor)?;
    let (n_frames, n_features) = features.dim();
    let (n_states, d) = means.dim();
    check_same_shape(means, covars)?;
    if n_features != d {
        return Err(VoxlabError::dimension("feature width", d, n_features));
    }

    let variances = covars.mapv(|v| v.max(variance_floor));
    // Per-state normaliser: -0.5 * sum_d ln(2 pi sigma_d^2).
    let log_norm: Vec<f64> = variances
        .rows()
        .into_iter()
        .map(|var| -0.5 * var.iter().map(|&v| (2.0 * PI * v).ln()).sum::<f64>())
        .collect();

    let mut out = Array2::zeros((n_frames, n_states));
    for (i, x) in features.rows().into_iter().enumerate() {
        for j in 0..n_states {
            let mu = means.row(j);
            let var = variances.row(j);
            let mahalanobis: f64 = x
                .iter()
                .zip(mu.iter())
                .zip(var.iter())
                .map(|((&xd, &md), &vd)| (xd - md) * (xd - md) / vd)
                .sum();
            out[[i, j]] = log_norm[j] - 0.5 * mahalanobis;
        }
    }
    Ok(out)
}

fn check_same_shape(means: ArrayView2<'_, f64>, covars: ArrayView2<'_, f64>) -> Result<()> {
    let (m, d) = means.dim();
    let (cm, cd) = covars.dim();
    if m != cm {
        return Err(VoxlabError::dimension("covars rows", m, cm));
    }
    if d != cd {
        return Err(VoxlabError::dimension("covars columns", d, cd));
    }
    Ok(())
}

fn check_floor(variance_floor: f64) -> Result<()> {
    if !(variance_floor.is_finite() && variance_floor > 0.0) {
        return Err(VoxlabError::InvalidInput(format!(
            "variance floor must be positive and finite, got {variance_floor}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    const TOL: f64 = 1e-12;

    fn standard_normal_log_pdf(x: f64) -> f64 {
        -0.5 * ((2.0 * PI).ln() + x * x)
    }

    #[test]
    fn univariate_matches_closed_form() {
        let x = array![[0.0], [1.0], [-2.0]];
        let means = array![[0.0], [5.0]];
        let covars = array![[1.0], [1.0]];
        let ll = log_multivariate_normal_density_diag(
            x.view(),
            means.view(),
            covars.view(),
            MIN_VARIANCE,
        )
        .unwrap();
        assert_eq!(ll.dim(), (3, 2));
        assert!((ll[[0, 0]] - standard_normal_log_pdf(0.0)).abs() < TOL);
        assert!((ll[[1, 0]] - standard_normal_log_pdf(1.0)).abs() < TOL);
        assert!((ll[[2, 1]] - standard_normal_log_pdf(-7.0)).abs() < TOL);
    }

    #[test]
    fn diagonal_is_sum_of_independent_dimensions() {
        let x = array![[1.0, -1.0]];
        let means = array![[0.0, 0.0]];
        let covars = array![[4.0, 0.25]];
        let ll = log_multivariate_normal_density_diag(
            x.view(),
            means.view(),
            covars.view(),
            MIN_VARIANCE,
        )
        .unwrap();
        let d0 = -0.5 * ((2.0 * PI * 4.0).ln() + 1.0 / 4.0);
        let d1 = -0.5 * ((2.0 * PI * 0.25).ln() + 1.0 / 0.25);
        assert!((ll[[0, 0]] - (d0 + d1)).abs() < TOL);
    }

    #[test]
    fn variance_below_floor_is_clamped_at_evaluation() {
        let x = array![[0.5]];
        let means = array![[0.0]];
        let tiny = array![[1e-30]];
        let floored = array![[5.0]];
        let a =
            log_multivariate_normal_density_diag(x.view(), means.view(), tiny.view(), 5.0).unwrap();
        let b = log_multivariate_normal_density_diag(x.view(), means.view(), floored.view(), 5.0)
            .unwrap();
        assert!((a[[0, 0]] - b[[0, 0]]).abs() < TOL);
        assert!(a[[0, 0]].is_finite());
    }

    #[test]
    fn zero_variance_never_divides_by_zero() {
        let g = DiagonalGaussians::new(array![[0.0]], array![[0.0]], 1.0).unwrap();
        assert_eq!(g.covars()[[0, 0]], 1.0);
        let ll = g.log_likelihoods(array![[3.0]].view()).unwrap();
        assert!(ll[[0, 0]].is_finite());
    }

    #[test]
    fn feature_width_mismatch_is_an_error() {
        let g = DiagonalGaussians::new(array![[0.0, 0.0]], array![[1.0, 1.0]], 1.0).unwrap();
        let err = g.log_likelihoods(array![[1.0, 2.0, 3.0]].view()).unwrap_err();
        assert!(matches!(err, VoxlabError::DimensionMismatch { .. }));
    }

    #[test]
    fn bad_floor_is_rejected() {
        assert!(DiagonalGaussians::new(array![[0.0]], array![[1.0]], 0.0).is_err());
        assert!(DiagonalGaussians::new(array![[0.0]], array![[1.0]], f64::NAN).is_err());
    }

    #[test]
    fn shape_mismatch_between_means_and_covars() {
        let err = DiagonalGaussians::new(array![[0.0], [1.0]], array![[1.0]], 1.0).unwrap_err();
        assert!(matches!(err, VoxlabError::DimensionMismatch { .. }));
    }
}
