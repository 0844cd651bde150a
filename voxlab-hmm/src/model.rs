//! The HMM parameter record.
//!
//! An [`Hmm`] holds `M` emitting states with diagonal-covariance Gaussian
//! emissions over `D`-dimensional feature vectors. Start and transition
//! probabilities are stored in probability domain and may optionally carry
//! one extra non-emitting exit state (index `M`), the convention used for
//! phoneme models that are chained into word models.
//!
//! Axis conventions for every matrix in this crate:
//!
//! | matrix            | axis 0  | axis 1          |
//! |-------------------|---------|-----------------|
//! | `means`, `covars` | state   | feature         |
//! | `transmat`        | from    | to              |
//! | features          | frame   | feature         |
//! | emission / lattice| frame   | state           |

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use voxlab_core::{logspace, Result, VoxlabError};

use crate::gaussian::{DiagonalGaussians, EmissionModel};

/// Tolerance used when checking that probability rows sum to one.
pub const NORMALIZATION_TOLERANCE: f64 = 1e-6;

/// A Gaussian-emission hidden Markov model with validated parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Hmm {
    name: String,
    /// Length `M` or `M + 1`.
    start_prob: Array1<f64>,
    /// `K x K` where `K == start_prob.len()`.
    transmat: Array2<f64>,
    /// `M x D`.
    means: Array2<f64>,
    /// `M x D` diagonal variances.
    covars: Array2<f64>,
}

impl Hmm {
    /// Build a model after validating shapes and normalisation.
    ///
    /// # Errors
    ///
    /// - [`VoxlabError::InvalidInput`] if there are no states or features,
    ///   an entry is negative or non-finite, or a variance is not positive
    /// - [`VoxlabError::DimensionMismatch`] if `covars` does not match
    ///   `means`, or `startprob`/`transmat` are not sized `M` or `M + 1`
    /// - [`VoxlabError::Normalization`] if `startprob` or a transition row
    ///   does not sum to 1. The exit-state row of an `M + 1` model may also
    ///   be all zero.
    pub fn new(
        name: impl Into<String>,
        start_prob: Array1<f64>,
        transmat: Array2<f64>,
        means: Array2<f64>,
        covars: Array2<f64>,
    ) -> Result<Self> {
        let name = name.into();
        let (m, d) = means.dim();
        if m == 0 {
            return Err(VoxlabError::InvalidInput(format!(
                "model '{name}' has no emitting states"
            )));
        }
        if d == 0 {
            return Err(VoxlabError::InvalidInput(format!(
                "model '{name}' has zero-dimensional means"
            )));
        }
        if covars.nrows() != m {
            return Err(VoxlabError::dimension("covars rows", m, covars.nrows()));
        }
        if covars.ncols() != d {
            return Err(VoxlabError::dimension("covars columns", d, covars.ncols()));
        }

        let k = start_prob.len();
        if k != m && k != m + 1 {
            return Err(VoxlabError::dimension("startprob length", m, k));
        }
        if transmat.nrows() != k {
            return Err(VoxlabError::dimension("transmat rows", k, transmat.nrows()));
        }
        if transmat.ncols() != k {
            return Err(VoxlabError::dimension("transmat columns", k, transmat.ncols()));
        }

        check_probabilities("startprob", start_prob.iter())?;
        check_probabilities("transmat", transmat.iter())?;
        check_sum("startprob", start_prob.sum())?;
        for (i, row) in transmat.axis_iter(Axis(0)).enumerate() {
            let sum = row.sum();
            if i == m && sum == 0.0 {
                continue;
            }
            check_sum(&format!("transmat row {i}"), sum)?;
        }

        if means.iter().any(|v| !v.is_finite()) {
            return Err(VoxlabError::InvalidInput(format!(
                "model '{name}' has non-finite means"
            )));
        }
        if covars.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(VoxlabError::InvalidInput(format!(
                "model '{name}' has non-positive or non-finite variances"
            )));
        }

        Ok(Self {
            name,
            start_prob,
            transmat,
            means,
            covars,
        })
    }

    /// Model name (phoneme, word, or `+`-joined composite).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of emitting states `M`.
    pub fn n_states(&self) -> usize {
        self.means.nrows()
    }

    /// Feature dimension `D`.
    pub fn n_features(&self) -> usize {
        self.means.ncols()
    }

    /// Whether the start/transition parameters carry a non-emitting exit state.
    pub fn has_exit_state(&self) -> bool {
        self.start_prob.len() == self.n_states() + 1
    }

    /// Start probabilities, including the exit state if present.
    pub fn start_prob(&self) -> ArrayView1<'_, f64> {
        self.start_prob.view()
    }

    /// Transition probabilities, including the exit state if present.
    pub fn transmat(&self) -> ArrayView2<'_, f64> {
        self.transmat.view()
    }

    /// Per-state mean vectors (`M x D`).
    pub fn means(&self) -> ArrayView2<'_, f64> {
        self.means.view()
    }

    /// Per-state diagonal variances (`M x D`).
    pub fn covars(&self) -> ArrayView2<'_, f64> {
        self.covars.view()
    }

    /// Log start probabilities restricted to the `M` emitting states.
    pub fn log_start(&self) -> Array1<f64> {
        let m = self.n_states();
        logspace::ln_vector(self.start_prob.slice(ndarray::s![..m]))
    }

    /// Log transition matrix restricted to the `M x M` emitting block.
    ///
    /// Mass flowing into the exit state is dropped, so rows of the result
    /// need not sum to one.
    pub fn log_trans(&self) -> Array2<f64> {
        let m = self.n_states();
        logspace::ln_matrix(self.transmat.slice(ndarray::s![..m, ..m]))
    }

    /// True when every state only loops on itself or advances to its
    /// immediate successor.
    pub fn is_left_to_right(&self) -> bool {
        self.transmat
            .indexed_iter()
            .all(|((from, to), &p)| p == 0.0 || to == from || to == from + 1)
    }

    /// Diagonal Gaussian emissions with variances clamped to `variance_floor`.
    pub fn gaussians(&self, variance_floor: f64) -> Result<DiagonalGaussians> {
        DiagonalGaussians::new(self.means.clone(), self.covars.clone(), variance_floor)
    }

    /// Emission log-likelihoods (`N x M`) of `features` under this model.
    pub fn log_emissions(
        &self,
        features: ArrayView2<'_, f64>,
        variance_floor: f64,
    ) -> Result<Array2<f64>> {
        self.gaussians(variance_floor)?.log_likelihoods(features)
    }

    /// A copy whose variances are clamped to `variance_floor`.
    pub fn floored(&self, variance_floor: f64) -> Result<Self> {
        let gaussians = self.gaussians(variance_floor)?;
        self.with_gaussians(gaussians)
    }

    /// A copy with new emission parameters and the same topology.
    ///
    /// # Errors
    ///
    /// Returns [`VoxlabError::DimensionMismatch`] if the Gaussians do not
    /// have `M` states of dimension `D`.
    pub fn with_gaussians(&self, gaussians: DiagonalGaussians) -> Result<Self> {
        if gaussians.n_states() != self.n_states() {
            return Err(VoxlabError::dimension(
                "gaussian states",
                self.n_states(),
                gaussians.n_states(),
            ));
        }
        let (means, covars) = gaussians.into_parts();
        Self::new(
            self.name.clone(),
            self.start_prob.clone(),
            self.transmat.clone(),
            means,
            covars,
        )
    }

    /// Rename the model.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

fn check_probabilities<'a>(what: &str, mut values: impl Iterator<Item = &'a f64>) -> Result<()> {
    if values.any(|p| !p.is_finite() || *p < 0.0) {
        return Err(VoxlabError::InvalidInput(format!(
            "{what} contains negative or non-finite probabilities"
        )));
    }
    Ok(())
}

fn check_sum(what: &str, sum: f64) -> Result<()> {
    if (sum - 1.0).abs() > NORMALIZATION_TOLERANCE {
        return Err(VoxlabError::Normalization {
            what: what.to_string(),
            sum,
        });
    }
    Ok(())
}

/// Build an `N x D` matrix from row vectors, rejecting ragged input.
pub fn matrix_from_rows(what: &str, rows: &[Vec<f64>]) -> Result<Array2<f64>> {
    let n_cols = rows.first().map_or(0, Vec::len);
    for row in rows {
        if row.len() != n_cols {
            return Err(VoxlabError::dimension(format!("{what} row width"), n_cols, row.len()));
        }
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), n_cols), flat)
        .map_err(|e| VoxlabError::Other(format!("{what}: {e}")))
}

/// Split a matrix back into row vectors.
pub fn matrix_to_rows(matrix: ArrayView2<'_, f64>) -> Vec<Vec<f64>> {
    matrix.rows().into_iter().map(|r| r.to_vec()).collect()
}

// ---------------------------------------------------------------------------
// Plain interchange record
// ---------------------------------------------------------------------------

/// Loosely-typed model parameters as they arrive from a model archive.
///
/// Converting to an [`Hmm`] runs the full validation of [`Hmm::new`].
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HmmSpec {
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: String,
    pub startprob: Vec<f64>,
    pub transmat: Vec<Vec<f64>>,
    pub means: Vec<Vec<f64>>,
    pub covars: Vec<Vec<f64>>,
}

impl TryFrom<HmmSpec> for Hmm {
    type Error = VoxlabError;

    fn try_from(spec: HmmSpec) -> Result<Self> {
        let transmat = matrix_from_rows("transmat", &spec.transmat)?;
        let means = matrix_from_rows("means", &spec.means)?;
        let covars = matrix_from_rows("covars", &spec.covars)?;
        Hmm::new(spec.name, Array1::from(spec.startprob), transmat, means, covars)
    }
}

impl From<&Hmm> for HmmSpec {
    fn from(hmm: &Hmm) -> Self {
        Self {
            name: hmm.name.clone(),
            startprob: hmm.start_prob.to_vec(),
            transmat: matrix_to_rows(hmm.transmat.view()),
            means: matrix_to_rows(hmm.means.view()),
            covars: matrix_to_rows(hmm.covars.view()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// 2-state model without an exit state.
    fn two_state() -> Hmm {
        Hmm::new(
            "ab",
            array![1.0, 0.0],
            array![[0.9, 0.1], [0.0, 1.0]],
            array![[0.0], [5.0]],
            array![[1.0], [1.0]],
        )
        .unwrap()
    }

    /// 3-state phoneme-style model with an exit state.
    fn phone(mean: f64) -> Hmm {
        Hmm::new(
            "ph",
            array![1.0, 0.0, 0.0, 0.0],
            array![
                [0.6, 0.4, 0.0, 0.0],
                [0.0, 0.7, 0.3, 0.0],
                [0.0, 0.0, 0.8, 0.2],
                [0.0, 0.0, 0.0, 1.0],
            ],
            array![[mean, 0.0], [mean, 1.0], [mean, 2.0]],
            array![[1.0, 1.0], [1.0, 1.0], [1.0, 1.0]],
        )
        .unwrap()
    }

    #[test]
    fn accessors() {
        let hmm = two_state();
        assert_eq!(hmm.name(), "ab");
        assert_eq!(hmm.n_states(), 2);
        assert_eq!(hmm.n_features(), 1);
        assert!(!hmm.has_exit_state());
        assert!(hmm.is_left_to_right());

        let p = phone(0.0);
        assert_eq!(p.n_states(), 3);
        assert!(p.has_exit_state());
        assert!(p.is_left_to_right());
    }

    #[test]
    fn log_parameters_drop_exit_state() {
        let p = phone(0.0);
        let ls = p.log_start();
        assert_eq!(ls.len(), 3);
        assert_eq!(ls[0], 0.0);
        assert_eq!(ls[1], f64::NEG_INFINITY);

        let lt = p.log_trans();
        assert_eq!(lt.dim(), (3, 3));
        assert!((lt[[2, 2]] - 0.8_f64.ln()).abs() < 1e-12);
        assert_eq!(lt[[2, 0]], f64::NEG_INFINITY);
    }

    #[test]
    fn rejects_unnormalised_rows() {
        let err = Hmm::new(
            "bad",
            array![1.0, 0.0],
            array![[0.5, 0.4], [0.0, 1.0]],
            array![[0.0], [1.0]],
            array![[1.0], [1.0]],
        )
        .unwrap_err();
        assert!(matches!(err, VoxlabError::Normalization { .. }));

        let err = Hmm::new(
            "bad",
            array![0.5, 0.4],
            array![[0.5, 0.5], [0.0, 1.0]],
            array![[0.0], [1.0]],
            array![[1.0], [1.0]],
        )
        .unwrap_err();
        assert!(matches!(err, VoxlabError::Normalization { .. }));
    }

    #[test]
    fn rejects_dimension_mismatches() {
        // covars width differs from means
        let err = Hmm::new(
            "bad",
            array![1.0, 0.0],
            array![[0.5, 0.5], [0.0, 1.0]],
            array![[0.0, 0.0], [1.0, 1.0]],
            array![[1.0], [1.0]],
        )
        .unwrap_err();
        assert!(matches!(err, VoxlabError::DimensionMismatch { .. }));

        // startprob neither M nor M+1
        let err = Hmm::new(
            "bad",
            array![1.0, 0.0, 0.0, 0.0],
            Array2::eye(4),
            array![[0.0], [1.0]],
            array![[1.0], [1.0]],
        )
        .unwrap_err();
        assert!(matches!(err, VoxlabError::DimensionMismatch { .. }));

        // transmat not matching startprob
        let err = Hmm::new(
            "bad",
            array![1.0, 0.0],
            Array2::eye(3),
            array![[0.0], [1.0]],
            array![[1.0], [1.0]],
        )
        .unwrap_err();
        assert!(matches!(err, VoxlabError::DimensionMismatch { .. }));
    }

    #[test]
    fn rejects_non_positive_variance_and_negative_probability() {
        assert!(Hmm::new(
            "bad",
            array![1.0, 0.0],
            array![[1.0, 0.0], [0.0, 1.0]],
            array![[0.0], [1.0]],
            array![[1.0], [0.0]],
        )
        .is_err());
        assert!(Hmm::new(
            "bad",
            array![1.2, -0.2],
            array![[1.0, 0.0], [0.0, 1.0]],
            array![[0.0], [1.0]],
            array![[1.0], [1.0]],
        )
        .is_err());
    }

    #[test]
    fn zero_exit_row_is_accepted() {
        let hmm = Hmm::new(
            "sp",
            array![1.0, 0.0],
            array![[0.5, 0.5], [0.0, 0.0]],
            array![[0.0]],
            array![[1.0]],
        )
        .unwrap();
        assert!(hmm.has_exit_state());
    }

    #[test]
    fn ergodic_model_is_not_left_to_right() {
        let hmm = Hmm::new(
            "erg",
            array![0.5, 0.5],
            array![[0.5, 0.5], [0.5, 0.5]],
            array![[0.0], [1.0]],
            array![[1.0], [1.0]],
        )
        .unwrap();
        assert!(!hmm.is_left_to_right());
    }

    #[test]
    fn floored_clamps_variances() {
        let hmm = phone(0.0).floored(5.0).unwrap();
        assert!(hmm.covars().iter().all(|&v| v == 5.0));
    }

    #[test]
    fn spec_round_trip_preserves_parameters() {
        let hmm = phone(1.5);
        let spec = HmmSpec::from(&hmm);
        assert_eq!(spec.transmat.len(), 4);
        let back = Hmm::try_from(spec).unwrap();
        assert_eq!(back, hmm);
    }

    #[test]
    fn ragged_rows_rejected() {
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(matches!(
            matrix_from_rows("features", &rows),
            Err(VoxlabError::DimensionMismatch { .. })
        ));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn spec_deserializes_from_json() {
        let json = r#"{
            "name": "sil",
            "startprob": [1.0, 0.0],
            "transmat": [[0.5, 0.5], [0.0, 1.0]],
            "means": [[0.0, 0.0]],
            "covars": [[1.0, 1.0]]
        }"#;
        let spec: HmmSpec = serde_json::from_str(json).unwrap();
        let hmm = Hmm::try_from(spec).unwrap();
        assert_eq!(hmm.name(), "sil");
        assert!(hmm.has_exit_state());
    }
}
