//! Forward and backward recursions over the HMM lattice, in log domain.
//!
//! Inputs are the emission log-likelihoods (`frames x states`), the log
//! start probabilities (`states`) and the log transition matrix
//! (`from x to`). Both recursions fold over the state axis with
//! [`log_sum_exp_axis`]; nothing is exponentiated outside that reduction.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use voxlab_core::{log_sum_exp_axis, log_sum_exp_view, Result, VoxlabError};

use crate::posterior::state_posteriors;

/// Validate lattice inputs and return `(frames, states)`.
fn lattice_dims(
    log_emlik: ArrayView2<'_, f64>,
    log_start: Option<ArrayView1<'_, f64>>,
    log_trans: ArrayView2<'_, f64>,
) -> Result<(usize, usize)> {
    let (n, m) = log_emlik.dim();
    if n == 0 {
        return Err(VoxlabError::InvalidInput(
            "observation sequence is empty".into(),
        ));
    }
    if m == 0 {
        return Err(VoxlabError::InvalidInput("model has no states".into()));
    }
    if let Some(start) = log_start {
        if start.len() != m {
            return Err(VoxlabError::dimension("log start probabilities", m, start.len()));
        }
    }
    if log_trans.nrows() != m {
        return Err(VoxlabError::dimension("log transition rows", m, log_trans.nrows()));
    }
    if log_trans.ncols() != m {
        return Err(VoxlabError::dimension("log transition columns", m, log_trans.ncols()));
    }
    Ok((n, m))
}

/// Forward (alpha) log-probabilities, `frames x states`.
///
/// `alpha[0, j] = log_start[j] + log_emlik[0, j]` and
/// `alpha[i, j] = logsumexp_k(alpha[i-1, k] + log_trans[k, j]) + log_emlik[i, j]`.
///
/// # Errors
///
/// Returns an error for an empty sequence or inconsistent shapes.
pub fn forward(
    log_emlik: ArrayView2<'_, f64>,
    log_start: ArrayView1<'_, f64>,
    log_trans: ArrayView2<'_, f64>,
) -> Result<Array2<f64>> {
    let (n, m) = lattice_dims(log_emlik, Some(log_start), log_trans)?;

    let mut alpha = Array2::from_elem((n, m), f64::NEG_INFINITY);
    alpha.row_mut(0).assign(&(&log_start + &log_emlik.row(0)));

    // incoming[[k, j]]: log mass arriving in state j from state k.
    let mut incoming = Array2::from_elem((m, m), f64::NEG_INFINITY);
    for i in 1..n {
        let prev = alpha.row(i - 1);
        for ((k, j), cell) in incoming.indexed_iter_mut() {
            *cell = prev[k] + log_trans[[k, j]];
        }
        let folded = log_sum_exp_axis(incoming.view(), Axis(0));
        alpha.row_mut(i).assign(&(&folded + &log_emlik.row(i)));
    }
    Ok(alpha)
}

/// Backward (beta) log-probabilities, `frames x states`.
///
/// `beta[N-1, j] = 0` and
/// `beta[i, j] = logsumexp_k(log_trans[j, k] + log_emlik[i+1, k] + beta[i+1, k])`.
///
/// # Errors
///
/// Returns an error for an empty sequence or inconsistent shapes.
pub fn backward(
    log_emlik: ArrayView2<'_, f64>,
    log_trans: ArrayView2<'_, f64>,
) -> Result<Array2<f64>> {
    let (n, m) = lattice_dims(log_emlik, None, log_trans)?;

    let mut beta = Array2::zeros((n, m));

    // outgoing[[j, k]]: log mass leaving state j through state k.
    let mut outgoing = Array2::from_elem((m, m), f64::NEG_INFINITY);
    for i in (0..n - 1).rev() {
        let next = &log_emlik.row(i + 1) + &beta.row(i + 1);
        for ((j, k), cell) in outgoing.indexed_iter_mut() {
            *cell = log_trans[[j, k]] + next[k];
        }
        let folded = log_sum_exp_axis(outgoing.view(), Axis(1));
        beta.row_mut(i).assign(&folded);
    }
    Ok(beta)
}

/// Total data log-likelihood `logsumexp_j(alpha[N-1, j])`.
///
/// An empty alpha matrix yields `-inf`.
pub fn total_log_likelihood(alpha: ArrayView2<'_, f64>) -> f64 {
    match alpha.nrows() {
        0 => f64::NEG_INFINITY,
        n => log_sum_exp_view(alpha.row(n - 1)),
    }
}

/// Everything computed over one pass of the lattice.
///
/// Each matrix is `frames x states` and is owned by whoever requested the
/// pass; the trainer discards it after the following M-step.
#[derive(Debug, Clone, PartialEq)]
pub struct Lattice {
    pub log_emlik: Array2<f64>,
    pub alpha: Array2<f64>,
    pub beta: Array2<f64>,
    pub log_likelihood: f64,
}

impl Lattice {
    /// Run forward and backward over precomputed emission log-likelihoods.
    pub fn compute(
        log_emlik: Array2<f64>,
        log_start: ArrayView1<'_, f64>,
        log_trans: ArrayView2<'_, f64>,
    ) -> Result<Self> {
        let alpha = forward(log_emlik.view(), log_start, log_trans)?;
        let beta = backward(log_emlik.view(), log_trans)?;
        let log_likelihood = total_log_likelihood(alpha.view());
        Ok(Self {
            log_emlik,
            alpha,
            beta,
            log_likelihood,
        })
    }

    pub fn n_frames(&self) -> usize {
        self.alpha.nrows()
    }

    pub fn n_states(&self) -> usize {
        self.alpha.ncols()
    }

    /// Per-frame log state posteriors (gamma).
    pub fn posteriors(&self) -> Result<Array2<f64>> {
        state_posteriors(self.alpha.view(), self.beta.view())
    }

    /// Total log-likelihood divided by the number of frames.
    pub fn mean_log_likelihood(&self) -> f64 {
        self.log_likelihood / self.n_frames() as f64
    }
}

/// Per-frame total log-likelihood recomputed from `alpha + beta` at `frame`.
///
/// Every frame should agree with [`total_log_likelihood`]; the check is
/// useful when debugging a lattice.
pub fn log_likelihood_at(
    alpha: ArrayView2<'_, f64>,
    beta: ArrayView2<'_, f64>,
    frame: usize,
) -> f64 {
    let joint: Array1<f64> = &alpha.row(frame) + &beta.row(frame);
    log_sum_exp_view(joint.view())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use proptest::prelude::*;
    use voxlab_core::log_sum_exp;

    const TOL: f64 = 1e-9;

    fn ln2(m: Array2<f64>) -> Array2<f64> {
        m.mapv(f64::ln)
    }

    /// Sum over every state sequence of the joint probability, in log domain.
    fn brute_force(
        log_emlik: &Array2<f64>,
        log_start: &Array1<f64>,
        log_trans: &Array2<f64>,
    ) -> f64 {
        let (n, m) = log_emlik.dim();
        let mut terms = Vec::new();
        let total = m.pow(n as u32);
        for code in 0..total {
            let mut path = Vec::with_capacity(n);
            let mut c = code;
            for _ in 0..n {
                path.push(c % m);
                c /= m;
            }
            let mut lp = log_start[path[0]] + log_emlik[[0, path[0]]];
            for i in 1..n {
                lp += log_trans[[path[i - 1], path[i]]] + log_emlik[[i, path[i]]];
            }
            terms.push(lp);
        }
        log_sum_exp(&terms)
    }

    #[test]
    fn first_row_is_start_plus_emission() {
        let log_emlik = array![[-1.0, -2.0], [-3.0, -0.5]];
        let log_start = array![0.5_f64.ln(), 0.5_f64.ln()];
        let log_trans = ln2(array![[0.7, 0.3], [0.4, 0.6]]);
        let alpha = forward(log_emlik.view(), log_start.view(), log_trans.view()).unwrap();
        assert!((alpha[[0, 0]] - (0.5_f64.ln() - 1.0)).abs() < TOL);
        assert!((alpha[[0, 1]] - (0.5_f64.ln() - 2.0)).abs() < TOL);
    }

    #[test]
    fn last_beta_row_is_zero() {
        let log_emlik = array![[-1.0, -2.0], [-3.0, -0.5], [-0.1, -0.2]];
        let log_trans = ln2(array![[0.7, 0.3], [0.4, 0.6]]);
        let beta = backward(log_emlik.view(), log_trans.view()).unwrap();
        assert_eq!(beta.dim(), (3, 2));
        assert_eq!(beta[[2, 0]], 0.0);
        assert_eq!(beta[[2, 1]], 0.0);
    }

    #[test]
    fn forward_matches_brute_force() {
        let log_emlik = array![
            [-1.0, -2.0, -0.3],
            [-3.0, -0.5, -1.1],
            [-0.2, -4.0, -2.0],
            [-1.5, -0.7, -0.9]
        ];
        let log_start = array![0.6_f64, 0.3, 0.1].mapv(f64::ln);
        let log_trans = ln2(array![[0.5, 0.3, 0.2], [0.1, 0.8, 0.1], [0.25, 0.25, 0.5]]);
        let alpha = forward(log_emlik.view(), log_start.view(), log_trans.view()).unwrap();
        let expected = brute_force(&log_emlik, &log_start, &log_trans);
        assert!((total_log_likelihood(alpha.view()) - expected).abs() < TOL);
    }

    #[test]
    fn alpha_beta_agree_at_every_frame() {
        let log_emlik = array![[-1.0, -2.0], [-3.0, -0.5], [-0.1, -0.2], [-2.0, -2.5]];
        let log_start = array![0.8_f64, 0.2].mapv(f64::ln);
        let log_trans = ln2(array![[0.7, 0.3], [0.4, 0.6]]);
        let lattice = Lattice::compute(log_emlik, log_start.view(), log_trans.view()).unwrap();
        for i in 0..lattice.n_frames() {
            let ll = log_likelihood_at(lattice.alpha.view(), lattice.beta.view(), i);
            assert!((ll - lattice.log_likelihood).abs() < TOL, "frame {i}");
        }
    }

    #[test]
    fn left_to_right_lattice_keeps_unreachable_states_at_neg_inf() {
        // Start pinned to state 0; state 2 is two steps away.
        let log_emlik = Array2::zeros((2, 3));
        let log_start = array![1.0_f64, 0.0, 0.0].mapv(f64::ln);
        let log_trans = ln2(array![[0.5, 0.5, 0.0], [0.0, 0.5, 0.5], [0.0, 0.0, 1.0]]);
        let alpha = forward(log_emlik.view(), log_start.view(), log_trans.view()).unwrap();
        assert_eq!(alpha[[0, 1]], f64::NEG_INFINITY);
        assert_eq!(alpha[[1, 2]], f64::NEG_INFINITY);
        assert!(alpha.iter().all(|v| !v.is_nan()));
    }

    #[test]
    fn single_frame_sequence() {
        let log_emlik = array![[-1.0, -2.0]];
        let log_start = array![0.5_f64, 0.5].mapv(f64::ln);
        let log_trans = ln2(array![[0.5, 0.5], [0.5, 0.5]]);
        let lattice = Lattice::compute(log_emlik, log_start.view(), log_trans.view()).unwrap();
        let expected = log_sum_exp(&[0.5_f64.ln() - 1.0, 0.5_f64.ln() - 2.0]);
        assert!((lattice.log_likelihood - expected).abs() < TOL);
        assert_eq!(lattice.beta, array![[0.0, 0.0]]);
    }

    #[test]
    fn empty_and_mismatched_inputs_error() {
        let log_trans = Array2::<f64>::zeros((2, 2));
        let log_start = Array1::<f64>::zeros(2);
        let empty = Array2::<f64>::zeros((0, 2));
        assert!(forward(empty.view(), log_start.view(), log_trans.view()).is_err());
        assert!(backward(empty.view(), log_trans.view()).is_err());

        let three_states = Array2::<f64>::zeros((4, 3));
        let err = forward(three_states.view(), log_start.view(), log_trans.view()).unwrap_err();
        assert!(matches!(err, VoxlabError::DimensionMismatch { .. }));
    }

    fn arb_stochastic_row(m: usize) -> impl Strategy<Value = Vec<f64>> {
        proptest::collection::vec(0.05f64..1.0, m).prop_map(|row| {
            let s: f64 = row.iter().sum();
            row.into_iter().map(|p| p / s).collect()
        })
    }

    proptest! {
        #[test]
        fn forward_agrees_with_enumeration(
            (m, n) in (1usize..=3, 1usize..=4),
            seed in proptest::collection::vec(-6.0f64..0.0, 12),
            start in arb_stochastic_row(3),
            rows in proptest::collection::vec(arb_stochastic_row(3), 3),
        ) {
            // Restrict the generated 3-state parameters to m states and renormalise.
            let renorm = |v: &[f64]| {
                let s: f64 = v[..m].iter().sum();
                v[..m].iter().map(|p| (p / s).ln()).collect::<Vec<f64>>()
            };
            let log_start = Array1::from(renorm(&start));
            let mut log_trans = Array2::zeros((m, m));
            for k in 0..m {
                log_trans.row_mut(k).assign(&Array1::from(renorm(&rows[k])));
            }
            let log_emlik = Array2::from_shape_fn((n, m), |(i, j)| seed[i * 3 + j]);

            let alpha = forward(log_emlik.view(), log_start.view(), log_trans.view()).unwrap();
            let expected = brute_force(&log_emlik, &log_start, &log_trans);
            prop_assert!((total_log_likelihood(alpha.view()) - expected).abs() < 1e-9);
        }
    }
}
