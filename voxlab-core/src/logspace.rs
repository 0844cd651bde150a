//! Numerically stable log-domain arithmetic.
//!
//! Probabilities along HMM lattices shrink geometrically with sequence length,
//! so every recursion in `voxlab-hmm` works on natural logarithms. The
//! reductions here use max-subtraction,
//! `log_sum_exp(v) = max(v) + ln(sum(exp(v - max(v))))`, and resolve an
//! all-`-inf` input to `-inf` rather than `NaN`.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Numerically stable computation of `ln(exp(a) + exp(b))`.
///
/// Handles the cases where `a` or `b` are negative infinity.
pub fn ln_add(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (max, min) = if a >= b { (a, b) } else { (b, a) };
    max + (min - max).exp().ln_1p()
}

/// Log-sum-exp over a one-dimensional view.
///
/// Empty input and all-`-inf` input both return `-inf`. A `+inf` entry
/// returns `+inf`; `NaN` entries propagate.
pub fn log_sum_exp_view(xs: ArrayView1<'_, f64>) -> f64 {
    if xs.iter().any(|x| x.is_nan()) {
        return f64::NAN;
    }
    let max = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max.is_infinite() {
        // -inf: nothing to add; +inf: dominates everything.
        return max;
    }
    let sum: f64 = xs.iter().map(|&x| (x - max).exp()).sum();
    max + sum.ln()
}

/// Log-sum-exp over a slice.
pub fn log_sum_exp(xs: &[f64]) -> f64 {
    log_sum_exp_view(ArrayView1::from(xs))
}

/// Log-sum-exp of a matrix along `axis`.
///
/// `Axis(0)` collapses rows and yields one value per column; `Axis(1)`
/// collapses columns and yields one value per row, matching
/// [`ndarray::ArrayBase::sum_axis`].
pub fn log_sum_exp_axis(values: ArrayView2<'_, f64>, axis: Axis) -> Array1<f64> {
    values.map_axis(axis, log_sum_exp_view)
}

/// Convert a probability vector to log domain. `0` maps to `-inf`.
pub fn ln_vector(probs: ArrayView1<'_, f64>) -> Array1<f64> {
    probs.mapv(f64::ln)
}

/// Convert a probability matrix to log domain. `0` maps to `-inf`.
pub fn ln_matrix(probs: ArrayView2<'_, f64>) -> Array2<f64> {
    probs.mapv(f64::ln)
}

/// Index of the largest value, preferring the lowest index on ties.
///
/// Returns `None` for an empty view. `NaN` entries never win.
pub fn argmax(xs: ArrayView1<'_, f64>) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &x) in xs.iter().enumerate() {
        match best {
            None if !x.is_nan() => best = Some((i, x)),
            Some((_, b)) if x > b => best = Some((i, x)),
            _ => {}
        }
    }
    best
}
