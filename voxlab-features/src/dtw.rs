//! Dynamic time warping between two feature sequences.

use ndarray::{Array2, ArrayView1, ArrayView2};
use voxlab_core::{Result, VoxlabError};

/// Alignment of two sequences `x` (`N x D`) and `y` (`M x D`).
#[derive(Debug, Clone, PartialEq)]
pub struct DtwResult {
    /// Accumulated cost of the best path divided by `N + M`.
    pub distance: f64,
    /// `local[[i, j]] = dist(x[i], y[j])`.
    pub local: Array2<f64>,
    /// Cost of the best path from `(0, 0)` to `(i, j)`.
    pub accumulated: Array2<f64>,
    /// Aligned index pairs `(i, j)` from `(0, 0)` to `(N-1, M-1)`.
    pub path: Vec<(usize, usize)>,
}

/// Euclidean distance between two frames.
pub fn euclidean(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Align `x` and `y` under the frame distance `dist`.
///
/// Steps are diagonal, up (advance `x`) or left (advance `y`). Equal costs
/// prefer the diagonal, then up, then left.
///
/// # Errors
///
/// Returns an error if either sequence is empty or the feature widths differ.
pub fn dtw<F>(x: ArrayView2<'_, f64>, y: ArrayView2<'_, f64>, dist: F) -> Result<DtwResult>
where
    F: Fn(ArrayView1<'_, f64>, ArrayView1<'_, f64>) -> f64,
{
    let (n, m) = (x.nrows(), y.nrows());
    if n == 0 || m == 0 {
        return Err(VoxlabError::InvalidInput("cannot align an empty sequence".into()));
    }
    if x.ncols() != y.ncols() {
        return Err(VoxlabError::dimension("feature width", x.ncols(), y.ncols()));
    }

    let local = Array2::from_shape_fn((n, m), |(i, j)| dist(x.row(i), y.row(j)));
    let mut acc = Array2::from_elem((n, m), f64::INFINITY);
    for i in 0..n {
        for j in 0..m {
            let best = if i == 0 && j == 0 {
                0.0
            } else {
                predecessors(i, j)
                    .into_iter()
                    .flatten()
                    .map(|(pi, pj)| acc[[pi, pj]])
                    .fold(f64::INFINITY, f64::min)
            };
            acc[[i, j]] = local[[i, j]] + best;
        }
    }

    let mut path = vec![(n - 1, m - 1)];
    let (mut i, mut j) = (n - 1, m - 1);
    while (i, j) != (0, 0) {
        let mut step = None;
        let mut best = f64::INFINITY;
        for (pi, pj) in predecessors(i, j).into_iter().flatten() {
            // Strict comparison keeps the earlier (preferred) step on ties.
            if step.is_none() || acc[[pi, pj]] < best {
                best = acc[[pi, pj]];
                step = Some((pi, pj));
            }
        }
        let Some(prev) = step else { break };
        (i, j) = prev;
        path.push(prev);
    }
    path.reverse();

    Ok(DtwResult {
        distance: acc[[n - 1, m - 1]] / (n + m) as f64,
        local,
        accumulated: acc,
        path,
    })
}

/// Diagonal, up and left predecessors of `(i, j)`, in preference order.
fn predecessors(i: usize, j: usize) -> [Option<(usize, usize)>; 3] {
    let diag = (i > 0 && j > 0).then(|| (i - 1, j - 1));
    let up = (i > 0).then(|| (i - 1, j));
    let left = (j > 0).then(|| (i, j - 1));
    [diag, up, left]
}

/// Pairwise DTW distances (Euclidean frames) between utterances.
///
/// The result is symmetric with a zero diagonal.
pub fn distance_matrix(utterances: &[Array2<f64>]) -> Result<Array2<f64>> {
    let k = utterances.len();
    let mut out = Array2::zeros((k, k));
    for a in 0..k {
        for b in a + 1..k {
            let d = dtw(utterances[a].view(), utterances[b].view(), euclidean)?.distance;
            out[[a, b]] = d;
            out[[b, a]] = d;
        }
        tracing::debug!(utterance = a, of = k, "dtw row done");
    }
    Ok(out)
}
