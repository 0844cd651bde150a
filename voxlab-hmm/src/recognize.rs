//! Utterance scoring and isolated word recognition.

use ndarray::ArrayView2;
use voxlab_core::Result;

use crate::gaussian::MIN_VARIANCE;
use crate::lattice::Lattice;
use crate::model::Hmm;
use crate::viterbi::viterbi;

/// Forward and Viterbi scores of one utterance under one model.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UtteranceScore {
    pub model: String,
    /// Total forward log-likelihood.
    pub log_likelihood: f64,
    /// Log-likelihood of the single best path.
    pub viterbi_log_likelihood: f64,
    pub path: Vec<usize>,
}

/// Score `features` (`frames x features`) against `hmm`.
pub fn score_utterance(features: ArrayView2<'_, f64>, hmm: &Hmm) -> Result<UtteranceScore> {
    let log_emlik = hmm.log_emissions(features, MIN_VARIANCE)?;
    let log_start = hmm.log_start();
    let log_trans = hmm.log_trans();
    let best = viterbi(log_emlik.view(), log_start.view(), log_trans.view())?;
    let lattice = Lattice::compute(log_emlik, log_start.view(), log_trans.view())?;
    Ok(UtteranceScore {
        model: hmm.name().to_string(),
        log_likelihood: lattice.log_likelihood,
        viterbi_log_likelihood: best.log_likelihood,
        path: best.states,
    })
}

/// Rank `models` by forward log-likelihood of `features`, best first.
///
/// Equal scores keep name order.
pub fn recognize<'a, I>(features: ArrayView2<'_, f64>, models: I) -> Result<Vec<UtteranceScore>>
where
    I: IntoIterator<Item = &'a Hmm>,
{
    let mut scores = models
        .into_iter()
        .map(|hmm| score_utterance(features, hmm))
        .collect::<Result<Vec<_>>>()?;
    rank(&mut scores);
    if let Some(best) = scores.first() {
        tracing::debug!(model = %best.model, log_likelihood = best.log_likelihood, "recognized");
    }
    Ok(scores)
}

/// Sort best first under a total order on the score, then by name.
fn rank(scores: &mut [UtteranceScore]) {
    scores.sort_by(|a, b| {
        b.log_likelihood
            .total_cmp(&a.log_likelihood)
            .then_with(|| a.model.cmp(&b.model))
    });
}
