//! Left-to-right composition of phoneme models into word models.
//!
//! Every sub-model carries `M_i` emitting states plus a non-emitting exit
//! state. Sub-model `i` is placed at offset `o_i = sum_{k<i} M_k`, so its
//! exit column lands on the first state of sub-model `i + 1`. The composite
//! has `sum M_i` emitting states and one absorbing exit state.

use std::collections::{BTreeMap, HashMap};

use ndarray::{s, Array1, Array2};
use voxlab_core::{Result, VoxlabError};

use crate::model::Hmm;

/// Concatenate `models` left to right.
///
/// The composite takes its start probabilities from the first model and its
/// name from the sub-model names joined with `+`.
///
/// # Errors
///
/// - [`VoxlabError::InvalidInput`] for an empty list, or a sub-model without
///   an exit state or with transitions other than self-loops and the
///   immediate successor
/// - [`VoxlabError::DimensionMismatch`] when feature widths disagree
pub fn concat(models: &[&Hmm]) -> Result<Hmm> {
    let first = models
        .first()
        .ok_or_else(|| VoxlabError::InvalidInput("cannot concatenate zero models".into()))?;
    let d = first.n_features();
    for hmm in models {
        if !hmm.has_exit_state() {
            return Err(VoxlabError::InvalidInput(format!(
                "model '{}' has no exit state to chain through",
                hmm.name()
            )));
        }
        if !hmm.is_left_to_right() {
            return Err(VoxlabError::InvalidInput(format!(
                "model '{}' is not left-to-right",
                hmm.name()
            )));
        }
        if hmm.n_features() != d {
            return Err(VoxlabError::dimension(
                format!("feature width of '{}'", hmm.name()),
                d,
                hmm.n_features(),
            ));
        }
    }

    let total: usize = models.iter().map(|h| h.n_states()).sum();
    let k = total + 1;
    let mut start = Array1::zeros(k);
    let mut transmat = Array2::zeros((k, k));
    let mut means = Array2::zeros((total, d));
    let mut covars = Array2::zeros((total, d));

    let first_start = first.start_prob();
    start.slice_mut(s![..first_start.len()]).assign(&first_start);

    let mut offset = 0;
    for hmm in models {
        let m = hmm.n_states();
        // Emitting rows only: the exit row belongs to the next model.
        transmat
            .slice_mut(s![offset..offset + m, offset..=offset + m])
            .assign(&hmm.transmat().slice(s![..m, ..]));
        means.slice_mut(s![offset..offset + m, ..]).assign(&hmm.means());
        covars.slice_mut(s![offset..offset + m, ..]).assign(&hmm.covars());
        offset += m;
    }
    transmat[[total, total]] = 1.0;

    let name = models
        .iter()
        .map(|h| h.name())
        .collect::<Vec<_>>()
        .join("+");
    Hmm::new(name, start, transmat, means, covars)
}

/// Concatenate the models named in `names`, looked up in `models`.
pub fn concat_hmms(models: &HashMap<String, Hmm>, names: &[&str]) -> Result<Hmm> {
    let parts = names
        .iter()
        .map(|name| {
            models
                .get(*name)
                .ok_or_else(|| VoxlabError::InvalidInput(format!("unknown model '{name}'")))
        })
        .collect::<Result<Vec<_>>>()?;
    concat(&parts)
}

/// Build one `silence + pronunciation + silence` model per dictionary word.
///
/// Models are named after the word and returned in word order.
pub fn word_models(
    phonemes: &HashMap<String, Hmm>,
    dictionary: &BTreeMap<String, Vec<String>>,
    silence: &str,
) -> Result<BTreeMap<String, Hmm>> {
    let mut words = BTreeMap::new();
    for (word, pron) in dictionary {
        let mut names: Vec<&str> = Vec::with_capacity(pron.len() + 2);
        names.push(silence);
        names.extend(pron.iter().map(String::as_str));
        names.push(silence);
        let hmm = concat_hmms(phonemes, &names)?.with_name(word.clone());
        tracing::debug!(word = %word, states = hmm.n_states(), "built word model");
        words.insert(word.clone(), hmm);
    }
    Ok(words)
}
