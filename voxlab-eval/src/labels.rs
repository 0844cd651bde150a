//! Frame labels: posterior argmax and state-to-phoneme merging.

use std::collections::HashMap;

use ndarray::ArrayView2;
use voxlab_core::{argmax, Result, VoxlabError};

/// Index of the largest entry in every row (lowest index on ties).
///
/// Rows that are empty or entirely `NaN` map to 0.
pub fn argmax_rows(posteriors: ArrayView2<'_, f64>) -> Vec<usize> {
    posteriors
        .rows()
        .into_iter()
        .map(|row| argmax(row).map_or(0, |(i, _)| i))
        .collect()
}

/// Ordered HMM state names such as `"ah_0"`, `"ah_1"`, `"sil_2"`.
///
/// The phoneme of a state is the part of its name before the last `_`.
/// Phonemes are numbered in order of first appearance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateList {
    states: Vec<String>,
    phonemes: Vec<String>,
    /// `state_phoneme[s]` is the phoneme index of state `s`.
    state_phoneme: Vec<usize>,
}

impl StateList {
    pub fn new(states: Vec<String>) -> Result<Self> {
        if states.is_empty() {
            return Err(VoxlabError::InvalidInput("empty state list".into()));
        }
        let mut phonemes: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut state_phoneme = Vec::with_capacity(states.len());
        for state in &states {
            let phoneme = state.rsplit_once('_').map_or(state.as_str(), |(p, _)| p);
            let id = *index.entry(phoneme.to_string()).or_insert_with(|| {
                phonemes.push(phoneme.to_string());
                phonemes.len() - 1
            });
            state_phoneme.push(id);
        }
        Ok(Self {
            states,
            phonemes,
            state_phoneme,
        })
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn states(&self) -> &[String] {
        &self.states
    }

    pub fn phonemes(&self) -> &[String] {
        &self.phonemes
    }

    pub fn phoneme_of(&self, state: usize) -> Option<usize> {
        self.state_phoneme.get(state).copied()
    }

    /// Map state labels to phoneme labels.
    ///
    /// # Errors
    ///
    /// Returns an error for a label outside the state list.
    pub fn phoneme_labels(&self, state_labels: &[usize]) -> Result<Vec<usize>> {
        state_labels
            .iter()
            .map(|&s| {
                self.phoneme_of(s).ok_or_else(|| {
                    VoxlabError::InvalidInput(format!(
                        "state label {s} out of range for {} states",
                        self.len()
                    ))
                })
            })
            .collect()
    }
}
