//! Frame-level evaluation of state classifiers.
//!
//! - **Confusion matrix**: counts, accuracy, per-class precision and recall,
//!   row normalisation for display
//! - **Labels**: posterior argmax and merging of HMM state labels into
//!   phoneme labels

pub mod confusion;
pub mod labels;

pub use confusion::ConfusionMatrix;
pub use labels::{argmax_rows, StateList};
