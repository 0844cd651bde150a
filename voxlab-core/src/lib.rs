//! Shared primitives for the voxlab speech toolkit.
//!
//! `voxlab-core` provides the foundation the other voxlab crates build on:
//!
//! - **Error types**: [`VoxlabError`] and [`Result`] for structured error handling
//! - **Log-domain arithmetic**: stable log-sum-exp reductions over slices and
//!   matrix axes, used by every HMM lattice recursion
//! - **Traits**: [`Summarizable`] one-line reports for models and results

pub mod error;
pub mod logspace;
pub mod traits;

pub use error::{Result, VoxlabError};
pub use logspace::{argmax, ln_add, log_sum_exp, log_sum_exp_axis, log_sum_exp_view};
pub use traits::Summarizable;
