//! Gaussian-emission hidden Markov models for speech recognition.
//!
//! - **Model**: [`Hmm`], a validated parameter record with an optional
//!   non-emitting exit state, and [`HmmSpec`] for interchange
//! - **Composition**: [`concat`] chains phoneme models into word models
//! - **Emissions**: [`DiagonalGaussians`] evaluates per-state log densities
//! - **Inference**: log-domain [`forward`] / [`backward`] lattices, [`viterbi`]
//!   decoding and [`state_posteriors`]
//! - **Training**: [`update_mean_and_var`] and the [`BaumWelch`] EM loop
//! - **Recognition**: [`score_utterance`] and [`recognize`]
//!
//! Every matrix follows the axis conventions documented in [`model`].

pub mod concat;
pub mod gaussian;
pub mod lattice;
pub mod model;
pub mod posterior;
pub mod recognize;
pub mod reestimate;
pub mod train;
pub mod viterbi;

pub use concat::{concat, concat_hmms, word_models};
pub use gaussian::{
    log_multivariate_normal_density_diag, DiagonalGaussians, EmissionModel,
    DEFAULT_VARIANCE_FLOOR, MIN_VARIANCE,
};
pub use lattice::{backward, forward, log_likelihood_at, total_log_likelihood, Lattice};
pub use model::{Hmm, HmmSpec};
pub use posterior::state_posteriors;
pub use recognize::{recognize, score_utterance, UtteranceScore};
pub use reestimate::update_mean_and_var;
pub use train::{
    BaumWelch, IterationProgress, TracingObserver, TrainConfig, TrainObserver, TrainOutcome,
    TrainPhase, TrainReport,
};
pub use viterbi::{viterbi, ViterbiPath, ViterbiTrellis};
