//! Baum-Welch (EM) re-estimation of Gaussian emission parameters.
//!
//! Start and transition probabilities are held fixed; only the per-state
//! means and diagonal variances are updated. Each iteration runs
//!
//! 1. **Expecting**: state posteriors from the current forward/backward lattice
//! 2. **Maximizing**: posterior-weighted means and floored variances
//! 3. **CheckingConvergence**: a fresh lattice under the new parameters, whose
//!    total log-likelihood is compared with the previous one
//!
//! Training stops when the improvement falls below `stop_threshold`
//! ([`TrainOutcome::Converged`]) or after `max_iter` iterations
//! ([`TrainOutcome::MaxIterReached`]). Both are successful outcomes.

use ndarray::ArrayView2;
use voxlab_core::{Result, Summarizable, VoxlabError};

use crate::gaussian::{EmissionModel, DEFAULT_VARIANCE_FLOOR};
use crate::lattice::Lattice;
use crate::model::Hmm;
use crate::reestimate::update_mean_and_var;

/// Log-likelihood drops smaller than this are treated as round-off.
const DECREASE_TOLERANCE: f64 = 1e-6;

/// Hyperparameters for Baum-Welch training.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TrainConfig {
    pub max_iter: usize,
    /// Minimum log-likelihood gain required to keep iterating.
    pub stop_threshold: f64,
    pub variance_floor: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            max_iter: 20,
            stop_threshold: 1.0,
            variance_floor: DEFAULT_VARIANCE_FLOOR,
        }
    }
}

impl TrainConfig {
    /// Check that the hyperparameters describe a runnable loop.
    pub fn validate(&self) -> Result<()> {
        if self.max_iter == 0 {
            return Err(VoxlabError::InvalidInput("max_iter must be > 0".into()));
        }
        if !self.stop_threshold.is_finite() {
            return Err(VoxlabError::InvalidInput(format!(
                "stop_threshold must be finite, got {}",
                self.stop_threshold
            )));
        }
        if !(self.variance_floor.is_finite() && self.variance_floor > 0.0) {
            return Err(VoxlabError::InvalidInput(format!(
                "variance_floor must be positive, got {}",
                self.variance_floor
            )));
        }
        Ok(())
    }
}

/// Phases of the training loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrainPhase {
    Initializing,
    Expecting,
    Maximizing,
    CheckingConvergence,
    Converged,
    MaxIterReached,
}

impl TrainPhase {
    /// `Converged` and `MaxIterReached` end the loop.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Converged | Self::MaxIterReached)
    }
}

/// How training finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TrainOutcome {
    Converged,
    MaxIterReached,
}

impl From<TrainOutcome> for TrainPhase {
    fn from(outcome: TrainOutcome) -> Self {
        match outcome {
            TrainOutcome::Converged => Self::Converged,
            TrainOutcome::MaxIterReached => Self::MaxIterReached,
        }
    }
}

/// Snapshot reported to the observer after every iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationProgress {
    /// 1-based iteration index.
    pub iteration: usize,
    pub log_likelihood: f64,
    /// `log_likelihood` divided by the number of frames.
    pub mean_log_likelihood: f64,
    /// Gain over the previous iteration (or the initial parameters).
    pub improvement: f64,
}

/// Observability hook for the training loop.
pub trait TrainObserver {
    /// Called once per completed iteration.
    fn on_iteration(&mut self, progress: &IterationProgress);

    /// Called on entry to every phase, including the terminal one.
    fn on_phase(&mut self, _phase: TrainPhase) {}
}

/// Default observer: forwards progress to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl TrainObserver for TracingObserver {
    fn on_iteration(&mut self, progress: &IterationProgress) {
        tracing::info!(
            iteration = progress.iteration,
            log_likelihood = progress.log_likelihood,
            mean_log_likelihood = progress.mean_log_likelihood,
            improvement = progress.improvement,
            "baum-welch iteration"
        );
    }

    fn on_phase(&mut self, phase: TrainPhase) {
        tracing::debug!(?phase, "baum-welch phase");
    }
}

/// Result of a training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainReport {
    /// Input model with re-estimated means and variances.
    pub model: Hmm,
    /// Total log-likelihood under `model`.
    pub log_likelihood: f64,
    pub iterations: usize,
    pub outcome: TrainOutcome,
    /// Log-likelihood under the initial parameters, then after each iteration.
    pub history: Vec<f64>,
}

impl Summarizable for TrainReport {
    fn summary(&self) -> String {
        format!(
            "Baum-Welch on '{}': {:?} after {} iterations, log-likelihood={:.4}",
            self.model.name(),
            self.outcome,
            self.iterations,
            self.log_likelihood,
        )
    }
}

/// EM trainer for the emission parameters of an [`Hmm`].
#[derive(Debug, Clone)]
pub struct BaumWelch<O = TracingObserver> {
    config: TrainConfig,
    observer: O,
}

impl BaumWelch<TracingObserver> {
    /// Trainer that reports progress through `tracing`.
    pub fn new(config: TrainConfig) -> Result<Self> {
        Self::with_observer(config, TracingObserver)
    }
}

impl<O: TrainObserver> BaumWelch<O> {
    /// Trainer that reports progress to `observer`.
    pub fn with_observer(config: TrainConfig, observer: O) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, observer })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn into_observer(self) -> O {
        self.observer
    }

    fn enter(&mut self, phase: TrainPhase) {
        self.observer.on_phase(phase);
    }

    /// Re-estimate the Gaussians of `hmm` on one utterance (`frames x features`).
    ///
    /// # Errors
    ///
    /// Propagates dimension errors, [`VoxlabError::DegenerateState`] when a
    /// state loses all posterior mass, and [`VoxlabError::InvalidInput`] if
    /// the utterance is impossible under the initial model.
    pub fn train(&mut self, features: ArrayView2<'_, f64>, hmm: &Hmm) -> Result<TrainReport> {
        if features.ncols() != hmm.n_features() {
            return Err(VoxlabError::dimension(
                "feature width",
                hmm.n_features(),
                features.ncols(),
            ));
        }
        let floor = self.config.variance_floor;
        let log_start = hmm.log_start();
        let log_trans = hmm.log_trans();

        self.enter(TrainPhase::Initializing);
        let mut gaussians = hmm.gaussians(floor)?;
        let mut lattice = Lattice::compute(
            gaussians.log_likelihoods(features)?,
            log_start.view(),
            log_trans.view(),
        )?;
        let mut history = vec![lattice.log_likelihood];
        let mut iteration = 0;

        let outcome = loop {
            self.enter(TrainPhase::Expecting);
            let log_gamma = lattice.posteriors()?;

            self.enter(TrainPhase::Maximizing);
            gaussians = update_mean_and_var(features, log_gamma.view(), floor)?;

            self.enter(TrainPhase::CheckingConvergence);
            iteration += 1;
            let next = Lattice::compute(
                gaussians.log_likelihoods(features)?,
                log_start.view(),
                log_trans.view(),
            )?;
            let improvement = next.log_likelihood - lattice.log_likelihood;
            if improvement < -DECREASE_TOLERANCE * lattice.log_likelihood.abs().max(1.0) {
                tracing::warn!(
                    iteration,
                    improvement,
                    "log-likelihood decreased during Baum-Welch"
                );
            }
            self.observer.on_iteration(&IterationProgress {
                iteration,
                log_likelihood: next.log_likelihood,
                mean_log_likelihood: next.mean_log_likelihood(),
                improvement,
            });
            history.push(next.log_likelihood);
            lattice = next;

            if improvement < self.config.stop_threshold {
                break TrainOutcome::Converged;
            }
            if iteration >= self.config.max_iter {
                break TrainOutcome::MaxIterReached;
            }
        };
        self.enter(outcome.into());

        Ok(TrainReport {
            model: hmm.with_gaussians(gaussians)?,
            log_likelihood: lattice.log_likelihood,
            iterations: iteration,
            outcome,
            history,
        })
    }
}
