//! One entry point per pipeline stage.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;
use ndarray::ArrayView2;
use voxlab_core::Summarizable;
use voxlab_eval::{argmax_rows, ConfusionMatrix, StateList};
use voxlab_features::{
    distance_matrix, dtw, euclidean, mfcc, mspec, stack_frames, standardize_utterance, MfccConfig,
};
use voxlab_hmm::{
    score_utterance, word_models, BaumWelch, HmmSpec, Lattice, TrainConfig, TrainOutcome,
    UtteranceScore, MIN_VARIANCE,
};

use crate::config::FileConfig;
use crate::io::{load_matrix, load_models, read_json, resolve_model, rows, write_json};
use crate::Cli;

// ---------------------------------------------------------------------------
// mfcc
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct MfccCommand {
    /// JSON array of raw samples
    pub samples: PathBuf,
    /// Emit log mel filterbank energies instead of cepstra
    #[arg(long)]
    pub mspec: bool,
    /// Standardise each coefficient over the utterance
    #[arg(long)]
    pub standardize: bool,
    /// Stack each frame with this many mirrored neighbours per side
    #[arg(long, default_value_t = 0)]
    pub context: usize,
    #[arg(long)]
    pub nceps: Option<usize>,
    #[arg(long)]
    pub sample_rate: Option<u32>,
}

impl MfccCommand {
    /// `base` with every flag given on the command line applied on top.
    fn params(&self, base: &MfccConfig) -> MfccConfig {
        let mut params = *base;
        if let Some(n) = self.nceps {
            params.nceps = n;
        }
        if let Some(fs) = self.sample_rate {
            params.sample_rate = fs;
        }
        params
    }

    pub fn run(&self, cli: &Cli, config: &FileConfig) -> Result<()> {
        let params = self.params(&config.mfcc);
        let samples: Vec<f64> = read_json(&self.samples)?;
        let mut features = if self.mspec {
            mspec(&samples, &params)?
        } else {
            mfcc(&samples, &params)?
        };
        if self.standardize {
            features = standardize_utterance(features.view())?;
        }
        if self.context > 0 {
            features = stack_frames(features.view(), self.context)?;
        }
        tracing::info!(frames = features.nrows(), dims = features.ncols(), "extracted features");
        write_json(&rows(features.view()), cli.output.as_deref())
    }
}

// ---------------------------------------------------------------------------
// dtw
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct DtwCommand {
    /// Feature matrices; two give an alignment, more give a distance matrix
    #[arg(required = true, num_args = 2..)]
    pub utterances: Vec<PathBuf>,
}

#[derive(Serialize)]
struct Alignment {
    distance: f64,
    path: Vec<(usize, usize)>,
    local: Vec<Vec<f64>>,
    accumulated: Vec<Vec<f64>>,
}

impl DtwCommand {
    pub fn run(&self, cli: &Cli) -> Result<()> {
        let features = self
            .utterances
            .iter()
            .map(|p| load_matrix(p))
            .collect::<Result<Vec<_>>>()?;
        if let [x, y] = features.as_slice() {
            let r = dtw(x.view(), y.view(), euclidean)?;
            tracing::info!(distance = r.distance, steps = r.path.len(), "aligned");
            write_json(
                &Alignment {
                    distance: r.distance,
                    path: r.path,
                    local: rows(r.local.view()),
                    accumulated: rows(r.accumulated.view()),
                },
                cli.output.as_deref(),
            )
        } else {
            let d = distance_matrix(&features)?;
            write_json(&rows(d.view()), cli.output.as_deref())
        }
    }
}

// ---------------------------------------------------------------------------
// concat
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct ConcatCommand {
    /// JSON model inventory (name -> model)
    pub models: PathBuf,
    /// Models to chain, left to right
    #[arg(required = true)]
    pub names: Vec<String>,
    /// Name of the composite model
    #[arg(long)]
    pub name: Option<String>,
}

impl ConcatCommand {
    pub fn run(&self, cli: &Cli) -> Result<()> {
        let models = load_models(&self.models)?;
        let mut hmm = resolve_model(&models, &self.names.join("+"))?;
        if let Some(name) = &self.name {
            hmm = hmm.with_name(name.clone());
        }
        tracing::info!(name = hmm.name(), states = hmm.n_states(), "concatenated");
        write_json(&HmmSpec::from(&hmm), cli.output.as_deref())
    }
}

// ---------------------------------------------------------------------------
// lattice / viterbi
// ---------------------------------------------------------------------------

/// A model (or `a+b+c` composite) scored against one utterance.
#[derive(Args)]
pub struct ModelInput {
    /// JSON model inventory (name -> model)
    #[arg(long)]
    pub models: PathBuf,
    /// Model name; `a+b+c` concatenates
    #[arg(long)]
    pub model: String,
    /// Feature matrix (frames x features)
    pub features: PathBuf,
}

#[derive(Args)]
pub struct LatticeCommand {
    #[command(flatten)]
    pub input: ModelInput,
}

#[derive(Serialize)]
struct LatticeDump {
    model: String,
    log_likelihood: f64,
    log_emlik: Vec<Vec<f64>>,
    alpha: Vec<Vec<f64>>,
    beta: Vec<Vec<f64>>,
    log_gamma: Vec<Vec<f64>>,
}

impl LatticeCommand {
    pub fn run(&self, cli: &Cli) -> Result<()> {
        let models = load_models(&self.input.models)?;
        let hmm = resolve_model(&models, &self.input.model)?;
        let features = load_matrix(&self.input.features)?;

        let log_emlik = hmm.log_emissions(features.view(), MIN_VARIANCE)?;
        let lattice = Lattice::compute(log_emlik, hmm.log_start().view(), hmm.log_trans().view())?;
        let log_gamma = lattice.posteriors()?;
        tracing::info!(
            model = hmm.name(),
            log_likelihood = lattice.log_likelihood,
            "computed lattice"
        );
        write_json(
            &LatticeDump {
                model: hmm.name().to_string(),
                log_likelihood: lattice.log_likelihood,
                log_emlik: rows(lattice.log_emlik.view()),
                alpha: rows(lattice.alpha.view()),
                beta: rows(lattice.beta.view()),
                log_gamma: rows(log_gamma.view()),
            },
            cli.output.as_deref(),
        )
    }
}

#[derive(Args)]
pub struct ViterbiCommand {
    #[command(flatten)]
    pub input: ModelInput,
}

impl ViterbiCommand {
    pub fn run(&self, cli: &Cli) -> Result<()> {
        let models = load_models(&self.input.models)?;
        let hmm = resolve_model(&models, &self.input.model)?;
        let features = load_matrix(&self.input.features)?;

        let score = score_utterance(features.view(), &hmm)?;
        tracing::info!(
            model = hmm.name(),
            viterbi = score.viterbi_log_likelihood,
            forward = score.log_likelihood,
            "decoded"
        );
        write_json(&score, cli.output.as_deref())
    }
}

// ---------------------------------------------------------------------------
// recognize
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct RecognizeCommand {
    /// JSON phoneme inventory (name -> model)
    #[arg(long)]
    pub models: PathBuf,
    /// JSON pronunciation dictionary (word -> phonemes)
    #[arg(long)]
    pub dictionary: PathBuf,
    /// Phoneme wrapped around every word
    #[arg(long, default_value = "sil")]
    pub silence: String,
    /// Feature matrices, one per utterance
    #[arg(required = true)]
    pub utterances: Vec<PathBuf>,
}

#[derive(Serialize)]
struct Recognition {
    utterance: PathBuf,
    best: String,
    scores: Vec<UtteranceScore>,
}

impl RecognizeCommand {
    pub fn run(&self, cli: &Cli) -> Result<()> {
        let phonemes = load_models(&self.models)?;
        let dictionary: BTreeMap<String, Vec<String>> = read_json(&self.dictionary)?;
        let words = word_models(&phonemes, &dictionary, &self.silence)?;

        let mut results = Vec::with_capacity(self.utterances.len());
        for path in &self.utterances {
            let features = load_matrix(path)?;
            let scores = voxlab_hmm::recognize(features.view(), words.values())
                .with_context(|| format!("scoring {}", path.display()))?;
            let best = scores.first().map(|s| s.model.clone()).unwrap_or_default();
            tracing::info!(utterance = %path.display(), best = %best, "recognized");
            results.push(Recognition {
                utterance: path.clone(),
                best,
                scores,
            });
        }
        write_json(&results, cli.output.as_deref())
    }
}

// ---------------------------------------------------------------------------
// train
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct TrainCommand {
    #[command(flatten)]
    pub input: ModelInput,
    #[arg(long)]
    pub max_iter: Option<usize>,
    #[arg(long)]
    pub stop_threshold: Option<f64>,
    #[arg(long)]
    pub variance_floor: Option<f64>,
}

#[derive(Serialize)]
struct Trained {
    summary: String,
    outcome: TrainOutcome,
    iterations: usize,
    log_likelihood: f64,
    history: Vec<f64>,
    model: HmmSpec,
}

impl TrainCommand {
    /// `base` with every flag given on the command line applied on top.
    fn params(&self, base: &TrainConfig) -> TrainConfig {
        let mut params = *base;
        if let Some(v) = self.max_iter {
            params.max_iter = v;
        }
        if let Some(v) = self.stop_threshold {
            params.stop_threshold = v;
        }
        if let Some(v) = self.variance_floor {
            params.variance_floor = v;
        }
        params
    }

    pub fn run(&self, cli: &Cli, config: &FileConfig) -> Result<()> {
        let params = self.params(&config.train);
        let models = load_models(&self.input.models)?;
        let hmm = resolve_model(&models, &self.input.model)?;
        let features = load_matrix(&self.input.features)?;

        let mut trainer = BaumWelch::new(params)?;
        let report = trainer
            .train(features.view(), &hmm)
            .with_context(|| format!("training '{}'", hmm.name()))?;
        tracing::info!("{}", report.summary());

        write_json(
            &Trained {
                summary: report.summary(),
                outcome: report.outcome,
                iterations: report.iterations,
                log_likelihood: report.log_likelihood,
                history: report.history.clone(),
                model: HmmSpec::from(&report.model),
            },
            cli.output.as_deref(),
        )
    }
}

// ---------------------------------------------------------------------------
// evaluate
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct EvaluateCommand {
    /// Posterior matrix (frames x states)
    #[arg(long)]
    pub posteriors: PathBuf,
    /// JSON array of target state indices, one per frame
    #[arg(long)]
    pub targets: PathBuf,
    /// JSON array of state names; merges states into phonemes
    #[arg(long)]
    pub states: Option<PathBuf>,
    /// Zero the diagonal of the reported counts
    #[arg(long)]
    pub errors_only: bool,
}

#[derive(Serialize)]
struct Evaluation {
    summary: String,
    accuracy: f64,
    classes: Option<Vec<String>>,
    recall: Vec<f64>,
    counts: Vec<Vec<usize>>,
    normalized: Vec<Vec<f64>>,
}

impl EvaluateCommand {
    pub fn run(&self, cli: &Cli) -> Result<()> {
        let posteriors = load_matrix(&self.posteriors)?;
        let targets: Vec<usize> = read_json(&self.targets)?;
        let states = match &self.states {
            Some(path) => Some(read_json::<Vec<String>>(path)?),
            None => None,
        };
        let evaluation = self.evaluate(posteriors.view(), targets, states)?;
        tracing::info!("{}", evaluation.summary);
        write_json(&evaluation, cli.output.as_deref())
    }

    fn evaluate(
        &self,
        posteriors: ArrayView2<'_, f64>,
        targets: Vec<usize>,
        states: Option<Vec<String>>,
    ) -> Result<Evaluation> {
        let predicted = argmax_rows(posteriors.view());
        if predicted.len() != targets.len() {
            bail!(
                "{} posterior frames but {} targets",
                predicted.len(),
                targets.len()
            );
        }

        let (actual, predicted, classes, n_classes) = match states {
            Some(names) => {
                let list = StateList::new(names)?;
                (
                    list.phoneme_labels(&targets)?,
                    list.phoneme_labels(&predicted)?,
                    Some(list.phonemes().to_vec()),
                    list.phonemes().len(),
                )
            }
            None => (targets, predicted, None, posteriors.ncols()),
        };

        let mut cm = ConfusionMatrix::from_labels(&actual, &predicted, Some(n_classes))?;
        let summary = cm.summary();
        let accuracy = cm.accuracy();
        let recall = (0..cm.n_classes()).map(|c| cm.recall(c)).collect();
        let normalized = rows(cm.row_normalized().view());
        if self.errors_only {
            cm.clear_diagonal_entries();
        }

        Ok(Evaluation {
            summary,
            accuracy,
            classes,
            recall,
            counts: cm.counts().rows().into_iter().map(|r| r.to_vec()).collect(),
            normalized,
        })
    }
}
