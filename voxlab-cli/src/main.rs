//! voxlab - speech recognition lab pipeline on the command line.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod io;

use commands::{
    ConcatCommand, DtwCommand, EvaluateCommand, LatticeCommand, MfccCommand, RecognizeCommand,
    TrainCommand, ViterbiCommand,
};
use config::FileConfig;

/// Feature extraction, HMM decoding and Baum-Welch training.
///
/// Every stage reads JSON files and writes pretty JSON to stdout or `--output`.
#[derive(Parser)]
#[command(name = "voxlab")]
#[command(about = "HMM speech recognition toolkit")]
#[command(version)]
pub struct Cli {
    /// YAML file with `train` and `mfcc` sections
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short = 'o', long, global = true)]
    pub output: Option<PathBuf>,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compute MFCCs (or mel energies) from raw samples
    Mfcc(MfccCommand),
    /// Align utterances with dynamic time warping
    Dtw(DtwCommand),
    /// Concatenate phoneme models into one model
    Concat(ConcatCommand),
    /// Dump emission, forward, backward and posterior matrices
    Lattice(LatticeCommand),
    /// Best state path and its score
    Viterbi(ViterbiCommand),
    /// Isolated word recognition against dictionary word models
    Recognize(RecognizeCommand),
    /// Re-estimate Gaussian emissions with Baum-Welch
    Train(TrainCommand),
    /// Frame-level confusion matrix and accuracy
    Evaluate(EvaluateCommand),
}

fn init_logging(verbose: bool) {
    let default = if verbose { "voxlab=debug" } else { "voxlab=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = FileConfig::load_or_default(cli.config.as_deref())?;

    match &cli.command {
        Commands::Mfcc(cmd) => cmd.run(&cli, &config),
        Commands::Dtw(cmd) => cmd.run(&cli),
        Commands::Concat(cmd) => cmd.run(&cli),
        Commands::Lattice(cmd) => cmd.run(&cli),
        Commands::Viterbi(cmd) => cmd.run(&cli),
        Commands::Recognize(cmd) => cmd.run(&cli),
        Commands::Train(cmd) => cmd.run(&cli, &config),
        Commands::Evaluate(cmd) => cmd.run(&cli),
    }
}
