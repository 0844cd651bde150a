//! Acoustic front-end for the voxlab speech toolkit.
//!
//! - **MFCC**: framing, pre-emphasis, Hamming windowing, power spectrum,
//!   linear/log triangular filterbank, DCT cepstrum and liftering
//! - **DTW**: template matching between feature sequences
//! - **Post-processing**: per-dimension standardisation and context stacking
//!
//! Feature matrices are `frames x features` throughout.

pub mod dtw;
pub mod mfcc;
pub mod normalize;

pub use dtw::{distance_matrix, dtw, euclidean, DtwResult};
pub use mfcc::{
    cepstrum, enframe, hamming, lifter, log_mel_spectrum, mfcc, mspec, power_spectrum, preemp,
    trfbank, windowing, MfccConfig,
};
pub use normalize::{stack_frames, standardize_utterance, Standardizer};
