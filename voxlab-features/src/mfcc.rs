//! Mel-frequency cepstral coefficients.
//!
//! The pipeline is
//! `enframe -> preemp -> windowing -> power_spectrum -> log_mel_spectrum -> cepstrum -> lifter`.
//! Every stage after framing maps a `frames x bins` matrix to another one, so
//! intermediate stages can be inspected on their own.

use std::f64::consts::PI;

use ndarray::{Array1, Array2, ArrayView2};
use rustfft::{num_complex::Complex, FftPlanner};
use voxlab_core::{Result, VoxlabError};

/// Lowest filter edge of the filterbank, in Hz.
pub const LOW_FREQ: f64 = 133.33;
/// Spacing of the linear filters, in Hz.
pub const LINEAR_SPACING: f64 = 200.0 / 3.0;
/// Ratio between consecutive log-spaced filter edges.
pub const LOG_SPACING: f64 = 1.0711703;
pub const N_LINEAR_FILTERS: usize = 13;
pub const N_LOG_FILTERS: usize = 27;
pub const N_FILTERS: usize = N_LINEAR_FILTERS + N_LOG_FILTERS;

/// Front-end parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MfccConfig {
    /// Analysis window length in samples.
    pub win_len: usize,
    /// Hop between consecutive windows in samples.
    pub win_shift: usize,
    /// Pre-emphasis coefficient.
    pub preemph: f64,
    /// FFT length; a power of two no shorter than `win_len`.
    pub nfft: usize,
    /// Number of cepstral coefficients kept.
    pub nceps: usize,
    /// Sampling rate in Hz.
    pub sample_rate: u32,
    /// Liftering coefficient; 0 disables liftering.
    pub lifter: usize,
}

impl Default for MfccConfig {
    fn default() -> Self {
        Self {
            win_len: 400,
            win_shift: 200,
            preemph: 0.97,
            nfft: 512,
            nceps: 13,
            sample_rate: 20_000,
            lifter: 22,
        }
    }
}

impl MfccConfig {
    pub fn validate(&self) -> Result<()> {
        if self.win_len == 0 || self.win_shift == 0 {
            return Err(VoxlabError::InvalidInput(
                "win_len and win_shift must be > 0".into(),
            ));
        }
        check_nfft(self.nfft)?;
        if self.nfft < self.win_len {
            return Err(VoxlabError::InvalidInput(format!(
                "nfft {} is shorter than win_len {}",
                self.nfft, self.win_len
            )));
        }
        if self.nceps == 0 || self.nceps > N_FILTERS {
            return Err(VoxlabError::InvalidInput(format!(
                "nceps must be in 1..={N_FILTERS}, got {}",
                self.nceps
            )));
        }
        if self.sample_rate == 0 {
            return Err(VoxlabError::InvalidInput("sample_rate must be > 0".into()));
        }
        if !self.preemph.is_finite() {
            return Err(VoxlabError::InvalidInput("preemph must be finite".into()));
        }
        Ok(())
    }
}

fn check_nfft(nfft: usize) -> Result<()> {
    if !nfft.is_power_of_two() {
        return Err(VoxlabError::InvalidInput(format!(
            "nfft must be a power of two, got {nfft}"
        )));
    }
    Ok(())
}

/// Slice `samples` into overlapping frames (`frames x win_len`).
///
/// Only frames that fit entirely inside the signal are kept.
pub fn enframe(samples: &[f64], win_len: usize, win_shift: usize) -> Result<Array2<f64>> {
    if win_len == 0 || win_shift == 0 {
        return Err(VoxlabError::InvalidInput(
            "win_len and win_shift must be > 0".into(),
        ));
    }
    if samples.len() < win_len {
        return Err(VoxlabError::InvalidInput(format!(
            "signal of {} samples is shorter than one {win_len}-sample window",
            samples.len()
        )));
    }
    let n_frames = (samples.len() - win_len) / win_shift + 1;
    Ok(Array2::from_shape_fn((n_frames, win_len), |(i, j)| {
        samples[i * win_shift + j]
    }))
}

/// Per-frame pre-emphasis `y[n] = x[n] - p * x[n-1]`, with `y[0] = x[0]`.
pub fn preemp(frames: ArrayView2<'_, f64>, p: f64) -> Array2<f64> {
    let mut out = frames.to_owned();
    for (mut row, src) in out.rows_mut().into_iter().zip(frames.rows()) {
        for n in 1..src.len() {
            row[n] = src[n] - p * src[n - 1];
        }
    }
    out
}

/// Periodic Hamming window of length `n`.
pub fn hamming(n: usize) -> Array1<f64> {
    Array1::from_shape_fn(n, |i| 0.54 - 0.46 * (2.0 * PI * i as f64 / n as f64).cos())
}

/// Multiply every frame by a periodic Hamming window.
pub fn windowing(frames: ArrayView2<'_, f64>) -> Array2<f64> {
    &frames * &hamming(frames.ncols())
}

/// `|FFT|^2` of every frame over `nfft` points (`frames x nfft`).
///
/// Frames shorter than `nfft` are zero-padded, longer ones truncated.
pub fn power_spectrum(frames: ArrayView2<'_, f64>, nfft: usize) -> Result<Array2<f64>> {
    check_nfft(nfft)?;
    let fft = FftPlanner::<f64>::new().plan_fft_forward(nfft);
    let mut buffer = vec![Complex::new(0.0, 0.0); nfft];
    let mut spec = Array2::zeros((frames.nrows(), nfft));
    for (mut dst, frame) in spec.rows_mut().into_iter().zip(frames.rows()) {
        buffer.fill(Complex::new(0.0, 0.0));
        for (b, &x) in buffer.iter_mut().zip(frame.iter()) {
            *b = Complex::new(x, 0.0);
        }
        fft.process(&mut buffer);
        for (d, c) in dst.iter_mut().zip(&buffer) {
            *d = c.norm_sqr();
        }
    }
    Ok(spec)
}

/// Triangular filterbank (`filters x nfft`): 13 linear filters followed by
/// 27 log-spaced ones, each with unit-area height `2 / (hi - lo)`.
pub fn trfbank(sample_rate: f64, nfft: usize) -> Array2<f64> {
    let mut edges = [0.0; N_FILTERS + 2];
    for (i, edge) in edges.iter_mut().take(N_LINEAR_FILTERS).enumerate() {
        *edge = LOW_FREQ + i as f64 * LINEAR_SPACING;
    }
    let last_linear = edges[N_LINEAR_FILTERS - 1];
    for (k, edge) in edges.iter_mut().skip(N_LINEAR_FILTERS).enumerate() {
        *edge = last_linear * LOG_SPACING.powi(k as i32 + 1);
    }

    let scale = nfft as f64 / sample_rate;
    let bin = |f: f64| (((f * scale).floor() as usize) + 1).min(nfft);
    let bin_freq = |k: usize| k as f64 / scale;

    let mut bank = Array2::zeros((N_FILTERS, nfft));
    for (i, mut filter) in bank.rows_mut().into_iter().enumerate() {
        let (lo, cen, hi) = (edges[i], edges[i + 1], edges[i + 2]);
        let height = 2.0 / (hi - lo);
        for k in bin(lo)..bin(cen) {
            filter[k] = height / (cen - lo) * (bin_freq(k) - lo);
        }
        for k in bin(cen)..bin(hi) {
            filter[k] = height / (hi - cen) * (hi - bin_freq(k));
        }
    }
    bank
}

/// Log filterbank energies (`frames x filters`) of a power spectrum.
///
/// Energies are floored at the smallest positive `f64` so silent frames
/// stay finite.
pub fn log_mel_spectrum(spec: ArrayView2<'_, f64>, sample_rate: f64) -> Array2<f64> {
    let bank = trfbank(sample_rate, spec.ncols());
    spec.dot(&bank.t()).mapv(|e| e.max(f64::MIN_POSITIVE).ln())
}

/// Orthonormal DCT-II of every row, keeping the first `nceps` coefficients.
pub fn cepstrum(mspec: ArrayView2<'_, f64>, nceps: usize) -> Result<Array2<f64>> {
    let n = mspec.ncols();
    if nceps == 0 || nceps > n {
        return Err(VoxlabError::InvalidInput(format!(
            "nceps must be in 1..={n}, got {nceps}"
        )));
    }
    // basis[[j, k]]: weight of input j in coefficient k.
    let basis = Array2::from_shape_fn((n, nceps), |(j, k)| {
        let s = if k == 0 { (1.0 / n as f64).sqrt() } else { (2.0 / n as f64).sqrt() };
        s * (PI * k as f64 * (2 * j + 1) as f64 / (2 * n) as f64).cos()
    });
    Ok(mspec.dot(&basis))
}

/// Sinusoidal liftering `c[n] * (1 + l/2 * sin(pi n / l))`.
pub fn lifter(ceps: ArrayView2<'_, f64>, l: usize) -> Array2<f64> {
    if l == 0 {
        return ceps.to_owned();
    }
    let l = l as f64;
    let weights = Array1::from_shape_fn(ceps.ncols(), |n| {
        1.0 + l / 2.0 * (PI * n as f64 / l).sin()
    });
    &ceps * &weights
}

/// Log mel filterbank energies of `samples` (`frames x filters`).
pub fn mspec(samples: &[f64], config: &MfccConfig) -> Result<Array2<f64>> {
    config.validate()?;
    let frames = enframe(samples, config.win_len, config.win_shift)?;
    let windowed = windowing(preemp(frames.view(), config.preemph).view());
    let spec = power_spectrum(windowed.view(), config.nfft)?;
    let out = log_mel_spectrum(spec.view(), f64::from(config.sample_rate));
    tracing::debug!(frames = out.nrows(), "computed mel spectrum");
    Ok(out)
}

/// Liftered MFCCs of `samples` (`frames x nceps`).
pub fn mfcc(samples: &[f64], config: &MfccConfig) -> Result<Array2<f64>> {
    let mel = mspec(samples, config)?;
    let ceps = cepstrum(mel.view(), config.nceps)?;
    Ok(lifter(ceps.view(), config.lifter))
}
