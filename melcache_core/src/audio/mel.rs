//! Mel power spectrogram in decibels: centered STFT -> Slaney mel filterbank
//! -> `power_to_db` referenced to the buffer's own maximum.
//!
//! Frames are centered by zero-padding `n_fft / 2` samples on both sides, so
//! a buffer of `n` samples yields `1 + (n + 2 * (n_fft / 2) - n_fft) / hop_length`
//! frames (`1 + n / hop_length` for even `n_fft`).

use ndarray::Array2;
use realfft::{RealFftPlanner, RealToComplex};
use std::f64::consts::PI;
use std::sync::Arc;

use crate::config::MelConfig;
use crate::error::ExtractError;
use crate::types::{AudioBuffer, FeatureMatrix};

/// Power floor applied before taking logarithms.
pub const AMIN: f32 = 1e-10;

/// Precomputed transform for one sample rate.
pub struct MelSpectrogram {
    n_fft: usize,
    hop_length: usize,
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    filterbank: Array2<f32>, // [n_mels, n_fft/2 + 1]
}

impl MelSpectrogram {
    pub fn new(config: &MelConfig, sample_rate: u32) -> Result<Self, ExtractError> {
        if sample_rate == 0 {
            return Err(ExtractError::InvalidSampleRate(sample_rate));
        }

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(config.n_fft);

        // Periodic Hann window
        let window: Vec<f32> = (0..config.n_fft)
            .map(|i| (0.5 - 0.5 * (2.0 * PI * i as f64 / config.n_fft as f64).cos()) as f32)
            .collect();

        let f_max = config.f_max.unwrap_or(sample_rate as f32 / 2.0);
        if !(f_max > config.f_min) {
            return Err(ExtractError::InvalidBandEdges {
                f_min: config.f_min,
                f_max,
            });
        }
        let filterbank = mel_filterbank(
            sample_rate,
            config.n_fft,
            config.n_mels,
            config.f_min,
            f_max,
        );

        Ok(Self {
            n_fft: config.n_fft,
            hop_length: config.hop_length,
            fft,
            window,
            filterbank,
        })
    }

    pub fn n_mels(&self) -> usize {
        self.filterbank.nrows()
    }

    /// Frames covering `n_samples` once centered; 0 for an empty signal.
    pub fn n_frames(&self, n_samples: usize) -> usize {
        if n_samples == 0 {
            return 0;
        }
        let padded = n_samples + 2 * (self.n_fft / 2);
        1 + (padded - self.n_fft) / self.hop_length
    }

    /// Mel power spectrogram `[n_mels, n_frames]`.
    pub fn power(&self, samples: &[f32]) -> Result<Array2<f32>, ExtractError> {
        validate_signal(samples)?;

        let pad = self.n_fft / 2;
        let mut padded = vec![0.0f32; samples.len() + 2 * pad];
        padded[pad..pad + samples.len()].copy_from_slice(samples);

        let n_frames = self.n_frames(samples.len());
        let n_bins = self.n_fft / 2 + 1;
        let mut mel = Array2::<f32>::zeros((self.n_mels(), n_frames));

        let mut input = self.fft.make_input_vec();
        let mut spectrum = self.fft.make_output_vec();
        let mut power = vec![0.0f32; n_bins];

        for frame in 0..n_frames {
            let start = frame * self.hop_length;
            let segment = &padded[start..start + self.n_fft];
            for ((dst, &x), &w) in input.iter_mut().zip(segment).zip(&self.window) {
                *dst = x * w;
            }

            self.fft
                .process(&mut input, &mut spectrum)
                .map_err(|e| ExtractError::Fft(e.to_string()))?;

            for (p, c) in power.iter_mut().zip(&spectrum) {
                *p = c.norm_sqr();
            }

            for (mel_idx, filter) in self.filterbank.outer_iter().enumerate() {
                let energy: f32 = filter.iter().zip(&power).map(|(w, p)| w * p).sum();
                mel[[mel_idx, frame]] = energy;
            }
        }

        Ok(mel)
    }

    /// Mel spectrogram in decibels relative to its own peak.
    pub fn db(&self, samples: &[f32], top_db: Option<f32>) -> Result<FeatureMatrix, ExtractError> {
        let mut spec = self.power(samples)?;
        power_to_db(&mut spec, top_db);
        Ok(spec)
    }
}

/// Features for one buffer using `config`.
pub fn mel_db(buffer: &AudioBuffer, config: &MelConfig) -> Result<FeatureMatrix, ExtractError> {
    MelSpectrogram::new(config, buffer.sample_rate)?.db(&buffer.samples, config.top_db)
}

fn validate_signal(samples: &[f32]) -> Result<(), ExtractError> {
    if samples.is_empty() {
        return Err(ExtractError::EmptySignal);
    }
    if let Some(pos) = samples.iter().position(|s| !s.is_finite()) {
        return Err(ExtractError::NonFinite(pos));
    }
    Ok(())
}

/// `10 * log10(S / max(S))` in place, floored at `max - top_db`.
pub fn power_to_db(spec: &mut Array2<f32>, top_db: Option<f32>) {
    let reference = spec.iter().cloned().fold(0.0f32, f32::max).max(AMIN);
    let ref_db = 10.0 * reference.log10();

    spec.mapv_inplace(|p| 10.0 * p.max(AMIN).log10() - ref_db);

    if let Some(top_db) = top_db {
        let peak = spec.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let floor = peak - top_db;
        spec.mapv_inplace(|v| v.max(floor));
    }
}

// Slaney mel scale: linear below 1 kHz, logarithmic above.
const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

pub fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

pub fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        mel * F_SP
    }
}

/// Triangular filters on the Slaney scale with area normalization.
fn mel_filterbank(
    sample_rate: u32,
    n_fft: usize,
    n_mels: usize,
    f_min: f32,
    f_max: f32,
) -> Array2<f32> {
    let n_bins = n_fft / 2 + 1;
    let sr = sample_rate as f64;

    let fft_freqs: Vec<f64> = (0..n_bins)
        .map(|k| k as f64 * sr / n_fft as f64)
        .collect();

    let mel_min = hz_to_mel(f_min as f64);
    let mel_max = hz_to_mel(f_max as f64);
    let hz_points: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f64 / (n_mels + 1) as f64))
        .collect();

    let mut filterbank = Array2::<f32>::zeros((n_mels, n_bins));
    for m in 0..n_mels {
        let (left, center, right) = (hz_points[m], hz_points[m + 1], hz_points[m + 2]);
        let enorm = 2.0 / (right - left);
        for (k, &freq) in fft_freqs.iter().enumerate() {
            let lower = (freq - left) / (center - left);
            let upper = (right - freq) / (right - center);
            let weight = lower.min(upper).max(0.0);
            filterbank[[m, k]] = (weight * enorm) as f32;
        }
    }

    filterbank
}
