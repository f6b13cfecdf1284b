//! Synthetic ECG recordings with known beat positions.

use crate::signal::{Events, TimeSeries};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Gaussian components of one beat: (offset from R in s, width in s, amplitude in mV).
const BEAT_MORPHOLOGY: [(f64, f64, f64); 5] = [
    (-0.160, 0.025, 0.15), // P
    (-0.045, 0.015, -0.15), // Q
    (0.000, 0.025, 1.00),  // R
    (0.045, 0.015, -0.30), // S
    (0.250, 0.040, 0.30),  // T
];
const BEAT_SUPPORT_S: f64 = 0.5;
const NOISE_SMOOTHING: usize = 5;
const WANDER_HZ: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyntheticEcgConfig {
    pub fs: u32,
    pub duration_s: f64,
    pub heart_rate_bpm: f64,
    /// Uniform jitter added to every RR interval (+/- seconds).
    pub rr_jitter_s: f64,
    pub first_beat_s: f64,
    /// Peak amplitude of the smoothed white noise.
    pub noise_amplitude: f64,
    pub baseline_wander_amplitude: f64,
    pub seed: u64,
}

impl Default for SyntheticEcgConfig {
    fn default() -> Self {
        Self {
            fs: 250,
            duration_s: 30.0,
            heart_rate_bpm: 75.0,
            rr_jitter_s: 0.0,
            first_beat_s: 0.4,
            noise_amplitude: 0.02,
            baseline_wander_amplitude: 0.1,
            seed: 0,
        }
    }
}

/// Generate a recording; see [`synthetic_ecg_with_beats`] for the beat positions.
pub fn synthetic_ecg(cfg: &SyntheticEcgConfig) -> TimeSeries {
    synthetic_ecg_with_beats(cfg).0
}

/// Generate a recording together with the sample index of every R wave.
pub fn synthetic_ecg_with_beats(cfg: &SyntheticEcgConfig) -> (TimeSeries, Events) {
    let fs = cfg.fs.max(1) as f64;
    let n = (cfg.duration_s * fs).round().max(0.0) as usize;
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let beats = beat_times(cfg, &mut rng);

    let mut data: Vec<f64> = (0..n)
        .map(|i| {
            let t = i as f64 / fs;
            cfg.baseline_wander_amplitude * (2.0 * PI * WANDER_HZ * t).sin()
        })
        .collect();

    let support = (BEAT_SUPPORT_S * fs).ceil() as usize;
    for &beat in &beats {
        let centre = (beat * fs).round() as usize;
        let start = centre.saturating_sub(support);
        let end = (centre + support).min(n);
        for (i, sample) in data.iter_mut().enumerate().take(end).skip(start) {
            let t = i as f64 / fs;
            for &(offset, width, amplitude) in &BEAT_MORPHOLOGY {
                *sample += amplitude * (-0.5 * ((t - beat - offset) / width).powi(2)).exp();
            }
        }
    }

    if cfg.noise_amplitude > 0.0 && n > 0 {
        let white: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..=1.0)).collect();
        let half = NOISE_SMOOTHING / 2;
        for (i, sample) in data.iter_mut().enumerate() {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(n);
            let mean = white[start..end].iter().sum::<f64>() / (end - start) as f64;
            *sample += cfg.noise_amplitude * mean;
        }
    }

    let indices = beats
        .iter()
        .map(|b| (b * fs).round() as usize)
        .filter(|&i| i < n)
        .collect();
    (
        TimeSeries {
            fs: cfg.fs,
            data,
        },
        Events::from_indices(indices),
    )
}

fn beat_times(cfg: &SyntheticEcgConfig, rng: &mut StdRng) -> Vec<f64> {
    let mut beats = Vec::new();
    if cfg.heart_rate_bpm <= 0.0 {
        return beats;
    }
    let period = 60.0 / cfg.heart_rate_bpm;
    let mut t = cfg.first_beat_s.max(0.0);
    while t < cfg.duration_s {
        beats.push(t);
        let jitter = if cfg.rr_jitter_s > 0.0 {
            rng.gen_range(-cfg.rr_jitter_s..=cfg.rr_jitter_s)
        } else {
            0.0
        };
        t += (period + jitter).max(1.0 / cfg.fs.max(1) as f64);
    }
    beats
}
