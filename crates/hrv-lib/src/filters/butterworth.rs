use crate::error::{ensure_sampling_rate, HrvError, Result};
use num_complex::Complex64;
use sci_rs::signal::filter::{
    design::{butter_dyn, DigitalFilter, FilterBandType, FilterOutputType, Sos},
    sosfiltfilt_dyn,
};
use std::f64::consts::PI;

/// Digital Butterworth band-pass stored as a cascade of second-order sections.
///
/// An order-`n` design has `n` sections (a `2n`-order transfer function) and
/// -3 dB at both cutoffs.
#[derive(Debug, Clone)]
pub struct ButterworthBandpass {
    sections: Vec<Sos<f64>>,
}

impl ButterworthBandpass {
    pub fn design(fs: u32, low_cut_hz: f64, high_cut_hz: f64, order: usize) -> Result<Self> {
        ensure_sampling_rate(fs)?;
        let invalid = |reason| HrvError::InvalidFilterSpecification {
            reason,
            low_cut_hz,
            high_cut_hz,
            order,
            fs,
        };
        let nyquist = fs as f64 / 2.0;
        if order == 0 {
            return Err(invalid("order must be at least 1"));
        }
        if !low_cut_hz.is_finite() || !high_cut_hz.is_finite() {
            return Err(invalid("cutoffs must be finite"));
        }
        if low_cut_hz <= 0.0 {
            return Err(invalid("low cutoff must be positive"));
        }
        if low_cut_hz >= high_cut_hz {
            return Err(invalid("low cutoff must be below high cutoff"));
        }
        if high_cut_hz >= nyquist {
            return Err(invalid("high cutoff must be below the Nyquist frequency"));
        }

        let filter = butter_dyn(
            order,
            vec![low_cut_hz, high_cut_hz],
            Some(FilterBandType::Bandpass),
            Some(false),
            Some(FilterOutputType::Sos),
            Some(fs as f64),
        );
        let sections = match filter {
            DigitalFilter::Sos(sos) => sos.sos,
            _ => return Err(invalid("design did not produce second-order sections")),
        };
        // poles of 1 + a1 z^-1 + a2 z^-2 lie inside the unit circle
        let stable = |s: &Sos<f64>| {
            let [a0, a1, a2] = s.a;
            let (a1, a2) = (a1 / a0, a2 / a0);
            a2.abs() < 1.0 && a1.abs() < 1.0 + a2
        };
        if sections.is_empty() || !sections.iter().all(stable) {
            return Err(invalid("design is numerically unstable"));
        }
        log::debug!(
            "designed order-{} Butterworth band-pass {}-{} Hz at {} Hz ({} sections)",
            order,
            low_cut_hz,
            high_cut_hz,
            fs,
            sections.len()
        );
        Ok(Self { sections })
    }

    pub fn sections(&self) -> &[Sos<f64>] {
        &self.sections
    }

    /// Shortest input [`Self::filtfilt`] rejects: odd padding of
    /// `3 * (2 * sections + 1)` samples on each side needs more than that.
    pub fn padlen(&self) -> usize {
        3 * (2 * self.sections.len() + 1)
    }

    /// Magnitude response at `freq_hz` for a signal sampled at `fs`.
    pub fn magnitude_at(&self, freq_hz: f64, fs: u32) -> f64 {
        let z_inv = Complex64::from_polar(1.0, -2.0 * PI * freq_hz / fs as f64);
        self.sections
            .iter()
            .map(|s| {
                let num = s.b[0] + z_inv * (s.b[1] + z_inv * s.b[2]);
                let den = s.a[0] + z_inv * (s.a[1] + z_inv * s.a[2]);
                num / den
            })
            .product::<Complex64>()
            .norm()
    }

    /// Forward-backward filtering with odd extension and steady-state initial
    /// conditions. Output is the same length as `data` and has no phase lag.
    pub fn filtfilt(&self, data: &[f64]) -> Result<Vec<f64>> {
        let pad = self.padlen();
        if data.len() <= pad {
            return Err(HrvError::EmptySignal {
                len: data.len(),
                min_len: pad,
            });
        }
        Ok(sosfiltfilt_dyn(data.iter(), &self.sections))
    }
}
