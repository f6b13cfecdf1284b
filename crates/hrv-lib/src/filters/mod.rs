//! Signal conditioning: zero-phase Butterworth band-pass.

pub mod butterworth;

pub use butterworth::ButterworthBandpass;

use crate::{error::Result, signal::TimeSeries};
use serde::{Deserialize, Serialize};

/// Band-pass parameters applied before beat detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConditionerConfig {
    /// Lower cutoff (Hz), removes baseline wander.
    pub low_cut_hz: f64,
    /// Upper cutoff (Hz), removes muscle and mains noise.
    pub high_cut_hz: f64,
    /// Butterworth prototype order.
    pub order: usize,
}

impl Default for ConditionerConfig {
    fn default() -> Self {
        Self {
            low_cut_hz: 0.5,
            high_cut_hz: 45.0,
            order: 4,
        }
    }
}

impl ConditionerConfig {
    pub fn design(&self, fs: u32) -> Result<ButterworthBandpass> {
        ButterworthBandpass::design(fs, self.low_cut_hz, self.high_cut_hz, self.order)
    }
}

/// Band-pass `ts` without shifting it in time.
pub fn condition(ts: &TimeSeries, cfg: &ConditionerConfig) -> Result<TimeSeries> {
    let data = condition_samples(&ts.data, ts.fs, cfg)?;
    Ok(TimeSeries { fs: ts.fs, data })
}

pub fn condition_samples(samples: &[f64], fs: u32, cfg: &ConditionerConfig) -> Result<Vec<f64>> {
    let filter = cfg.design(fs)?;
    filter.filtfilt(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HrvError;

    #[test]
    fn condition_keeps_rate_and_length() {
        let ts = TimeSeries::new(250, (0..750).map(|i| (i as f64 * 0.1).sin()).collect());
        let out = condition(&ts, &ConditionerConfig::default()).unwrap();
        assert_eq!(out.fs, 250);
        assert_eq!(out.len(), ts.len());
    }

    #[test]
    fn nyquist_violation_is_an_error() {
        let ts = TimeSeries::new(64, vec![0.0; 640]);
        let err = condition(&ts, &ConditionerConfig::default()).unwrap_err();
        assert!(matches!(err, HrvError::InvalidFilterSpecification { fs: 64, .. }));
    }

    #[test]
    fn lower_order_needs_less_padding() {
        let cfg = ConditionerConfig {
            order: 2,
            ..ConditionerConfig::default()
        };
        // 2 sections -> 15 samples of padding
        assert!(condition_samples(&[0.0; 16], 250, &cfg).is_ok());
        assert!(matches!(
            condition_samples(&[0.0; 15], 250, &cfg),
            Err(HrvError::EmptySignal { len: 15, min_len: 15 })
        ));
    }
}
