use crate::{
    error::{ensure_sampling_rate, Result},
    signal::{Events, RRSeries},
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The time-domain metrics reported for every analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HrvMetric {
    MeanRr,
    Sdnn,
    Rmssd,
}

impl HrvMetric {
    pub const ALL: [HrvMetric; 3] = [HrvMetric::MeanRr, HrvMetric::Sdnn, HrvMetric::Rmssd];

    pub fn key(&self) -> &'static str {
        match self {
            HrvMetric::MeanRr => "mean_rr",
            HrvMetric::Sdnn => "sdnn",
            HrvMetric::Rmssd => "rmssd",
        }
    }
}

impl fmt::Display for HrvMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key().to_uppercase())
    }
}

/// Time-domain HRV in milliseconds, each value rounded to 2 decimals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HrvMetrics {
    pub mean_rr: f64,
    pub sdnn: f64,
    pub rmssd: f64,
}

impl HrvMetrics {
    pub fn get(&self, metric: HrvMetric) -> f64 {
        match metric {
            HrvMetric::MeanRr => self.mean_rr,
            HrvMetric::Sdnn => self.sdnn,
            HrvMetric::Rmssd => self.rmssd,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (HrvMetric, f64)> + '_ {
        HrvMetric::ALL.into_iter().map(move |m| (m, self.get(m)))
    }
}

/// Compute HRV from beat indices sampled at `fs`. Fewer than two beats give
/// all-zero metrics.
pub fn compute_hrv(events: &Events, fs: u32) -> Result<HrvMetrics> {
    ensure_sampling_rate(fs)?;
    if events.len() < 2 {
        return Ok(HrvMetrics::default());
    }
    Ok(hrv_time(&RRSeries::from_events(events, fs)))
}

/// Time-domain HRV of an interval series (ms).
pub fn hrv_time(rr: &RRSeries) -> HrvMetrics {
    let n = rr.rr_ms.len();
    if n == 0 {
        return HrvMetrics::default();
    }
    let mean_rr = rr.rr_ms.iter().sum::<f64>() / n as f64;
    // population convention: divide by N
    let sdnn = (rr.rr_ms.iter().map(|x| (x - mean_rr).powi(2)).sum::<f64>() / n as f64).sqrt();
    let rmssd = if n > 1 {
        let sum_sq: f64 = rr.rr_ms.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
        (sum_sq / (n - 1) as f64).sqrt()
    } else {
        0.0
    };
    HrvMetrics {
        mean_rr: round2(mean_rr),
        sdnn: round2(sdnn),
        rmssd: round2(rmssd),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}
