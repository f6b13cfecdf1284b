use crate::{
    error::{ensure_sampling_rate, Result},
    signal::{seconds_to_samples, Events, TimeSeries},
};
use serde::{Deserialize, Serialize};

/// Which candidate survives when two envelope maxima fall inside one
/// refractory window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefractoryPolicy {
    /// Keep the larger envelope value; equal values keep the later index, as
    /// `scipy.signal.find_peaks(distance=..)` does.
    #[default]
    Highest,
    /// Keep the first candidate and drop anything closer than the refractory
    /// distance after it.
    Earliest,
}

/// Configurable parameters for Pan–Tompkins-style beat detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Moving window integration length (seconds).
    pub integration_window_s: f64,
    /// Minimum spacing between beats (seconds).
    pub refractory_s: f64,
    /// Threshold distance above the envelope mean, in standard deviations.
    pub threshold_sd: f64,
    pub refractory_policy: RefractoryPolicy,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            integration_window_s: 0.150,
            refractory_s: 0.300,
            threshold_sd: 2.0,
            refractory_policy: RefractoryPolicy::Highest,
        }
    }
}

/// Integrated squared-slope envelope with its global detection threshold.
///
/// `values[i]` describes the slope between conditioned samples `i` and `i + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub fs: u32,
    pub window: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub threshold: f64,
    pub values: Vec<f64>,
}

/// Detect R-peaks with the default configuration.
pub fn detect_r_peaks(ts: &TimeSeries) -> Result<Events> {
    detect_beats(ts, &DetectorConfig::default())
}

/// Locate beats in a conditioned signal. Indices refer to `ts.data`.
pub fn detect_beats(ts: &TimeSeries, cfg: &DetectorConfig) -> Result<Events> {
    let envelope = pan_tompkins_envelope(ts, cfg)?;
    if envelope.values.len() < 2 {
        return Ok(Events::default());
    }
    let candidates: Vec<usize> = local_maxima(&envelope.values)
        .into_iter()
        .filter(|&i| envelope.values[i] > envelope.threshold)
        .collect();
    let distance = seconds_to_samples(cfg.refractory_s, ts.fs);
    let kept = select_by_refractory(
        &candidates,
        &envelope.values,
        distance,
        cfg.refractory_policy,
    );
    log::debug!(
        "{} envelope maxima above {:.6}, {} kept with {} sample refractory ({:?})",
        candidates.len(),
        envelope.threshold,
        kept.len(),
        distance,
        cfg.refractory_policy
    );
    // differencing drops the first sample; shift back into signal index space
    Ok(Events::from_indices(kept.into_iter().map(|i| i + 1).collect()))
}

/// Differentiate, square and integrate `ts`, then derive the global threshold.
pub fn pan_tompkins_envelope(ts: &TimeSeries, cfg: &DetectorConfig) -> Result<Envelope> {
    ensure_sampling_rate(ts.fs)?;
    let window = seconds_to_samples(cfg.integration_window_s, ts.fs);
    let derivative = differentiate(&ts.data);
    let squared = square(&derivative);
    let values = centred_moving_average(&squared, window);
    let (mean, std_dev) = mean_std(&values);
    Ok(Envelope {
        fs: ts.fs,
        window,
        mean,
        std_dev,
        threshold: mean + cfg.threshold_sd * std_dev,
        values,
    })
}

fn differentiate(data: &[f64]) -> Vec<f64> {
    data.windows(2).map(|w| w[1] - w[0]).collect()
}

fn square(data: &[f64]) -> Vec<f64> {
    data.iter().map(|x| x * x).collect()
}

/// Rectangular moving average aligned on the output sample; samples outside
/// the input count as zero and every output is divided by the full width.
fn centred_moving_average(data: &[f64], win: usize) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let win = win.max(1);
    let ahead = (win - 1) / 2;
    let behind = win - 1 - ahead;
    let mut prefix = Vec::with_capacity(data.len() + 1);
    prefix.push(0.0);
    let mut acc = 0.0;
    for &sample in data {
        acc += sample;
        prefix.push(acc);
    }
    let last = data.len() - 1;
    (0..data.len())
        .map(|i| {
            let start = i.saturating_sub(behind);
            let end = (i + ahead).min(last);
            (prefix[end + 1] - prefix[start]) / win as f64
        })
        .collect()
}

/// Mean and population standard deviation.
fn mean_std(data: &[f64]) -> (f64, f64) {
    if data.is_empty() {
        return (0.0, 0.0);
    }
    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    let var = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Interior local maxima. A flat top reports its middle sample (rounded
/// down); plateaus touching either end are not maxima.
fn local_maxima(data: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if data.len() < 3 {
        return peaks;
    }
    let last = data.len() - 1;
    let mut i = 1;
    while i < last {
        if data[i - 1] < data[i] {
            let mut ahead = i + 1;
            while ahead < last && data[ahead] == data[i] {
                ahead += 1;
            }
            if data[ahead] < data[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

/// Thin ascending `candidates` so that survivors are at least `distance`
/// samples apart.
fn select_by_refractory(
    candidates: &[usize],
    values: &[f64],
    distance: usize,
    policy: RefractoryPolicy,
) -> Vec<usize> {
    match policy {
        RefractoryPolicy::Earliest => {
            let mut kept: Vec<usize> = Vec::with_capacity(candidates.len());
            for &c in candidates {
                if kept.last().map_or(true, |&prev| c - prev >= distance) {
                    kept.push(c);
                }
            }
            kept
        }
        RefractoryPolicy::Highest => {
            let mut priority: Vec<usize> = (0..candidates.len()).collect();
            priority.sort_by(|&a, &b| {
                values[candidates[b]]
                    .total_cmp(&values[candidates[a]])
                    .then(candidates[b].cmp(&candidates[a]))
            });
            let mut keep = vec![true; candidates.len()];
            for j in priority {
                if !keep[j] {
                    continue;
                }
                let pos = candidates[j];
                for k in (0..j).rev() {
                    if pos - candidates[k] >= distance {
                        break;
                    }
                    keep[k] = false;
                }
                for k in j + 1..candidates.len() {
                    if candidates[k] - pos >= distance {
                        break;
                    }
                    keep[k] = false;
                }
            }
            candidates
                .iter()
                .zip(keep)
                .filter_map(|(&c, k)| k.then_some(c))
                .collect()
        }
    }
}
