use serde::{Deserialize, Serialize};

/// Uniformly sampled single-lead signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Sampling frequency in Hz
    pub fs: u32,
    /// Samples
    pub data: Vec<f64>,
}

impl TimeSeries {
    pub fn new(fs: u32, data: Vec<f64>) -> Self {
        Self { fs, data }
    }
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    /// Duration in seconds, zero when `fs` is zero.
    pub fn duration(&self) -> f64 {
        if self.fs == 0 {
            return 0.0;
        }
        self.data.len() as f64 / self.fs as f64
    }
}

/// `round(seconds * fs)`, never below one sample.
pub fn seconds_to_samples(seconds: f64, fs: u32) -> usize {
    ((seconds * fs as f64).round() as usize).max(1)
}

/// Point events on a timeline (R-peak sample indices).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Events {
    pub indices: Vec<usize>,
}

impl Events {
    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self { indices }
    }

    /// Build from arbitrary user input, sorting and dropping duplicates.
    pub fn from_unsorted(mut indices: Vec<usize>) -> Self {
        indices.sort_unstable();
        indices.dedup();
        Self { indices }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Inter-beat intervals in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RRSeries {
    pub rr_ms: Vec<f64>,
}

impl RRSeries {
    pub fn from_events(events: &Events, fs: u32) -> Self {
        let fs = fs as f64;
        let rr_ms = events
            .indices
            .windows(2)
            .map(|w| (w[1] as f64 - w[0] as f64) / fs * 1000.0)
            .collect();
        Self { rr_ms }
    }

    pub fn len(&self) -> usize {
        self.rr_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rr_ms.is_empty()
    }
}
