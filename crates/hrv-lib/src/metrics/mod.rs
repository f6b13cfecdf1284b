pub mod hrv;

pub use hrv::{compute_hrv, hrv_time, HrvMetric, HrvMetrics};
