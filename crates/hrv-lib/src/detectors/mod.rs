pub mod ecg;

pub use ecg::{
    detect_beats, detect_r_peaks, pan_tompkins_envelope, DetectorConfig, Envelope,
    RefractoryPolicy,
};
