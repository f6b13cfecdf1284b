use std::path::PathBuf;
use thiserror::Error;

/// Failures of the numerical core (conditioning, detection, estimation).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HrvError {
    #[error(
        "invalid filter specification: {reason} \
         (low_cut={low_cut_hz} Hz, high_cut={high_cut_hz} Hz, order={order}, fs={fs} Hz)"
    )]
    InvalidFilterSpecification {
        reason: &'static str,
        low_cut_hz: f64,
        high_cut_hz: f64,
        order: usize,
        fs: u32,
    },
    #[error("signal too short: {len} samples, zero-phase filtering needs more than {min_len}")]
    EmptySignal { len: usize, min_len: usize },
    #[error("sampling rate must be a positive number of Hz, got {0}")]
    InvalidSamplingRate(u32),
}

pub type Result<T, E = HrvError> = std::result::Result<T, E>;

/// Problems in a WFDB `.hea` file.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HeaderError {
    #[error("no record line")]
    MissingRecordLine,
    #[error("expected {expected} signal lines, found {found}")]
    MissingSignalLines { expected: usize, found: usize },
    #[error("invalid {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },
    #[error("multi-segment record {0} is not supported")]
    MultiSegment(String),
    #[error("sampling frequency {0} Hz is not a positive integer")]
    NonIntegerSamplingRate(f64),
}

/// Failures while obtaining a record, kept apart from numerical errors.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("invalid record name {0:?}")]
    InvalidRecordName(String),
    #[error("network error fetching {url}")]
    Network {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },
    #[error("record {record} does not exist on the archive ({url})")]
    RecordNotFound { record: String, url: String },
    #[error("archive answered HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },
    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed header {}", path.display())]
    InvalidHeader {
        path: PathBuf,
        #[source]
        source: HeaderError,
    },
    #[error("corrupt record file {}: {reason}", path.display())]
    CorruptRecord { path: PathBuf, reason: String },
    #[error("record {record} has {available} signal(s); lead {lead} requested")]
    LeadOutOfRange {
        record: String,
        lead: usize,
        available: usize,
    },
}

impl AcquisitionError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| AcquisitionError::Io { path, source }
    }
}

/// Outcome of analysing one record end to end.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
    #[error(transparent)]
    Processing(#[from] HrvError),
}

pub(crate) fn ensure_sampling_rate(fs: u32) -> Result<()> {
    if fs == 0 {
        return Err(HrvError::InvalidSamplingRate(fs));
    }
    Ok(())
}
