pub mod detectors;
pub mod error;
pub mod filters;
pub mod io;
pub mod metrics;
pub mod pipeline;
pub mod signal;
pub mod synthetic;

pub use detectors::*;
pub use error::{AcquisitionError, AnalysisError, HeaderError, HrvError};
pub use filters::{condition, ConditionerConfig};
pub use metrics::*;
pub use pipeline::*;
pub use signal::*;
