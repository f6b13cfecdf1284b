pub mod physionet;
pub mod text;
pub mod wfdb;

pub use physionet::{FetchOutcome, PhysioNetStore, RecordSource, RecordStoreConfig};
pub use wfdb::{load_wfdb_lead, RecordHeader, SignalSpec, WfdbRecord};
