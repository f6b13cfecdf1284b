//! Record acquisition from a PhysioNet-style archive with a local cache.
//!
//! A record `R` of database `D` is cached as `<data_dir>/D/R.{dat,xyz,hea}`.
//! The header is written last, so its presence marks a complete entry.

use crate::error::AcquisitionError;
use crate::io::wfdb::{load_wfdb_lead, WfdbRecord};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordStoreConfig {
    pub data_dir: PathBuf,
    pub database: String,
    pub version: String,
    pub base_url: String,
    pub timeout_s: u64,
}

impl Default for RecordStoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            database: "ptbdb".into(),
            version: "1.0.0".into(),
            base_url: "https://physionet.org/files".into(),
            timeout_s: 30,
        }
    }
}

/// Anything that can hand the pipeline one lead of a named record.
pub trait RecordSource: Sync {
    fn load(&self, record: &str, lead: usize) -> Result<WfdbRecord, AcquisitionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Cached,
    Downloaded,
}

/// (extension, required)
const RECORD_FILES: [(&str, bool); 3] = [("dat", true), ("xyz", false), ("hea", true)];

pub struct PhysioNetStore {
    config: RecordStoreConfig,
    agent: ureq::Agent,
}

impl PhysioNetStore {
    pub fn new(config: RecordStoreConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_s.max(1)))
            .build();
        Self { config, agent }
    }

    pub fn config(&self) -> &RecordStoreConfig {
        &self.config
    }

    pub fn local_path(&self, record: &str, ext: &str) -> PathBuf {
        self.config
            .data_dir
            .join(&self.config.database)
            .join(format!("{record}.{ext}"))
    }

    pub fn header_path(&self, record: &str) -> PathBuf {
        self.local_path(record, "hea")
    }

    pub fn remote_url(&self, record: &str, ext: &str) -> String {
        format!(
            "{}/{}/{}/{}.{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.database,
            self.config.version,
            record,
            ext
        )
    }

    pub fn is_cached(&self, record: &str) -> Result<bool, AcquisitionError> {
        validate_record_name(record)?;
        Ok(self.header_path(record).is_file())
    }

    /// Make sure the record is in the cache, downloading it if needed.
    pub fn fetch(&self, record: &str) -> Result<FetchOutcome, AcquisitionError> {
        if self.is_cached(record)? {
            debug!("{record} found in cache");
            return Ok(FetchOutcome::Cached);
        }
        if let Some(dir) = self.header_path(record).parent() {
            fs::create_dir_all(dir).map_err(AcquisitionError::io(dir))?;
        }
        info!("downloading {} from {}", record, self.config.base_url);
        let mut written = Vec::new();
        for (ext, required) in RECORD_FILES {
            match self.download(record, ext, required) {
                Ok(Some(path)) => written.push(path),
                Ok(None) => {}
                Err(err) => {
                    for path in &written {
                        let _ = fs::remove_file(path);
                    }
                    return Err(err);
                }
            }
        }
        Ok(FetchOutcome::Downloaded)
    }

    fn download(
        &self,
        record: &str,
        ext: &str,
        required: bool,
    ) -> Result<Option<PathBuf>, AcquisitionError> {
        let url = self.remote_url(record, ext);
        let response = match self.agent.get(&url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) if !required => {
                warn!("skipping optional {url}: HTTP {status}");
                return Ok(None);
            }
            Err(ureq::Error::Status(404, _)) => {
                return Err(AcquisitionError::RecordNotFound {
                    record: record.to_string(),
                    url,
                })
            }
            Err(ureq::Error::Status(status, _)) => {
                return Err(AcquisitionError::HttpStatus { url, status })
            }
            Err(err) => {
                return Err(AcquisitionError::Network {
                    url,
                    source: Box::new(err),
                })
            }
        };

        let path = self.local_path(record, ext);
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut file = NamedTempFile::new_in(dir).map_err(AcquisitionError::io(dir))?;
        let bytes = std::io::copy(&mut response.into_reader(), &mut file)
            .map_err(AcquisitionError::io(&path))?;
        let existed = path.exists();
        file.persist(&path).map_err(|err| AcquisitionError::Io {
            path: path.clone(),
            source: err.error,
        })?;
        debug!("wrote {} ({} bytes)", path.display(), bytes);
        // only files this call created are reported for cleanup
        Ok((!existed).then_some(path))
    }
}

impl RecordSource for PhysioNetStore {
    fn load(&self, record: &str, lead: usize) -> Result<WfdbRecord, AcquisitionError> {
        self.fetch(record)?;
        load_wfdb_lead(&self.header_path(record), lead)
    }
}

/// Record names are archive-relative paths such as `patient001/s0010_re`.
pub fn validate_record_name(record: &str) -> Result<(), AcquisitionError> {
    let valid = !record.is_empty()
        && !record.starts_with('/')
        && record.split('/').all(|part| {
            !part.is_empty()
                && part != "."
                && part != ".."
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        });
    if valid {
        Ok(())
    } else {
        Err(AcquisitionError::InvalidRecordName(record.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const RECORD: &str = "patient001/s0010_re";
    const HEADER: &str = "s0010_re 1 1000 4\ns0010_re.dat 16 2000/mV 16 0 0 0 0 i\n";

    /// Minimal HTTP/1.1 file server; unknown paths answer 404.
    fn serve(files: HashMap<String, (u16, Vec<u8>)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let mut stream = match stream {
                    Ok(s) => s,
                    Err(_) => continue,
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                        break;
                    }
                }
                let path = request_line.split_whitespace().nth(1).unwrap_or("").to_string();
                let (status, body) = files.get(&path).cloned().unwrap_or((404, Vec::new()));
                let head = format!(
                    "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                stream.write_all(head.as_bytes()).unwrap();
                stream.write_all(&body).unwrap();
            }
        });
        (format!("http://{addr}/files"), hits)
    }

    fn store(dir: &Path, base_url: String) -> PhysioNetStore {
        PhysioNetStore::new(RecordStoreConfig {
            data_dir: dir.to_path_buf(),
            base_url,
            timeout_s: 5,
            ..RecordStoreConfig::default()
        })
    }

    /// Format 16 payload for `HEADER`: 1.0, -1.0, 2.0 and 0.0 mV.
    fn samples() -> Vec<u8> {
        [2000i16, -2000, 4000, 0].iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn archive() -> HashMap<String, (u16, Vec<u8>)> {
        let mut files = HashMap::new();
        let prefix = format!("/files/ptbdb/1.0.0/{RECORD}");
        files.insert(format!("{prefix}.hea"), (200, HEADER.as_bytes().to_vec()));
        files.insert(format!("{prefix}.dat"), (200, samples()));
        files
    }

    #[test]
    fn downloads_once_then_serves_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (base, hits) = serve(archive());
        let store = store(dir.path(), base);

        assert!(!store.is_cached(RECORD).unwrap());
        assert_eq!(store.fetch(RECORD).unwrap(), FetchOutcome::Downloaded);
        let dat = dir.path().join("ptbdb/patient001/s0010_re.dat");
        let hea = dir.path().join("ptbdb/patient001/s0010_re.hea");
        assert_eq!(fs::read(&dat).unwrap().len(), 8);
        assert_eq!(fs::read_to_string(&hea).unwrap(), HEADER);
        // the optional .xyz answered 404 and was skipped
        assert!(!store.local_path(RECORD, "xyz").exists());
        let mut names: Vec<_> = fs::read_dir(dat.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, ["s0010_re.dat", "s0010_re.hea"]);
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        assert!(store.is_cached(RECORD).unwrap());
        assert_eq!(store.fetch(RECORD).unwrap(), FetchOutcome::Cached);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        let loaded = store.load(RECORD, 0).unwrap();
        assert_eq!(loaded.signal.data, vec![1.0, -1.0, 2.0, 0.0]);
    }

    #[test]
    fn missing_record_is_not_found_and_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (base, _) = serve(HashMap::new());
        let err = store(dir.path(), base).fetch("s9999").unwrap_err();
        assert!(matches!(
            err,
            AcquisitionError::RecordNotFound { ref record, .. } if record == "s9999"
        ));
        assert!(!dir.path().join("ptbdb/s9999.dat").exists());
    }

    #[test]
    fn failed_header_download_removes_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = archive();
        files.insert(format!("/files/ptbdb/1.0.0/{RECORD}.hea"), (500, Vec::new()));
        let (base, _) = serve(files);
        let store = store(dir.path(), base);
        let err = store.fetch(RECORD).unwrap_err();
        assert!(matches!(err, AcquisitionError::HttpStatus { status: 500, .. }));
        assert!(!store.local_path(RECORD, "dat").exists());
        assert!(!store.is_cached(RECORD).unwrap());
    }

    #[test]
    fn failed_download_keeps_files_it_did_not_create() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = archive();
        files.insert(format!("/files/ptbdb/1.0.0/{RECORD}.hea"), (500, Vec::new()));
        let (base, _) = serve(files);
        let store = store(dir.path(), base);
        let dat = store.local_path(RECORD, "dat");
        fs::create_dir_all(dat.parent().unwrap()).unwrap();
        fs::write(&dat, samples()).unwrap();

        assert!(matches!(
            store.fetch(RECORD),
            Err(AcquisitionError::HttpStatus { status: 500, .. })
        ));
        assert_eq!(fs::read(&dat).unwrap(), samples());
    }

    #[test]
    fn unreachable_archive_is_a_network_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), "http://127.0.0.1:1/files".into());
        let err = store.load("s0010_re", 0).unwrap_err();
        assert!(matches!(err, AcquisitionError::Network { .. }), "{err:?}");
        assert!(!store.header_path("s0010_re").exists());
    }

    #[test]
    fn cached_header_without_data_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), "http://127.0.0.1:1/files".into());
        let hea = store.header_path("s0010_re");
        fs::create_dir_all(hea.parent().unwrap()).unwrap();
        fs::write(&hea, HEADER).unwrap();
        let err = store.load("s0010_re", 0).unwrap_err();
        assert!(matches!(err, AcquisitionError::CorruptRecord { .. }), "{err:?}");
        let err = store.load("s0010_re", 3).unwrap_err();
        assert!(matches!(err, AcquisitionError::LeadOutOfRange { available: 1, .. }));
    }

    #[test]
    fn record_names_stay_inside_the_cache() {
        for bad in ["", "/etc/passwd", "../s0010_re", "a//b", "a/./b", "rec name", "a\\b"] {
            assert!(
                matches!(validate_record_name(bad), Err(AcquisitionError::InvalidRecordName(_))),
                "{bad:?} accepted"
            );
        }
        for good in ["s0010_re", "patient001/s0010_re", "100", "x.y-z"] {
            assert!(validate_record_name(good).is_ok(), "{good:?} rejected");
        }
    }

    #[test]
    fn remote_url_layout() {
        let store = PhysioNetStore::new(RecordStoreConfig {
            base_url: "https://example.org/files/".into(),
            ..RecordStoreConfig::default()
        });
        assert_eq!(
            store.remote_url(RECORD, "hea"),
            "https://example.org/files/ptbdb/1.0.0/patient001/s0010_re.hea"
        );
        assert_eq!(store.local_path("s1", "dat"), PathBuf::from("data/ptbdb/s1.dat"));
    }
}
