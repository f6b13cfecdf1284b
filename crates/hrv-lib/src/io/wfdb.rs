use crate::error::{AcquisitionError, HeaderError};
use crate::signal::TimeSeries;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// WFDB default ADC gain (units per mV) when the header leaves it out or zero.
const DEFAULT_GAIN: f64 = 200.0;
/// WFDB default sampling frequency.
const DEFAULT_FS: u32 = 250;

/// One signal line of a WFDB header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSpec {
    pub file_name: String,
    pub format: u16,
    pub adc_gain: f64,
    pub baseline: i64,
    pub units: Option<String>,
    pub description: Option<String>,
}

impl SignalSpec {
    /// Convert a stored ADC value to physical units.
    pub fn to_physical(&self, raw: f64) -> f64 {
        (raw - self.baseline as f64) / self.adc_gain
    }
}

/// Parsed `.hea` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordHeader {
    pub name: String,
    pub fs: u32,
    pub n_samples: Option<usize>,
    pub signals: Vec<SignalSpec>,
    /// `#` comment lines (PTB stores patient information here).
    pub comments: Vec<String>,
}

impl RecordHeader {
    pub fn parse(text: &str) -> Result<Self, HeaderError> {
        let mut comments = Vec::new();
        let mut lines = Vec::new();
        for line in text.lines() {
            let trimmed = line.trim();
            if let Some(comment) = trimmed.strip_prefix('#') {
                let comment = comment.trim();
                if !comment.is_empty() {
                    comments.push(comment.to_string());
                }
            } else if !trimmed.is_empty() {
                lines.push(trimmed);
            }
        }
        let (record_line, signal_lines) = lines
            .split_first()
            .ok_or(HeaderError::MissingRecordLine)?;

        let fields: Vec<&str> = record_line.split_whitespace().collect();
        let name = fields[0];
        if name.contains('/') {
            return Err(HeaderError::MultiSegment(name.to_string()));
        }
        let n_signals: usize = parse_field(fields.get(1).copied(), "signal count")?
            .ok_or(HeaderError::InvalidField {
                field: "signal count",
                value: String::new(),
            })?;
        let fs = match fields.get(2) {
            Some(token) => {
                let hz: f64 = parse_field(Some(leading(token, &['/', '('])), "sampling frequency")?
                    .unwrap_or(DEFAULT_FS as f64);
                if hz <= 0.0 || hz.fract() != 0.0 || hz > u32::MAX as f64 {
                    return Err(HeaderError::NonIntegerSamplingRate(hz));
                }
                hz as u32
            }
            None => DEFAULT_FS,
        };
        let n_samples = parse_field(fields.get(3).copied(), "sample count")?;

        if signal_lines.len() < n_signals {
            return Err(HeaderError::MissingSignalLines {
                expected: n_signals,
                found: signal_lines.len(),
            });
        }
        let signals = signal_lines[..n_signals]
            .iter()
            .map(|line| parse_signal_line(line))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: name.to_string(),
            fs,
            n_samples,
            signals,
            comments,
        })
    }

    pub fn read(path: &Path) -> Result<Self, AcquisitionError> {
        let text = fs::read_to_string(path).map_err(AcquisitionError::io(path))?;
        Self::parse(&text).map_err(|source| AcquisitionError::InvalidHeader {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn duration_s(&self) -> Option<f64> {
        self.n_samples.map(|n| n as f64 / self.fs as f64)
    }
}

fn leading<'a>(token: &'a str, stops: &[char]) -> &'a str {
    token.split(stops).next().unwrap_or(token)
}

fn parse_field<T: std::str::FromStr>(
    token: Option<&str>,
    field: &'static str,
) -> Result<Option<T>, HeaderError> {
    match token {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|_| HeaderError::InvalidField {
            field,
            value: value.to_string(),
        }),
    }
}

fn parse_signal_line(line: &str) -> Result<SignalSpec, HeaderError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let file_name = fields[0].to_string();
    let format_token = fields.get(1).copied().unwrap_or("");
    let format: u16 = parse_field(Some(leading(format_token, &['x', ':', '+'])), "format")?
        .ok_or(HeaderError::InvalidField {
            field: "format",
            value: format_token.to_string(),
        })?;

    let mut adc_gain = DEFAULT_GAIN;
    let mut baseline = None;
    let mut units = None;
    if let Some(token) = fields.get(2) {
        let (gain_part, unit_part) = match token.split_once('/') {
            Some((g, u)) => (g, Some(u)),
            None => (*token, None),
        };
        let (gain_str, base_str) = match gain_part.split_once('(') {
            Some((g, b)) => (g, Some(b.trim_end_matches(')'))),
            None => (gain_part, None),
        };
        let gain: f64 = parse_field(Some(gain_str), "ADC gain")?.unwrap_or(0.0);
        if gain != 0.0 {
            adc_gain = gain;
        }
        baseline = parse_field(base_str, "baseline")?;
        units = unit_part.filter(|u| !u.is_empty()).map(str::to_string);
    }
    let adc_zero: i64 = parse_field(fields.get(4).copied(), "ADC zero")?.unwrap_or(0);
    let description = (fields.len() > 8).then(|| fields[8..].join(" "));

    Ok(SignalSpec {
        file_name,
        format,
        adc_gain,
        baseline: baseline.unwrap_or(adc_zero),
        units,
        description,
    })
}

/// Storage size of one sample, `None` for formats that are not fixed-width.
pub fn bytes_per_sample(format: u16) -> Option<f64> {
    match format {
        8 | 80 => Some(1.0),
        16 | 61 | 160 => Some(2.0),
        212 => Some(1.5),
        310 | 311 => Some(4.0 / 3.0),
        24 => Some(3.0),
        32 => Some(4.0),
        _ => None,
    }
}

/// Check that the signal files named by `header` exist next to it and are
/// long enough for the declared sample count. Only the file holding `lead`
/// is required; problems with other files are logged.
pub fn validate_signal_files(
    header_path: &Path,
    header: &RecordHeader,
    lead: usize,
) -> Result<(), AcquisitionError> {
    let dir = header_path.parent().unwrap_or_else(|| Path::new("."));
    let mut per_file: BTreeMap<&str, Option<f64>> = BTreeMap::new();
    for spec in header.signals.iter().filter(|s| s.format != 0 && s.file_name != "~") {
        let width = per_file.entry(spec.file_name.as_str()).or_insert(Some(0.0));
        *width = match (*width, bytes_per_sample(spec.format)) {
            (Some(acc), Some(w)) => Some(acc + w),
            _ => None,
        };
    }
    let required = header.signals.get(lead).map(|s| s.file_name.as_str());
    for (file_name, frame_bytes) in per_file {
        let path = dir.join(file_name);
        let problem = match fs::metadata(&path) {
            Err(_) => Some("signal file is missing".to_string()),
            Ok(meta) => match (header.n_samples, frame_bytes) {
                (Some(n), Some(frame)) => {
                    let expected = (n as f64 * frame).ceil() as u64;
                    (meta.len() < expected).then(|| {
                        format!("truncated: {} bytes, expected {}", meta.len(), expected)
                    })
                }
                _ => None,
            },
        };
        match problem {
            Some(reason) if required == Some(file_name) => {
                return Err(AcquisitionError::CorruptRecord { path, reason })
            }
            Some(reason) => log::warn!("{}: {}", path.display(), reason),
            None => {}
        }
    }
    Ok(())
}

/// A loaded lead together with the header it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WfdbRecord {
    pub header: RecordHeader,
    pub lead: usize,
    pub signal: TimeSeries,
}

/// Read the raw samples of `lead` from its signal file, de-interleaving the
/// frames shared with the other signals stored in the same file.
fn read_lead_samples(
    dir: &Path,
    header: &RecordHeader,
    lead: usize,
) -> Result<Vec<i16>, AcquisitionError> {
    let spec = &header.signals[lead];
    let path = dir.join(&spec.file_name);
    let in_file: Vec<usize> = header
        .signals
        .iter()
        .enumerate()
        .filter(|(_, s)| s.file_name == spec.file_name)
        .map(|(i, _)| i)
        .collect();
    let offset = in_file.iter().position(|&i| i == lead).unwrap_or(0);
    if let Some(other) = in_file.iter().find(|&&i| header.signals[i].format != spec.format) {
        return Err(AcquisitionError::CorruptRecord {
            path,
            reason: format!(
                "signals {} and {} share a file with different formats",
                lead, other
            ),
        });
    }

    let bytes = fs::read(&path).map_err(AcquisitionError::io(&path))?;
    let raw: Vec<i16> = match spec.format {
        16 => bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect(),
        212 => wfdb_rust::signal::parse_212_format(&bytes),
        other => {
            return Err(AcquisitionError::CorruptRecord {
                path,
                reason: format!("unsupported signal format {other}"),
            })
        }
    };

    let mut frames = raw.len() / in_file.len();
    if let Some(n) = header.n_samples {
        frames = frames.min(n);
    }
    Ok(raw
        .into_iter()
        .skip(offset)
        .step_by(in_file.len())
        .take(frames)
        .collect())
}

/// Load the specified signal (lead) from a WFDB header/data pair in physical units.
///
/// Formats 16 and 212 are decoded. Any other format is a [`AcquisitionError::CorruptRecord`].
pub fn load_wfdb_lead(header_path: &Path, lead: usize) -> Result<WfdbRecord, AcquisitionError> {
    let header = RecordHeader::read(header_path)?;
    if lead >= header.signals.len() {
        return Err(AcquisitionError::LeadOutOfRange {
            record: header.name.clone(),
            lead,
            available: header.signals.len(),
        });
    }
    validate_signal_files(header_path, &header, lead)?;

    let dir = header_path.parent().unwrap_or_else(|| Path::new("."));
    let raw = read_lead_samples(dir, &header, lead)?;
    let spec = &header.signals[lead];
    let data: Vec<f64> = raw.iter().map(|&sample| spec.to_physical(sample as f64)).collect();
    if data.is_empty() {
        return Err(AcquisitionError::CorruptRecord {
            path: header_path.to_path_buf(),
            reason: "record contains no samples".into(),
        });
    }
    log::debug!(
        "loaded lead {} ({}) of {}: {} samples at {} Hz",
        lead,
        spec.description.as_deref().unwrap_or("unnamed"),
        header.name,
        data.len(),
        header.fs
    );
    Ok(WfdbRecord {
        signal: TimeSeries {
            fs: header.fs,
            data,
        },
        header,
        lead,
    })
}
