//! Conditioning, detection and HRV estimation chained together.

use crate::{
    detectors::ecg::{detect_beats, DetectorConfig},
    error::{AnalysisError, Result},
    filters::{condition, ConditionerConfig},
    io::{physionet::RecordSource, wfdb::RecordHeader},
    metrics::hrv::{hrv_time, HrvMetrics},
    signal::{Events, RRSeries, TimeSeries},
};
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub conditioner: ConditionerConfig,
    pub detector: DetectorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub fs: u32,
    pub sample_count: usize,
    pub events: Events,
    pub rr: RRSeries,
    pub hrv: HrvMetrics,
}

impl PipelineResult {
    pub fn from_events(ts: &TimeSeries, events: Events) -> Self {
        let rr = RRSeries::from_events(&events, ts.fs);
        let hrv = hrv_time(&rr);
        Self {
            fs: ts.fs,
            sample_count: ts.len(),
            events,
            rr,
            hrv,
        }
    }
}

/// Run the full chain on one raw recording.
pub fn run_pipeline(ts: &TimeSeries, cfg: &PipelineConfig) -> Result<PipelineResult> {
    let conditioned = condition(ts, &cfg.conditioner)?;
    debug!(
        "conditioned {} samples at {} Hz ({}-{} Hz, order {})",
        conditioned.len(),
        ts.fs,
        cfg.conditioner.low_cut_hz,
        cfg.conditioner.high_cut_hz,
        cfg.conditioner.order
    );
    let events = detect_beats(&conditioned, &cfg.detector)?;
    info!("detected {} beats in {:.1} s", events.len(), ts.duration());
    Ok(PipelineResult::from_events(ts, events))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordAnalysis {
    pub record: String,
    pub lead: usize,
    pub header: RecordHeader,
    pub result: PipelineResult,
}

/// Acquire one record from `source` and analyse the requested lead.
pub fn analyze_record<S: RecordSource + ?Sized>(
    source: &S,
    record: &str,
    lead: usize,
    cfg: &PipelineConfig,
) -> std::result::Result<RecordAnalysis, AnalysisError> {
    let loaded = source.load(record, lead)?;
    let result = run_pipeline(&loaded.signal, cfg)?;
    Ok(RecordAnalysis {
        record: record.to_string(),
        lead,
        header: loaded.header,
        result,
    })
}

/// Analyse independent records in parallel. Results keep the input order.
///
/// Each distinct name is acquired once in the parallel pass, so repeated
/// names never share a cache entry concurrently. A repeat gets a copy of a
/// successful analysis; a failed one is retried after the parallel pass.
pub fn analyze_batch<S: RecordSource + ?Sized>(
    source: &S,
    records: &[String],
    lead: usize,
    cfg: &PipelineConfig,
) -> Vec<std::result::Result<RecordAnalysis, AnalysisError>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut unique: Vec<&str> = Vec::new();
    for record in records {
        index.entry(record.as_str()).or_insert_with(|| {
            unique.push(record.as_str());
            unique.len() - 1
        });
    }
    if unique.len() < records.len() {
        debug!("{} repeated record names in batch", records.len() - unique.len());
    }
    let mut outcomes: Vec<Option<_>> = unique
        .par_iter()
        .map(|record| Some(analyze_record(source, record, lead, cfg)))
        .collect();

    records
        .iter()
        .map(|record| {
            let slot = &mut outcomes[index[record.as_str()]];
            match slot.take() {
                Some(Ok(analysis)) => {
                    *slot = Some(Ok(analysis.clone()));
                    Ok(analysis)
                }
                Some(Err(err)) => Err(err),
                None => analyze_record(source, record, lead, cfg),
            }
        })
        .collect()
}
