use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use hrv_lib::{
    detectors::ecg::{detect_beats, pan_tompkins_envelope, DetectorConfig, RefractoryPolicy},
    filters::{condition, ConditionerConfig},
    io::{
        physionet::{PhysioNetStore, RecordSource, RecordStoreConfig},
        text as text_io,
    },
    metrics::hrv::compute_hrv,
    pipeline::{analyze_batch, PipelineConfig, PipelineResult, RecordAnalysis},
    signal::{Events, TimeSeries},
    synthetic::{synthetic_ecg_with_beats, SyntheticEcgConfig},
};
use serde_json::json;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "hrv",
    version,
    about = "ECG conditioning, R-peak detection and time-domain HRV"
)]
struct Cli {
    /// Log filter used when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch (or reuse) an archive record and report its HRV
    Analyze {
        record: String,
        #[arg(long, default_value_t = 0)]
        lead: usize,
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        pipeline: PipelineArgs,
        /// Print the full result as JSON instead of the text report
        #[arg(long)]
        json: bool,
    },
    /// Analyse several records in parallel, one JSON line per record
    Batch {
        #[arg(required = true)]
        records: Vec<String>,
        #[arg(long, default_value_t = 0)]
        lead: usize,
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        pipeline: PipelineArgs,
        /// Worker threads (defaults to one per core)
        #[arg(long)]
        jobs: Option<usize>,
    },
    /// Band-pass filter newline-delimited samples read from stdin or --input
    Condition {
        #[arg(long)]
        fs: u32,
        #[arg(long)]
        input: Option<PathBuf>,
        #[command(flatten)]
        conditioner: ConditionerArgs,
    },
    /// Detect beats in a conditioned signal (or a raw one with --raw)
    Detect {
        #[arg(long)]
        fs: u32,
        #[arg(long)]
        input: Option<PathBuf>,
        /// Condition the input before detection
        #[arg(long)]
        raw: bool,
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
    /// Print the detection envelope and its threshold as JSON
    Envelope {
        #[arg(long)]
        fs: u32,
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        raw: bool,
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
    /// Time-domain HRV from newline-delimited beat sample indices
    HrvTime {
        #[arg(long)]
        fs: u32,
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Write a synthetic ECG to stdout
    Simulate {
        #[arg(long, default_value_t = 250)]
        fs: u32,
        #[arg(long, default_value_t = 30.0)]
        duration_s: f64,
        #[arg(long, default_value_t = 75.0)]
        bpm: f64,
        #[arg(long, default_value_t = 0.02)]
        noise: f64,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        #[arg(long, default_value_t = 0.0)]
        rr_jitter_s: f64,
        /// Write the true beat indices to this file
        #[arg(long)]
        beats_out: Option<PathBuf>,
    },
}

#[derive(Args)]
struct StoreArgs {
    /// Archive database
    #[arg(long)]
    database: Option<String>,
    /// Database version on the archive
    #[arg(long)]
    db_version: Option<String>,
    /// Local cache directory
    #[arg(long, env = "HRV_DATA_DIR")]
    data_dir: Option<PathBuf>,
    #[arg(long, hide = true)]
    base_url: Option<String>,
    /// HTTP timeout in seconds
    #[arg(long)]
    timeout_s: Option<u64>,
}

impl StoreArgs {
    fn config(&self) -> RecordStoreConfig {
        let mut cfg = RecordStoreConfig::default();
        if let Some(database) = &self.database {
            cfg.database = database.clone();
        }
        if let Some(version) = &self.db_version {
            cfg.version = version.clone();
        }
        if let Some(dir) = &self.data_dir {
            cfg.data_dir = dir.clone();
        }
        if let Some(url) = &self.base_url {
            cfg.base_url = url.clone();
        }
        if let Some(timeout) = self.timeout_s {
            cfg.timeout_s = timeout;
        }
        cfg
    }
}

#[derive(Args)]
struct ConditionerArgs {
    /// Band-pass lower cutoff (Hz)
    #[arg(long)]
    low_cut: Option<f64>,
    /// Band-pass upper cutoff (Hz)
    #[arg(long)]
    high_cut: Option<f64>,
    /// Butterworth order
    #[arg(long)]
    order: Option<usize>,
}

impl ConditionerArgs {
    fn config(&self) -> ConditionerConfig {
        let defaults = ConditionerConfig::default();
        ConditionerConfig {
            low_cut_hz: self.low_cut.unwrap_or(defaults.low_cut_hz),
            high_cut_hz: self.high_cut.unwrap_or(defaults.high_cut_hz),
            order: self.order.unwrap_or(defaults.order),
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PolicyArg {
    Highest,
    Earliest,
}

impl From<PolicyArg> for RefractoryPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Highest => RefractoryPolicy::Highest,
            PolicyArg::Earliest => RefractoryPolicy::Earliest,
        }
    }
}

#[derive(Args)]
struct PipelineArgs {
    #[command(flatten)]
    conditioner: ConditionerArgs,
    /// Which of two close candidates survives the refractory window
    #[arg(long, value_enum)]
    refractory_policy: Option<PolicyArg>,
    #[arg(long)]
    refractory_s: Option<f64>,
    #[arg(long)]
    integration_window_s: Option<f64>,
    /// Threshold above the envelope mean, in standard deviations
    #[arg(long)]
    threshold_sd: Option<f64>,
}

impl PipelineArgs {
    fn config(&self) -> PipelineConfig {
        let defaults = DetectorConfig::default();
        PipelineConfig {
            conditioner: self.conditioner.config(),
            detector: DetectorConfig {
                integration_window_s: self
                    .integration_window_s
                    .unwrap_or(defaults.integration_window_s),
                refractory_s: self.refractory_s.unwrap_or(defaults.refractory_s),
                threshold_sd: self.threshold_sd.unwrap_or(defaults.threshold_sd),
                refractory_policy: self
                    .refractory_policy
                    .map(RefractoryPolicy::from)
                    .unwrap_or(defaults.refractory_policy),
            },
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();
    match cli.command {
        Commands::Analyze {
            record,
            lead,
            store,
            pipeline,
            json,
        } => cmd_analyze(&record, lead, &store.config(), &pipeline.config(), json)?,
        Commands::Batch {
            records,
            lead,
            store,
            pipeline,
            jobs,
        } => cmd_batch(&records, lead, &store.config(), &pipeline.config(), jobs)?,
        Commands::Condition {
            fs,
            input,
            conditioner,
        } => cmd_condition(fs, input.as_deref(), &conditioner.config())?,
        Commands::Detect {
            fs,
            input,
            raw,
            pipeline,
        } => cmd_detect(fs, input.as_deref(), raw, &pipeline.config())?,
        Commands::Envelope {
            fs,
            input,
            raw,
            pipeline,
        } => cmd_envelope(fs, input.as_deref(), raw, &pipeline.config())?,
        Commands::HrvTime { fs, input } => cmd_hrv_time(fs, input.as_deref())?,
        Commands::Simulate {
            fs,
            duration_s,
            bpm,
            noise,
            seed,
            rr_jitter_s,
            beats_out,
        } => cmd_simulate(
            SyntheticEcgConfig {
                fs,
                duration_s,
                heart_rate_bpm: bpm,
                noise_amplitude: noise,
                seed,
                rr_jitter_s,
                ..SyntheticEcgConfig::default()
            },
            beats_out.as_deref(),
        )?,
    }
    Ok(())
}

fn read_time_series(fs: u32, input: Option<&Path>) -> Result<TimeSeries> {
    let data = text_io::parse_f64_series(&text_io::read_text(input)?)?;
    Ok(TimeSeries::new(fs, data))
}

/// Condition first when the input is a raw recording.
fn detection_input(
    fs: u32,
    input: Option<&Path>,
    raw: bool,
    cfg: &PipelineConfig,
) -> Result<TimeSeries> {
    let ts = read_time_series(fs, input)?;
    if raw {
        Ok(condition(&ts, &cfg.conditioner)?)
    } else {
        Ok(ts)
    }
}

fn cmd_analyze(
    record: &str,
    lead: usize,
    store_cfg: &RecordStoreConfig,
    cfg: &PipelineConfig,
    json: bool,
) -> Result<()> {
    let store = PhysioNetStore::new(store_cfg.clone());
    let loaded = store
        .load(record, lead)
        .with_context(|| format!("failed to acquire record {record}"))?;
    let ts = &loaded.signal;
    if !json {
        println!("--- Data Loading Successful ---");
        println!("Record: {}, Sampling Freq: {} Hz", record, ts.fs);
        println!("--- Filtering Signal ---");
    }
    let conditioned = condition(ts, &cfg.conditioner)?;
    if !json {
        println!("Signal filtering complete.");
    }
    let events = detect_beats(&conditioned, &cfg.detector)?;
    let result = PipelineResult::from_events(ts, events);
    if json {
        let analysis = RecordAnalysis {
            record: record.to_string(),
            lead,
            header: loaded.header,
            result,
        };
        println!("{}", serde_json::to_string(&analysis)?);
        return Ok(());
    }
    println!("Detected {} R-peaks.", result.events.len());
    println!("--- Analysis Results ---");
    for (metric, value) in result.hrv.iter() {
        println!("{}: {:.2} ms", metric, value);
    }
    Ok(())
}

fn cmd_batch(
    records: &[String],
    lead: usize,
    store_cfg: &RecordStoreConfig,
    cfg: &PipelineConfig,
    jobs: Option<usize>,
) -> Result<()> {
    let store = PhysioNetStore::new(store_cfg.clone());
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.unwrap_or(0))
        .build()
        .context("failed to start worker pool")?;
    let results = pool.install(|| analyze_batch(&store, records, lead, cfg));
    let mut failed = 0;
    for (record, result) in records.iter().zip(results) {
        let line = match result {
            Ok(analysis) => json!({
                "record": record,
                "fs": analysis.result.fs,
                "beats": analysis.result.events.len(),
                "hrv": analysis.result.hrv,
            }),
            Err(err) => {
                failed += 1;
                log::error!("{record}: {err}");
                json!({ "record": record, "error": format!("{:#}", anyhow::Error::new(err)) })
            }
        };
        println!("{}", serde_json::to_string(&line)?);
    }
    if failed > 0 {
        anyhow::bail!("{} of {} records failed", failed, records.len());
    }
    Ok(())
}

fn cmd_condition(fs: u32, input: Option<&Path>, cfg: &ConditionerConfig) -> Result<()> {
    let ts = read_time_series(fs, input)?;
    let conditioned = condition(&ts, cfg)?;
    print!("{}", text_io::format_series(&conditioned.data));
    Ok(())
}

fn cmd_detect(fs: u32, input: Option<&Path>, raw: bool, cfg: &PipelineConfig) -> Result<()> {
    let ts = detection_input(fs, input, raw, cfg)?;
    let events = detect_beats(&ts, &cfg.detector)?;
    println!("{}", serde_json::to_string(&events)?);
    Ok(())
}

fn cmd_envelope(fs: u32, input: Option<&Path>, raw: bool, cfg: &PipelineConfig) -> Result<()> {
    let ts = detection_input(fs, input, raw, cfg)?;
    let envelope = pan_tompkins_envelope(&ts, &cfg.detector)?;
    println!("{}", serde_json::to_string(&envelope)?);
    Ok(())
}

fn cmd_hrv_time(fs: u32, input: Option<&Path>) -> Result<()> {
    let indices = text_io::parse_event_indices(&text_io::read_text(input)?)?;
    let metrics = compute_hrv(&Events::from_unsorted(indices), fs)?;
    println!("{}", serde_json::to_string(&metrics)?);
    Ok(())
}

fn cmd_simulate(cfg: SyntheticEcgConfig, beats_out: Option<&Path>) -> Result<()> {
    let (ts, beats) = synthetic_ecg_with_beats(&cfg);
    if let Some(path) = beats_out {
        std::fs::write(path, text_io::format_series(&beats.indices))
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    print!("{}", text_io::format_series(&ts.data));
    Ok(())
}
