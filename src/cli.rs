use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::config::{InferenceLevel, PerfMode, RepeatMode, Tradeoff, TunerConfig};
use crate::error::Result;
use crate::models::{CodecId, CompressionParams, FilterId, ParamSeed, Pinned};

/// codec_autotune: compress data chunk by chunk while tuning codec params.
#[derive(Parser, Debug)]
#[command(name = "codec_autotune")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// More log output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compress a file in chunks, decompress it again and verify the bytes.
    RoundTrip(RoundTripArgs),

    /// Print the default tuner config as JSON.
    DefaultConfig,
}

#[derive(Args, Debug)]
pub struct RoundTripArgs {
    /// Input file.
    pub file: PathBuf,

    /// Number of equal chunks; any remainder becomes one extra chunk.
    #[arg(long, default_value = "50")]
    pub nchunks: usize,

    #[command(flatten)]
    pub params: ParamArgs,

    #[command(flatten)]
    pub tuning: TuningArgs,

    /// Write the trial log to this CSV file.
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Write the best params and totals to this JSON file.
    #[arg(long)]
    pub json: Option<PathBuf>,
}

/// A requested field the tuner must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PinField {
    Codec,
    Filter,
    Level,
    Blocksize,
    Threads,
}

/// The caller's requested compression params.
#[derive(Args, Debug, Clone)]
pub struct ParamArgs {
    #[arg(long, value_enum, default_value = "lz4")]
    pub codec: CodecId,

    #[arg(long, value_enum, default_value = "shuffle")]
    pub filter: FilterId,

    #[arg(long, default_value = "1")]
    pub level: u8,

    #[arg(long, default_value = "65536")]
    pub blocksize: usize,

    /// Element width in bytes.
    #[arg(long, default_value = "8")]
    pub typesize: usize,

    /// Most threads the tuner may use.
    #[arg(long, default_value = "1")]
    pub threads: usize,

    /// Fields to keep as requested (comma-separated).
    #[arg(long, value_enum, value_delimiter = ',')]
    pub pin: Vec<PinField>,
}

impl ParamArgs {
    pub fn seed(&self) -> ParamSeed {
        let params = CompressionParams {
            codec: self.codec,
            filter: self.filter,
            level: self.level,
            blocksize: self.blocksize,
            typesize: self.typesize,
            nthreads: self.threads,
        };
        let pinned = Pinned {
            codec: self.pin.contains(&PinField::Codec),
            filter: self.pin.contains(&PinField::Filter),
            level: self.pin.contains(&PinField::Level),
            blocksize: self.pin.contains(&PinField::Blocksize),
            nthreads: self.pin.contains(&PinField::Threads),
        };
        ParamSeed::new(params).with_pinned(pinned)
    }
}

/// Tuner settings; each flag overrides the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct TuningArgs {
    /// JSON config file to start from.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Tradeoff weights [ratio, speed, quality] (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub tradeoff: Option<Vec<f64>>,

    #[arg(long, value_enum)]
    pub perf_mode: Option<PerfMode>,

    #[arg(long, value_enum)]
    pub repeat_mode: Option<RepeatMode>,

    #[arg(long)]
    pub repeat_interval: Option<usize>,

    /// Non-improving chunks before the search stops.
    #[arg(long)]
    pub nhards: Option<usize>,

    /// 0 off, 1 advisory, 2 mandatory.
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=2))]
    pub inference: Option<u8>,

    #[arg(long)]
    pub models_dir: Option<PathBuf>,

    /// Candidates trialed per explore chunk.
    #[arg(long)]
    pub breadth: Option<usize>,

    /// Run explore candidates concurrently.
    #[arg(long)]
    pub parallel: bool,

    /// Seed for candidate sampling.
    #[arg(long)]
    pub seed: Option<u64>,
}

impl TuningArgs {
    pub fn to_config(&self) -> Result<TunerConfig> {
        let mut config = match &self.config {
            Some(path) => TunerConfig::from_json_file(path)?,
            None => TunerConfig::default(),
        };

        if let Some(weights) = &self.tradeoff {
            config.tradeoff = Tradeoff::new(weights)?;
        }
        if let Some(mode) = self.perf_mode {
            config.perf_mode = mode;
        }
        if let Some(mode) = self.repeat_mode {
            config.behaviour.repeat_mode = mode;
        }
        if let Some(n) = self.repeat_interval {
            config.behaviour.repeat_interval = n;
        }
        if let Some(n) = self.nhards {
            config.behaviour.nhards_before_stop = n;
        }
        if let Some(level) = self.inference {
            config.use_inference = InferenceLevel::try_from(level)?;
        }
        if let Some(dir) = &self.models_dir {
            config.models_dir = Some(dir.clone());
        }
        if let Some(n) = self.breadth {
            config.search_breadth = n;
        }
        if self.parallel {
            config.parallel_trials = true;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }

        config.validate()?;
        Ok(config)
    }
}

/// `nchunks` equal slices of `data` plus one slice for any remainder.
/// A file shorter than `nchunks` bytes is a single chunk.
pub fn split_chunks(data: &[u8], nchunks: usize) -> Vec<&[u8]> {
    let nchunks = nchunks.max(1);
    let chunk_size = data.len() / nchunks;
    if chunk_size == 0 {
        return vec![data];
    }
    let (even, leftover) = data.split_at(chunk_size * nchunks);
    let mut chunks: Vec<&[u8]> = even.chunks(chunk_size).collect();
    if !leftover.is_empty() {
        chunks.push(leftover);
    }
    chunks
}

/// Install the stderr log subscriber; warnings only unless asked for more.
pub fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Logging was already initialized");
    }
}
