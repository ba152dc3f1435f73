use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser};
use tracing::{info, warn};

use codec_autotune_rs::cli::{init_logging, ParamArgs};
use codec_autotune_rs::codec::BlockCodec;
use codec_autotune_rs::config::{PerfMode, Tradeoff};
use codec_autotune_rs::error::{Result, TunerError};
use codec_autotune_rs::inference::{Model, ModelEntry, MODEL_FILE};
use codec_autotune_rs::models::{Chunk, ChunkFeatures, CodecId, FilterId};
use codec_autotune_rs::tuner::{ParameterSpace, PerformanceMonitor, Scored, TradeoffScorer, Trial};

#[derive(Parser, Debug)]
#[command(name = "train")]
#[command(about = "Build an inference model by trialing every candidate on sample chunks")]
struct Args {
    /// Files to sample chunks from
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Directory the model is written to
    #[arg(long, default_value = "models")]
    models_dir: PathBuf,

    /// Bytes per sample chunk
    #[arg(long, default_value = "262144")]
    chunk_size: usize,

    /// Sample chunks taken from each file, evenly spaced
    #[arg(long, default_value = "4")]
    samples: usize,

    /// Ratio weights to train for (comma-separated, speed weight is 1 - w)
    #[arg(long, value_delimiter = ',', default_value = "0.0,0.25,0.5,0.75,1.0")]
    tradeoffs: Vec<f64>,

    #[arg(long, value_enum, default_value = "balanced")]
    perf_mode: PerfMode,

    /// Codecs to trial (comma-separated); the seed codec is always included
    #[arg(long, value_enum, value_delimiter = ',')]
    codecs: Vec<CodecId>,

    /// Filters to trial (comma-separated); the seed filter is always included
    #[arg(long, value_enum, value_delimiter = ',')]
    filters: Vec<FilterId>,

    /// Ranked params kept per model entry
    #[arg(long, default_value = "5")]
    top_k: usize,

    /// Scores closer than this are ties
    #[arg(long, default_value = "0.01")]
    tie_epsilon: f64,

    #[arg(long, default_value = "10000")]
    timeout_ms: u64,

    /// Output CSV file for all trials
    #[arg(long, default_value = "train_trials.csv")]
    csv: PathBuf,

    #[command(flatten)]
    params: ParamArgs,

    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Evenly spaced sample chunks of `chunk_size` bytes; short files give one chunk.
fn sample_chunks(data: &[u8], chunk_size: usize, samples: usize) -> Vec<&[u8]> {
    if data.len() <= chunk_size || samples <= 1 {
        return vec![&data[..data.len().min(chunk_size)]];
    }
    let last_start = data.len() - chunk_size;
    (0..samples)
        .map(|i| {
            let start = last_start * i / (samples - 1);
            &data[start..start + chunk_size]
        })
        .collect()
}

struct SampleTrials {
    file: String,
    sample: usize,
    features: ChunkFeatures,
    trials: Vec<Trial>,
}

fn write_trials_csv(samples: &[SampleTrials], path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "file", "sample", "entropy", "codec", "filter", "level", "blocksize", "nthreads", "csize",
        "ratio", "ctime_ms", "dtime_ms",
    ])?;

    for s in samples {
        for t in &s.trials {
            let p = &t.params;
            wtr.write_record([
                s.file.clone(),
                s.sample.to_string(),
                format!("{:.3}", s.features.entropy),
                p.codec.name().to_string(),
                p.filter.name().to_string(),
                p.level.to_string(),
                p.blocksize.to_string(),
                p.nthreads.to_string(),
                t.result.csize.to_string(),
                format!("{:.3}", t.result.ratio()),
                format!("{:.3}", t.result.ctime_secs * 1e3),
                t.result
                    .dtime_secs
                    .map(|d| format!("{:.3}", d * 1e3))
                    .unwrap_or_default(),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.chunk_size == 0 || args.top_k == 0 {
        return Err(TunerError::Config(
            "chunk_size and top_k must be positive".to_string(),
        ));
    }
    let tradeoffs = args
        .tradeoffs
        .iter()
        .map(|&w| Tradeoff::ratio_speed(w))
        .collect::<Result<Vec<_>>>()?;

    let seed = args.params.seed();
    let mut space = ParameterSpace::new(&seed);
    if !args.codecs.is_empty() {
        space = space.with_codecs(&args.codecs);
    }
    if !args.filters.is_empty() {
        space = space.with_filters(&args.filters);
    }
    let candidates = space.enumerate_candidates();
    if candidates.is_empty() {
        return Err(TunerError::Config(format!(
            "no valid candidates around {}",
            seed.params.display()
        )));
    }
    println!(
        "Trialing {} candidates on {} sample(s) per file",
        candidates.len(),
        args.samples
    );

    let mut monitor = PerformanceMonitor::new(
        Arc::new(BlockCodec::new()),
        args.perf_mode,
        Duration::from_millis(args.timeout_ms),
        false,
    );

    let mut samples = Vec::new();
    for file in &args.files {
        let data = fs::read(file)?;
        for (i, bytes) in sample_chunks(&data, args.chunk_size, args.samples)
            .into_iter()
            .enumerate()
        {
            let chunk = Chunk::new(bytes, seed.params.typesize);
            let trials: Vec<Trial> = monitor
                .measure_batch(&candidates, &chunk)
                .into_iter()
                .filter_map(|(_, outcome)| outcome.ok())
                .collect();
            if trials.is_empty() {
                warn!(file = ?file, sample = i, "every candidate failed, sample skipped");
                continue;
            }
            info!(file = ?file, sample = i, trials = trials.len(), "sample trialed");

            samples.push(SampleTrials {
                file: file.display().to_string(),
                sample: i,
                features: ChunkFeatures::extract(&chunk),
                trials,
            });
        }
    }
    monitor.join_stragglers();

    let mut entries = Vec::new();
    for sample in &samples {
        for tradeoff in &tradeoffs {
            let mut scorer = TradeoffScorer::new(tradeoff.clone(), args.perf_mode, args.tie_epsilon);
            for t in &sample.trials {
                scorer.observe(&t.result);
            }
            let scored: Vec<Scored> = sample
                .trials
                .iter()
                .map(|t| scorer.scored(t.params, t.result))
                .collect();
            let ranked = scorer
                .rank(&scored)
                .into_iter()
                .take(args.top_k)
                .map(|i| scored[i].params)
                .collect();

            entries.push(ModelEntry {
                features: sample.features,
                tradeoff: tradeoff.clone(),
                ranked,
            });
        }
    }

    if entries.is_empty() {
        return Err(TunerError::NoViableConfiguration(0));
    }

    write_trials_csv(&samples, &args.csv)?;
    println!("Wrote all trials to {:?}", args.csv);

    let model = Model::new(entries);
    model.save(&args.models_dir)?;
    println!(
        "Wrote {} model entries to {:?}",
        model.entries.len(),
        args.models_dir.join(MODEL_FILE)
    );
    Ok(())
}
