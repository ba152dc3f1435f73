use std::fs;
use std::sync::Arc;

use clap::Parser;

use codec_autotune_rs::cli::{init_logging, split_chunks, Cli, Command, RoundTripArgs};
use codec_autotune_rs::codec::{BlockCodec, Codec};
use codec_autotune_rs::config::TunerConfig;
use codec_autotune_rs::container::SuperChunk;
use codec_autotune_rs::error::{Result, TunerError};
use codec_autotune_rs::tuner::{print_summary, write_best_json, write_trial_csv, TunerSession};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::RoundTrip(args) => cmd_round_trip(&args),
        Command::DefaultConfig => {
            println!("{}", serde_json::to_string_pretty(&TunerConfig::default())?);
            Ok(())
        }
    }
}

/// Compress a file through a tuner session, then decompress and verify every chunk.
fn cmd_round_trip(args: &RoundTripArgs) -> Result<()> {
    let data = fs::read(&args.file)?;
    let config = args.tuning.to_config()?;
    let seed = args.params.seed();

    let chunks = split_chunks(&data, args.nchunks);
    println!(
        "Read {} bytes from {:?}: {} chunks of {} bytes",
        data.len(),
        args.file,
        chunks.len(),
        chunks.first().map_or(0, |c| c.len())
    );

    let codec: Arc<dyn Codec> = Arc::new(BlockCodec::new());
    let store = SuperChunk::new(Arc::clone(&codec));
    let mut session = TunerSession::new(config, seed, codec, store)?;

    let mut indices = Vec::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let out = session.compress_chunk(chunk)?;
        println!(
            "chunk {:>3} [{:<8}] {:>9} -> {:>9} ({:.2}x)  {}",
            i,
            out.phase.to_string(),
            chunk.len(),
            out.bytes.len(),
            out.result.ratio(),
            out.effective.display()
        );
        indices.push(out.index);
    }

    for (chunk, &index) in chunks.iter().zip(&indices) {
        let restored = session.decompress_chunk(index)?;
        if restored != *chunk {
            return Err(TunerError::RoundTrip(index));
        }
    }
    println!("\nAll {} chunks decompressed to their original bytes", indices.len());

    let stats = session.stats();
    let best = session.current_best();
    print_summary(&stats, best.as_ref());

    let advisor = session.advisor_stats();
    if advisor.predictions > 0 {
        println!(
            "Inference:     {} predictions, {} accepted",
            advisor.predictions, advisor.accepted
        );
    }

    if let Some(path) = &args.csv {
        write_trial_csv(session.trial_log(), path)?;
        println!("Wrote {} trials to {:?}", session.trial_log().len(), path);
    }
    if let (Some(path), Some(best)) = (&args.json, best) {
        write_best_json(&best, &stats, path)?;
        println!("Wrote best params to {:?}", path);
    }

    session.close();
    Ok(())
}
