use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::models::CompressionParams;
use crate::tuner::controller::TrialRecord;
use crate::tuner::session::SessionStats;

/// Round a float to n decimal places.
fn truncate(value: f64, decimals: u32) -> f64 {
    let factor = 10_f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Write every trial of a session to a CSV file.
pub fn write_trial_csv(records: &[TrialRecord], path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "chunk",
        "phase",
        "codec",
        "filter",
        "level",
        "blocksize",
        "nthreads",
        "csize",
        "ratio",
        "ctime_ms",
        "dtime_ms",
        "score",
        "delivered",
        "error",
    ])?;

    for r in records {
        let p = &r.params;
        let (csize, ratio, ctime, dtime) = match &r.result {
            Some(res) => (
                res.csize.to_string(),
                format!("{:.3}", res.ratio()),
                format!("{:.3}", res.ctime_secs * 1e3),
                res.dtime_secs
                    .map(|d| format!("{:.3}", d * 1e3))
                    .unwrap_or_default(),
            ),
            None => Default::default(),
        };
        wtr.write_record([
            r.chunk_index.to_string(),
            r.phase.to_string(),
            p.codec.name().to_string(),
            p.filter.name().to_string(),
            p.level.to_string(),
            p.blocksize.to_string(),
            p.nthreads.to_string(),
            csize,
            ratio,
            ctime,
            dtime,
            r.score.map(|s| format!("{:.4}", s)).unwrap_or_default(),
            r.delivered.to_string(),
            r.error.clone().unwrap_or_default(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Write the best params and session totals to a JSON file.
pub fn write_best_json(best: &CompressionParams, stats: &SessionStats, path: &Path) -> Result<()> {
    let json = serde_json::json!({
        "params": best,
        "stats": {
            "chunks": stats.chunks,
            "nbytes": stats.nbytes,
            "cbytes": stats.cbytes,
            "ratio": truncate(stats.ratio(), 3),
            "compression_mibps": truncate(stats.compression_mibps(), 2),
            "decompression_mibps": truncate(stats.decompression_mibps(), 2),
        },
    });

    let mut file = File::create(path)?;
    file.write_all(serde_json::to_string_pretty(&json)?.as_bytes())?;
    Ok(())
}

/// Print session totals to stdout.
pub fn print_summary(stats: &SessionStats, best: Option<&CompressionParams>) {
    println!("\n=== Session summary ===\n");
    println!("Chunks:        {}", stats.chunks);
    println!(
        "Compression:   {} -> {} ({:.1}x)",
        stats.nbytes,
        stats.cbytes,
        stats.ratio()
    );
    println!(
        "Timings:       compress {:.3} s ({:.2} MiB/s), decompress {:.3} s ({:.2} MiB/s)",
        stats.ctime_secs,
        stats.compression_mibps(),
        stats.dtime_secs,
        stats.decompression_mibps()
    );
    if let Some(p) = best {
        println!("Best params:   {}", p.display());
    }
}
