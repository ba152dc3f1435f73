use serde::{Deserialize, Serialize};

use crate::config::PerfMode;

/// Smallest time credited to a trial, so throughput stays finite.
const MIN_ELAPSED_SECS: f64 = 1e-9;

/// Observed outcome of compressing one chunk with one set of params.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub ctime_secs: f64,
    /// Present only when the perf mode asked for decompression timing.
    pub dtime_secs: Option<f64>,
    pub csize: usize,
    pub nbytes: usize,
    /// Externally supplied quality metric in [0, 1]; lossless output is 1.0.
    pub quality: Option<f64>,
}

impl TrialResult {
    /// Uncompressed over compressed size.
    pub fn ratio(&self) -> f64 {
        if self.nbytes == 0 || self.csize == 0 {
            return 1.0;
        }
        self.nbytes as f64 / self.csize as f64
    }

    /// Bytes per second under the given perf mode.
    pub fn throughput(&self, mode: PerfMode) -> f64 {
        let elapsed = match mode {
            PerfMode::Compression => self.ctime_secs,
            PerfMode::Decompression => self.dtime_secs.unwrap_or(self.ctime_secs),
            PerfMode::Balanced => self.ctime_secs + self.dtime_secs.unwrap_or(0.0),
        };
        self.nbytes.max(1) as f64 / elapsed.max(MIN_ELAPSED_SECS)
    }

    pub fn quality_or_lossless(&self) -> f64 {
        self.quality.unwrap_or(1.0)
    }
}
