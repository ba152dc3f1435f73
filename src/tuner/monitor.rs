use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::codec::{Codec, CodecError};
use crate::config::PerfMode;
use crate::error::{Result, TunerError};
use crate::models::{Chunk, CompressionParams, TrialResult};

/// A successful trial: what was measured and the bytes it produced.
#[derive(Debug, Clone)]
pub struct Trial {
    pub params: CompressionParams,
    pub result: TrialResult,
    pub compressed: Vec<u8>,
}

/// A trial running on its own worker thread.
struct Pending {
    params: CompressionParams,
    slot: Receiver<Result<Trial>>,
    handle: JoinHandle<()>,
    deadline: Instant,
}

/// Times codec invocations for candidate params.
///
/// Every trial runs on a dedicated worker that reports through its own
/// channel. A worker that overruns the timeout is abandoned for the rest of
/// the chunk and joined later by [`join_stragglers`](Self::join_stragglers).
pub struct PerformanceMonitor {
    codec: Arc<dyn Codec>,
    perf_mode: PerfMode,
    timeout: Duration,
    parallel: bool,
    stragglers: Vec<JoinHandle<()>>,
}

fn trial_error(params: &CompressionParams, reason: impl ToString) -> TunerError {
    TunerError::CodecTrial {
        params: params.display(),
        reason: reason.to_string(),
    }
}

/// Compress once and, when the perf mode needs it, decompress once and verify.
fn run_trial(
    codec: &dyn Codec,
    params: &CompressionParams,
    data: &[u8],
    perf_mode: PerfMode,
) -> Result<Trial> {
    let start = Instant::now();
    let compressed = codec
        .compress(params, data)
        .map_err(|e| trial_error(params, e))?;
    let ctime_secs = start.elapsed().as_secs_f64();

    let dtime_secs = if perf_mode.needs_decompression() {
        let start = Instant::now();
        let restored = codec
            .decompress(params, &compressed, data.len())
            .map_err(|e| trial_error(params, e))?;
        let elapsed = start.elapsed().as_secs_f64();

        if restored.len() != data.len() {
            return Err(trial_error(
                params,
                CodecError::SizeMismatch {
                    expected: data.len(),
                    actual: restored.len(),
                },
            ));
        }
        if restored.as_slice() != data {
            return Err(trial_error(params, "round-trip produced different bytes"));
        }
        Some(elapsed)
    } else {
        None
    };

    Ok(Trial {
        params: *params,
        result: TrialResult {
            ctime_secs,
            dtime_secs,
            csize: compressed.len(),
            nbytes: data.len(),
            quality: None,
        },
        compressed,
    })
}

impl PerformanceMonitor {
    pub fn new(codec: Arc<dyn Codec>, perf_mode: PerfMode, timeout: Duration, parallel: bool) -> Self {
        Self {
            codec,
            perf_mode,
            timeout,
            parallel,
            stragglers: Vec::new(),
        }
    }

    pub fn perf_mode(&self) -> PerfMode {
        self.perf_mode
    }

    fn spawn(&self, params: CompressionParams, chunk: &Chunk, deadline: Instant) -> Result<Pending> {
        let (tx, slot) = mpsc::channel();
        let codec = Arc::clone(&self.codec);
        let data = chunk.share();
        let perf_mode = self.perf_mode;

        let handle = thread::Builder::new()
            .name("codec-trial".to_string())
            .spawn(move || {
                // The receiver is gone when the trial already timed out
                let _ = tx.send(run_trial(codec.as_ref(), &params, &data, perf_mode));
            })
            .map_err(|e| trial_error(&params, e))?;

        Ok(Pending {
            params,
            slot,
            handle,
            deadline,
        })
    }

    fn collect(&mut self, pending: Pending) -> Result<Trial> {
        let wait = pending.deadline.saturating_duration_since(Instant::now());
        match pending.slot.recv_timeout(wait) {
            Ok(outcome) => {
                let _ = pending.handle.join();
                outcome
            }
            Err(RecvTimeoutError::Timeout) => {
                self.stragglers.push(pending.handle);
                Err(trial_error(
                    &pending.params,
                    format!("timed out after {} ms", self.timeout.as_millis()),
                ))
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = pending.handle.join();
                Err(trial_error(&pending.params, "codec worker panicked"))
            }
        }
    }

    fn log_outcome(params: &CompressionParams, outcome: &Result<Trial>) {
        match outcome {
            Ok(trial) => debug!(
                params = %params.display(),
                ratio = trial.result.ratio(),
                ctime = trial.result.ctime_secs,
                dtime = ?trial.result.dtime_secs,
                "trial finished"
            ),
            Err(e) => warn!(error = %e, "trial discarded"),
        }
    }

    /// Measure one set of params against `chunk`.
    pub fn measure(&mut self, params: &CompressionParams, chunk: &Chunk) -> Result<Trial> {
        self.reap();
        let outcome = self
            .spawn(*params, chunk, Instant::now() + self.timeout)
            .and_then(|pending| self.collect(pending));
        Self::log_outcome(params, &outcome);
        outcome
    }

    /// Measure several candidates against the same chunk.
    ///
    /// Outcomes come back in candidate order. With parallel trials enabled
    /// all candidates run at once and share one deadline.
    pub fn measure_batch(
        &mut self,
        candidates: &[CompressionParams],
        chunk: &Chunk,
    ) -> Vec<(CompressionParams, Result<Trial>)> {
        if !self.parallel {
            return candidates
                .iter()
                .map(|p| (*p, self.measure(p, chunk)))
                .collect();
        }

        self.reap();
        let deadline = Instant::now() + self.timeout;
        let spawned: Vec<(CompressionParams, Result<Pending>)> = candidates
            .iter()
            .map(|p| (*p, self.spawn(*p, chunk, deadline)))
            .collect();

        spawned
            .into_iter()
            .map(|(p, pending)| {
                let outcome = pending.and_then(|pending| self.collect(pending));
                Self::log_outcome(&p, &outcome);
                (p, outcome)
            })
            .collect()
    }

    /// Drop handles of abandoned workers that have since finished.
    fn reap(&mut self) {
        self.stragglers.retain(|h| !h.is_finished());
    }

    /// Abandoned workers still running.
    pub fn in_flight(&mut self) -> usize {
        self.reap();
        self.stragglers.len()
    }

    /// Block until every abandoned worker has finished.
    pub fn join_stragglers(&mut self) {
        for handle in self.stragglers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for PerformanceMonitor {
    fn drop(&mut self) {
        self.join_stragglers();
    }
}
