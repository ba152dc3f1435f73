use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::codec::Codec;
use crate::config::TunerConfig;
use crate::container::ChunkStore;
use crate::error::{Result, TunerError};
use crate::inference::{AdvisorStats, InferenceAdvisor};
use crate::models::{Chunk, CompressionParams, ParamSeed, TrialResult};
use crate::tuner::controller::{Phase, SearchController, SearchState, TrialRecord};
use crate::tuner::monitor::PerformanceMonitor;
use crate::tuner::space::ParameterSpace;

const MIB: f64 = 1024.0 * 1024.0;

/// What the session produced for one chunk.
#[derive(Debug, Clone)]
pub struct CompressedChunk {
    /// Position of the chunk in the store.
    pub index: usize,
    pub bytes: Vec<u8>,
    /// Params actually used, which may differ from the requested ones.
    pub effective: CompressionParams,
    pub result: TrialResult,
    pub phase: Phase,
}

/// Running totals over the chunks of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SessionStats {
    pub chunks: usize,
    pub nbytes: u64,
    pub cbytes: u64,
    /// Compression time of the delivered outputs.
    pub ctime_secs: f64,
    /// Time spent in `decompress_chunk`.
    pub dtime_secs: f64,
}

impl SessionStats {
    pub fn ratio(&self) -> f64 {
        if self.cbytes == 0 {
            return 1.0;
        }
        self.nbytes as f64 / self.cbytes as f64
    }

    pub fn compression_mibps(&self) -> f64 {
        if self.ctime_secs <= 0.0 {
            return 0.0;
        }
        self.nbytes as f64 / MIB / self.ctime_secs
    }

    pub fn decompression_mibps(&self) -> f64 {
        if self.dtime_secs <= 0.0 {
            return 0.0;
        }
        self.nbytes as f64 / MIB / self.dtime_secs
    }
}

/// Compresses a stream of chunks into `store`, tuning params as it goes.
///
/// The session owns the search state and the inference model; both are
/// released by [`close`](Self::close) or on drop.
pub struct TunerSession<S: ChunkStore> {
    controller: SearchController,
    monitor: PerformanceMonitor,
    store: S,
    typesize: usize,
    stats: SessionStats,
    closed: bool,
}

impl<S: ChunkStore> TunerSession<S> {
    pub fn new(config: TunerConfig, seed: ParamSeed, codec: Arc<dyn Codec>, store: S) -> Result<Self> {
        config.validate()?;

        let space = ParameterSpace::new(&seed);
        if space.sanitize(&seed.params).is_none() {
            return Err(TunerError::Config(format!(
                "requested params {} are not valid",
                seed.params.display()
            )));
        }

        let advisor = InferenceAdvisor::load(&config)?;
        let monitor = PerformanceMonitor::new(
            codec,
            config.perf_mode,
            config.trial_timeout(),
            config.parallel_trials,
        );
        info!(
            seed = %seed.params.display(),
            tradeoff = ?config.tradeoff.as_slice(),
            perf_mode = ?config.perf_mode,
            inference = advisor.has_model(),
            "tuner session started"
        );

        Ok(Self {
            controller: SearchController::new(&config, space, advisor),
            monitor,
            store,
            typesize: seed.params.typesize,
            stats: SessionStats::default(),
            closed: false,
        })
    }

    /// Compress one chunk, append it to the store and report what was used.
    pub fn compress_chunk(&mut self, data: &[u8]) -> Result<CompressedChunk> {
        if self.closed {
            return Err(TunerError::SessionClosed);
        }

        let chunk = Chunk::new(data, self.typesize);
        let delivery = self.controller.process(&chunk, &mut self.monitor)?;
        let trial = delivery.trial;

        let index = self
            .store
            .append_chunk(trial.compressed.clone(), trial.params, data.len())?;

        self.stats.chunks += 1;
        self.stats.nbytes += data.len() as u64;
        self.stats.cbytes += trial.compressed.len() as u64;
        self.stats.ctime_secs += trial.result.ctime_secs;
        debug!(
            index,
            phase = %delivery.phase,
            params = %trial.params.display(),
            nbytes = data.len(),
            cbytes = trial.compressed.len(),
            "chunk stored"
        );

        Ok(CompressedChunk {
            index,
            bytes: trial.compressed,
            effective: trial.params,
            result: trial.result,
            phase: delivery.phase,
        })
    }

    /// Decompress chunk `index` from the store.
    pub fn decompress_chunk(&mut self, index: usize) -> Result<Vec<u8>> {
        let nbytes = self
            .store
            .chunk_nbytes(index)
            .ok_or(TunerError::ChunkNotFound(index))?;

        let mut out = vec![0u8; nbytes];
        let start = Instant::now();
        let written = self.store.decompress_chunk(index, &mut out)?;
        self.stats.dtime_secs += start.elapsed().as_secs_f64();

        out.truncate(written);
        Ok(out)
    }

    pub fn current_best(&self) -> Option<CompressionParams> {
        self.controller.best_params()
    }

    pub fn phase(&self) -> Phase {
        self.controller.phase()
    }

    pub fn search_state(&self) -> &SearchState {
        self.controller.state()
    }

    pub fn trial_log(&self) -> &[TrialRecord] {
        self.controller.trial_log()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn advisor_stats(&self) -> AdvisorStats {
        self.controller.advisor().stats()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Wait for abandoned trials and release the model. Later
    /// `compress_chunk` calls fail; stored chunks stay readable.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.monitor.join_stragglers();
        self.controller.release_model();
        self.closed = true;
        info!(
            chunks = self.stats.chunks,
            ratio = self.stats.ratio(),
            "tuner session closed"
        );
    }
}

impl<S: ChunkStore> Drop for TunerSession<S> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BlockCodec;
    use crate::container::SuperChunk;
    use crate::models::{CodecId, FilterId};

    fn session(config: TunerConfig) -> TunerSession<SuperChunk> {
        let codec: Arc<dyn Codec> = Arc::new(BlockCodec::new());
        let seed = ParamSeed::new(CompressionParams {
            codec: CodecId::Lz4,
            filter: FilterId::Shuffle,
            level: 1,
            blocksize: 16 * 1024,
            typesize: 4,
            nthreads: 2,
        });
        TunerSession::new(config, seed, Arc::clone(&codec), SuperChunk::new(codec)).unwrap()
    }

    fn data(n: usize) -> Vec<u8> {
        (0..n as u32).flat_map(|i| (i / 3).to_le_bytes()).collect()
    }

    #[test]
    fn test_chunks_roundtrip_through_store() {
        let mut s = session(TunerConfig::default());
        let chunks = [data(10_000), data(2_500), Vec::new(), vec![42u8]];

        let mut indices = Vec::new();
        for c in &chunks {
            indices.push(s.compress_chunk(c).unwrap().index);
        }
        for (c, &i) in chunks.iter().zip(&indices) {
            assert_eq!(&s.decompress_chunk(i).unwrap(), c);
        }
        assert_eq!(s.stats().chunks, 4);
        assert_eq!(s.store().len(), 4);
    }

    #[test]
    fn test_first_chunk_is_warmup_with_seed() {
        let mut s = session(TunerConfig::default());
        let out = s.compress_chunk(&data(4096)).unwrap();
        assert_eq!(out.phase, Phase::Warmup);
        assert_eq!(out.effective.codec, CodecId::Lz4);
        assert_eq!(s.current_best(), Some(out.effective));
        assert_eq!(s.phase(), Phase::Explore);
    }

    #[test]
    fn test_effective_threads_never_exceed_request() {
        let mut s = session(TunerConfig::default());
        for _ in 0..8 {
            let out = s.compress_chunk(&data(8192)).unwrap();
            assert!(out.effective.nthreads <= 2);
            assert_eq!(out.effective.typesize, 4);
        }
    }

    #[test]
    fn test_closed_session_rejects_chunks() {
        let mut s = session(TunerConfig::default());
        let index = s.compress_chunk(&data(1024)).unwrap().index;
        s.close();
        assert!(matches!(s.compress_chunk(&data(1024)), Err(TunerError::SessionClosed)));
        assert_eq!(s.decompress_chunk(index).unwrap(), data(1024));
    }

    #[test]
    fn test_missing_chunk() {
        let mut s = session(TunerConfig::default());
        assert!(matches!(s.decompress_chunk(3), Err(TunerError::ChunkNotFound(3))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let codec: Arc<dyn Codec> = Arc::new(BlockCodec::new());
        let config = TunerConfig {
            search_breadth: 0,
            ..TunerConfig::default()
        };
        let outcome = TunerSession::new(
            config,
            ParamSeed::default(),
            Arc::clone(&codec),
            SuperChunk::new(codec),
        );
        assert!(matches!(outcome, Err(TunerError::Config(_))));
    }
}
