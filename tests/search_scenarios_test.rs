#[macro_use]
extern crate assert_float_eq;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use codec_autotune_rs::codec::{BlockCodec, Codec, CodecError};
use codec_autotune_rs::config::{Behaviour, InferenceLevel, PerfMode, RepeatMode, Tradeoff, TunerConfig};
use codec_autotune_rs::container::SuperChunk;
use codec_autotune_rs::inference::{Model, ModelEntry};
use codec_autotune_rs::models::{Chunk, ChunkFeatures, CodecId, CompressionParams, FilterId, ParamSeed, Pinned};
use codec_autotune_rs::tuner::{Phase, TunerSession};
use tempfile::TempDir;

/// Higher levels shrink output more and take longer, deterministically.
struct LevelCostCodec;

impl Codec for LevelCostCodec {
    fn compress(&self, params: &CompressionParams, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        thread::sleep(Duration::from_millis(2 * u64::from(params.level)));
        let level = usize::from(params.level);
        let len = (input.len() * 10 / (10 + 3 * level)).max(1);
        Ok(vec![0; len])
    }

    fn decompress(&self, _: &CompressionParams, _: &[u8], expected_size: usize) -> Result<Vec<u8>, CodecError> {
        Ok(vec![0; expected_size])
    }
}

fn zstd_seed(level: u8) -> ParamSeed {
    ParamSeed::new(CompressionParams {
        codec: CodecId::Zstd,
        filter: FilterId::Shuffle,
        level,
        blocksize: 64 * 1024,
        typesize: 8,
        nthreads: 1,
    })
    .with_pinned(Pinned {
        codec: true,
        filter: true,
        blocksize: true,
        ..Pinned::default()
    })
}

fn level_session(ratio_weight: f64) -> TunerSession<SuperChunk> {
    let config = TunerConfig {
        tradeoff: Tradeoff::ratio_speed(ratio_weight).unwrap(),
        perf_mode: PerfMode::Compression,
        behaviour: Behaviour {
            nhards_before_stop: 4,
            ..Behaviour::default()
        },
        ..TunerConfig::default()
    };
    let codec: Arc<dyn Codec> = Arc::new(LevelCostCodec);
    TunerSession::new(config, zstd_seed(5), Arc::clone(&codec), SuperChunk::new(codec)).unwrap()
}

#[test]
fn test_ratio_tradeoff_beats_speed_tradeoff_on_ratio() {
    let chunk = vec![1u8; 16 * 1024];
    let mut ratio_first = level_session(1.0);
    let mut speed_first = level_session(0.0);

    let mut last_ratio = None;
    let mut last_speed = None;
    for _ in 0..20 {
        last_ratio = Some(ratio_first.compress_chunk(&chunk).unwrap());
        last_speed = Some(speed_first.compress_chunk(&chunk).unwrap());
    }
    let (r, s) = (last_ratio.unwrap(), last_speed.unwrap());

    assert_eq!(ratio_first.current_best().unwrap().level, 9);
    assert_eq!(speed_first.current_best().unwrap().level, 1);
    assert!(r.result.ratio() > s.result.ratio());
    assert!(r.result.ctime_secs > s.result.ctime_secs);
}

fn ratio_only_config(nhards: usize) -> TunerConfig {
    TunerConfig {
        tradeoff: Tradeoff::ratio_speed(1.0).unwrap(),
        perf_mode: PerfMode::Compression,
        behaviour: Behaviour {
            nhards_before_stop: nhards,
            ..Behaviour::default()
        },
        seed: 7,
        ..TunerConfig::default()
    }
}

fn block_session(config: TunerConfig, seed: ParamSeed) -> TunerSession<SuperChunk> {
    let codec: Arc<dyn Codec> = Arc::new(BlockCodec::new());
    TunerSession::new(config, seed, Arc::clone(&codec), SuperChunk::new(codec)).unwrap()
}

fn text_like(len: usize) -> Vec<u8> {
    let words: [&[u8]; 6] = [b"alpha ", b"beta ", b"gamma ", b"delta ", b"omega ", b"\n"];
    let mut out = Vec::with_capacity(len);
    let mut i = 0usize;
    while out.len() < len {
        out.extend_from_slice(words[(i * 7 + i / 5) % words.len()]);
        i += 1;
    }
    out.truncate(len);
    out
}

#[test]
fn test_search_converges_within_bound() {
    let nhards = 3;
    let seed = ParamSeed::new(CompressionParams {
        codec: CodecId::Zstd,
        filter: FilterId::NoFilter,
        level: 1,
        blocksize: 8 * 1024,
        typesize: 1,
        nthreads: 1,
    })
    .with_pinned(Pinned {
        codec: true,
        filter: true,
        ..Pinned::default()
    });
    let mut session = block_session(ratio_only_config(nhards), seed);

    // 9 levels by 8 block sizes
    let space_size = 72;
    let bound = 1 + space_size * nhards + nhards;
    let data = text_like(32 * 1024);

    let mut stopped_at = None;
    for i in 0..bound {
        session.compress_chunk(&data).unwrap();
        if session.phase() == Phase::HardStop {
            stopped_at = Some(i);
            break;
        }
    }
    assert!(stopped_at.is_some(), "no hard stop within {} chunks", bound);
    assert_eq!(session.search_state().non_improving, nhards);
}

#[test]
fn test_best_score_is_monotonic() {
    let mut session = block_session(
        TunerConfig {
            behaviour: Behaviour {
                nhards_before_stop: 2,
                repeat_mode: RepeatMode::All,
                repeat_interval: 1,
            },
            ..ratio_only_config(2)
        },
        ParamSeed::new(CompressionParams {
            typesize: 1,
            nthreads: 2,
            ..CompressionParams::default()
        }),
    );

    let data = text_like(200_000);
    let mut last = f64::NEG_INFINITY;
    for chunk in data.chunks(10_000) {
        session.compress_chunk(chunk).unwrap();
        let score = session.search_state().best_score;
        assert!(score >= last);
        last = score;
    }
}

#[test]
fn test_same_seed_same_choices() {
    let seed = ParamSeed::new(CompressionParams {
        typesize: 1,
        nthreads: 2,
        ..CompressionParams::default()
    });
    let mut a = block_session(ratio_only_config(3), seed);
    let mut b = block_session(ratio_only_config(3), seed);

    let data = text_like(150_000);
    for chunk in data.chunks(15_000) {
        let pa = a.compress_chunk(chunk).unwrap();
        let pb = b.compress_chunk(chunk).unwrap();
        assert_eq!(pa.effective, pb.effective);
        assert_eq!(pa.phase, pb.phase);
    }
    assert_eq!(a.current_best(), b.current_best());
}

#[test]
fn test_tied_candidates_keep_the_best() {
    // Store ignores level and threads, so every candidate ties on ratio
    let seed = ParamSeed::new(CompressionParams {
        codec: CodecId::Store,
        filter: FilterId::NoFilter,
        level: 0,
        blocksize: 16 * 1024,
        typesize: 1,
        nthreads: 4,
    })
    .with_pinned(Pinned {
        codec: true,
        filter: true,
        blocksize: true,
        ..Pinned::default()
    });
    let mut session = block_session(ratio_only_config(3), seed);

    let data = text_like(64 * 1024);
    for _ in 0..4 {
        session.compress_chunk(&data).unwrap();
    }
    assert_eq!(session.phase(), Phase::HardStop);
    assert_eq!(session.current_best().unwrap().nthreads, 4);
}

/// Output shrinks 10% per level; the first chunk compresses three times better.
struct DriftingCodec;

impl Codec for DriftingCodec {
    fn compress(&self, params: &CompressionParams, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        let factor = if input.first() == Some(&3) { 3.0 } else { 1.0 };
        let ratio = factor * (1.0 + 0.1 * f64::from(params.level));
        Ok(vec![0; (input.len() as f64 / ratio).round() as usize])
    }

    fn decompress(&self, _: &CompressionParams, _: &[u8], expected_size: usize) -> Result<Vec<u8>, CodecError> {
        Ok(vec![0; expected_size])
    }
}

#[test]
fn test_ratio_search_climbs_after_data_gets_harder() {
    let codec: Arc<dyn Codec> = Arc::new(DriftingCodec);
    let mut session =
        TunerSession::new(ratio_only_config(3), zstd_seed(5), Arc::clone(&codec), SuperChunk::new(codec)).unwrap();

    session.compress_chunk(&[3u8; 4096]).unwrap();
    for _ in 0..12 {
        session.compress_chunk(&[1u8; 4096]).unwrap();
    }
    assert_eq!(session.current_best().unwrap().level, 9);
    assert_eq!(session.phase(), Phase::HardStop);
}

#[test]
fn test_advisory_model_suggestion_is_trialed_and_counted() {
    let data = text_like(64 * 1024);
    let suggested = CompressionParams {
        codec: CodecId::Zstd,
        filter: FilterId::NoFilter,
        level: 9,
        blocksize: 64 * 1024,
        typesize: 1,
        nthreads: 1,
    };
    let dir = TempDir::new().unwrap();
    Model::new(vec![ModelEntry {
        features: ChunkFeatures::extract(&Chunk::new(&data, 1)),
        tradeoff: Tradeoff::ratio_speed(1.0).unwrap(),
        ranked: vec![suggested],
    }])
    .save(dir.path())
    .unwrap();

    let config = TunerConfig {
        use_inference: InferenceLevel::Advisory,
        models_dir: Some(dir.path().to_path_buf()),
        ..ratio_only_config(3)
    };
    let seed = ParamSeed::new(CompressionParams {
        codec: CodecId::Lz4,
        filter: FilterId::NoFilter,
        level: 1,
        blocksize: 64 * 1024,
        typesize: 1,
        nthreads: 1,
    });
    let mut session = block_session(config, seed);

    let out = session.compress_chunk(&data).unwrap();
    assert_eq!(out.phase, Phase::Warmup);
    let warmup: Vec<_> = session.trial_log().iter().map(|r| r.params).collect();
    assert!(warmup.contains(&seed.params));
    assert!(warmup.contains(&suggested));

    // Level 9 zstd clearly beats level 1 lz4 on repetitive text
    assert_eq!(out.effective, suggested);
    let stats = session.advisor_stats();
    assert_eq!(stats.predictions, 1);
    assert_eq!(stats.accepted, 1);
    assert_float_absolute_eq!(session.search_state().best_score, 1.0, 1e-9);
}
