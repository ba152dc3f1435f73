use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::codec::filters;
use crate::codec::{Codec, CodecError};
use crate::models::{CodecId, CompressionParams, FilterId};

const MAGIC: &[u8; 4] = b"ACTB";
const VERSION: u8 = 1;

/// magic, version, codec, filter, level, typesize, blocksize, nbytes, nblocks.
const HEADER_LEN: usize = 4 + 1 + 1 + 1 + 1 + 4 + 4 + 8 + 4;

/// Per-block table entry: compressed length then mode.
const ENTRY_LEN: usize = 5;

const MODE_CODED: u8 = 0;
/// Block stored unfiltered because coding did not shrink it.
const MODE_RAW: u8 = 1;

/// Zstd level used for each tuner level 1..=9.
const ZSTD_LEVELS: [i32; 9] = [1, 2, 3, 5, 7, 9, 12, 15, 19];

/// Splits a buffer into blocks, filters and codes each block independently,
/// and writes a self-describing frame.
///
/// Blocks are processed on a rayon pool sized by `nthreads`; pools are
/// built once per thread count and reused.
pub struct BlockCodec {
    pools: Mutex<HashMap<usize, Arc<ThreadPool>>>,
}

impl Default for BlockCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockCodec {
    pub fn new() -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
        }
    }

    fn pool(&self, nthreads: usize) -> Result<Arc<ThreadPool>, CodecError> {
        let mut pools = self.pools.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pool) = pools.get(&nthreads) {
            return Ok(Arc::clone(pool));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(nthreads)
            .thread_name(|i| format!("block-codec-{}", i))
            .build()
            .map_err(|e| CodecError::Pool(e.to_string()))?;
        let pool = Arc::new(pool);
        pools.insert(nthreads, Arc::clone(&pool));
        Ok(pool)
    }

    /// Run `f` for every block index, in parallel when more than one thread is allowed.
    fn run_blocks<T, F>(&self, nthreads: usize, count: usize, f: F) -> Result<Vec<T>, CodecError>
    where
        T: Send,
        F: Fn(usize) -> Result<T, CodecError> + Send + Sync,
    {
        if nthreads <= 1 || count <= 1 {
            return (0..count).map(&f).collect();
        }
        let pool = self.pool(nthreads)?;
        pool.install(|| (0..count).into_par_iter().map(&f).collect())
    }
}

fn check_params(params: &CompressionParams) -> Result<(), CodecError> {
    if params.typesize == 0 || params.typesize > u32::MAX as usize {
        return Err(CodecError::Unsupported(format!(
            "typesize {} out of range",
            params.typesize
        )));
    }
    if params.blocksize == 0 || params.blocksize > u32::MAX as usize {
        return Err(CodecError::Unsupported(format!(
            "blocksize {} out of range",
            params.blocksize
        )));
    }
    if !params.codec.level_range().contains(&params.level) {
        return Err(CodecError::Unsupported(format!(
            "level {} not supported by {}",
            params.level,
            params.codec.name()
        )));
    }
    if params.nthreads == 0 {
        return Err(CodecError::Unsupported("nthreads must be positive".to_string()));
    }
    Ok(())
}

fn compress_block(
    params: &CompressionParams,
    block: &[u8],
) -> Result<(Vec<u8>, u8), CodecError> {
    let filtered = filters::forward(params.filter, block, params.typesize);
    let coded = match params.codec {
        CodecId::Store => filtered,
        CodecId::Lz4 => lz4_flex::compress(&filtered),
        CodecId::Zstd => {
            let level = ZSTD_LEVELS[usize::from(params.level.saturating_sub(1)).min(8)];
            zstd::bulk::compress(&filtered, level)
                .map_err(|e| CodecError::Compress(e.to_string()))?
        }
    };

    if coded.len() >= block.len() {
        Ok((block.to_vec(), MODE_RAW))
    } else {
        Ok((coded, MODE_CODED))
    }
}

fn decompress_block(
    codec: CodecId,
    filter: FilterId,
    typesize: usize,
    payload: &[u8],
    mode: u8,
    raw_len: usize,
) -> Result<Vec<u8>, CodecError> {
    if mode == MODE_RAW {
        if payload.len() != raw_len {
            return Err(CodecError::SizeMismatch {
                expected: raw_len,
                actual: payload.len(),
            });
        }
        return Ok(payload.to_vec());
    }

    let decoded = match codec {
        CodecId::Store => payload.to_vec(),
        CodecId::Lz4 => lz4_flex::decompress(payload, raw_len)
            .map_err(|e| CodecError::Decompress(e.to_string()))?,
        CodecId::Zstd => zstd::bulk::decompress(payload, raw_len)
            .map_err(|e| CodecError::Decompress(e.to_string()))?,
    };
    if decoded.len() != raw_len {
        return Err(CodecError::SizeMismatch {
            expected: raw_len,
            actual: decoded.len(),
        });
    }
    Ok(filters::backward(filter, &decoded, typesize))
}

fn read_u32(buf: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]])
}

fn read_u64(buf: &[u8], pos: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[pos..pos + 8]);
    u64::from_le_bytes(bytes)
}

impl Codec for BlockCodec {
    fn compress(&self, params: &CompressionParams, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        check_params(params)?;

        let blocksize = params.blocksize;
        let nblocks = input.len().div_ceil(blocksize);
        if nblocks > u32::MAX as usize {
            return Err(CodecError::Unsupported(format!(
                "{} blocks exceed the frame limit",
                nblocks
            )));
        }

        let blocks = self.run_blocks(params.nthreads, nblocks, |i| {
            let start = i * blocksize;
            let end = (start + blocksize).min(input.len());
            compress_block(params, &input[start..end])
        })?;

        let payload_len: usize = blocks.iter().map(|(b, _)| b.len()).sum();
        let mut out = Vec::with_capacity(HEADER_LEN + nblocks * ENTRY_LEN + payload_len);
        out.extend_from_slice(MAGIC);
        out.push(VERSION);
        out.push(params.codec.tag());
        out.push(params.filter.tag());
        out.push(params.level);
        out.extend_from_slice(&(params.typesize as u32).to_le_bytes());
        out.extend_from_slice(&(blocksize as u32).to_le_bytes());
        out.extend_from_slice(&(input.len() as u64).to_le_bytes());
        out.extend_from_slice(&(nblocks as u32).to_le_bytes());
        for (bytes, mode) in &blocks {
            out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            out.push(*mode);
        }
        for (bytes, _) in &blocks {
            out.extend_from_slice(bytes);
        }
        Ok(out)
    }

    fn decompress(
        &self,
        params: &CompressionParams,
        compressed: &[u8],
        expected_size: usize,
    ) -> Result<Vec<u8>, CodecError> {
        if compressed.len() < HEADER_LEN || &compressed[..4] != MAGIC {
            return Err(CodecError::Corrupt("missing frame header".to_string()));
        }
        if compressed[4] != VERSION {
            return Err(CodecError::Corrupt(format!(
                "unknown frame version {}",
                compressed[4]
            )));
        }
        let codec = CodecId::from_tag(compressed[5])
            .ok_or_else(|| CodecError::Corrupt(format!("unknown codec tag {}", compressed[5])))?;
        let filter = FilterId::from_tag(compressed[6])
            .ok_or_else(|| CodecError::Corrupt(format!("unknown filter tag {}", compressed[6])))?;
        let typesize = read_u32(compressed, 8) as usize;
        let blocksize = read_u32(compressed, 12) as usize;
        let nbytes = read_u64(compressed, 16) as usize;
        let nblocks = read_u32(compressed, 24) as usize;

        if nbytes != expected_size {
            return Err(CodecError::SizeMismatch {
                expected: expected_size,
                actual: nbytes,
            });
        }
        if blocksize == 0 || nblocks != nbytes.div_ceil(blocksize) {
            return Err(CodecError::Corrupt(format!(
                "{} blocks cannot hold {} bytes of blocksize {}",
                nblocks, nbytes, blocksize
            )));
        }

        let table_end = HEADER_LEN + nblocks * ENTRY_LEN;
        if compressed.len() < table_end {
            return Err(CodecError::Corrupt("truncated block table".to_string()));
        }

        let mut spans = Vec::with_capacity(nblocks);
        let mut offset = table_end;
        for i in 0..nblocks {
            let entry = HEADER_LEN + i * ENTRY_LEN;
            let len = read_u32(compressed, entry) as usize;
            let mode = compressed[entry + 4];
            spans.push((offset, len, mode));
            offset += len;
        }
        if offset != compressed.len() {
            return Err(CodecError::Corrupt(format!(
                "block table covers {} bytes but frame has {}",
                offset,
                compressed.len()
            )));
        }

        let blocks = self.run_blocks(params.nthreads.max(1), nblocks, |i| {
            let (start, len, mode) = spans[i];
            let raw_len = blocksize.min(nbytes - i * blocksize);
            decompress_block(
                codec,
                filter,
                typesize,
                &compressed[start..start + len],
                mode,
                raw_len,
            )
        })?;

        let out = blocks.concat();
        if out.len() != expected_size {
            return Err(CodecError::SizeMismatch {
                expected: expected_size,
                actual: out.len(),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_data(len: usize) -> Vec<u8> {
        // Slowly increasing u32 values: compressible, and friendly to shuffle and delta
        (0..len / 4 + 1)
            .flat_map(|i| ((i / 3) as u32).to_le_bytes())
            .take(len)
            .collect()
    }

    fn params(codec: CodecId, filter: FilterId, nthreads: usize) -> CompressionParams {
        CompressionParams {
            codec,
            filter,
            level: codec.clamp_level(5),
            blocksize: 4096,
            typesize: 4,
            nthreads,
        }
    }

    #[test]
    fn test_roundtrip_all_codecs_and_filters() {
        let codec = BlockCodec::new();
        for len in [0usize, 1, 7, 4096, 50_001] {
            let data = sample_data(len);
            for c in CodecId::ALL {
                for f in FilterId::ALL {
                    for nthreads in [1, 3] {
                        let p = params(c, f, nthreads);
                        let frame = codec.compress(&p, &data).unwrap();
                        let back = codec.decompress(&p, &frame, data.len()).unwrap();
                        assert_eq!(back, data, "roundtrip failed for {}", p.display());
                    }
                }
            }
        }
    }

    #[test]
    fn test_compressible_data_shrinks() {
        let codec = BlockCodec::new();
        let data = sample_data(64 * 1024);
        let p = params(CodecId::Zstd, FilterId::Shuffle, 1);
        let frame = codec.compress(&p, &data).unwrap();
        assert!(frame.len() < data.len() / 4);
    }

    #[test]
    fn test_rejects_wrong_expected_size() {
        let codec = BlockCodec::new();
        let data = sample_data(1000);
        let p = params(CodecId::Lz4, FilterId::NoFilter, 1);
        let frame = codec.compress(&p, &data).unwrap();
        assert!(matches!(
            codec.decompress(&p, &frame, 999),
            Err(CodecError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_corrupt_frame() {
        let codec = BlockCodec::new();
        let data = sample_data(1000);
        let p = params(CodecId::Zstd, FilterId::NoFilter, 1);
        let mut frame = codec.compress(&p, &data).unwrap();
        frame.truncate(frame.len() - 1);
        assert!(codec.decompress(&p, &frame, data.len()).is_err());
        assert!(codec.decompress(&p, b"nope", 0).is_err());
    }

    #[test]
    fn test_rejects_unsupported_params() {
        let codec = BlockCodec::new();
        let mut p = params(CodecId::Zstd, FilterId::NoFilter, 1);
        p.level = 0;
        assert!(matches!(
            codec.compress(&p, b"abc"),
            Err(CodecError::Unsupported(_))
        ));

        let mut p = params(CodecId::Lz4, FilterId::NoFilter, 1);
        p.blocksize = 0;
        assert!(codec.compress(&p, b"abc").is_err());
    }
}
