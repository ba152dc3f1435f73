use std::sync::Arc;

use crate::codec::{Codec, CodecError};
use crate::container::ChunkStore;
use crate::error::{Result, TunerError};
use crate::models::CompressionParams;

struct StoredChunk {
    bytes: Vec<u8>,
    params: CompressionParams,
    nbytes: usize,
}

/// In-memory super-chunk: an ordered list of compressed chunks plus the
/// params each one was compressed with.
pub struct SuperChunk {
    codec: Arc<dyn Codec>,
    chunks: Vec<StoredChunk>,
}

impl SuperChunk {
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        Self {
            codec,
            chunks: Vec::new(),
        }
    }
}

impl ChunkStore for SuperChunk {
    fn append_chunk(
        &mut self,
        compressed: Vec<u8>,
        params: CompressionParams,
        nbytes: usize,
    ) -> Result<usize> {
        self.chunks.push(StoredChunk {
            bytes: compressed,
            params,
            nbytes,
        });
        Ok(self.chunks.len() - 1)
    }

    fn decompress_chunk(&self, index: usize, out: &mut [u8]) -> Result<usize> {
        let chunk = self
            .chunks
            .get(index)
            .ok_or(TunerError::ChunkNotFound(index))?;

        if out.len() < chunk.nbytes {
            return Err(TunerError::Codec(CodecError::SizeMismatch {
                expected: chunk.nbytes,
                actual: out.len(),
            }));
        }

        let data = self.codec.decompress(&chunk.params, &chunk.bytes, chunk.nbytes)?;
        out[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }

    fn chunk_nbytes(&self, index: usize) -> Option<usize> {
        self.chunks.get(index).map(|c| c.nbytes)
    }

    fn len(&self) -> usize {
        self.chunks.len()
    }

    fn nbytes(&self) -> u64 {
        self.chunks.iter().map(|c| c.nbytes as u64).sum()
    }

    fn cbytes(&self) -> u64 {
        self.chunks.iter().map(|c| c.bytes.len() as u64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BlockCodec;

    fn store_with(data: &[u8]) -> (SuperChunk, CompressionParams) {
        let codec: Arc<dyn Codec> = Arc::new(BlockCodec::new());
        let params = CompressionParams::default();
        let frame = codec.compress(&params, data).unwrap();
        let mut store = SuperChunk::new(codec);
        let index = store.append_chunk(frame, params, data.len()).unwrap();
        assert_eq!(index, 0);
        (store, params)
    }

    #[test]
    fn test_append_and_decompress() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 13) as u8).collect();
        let (store, _) = store_with(&data);

        assert_eq!(store.len(), 1);
        assert_eq!(store.nbytes(), 10_000);
        assert!(store.cbytes() < store.nbytes());

        let mut out = vec![0u8; 10_000];
        let written = store.decompress_chunk(0, &mut out).unwrap();
        assert_eq!(written, 10_000);
        assert_eq!(out, data);
    }

    #[test]
    fn test_missing_chunk() {
        let (store, _) = store_with(b"hello");
        let mut out = vec![0u8; 5];
        assert!(matches!(
            store.decompress_chunk(3, &mut out),
            Err(TunerError::ChunkNotFound(3))
        ));
    }

    #[test]
    fn test_output_buffer_too_small() {
        let (store, _) = store_with(b"hello world");
        let mut out = vec![0u8; 4];
        assert!(store.decompress_chunk(0, &mut out).is_err());
    }
}
