//! Boundary with the chunked container that holds compressed chunks.

mod schunk;

use crate::error::Result;
use crate::models::CompressionParams;

pub use schunk::SuperChunk;

/// Append-only storage of compressed chunks.
pub trait ChunkStore: Send {
    /// Store a compressed chunk and return its index.
    fn append_chunk(
        &mut self,
        compressed: Vec<u8>,
        params: CompressionParams,
        nbytes: usize,
    ) -> Result<usize>;

    /// Decompress chunk `index` into `out`, returning the number of bytes written.
    fn decompress_chunk(&self, index: usize, out: &mut [u8]) -> Result<usize>;

    /// Uncompressed size of chunk `index`.
    fn chunk_nbytes(&self, index: usize) -> Option<usize>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total uncompressed bytes stored.
    fn nbytes(&self) -> u64;

    /// Total compressed bytes stored.
    fn cbytes(&self) -> u64;
}
