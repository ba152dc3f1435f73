//! Boundary with the codec/filter library.
//!
//! The tuner only ever calls [`Codec::compress`] and [`Codec::decompress`];
//! [`BlockCodec`] is the implementation shipped with the crate.

pub mod block;
pub mod filters;

use thiserror::Error;

use crate::models::CompressionParams;

pub use block::BlockCodec;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Unsupported parameters: {0}")]
    Unsupported(String),

    #[error("Compression failed: {0}")]
    Compress(String),

    #[error("Decompression failed: {0}")]
    Decompress(String),

    #[error("Corrupt frame: {0}")]
    Corrupt(String),

    #[error("Size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Worker pool error: {0}")]
    Pool(String),
}

/// An opaque compression capability.
pub trait Codec: Send + Sync {
    fn compress(&self, params: &CompressionParams, input: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Decompress `compressed`, which must expand to exactly `expected_size` bytes.
    fn decompress(
        &self,
        params: &CompressionParams,
        compressed: &[u8],
        expected_size: usize,
    ) -> Result<Vec<u8>, CodecError>;
}
