use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// An uncompressed unit of data, shared read-only between concurrent trials.
#[derive(Debug, Clone)]
pub struct Chunk {
    data: Arc<[u8]>,
    typesize: usize,
}

impl Chunk {
    pub fn new(data: &[u8], typesize: usize) -> Self {
        Self {
            data: Arc::from(data),
            typesize,
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Cheap handle to the same bytes, for moving into a worker thread.
    pub fn share(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn typesize(&self) -> usize {
        self.typesize
    }
}

/// Cheap statistics of a chunk, used as inference model input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChunkFeatures {
    pub nbytes: usize,
    pub typesize: usize,
    /// Shannon entropy of the byte histogram, in bits per byte (0..=8).
    pub entropy: f64,
    /// Fraction of bytes equal to zero.
    pub zero_fraction: f64,
    /// Fraction of bytes equal to the byte one element earlier.
    pub repeat_fraction: f64,
}

impl ChunkFeatures {
    pub fn extract(chunk: &Chunk) -> Self {
        let data = chunk.as_bytes();
        let typesize = chunk.typesize().max(1);

        if data.is_empty() {
            return Self {
                nbytes: 0,
                typesize,
                entropy: 0.0,
                zero_fraction: 0.0,
                repeat_fraction: 0.0,
            };
        }

        let mut counts = [0u64; 256];
        for &byte in data {
            counts[byte as usize] += 1;
        }

        let len = data.len() as f64;
        let entropy = counts
            .iter()
            .filter(|&&c| c > 0)
            .map(|&c| {
                let p = c as f64 / len;
                -p * p.log2()
            })
            .sum::<f64>();

        let repeats = if data.len() > typesize {
            data.iter()
                .zip(&data[typesize..])
                .filter(|(a, b)| a == b)
                .count()
        } else {
            0
        };

        Self {
            nbytes: data.len(),
            typesize,
            entropy,
            zero_fraction: counts[0] as f64 / len,
            repeat_fraction: repeats as f64 / len,
        }
    }

    /// Distance between two feature vectors, each axis scaled to roughly [0, 1].
    pub fn distance(&self, other: &Self) -> f64 {
        let size_a = (self.nbytes.max(1) as f64).log2() / 32.0;
        let size_b = (other.nbytes.max(1) as f64).log2() / 32.0;
        let type_penalty = if self.typesize == other.typesize {
            0.0
        } else {
            0.25
        };

        let d_entropy = (self.entropy - other.entropy) / 8.0;
        let d_zero = self.zero_fraction - other.zero_fraction;
        let d_repeat = self.repeat_fraction - other.repeat_fraction;
        let d_size = size_a - size_b;

        (d_entropy * d_entropy + d_zero * d_zero + d_repeat * d_repeat + d_size * d_size).sqrt()
            + type_penalty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_features_of_constant_chunk() {
        let chunk = Chunk::new(&[0u8; 1024], 4);
        let features = ChunkFeatures::extract(&chunk);

        assert_eq!(features.nbytes, 1024);
        assert_eq!(features.entropy, 0.0);
        assert_eq!(features.zero_fraction, 1.0);
        assert!(features.repeat_fraction > 0.99);
    }

    #[test]
    fn test_features_of_uniform_bytes() {
        let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let chunk = Chunk::new(&data, 1);
        let features = ChunkFeatures::extract(&chunk);

        assert!((features.entropy - 8.0).abs() < 1e-9);
        assert_eq!(features.repeat_fraction, 0.0);
    }

    #[test]
    fn test_features_of_empty_chunk() {
        let chunk = Chunk::new(&[], 8);
        let features = ChunkFeatures::extract(&chunk);
        assert_eq!(features.nbytes, 0);
        assert_eq!(features.entropy, 0.0);
    }

    #[test]
    fn test_distance_is_zero_for_self() {
        let data: Vec<u8> = (0..2048u32).map(|i| (i % 7) as u8).collect();
        let features = ChunkFeatures::extract(&Chunk::new(&data, 2));
        assert_eq!(features.distance(&features), 0.0);
    }
}
