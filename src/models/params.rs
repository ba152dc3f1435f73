use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

/// Codec applied to each block after filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CodecId {
    /// Raw copy, no entropy coding.
    Store,
    Lz4,
    Zstd,
}

impl CodecId {
    pub const ALL: [CodecId; 3] = [CodecId::Store, CodecId::Lz4, CodecId::Zstd];

    /// Compression levels this codec accepts.
    pub fn level_range(self) -> RangeInclusive<u8> {
        match self {
            CodecId::Store => 0..=0,
            CodecId::Lz4 => 1..=1,
            CodecId::Zstd => 1..=9,
        }
    }

    /// Clamp a level into this codec's range.
    pub fn clamp_level(self, level: u8) -> u8 {
        let range = self.level_range();
        level.clamp(*range.start(), *range.end())
    }

    pub fn name(self) -> &'static str {
        match self {
            CodecId::Store => "store",
            CodecId::Lz4 => "lz4",
            CodecId::Zstd => "zstd",
        }
    }

    /// Stable one-byte tag used in block frames.
    pub fn tag(self) -> u8 {
        match self {
            CodecId::Store => 0,
            CodecId::Lz4 => 1,
            CodecId::Zstd => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(CodecId::Store),
            1 => Some(CodecId::Lz4),
            2 => Some(CodecId::Zstd),
            _ => None,
        }
    }
}

/// Byte transform applied before the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FilterId {
    NoFilter,
    /// Byte shuffle by element width.
    Shuffle,
    /// Byte-wise delta against the previous element.
    Delta,
}

impl FilterId {
    pub const ALL: [FilterId; 3] = [FilterId::NoFilter, FilterId::Shuffle, FilterId::Delta];

    pub fn name(self) -> &'static str {
        match self {
            FilterId::NoFilter => "nofilter",
            FilterId::Shuffle => "shuffle",
            FilterId::Delta => "delta",
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            FilterId::NoFilter => 0,
            FilterId::Shuffle => 1,
            FilterId::Delta => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(FilterId::NoFilter),
            1 => Some(FilterId::Shuffle),
            2 => Some(FilterId::Delta),
            _ => None,
        }
    }
}

/// One point of the search space handed to the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompressionParams {
    pub codec: CodecId,
    pub filter: FilterId,
    pub level: u8,
    /// Bytes per independently compressed block.
    pub blocksize: usize,
    /// Element width in bytes.
    pub typesize: usize,
    pub nthreads: usize,
}

impl Default for CompressionParams {
    fn default() -> Self {
        Self {
            codec: CodecId::Lz4,
            filter: FilterId::Shuffle,
            level: 1,
            blocksize: 64 * 1024,
            typesize: 8,
            nthreads: 1,
        }
    }
}

impl CompressionParams {
    /// Format params as a compact string for display.
    pub fn display(&self) -> String {
        format!(
            "codec={} filter={} clevel={} blocksize={} typesize={} nthreads={}",
            self.codec.name(),
            self.filter.name(),
            self.level,
            self.blocksize,
            self.typesize,
            self.nthreads
        )
    }
}

/// Fields of the caller's starting params that search and inference must not touch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pinned {
    pub codec: bool,
    pub filter: bool,
    pub level: bool,
    pub blocksize: bool,
    pub nthreads: bool,
}

impl Pinned {
    /// Copy every pinned field of `seed` over `params`.
    ///
    /// Typesize always comes from the seed: it describes the data, not the codec.
    pub fn overlay(&self, seed: &CompressionParams, params: &CompressionParams) -> CompressionParams {
        let mut out = *params;
        out.typesize = seed.typesize;
        if self.codec {
            out.codec = seed.codec;
        }
        if self.filter {
            out.filter = seed.filter;
        }
        if self.level {
            out.level = seed.level;
        } else {
            out.level = out.codec.clamp_level(out.level);
        }
        if self.blocksize {
            out.blocksize = seed.blocksize;
        }
        if self.nthreads {
            out.nthreads = seed.nthreads;
        }
        out
    }
}

/// The caller's requested starting point for a session.
///
/// `params.nthreads` is the upper bound the tuner may use; the tuner can
/// lower it and reports the value it actually used per chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSeed {
    pub params: CompressionParams,
    #[serde(default)]
    pub pinned: Pinned,
}

impl ParamSeed {
    pub fn new(params: CompressionParams) -> Self {
        Self {
            params,
            pinned: Pinned::default(),
        }
    }

    pub fn with_pinned(mut self, pinned: Pinned) -> Self {
        self.pinned = pinned;
        self
    }
}
