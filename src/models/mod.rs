pub mod chunk;
pub mod params;
pub mod trial;

pub use chunk::{Chunk, ChunkFeatures};
pub use params::{CodecId, CompressionParams, FilterId, ParamSeed, Pinned};
pub use trial::TrialResult;
