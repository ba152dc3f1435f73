use std::path::PathBuf;

use thiserror::Error;

use crate::codec::CodecError;

#[derive(Debug, Error)]
pub enum TunerError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Inference is mandatory but no model was found in {0:?}")]
    ModelRequired(Option<PathBuf>),

    #[error("Malformed model: {0}")]
    ModelFormat(String),

    /// One candidate failed; the session recovers by discarding it.
    #[error("Codec trial failed for {params}: {reason}")]
    CodecTrial { params: String, reason: String },

    #[error("No viable configuration for chunk {0}")]
    NoViableConfiguration(usize),

    #[error("Session is closed")]
    SessionClosed,

    #[error("Chunk {0} did not decompress to its original bytes")]
    RoundTrip(usize),

    #[error("Chunk not found: {0}")]
    ChunkNotFound(usize),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, TunerError>;
