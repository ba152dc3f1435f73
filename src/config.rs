use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TunerError};

/// Maximum number of tradeoff weights: ratio, speed, quality.
pub const MAX_TRADEOFF_NELEMS: usize = 3;

/// What happens once the search has hard-stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    /// Keep the best params for the rest of the session.
    #[default]
    None,
    /// Re-run the whole search, codec and filter included.
    All,
    /// Re-run only the fine-grained search around the current codec and filter.
    Current,
}

/// Which timings feed the speed term of the score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PerfMode {
    /// Compression plus decompression time.
    #[default]
    Balanced,
    #[serde(alias = "decomp")]
    Decompression,
    #[serde(alias = "comp")]
    Compression,
}

impl PerfMode {
    /// Whether each trial must also decompress.
    pub fn needs_decompression(self) -> bool {
        match self {
            PerfMode::Balanced | PerfMode::Decompression => true,
            PerfMode::Compression => false,
        }
    }
}

/// How much the tuner relies on a pretrained model (0, 1 or 2 on the wire).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum InferenceLevel {
    #[default]
    Off,
    /// Use the model when present, otherwise search heuristically.
    Advisory,
    /// Refuse to start without a model.
    Mandatory,
}

impl TryFrom<u8> for InferenceLevel {
    type Error = TunerError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(InferenceLevel::Off),
            1 => Ok(InferenceLevel::Advisory),
            2 => Ok(InferenceLevel::Mandatory),
            other => Err(TunerError::Config(format!(
                "use_inference must be 0, 1 or 2, got {}",
                other
            ))),
        }
    }
}

impl From<InferenceLevel> for u8 {
    fn from(level: InferenceLevel) -> Self {
        match level {
            InferenceLevel::Off => 0,
            InferenceLevel::Advisory => 1,
            InferenceLevel::Mandatory => 2,
        }
    }
}

/// Caller-owned tradeoff weights, in the order [ratio, speed, quality].
///
/// A single weight `w` means ratio weight `w` and speed weight `1 - w`.
/// Weights are used as given and never normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Tradeoff {
    weights: Vec<f64>,
}

impl Tradeoff {
    pub fn new(weights: &[f64]) -> Result<Self> {
        if weights.is_empty() || weights.len() > MAX_TRADEOFF_NELEMS {
            return Err(TunerError::Config(format!(
                "tradeoff needs 1 to {} weights, got {}",
                MAX_TRADEOFF_NELEMS,
                weights.len()
            )));
        }
        if let Some(bad) = weights
            .iter()
            .find(|w| !w.is_finite() || !(0.0..=1.0).contains(*w))
        {
            return Err(TunerError::Config(format!(
                "tradeoff weights must lie in [0, 1], got {}",
                bad
            )));
        }
        Ok(Self {
            weights: weights.to_vec(),
        })
    }

    /// Single-weight tradeoff between ratio and speed.
    pub fn ratio_speed(ratio_weight: f64) -> Result<Self> {
        Self::new(&[ratio_weight])
    }

    pub fn nelems(&self) -> usize {
        self.weights.len()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.weights
    }

    pub fn ratio_weight(&self) -> f64 {
        self.weights[0]
    }

    pub fn speed_weight(&self) -> f64 {
        match self.weights.get(1) {
            Some(&w) => w,
            None => 1.0 - self.weights[0],
        }
    }

    /// Only meaningful for lossy codecs; zero unless three weights are given.
    pub fn quality_weight(&self) -> f64 {
        self.weights.get(2).copied().unwrap_or(0.0)
    }
}

impl Default for Tradeoff {
    fn default() -> Self {
        Self { weights: vec![0.5] }
    }
}

impl TryFrom<Vec<f64>> for Tradeoff {
    type Error = TunerError;

    fn try_from(weights: Vec<f64>) -> Result<Self> {
        Self::new(&weights)
    }
}

impl From<Tradeoff> for Vec<f64> {
    fn from(tradeoff: Tradeoff) -> Self {
        tradeoff.weights
    }
}

/// When to stop searching and whether to start again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Behaviour {
    /// Consecutive non-improving explore chunks before the search hard-stops.
    pub nhards_before_stop: usize,
    pub repeat_mode: RepeatMode,
    /// Extra exploit-only chunks after a hard stop before a repeat begins.
    pub repeat_interval: usize,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            nhards_before_stop: 10,
            repeat_mode: RepeatMode::None,
            repeat_interval: 0,
        }
    }
}

/// Everything the caller sets before a session starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    pub tradeoff: Tradeoff,
    pub behaviour: Behaviour,
    pub use_inference: InferenceLevel,
    pub models_dir: Option<PathBuf>,
    pub perf_mode: PerfMode,
    /// Candidates trialed per explore chunk.
    pub search_breadth: usize,
    /// Scores closer than this are ties, settled by threads then level.
    pub tie_epsilon: f64,
    pub trial_timeout_ms: u64,
    /// Run the candidates of one explore step on concurrent threads.
    pub parallel_trials: bool,
    /// Seed for candidate sampling.
    pub seed: u64,
    /// Number of model suggestions trialed when the model is consulted.
    pub inference_top_k: usize,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            tradeoff: Tradeoff::default(),
            behaviour: Behaviour::default(),
            use_inference: InferenceLevel::Off,
            models_dir: None,
            perf_mode: PerfMode::Balanced,
            search_breadth: 3,
            tie_epsilon: 0.01,
            trial_timeout_ms: 10_000,
            parallel_trials: false,
            seed: 123,
            inference_top_k: 3,
        }
    }
}

impl TunerConfig {
    /// Load a config from a JSON file; missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: TunerConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the fields the type system cannot.
    pub fn validate(&self) -> Result<()> {
        if self.search_breadth == 0 {
            return Err(TunerError::Config(
                "search_breadth must be at least 1".to_string(),
            ));
        }
        if !self.tie_epsilon.is_finite() || self.tie_epsilon < 0.0 {
            return Err(TunerError::Config(format!(
                "tie_epsilon must be a non-negative number, got {}",
                self.tie_epsilon
            )));
        }
        if self.trial_timeout_ms == 0 {
            return Err(TunerError::Config(
                "trial_timeout_ms must be positive".to_string(),
            ));
        }
        if self.inference_top_k == 0 {
            return Err(TunerError::Config(
                "inference_top_k must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn trial_timeout(&self) -> Duration {
        Duration::from_millis(self.trial_timeout_ms)
    }
}
