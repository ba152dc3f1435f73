use tracing::{info, warn};

use crate::config::{InferenceLevel, Tradeoff, TunerConfig};
use crate::error::{Result, TunerError};
use crate::inference::model::Model;
use crate::models::{ChunkFeatures, CompressionParams};
use crate::tuner::space::ParameterSpace;

/// How often the model was asked and how often its advice won.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdvisorStats {
    pub predictions: usize,
    pub accepted: usize,
}

/// Owns the optional pretrained model for the lifetime of a session.
#[derive(Debug)]
pub struct InferenceAdvisor {
    level: InferenceLevel,
    model: Option<Model>,
    top_k: usize,
    stats: AdvisorStats,
}

impl InferenceAdvisor {
    /// An advisor that never predicts.
    pub fn disabled() -> Self {
        Self {
            level: InferenceLevel::Off,
            model: None,
            top_k: 0,
            stats: AdvisorStats::default(),
        }
    }

    /// Acquire the model the config asks for.
    ///
    /// Mandatory inference without a usable model fails; advisory inference
    /// falls back to heuristic search.
    pub fn load(config: &TunerConfig) -> Result<Self> {
        let level = config.use_inference;
        if level == InferenceLevel::Off {
            return Ok(Self::disabled());
        }

        let loaded = match &config.models_dir {
            Some(dir) => Model::load(dir),
            None => Ok(None),
        };

        let model = match (level, loaded) {
            (_, Ok(Some(model))) => {
                info!(entries = model.entries.len(), "inference model loaded");
                Some(model)
            }
            (InferenceLevel::Mandatory, Ok(None)) => {
                return Err(TunerError::ModelRequired(config.models_dir.clone()));
            }
            (InferenceLevel::Mandatory, Err(e)) => return Err(e),
            (_, Ok(None)) => {
                info!("no inference model found, using heuristic search");
                None
            }
            (_, Err(e)) => {
                warn!(error = %e, "ignoring unusable inference model");
                None
            }
        };

        Ok(Self {
            level,
            model,
            top_k: config.inference_top_k,
            stats: AdvisorStats::default(),
        })
    }

    /// Wrap an already loaded model.
    pub fn with_model(level: InferenceLevel, model: Model, top_k: usize) -> Self {
        Self {
            level,
            model: Some(model),
            top_k,
            stats: AdvisorStats::default(),
        }
    }

    pub fn level(&self) -> InferenceLevel {
        self.level
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Up to `top_k` valid suggestions for a chunk, best first.
    ///
    /// Pinned fields of the space's seed are carried through unchanged, and
    /// suggestions that are invalid in `space` are dropped.
    pub fn predict(
        &mut self,
        features: &ChunkFeatures,
        tradeoff: &Tradeoff,
        space: &ParameterSpace,
    ) -> Option<Vec<CompressionParams>> {
        let ranked = self.model.as_ref()?.query(features, tradeoff)?;

        let mut out: Vec<CompressionParams> = Vec::with_capacity(self.top_k);
        for p in ranked {
            if out.len() == self.top_k {
                break;
            }
            if let Some(valid) = space.sanitize(p) {
                if !out.contains(&valid) {
                    out.push(valid);
                }
            }
        }

        if out.is_empty() {
            return None;
        }
        self.stats.predictions += 1;
        Some(out)
    }

    /// Record whether a prediction ended up as the session's best.
    pub fn record_outcome(&mut self, accepted: bool) {
        if accepted {
            self.stats.accepted += 1;
        }
    }

    pub fn stats(&self) -> AdvisorStats {
        self.stats
    }

    /// Drop the model; later predictions return `None`.
    pub fn release(&mut self) {
        self.model = None;
    }
}
