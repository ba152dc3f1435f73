use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::Tradeoff;
use crate::error::{Result, TunerError};
use crate::models::{ChunkFeatures, CompressionParams};

/// File name looked up inside the models directory.
pub const MODEL_FILE: &str = "model.json";

pub const MODEL_VERSION: u32 = 1;

/// Params that worked well for one kind of chunk under one tradeoff, best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub features: ChunkFeatures,
    pub tradeoff: Tradeoff,
    pub ranked: Vec<CompressionParams>,
}

/// A nearest-neighbour table from chunk features to ranked params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub version: u32,
    pub entries: Vec<ModelEntry>,
}

fn tradeoff_distance(a: &Tradeoff, b: &Tradeoff) -> f64 {
    (a.ratio_weight() - b.ratio_weight()).abs()
        + (a.speed_weight() - b.speed_weight()).abs()
        + (a.quality_weight() - b.quality_weight()).abs()
}

impl Model {
    pub fn new(entries: Vec<ModelEntry>) -> Self {
        Self {
            version: MODEL_VERSION,
            entries,
        }
    }

    /// Load `model.json` from `models_dir`.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub fn load<P: AsRef<Path>>(models_dir: P) -> Result<Option<Self>> {
        let path = models_dir.as_ref().join(MODEL_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut model: Model = serde_json::from_str(&content)?;
        if model.version != MODEL_VERSION {
            return Err(TunerError::ModelFormat(format!(
                "unsupported model version {} in {:?}",
                model.version, path
            )));
        }

        // Drop repeated suggestions, keeping the first occurrence
        for entry in &mut model.entries {
            let mut seen = Vec::with_capacity(entry.ranked.len());
            entry.ranked.retain(|p| {
                if seen.contains(p) {
                    false
                } else {
                    seen.push(*p);
                    true
                }
            });
        }
        model.entries.retain(|e| !e.ranked.is_empty());

        if model.entries.is_empty() {
            return Err(TunerError::ModelFormat(format!(
                "model {:?} has no usable entries",
                path
            )));
        }
        Ok(Some(model))
    }

    /// Write the model as `model.json` inside `models_dir`, creating the directory.
    pub fn save<P: AsRef<Path>>(&self, models_dir: P) -> Result<()> {
        fs::create_dir_all(models_dir.as_ref())?;
        let json = serde_json::to_string_pretty(self)?;
        fs::write(models_dir.as_ref().join(MODEL_FILE), json)?;
        Ok(())
    }

    /// Ranked params of the entry closest to `features` and `tradeoff`.
    pub fn query(&self, features: &ChunkFeatures, tradeoff: &Tradeoff) -> Option<&[CompressionParams]> {
        self.entries
            .iter()
            .map(|e| {
                let d = e.features.distance(features) + tradeoff_distance(&e.tradeoff, tradeoff);
                (d, e)
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, e)| e.ranked.as_slice())
    }
}
