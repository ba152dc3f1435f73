pub mod advisor;
pub mod model;

pub use advisor::{AdvisorStats, InferenceAdvisor};
pub use model::{Model, ModelEntry, MODEL_FILE};
