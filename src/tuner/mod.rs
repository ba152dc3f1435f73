pub mod controller;
pub mod monitor;
pub mod output;
pub mod scoring;
pub mod session;
pub mod space;

pub use controller::{Delivery, Phase, SearchController, SearchState, TrialRecord, TrialRunner};
pub use monitor::{PerformanceMonitor, Trial};
pub use output::{print_summary, write_best_json, write_trial_csv};
pub use scoring::{Scored, TradeoffScorer};
pub use session::{CompressedChunk, SessionStats, TunerSession};
pub use space::{ParameterSpace, Scope};
