#[cfg(test)]
#[macro_use]
extern crate assert_float_eq;

pub mod cli;
pub mod codec;
pub mod config;
pub mod container;
pub mod error;
pub mod inference;
pub mod models;
pub mod tuner;

pub use config::TunerConfig;
pub use error::{Result, TunerError};
pub use models::{CompressionParams, ParamSeed};
pub use tuner::TunerSession;
