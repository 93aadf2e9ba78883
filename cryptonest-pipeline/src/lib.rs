//! Cryptonest Pipeline: configuration and the stages behind each command.
//!
//! - TOML configuration with validated defaults
//! - Bounded per-provider fetch stage over the shared cache
//! - Universe build, dataset assembly and the live dashboard

pub mod config;
pub mod dashboard;
pub mod dataset_build;
pub mod error;
pub mod fetch;
pub mod progress;
pub mod run;
pub mod universe_build;

pub use config::{ConfigError, PipelineConfig};
pub use error::PipelineError;
pub use progress::{FetchProgress, NoProgress, TracingProgress};
