pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::AppConfig;

pub use adapters::{FileArtifactSource, InMemoryArtifactSource, LocalStorage};
pub use app::{AssessmentEngine, BatchPipeline};
pub use core::scorer::{LoadedModel, ModelRegistry};
pub use core::service::RiskService;
pub use utils::error::{Result, RiskError};
