// Application layer: batch assessment over the core service.

pub mod batch;
pub mod engine;

pub use batch::{BatchPipeline, BatchResult};
pub use engine::AssessmentEngine;
