pub mod categorizer;
pub mod ensemble;
pub mod explainer;
pub mod metadata;
pub mod recommendation;
pub mod scorer;
pub mod service;
pub mod vectorizer;

pub use crate::domain::model::{
    AttributionResult, Category, ClinicalAssessment, ClinicalObservation, FeatureVector, Record,
    RecommendationSet, RiskAssessment,
};
pub use crate::domain::ports::{ArtifactSource, ConfigProvider, Pipeline, Storage};
pub use crate::utils::error::Result;
