use crate::core::categorizer::categorize;
use crate::core::metadata::ModelMetadata;
use crate::core::recommendation::RecommendationEngine;
use crate::core::scorer::{label_for, LoadedModel, DEFAULT_THRESHOLD};
use crate::core::vectorizer::FeatureVectorizer;
use crate::domain::model::{
    AttributionResult, Category, ClinicalAssessment, ClinicalObservation, FeatureVector,
    RecommendationSet, RiskAssessment,
};
use crate::utils::error::Result;
use std::sync::Arc;

/// The operations external collaborators call. Holds a shared handle to the
/// loaded model; clones share it.
#[derive(Debug, Clone)]
pub struct RiskService {
    model: Arc<LoadedModel>,
    vectorizer: FeatureVectorizer,
    recommender: RecommendationEngine,
    threshold: f64,
}

impl RiskService {
    pub fn new(model: Arc<LoadedModel>) -> Self {
        Self::with_threshold(model, DEFAULT_THRESHOLD)
    }

    pub fn with_threshold(model: Arc<LoadedModel>, threshold: f64) -> Self {
        Self {
            model,
            vectorizer: FeatureVectorizer::new(),
            recommender: RecommendationEngine::new(),
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn model(&self) -> &Arc<LoadedModel> {
        &self.model
    }

    pub fn model_version(&self) -> &str {
        self.model.model_version()
    }

    pub fn metadata(&self) -> Option<&ModelMetadata> {
        self.model.metadata()
    }

    pub fn explainer_available(&self) -> bool {
        self.model.explainer().is_available()
    }

    pub fn predict(&self, observation: &ClinicalObservation) -> Result<RiskAssessment> {
        let x = self.vectorizer.vectorize(observation)?;
        self.score(&x)
    }

    /// Empty when the explainer is unavailable.
    pub fn explain(&self, observation: &ClinicalObservation) -> Result<AttributionResult> {
        let x = self.vectorizer.vectorize(observation)?;
        Ok(self.model.explainer().explain(&x))
    }

    pub fn recommend(
        &self,
        observation: &ClinicalObservation,
        category: Category,
    ) -> Result<RecommendationSet> {
        // same domain checks as predict, so a refused observation never gets advice
        self.vectorizer.vectorize(observation)?;
        Ok(self.recommender.recommend(observation, category))
    }

    /// Vectorizes once and runs every computation against that vector.
    pub fn assess(&self, observation: &ClinicalObservation) -> Result<ClinicalAssessment> {
        let x = self.vectorizer.vectorize(observation)?;
        let risk = self.score(&x)?;
        Ok(ClinicalAssessment {
            risk,
            attribution: self.model.explainer().explain(&x),
            recommendations: self.recommender.recommend(observation, risk.category),
            model_version: self.model_version().to_string(),
        })
    }

    fn score(&self, x: &FeatureVector) -> Result<RiskAssessment> {
        let probability = self.model.scorer().predict_proba(x)?;
        Ok(RiskAssessment {
            probability,
            label: label_for(probability, self.threshold),
            category: categorize(probability),
            threshold: self.threshold,
        })
    }
}
