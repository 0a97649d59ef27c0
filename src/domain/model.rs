use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Untyped input row, as it arrives from a CSV line or a JSON object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Record {
    pub data: HashMap<String, serde_json::Value>,
}

impl Record {
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }
}

impl From<HashMap<String, serde_json::Value>> for Record {
    fn from(data: HashMap<String, serde_json::Value>) -> Self {
        Self { data }
    }
}

pub const FEATURE_COUNT: usize = 9;

/// Model inputs, in the positional order the ensemble was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    Age,
    Sex,
    Bmi,
    Map,
    Cholesterol,
    Glucose,
    Smoke,
    Alcohol,
    Active,
}

impl Feature {
    pub const ALL: [Feature; FEATURE_COUNT] = [
        Feature::Age,
        Feature::Sex,
        Feature::Bmi,
        Feature::Map,
        Feature::Cholesterol,
        Feature::Glucose,
        Feature::Smoke,
        Feature::Alcohol,
        Feature::Active,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Key used in input records and in the artifact's `feature_names`.
    pub fn key(self) -> &'static str {
        match self {
            Feature::Age => "age_years",
            Feature::Sex => "gender",
            Feature::Bmi => "bmi",
            Feature::Map => "map",
            Feature::Cholesterol => "cholesterol",
            Feature::Glucose => "gluc",
            Feature::Smoke => "smoke",
            Feature::Alcohol => "alco",
            Feature::Active => "active",
        }
    }

    /// Display label used in persisted attributions.
    pub fn label(self) -> &'static str {
        match self {
            Feature::Age => "Usia",
            Feature::Sex => "Gender",
            Feature::Bmi => "BMI",
            Feature::Map => "MAP",
            Feature::Cholesterol => "Kolesterol",
            Feature::Glucose => "Glukosa",
            Feature::Smoke => "Rokok",
            Feature::Alcohol => "Alkohol",
            Feature::Active => "Aktif",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    Female = 1,
    Male = 2,
}

impl Sex {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Sex::Female),
            2 => Some(Sex::Male),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Ordinal lab level shared by cholesterol and glucose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Level {
    Normal = 1,
    AboveNormal = 2,
    WellAboveNormal = 3,
}

impl Level {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Level::Normal),
            2 => Some(Level::AboveNormal),
            3 => Some(Level::WellAboveNormal),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClinicalObservation {
    pub age_years: u32,
    pub sex: Sex,
    pub bmi: f64,
    /// Mean arterial pressure, mmHg.
    pub map: f64,
    pub cholesterol: Level,
    pub glucose: Level,
    pub smoke: bool,
    pub alcohol: bool,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn get(&self, feature: Feature) -> f64 {
        self.0[feature.index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Low,
    Moderate,
    High,
}

impl Category {
    pub fn localized_label(self) -> &'static str {
        match self {
            Category::Low => "Rendah",
            Category::Moderate => "Sedang",
            Category::High => "Tinggi",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.localized_label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub probability: f64,
    pub label: u8,
    pub category: Category,
    pub threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub feature: Feature,
    pub contribution: f64,
}

/// Per-feature additive decomposition of the raw margin for one instance.
///
/// `contributions` is either empty (explainer unavailable) or holds all nine
/// features in [`Feature::ALL`] order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AttributionResult {
    pub baseline: f64,
    pub margin: f64,
    pub contributions: Vec<FeatureContribution>,
}

impl AttributionResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.contributions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.contributions.len()
    }

    pub fn get(&self, feature: Feature) -> Option<f64> {
        self.contributions
            .iter()
            .find(|c| c.feature == feature)
            .map(|c| c.contribution)
    }

    pub fn total(&self) -> f64 {
        self.contributions.iter().map(|c| c.contribution).sum()
    }

    /// `(label, value)` pairs in feature order.
    pub fn labeled(&self) -> Vec<(&'static str, f64)> {
        self.contributions
            .iter()
            .map(|c| (c.feature.label(), c.contribution))
            .collect()
    }

    /// Flat `{label: value}` object, the shape the storage layer persists.
    pub fn to_label_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .labeled()
            .into_iter()
            .map(|(label, value)| (label.to_string(), serde_json::json!(value)))
            .collect();
        serde_json::Value::Object(map)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdvisoryCode {
    HighRiskProtocol,
    HighRiskWorkup,
    ModerateRiskProtocol,
    ModerateRiskLifestyle,
    LowRiskProtocol,
    LowRiskRoutineControl,
    SmokingCessation,
    WeightManagement,
    HypertensionMonitoring,
    LipidDiet,
    DiabetesScreening,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Advisory {
    pub code: AdvisoryCode,
    pub text: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RecommendationSet {
    pub items: Vec<Advisory>,
}

impl RecommendationSet {
    pub fn contains(&self, code: AdvisoryCode) -> bool {
        self.items.iter().any(|a| a.code == code)
    }

    pub fn codes(&self) -> Vec<AdvisoryCode> {
        self.items.iter().map(|a| a.code).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_text(&self) -> String {
        self.items
            .iter()
            .map(|a| a.text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    Csv,
    Json,
}

impl InputFormat {
    /// Guess from a file extension.
    pub fn from_path(path: &str) -> Option<Self> {
        match std::path::Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("csv") => Some(InputFormat::Csv),
            Some("json") => Some(InputFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Csv,
}

/// What a batch does with a record the core refuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidRecordPolicy {
    #[default]
    Skip,
    Fail,
}

/// Everything the core computes for one observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClinicalAssessment {
    pub risk: RiskAssessment,
    pub attribution: AttributionResult,
    pub recommendations: RecommendationSet,
    pub model_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_order_is_positional() {
        for (i, feature) in Feature::ALL.iter().enumerate() {
            assert_eq!(feature.index(), i);
        }
        assert_eq!(Feature::ALL[3].key(), "map");
        assert_eq!(Feature::ALL[5].label(), "Glukosa");
    }

    #[test]
    fn test_codes_round_trip_through_enums() {
        assert_eq!(Sex::from_code(2), Some(Sex::Male));
        assert_eq!(Sex::from_code(0), None);
        assert_eq!(Level::from_code(3).map(Level::code), Some(3));
        assert_eq!(Level::from_code(4), None);
    }

    #[test]
    fn test_empty_attribution_serializes_to_empty_object() {
        let empty = AttributionResult::empty();
        assert!(empty.is_empty());
        assert_eq!(empty.to_label_json(), serde_json::json!({}));
    }

    #[test]
    fn test_recommendation_text_joins_with_newline() {
        let set = RecommendationSet {
            items: vec![
                Advisory {
                    code: AdvisoryCode::LowRiskProtocol,
                    text: "a",
                },
                Advisory {
                    code: AdvisoryCode::LowRiskRoutineControl,
                    text: "b",
                },
            ],
        };
        assert_eq!(set.to_text(), "a\nb");
        assert!(set.contains(AdvisoryCode::LowRiskProtocol));
        assert!(!set.contains(AdvisoryCode::SmokingCessation));
    }
}
