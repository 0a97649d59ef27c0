use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub const TRAINED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Side-file facts about the artifact. Reporting only, never read by inference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub trained_at: Option<String>,
    #[serde(default)]
    pub model_version: Option<String>,
    #[serde(default)]
    pub best_params: Option<serde_json::Value>,
}

impl ModelMetadata {
    pub fn from_json_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    pub fn trained_at(&self) -> Option<NaiveDateTime> {
        self.trained_at
            .as_deref()
            .and_then(|s| NaiveDateTime::parse_from_str(s, TRAINED_AT_FORMAT).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_metadata_side_file() {
        let meta = ModelMetadata::from_json_slice(include_bytes!(
            "../../tests/fixtures/model_metadata.json"
        ))
        .unwrap();
        assert_eq!(meta.model_version.as_deref(), Some("xgb_v1.0.0"));
        assert_eq!(meta.accuracy, Some(0.7315));
        let trained = meta.trained_at().unwrap();
        assert_eq!((trained.year(), trained.month(), trained.hour()), (2025, 11, 14));
    }

    #[test]
    fn test_unparseable_timestamp_is_none() {
        let meta = ModelMetadata {
            trained_at: Some("yesterday".into()),
            ..Default::default()
        };
        assert!(meta.trained_at().is_none());
    }
}
