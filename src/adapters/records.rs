//! Observation input parsing and assessment report rendering.

use crate::domain::model::{ClinicalAssessment, ClinicalObservation, InputFormat, Record};
use crate::utils::error::{Result, RiskError};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

pub const RECORD_ID_KEY: &str = "record_id";

pub fn parse_observations(bytes: &[u8], format: InputFormat) -> Result<Vec<Record>> {
    match format {
        InputFormat::Csv => parse_csv(bytes),
        InputFormat::Json => parse_json(bytes),
    }
}

fn parse_csv(bytes: &[u8]) -> Result<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(bytes);
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let data = headers
            .iter()
            .zip(row.iter())
            .filter(|(_, cell)| !cell.is_empty())
            .map(|(header, cell)| (header.to_string(), cell_value(header, cell)))
            .collect();
        records.push(Record { data });
    }
    Ok(records)
}

/// Numeric-looking cells become JSON numbers; the id column stays text.
fn cell_value(header: &str, cell: &str) -> Value {
    if header == RECORD_ID_KEY {
        return Value::String(cell.to_string());
    }
    if let Ok(i) = cell.parse::<i64>() {
        return Value::from(i);
    }
    match cell.parse::<f64>() {
        Ok(f) if f.is_finite() => Value::from(f),
        _ => Value::String(cell.to_string()),
    }
}

fn parse_json(bytes: &[u8]) -> Result<Vec<Record>> {
    let value: Value = serde_json::from_slice(bytes)?;
    let items = match value {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        other => {
            return Err(RiskError::ProcessingError {
                message: format!("expected an array of observations, got {}", kind(&other)),
            })
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Ok(Record {
                data: map.into_iter().collect::<HashMap<_, _>>(),
            }),
            other => Err(RiskError::ProcessingError {
                message: format!("observation {} is {}, not an object", i + 1, kind(&other)),
            }),
        })
        .collect()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// `record_id` column when present, else the 1-based row number.
pub fn record_id(record: &Record, row: usize) -> String {
    match record.get(RECORD_ID_KEY) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => row.to_string(),
    }
}

/// One persisted checkup row: the observation plus everything computed for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssessmentReport {
    pub record_id: String,
    pub age_years: u32,
    pub gender: u8,
    pub bmi: f64,
    pub map: f64,
    pub cholesterol: u8,
    pub gluc: u8,
    pub smoke: u8,
    pub alco: u8,
    pub active: u8,
    pub probability: f64,
    pub risk_label: u8,
    pub risk_category: String,
    pub model_version: String,
    pub recommendations: String,
    /// Attribution as a `{label: value}` JSON string; empty object when unavailable.
    pub shap_values: String,
}

impl AssessmentReport {
    pub fn new(
        record_id: String,
        observation: &ClinicalObservation,
        assessment: &ClinicalAssessment,
    ) -> Result<Self> {
        Ok(Self {
            record_id,
            age_years: observation.age_years,
            gender: observation.sex.code(),
            bmi: observation.bmi,
            map: observation.map,
            cholesterol: observation.cholesterol.code(),
            gluc: observation.glucose.code(),
            smoke: u8::from(observation.smoke),
            alco: u8::from(observation.alcohol),
            active: u8::from(observation.active),
            probability: assessment.risk.probability,
            risk_label: assessment.risk.label,
            risk_category: assessment.risk.category.localized_label().to_string(),
            model_version: assessment.model_version.clone(),
            recommendations: assessment.recommendations.to_text(),
            shap_values: serde_json::to_string(&assessment.attribution.to_label_json())?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRecord {
    pub record_id: String,
    pub field: Option<String>,
    pub reason: String,
}

pub fn render_json<T: Serialize>(items: &[T]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(items)?)
}

pub fn render_csv(reports: &[AssessmentReport]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for report in reports {
        writer.serialize(report)?;
    }
    writer.into_inner().map_err(|e| RiskError::ProcessingError {
        message: format!("failed to finish CSV output: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &[u8] = include_bytes!("../../tests/fixtures/observations.csv");

    #[test]
    fn test_parse_csv_types_cells() {
        let records = parse_observations(CSV, InputFormat::Csv).unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[0].get("age_years"), Some(&Value::from(45)));
        assert_eq!(records[0].get("bmi"), Some(&Value::from(28.5)));
        assert_eq!(records[0].get(RECORD_ID_KEY), Some(&Value::from("CHK-001")));
        // blank bmi cell is treated as missing
        assert!(records[4].get("bmi").is_none());
    }

    #[test]
    fn test_parse_json_array_and_rejects_scalars() {
        let records = parse_observations(
            include_bytes!("../../tests/fixtures/observations.json"),
            InputFormat::Json,
        )
        .unwrap();
        assert_eq!(records.len(), 2);
        assert!(parse_observations(b"[1, 2]", InputFormat::Json).is_err());
        assert!(parse_observations(b"42", InputFormat::Json).is_err());
    }

    #[test]
    fn test_record_id_falls_back_to_row() {
        let records = parse_observations(CSV, InputFormat::Csv).unwrap();
        assert_eq!(record_id(&records[1], 2), "CHK-002");
        assert_eq!(record_id(&Record::default(), 7), "7");
    }

    #[test]
    fn test_render_empty_csv_and_rejected_json() {
        let out = render_csv(&[]).unwrap();
        assert!(out.is_empty());
        let rejected = vec![RejectedRecord {
            record_id: "1".into(),
            field: Some("bmi".into()),
            reason: "missing".into(),
        }];
        let json = String::from_utf8(render_json(&rejected).unwrap()).unwrap();
        assert!(json.contains("\"field\": \"bmi\""));
    }
}
