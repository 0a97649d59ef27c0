use crate::domain::model::{
    ClinicalObservation, Feature, FeatureVector, Level, Record, Sex, FEATURE_COUNT,
};
use crate::utils::error::{Result, RiskError};
use serde_json::Value;

/// Raw readings accepted when `bmi` or `map` is absent.
pub const HEIGHT_KEY: &str = "height_cm";
pub const WEIGHT_KEY: &str = "weight_kg";
pub const SYSTOLIC_KEY: &str = "ap_hi";
pub const DIASTOLIC_KEY: &str = "ap_lo";

/// Inclusive bounds for the raw readings.
pub const HEIGHT_RANGE_CM: (f64, f64) = (100.0, 250.0);
pub const WEIGHT_RANGE_KG: (f64, f64) = (30.0, 200.0);
pub const SYSTOLIC_RANGE_MMHG: (f64, f64) = (90.0, 250.0);
pub const DIASTOLIC_RANGE_MMHG: (f64, f64) = (50.0, 150.0);

/// Maps observations onto the positional vector the ensemble expects.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureVectorizer;

impl FeatureVectorizer {
    pub fn new() -> Self {
        Self
    }

    pub fn vectorize(&self, observation: &ClinicalObservation) -> Result<FeatureVector> {
        check_positive(Feature::Bmi, observation.bmi)?;
        check_positive(Feature::Map, observation.map)?;

        let mut values = [0.0; FEATURE_COUNT];
        for feature in Feature::ALL {
            values[feature.index()] = match feature {
                Feature::Age => f64::from(observation.age_years),
                Feature::Sex => f64::from(observation.sex.code()),
                Feature::Bmi => observation.bmi,
                Feature::Map => observation.map,
                Feature::Cholesterol => f64::from(observation.cholesterol.code()),
                Feature::Glucose => f64::from(observation.glucose.code()),
                Feature::Smoke => flag(observation.smoke),
                Feature::Alcohol => flag(observation.alcohol),
                Feature::Active => flag(observation.active),
            };
        }
        Ok(FeatureVector(values))
    }

    /// Lookups are by key, so the record's iteration order never matters.
    pub fn vectorize_record(&self, record: &Record) -> Result<FeatureVector> {
        let observation = ClinicalObservation::try_from(record)?;
        self.vectorize(&observation)
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

fn check_positive(feature: Feature, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(RiskError::invalid_input(
            feature.key(),
            format!("must be a positive finite number, got {}", value),
        ));
    }
    Ok(())
}

fn field<'a>(record: &'a Record, feature: Feature) -> Result<&'a Value> {
    match record.get(feature.key()) {
        None | Some(Value::Null) => Err(RiskError::invalid_input(feature.key(), "field is missing")),
        Some(value) => Ok(value),
    }
}

fn present(record: &Record, key: &str) -> bool {
    !matches!(record.get(key), None | Some(Value::Null))
}

fn reading(record: &Record, key: &str, (min, max): (f64, f64)) -> Result<f64> {
    let value = match record.get(key) {
        None | Some(Value::Null) => return Err(RiskError::invalid_input(key, "field is missing")),
        Some(value) => value,
    };
    let reading = value
        .as_f64()
        .ok_or_else(|| RiskError::invalid_input(key, format!("expected a number, got {}", value)))?;
    if !(min..=max).contains(&reading) {
        return Err(RiskError::invalid_input(
            key,
            format!("must be between {} and {}, got {}", min, max, reading),
        ));
    }
    Ok(reading)
}

/// Reads `bmi` or `map`, deriving it from raw readings when it is absent.
///
/// A recorded value always wins. Otherwise:
///
/// - `bmi = weight_kg / (height_cm / 100)^2`
/// - `map = (2 * ap_lo + ap_hi) / 3`
///
/// Raw readings are range-checked and errors name the raw field. With neither
/// form present the error names the derived feature.
pub fn derive_measurement(record: &Record, feature: Feature) -> Result<f64> {
    if present(record, feature.key()) {
        return number(record, feature);
    }
    match feature {
        Feature::Bmi if present(record, HEIGHT_KEY) || present(record, WEIGHT_KEY) => {
            let height_m = reading(record, HEIGHT_KEY, HEIGHT_RANGE_CM)? / 100.0;
            let weight = reading(record, WEIGHT_KEY, WEIGHT_RANGE_KG)?;
            Ok(weight / (height_m * height_m))
        }
        Feature::Map if present(record, SYSTOLIC_KEY) || present(record, DIASTOLIC_KEY) => {
            let systolic = reading(record, SYSTOLIC_KEY, SYSTOLIC_RANGE_MMHG)?;
            let diastolic = reading(record, DIASTOLIC_KEY, DIASTOLIC_RANGE_MMHG)?;
            if diastolic >= systolic {
                return Err(RiskError::invalid_input(
                    DIASTOLIC_KEY,
                    format!(
                        "must be below {} ({}), got {}",
                        SYSTOLIC_KEY, systolic, diastolic
                    ),
                ));
            }
            Ok((2.0 * diastolic + systolic) / 3.0)
        }
        _ => number(record, feature),
    }
}

fn integer(record: &Record, feature: Feature) -> Result<i64> {
    let value = field(record, feature)?;
    if let Some(i) = value.as_i64() {
        return Ok(i);
    }
    match value.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 => Ok(f as i64),
        _ => Err(RiskError::invalid_input(
            feature.key(),
            format!("expected an integer, got {}", value),
        )),
    }
}

fn number(record: &Record, feature: Feature) -> Result<f64> {
    let value = field(record, feature)?;
    value.as_f64().ok_or_else(|| {
        RiskError::invalid_input(feature.key(), format!("expected a number, got {}", value))
    })
}

fn binary_flag(record: &Record, feature: Feature) -> Result<bool> {
    if let Some(b) = field(record, feature)?.as_bool() {
        return Ok(b);
    }
    match integer(record, feature)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RiskError::invalid_input(
            feature.key(),
            format!("expected 0 or 1, got {}", other),
        )),
    }
}

fn level(record: &Record, feature: Feature) -> Result<Level> {
    let code = integer(record, feature)?;
    Level::from_code(code).ok_or_else(|| {
        RiskError::invalid_input(feature.key(), format!("expected level 1-3, got {}", code))
    })
}

impl TryFrom<&Record> for ClinicalObservation {
    type Error = RiskError;

    fn try_from(record: &Record) -> Result<Self> {
        let age = integer(record, Feature::Age)?;
        let age_years = u32::try_from(age).map_err(|_| {
            RiskError::invalid_input(
                Feature::Age.key(),
                format!("expected a non-negative age, got {}", age),
            )
        })?;

        let sex_code = integer(record, Feature::Sex)?;
        let sex = Sex::from_code(sex_code).ok_or_else(|| {
            RiskError::invalid_input(
                Feature::Sex.key(),
                format!("expected 1 (female) or 2 (male), got {}", sex_code),
            )
        })?;

        let observation = ClinicalObservation {
            age_years,
            sex,
            bmi: derive_measurement(record, Feature::Bmi)?,
            map: derive_measurement(record, Feature::Map)?,
            cholesterol: level(record, Feature::Cholesterol)?,
            glucose: level(record, Feature::Glucose)?,
            smoke: binary_flag(record, Feature::Smoke)?,
            alcohol: binary_flag(record, Feature::Alcohol)?,
            active: binary_flag(record, Feature::Active)?,
        };
        check_positive(Feature::Bmi, observation.bmi)?;
        check_positive(Feature::Map, observation.map)?;
        Ok(observation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        serde_json::from_value::<std::collections::HashMap<String, Value>>(value)
            .unwrap()
            .into()
    }

    fn sample() -> serde_json::Value {
        json!({
            "age_years": 45, "gender": 2, "bmi": 28.5, "map": 110,
            "cholesterol": 2, "gluc": 1, "smoke": 0, "alco": 0, "active": 1
        })
    }

    #[test]
    fn test_vector_has_contractual_order() {
        let v = FeatureVectorizer::new().vectorize_record(&record(sample())).unwrap();
        assert_eq!(v.0, [45.0, 2.0, 28.5, 110.0, 2.0, 1.0, 0.0, 0.0, 1.0]);
        assert_eq!(v.get(Feature::Map), 110.0);
    }

    #[test]
    fn test_order_stable_under_key_permutation() {
        let forward = record(sample());
        let mut reversed = Record::default();
        let mut keys: Vec<_> = forward.data.keys().cloned().collect();
        keys.sort();
        keys.reverse();
        for k in keys {
            reversed.data.insert(k.clone(), forward.data[&k].clone());
        }
        let vectorizer = FeatureVectorizer::new();
        assert_eq!(
            vectorizer.vectorize_record(&forward).unwrap(),
            vectorizer.vectorize_record(&reversed).unwrap()
        );
    }

    #[test]
    fn test_extra_keys_are_ignored() {
        let mut value = sample();
        value["notes"] = json!("follow-up");
        value["checked_by_user_id"] = json!(7);
        assert!(FeatureVectorizer::new().vectorize_record(&record(value)).is_ok());
    }

    #[test]
    fn test_missing_field_is_named() {
        let mut value = sample();
        value.as_object_mut().unwrap().remove("gluc");
        let err = FeatureVectorizer::new().vectorize_record(&record(value)).unwrap_err();
        match err {
            RiskError::InvalidInput { field, .. } => assert_eq!(field, "gluc"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_out_of_domain_values_are_rejected() {
        let cases = [
            ("gender", json!(3)),
            ("cholesterol", json!(4)),
            ("smoke", json!(2)),
            ("age_years", json!(28.5)),
            ("age_years", json!(-1)),
            ("bmi", json!(0.0)),
            ("map", json!("high")),
        ];
        for (key, bad) in cases {
            let mut value = sample();
            value[key] = bad;
            let err = FeatureVectorizer::new()
                .vectorize_record(&record(value))
                .unwrap_err();
            assert!(
                matches!(&err, RiskError::InvalidInput { field, .. } if field == key),
                "{key}: {err:?}"
            );
        }
    }

    #[test]
    fn test_accepts_bool_flags_and_integral_floats() {
        let mut value = sample();
        value["smoke"] = json!(true);
        value["age_years"] = json!(45.0);
        let observation = ClinicalObservation::try_from(&record(value)).unwrap();
        assert!(observation.smoke);
        assert_eq!(observation.age_years, 45);
    }

    #[test]
    fn test_typed_observation_with_bad_bmi_fails() {
        let mut observation = ClinicalObservation::try_from(&record(sample())).unwrap();
        observation.bmi = f64::NAN;
        assert!(FeatureVectorizer::new().vectorize(&observation).is_err());
    }

    fn raw_sample() -> serde_json::Value {
        let mut value = sample();
        let object = value.as_object_mut().unwrap();
        object.remove("bmi");
        object.remove("map");
        object.insert("height_cm".into(), json!(170));
        object.insert("weight_kg".into(), json!(70.0));
        object.insert("ap_hi".into(), json!(120));
        object.insert("ap_lo".into(), json!(80));
        value
    }

    fn failing_field(value: serde_json::Value) -> String {
        match ClinicalObservation::try_from(&record(value)).unwrap_err() {
            RiskError::InvalidInput { field, .. } => field,
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_bmi_and_map_derived_from_raw_readings() {
        let observation = ClinicalObservation::try_from(&record(raw_sample())).unwrap();
        // 70 / 1.7^2
        assert!((observation.bmi - 24.221_453_287_197_23).abs() < 1e-9);
        // (2 * 80 + 120) / 3
        assert!((observation.map - 93.333_333_333_333_33).abs() < 1e-9);
    }

    #[test]
    fn test_recorded_value_wins_over_raw_readings() {
        let mut value = raw_sample();
        value["bmi"] = json!(31.0);
        value["map"] = json!(104);
        let observation = ClinicalObservation::try_from(&record(value)).unwrap();
        assert_eq!(observation.bmi, 31.0);
        assert_eq!(observation.map, 104.0);
    }

    #[test]
    fn test_raw_reading_errors_name_the_raw_field() {
        let cases = [
            ("height_cm", json!(90)),
            ("height_cm", json!(251)),
            ("weight_kg", json!(29.9)),
            ("ap_hi", json!(260)),
            ("ap_lo", json!(45)),
            ("ap_lo", json!("80")),
        ];
        for (key, bad) in cases {
            let mut value = raw_sample();
            value[key] = bad;
            assert_eq!(failing_field(value), key);
        }
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let mut value = raw_sample();
        value["height_cm"] = json!(100);
        value["weight_kg"] = json!(200);
        value["ap_hi"] = json!(250);
        value["ap_lo"] = json!(150);
        let observation = ClinicalObservation::try_from(&record(value)).unwrap();
        assert_eq!(observation.bmi, 200.0);
        assert!((observation.map - 550.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_raw_readings_name_the_missing_one() {
        let mut value = raw_sample();
        value.as_object_mut().unwrap().remove("weight_kg");
        assert_eq!(failing_field(value), "weight_kg");

        let mut value = raw_sample();
        value.as_object_mut().unwrap().remove("ap_hi");
        assert_eq!(failing_field(value), "ap_hi");
    }

    #[test]
    fn test_diastolic_must_be_below_systolic() {
        let mut value = raw_sample();
        value["ap_hi"] = json!(100);
        value["ap_lo"] = json!(100);
        assert_eq!(failing_field(value), "ap_lo");
    }

    #[test]
    fn test_neither_form_names_the_feature() {
        let mut value = raw_sample();
        let object = value.as_object_mut().unwrap();
        object.remove("height_cm");
        object.remove("weight_kg");
        assert_eq!(failing_field(value), "bmi");
    }
}
