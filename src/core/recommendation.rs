//! Clinical-path advisories. This table is the only copy of the rules.

use crate::domain::model::{
    Advisory, AdvisoryCode, Category, ClinicalObservation, Level, RecommendationSet,
};

pub const OBESITY_BMI: f64 = 30.0;
/// Strictly above this mean arterial pressure counts as hypertensive.
pub const HYPERTENSION_MAP: f64 = 105.0;

pub struct FactorRule {
    pub code: AdvisoryCode,
    pub applies: fn(&ClinicalObservation) -> bool,
    pub text: &'static str,
}

const HIGH_PROTOCOL: [Advisory; 2] = [
    Advisory {
        code: AdvisoryCode::HighRiskProtocol,
        text: "⚠️ **PROTOKOL RISIKO TINGGI**: Rujuk segera ke Spesialis Jantung (Cardiologist).",
    },
    Advisory {
        code: AdvisoryCode::HighRiskWorkup,
        text: "Lakukan EKG 12-lead dan Panel Lipid Lengkap.",
    },
];

const MODERATE_PROTOCOL: [Advisory; 2] = [
    Advisory {
        code: AdvisoryCode::ModerateRiskProtocol,
        text: "⚠️ **PROTOKOL RISIKO SEDANG**: Jadwalkan kontrol ulang dalam 3 bulan.",
    },
    Advisory {
        code: AdvisoryCode::ModerateRiskLifestyle,
        text: "Evaluasi gaya hidup ketat dan pertimbangkan terapi statin jika kolesterol tinggi.",
    },
];

const LOW_PROTOCOL: [Advisory; 2] = [
    Advisory {
        code: AdvisoryCode::LowRiskProtocol,
        text: "✅ **PROTOKOL RISIKO RENDAH**: Edukasi gaya hidup sehat (diet & olahraga).",
    },
    Advisory {
        code: AdvisoryCode::LowRiskRoutineControl,
        text: "Kontrol rutin tahunan.",
    },
];

/// Evaluated in this order; each rule contributes at most one advisory.
pub const FACTOR_RULES: [FactorRule; 5] = [
    FactorRule {
        code: AdvisoryCode::SmokingCessation,
        applies: |o| o.smoke,
        text: "🚭 **STOP MEROKOK**: Program berhenti merokok wajib. (Sumber: WHO Tobacco Free Initiative)",
    },
    FactorRule {
        code: AdvisoryCode::WeightManagement,
        applies: |o| o.bmi >= OBESITY_BMI,
        text: "⚖️ **MANAJEMEN BERAT BADAN**: Rujuk ke Ahli Gizi. Target penurunan BB 5-10%. (Sumber: WHO BMI)",
    },
    FactorRule {
        code: AdvisoryCode::HypertensionMonitoring,
        applies: |o| o.map > HYPERTENSION_MAP,
        text: "🩺 **HIPERTENSI**: Monitoring tekanan darah harian. Pertimbangkan ACE-Inhibitor/ARB. (Sumber: JNC 8)",
    },
    FactorRule {
        code: AdvisoryCode::LipidDiet,
        applies: |o| o.cholesterol >= Level::WellAboveNormal,
        text: "🍔 **KOLESTEROL**: Diet rendah lemak jenuh. Cek ulang profil lipid 1 bulan. (Sumber: ESC/EAS)",
    },
    FactorRule {
        code: AdvisoryCode::DiabetesScreening,
        applies: |o| o.glucose >= Level::WellAboveNormal,
        text: "🍬 **DIABETES**: Cek HbA1c. Konsul Endokrin jika perlu. (Sumber: ADA Standards)",
    },
];

pub fn protocol_for(category: Category) -> &'static [Advisory; 2] {
    match category {
        Category::High => &HIGH_PROTOCOL,
        Category::Moderate => &MODERATE_PROTOCOL,
        Category::Low => &LOW_PROTOCOL,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecommendationEngine;

impl RecommendationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Protocol block first, then factor advisories in rule order.
    pub fn recommend(&self, observation: &ClinicalObservation, category: Category) -> RecommendationSet {
        let mut items: Vec<Advisory> = protocol_for(category).to_vec();
        items.extend(
            FACTOR_RULES
                .iter()
                .filter(|rule| (rule.applies)(observation))
                .map(|rule| Advisory {
                    code: rule.code,
                    text: rule.text,
                }),
        );
        RecommendationSet { items }
    }
}
