//! Complete blood count panel types for anemia severity classification.
//!
//! Severity bands follow WHO hemoglobin thresholds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::RecoveryError;

/// Fields every anemia request must carry, in check order.
pub const REQUIRED_FIELDS: [&str; 8] = [
    "Gender",
    "Age",
    "RBC",
    "Hemoglobin",
    "Hematocrit",
    "MCV",
    "MCH",
    "MCHC",
];

/// Model input columns.
pub const ANEMIA_FEATURE_NAMES: [&str; 8] = [
    "Gender_enc",
    "Age",
    "RBC",
    "Hemoglobin",
    "Hematocrit",
    "MCV",
    "MCH",
    "MCHC",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Female,
    Male,
}

impl Gender {
    /// Alphabetical encoding: Female = 0, Male = 1.
    #[must_use]
    pub fn code(self) -> f64 {
        match self {
            Self::Female => 0.0,
            Self::Male => 1.0,
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Female" => Some(Self::Female),
            "Male" => Some(Self::Male),
            _ => None,
        }
    }
}

/// Anemia severity classes, in alphabetical (model class index) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Mild,
    Moderate,
    #[serde(rename = "Non-Anemic")]
    NonAnemic,
    Severe,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Self::Mild, Self::Moderate, Self::NonAnemic, Self::Severe];

    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Mild => "Mild",
            Self::Moderate => "Moderate",
            Self::NonAnemic => "Non-Anemic",
            Self::Severe => "Severe",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One CBC panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CbcPanel {
    pub gender: Gender,
    pub age: f64,
    /// Red cell count, M/µL
    pub rbc: f64,
    /// g/dL
    pub hemoglobin: f64,
    /// %
    pub hematocrit: f64,
    /// fL
    pub mcv: f64,
    /// pg
    pub mch: f64,
    /// g/dL
    pub mchc: f64,
}

impl CbcPanel {
    /// Convert to a model input row (order: `ANEMIA_FEATURE_NAMES`).
    #[must_use]
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.gender.code(),
            self.age,
            self.rbc,
            self.hemoglobin,
            self.hematocrit,
            self.mcv,
            self.mch,
            self.mchc,
        ]
    }

    /// Build a panel from a JSON request object.
    ///
    /// # Errors
    /// Returns `MissingField` naming the first absent required field, or
    /// `Validation` when a field has the wrong type.
    pub fn from_json(value: &Value) -> Result<Self, RecoveryError> {
        let obj = value
            .as_object()
            .ok_or_else(|| RecoveryError::Validation("request body must be a JSON object".into()))?;

        if let Some(missing) = REQUIRED_FIELDS.iter().find(|f| !obj.contains_key(**f)) {
            return Err(RecoveryError::MissingField((*missing).to_string()));
        }

        let gender_raw = obj["Gender"]
            .as_str()
            .ok_or_else(|| RecoveryError::Validation("Gender must be a string".into()))?;
        let gender = Gender::parse(gender_raw)
            .ok_or_else(|| RecoveryError::Validation(format!("Unknown Gender: {gender_raw}")))?;

        let number = |key: &str| -> Result<f64, RecoveryError> {
            match &obj[key] {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }
            .ok_or_else(|| RecoveryError::Validation(format!("{key} must be numeric")))
        };

        Ok(Self {
            gender,
            age: number("Age")?,
            rbc: number("RBC")?,
            hemoglobin: number("Hemoglobin")?,
            hematocrit: number("Hematocrit")?,
            mcv: number("MCV")?,
            mch: number("MCH")?,
            mchc: number("MCHC")?,
        })
    }
}

/// Anemia prediction returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnemiaDiagnosis {
    pub diagnosis: Severity,
    /// Probability of any anemia, percent, within [0, 99.9]
    pub risk_score: f64,
    /// Class name -> percentage (2 decimals)
    pub probabilities: BTreeMap<String, f64>,
}

impl AnemiaDiagnosis {
    /// Build from per-class probabilities indexed like `Severity::ALL`.
    #[must_use]
    pub fn from_probabilities(probs: &[f64]) -> Self {
        let round2 = |x: f64| (x * 100.0).round() / 100.0;

        let diagnosis = probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .and_then(|(i, _)| Severity::from_index(i))
            .unwrap_or(Severity::NonAnemic);

        let probabilities = Severity::ALL
            .iter()
            .zip(probs)
            .map(|(s, p)| (s.name().to_string(), round2(p * 100.0)))
            .collect();

        let p_normal = probs.get(Severity::NonAnemic.index()).copied().unwrap_or(0.0);
        let risk_score = round2((1.0 - p_normal) * 100.0).clamp(0.0, 99.9);

        Self {
            diagnosis,
            risk_score,
            probabilities,
        }
    }
}
