//! Risk assessment result types.
//!
//! Represents the output of the deterioration-risk ensemble and its
//! zone-based interpretation for surgical callers.

use serde::{Deserialize, Serialize};

use super::patient::PatientRecord;

/// Probability at or above which a patient is labelled High Risk.
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Binary risk label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLabel {
    #[serde(rename = "LOW RISK")]
    Low,
    #[serde(rename = "HIGH RISK")]
    High,
}

impl RiskLabel {
    #[must_use]
    pub fn from_probability(probability: f64) -> Self {
        if probability >= DECISION_THRESHOLD {
            Self::High
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW RISK"),
            Self::High => write!(f, "HIGH RISK"),
        }
    }
}

/// Single-patient prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Ensemble probability rounded to 4 decimals
    pub risk_probability: f64,
    pub risk_label: RiskLabel,
    /// Percentage string, e.g. "73.4%"
    pub risk_score_pct: String,
    pub disease: String,
    pub prognosis_class: String,
    /// Explanatory annotations; not model inputs
    pub risk_flags: Vec<String>,
}

impl RiskAssessment {
    #[must_use]
    pub fn new(probability: f64, record: &PatientRecord) -> Self {
        let flags = risk_flags(record);
        Self {
            risk_probability: (probability * 10_000.0).round() / 10_000.0,
            risk_label: RiskLabel::from_probability(probability),
            risk_score_pct: format!("{:.1}%", probability * 100.0),
            disease: record.disease.clone(),
            prognosis_class: record.prognosis.as_str().to_string(),
            risk_flags: if flags.is_empty() {
                vec!["No major flags".to_string()]
            } else {
                flags
            },
        }
    }
}

/// Human-readable flags recomputed from raw thresholds at inference time.
#[must_use]
pub fn risk_flags(record: &PatientRecord) -> Vec<String> {
    let mut flags = Vec::new();
    if record.temperature > 100.4 {
        flags.push(format!("Fever {}°F", record.temperature));
    }
    if record.heart_rate > 100.0 {
        flags.push(format!("Tachycardia {} bpm", record.heart_rate));
    }
    if record.spo2 < 92.0 {
        flags.push(format!("Hypoxia SpO2={}%", record.spo2));
    }
    if record.sbp < 90.0 {
        flags.push(format!("Hypotension SBP={}", record.sbp));
    }
    if record.sleep_hours < 4.0 {
        flags.push(format!("Sleep deprivation {}h", record.sleep_hours));
    }
    if record.swelling {
        flags.push("Swelling present".to_string());
    }
    if !record.medication_adherence {
        flags.push("Non-adherent".to_string());
    }
    if record.fatigue >= 8.0 {
        flags.push(format!("High fatigue {}/10", record.fatigue));
    }
    flags
}

/// Coarse zone for surgical risk interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskZone {
    Low,
    Medium,
    High,
}

impl RiskZone {
    #[must_use]
    pub fn from_percentage(percentage: u8) -> Self {
        if percentage >= 70 {
            Self::High
        } else if percentage >= 40 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Fixed advisory message for the zone.
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Self::Low => "Low risk. Patient is on track for a safe pre/post-operation baseline.",
            Self::Medium => {
                "Moderate risk. Ensure patient adheres to recovery protocols and hydration."
            }
            Self::High => {
                "High risk of post-operative complications detected. Strict monitoring required."
            }
        }
    }
}

impl std::fmt::Display for RiskZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
        }
    }
}

/// Zone-based interpretation of a risk probability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskInterpretation {
    /// Truncated percentage, 0-100
    pub risk_percentage: u8,
    pub zone: RiskZone,
    pub message: String,
}

impl RiskInterpretation {
    #[must_use]
    pub fn from_probability(probability: f64) -> Self {
        let risk_percentage = (probability.clamp(0.0, 1.0) * 100.0).trunc() as u8;
        let zone = RiskZone::from_percentage(risk_percentage);
        Self {
            risk_percentage,
            zone,
            message: zone.message().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::patient::fixtures::*;

    #[test]
    fn test_label_threshold() {
        assert_eq!(RiskLabel::from_probability(0.5), RiskLabel::High);
        assert_eq!(RiskLabel::from_probability(0.4999), RiskLabel::Low);
        assert_eq!(RiskLabel::High.to_string(), "HIGH RISK");
    }

    #[test]
    fn test_flags_for_deteriorating_patient() {
        let flags = risk_flags(&deteriorating_cancer_patient());
        assert_eq!(
            flags,
            vec![
                "Fever 101.8°F",
                "Tachycardia 114 bpm",
                "Hypoxia SpO2=88%",
                "Sleep deprivation 2.5h",
                "Swelling present",
                "Non-adherent",
                "High fatigue 10/10",
            ]
        );
    }

    #[test]
    fn test_assessment_without_flags() {
        let a = RiskAssessment::new(0.123_456, &stable_hip_patient());
        assert_eq!(a.risk_flags, vec!["No major flags"]);
        assert!((a.risk_probability - 0.1235).abs() < 1e-12);
        assert_eq!(a.risk_score_pct, "12.3%");
        assert_eq!(a.risk_label, RiskLabel::Low);
        assert_eq!(a.prognosis_class, "recoverable");
    }

    #[test]
    fn test_zone_interpretation() {
        let low = RiskInterpretation::from_probability(0.399);
        assert_eq!((low.risk_percentage, low.zone), (39, RiskZone::Low));
        let mid = RiskInterpretation::from_probability(0.4);
        assert_eq!(mid.zone, RiskZone::Medium);
        let high = RiskInterpretation::from_probability(0.99);
        assert_eq!((high.risk_percentage, high.zone), (99, RiskZone::High));
        assert!(high.message.starts_with("High risk"));
    }
}
