//! Rule-based clinical risk scoring used to generate training labels.
//!
//! These thresholds drive label generation only. The explanatory flags attached
//! to predictions are computed independently in `domain::assessment`.

use super::features::EngineeredFeatures;
use super::patient::PatientRecord;

/// Adjusted score at or above which a record is High Risk.
pub const HIGH_RISK_THRESHOLD: f64 = 5.0;

/// Half-open adjusted-score band treated as diagnostically ambiguous.
pub const BORDERLINE_BAND: (f64, f64) = (3.5, 6.5);

/// Independent label-noise rates applied after thresholding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelNoise {
    /// Uniform flip rate (measurement/clerical error)
    pub measurement_flip: f64,
    /// Extra flip rate inside the borderline band
    pub borderline_flip: f64,
    /// Low-to-high rate for chronic and non-recoverable patients
    pub chronic_upgrade: f64,
}

impl Default for LabelNoise {
    fn default() -> Self {
        Self {
            measurement_flip: 0.03,
            borderline_flip: 0.08,
            chronic_upgrade: 0.05,
        }
    }
}

impl LabelNoise {
    /// No noise at all; labels equal the thresholded score.
    #[must_use]
    pub fn none() -> Self {
        Self {
            measurement_flip: 0.0,
            borderline_flip: 0.0,
            chronic_upgrade: 0.0,
        }
    }
}

/// Integer clinical risk score from weighted threshold indicators.
#[must_use]
pub fn clinical_risk_score(record: &PatientRecord, features: &EngineeredFeatures) -> u32 {
    let indicators = [
        (record.temperature > 100.4, 2),
        (record.heart_rate > 100.0, 1),
        (record.sbp < 90.0, 2),
        (record.spo2 < 92.0, 3),
        (features.pain_change_rate > 0.0, 1),
        (record.swelling, 1),
        (record.sleep_hours < 4.0, 2),
        (features.mobility_decline > 1.0, 1),
        (!record.medication_adherence && record.fatigue > 6.0, 1),
        (record.fatigue >= 8.0, 1),
        (features.composite_risk_index > 0.5, 2),
        (record.age > 75.0, 1),
        (record.comorbidity_count > 3, 1),
    ];
    indicators
        .iter()
        .filter(|(hit, _)| *hit)
        .map(|(_, weight)| weight)
        .sum()
}

/// Clinical score plus the prognosis-class bonus.
#[must_use]
pub fn adjusted_score(record: &PatientRecord, features: &EngineeredFeatures) -> f64 {
    f64::from(clinical_risk_score(record, features)) + record.prognosis.risk_bonus()
}

#[must_use]
pub fn is_borderline(adjusted: f64) -> bool {
    (BORDERLINE_BAND.0..BORDERLINE_BAND.1).contains(&adjusted)
}

/// Noise-free label: 1 for High Risk, 0 for Low Risk.
#[must_use]
pub fn threshold_label(adjusted: f64) -> u8 {
    u8::from(adjusted >= HIGH_RISK_THRESHOLD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::features::engineer;
    use crate::domain::patient::fixtures::*;
    use crate::domain::Prognosis;

    #[test]
    fn test_deteriorating_patient_scores_high() {
        let p = deteriorating_cancer_patient();
        let f = engineer(&p).expect("valid");
        // fever 2, tachy 1, hypoxia 3, pain 1, swelling 1, sleep 2, mobility 1,
        // non-adherent+fatigued 1, fatigue 1, composite 2, comorbidity 1
        assert_eq!(clinical_risk_score(&p, &f), 16);
        assert!((adjusted_score(&p, &f) - 17.5).abs() < 1e-12);
        assert_eq!(threshold_label(adjusted_score(&p, &f)), 1);
    }

    #[test]
    fn test_stable_patient_scores_low() {
        let p = stable_hip_patient();
        let f = engineer(&p).expect("valid");
        assert_eq!(clinical_risk_score(&p, &f), 0);
        assert_eq!(threshold_label(adjusted_score(&p, &f)), 0);
    }

    #[test]
    fn test_prognosis_bonus_crosses_threshold() {
        let mut p = stable_hip_patient();
        p.temperature = 101.0; // 2
        p.spo2 = 91.0; // 3 -> 5 before any bonus
        p.sleep_hours = 7.0;
        let f = engineer(&p).expect("valid");
        assert_eq!(clinical_risk_score(&p, &f), 5);

        p.temperature = 98.6; // drop to 3
        let f = engineer(&p).expect("valid");
        assert_eq!(clinical_risk_score(&p, &f), 3);
        assert_eq!(threshold_label(adjusted_score(&p, &f)), 0);
        p.prognosis = Prognosis::NonRecoverable;
        p.age = 80.0; // +1 -> 4 + 1.5
        let f = engineer(&p).expect("valid");
        assert_eq!(threshold_label(adjusted_score(&p, &f)), 1);
    }

    #[test]
    fn test_borderline_band_is_half_open() {
        assert!(!is_borderline(3.0));
        assert!(is_borderline(3.5));
        assert!(is_borderline(6.0));
        assert!(!is_borderline(6.5));
    }
}
