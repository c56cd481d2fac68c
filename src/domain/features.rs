//! Feature engineering: deviation, trend and composite-risk features.
//!
//! Every feature is a deterministic function of a `PatientRecord` and the fixed
//! population-normal constants below.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::patient::PatientRecord;
use crate::RecoveryError;

pub const NORMAL_TEMP: f64 = 98.6;
pub const NORMAL_HR: f64 = 75.0;
pub const NORMAL_SBP: f64 = 120.0;
pub const NORMAL_SPO2: f64 = 98.0;

/// Sleep below this many hours counts as deficit.
pub const SAFE_SLEEP_HOURS: f64 = 6.0;

/// Composite risk index weights, in order: temperature, heart rate, hypoxia,
/// blood pressure, fatigue, sleep deficit, swelling, non-adherence.
pub const COMPOSITE_WEIGHTS: [f64; 8] = [0.20, 0.15, 0.20, 0.10, 0.15, 0.10, 0.05, 0.05];

// Normalisation scales for deviations.
const TEMP_SCALE: f64 = 4.0;
const HR_SCALE: f64 = 50.0;
const SPO2_COMPOSITE_SCALE: f64 = 15.0;
const SPO2_INSTABILITY_CAP: f64 = 20.0;
const SBP_SCALE: f64 = 60.0;
const FATIGUE_SCALE: f64 = 10.0;
const SLEEP_DEFICIT_SCALE: f64 = 6.0;
const TREND_SCALE: f64 = 9.0;

/// Model input columns. Feature vectors are always assembled in this order.
pub const FEATURE_NAMES: [&str; 27] = [
    // Raw vitals
    "pain_level",
    "temperature",
    "heart_rate",
    "sbp",
    "spo2",
    "sleep_hours",
    "fatigue",
    "appetite",
    "mobility_score",
    "swelling",
    "medication_adherence",
    "days_since_discharge",
    "age",
    "bmi",
    "comorbidity_count",
    "prognosis_enc",
    // Deviations
    "temp_dev",
    "hr_dev",
    "sbp_dev",
    "spo2_dev",
    "sleep_deficit",
    // Trends
    "pain_change_rate",
    "mobility_decline",
    // Composites
    "recovery_phase",
    "composite_risk_index",
    "vitals_instability_score",
    "age_comorbidity_burden",
];

pub const N_FEATURES: usize = FEATURE_NAMES.len();

/// Recovery phase bucket by days since discharge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryPhase {
    /// Days 1-7
    Early = 1,
    /// Days 8-21
    Mid = 2,
    /// Days 22-31
    Late = 3,
}

impl RecoveryPhase {
    /// Bucket a day count. Day 0 and anything past 31 has no phase.
    #[must_use]
    pub fn from_days(days: u32) -> Option<Self> {
        match days {
            1..=7 => Some(Self::Early),
            8..=21 => Some(Self::Mid),
            22..=31 => Some(Self::Late),
            _ => None,
        }
    }

    #[must_use]
    pub fn ordinal(self) -> f64 {
        f64::from(self as u8)
    }
}

/// Derived features for one patient.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineeredFeatures {
    pub temp_dev: f64,
    pub hr_dev: f64,
    pub sbp_dev: f64,
    /// Negative when hypoxic
    pub spo2_dev: f64,
    pub sleep_deficit: f64,
    /// Positive when pain is worsening
    pub pain_change_rate: f64,
    /// Positive when mobility is declining
    pub mobility_decline: f64,
    pub recovery_phase: RecoveryPhase,
    pub composite_risk_index: f64,
    pub vitals_instability_score: f64,
    pub age_comorbidity_burden: f64,
}

impl EngineeredFeatures {
    /// Derived values in the trailing order of `FEATURE_NAMES`.
    #[must_use]
    pub fn to_array(&self) -> [f64; 11] {
        [
            self.temp_dev,
            self.hr_dev,
            self.sbp_dev,
            self.spo2_dev,
            self.sleep_deficit,
            self.pain_change_rate,
            self.mobility_decline,
            self.recovery_phase.ordinal(),
            self.composite_risk_index,
            self.vitals_instability_score,
            self.age_comorbidity_burden,
        ]
    }
}

/// Derive the engineered features of a record.
///
/// # Errors
/// Returns `RecoveryError::Validation` when days since discharge falls outside
/// the phase buckets.
pub fn engineer(record: &PatientRecord) -> Result<EngineeredFeatures, RecoveryError> {
    let recovery_phase = RecoveryPhase::from_days(record.days_since_discharge).ok_or_else(|| {
        RecoveryError::Validation(format!(
            "days_since_discharge {} outside the supported range 1-31",
            record.days_since_discharge
        ))
    })?;

    let temp_dev = record.temperature - NORMAL_TEMP;
    let hr_dev = record.heart_rate - NORMAL_HR;
    let sbp_dev = record.sbp - NORMAL_SBP;
    let spo2_dev = record.spo2 - NORMAL_SPO2;
    let sleep_deficit = (SAFE_SLEEP_HOURS - record.sleep_hours).max(0.0);
    let pain_change_rate = record.pain_level - record.prev_pain_level;
    let mobility_decline = record.prev_mobility_score - record.mobility_score;

    let w = COMPOSITE_WEIGHTS;
    let composite_risk_index = temp_dev.max(0.0) / TEMP_SCALE * w[0]
        + hr_dev.max(0.0) / HR_SCALE * w[1]
        + (-spo2_dev).max(0.0) / SPO2_COMPOSITE_SCALE * w[2]
        + sbp_dev.max(0.0) / SBP_SCALE * w[3]
        + record.fatigue / FATIGUE_SCALE * w[4]
        + sleep_deficit / SLEEP_DEFICIT_SCALE * w[5]
        + f64::from(u8::from(record.swelling)) * w[6]
        + f64::from(u8::from(!record.medication_adherence)) * w[7];

    let vitals_instability_score = temp_dev.abs() / TEMP_SCALE
        + hr_dev.abs() / HR_SCALE
        + spo2_dev.abs().min(SPO2_INSTABILITY_CAP) / SPO2_INSTABILITY_CAP
        + sbp_dev.abs() / SBP_SCALE
        + sleep_deficit / SLEEP_DEFICIT_SCALE
        + pain_change_rate.max(0.0) / TREND_SCALE
        + mobility_decline.max(0.0) / TREND_SCALE;

    let age_comorbidity_burden = (record.age / 100.0) * (f64::from(record.comorbidity_count) / 5.0);

    Ok(EngineeredFeatures {
        temp_dev,
        hr_dev,
        sbp_dev,
        spo2_dev,
        sleep_deficit,
        pain_change_rate,
        mobility_decline,
        recovery_phase,
        composite_risk_index,
        vitals_instability_score,
        age_comorbidity_burden,
    })
}

/// Assemble the full model input row in `FEATURE_NAMES` order.
#[must_use]
pub fn feature_row(record: &PatientRecord, features: &EngineeredFeatures) -> Vec<f64> {
    let mut row = Vec::with_capacity(N_FEATURES);
    row.extend_from_slice(&record.raw_features());
    row.extend_from_slice(&features.to_array());
    row
}

/// Content fingerprint of an ordered feature list (SHA-256, hex).
#[must_use]
pub fn fingerprint_of<S: AsRef<str>>(names: &[S]) -> String {
    let mut hasher = Sha256::new();
    for name in names {
        hasher.update(name.as_ref().as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

/// Fingerprint of the feature ordering compiled into this build.
#[must_use]
pub fn feature_fingerprint() -> String {
    fingerprint_of(&FEATURE_NAMES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::patient::fixtures::*;

    #[test]
    fn test_composite_weights_sum_to_one() {
        let sum: f64 = COMPOSITE_WEIGHTS.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_engineer_is_pure() {
        let p = deteriorating_cancer_patient();
        let a = engineer(&p).expect("valid");
        let b = engineer(&p).expect("valid");
        let (ra, rb) = (feature_row(&p, &a), feature_row(&p, &b));
        assert_eq!(ra.len(), N_FEATURES);
        for (x, y) in ra.iter().zip(&rb) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    #[test]
    fn test_deviation_signs() {
        let p = deteriorating_cancer_patient();
        let f = engineer(&p).expect("valid");
        assert!((f.temp_dev - 3.2).abs() < 1e-9);
        assert!((f.spo2_dev + 10.0).abs() < 1e-9);
        assert!((f.sleep_deficit - 3.5).abs() < 1e-9);
        assert!((f.pain_change_rate - 3.0).abs() < 1e-9);
        assert!((f.mobility_decline - 2.0).abs() < 1e-9);
        assert_eq!(f.recovery_phase, RecoveryPhase::Early);
        assert!((f.age_comorbidity_burden - 0.64 * 0.8).abs() < 1e-9);

        // Hand-computed composite: .16 + .117 + .1333 + 0 + .15 + .0583 + .05 + .05
        assert!((f.composite_risk_index - 0.718_666_667).abs() < 1e-6);
    }

    #[test]
    fn test_hyperoxia_does_not_raise_composite() {
        let mut p = stable_hip_patient();
        p.spo2 = 98.0;
        let base = engineer(&p).expect("valid").composite_risk_index;
        p.spo2 = 100.0;
        let high = engineer(&p).expect("valid");
        assert!((high.composite_risk_index - base).abs() < 1e-12);
        assert!(high.vitals_instability_score > 0.0);
    }

    #[test]
    fn test_recovery_phase_buckets() {
        assert_eq!(RecoveryPhase::from_days(0), None);
        assert_eq!(RecoveryPhase::from_days(1), Some(RecoveryPhase::Early));
        assert_eq!(RecoveryPhase::from_days(7), Some(RecoveryPhase::Early));
        assert_eq!(RecoveryPhase::from_days(8), Some(RecoveryPhase::Mid));
        assert_eq!(RecoveryPhase::from_days(21), Some(RecoveryPhase::Mid));
        assert_eq!(RecoveryPhase::from_days(22), Some(RecoveryPhase::Late));
        assert_eq!(RecoveryPhase::from_days(31), Some(RecoveryPhase::Late));
        assert_eq!(RecoveryPhase::from_days(32), None);

        let mut p = stable_hip_patient();
        p.days_since_discharge = 0;
        assert!(matches!(engineer(&p), Err(RecoveryError::Validation(_))));
    }

    #[test]
    fn test_fingerprint_tracks_order() {
        let mut names: Vec<&str> = FEATURE_NAMES.to_vec();
        assert_eq!(fingerprint_of(&names), feature_fingerprint());
        names.swap(0, 1);
        assert_ne!(fingerprint_of(&names), feature_fingerprint());
        assert_eq!(feature_fingerprint().len(), 64);
    }
}
