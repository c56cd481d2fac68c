//! Patient record types for deterioration risk prediction.
//!
//! A record is row-like: created once by the cohort generator (or assembled from a
//! prediction request) and never mutated afterwards.

use serde::{Deserialize, Serialize};

use super::disease::Prognosis;

/// One synthetic or real patient instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    /// Disease key (free-form for query records)
    pub disease: String,

    /// Body-system tag of the disease
    pub system: String,

    pub prognosis: Prognosis,

    /// Days since discharge (1-30 in generated cohorts)
    pub days_since_discharge: u32,

    /// Pain on a 1-10 scale
    pub pain_level: f64,

    /// Body temperature in °F
    pub temperature: f64,

    /// Heart rate in bpm
    pub heart_rate: f64,

    /// Systolic blood pressure in mmHg
    pub sbp: f64,

    /// Oxygen saturation in %
    pub spo2: f64,

    pub sleep_hours: f64,

    /// Fatigue on a 1-10 scale
    pub fatigue: f64,

    /// Appetite on a 1-10 scale
    pub appetite: f64,

    /// Mobility on a 1-10 scale (higher is better)
    pub mobility_score: f64,

    pub swelling: bool,

    /// Whether the patient takes medication as prescribed
    pub medication_adherence: bool,

    pub age: f64,
    pub bmi: f64,
    pub comorbidity_count: u32,

    /// Previous-cycle pain, for trend features
    pub prev_pain_level: f64,

    /// Previous-cycle mobility, for trend features
    pub prev_mobility_score: f64,

    /// Generation-time latent state. Never presented to a model.
    #[serde(skip)]
    pub(crate) latent_sick: bool,
}

impl PatientRecord {
    /// Ordinal prognosis feature.
    #[must_use]
    pub fn prognosis_enc(&self) -> f64 {
        f64::from(self.prognosis.code())
    }

    /// Whether this record was drawn from the sick distribution.
    #[must_use]
    pub fn is_latent_sick(&self) -> bool {
        self.latent_sick
    }

    /// Raw model inputs, in the leading order of `FEATURE_NAMES`.
    #[must_use]
    pub fn raw_features(&self) -> [f64; 16] {
        [
            self.pain_level,
            self.temperature,
            self.heart_rate,
            self.sbp,
            self.spo2,
            self.sleep_hours,
            self.fatigue,
            self.appetite,
            self.mobility_score,
            f64::from(u8::from(self.swelling)),
            f64::from(u8::from(self.medication_adherence)),
            f64::from(self.days_since_discharge),
            self.age,
            self.bmi,
            f64::from(self.comorbidity_count),
            self.prognosis_enc(),
        ]
    }

    /// Validate that the record lies inside the documented input domain.
    ///
    /// # Errors
    /// Returns validation errors as a vector of strings.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !(1..=31).contains(&self.days_since_discharge) {
            errors.push(format!(
                "days_since_discharge {} out of range [1, 31]",
                self.days_since_discharge
            ));
        }

        let checks = [
            ("pain_level", self.pain_level, 0.0, 10.0),
            ("temperature", self.temperature, 85.0, 115.0),
            ("heart_rate", self.heart_rate, 20.0, 250.0),
            ("sbp", self.sbp, 40.0, 260.0),
            ("spo2", self.spo2, 40.0, 100.0),
            ("sleep_hours", self.sleep_hours, 0.0, 24.0),
            ("fatigue", self.fatigue, 0.0, 10.0),
            ("appetite", self.appetite, 0.0, 10.0),
            ("mobility_score", self.mobility_score, 0.0, 10.0),
            ("age", self.age, 0.0, 120.0),
            ("bmi", self.bmi, 10.0, 80.0),
            ("prev_pain_level", self.prev_pain_level, 0.0, 10.0),
            ("prev_mobility_score", self.prev_mobility_score, 0.0, 10.0),
        ];
        for (name, value, lo, hi) in checks {
            if !value.is_finite() || !(lo..=hi).contains(&value) {
                errors.push(format!("{name} {value} out of range [{lo}, {hi}]"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A stable post-op patient two weeks after hip replacement.
    pub fn stable_hip_patient() -> PatientRecord {
        PatientRecord {
            disease: "hip_knee_replacement".into(),
            system: "orthopedic".into(),
            prognosis: Prognosis::Recoverable,
            days_since_discharge: 14,
            pain_level: 3.0,
            temperature: 98.4,
            heart_rate: 72.0,
            sbp: 126.0,
            spo2: 97.0,
            sleep_hours: 7.5,
            fatigue: 3.0,
            appetite: 8.0,
            mobility_score: 7.0,
            swelling: false,
            medication_adherence: true,
            age: 66.0,
            bmi: 29.0,
            comorbidity_count: 1,
            prev_pain_level: 4.0,
            prev_mobility_score: 6.0,
            latent_sick: false,
        }
    }

    /// A deteriorating metastatic cancer patient.
    pub fn deteriorating_cancer_patient() -> PatientRecord {
        PatientRecord {
            disease: "metastatic_cancer".into(),
            system: "oncology".into(),
            prognosis: Prognosis::NonRecoverable,
            days_since_discharge: 5,
            pain_level: 9.0,
            temperature: 101.8,
            heart_rate: 114.0,
            sbp: 98.0,
            spo2: 88.0,
            sleep_hours: 2.5,
            fatigue: 10.0,
            appetite: 1.0,
            mobility_score: 1.0,
            swelling: true,
            medication_adherence: false,
            age: 64.0,
            bmi: 22.0,
            comorbidity_count: 4,
            prev_pain_level: 6.0,
            prev_mobility_score: 3.0,
            latent_sick: true,
        }
    }
}
