//! Prediction service: score a single patient against a loaded bundle.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::ensemble::EnsembleBundle;
use crate::adapters::StoreError;
use crate::domain::{disease, engineer, feature_row, PatientRecord, Prognosis, RiskAssessment};
use crate::ports::{BundleStore, ProbabilisticClassifier};
use crate::RecoveryError;

/// Binary clinical flag as sent by callers: `true`/`false` or `1`/`0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Number(f64),
}

impl Flag {
    #[must_use]
    pub fn is_set(self) -> bool {
        match self {
            Self::Bool(b) => b,
            Self::Number(n) => n != 0.0,
        }
    }
}

/// A possibly partial patient as received from a caller.
///
/// Every absent field takes a clinically neutral default, so a pre-operative
/// caller can send only what it knows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientInput {
    pub disease: Option<String>,
    pub prognosis_class: Option<String>,
    pub prognosis_enc: Option<u8>,
    pub days_since_discharge: Option<u32>,
    pub pain_level: Option<f64>,
    pub temperature: Option<f64>,
    pub heart_rate: Option<f64>,
    pub sbp: Option<f64>,
    pub spo2: Option<f64>,
    pub sleep_hours: Option<f64>,
    pub fatigue: Option<f64>,
    pub appetite: Option<f64>,
    pub mobility_score: Option<f64>,
    pub swelling: Option<Flag>,
    pub medication_adherence: Option<Flag>,
    pub age: Option<f64>,
    pub bmi: Option<f64>,
    pub comorbidity_count: Option<u32>,
    pub prev_pain_level: Option<f64>,
    pub prev_mobility_score: Option<f64>,
}

impl PatientInput {
    /// Complete the input with defaults.
    ///
    /// # Errors
    /// Returns `Validation` for an unknown prognosis or a value outside the
    /// accepted input domain.
    pub fn into_record(self) -> Result<PatientRecord, RecoveryError> {
        let prognosis = match (&self.prognosis_class, self.prognosis_enc) {
            (Some(name), _) => Prognosis::parse(name)
                .ok_or_else(|| RecoveryError::Validation(format!("Unknown prognosis_class: {name}")))?,
            (None, Some(code)) => Prognosis::from_code(code)
                .ok_or_else(|| RecoveryError::Validation(format!("Unknown prognosis_enc: {code}")))?,
            (None, None) => Prognosis::Recoverable,
        };
        let disease_name = self.disease.unwrap_or_else(|| "general_surgery".to_string());
        let system = disease(&disease_name).map_or("general", |p| p.system).to_string();

        let record = PatientRecord {
            disease: disease_name,
            system,
            prognosis,
            days_since_discharge: self.days_since_discharge.unwrap_or(1),
            pain_level: self.pain_level.unwrap_or(4.0),
            temperature: self.temperature.unwrap_or(98.6),
            heart_rate: self.heart_rate.unwrap_or(75.0),
            sbp: self.sbp.unwrap_or(120.0),
            spo2: self.spo2.unwrap_or(98.0),
            sleep_hours: self.sleep_hours.unwrap_or(7.0),
            fatigue: self.fatigue.unwrap_or(3.0),
            appetite: self.appetite.unwrap_or(5.0),
            mobility_score: self.mobility_score.unwrap_or(6.0),
            swelling: self.swelling.is_some_and(Flag::is_set),
            medication_adherence: self.medication_adherence.map_or(true, Flag::is_set),
            age: self.age.unwrap_or(65.0),
            bmi: self.bmi.unwrap_or(28.0),
            comorbidity_count: self.comorbidity_count.unwrap_or(0),
            prev_pain_level: self.prev_pain_level.unwrap_or(5.0),
            prev_mobility_score: self.prev_mobility_score.unwrap_or(5.0),
            latent_sick: false,
        };
        record
            .validate()
            .map_err(|errors| RecoveryError::Validation(errors.join("; ")))?;
        Ok(record)
    }
}

impl From<&PatientRecord> for PatientInput {
    fn from(r: &PatientRecord) -> Self {
        Self {
            disease: Some(r.disease.clone()),
            prognosis_class: Some(r.prognosis.as_str().to_string()),
            prognosis_enc: None,
            days_since_discharge: Some(r.days_since_discharge),
            pain_level: Some(r.pain_level),
            temperature: Some(r.temperature),
            heart_rate: Some(r.heart_rate),
            sbp: Some(r.sbp),
            spo2: Some(r.spo2),
            sleep_hours: Some(r.sleep_hours),
            fatigue: Some(r.fatigue),
            appetite: Some(r.appetite),
            mobility_score: Some(r.mobility_score),
            swelling: Some(Flag::Bool(r.swelling)),
            medication_adherence: Some(Flag::Bool(r.medication_adherence)),
            age: Some(r.age),
            bmi: Some(r.bmi),
            comorbidity_count: Some(r.comorbidity_count),
            prev_pain_level: Some(r.prev_pain_level),
            prev_mobility_score: Some(r.prev_mobility_score),
        }
    }
}

/// Stateless scorer over a shared, immutable bundle.
///
/// Cloning is cheap; clones share the bundle and may predict concurrently.
#[derive(Debug, Clone)]
pub struct RiskPredictor {
    bundle: Arc<EnsembleBundle>,
}

impl RiskPredictor {
    /// # Errors
    /// Returns `SchemaMismatch` if the bundle was fitted on a different
    /// feature ordering.
    pub fn new(bundle: EnsembleBundle) -> Result<Self, RecoveryError> {
        bundle.check_schema()?;
        Ok(Self {
            bundle: Arc::new(bundle),
        })
    }

    /// Load the stored bundle.
    ///
    /// # Errors
    /// Returns `ModelNotLoaded` when nothing is stored, and the store's error
    /// when the artifact is unreadable, corrupt or for another schema.
    pub fn load<S>(store: &S) -> Result<Self, RecoveryError>
    where
        S: BundleStore,
        S::Error: Into<StoreError>,
    {
        let bundle = store
            .load()
            .map_err(|e| RecoveryError::Store(e.into()))?
            .ok_or_else(|| RecoveryError::ModelNotLoaded("no stored ensemble bundle".into()))?;
        tracing::info!(
            trained_at = %bundle.trained_at(),
            fingerprint = %bundle.fingerprint(),
            "Ensemble bundle loaded"
        );
        Self::new(bundle)
    }

    #[must_use]
    pub fn bundle(&self) -> &EnsembleBundle {
        &self.bundle
    }

    /// Score a (possibly partial) patient.
    ///
    /// # Errors
    /// Returns `Validation` if the completed record is out of domain.
    pub fn predict(&self, input: &PatientInput) -> Result<RiskAssessment, RecoveryError> {
        let record = input.clone().into_record()?;
        self.predict_record(&record)
    }

    /// Score a complete record through the same feature pipeline used in training.
    ///
    /// # Errors
    /// Propagates feature-engineering failures.
    pub fn predict_record(&self, record: &PatientRecord) -> Result<RiskAssessment, RecoveryError> {
        let features = engineer(record)?;
        let row = feature_row(record, &features);
        let probability = self.bundle.predict_proba(&row);
        let assessment = RiskAssessment::new(probability, record);
        tracing::debug!(
            disease = %record.disease,
            probability = assessment.risk_probability,
            label = %assessment.risk_label,
            "Patient scored"
        );
        Ok(assessment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::FileBundleStore;
    use crate::application::training::fixture::trained;
    use crate::domain::fixtures::*;
    use crate::domain::RiskLabel;
    use serde_json::json;
    use tempfile::tempdir;

    fn predictor() -> RiskPredictor {
        RiskPredictor::new(trained().outcome.bundle.clone()).expect("predictor")
    }

    #[test]
    fn test_deteriorating_cancer_patient_is_high_risk() {
        let a = predictor()
            .predict(&PatientInput::from(&deteriorating_cancer_patient()))
            .expect("predict");
        assert_eq!(a.risk_label, RiskLabel::High);
        assert!(a.risk_probability >= 0.5);
        assert!(a.risk_flags.contains(&"Non-adherent".to_string()));
    }

    #[test]
    fn test_stable_hip_patient_is_low_risk() {
        let a = predictor()
            .predict(&PatientInput::from(&stable_hip_patient()))
            .expect("predict");
        assert_eq!(a.risk_label, RiskLabel::Low);
        assert!(a.risk_probability < 0.5);
        assert_eq!(a.risk_flags, vec!["No major flags"]);
    }

    #[test]
    fn test_prediction_is_deterministic() {
        let p = predictor();
        let input = PatientInput::from(&deteriorating_cancer_patient());
        let first = p.predict(&input).expect("predict");
        for _ in 0..2 {
            assert_eq!(p.predict(&input).expect("predict"), first);
        }
    }

    #[test]
    fn test_partial_input_uses_defaults() {
        let input: PatientInput = serde_json::from_value(json!({
            "pain_level": 6, "swelling": 1, "medication_adherence": false
        }))
        .expect("input");
        let record = input.into_record().expect("record");
        assert_eq!(record.disease, "general_surgery");
        assert_eq!(record.prognosis, Prognosis::Recoverable);
        assert_eq!(record.days_since_discharge, 1);
        assert!((record.pain_level - 6.0).abs() < f64::EPSILON);
        assert!((record.temperature - 98.6).abs() < f64::EPSILON);
        assert!((record.mobility_score - 6.0).abs() < f64::EPSILON);
        assert!(record.swelling);
        assert!(!record.medication_adherence);
    }

    #[test]
    fn test_unknown_prognosis_rejected() {
        let input = PatientInput {
            prognosis_class: Some("terminal".into()),
            ..PatientInput::default()
        };
        assert!(matches!(input.into_record(), Err(RecoveryError::Validation(_))));
    }

    #[test]
    fn test_load_from_store() {
        let dir = tempdir().expect("tempdir");
        let store = FileBundleStore::new(dir.path());
        assert!(matches!(
            RiskPredictor::load(&store),
            Err(RecoveryError::ModelNotLoaded(_))
        ));

        store.save(&trained().outcome.bundle).expect("save");
        let loaded = RiskPredictor::load(&store).expect("load");
        let record = deteriorating_cancer_patient();
        let expected = predictor().predict_record(&record).expect("predict");
        assert_eq!(loaded.predict_record(&record).expect("predict"), expected);
    }
}
