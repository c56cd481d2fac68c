//! Surgical risk interpretation with an explicit degraded mode.
//!
//! When no usable bundle is available at startup the service runs on a fixed
//! linear heuristic of pain and mobility instead of refusing requests.

use std::ops::RangeInclusive;

use super::inference::{PatientInput, RiskPredictor};
use crate::adapters::StoreError;
use crate::domain::RiskInterpretation;
use crate::ports::BundleStore;
use crate::RecoveryError;

const HEURISTIC_BASE: f64 = 0.52;
const HEURISTIC_PAIN_WEIGHT: f64 = 0.05;
const HEURISTIC_MOBILITY_WEIGHT: f64 = 0.02;
const HEURISTIC_DEFAULT_PAIN: f64 = 5.0;
const HEURISTIC_DEFAULT_MOBILITY: f64 = 5.0;

/// Pain and mobility share the 0-10 scale that `PatientRecord::validate` enforces.
const SCORE_SCALE: RangeInclusive<f64> = 0.0..=10.0;

fn scale_value(field: &str, value: Option<f64>, default: f64) -> Result<f64, RecoveryError> {
    let value = value.unwrap_or(default);
    if value.is_finite() && SCORE_SCALE.contains(&value) {
        Ok(value)
    } else {
        Err(RecoveryError::Validation(format!(
            "{field} {value} out of range [{}, {}]",
            SCORE_SCALE.start(),
            SCORE_SCALE.end()
        )))
    }
}

/// Degraded-mode probability from pain and mobility alone.
///
/// # Errors
/// Returns `Validation` when either score is off the 0-10 scale, the same
/// inputs ensemble mode rejects.
pub fn heuristic_probability(pain_level: Option<f64>, mobility_score: Option<f64>) -> Result<f64, RecoveryError> {
    let pain = scale_value("pain_level", pain_level, HEURISTIC_DEFAULT_PAIN)?;
    let mobility = scale_value("mobility_score", mobility_score, HEURISTIC_DEFAULT_MOBILITY)?;
    Ok((HEURISTIC_BASE + HEURISTIC_PAIN_WEIGHT * pain - HEURISTIC_MOBILITY_WEIGHT * mobility).clamp(0.01, 0.99))
}

/// How the service scores requests.
#[derive(Debug, Clone)]
pub enum RiskEngine {
    Ensemble(RiskPredictor),
    Heuristic,
}

#[derive(Debug, Clone)]
pub struct SurgeryRiskService {
    engine: RiskEngine,
}

impl SurgeryRiskService {
    #[must_use]
    pub fn new(engine: RiskEngine) -> Self {
        Self { engine }
    }

    /// Load the bundle from `store`, falling back to the heuristic if it is
    /// absent, unreadable or for another feature schema.
    pub fn from_store<S>(store: &S) -> Self
    where
        S: BundleStore,
        S::Error: Into<StoreError>,
    {
        match RiskPredictor::load(store) {
            Ok(predictor) => Self::new(RiskEngine::Ensemble(predictor)),
            Err(RecoveryError::ModelNotLoaded(reason)) => {
                tracing::warn!(%reason, "No ensemble bundle; surgical risk runs in heuristic mode");
                Self::new(RiskEngine::Heuristic)
            }
            Err(e) => {
                tracing::error!(error = %e, "Ensemble bundle unusable; surgical risk runs in heuristic mode");
                Self::new(RiskEngine::Heuristic)
            }
        }
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(self.engine, RiskEngine::Heuristic)
    }

    /// Interpret the risk for a (possibly partial) patient.
    ///
    /// # Errors
    /// Returns `Validation` for out-of-domain input in either mode, and
    /// propagates any ensemble scoring failure.
    pub fn assess(&self, input: &PatientInput) -> Result<RiskInterpretation, RecoveryError> {
        let probability = match &self.engine {
            RiskEngine::Heuristic => heuristic_probability(input.pain_level, input.mobility_score)?,
            RiskEngine::Ensemble(predictor) => predictor.predict(input)?.risk_probability,
        };
        Ok(RiskInterpretation::from_probability(probability))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::FileBundleStore;
    use crate::application::training::fixture::trained;
    use crate::domain::RiskZone;
    use tempfile::tempdir;

    #[test]
    fn test_heuristic_defaults_and_clamp() {
        // 0.52 + 0.25 - 0.10
        let p = heuristic_probability(None, None).expect("defaults");
        assert!((p - 0.67).abs() < 1e-12);
        let p = heuristic_probability(Some(10.0), Some(0.0)).expect("upper edge");
        assert!((p - 0.99).abs() < 1e-12);
        // 0.52 + 0.0 - 0.20
        let p = heuristic_probability(Some(0.0), Some(10.0)).expect("lower edge");
        assert!((p - 0.32).abs() < 1e-12);
    }

    #[test]
    fn test_heuristic_rejects_off_scale_scores() {
        for (pain, mobility) in [
            (Some(-20.0), None),
            (Some(10.5), None),
            (None, Some(50.0)),
            (None, Some(-1.0)),
            (Some(f64::NAN), None),
        ] {
            assert!(matches!(
                heuristic_probability(pain, mobility),
                Err(RecoveryError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_heuristic_mode_rejects_what_ensemble_mode_rejects() {
        let input = PatientInput {
            pain_level: Some(-20.0),
            mobility_score: Some(50.0),
            ..PatientInput::default()
        };
        let heuristic = SurgeryRiskService::new(RiskEngine::Heuristic);
        assert!(matches!(heuristic.assess(&input), Err(RecoveryError::Validation(_))));

        let predictor = RiskPredictor::new(trained().outcome.bundle.clone()).expect("predictor");
        let ensemble = SurgeryRiskService::new(RiskEngine::Ensemble(predictor));
        assert!(matches!(ensemble.assess(&input), Err(RecoveryError::Validation(_))));
    }

    #[test]
    fn test_missing_bundle_degrades_to_heuristic() {
        let dir = tempdir().expect("tempdir");
        let service = SurgeryRiskService::from_store(&FileBundleStore::new(dir.path()));
        assert!(service.is_degraded());

        let input = PatientInput {
            pain_level: Some(8.0),
            mobility_score: Some(2.0),
            ..PatientInput::default()
        };
        // 0.52 + 0.40 - 0.04 = 0.88
        let r = service.assess(&input).expect("assess");
        assert_eq!(r.risk_percentage, 88);
        assert_eq!(r.zone, RiskZone::High);
    }

    #[test]
    fn test_corrupt_bundle_degrades_to_heuristic() {
        let dir = tempdir().expect("tempdir");
        let store = FileBundleStore::new(dir.path());
        store.save(&trained().outcome.bundle).expect("save");
        std::fs::write(store.artifact_path(), b"garbage").expect("corrupt");
        assert!(SurgeryRiskService::from_store(&store).is_degraded());
    }

    #[test]
    fn test_ensemble_mode_uses_model() {
        let predictor = RiskPredictor::new(trained().outcome.bundle.clone()).expect("predictor");
        let service = SurgeryRiskService::new(RiskEngine::Ensemble(predictor.clone()));
        assert!(!service.is_degraded());

        let r = service.assess(&PatientInput::default()).expect("assess");
        let p = predictor.predict(&PatientInput::default()).expect("predict").risk_probability;
        assert_eq!(r, RiskInterpretation::from_probability(p));
        assert!(r.risk_percentage <= 100);
    }
}
