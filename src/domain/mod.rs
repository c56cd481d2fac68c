//! Domain layer: Core business types and logic.
//!
//! This module contains pure types and deterministic functions. Nothing here
//! draws random numbers or touches the filesystem.

pub mod anemia;
mod assessment;
pub mod disease;
pub mod features;
pub mod labels;
mod patient;

pub use anemia::{AnemiaDiagnosis, CbcPanel, Gender, Severity};
pub use assessment::{
    risk_flags, RiskAssessment, RiskInterpretation, RiskLabel, RiskZone, DECISION_THRESHOLD,
};
pub use disease::{disease, DiseaseProfile, Prognosis, Vital, DISEASES};
pub use features::{engineer, feature_row, EngineeredFeatures, RecoveryPhase, FEATURE_NAMES};
pub use labels::LabelNoise;
pub use patient::PatientRecord;

#[cfg(test)]
pub(crate) use patient::fixtures;
