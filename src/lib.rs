//! # Recovery Companion
//!
//! Post-discharge deterioration risk estimation from vitals and clinical history.
//!
//! This crate provides:
//! - A synthetic, clinically-plausible cohort generator spanning 20 disease categories
//! - Deterministic feature engineering and rule-based label assignment with
//!   multi-tier diagnostic-uncertainty noise
//! - A calibrated three-member ensemble (gradient boosting, extra trees,
//!   elastic-net logistic regression) with per-disease evaluation
//! - Single-patient prediction with human-readable risk flags
//! - A separate CBC-panel anemia classifier
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core types and pure functions (disease table, patient record, features, labels)
//! - `ports`: Trait definitions at the seams (classifier scoring, bundle persistence)
//! - `adapters`: Concrete learners, calibration, scaling and the file-backed bundle store
//! - `application`: Use cases orchestrating generation, training, evaluation and prediction
//! - `logging`: Subscriber setup shared by the binaries
//!
//! DISCLAIMER: research prototype trained on synthetic data. Not for clinical use.

pub mod adapters;
pub mod application;
pub mod domain;
pub mod logging;
pub mod ports;

pub use application::{EnsembleBundle, RiskPredictor, TrainingConfig};
pub use domain::{PatientRecord, Prognosis, RiskAssessment, RiskLabel};

/// Result type for Recovery Companion operations
pub type Result<T> = std::result::Result<T, RecoveryError>;

/// Main error type for Recovery Companion
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Missing field: {0}")]
    MissingField(String),

    #[error(
        "Class {class} has only {count} samples; at least {folds} are required for stratified cross-validation"
    )]
    InsufficientClassSupport { class: u8, count: usize, folds: usize },

    #[error("Bundle schema mismatch: expected feature fingerprint {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },

    #[error("Model not loaded: {0}")]
    ModelNotLoaded(String),

    #[error("Empty dataset: {0}")]
    EmptyDataset(String),

    #[error("Training failed: {0}")]
    Training(String),

    #[error("Bundle store error: {0}")]
    Store(#[from] adapters::StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Binary encoding error: {0}")]
    Encoding(#[from] bincode::Error),
}
