//! Application layer: Use cases and services.
//!
//! This module orchestrates domain logic with the learners and stores in
//! `adapters` to implement cohort generation, training, evaluation and
//! prediction.

pub mod anemia;
pub mod api;
pub mod cohort;
pub mod config;
mod ensemble;
pub mod evaluation;
mod inference;
pub mod labeling;
pub mod surgery;
pub mod training;

pub use anemia::{train_anemia, AnemiaClassifier, AnemiaConfig};
pub use api::{ApiHandler, ApiResponse};
pub use cohort::CohortGenerator;
pub use config::TrainingConfig;
pub use ensemble::{EnsembleBundle, Member};
pub use evaluation::{breakdown, evaluate, EvaluationReport, GroupBy};
pub use inference::{Flag, PatientInput, RiskPredictor};
pub use labeling::LabelAssigner;
pub use surgery::{RiskEngine, SurgeryRiskService};
pub use training::{Dataset, TrainingService};
