//! Anemia classifier trainer.
//!
//! Generates the synthetic CBC dataset, selects the best candidate by
//! cross-validated accuracy, persists it and runs one sample panel through
//! the request handler.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin train_anemia -- [model_dir]
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::json;

use recovery_companion::application::{
    train_anemia, AnemiaClassifier, AnemiaConfig, ApiHandler, SurgeryRiskService,
};
use recovery_companion::adapters::FileBundleStore;

fn main() -> Result<()> {
    let _guard = recovery_companion::logging::init_tracing().context("opening log file")?;

    let model_dir = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("RECOVERY_MODEL_DIR").ok())
        .map_or_else(|| PathBuf::from("models"), PathBuf::from);

    let outcome = train_anemia(&AnemiaConfig::default()).context("training anemia model")?;
    for score in &outcome.cv {
        tracing::info!(
            candidate = score.candidate.name(),
            mean = score.mean,
            std = score.std,
            selected = score.candidate == outcome.selected,
            "CV accuracy"
        );
    }
    tracing::info!(test_accuracy = outcome.test_accuracy, "Held-out accuracy");

    let store = AnemiaClassifier::store(&model_dir);
    outcome.classifier.save(&store).context("saving anemia model")?;

    let classifier = AnemiaClassifier::load(&store).context("reloading anemia model")?;
    let surgery = SurgeryRiskService::from_store(&FileBundleStore::new(&model_dir));
    let api = ApiHandler::new(Some(classifier), surgery);
    let response = api.handle_anemia_request(&json!({
        "Gender": "Female", "Age": 28,
        "RBC": 4.0, "Hemoglobin": 11.2, "Hematocrit": 34.0,
        "MCV": 85.0, "MCH": 28.0, "MCHC": 32.9
    }));
    tracing::info!(status = response.status, body = %response.body, "Sample anemia request");
    Ok(())
}
