//! Recovery Companion: deterioration-risk ensemble trainer.
//!
//! Generates the synthetic cohort, trains and evaluates the calibrated
//! ensemble, persists the bundle, then scores a few sample patients against
//! the reloaded bundle.

use anyhow::{Context, Result};
use serde_json::json;

use recovery_companion::adapters::sampling::{take_labels, take_rows};
use recovery_companion::adapters::FileBundleStore;
use recovery_companion::application::{
    breakdown, evaluate, GroupBy, PatientInput, RiskPredictor, SurgeryRiskService, TrainingConfig,
    TrainingService,
};
use recovery_companion::ports::BundleStore;

const TOP_FEATURES: usize = 20;

fn sample_patients() -> Result<Vec<(&'static str, PatientInput)>> {
    let samples = [
        (
            "deteriorating metastatic cancer",
            json!({
                "disease": "metastatic_cancer", "prognosis_class": "non_recoverable",
                "days_since_discharge": 5, "pain_level": 9, "temperature": 101.8,
                "heart_rate": 114, "sbp": 98, "spo2": 88, "sleep_hours": 2.5,
                "fatigue": 10, "appetite": 1, "mobility_score": 1, "swelling": 1,
                "medication_adherence": 0, "age": 64, "bmi": 22, "comorbidity_count": 4,
                "prev_pain_level": 6, "prev_mobility_score": 3
            }),
        ),
        (
            "stable hip replacement",
            json!({
                "disease": "hip_knee_replacement", "prognosis_class": "recoverable",
                "days_since_discharge": 14, "pain_level": 3, "temperature": 98.4,
                "heart_rate": 72, "sbp": 126, "spo2": 97, "sleep_hours": 7.5,
                "fatigue": 3, "appetite": 8, "mobility_score": 7, "swelling": 0,
                "medication_adherence": 1, "age": 66, "bmi": 29, "comorbidity_count": 1,
                "prev_pain_level": 4, "prev_mobility_score": 6
            }),
        ),
        ("pre-operative minimal", json!({ "pain_level": 6, "age": 72 })),
    ];
    samples
        .into_iter()
        .map(|(name, value)| Ok((name, serde_json::from_value(value)?)))
        .collect()
}

fn main() -> Result<()> {
    let _guard = recovery_companion::logging::init_tracing().context("opening log file")?;

    let config = TrainingConfig::from_env_or_default();
    tracing::info!(
        n_total = config.n_total,
        seed = config.seed,
        model_dir = %config.model_dir.display(),
        "Starting Recovery Companion training"
    );

    let service = TrainingService::new(config.clone())?;
    let dataset = service.build_dataset().context("building dataset")?;
    let outcome = service.train(&dataset).context("training ensemble")?;
    let bundle = &outcome.bundle;

    let test_rows = take_rows(&dataset.rows, &outcome.test_indices);
    let test_labels = take_labels(&dataset.labels, &outcome.test_indices);
    let report = evaluate(bundle, &test_rows, &test_labels)?;
    for (member, accuracy) in &report.member_accuracy {
        tracing::info!(member = member.name(), accuracy, "Member accuracy");
    }
    let cm = report.ensemble.confusion;
    tracing::info!(tn = cm.tn, fp = cm.fp, fn_ = cm.fn_, tp = cm.tp, "Confusion matrix");

    for group_by in [GroupBy::Disease, GroupBy::Prognosis] {
        for g in breakdown(bundle, &dataset.records, &dataset.rows, &dataset.labels, group_by)? {
            tracing::info!(
                group = %g.group,
                n = g.n,
                positive_rate = g.positive_rate,
                roc_auc = g.roc_auc,
                accuracy = g.accuracy,
                "Subgroup"
            );
        }
    }

    for (rank, (feature, importance)) in bundle.feature_importances().iter().take(TOP_FEATURES).enumerate() {
        tracing::info!(rank = rank + 1, %feature, importance, "Feature importance");
    }

    let store = FileBundleStore::new(&config.model_dir);
    store.save(bundle).context("saving bundle")?;

    let predictor = RiskPredictor::load(&store).context("reloading bundle")?;
    let surgery = SurgeryRiskService::from_store(&store);
    for (name, input) in sample_patients()? {
        let assessment = predictor.predict(&input)?;
        let interpretation = surgery.assess(&input)?;
        tracing::info!(
            patient = name,
            probability = assessment.risk_probability,
            label = %assessment.risk_label,
            zone = %interpretation.zone,
            flags = ?assessment.risk_flags,
            "Sample prediction"
        );
    }

    tracing::info!("Training complete");
    Ok(())
}
