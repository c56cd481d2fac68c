//! Training service: generate, engineer, label, split, fit.
//!
//! Every stochastic step takes its seed from one stream derived from the
//! configured root seed, drawn in a fixed order. Two runs with the same
//! configuration produce bit-identical bundles apart from the timestamp.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

use super::cohort::CohortGenerator;
use super::config::TrainingConfig;
use super::ensemble::{EnsembleBundle, Member};
use super::evaluation::roc_auc;
use super::labeling::LabelAssigner;
use crate::adapters::boosting::{BoostingParams, GradientBoosting};
use crate::adapters::calibration::Calibrated;
use crate::adapters::forest::Forest;
use crate::adapters::linear::ElasticNetLogistic;
use crate::adapters::sampling::{stratified_kfold, stratified_split, take_labels, take_rows};
use crate::adapters::scaling::RobustScaler;
use crate::domain::{engineer, feature_row, PatientRecord};
use crate::ports::ProbabilisticClassifier;
use crate::RecoveryError;

/// Generated records with their model rows and labels, index-aligned.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub records: Vec<PatientRecord>,
    pub rows: Vec<Vec<f64>>,
    pub labels: Vec<u8>,
}

impl Dataset {
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[must_use]
    pub fn positive_rate(&self) -> f64 {
        let positives = self.labels.iter().filter(|&&y| y == 1).count();
        positives as f64 / self.len().max(1) as f64
    }
}

/// ROC-AUC across stratified folds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvSummary {
    pub fold_scores: Vec<f64>,
    pub mean: f64,
    pub std: f64,
}

impl CvSummary {
    fn from_scores(fold_scores: Vec<f64>) -> Self {
        let n = fold_scores.len().max(1) as f64;
        let mean = fold_scores.iter().sum::<f64>() / n;
        let std = (fold_scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n).sqrt();
        Self {
            fold_scores,
            mean,
            std,
        }
    }
}

/// Everything a training run produces besides the bundle.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub bundle: EnsembleBundle,
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub cv: CvSummary,
}

/// Per-run seeds, drawn in this order from the root seed.
struct Seeds {
    cohort: u64,
    labels: u64,
    split: u64,
    gbm: u64,
    et: u64,
    cv: u64,
}

impl Seeds {
    fn derive(root: u64) -> Self {
        let mut stream = ChaCha20Rng::seed_from_u64(root);
        Self {
            cohort: stream.gen(),
            labels: stream.gen(),
            split: stream.gen(),
            gbm: stream.gen(),
            et: stream.gen(),
            cv: stream.gen(),
        }
    }
}

/// Orchestrates one end-to-end training run.
pub struct TrainingService {
    config: TrainingConfig,
    seeds: Seeds,
}

impl TrainingService {
    /// # Errors
    /// Returns `Validation` listing every configuration problem.
    pub fn new(config: TrainingConfig) -> Result<Self, RecoveryError> {
        config
            .validate()
            .map_err(|errors| RecoveryError::Validation(errors.join("; ")))?;
        let seeds = Seeds::derive(config.seed);
        Ok(Self { config, seeds })
    }

    #[must_use]
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Generate the cohort, engineer features and assign labels.
    ///
    /// # Errors
    /// Propagates generation and feature-engineering failures.
    pub fn build_dataset(&self) -> Result<Dataset, RecoveryError> {
        let mut generator = CohortGenerator::new(self.seeds.cohort, self.config.min_per_disease)?;
        let records = generator.generate(self.config.n_total)?;

        let features = records.iter().map(engineer).collect::<Result<Vec<_>, _>>()?;
        let rows = records
            .iter()
            .zip(&features)
            .map(|(r, f)| feature_row(r, f))
            .collect();

        let mut assigner = LabelAssigner::new(self.config.label_noise, self.seeds.labels);
        let labels = assigner.assign_all(&records, &features)?;

        let dataset = Dataset {
            records,
            rows,
            labels,
        };
        tracing::info!(
            n = dataset.len(),
            positive_rate = dataset.positive_rate(),
            "Dataset built"
        );
        Ok(dataset)
    }

    /// Fit the calibrated ensemble on a stratified training split.
    ///
    /// # Errors
    /// Returns `InsufficientClassSupport` when calibration or the diagnostic
    /// cannot stratify, and propagates every learner failure. Nothing is
    /// persisted on error.
    pub fn train(&self, dataset: &Dataset) -> Result<TrainingOutcome, RecoveryError> {
        if dataset.is_empty() {
            return Err(RecoveryError::EmptyDataset("no training rows".into()));
        }
        let cfg = &self.config;

        let mut split_rng = ChaCha20Rng::seed_from_u64(self.seeds.split);
        let (train_idx, test_idx) = stratified_split(&dataset.labels, 2, cfg.test_fraction, &mut split_rng)?;
        let x_train = take_rows(&dataset.rows, &train_idx);
        let y_train = take_labels(&dataset.labels, &train_idx);
        tracing::info!(train = train_idx.len(), test = test_idx.len(), "Stratified split");

        let scaler = RobustScaler::fit(&x_train)?;
        let x_train_scaled = scaler.transform(&x_train);

        tracing::info!(member = Member::GradientBoosting.name(), "Fitting");
        let gbm_params = cfg.gradient_boosting.clone();
        let gbm = Calibrated::fit(&x_train, &y_train, cfg.calibration_folds, self.seeds.gbm, |x, y, seed| {
            GradientBoosting::fit(x, y, &gbm_params, seed)
        })?;
        tracing::debug!(
            stages = ?gbm.base_learners().map(GradientBoosting::n_stages).collect::<Vec<_>>(),
            "Boosting stages per calibration fold"
        );

        tracing::info!(member = Member::ExtraTrees.name(), "Fitting");
        let et_params = cfg.extra_trees.clone();
        let et = Calibrated::fit(&x_train, &y_train, cfg.calibration_folds, self.seeds.et, |x, y, seed| {
            Forest::fit(x, y, 2, &et_params, seed)
        })?;

        tracing::info!(member = Member::Logistic.name(), "Fitting");
        let lr = ElasticNetLogistic::fit(&x_train_scaled, &y_train, &cfg.logistic)?;
        tracing::debug!(iterations = lr.n_iter(), "Elastic-net solver finished");

        let cv = self.cross_validate(&x_train, &y_train)?;

        let bundle = EnsembleBundle::new(gbm, et, lr, scaler, cfg.weights)?;
        Ok(TrainingOutcome {
            bundle,
            train_indices: train_idx,
            test_indices: test_idx,
            cv,
        })
    }

    /// Stratified k-fold ROC-AUC of a lighter boosting model. Diagnostic only.
    ///
    /// # Errors
    /// Returns `InsufficientClassSupport` if a class has fewer rows than folds.
    pub fn cross_validate(&self, x: &[Vec<f64>], y: &[u8]) -> Result<CvSummary, RecoveryError> {
        let mut rng = ChaCha20Rng::seed_from_u64(self.seeds.cv);
        let folds = stratified_kfold(y, 2, self.config.cv_folds, &mut rng)?;
        let params: &BoostingParams = &self.config.cv_boosting;

        let mut scores = Vec::with_capacity(folds.len());
        for (fold, (train, val)) in folds.iter().enumerate() {
            let model = GradientBoosting::fit(&take_rows(x, train), &take_labels(y, train), params, rng.gen())?;
            let val_labels = take_labels(y, val);
            let probabilities: Vec<f64> = val.iter().map(|&i| model.predict_proba(&x[i])).collect();
            let auc = roc_auc(&val_labels, &probabilities)
                .ok_or_else(|| RecoveryError::Training(format!("fold {fold} has a single class")))?;
            tracing::debug!(fold, auc, "CV fold scored");
            scores.push(auc);
        }

        let summary = CvSummary::from_scores(scores);
        tracing::info!(
            folds = summary.fold_scores.len(),
            mean = summary.mean,
            std = summary.std,
            "Cross-validated ROC-AUC"
        );
        Ok(summary)
    }
}

/// One fast run shared by every test that needs a trained bundle.
#[cfg(test)]
pub(crate) mod fixture {
    use std::sync::OnceLock;

    use super::*;

    pub struct Trained {
        pub dataset: Dataset,
        pub outcome: TrainingOutcome,
    }

    pub fn trained() -> &'static Trained {
        static TRAINED: OnceLock<Trained> = OnceLock::new();
        TRAINED.get_or_init(|| {
            let service = TrainingService::new(TrainingConfig::fast()).expect("config");
            let dataset = service.build_dataset().expect("dataset");
            let outcome = service.train(&dataset).expect("train");
            Trained { dataset, outcome }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::fixture::trained;
    use super::*;
    use crate::application::evaluation::{breakdown, evaluate, GroupBy};
    use crate::domain::fixtures::*;
    use crate::domain::FEATURE_NAMES;

    #[test]
    fn test_split_is_disjoint_and_complete() {
        let t = trained();
        let mut all: Vec<usize> = t
            .outcome
            .train_indices
            .iter()
            .chain(&t.outcome.test_indices)
            .copied()
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..t.dataset.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_ensemble_probabilities_bounded() {
        let t = trained();
        let bundle = &t.outcome.bundle;
        assert!((bundle.weights().iter().sum::<f64>() - 1.0).abs() < 1e-9);
        for row in t.dataset.rows.iter().take(500) {
            let p = bundle.predict_proba(row);
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn test_held_out_quality() {
        let t = trained();
        let rows = take_rows(&t.dataset.rows, &t.outcome.test_indices);
        let labels = take_labels(&t.dataset.labels, &t.outcome.test_indices);
        let report = evaluate(&t.outcome.bundle, &rows, &labels).expect("report");
        assert!(report.ensemble.roc_auc.expect("both classes") > 0.8);
        assert!(report.ensemble.accuracy > 0.75);
        assert_eq!(report.member_accuracy.len(), 3);
        assert!(t.outcome.cv.mean > 0.75);
        assert_eq!(t.outcome.cv.fold_scores.len(), 5);
    }

    #[test]
    fn test_breakdown_skips_small_groups() {
        let t = trained();
        let by_prognosis = breakdown(
            &t.outcome.bundle,
            &t.dataset.records,
            &t.dataset.rows,
            &t.dataset.labels,
            GroupBy::Prognosis,
        )
        .expect("breakdown");
        assert_eq!(by_prognosis.len(), 3);
        assert!(by_prognosis.iter().all(|g| g.n >= 50));

        let by_disease = breakdown(
            &t.outcome.bundle,
            &t.dataset.records,
            &t.dataset.rows,
            &t.dataset.labels,
            GroupBy::Disease,
        )
        .expect("breakdown");
        assert!(!by_disease.is_empty());
        let names: Vec<&str> = by_disease.iter().map(|g| g.group.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_feature_importances_cover_all_columns() {
        let imp = trained().outcome.bundle.feature_importances();
        assert_eq!(imp.len(), FEATURE_NAMES.len());
        assert!((imp.iter().map(|(_, v)| v).sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(imp.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn test_schema_check() {
        let bundle = trained().outcome.bundle.clone();
        assert!(bundle.check_schema().is_ok());

        let mut reordered = bundle;
        let mut names: Vec<String> = FEATURE_NAMES.iter().map(|s| (*s).to_string()).collect();
        names.swap(0, 1);
        reordered.set_feature_names(names);
        assert!(matches!(
            reordered.check_schema(),
            Err(RecoveryError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_member_probabilities_separate_fixtures() {
        let bundle = &trained().outcome.bundle;
        let sick = deteriorating_cancer_patient();
        let stable = stable_hip_patient();
        let row = |r: &PatientRecord| feature_row(r, &engineer(r).expect("features"));
        let high = bundle.member_probabilities(&row(&sick));
        let low = bundle.member_probabilities(&row(&stable));
        for (h, l) in high.iter().zip(&low) {
            assert!(h > l);
        }
    }

    #[test]
    fn test_rare_class_aborts_training() {
        let mut dataset = trained().dataset.clone();
        dataset.records.truncate(400);
        dataset.rows.truncate(400);
        dataset.labels = vec![0; 400];
        dataset.labels[0] = 1;
        dataset.labels[1] = 1;
        dataset.labels[2] = 1;
        let service = TrainingService::new(TrainingConfig::fast()).expect("config");
        let err = service.train(&dataset).expect_err("must abort");
        assert!(matches!(err, RecoveryError::InsufficientClassSupport { class: 1, .. }));
    }
}
