//! Anemia severity pipeline: synthetic CBC panels, model selection by
//! cross-validated accuracy, and the persisted classifier.

use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;

use crate::adapters::forest::{Forest, ForestParams};
use crate::adapters::kernel::{scale_gamma, RbfFeatures};
use crate::adapters::linear::{SoftmaxParams, SoftmaxRegression};
use crate::adapters::sampling::{stratified_kfold, stratified_split, take_labels, take_rows};
use crate::adapters::scaling::StandardScaler;
use crate::adapters::FileBundleStore;
use crate::adapters::StoreError;
use crate::domain::anemia::ANEMIA_FEATURE_NAMES;
use crate::domain::features::fingerprint_of;
use crate::domain::{AnemiaDiagnosis, CbcPanel, Gender, Severity};
use crate::RecoveryError;

const N_CLASSES: usize = Severity::ALL.len();
const ANEMIA_STEM: &str = "anemia";

/// Severity draw order and prior.
const SEVERITY_PRIOR: [(Severity, f64); 4] = [
    (Severity::NonAnemic, 0.55),
    (Severity::Mild, 0.22),
    (Severity::Moderate, 0.16),
    (Severity::Severe, 0.07),
];

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// One labelled synthetic panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnemiaSample {
    pub panel: CbcPanel,
    pub severity: Severity,
}

/// Seeded CBC generator following WHO hemoglobin bands.
pub struct CbcGenerator {
    rng: ChaCha20Rng,
    severity: WeightedIndex<f64>,
}

impl CbcGenerator {
    /// # Errors
    /// Returns `Validation` if the severity prior is malformed.
    pub fn new(seed: u64) -> Result<Self, RecoveryError> {
        let severity = WeightedIndex::new(SEVERITY_PRIOR.iter().map(|(_, p)| *p))
            .map_err(|e| RecoveryError::Validation(format!("bad severity prior: {e}")))?;
        Ok(Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
            severity,
        })
    }

    /// # Errors
    /// Returns `Validation` if a noise distribution cannot be formed.
    pub fn generate(&mut self, n: usize) -> Result<Vec<AnemiaSample>, RecoveryError> {
        let noise = |std: f64| {
            Normal::new(0.0, std).map_err(|e| RecoveryError::Validation(format!("normal(0, {std}): {e}")))
        };
        let (hct_noise, rbc_noise, mcv_noise, mch_noise, mchc_noise) =
            (noise(0.8)?, noise(0.2)?, noise(2.5)?, noise(1.0)?, noise(0.5)?);
        let (male_hb, female_hb) = (noise(1.0)?, noise(0.9)?);

        let mut samples = Vec::with_capacity(n);
        for _ in 0..n {
            let rng = &mut self.rng;
            let gender = if rng.gen_bool(0.5) { Gender::Male } else { Gender::Female };
            let age = f64::from(rng.gen_range(15_u32..85));
            let severity = SEVERITY_PRIOR[self.severity.sample(rng)].0;

            let hb = match (severity, gender) {
                (Severity::NonAnemic, Gender::Male) => (15.0 + male_hb.sample(rng)).max(12.0),
                (Severity::NonAnemic, Gender::Female) => (13.5 + female_hb.sample(rng)).max(11.0),
                (Severity::Mild, Gender::Male) => rng.gen_range(10.0..12.99),
                (Severity::Mild, Gender::Female) => rng.gen_range(10.0..11.99),
                (Severity::Moderate, _) => rng.gen_range(8.0..10.99),
                (Severity::Severe, _) => rng.gen_range(4.5..7.99),
            };
            let hct = (hb * 3.0 + hct_noise.sample(rng)).max(10.0);
            let rbc = (hb / 2.95 + rbc_noise.sample(rng)).max(1.0);
            let mcv = (hct / rbc * 10.0 + mcv_noise.sample(rng)).clamp(50.0, 120.0);
            let mch = (hb / rbc * 10.0 + mch_noise.sample(rng)).clamp(15.0, 40.0);
            let mchc = (hb / hct * 100.0 + mchc_noise.sample(rng)).clamp(24.0, 38.0);

            samples.push(AnemiaSample {
                panel: CbcPanel {
                    gender,
                    age,
                    rbc: round2(rbc),
                    hemoglobin: round2(hb),
                    hematocrit: round2(hct),
                    mcv: round2(mcv),
                    mch: round2(mch),
                    mchc: round2(mchc),
                },
                severity,
            });
        }
        tracing::info!(n = samples.len(), "CBC panels generated");
        Ok(samples)
    }
}

/// Candidate learners compared by cross-validation, in tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnemiaCandidate {
    /// RBF-kernel machine on standardized inputs
    Svm,
    LogisticRegression,
    RandomForest,
}

impl AnemiaCandidate {
    pub const ALL: [AnemiaCandidate; 3] = [Self::Svm, Self::LogisticRegression, Self::RandomForest];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Svm => "SVM",
            Self::LogisticRegression => "Logistic Regression",
            Self::RandomForest => "Random Forest",
        }
    }
}

/// A fitted anemia model; class indices follow `Severity::ALL`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AnemiaModel {
    /// Standardize, lift into random RBF features, then a penalized
    /// multinomial fit whose softmax supplies the class probabilities.
    Svm {
        scaler: StandardScaler,
        features: RbfFeatures,
        model: SoftmaxRegression,
    },
    Logistic {
        scaler: StandardScaler,
        model: SoftmaxRegression,
    },
    Forest(Forest),
}

impl AnemiaModel {
    /// # Errors
    /// Propagates learner failures.
    pub fn fit(
        candidate: AnemiaCandidate,
        x: &[Vec<f64>],
        y: &[u8],
        config: &AnemiaConfig,
        seed: u64,
    ) -> Result<Self, RecoveryError> {
        match candidate {
            AnemiaCandidate::Svm => {
                let scaler = StandardScaler::fit(x)?;
                let scaled = scaler.transform(x);
                let width = scaled.first().map_or(0, Vec::len);
                let features = RbfFeatures::sample(width, config.svm.n_components, scale_gamma(&scaled)?, seed)?;
                let model = SoftmaxRegression::fit(&features.transform(&scaled), y, N_CLASSES, &config.svm.linear)?;
                Ok(Self::Svm { scaler, features, model })
            }
            AnemiaCandidate::LogisticRegression => {
                let scaler = StandardScaler::fit(x)?;
                let model = SoftmaxRegression::fit(&scaler.transform(x), y, N_CLASSES, &config.logistic)?;
                Ok(Self::Logistic { scaler, model })
            }
            AnemiaCandidate::RandomForest => Ok(Self::Forest(Forest::fit(x, y, N_CLASSES, &config.forest, seed)?)),
        }
    }

    #[must_use]
    pub fn predict_class_proba(&self, row: &[f64]) -> Vec<f64> {
        match self {
            Self::Svm { scaler, features, model } => {
                model.predict_class_proba(&features.transform_row(&scaler.transform_row(row)))
            }
            Self::Logistic { scaler, model } => model.predict_class_proba(&scaler.transform_row(row)),
            Self::Forest(forest) => forest.predict_class_proba(row),
        }
    }

    #[must_use]
    pub fn predict_class(&self, row: &[f64]) -> u8 {
        argmax(&self.predict_class_proba(row))
    }
}

fn argmax(values: &[f64]) -> u8 {
    values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map_or(0, |(i, _)| i as u8)
}

fn accuracy(model: &AnemiaModel, x: &[Vec<f64>], y: &[u8]) -> f64 {
    let correct = x.iter().zip(y).filter(|(row, &label)| model.predict_class(row) == label).count();
    correct as f64 / y.len().max(1) as f64
}

/// RBF candidate settings. `gamma` follows the `1 / (n_features * var)` rule
/// on the standardized training rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvmParams {
    pub n_components: usize,
    pub linear: SoftmaxParams,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self {
            n_components: 200,
            linear: SoftmaxParams {
                c: 10.0,
                max_iter: 500,
                ..SoftmaxParams::default()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnemiaConfig {
    pub n_samples: usize,
    pub seed: u64,
    pub test_fraction: f64,
    pub cv_folds: usize,
    pub svm: SvmParams,
    pub logistic: SoftmaxParams,
    pub forest: ForestParams,
}

impl Default for AnemiaConfig {
    fn default() -> Self {
        Self {
            n_samples: 3000,
            seed: 42,
            test_fraction: 0.2,
            cv_folds: 5,
            svm: SvmParams::default(),
            logistic: SoftmaxParams::default(),
            forest: ForestParams::random_forest(),
        }
    }
}

impl AnemiaConfig {
    /// Reduced sizes for tests.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            n_samples: 1200,
            svm: SvmParams {
                n_components: 100,
                linear: SoftmaxParams {
                    c: 10.0,
                    max_iter: 300,
                    ..SoftmaxParams::default()
                },
            },
            logistic: SoftmaxParams {
                max_iter: 400,
                ..SoftmaxParams::default()
            },
            forest: ForestParams {
                n_estimators: 30,
                ..ForestParams::random_forest()
            },
            ..Self::default()
        }
    }
}

/// Cross-validated accuracy of one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub candidate: AnemiaCandidate,
    pub mean: f64,
    pub std: f64,
}

#[derive(Debug, Clone)]
pub struct AnemiaOutcome {
    pub classifier: AnemiaClassifier,
    pub selected: AnemiaCandidate,
    pub cv: Vec<CandidateScore>,
    pub test_accuracy: f64,
}

/// Generate, compare candidates by stratified k-fold accuracy on the training
/// split, refit the best one on that split and score it on the held-out rows.
///
/// # Errors
/// Returns `InsufficientClassSupport` if a severity is too rare to stratify,
/// and propagates generation and learner failures.
pub fn train_anemia(config: &AnemiaConfig) -> Result<AnemiaOutcome, RecoveryError> {
    let mut seeds = ChaCha20Rng::seed_from_u64(config.seed);
    let samples = CbcGenerator::new(seeds.gen())?.generate(config.n_samples)?;
    let x: Vec<Vec<f64>> = samples.iter().map(|s| s.panel.to_vec()).collect();
    let y: Vec<u8> = samples.iter().map(|s| s.severity.index() as u8).collect();

    let mut split_rng = ChaCha20Rng::seed_from_u64(seeds.gen());
    let (train_idx, test_idx) = stratified_split(&y, N_CLASSES, config.test_fraction, &mut split_rng)?;
    let (x_train, y_train) = (take_rows(&x, &train_idx), take_labels(&y, &train_idx));
    let (x_test, y_test) = (take_rows(&x, &test_idx), take_labels(&y, &test_idx));

    let mut cv_rng = ChaCha20Rng::seed_from_u64(seeds.gen());
    let folds = stratified_kfold(&y_train, N_CLASSES, config.cv_folds, &mut cv_rng)?;
    let model_seed: u64 = seeds.gen();

    let mut cv = Vec::with_capacity(AnemiaCandidate::ALL.len());
    for candidate in AnemiaCandidate::ALL {
        let mut scores = Vec::with_capacity(folds.len());
        for (train, val) in &folds {
            let model = AnemiaModel::fit(
                candidate,
                &take_rows(&x_train, train),
                &take_labels(&y_train, train),
                config,
                model_seed,
            )?;
            scores.push(accuracy(&model, &take_rows(&x_train, val), &take_labels(&y_train, val)));
        }
        let n = scores.len().max(1) as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let std = (scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n).sqrt();
        tracing::info!(candidate = candidate.name(), mean, std, "CV accuracy");
        cv.push(CandidateScore { candidate, mean, std });
    }

    // first candidate wins ties
    let selected = cv
        .iter()
        .fold(None::<&CandidateScore>, |best, s| match best {
            Some(b) if b.mean >= s.mean => Some(b),
            _ => Some(s),
        })
        .map(|s| s.candidate)
        .ok_or_else(|| RecoveryError::Training("no anemia candidates".into()))?;

    let model = AnemiaModel::fit(selected, &x_train, &y_train, config, model_seed)?;
    let test_accuracy = accuracy(&model, &x_test, &y_test);
    tracing::info!(model = selected.name(), test_accuracy, "Anemia model selected");

    if let Some(row) = x_test.first() {
        let first = model.predict_class(row);
        let repeatable = (0..2).all(|_| model.predict_class(row) == first);
        tracing::info!(repeatable, "Determinism check");
    }

    Ok(AnemiaOutcome {
        classifier: AnemiaClassifier { model },
        selected,
        cv,
        test_accuracy,
    })
}

/// Fingerprint of the anemia input columns.
#[must_use]
pub fn anemia_fingerprint() -> String {
    fingerprint_of(&ANEMIA_FEATURE_NAMES)
}

/// Serving wrapper around a fitted anemia model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnemiaClassifier {
    model: AnemiaModel,
}

impl AnemiaClassifier {
    #[must_use]
    pub fn new(model: AnemiaModel) -> Self {
        Self { model }
    }

    #[must_use]
    pub fn predict(&self, panel: &CbcPanel) -> AnemiaDiagnosis {
        AnemiaDiagnosis::from_probabilities(&self.model.predict_class_proba(&panel.to_vec()))
    }

    #[must_use]
    pub fn store(dir: impl Into<std::path::PathBuf>) -> FileBundleStore {
        FileBundleStore::with_stem(dir, ANEMIA_STEM)
    }

    /// # Errors
    /// Returns error if the artifact cannot be written.
    pub fn save(&self, store: &FileBundleStore) -> Result<(), StoreError> {
        store.write(self, &anemia_fingerprint()).map(|_| ())
    }

    /// # Errors
    /// Returns `ModelNotLoaded` when nothing is stored, or the store error
    /// for a corrupt artifact or a different input schema.
    pub fn load(store: &FileBundleStore) -> Result<Self, RecoveryError> {
        let (classifier, manifest) = store
            .read::<Self>()?
            .ok_or_else(|| RecoveryError::ModelNotLoaded("no stored anemia model".into()))?;
        let expected = anemia_fingerprint();
        if manifest.feature_fingerprint != expected {
            return Err(RecoveryError::SchemaMismatch {
                expected,
                found: manifest.feature_fingerprint,
            });
        }
        Ok(classifier)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;

    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn trained() -> &'static AnemiaOutcome {
        static OUTCOME: OnceLock<AnemiaOutcome> = OnceLock::new();
        OUTCOME.get_or_init(|| train_anemia(&AnemiaConfig::fast()).expect("train"))
    }

    fn scenario_panel() -> CbcPanel {
        CbcPanel::from_json(&json!({
            "Gender": "Female", "Age": 28,
            "RBC": 4.0, "Hemoglobin": 11.2, "Hematocrit": 34.0,
            "MCV": 85.0, "MCH": 28.0, "MCHC": 32.9
        }))
        .expect("panel")
    }

    #[test]
    fn test_generated_panels_respect_bands() {
        let samples = CbcGenerator::new(42).expect("gen").generate(2000).expect("samples");
        for s in &samples {
            let p = &s.panel;
            assert!((15.0..85.0).contains(&p.age));
            assert!((50.0..=120.0).contains(&p.mcv));
            assert!((15.0..=40.0).contains(&p.mch));
            assert!((24.0..=38.0).contains(&p.mchc));
            assert!(p.rbc >= 1.0 && p.hematocrit >= 10.0);
            match s.severity {
                Severity::Severe => assert!(p.hemoglobin < 8.0),
                Severity::Moderate => assert!((8.0..11.0).contains(&p.hemoglobin)),
                Severity::Mild => assert!((10.0..13.0).contains(&p.hemoglobin)),
                Severity::NonAnemic => assert!(p.hemoglobin >= 11.0),
            }
        }
        let normal = samples.iter().filter(|s| s.severity == Severity::NonAnemic).count();
        assert!((normal as f64 / 2000.0 - 0.55).abs() < 0.05);
    }

    #[test]
    fn test_generator_reproducible() {
        let a = CbcGenerator::new(1).expect("gen").generate(100).expect("a");
        let b = CbcGenerator::new(1).expect("gen").generate(100).expect("b");
        assert_eq!(a, b);
    }

    #[test]
    fn test_selection_and_accuracy() {
        let outcome = trained();
        assert_eq!(outcome.cv.len(), AnemiaCandidate::ALL.len());
        let best = outcome
            .cv
            .iter()
            .find(|s| s.candidate == outcome.selected)
            .expect("selected scored");
        assert!(outcome.cv.iter().all(|s| s.mean <= best.mean));
        assert!(outcome.test_accuracy > 0.8);
    }

    #[test]
    fn test_every_candidate_is_cross_validated() {
        let outcome = trained();
        let scored: Vec<AnemiaCandidate> = outcome.cv.iter().map(|s| s.candidate).collect();
        assert_eq!(scored, AnemiaCandidate::ALL);
        for s in &outcome.cv {
            assert!(s.mean > 0.7, "{} scored {}", s.candidate.name(), s.mean);
            assert!(s.std >= 0.0 && s.std < 0.1);
        }
    }

    #[test]
    fn test_svm_candidate_fits_and_predicts() {
        let samples = CbcGenerator::new(5).expect("gen").generate(600).expect("samples");
        let x: Vec<Vec<f64>> = samples.iter().map(|s| s.panel.to_vec()).collect();
        let y: Vec<u8> = samples.iter().map(|s| s.severity.index() as u8).collect();
        let config = AnemiaConfig::fast();

        let model = AnemiaModel::fit(AnemiaCandidate::Svm, &x, &y, &config, 9).expect("fit");
        assert!(matches!(model, AnemiaModel::Svm { .. }));
        let proba = model.predict_class_proba(&x[0]);
        assert_eq!(proba.len(), N_CLASSES);
        assert!((proba.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(accuracy(&model, &x, &y) > 0.7);

        let again = AnemiaModel::fit(AnemiaCandidate::Svm, &x, &y, &config, 9).expect("refit");
        assert_eq!(again.predict_class_proba(&x[1]), model.predict_class_proba(&x[1]));
    }

    #[test]
    fn test_scenario_diagnosis() {
        let d = trained().classifier.predict(&scenario_panel());
        assert!(Severity::ALL.contains(&d.diagnosis));
        let total: f64 = d.probabilities.values().sum();
        assert!((total - 100.0).abs() <= 0.1);
        assert!((0.0..=99.9).contains(&d.risk_score));
        assert_eq!(trained().classifier.predict(&scenario_panel()), d);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().expect("tempdir");
        let store = AnemiaClassifier::store(dir.path());
        assert!(matches!(
            AnemiaClassifier::load(&store),
            Err(RecoveryError::ModelNotLoaded(_))
        ));
        trained().classifier.save(&store).expect("save");
        let loaded = AnemiaClassifier::load(&store).expect("load");
        assert_eq!(loaded.predict(&scenario_panel()), trained().classifier.predict(&scenario_panel()));
    }
}
