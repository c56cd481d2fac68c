//! Training label assignment with diagnostic-uncertainty noise.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::domain::labels::{adjusted_score, is_borderline, threshold_label};
use crate::domain::{EngineeredFeatures, LabelNoise, PatientRecord, Prognosis};
use crate::RecoveryError;

/// Counts of labels changed by each noise tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoiseReport {
    pub measurement_flips: usize,
    pub borderline_flips: usize,
    pub chronic_upgrades: usize,
}

/// Seeded label assigner.
///
/// Three uniforms are drawn per record, in tier order, whether or not a tier
/// applies. A record's noise therefore depends only on its position and the
/// seed, never on the outcome of earlier tiers.
pub struct LabelAssigner {
    noise: LabelNoise,
    rng: ChaCha20Rng,
    report: NoiseReport,
}

impl LabelAssigner {
    #[must_use]
    pub fn new(noise: LabelNoise, seed: u64) -> Self {
        Self {
            noise,
            rng: ChaCha20Rng::seed_from_u64(seed),
            report: NoiseReport::default(),
        }
    }

    /// Label one record: 1 for High Risk.
    pub fn assign(&mut self, record: &PatientRecord, features: &EngineeredFeatures) -> u8 {
        let draws: [f64; 3] = [self.rng.gen(), self.rng.gen(), self.rng.gen()];
        let adjusted = adjusted_score(record, features);
        let mut label = threshold_label(adjusted);

        if draws[0] < self.noise.measurement_flip {
            label = 1 - label;
            self.report.measurement_flips += 1;
        }
        if is_borderline(adjusted) && draws[1] < self.noise.borderline_flip {
            label = 1 - label;
            self.report.borderline_flips += 1;
        }
        if record.prognosis != Prognosis::Recoverable && label == 0 && draws[2] < self.noise.chronic_upgrade {
            label = 1;
            self.report.chronic_upgrades += 1;
        }
        label
    }

    /// Label a whole dataset.
    ///
    /// # Errors
    /// Returns `Validation` if records and features differ in length.
    pub fn assign_all(
        &mut self,
        records: &[PatientRecord],
        features: &[EngineeredFeatures],
    ) -> Result<Vec<u8>, RecoveryError> {
        if records.len() != features.len() {
            return Err(RecoveryError::Validation(format!(
                "{} records but {} feature vectors",
                records.len(),
                features.len()
            )));
        }
        let labels: Vec<u8> = records
            .iter()
            .zip(features)
            .map(|(r, f)| self.assign(r, f))
            .collect();

        let positives = labels.iter().filter(|&&y| y == 1).count();
        tracing::info!(
            n = labels.len(),
            positive_rate = positives as f64 / labels.len().max(1) as f64,
            measurement_flips = self.report.measurement_flips,
            borderline_flips = self.report.borderline_flips,
            chronic_upgrades = self.report.chronic_upgrades,
            "Labels assigned"
        );
        Ok(labels)
    }

    #[must_use]
    pub fn report(&self) -> NoiseReport {
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::cohort::CohortGenerator;
    use crate::domain::engineer;
    use crate::domain::fixtures::*;

    fn dataset() -> (Vec<PatientRecord>, Vec<EngineeredFeatures>) {
        let records = CohortGenerator::new(5, 40)
            .expect("generator")
            .generate(800)
            .expect("records");
        let features = records.iter().map(|r| engineer(r).expect("features")).collect();
        (records, features)
    }

    #[test]
    fn test_labels_reproducible_with_seed() {
        let (records, features) = dataset();
        let a = LabelAssigner::new(LabelNoise::default(), 9)
            .assign_all(&records, &features)
            .expect("labels");
        let b = LabelAssigner::new(LabelNoise::default(), 9)
            .assign_all(&records, &features)
            .expect("labels");
        assert_eq!(a, b);
    }

    #[test]
    fn test_noise_free_labels_match_threshold() {
        let (records, features) = dataset();
        let mut assigner = LabelAssigner::new(LabelNoise::none(), 1);
        let labels = assigner.assign_all(&records, &features).expect("labels");
        for ((r, f), y) in records.iter().zip(&features).zip(&labels) {
            assert_eq!(*y, threshold_label(adjusted_score(r, f)));
        }
        assert_eq!(assigner.report(), NoiseReport::default());
    }

    #[test]
    fn test_noise_changes_some_labels() {
        let (records, features) = dataset();
        let clean = LabelAssigner::new(LabelNoise::none(), 2)
            .assign_all(&records, &features)
            .expect("labels");
        let mut noisy_assigner = LabelAssigner::new(LabelNoise::default(), 2);
        let noisy = noisy_assigner.assign_all(&records, &features).expect("labels");
        let changed = clean.iter().zip(&noisy).filter(|(a, b)| a != b).count();
        assert!(changed > 0);
        assert!((changed as f64) < 0.2 * clean.len() as f64);
        assert!(noisy_assigner.report().measurement_flips > 0);
    }

    #[test]
    fn test_chronic_upgrade_only_raises() {
        let noise = LabelNoise {
            chronic_upgrade: 1.0,
            ..LabelNoise::none()
        };
        let mut stable_chronic = stable_hip_patient();
        stable_chronic.prognosis = Prognosis::Chronic;
        let f = engineer(&stable_chronic).expect("features");
        assert_eq!(LabelAssigner::new(noise, 0).assign(&stable_chronic, &f), 1);

        let recoverable = stable_hip_patient();
        let f = engineer(&recoverable).expect("features");
        assert_eq!(LabelAssigner::new(noise, 0).assign(&recoverable, &f), 0);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let (records, features) = dataset();
        let mut assigner = LabelAssigner::new(LabelNoise::default(), 0);
        assert!(assigner.assign_all(&records, &features[1..]).is_err());
    }
}
