//! Synthetic cohort generation.
//!
//! Each disease contributes a cohort sized by its weight (with a floor). Every
//! patient first draws a latent sick/healthy state, then all vitals from the
//! matching profile distribution.

use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use statrs::distribution::{Normal, Poisson};

use crate::domain::disease::validate_profiles;
use crate::domain::{DiseaseProfile, PatientRecord, Vital, DISEASES};
use crate::RecoveryError;

/// Previous-minus-current deltas skewed toward a higher previous value.
const RISING: ([i32; 5], [f64; 5]) = ([-1, 0, 1, 2, 3], [0.10, 0.20, 0.30, 0.25, 0.15]);
/// Previous-minus-current deltas skewed toward a lower previous value.
const FALLING: ([i32; 5], [f64; 5]) = ([-3, -2, -1, 0, 1], [0.20, 0.30, 0.30, 0.15, 0.05]);

const HEALTHY_SWELLING: f64 = 0.10;
const HEALTHY_NONADHERENCE: f64 = 0.08;
const AGE_STD: f64 = 12.0;
const BMI_STD: f64 = 5.0;

struct DeltaTable {
    values: [i32; 5],
    index: WeightedIndex<f64>,
}

impl DeltaTable {
    fn new((values, weights): ([i32; 5], [f64; 5])) -> Result<Self, RecoveryError> {
        let index = WeightedIndex::new(weights)
            .map_err(|e| RecoveryError::Validation(format!("bad delta weights: {e}")))?;
        Ok(Self { values, index })
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        f64::from(self.values[self.index.sample(rng)])
    }
}

fn normal(mean: f64, std: f64) -> Result<Normal, RecoveryError> {
    Normal::new(mean, std).map_err(|e| RecoveryError::Validation(format!("normal({mean}, {std}): {e}")))
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Seeded generator for the multi-disease cohort.
pub struct CohortGenerator {
    rng: ChaCha20Rng,
    min_per_disease: usize,
    rising: DeltaTable,
    falling: DeltaTable,
}

impl CohortGenerator {
    /// # Errors
    /// Returns `Validation` if the static tables are inconsistent.
    pub fn new(seed: u64, min_per_disease: usize) -> Result<Self, RecoveryError> {
        Ok(Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
            min_per_disease,
            rising: DeltaTable::new(RISING)?,
            falling: DeltaTable::new(FALLING)?,
        })
    }

    /// Records generated for `profile` out of `n_total`.
    #[must_use]
    pub fn cohort_size(&self, profile: &DiseaseProfile, n_total: usize) -> usize {
        let share = (n_total as f64 * profile.weight).round() as usize;
        share.max(self.min_per_disease)
    }

    /// Generate the full shuffled dataset over all diseases.
    ///
    /// # Errors
    /// Returns `Validation` if the disease table fails validation, or
    /// `EmptyDataset` if every cohort is empty.
    pub fn generate(&mut self, n_total: usize) -> Result<Vec<PatientRecord>, RecoveryError> {
        validate_profiles(&DISEASES).map_err(|errors| RecoveryError::Validation(errors.join("; ")))?;

        let mut records = Vec::with_capacity(n_total.max(DISEASES.len() * self.min_per_disease));
        for profile in &DISEASES {
            let n = self.cohort_size(profile, n_total);
            tracing::debug!(
                disease = profile.name,
                n,
                prognosis = %profile.prognosis,
                system = profile.system,
                "Generating cohort"
            );
            records.extend(self.generate_cohort(profile, n)?);
        }
        if records.is_empty() {
            return Err(RecoveryError::EmptyDataset("no records generated".into()));
        }
        records.shuffle(&mut self.rng);

        tracing::info!(
            total = records.len(),
            diseases = DISEASES.len(),
            "Cohort generated"
        );
        Ok(records)
    }

    /// Generate `n` patients for one disease.
    ///
    /// # Errors
    /// Returns `Validation` if the profile parameters cannot form distributions.
    pub fn generate_cohort(
        &mut self,
        profile: &DiseaseProfile,
        n: usize,
    ) -> Result<Vec<PatientRecord>, RecoveryError> {
        let mut vitals = Vec::with_capacity(Vital::ALL.len());
        for vital in Vital::ALL {
            let pair = profile.vital(vital);
            vitals.push((
                vital,
                normal(pair.healthy.mean, pair.healthy.std)?,
                normal(pair.sick.mean, pair.sick.std)?,
            ));
        }
        let age = normal(profile.age_mean, AGE_STD)?;
        let bmi = normal(profile.bmi_mean, BMI_STD)?;
        let comorbidities = Poisson::new(3.0 * profile.comorbidity_risk)
            .map_err(|e| RecoveryError::Validation(format!("{}: {e}", profile.name)))?;
        let sick_probability = profile.prognosis.sick_probability();

        let mut cohort = Vec::with_capacity(n);
        for _ in 0..n {
            let rng = &mut self.rng;
            let sick = rng.gen::<f64>() < sick_probability;

            let mut values = [0.0; 8];
            for (slot, (vital, healthy, sick_dist)) in values.iter_mut().zip(&vitals) {
                let raw = if sick { sick_dist.sample(rng) } else { healthy.sample(rng) };
                let (lo, hi) = vital.range();
                let clamped = raw.clamp(lo, hi);
                *slot = if vital.is_integer() { clamped.round() } else { round1(clamped) };
            }
            let [temperature, heart_rate, sbp, spo2, sleep_hours, pain_level, fatigue, mobility_score] =
                values;

            let days_since_discharge = rng.gen_range(1..=30);
            let appetite = if sick {
                f64::from(rng.gen_range(1_u32..=4))
            } else {
                f64::from(rng.gen_range(5_u32..=10))
            };
            let swelling_p = if sick { profile.swelling_sick } else { HEALTHY_SWELLING };
            let swelling = rng.gen_bool(swelling_p);
            let nonadherence_p = if sick { profile.nonadherence_sick } else { HEALTHY_NONADHERENCE };
            let medication_adherence = !rng.gen_bool(nonadherence_p);

            let age = age.sample(rng).clamp(18.0, 99.0).trunc();
            let bmi = round1(bmi.sample(rng).clamp(14.0, 55.0));
            let comorbidity_count = comorbidities.sample(rng) as u32;

            let (pain_delta, mobility_delta) = if sick {
                (&self.rising, &self.falling)
            } else {
                (&self.falling, &self.rising)
            };
            let prev_pain_level = (pain_level + pain_delta.sample(rng)).clamp(1.0, 10.0);
            let prev_mobility_score = (mobility_score + mobility_delta.sample(rng)).clamp(1.0, 10.0);

            cohort.push(PatientRecord {
                disease: profile.name.to_string(),
                system: profile.system.to_string(),
                prognosis: profile.prognosis,
                days_since_discharge,
                pain_level,
                temperature,
                heart_rate,
                sbp,
                spo2,
                sleep_hours,
                fatigue,
                appetite,
                mobility_score,
                swelling,
                medication_adherence,
                age,
                bmi,
                comorbidity_count,
                prev_pain_level,
                prev_mobility_score,
                latent_sick: sick,
            });
        }
        Ok(cohort)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{disease, Prognosis};

    #[test]
    fn test_vitals_within_clamp_ranges() {
        let mut gen = CohortGenerator::new(42, 100).expect("generator");
        let records = gen.generate(4_000).expect("generate");
        for r in &records {
            let checks = [
                (Vital::Temperature, r.temperature),
                (Vital::HeartRate, r.heart_rate),
                (Vital::SystolicBp, r.sbp),
                (Vital::Spo2, r.spo2),
                (Vital::SleepHours, r.sleep_hours),
                (Vital::Pain, r.pain_level),
                (Vital::Fatigue, r.fatigue),
                (Vital::Mobility, r.mobility_score),
            ];
            for (vital, value) in checks {
                let (lo, hi) = vital.range();
                assert!((lo..=hi).contains(&value), "{} = {value}", vital.name());
            }
            assert!((1..=30).contains(&r.days_since_discharge));
            assert!((18.0..=99.0).contains(&r.age));
            assert!((14.0..=55.0).contains(&r.bmi));
            assert!((1.0..=10.0).contains(&r.prev_pain_level));
            assert!((1.0..=10.0).contains(&r.prev_mobility_score));
            assert!(r.validate().is_ok());
        }
    }

    #[test]
    fn test_cohort_sizes_respect_floor() {
        let n_total = 20_000;
        let mut gen = CohortGenerator::new(1, 500).expect("generator");
        let records = gen.generate(n_total).expect("generate");
        for profile in &DISEASES {
            let count = records.iter().filter(|r| r.disease == profile.name).count();
            let expected = 500.max((n_total as f64 * profile.weight).round() as usize);
            assert_eq!(count, expected, "{}", profile.name);
        }
    }

    #[test]
    fn test_same_seed_same_cohort() {
        let a = CohortGenerator::new(7, 50).expect("generator").generate(1_000).expect("a");
        let b = CohortGenerator::new(7, 50).expect("generator").generate(1_000).expect("b");
        assert_eq!(a, b);
        let c = CohortGenerator::new(8, 50).expect("generator").generate(1_000).expect("c");
        assert_ne!(a, c);
    }

    #[test]
    fn test_sick_rate_tracks_prognosis() {
        let mut gen = CohortGenerator::new(3, 0).expect("generator");
        let profile = disease("metastatic_cancer").expect("profile");
        assert_eq!(profile.prognosis, Prognosis::NonRecoverable);
        let cohort = gen.generate_cohort(profile, 4_000).expect("cohort");
        let rate = cohort.iter().filter(|r| r.is_latent_sick()).count() as f64 / 4_000.0;
        assert!((rate - 0.65).abs() < 0.03, "rate {rate}");

        let sick_appetite = cohort
            .iter()
            .filter(|r| r.is_latent_sick())
            .all(|r| (1.0..=4.0).contains(&r.appetite));
        assert!(sick_appetite);
    }

    fn mean<'a>(records: impl Iterator<Item = &'a PatientRecord>, value: impl Fn(&PatientRecord) -> f64) -> f64 {
        let (sum, n) = records.fold((0.0, 0_usize), |(sum, n), r| (sum + value(r), n + 1));
        sum / n.max(1) as f64
    }

    fn kidney_cohort(seed: u64, n: usize) -> Vec<PatientRecord> {
        let profile = disease("chronic_kidney_disease").expect("profile");
        CohortGenerator::new(seed, 0)
            .expect("generator")
            .generate_cohort(profile, n)
            .expect("cohort")
    }

    #[test]
    fn test_comorbidity_count_follows_risk() {
        let profile = disease("chronic_kidney_disease").expect("profile");
        assert!(profile.comorbidity_risk >= 0.8);
        let cohort = kidney_cohort(21, 5_000);
        let observed = mean(cohort.iter(), |r| f64::from(r.comorbidity_count));
        let expected = 3.0 * profile.comorbidity_risk;
        assert!((observed - expected).abs() < 0.2, "mean {observed}, expected {expected}");
    }

    #[test]
    fn test_trend_direction_depends_on_latent_state() {
        let cohort = kidney_cohort(22, 5_000);
        let sick = || cohort.iter().filter(|r| r.is_latent_sick());
        let healthy = || cohort.iter().filter(|r| !r.is_latent_sick());
        let pain_change = |r: &PatientRecord| r.pain_level - r.prev_pain_level;
        let mobility_change = |r: &PatientRecord| r.mobility_score - r.prev_mobility_score;

        // sick patients had less pain and more mobility last cycle
        let sick_pain = mean(sick(), pain_change);
        let healthy_pain = mean(healthy(), pain_change);
        assert!(sick_pain < -0.5 && healthy_pain > 0.5, "pain {sick_pain} vs {healthy_pain}");

        let sick_mobility = mean(sick(), mobility_change);
        let healthy_mobility = mean(healthy(), mobility_change);
        assert!(
            sick_mobility > 0.5 && healthy_mobility < -0.5,
            "mobility {sick_mobility} vs {healthy_mobility}"
        );
    }

    #[test]
    fn test_healthy_patients_use_baseline_rates() {
        let cohort = kidney_cohort(23, 5_000);
        let healthy: Vec<&PatientRecord> = cohort.iter().filter(|r| !r.is_latent_sick()).collect();
        assert!(healthy.len() > 1_000);

        let rate = |hit: fn(&PatientRecord) -> bool| {
            healthy.iter().filter(|r| hit(r)).count() as f64 / healthy.len() as f64
        };
        let swelling = rate(|r| r.swelling);
        let nonadherence = rate(|r| !r.medication_adherence);
        assert!((swelling - HEALTHY_SWELLING).abs() < 0.03, "swelling {swelling}");
        assert!((nonadherence - HEALTHY_NONADHERENCE).abs() < 0.03, "nonadherence {nonadherence}");
        assert!(healthy.iter().all(|r| (5.0..=10.0).contains(&r.appetite)));

        // sick swelling follows the profile, well above baseline
        let profile = disease("chronic_kidney_disease").expect("profile");
        let sick: Vec<&PatientRecord> = cohort.iter().filter(|r| r.is_latent_sick()).collect();
        let sick_swelling = sick.iter().filter(|r| r.swelling).count() as f64 / sick.len() as f64;
        assert!((sick_swelling - profile.swelling_sick).abs() < 0.03, "sick swelling {sick_swelling}");
        assert!(sick.iter().all(|r| (1.0..=4.0).contains(&r.appetite)));
    }
}
