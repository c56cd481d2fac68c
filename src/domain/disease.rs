//! Disease profile table.
//!
//! 20 categories across the major ICD-10 body systems. Each profile carries
//! healthy/sick vital distributions, a prognosis class and a complication profile.
//! Parameter values are empirically chosen, not clinically validated.

use serde::{Deserialize, Serialize};

/// Coarse outcome trajectory attached to a disease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prognosis {
    /// Expected full or near-full recovery
    Recoverable,
    /// Ongoing management, partial recovery
    Chronic,
    /// Terminal, palliative or irreversible
    NonRecoverable,
}

impl Prognosis {
    pub const ALL: [Prognosis; 3] = [Self::Recoverable, Self::Chronic, Self::NonRecoverable];

    /// Ordinal encoding used as a model feature.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Recoverable => 0,
            Self::Chronic => 1,
            Self::NonRecoverable => 2,
        }
    }

    /// Probability that a generated patient is in the sick latent state.
    #[must_use]
    pub fn sick_probability(self) -> f64 {
        match self {
            Self::Recoverable => 0.35,
            Self::Chronic => 0.45,
            Self::NonRecoverable => 0.65,
        }
    }

    /// Baseline risk bonus added to the clinical score before thresholding.
    #[must_use]
    pub fn risk_bonus(self) -> f64 {
        match self {
            Self::Recoverable => 0.0,
            Self::Chronic => 0.5,
            Self::NonRecoverable => 1.5,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recoverable => "recoverable",
            Self::Chronic => "chronic",
            Self::NonRecoverable => "non_recoverable",
        }
    }

    /// Parse the snake_case class name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "recoverable" => Some(Self::Recoverable),
            "chronic" => Some(Self::Chronic),
            "non_recoverable" => Some(Self::NonRecoverable),
            _ => None,
        }
    }

    /// Decode the ordinal feature value.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.code() == code)
    }
}

impl std::fmt::Display for Prognosis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vitals tracked per disease with a healthy and a sick parameterization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vital {
    Temperature,
    HeartRate,
    SystolicBp,
    Spo2,
    SleepHours,
    Pain,
    Fatigue,
    Mobility,
}

impl Vital {
    pub const ALL: [Vital; 8] = [
        Self::Temperature,
        Self::HeartRate,
        Self::SystolicBp,
        Self::Spo2,
        Self::SleepHours,
        Self::Pain,
        Self::Fatigue,
        Self::Mobility,
    ];

    /// Physiologically plausible clamp range.
    #[must_use]
    pub fn range(self) -> (f64, f64) {
        match self {
            Self::Temperature => (94.0, 107.0),
            Self::HeartRate => (30.0, 200.0),
            Self::SystolicBp => (60.0, 220.0),
            Self::Spo2 => (60.0, 100.0),
            Self::SleepHours => (0.5, 12.0),
            Self::Pain | Self::Fatigue | Self::Mobility => (1.0, 10.0),
        }
    }

    /// Integer-valued vitals are rounded to whole units; the rest to 0.1.
    #[must_use]
    pub fn is_integer(self) -> bool {
        !matches!(self, Self::Temperature | Self::SleepHours)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::HeartRate => "heart_rate",
            Self::SystolicBp => "sbp",
            Self::Spo2 => "spo2",
            Self::SleepHours => "sleep_hours",
            Self::Pain => "pain_level",
            Self::Fatigue => "fatigue",
            Self::Mobility => "mobility_score",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Mean and standard deviation of a normal distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gaussian {
    pub mean: f64,
    pub std: f64,
}

/// Healthy and sick parameterization of one vital.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VitalPair {
    pub healthy: Gaussian,
    pub sick: Gaussian,
}

const fn pair(hm: f64, hs: f64, sm: f64, ss: f64) -> VitalPair {
    VitalPair {
        healthy: Gaussian { mean: hm, std: hs },
        sick: Gaussian { mean: sm, std: ss },
    }
}

/// Static per-disease physiological parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct DiseaseProfile {
    pub name: &'static str,
    pub system: &'static str,
    /// Relative cohort weight
    pub weight: f64,
    pub prognosis: Prognosis,
    /// Indexed by `Vital` order
    pub vitals: [VitalPair; 8],
    /// Swelling probability when sick
    pub swelling_sick: f64,
    /// Medication non-adherence probability when sick
    pub nonadherence_sick: f64,
    pub age_mean: f64,
    pub bmi_mean: f64,
    pub comorbidity_risk: f64,
}

impl DiseaseProfile {
    #[must_use]
    pub fn vital(&self, vital: Vital) -> &VitalPair {
        &self.vitals[vital.index()]
    }

    /// Collect validation failures for this profile.
    fn problems(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !(self.weight.is_finite() && self.weight > 0.0) {
            errors.push(format!("{}: weight {} must be positive", self.name, self.weight));
        }
        for vital in Vital::ALL {
            let p = self.vital(vital);
            for (state, g) in [("healthy", p.healthy), ("sick", p.sick)] {
                if !(g.mean.is_finite() && g.std.is_finite() && g.std > 0.0) {
                    errors.push(format!(
                        "{}: {} {} distribution ({}, {}) is invalid",
                        self.name,
                        state,
                        vital.name(),
                        g.mean,
                        g.std
                    ));
                }
            }
        }
        for (label, prob) in [
            ("swelling", self.swelling_sick),
            ("non-adherence", self.nonadherence_sick),
        ] {
            if !(0.0..=1.0).contains(&prob) {
                errors.push(format!("{}: {label} probability {prob} outside [0, 1]", self.name));
            }
        }
        if !(self.comorbidity_risk.is_finite() && self.comorbidity_risk > 0.0) {
            errors.push(format!(
                "{}: comorbidity risk {} must be positive",
                self.name, self.comorbidity_risk
            ));
        }
        errors
    }
}

/// Validate a profile table.
///
/// # Errors
/// Returns validation errors as a vector of strings.
pub fn validate_profiles(profiles: &[DiseaseProfile]) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = profiles.iter().flat_map(DiseaseProfile::problems).collect();

    let mut names: Vec<&str> = profiles.iter().map(|p| p.name).collect();
    names.sort_unstable();
    for w in names.windows(2) {
        if w[0] == w[1] {
            errors.push(format!("duplicate disease key {}", w[0]));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Look up a profile by key.
#[must_use]
pub fn disease(name: &str) -> Option<&'static DiseaseProfile> {
    DISEASES.iter().find(|d| d.name == name)
}

// Vital order: temperature, heart rate, sbp, spo2, sleep, pain, fatigue, mobility.
pub static DISEASES: [DiseaseProfile; 20] = [
    // Cardiovascular
    DiseaseProfile {
        name: "acute_mi",
        system: "cardiovascular",
        weight: 0.065,
        prognosis: Prognosis::Recoverable,
        vitals: [
            pair(98.4, 0.5, 99.8, 0.8),
            pair(68.0, 8.0, 105.0, 14.0), // beta-blocked baseline
            pair(125.0, 14.0, 148.0, 20.0),
            pair(97.0, 1.2, 93.0, 2.5),
            pair(6.5, 1.0, 4.0, 1.3),
            pair(3.0, 1.5, 7.0, 1.5),
            pair(4.0, 1.5, 8.0, 1.2),
            pair(6.0, 1.5, 2.0, 1.2),
        ],
        swelling_sick: 0.60,
        nonadherence_sick: 0.40,
        age_mean: 65.0,
        bmi_mean: 28.0,
        comorbidity_risk: 0.55,
    },
    DiseaseProfile {
        name: "heart_failure",
        system: "cardiovascular",
        weight: 0.055,
        prognosis: Prognosis::Chronic,
        vitals: [
            pair(98.4, 0.5, 99.5, 0.7),
            pair(74.0, 10.0, 108.0, 16.0),
            pair(118.0, 16.0, 92.0, 18.0), // decompensation
            pair(95.0, 1.5, 89.0, 3.5),
            pair(5.5, 1.2, 3.5, 1.5),
            pair(3.0, 1.5, 5.0, 1.8),
            pair(6.0, 1.5, 9.0, 0.8),
            pair(4.0, 1.5, 1.0, 0.8),
        ],
        swelling_sick: 0.85,
        nonadherence_sick: 0.50,
        age_mean: 72.0,
        bmi_mean: 30.0,
        comorbidity_risk: 0.75,
    },
    DiseaseProfile {
        name: "stroke",
        system: "neurological",
        weight: 0.055,
        prognosis: Prognosis::Chronic,
        vitals: [
            pair(98.5, 0.5, 100.2, 0.9),
            pair(76.0, 10.0, 98.0, 14.0),
            pair(135.0, 18.0, 162.0, 25.0),
            pair(96.0, 1.5, 92.0, 3.0),
            pair(6.0, 1.2, 3.2, 1.6),
            pair(3.0, 1.5, 6.0, 1.8),
            pair(6.0, 1.5, 9.0, 1.0),
            pair(3.0, 1.5, 1.0, 0.8),
        ],
        swelling_sick: 0.40,
        nonadherence_sick: 0.55,
        age_mean: 70.0,
        bmi_mean: 27.0,
        comorbidity_risk: 0.65,
    },
    // Oncology
    DiseaseProfile {
        name: "solid_tumor_resection",
        system: "oncology",
        weight: 0.055,
        prognosis: Prognosis::Recoverable,
        vitals: [
            pair(98.5, 0.5, 101.0, 1.0),
            pair(78.0, 9.0, 106.0, 15.0),
            pair(122.0, 14.0, 105.0, 20.0),
            pair(97.0, 1.2, 94.0, 2.5),
            pair(6.5, 1.0, 3.8, 1.3),
            pair(4.0, 1.5, 8.0, 1.2),
            pair(5.0, 1.5, 9.0, 0.8),
            pair(6.0, 1.5, 2.0, 1.2),
        ],
        swelling_sick: 0.55,
        nonadherence_sick: 0.45,
        age_mean: 58.0,
        bmi_mean: 25.0,
        comorbidity_risk: 0.50,
    },
    DiseaseProfile {
        name: "metastatic_cancer",
        system: "oncology",
        weight: 0.045,
        prognosis: Prognosis::NonRecoverable,
        vitals: [
            pair(98.8, 0.7, 101.5, 1.2), // persistent low-grade fever
            pair(84.0, 12.0, 112.0, 18.0),
            pair(110.0, 16.0, 95.0, 22.0),
            pair(95.0, 2.0, 88.0, 4.0),
            pair(5.5, 1.5, 2.5, 1.5),
            pair(6.0, 2.0, 9.0, 1.0),
            pair(7.0, 1.5, 10.0, 0.5),
            pair(3.0, 1.5, 1.0, 0.8),
        ],
        swelling_sick: 0.65,
        nonadherence_sick: 0.30,
        age_mean: 62.0,
        bmi_mean: 23.0,
        comorbidity_risk: 0.70,
    },
    DiseaseProfile {
        name: "hematologic_malignancy",
        system: "oncology",
        weight: 0.035,
        prognosis: Prognosis::Chronic,
        vitals: [
            pair(98.6, 0.6, 102.0, 1.3), // neutropenic fever
            pair(82.0, 10.0, 110.0, 15.0),
            pair(118.0, 14.0, 100.0, 18.0),
            pair(96.0, 1.5, 91.0, 3.0),
            pair(6.0, 1.2, 3.0, 1.5),
            pair(4.0, 2.0, 8.0, 1.5),
            pair(6.0, 1.5, 9.0, 0.8),
            pair(5.0, 1.5, 2.0, 1.2),
        ],
        swelling_sick: 0.50,
        nonadherence_sick: 0.55,
        age_mean: 55.0,
        bmi_mean: 24.0,
        comorbidity_risk: 0.60,
    },
    // Orthopedic
    DiseaseProfile {
        name: "hip_knee_replacement",
        system: "orthopedic",
        weight: 0.065,
        prognosis: Prognosis::Recoverable,
        vitals: [
            pair(98.6, 0.4, 100.0, 0.7),
            pair(74.0, 7.0, 96.0, 10.0),
            pair(128.0, 14.0, 138.0, 18.0),
            pair(97.0, 1.0, 95.0, 1.8),
            pair(7.0, 0.8, 4.5, 1.2),
            pair(4.0, 1.5, 8.0, 1.2),
            pair(4.0, 1.5, 7.0, 1.5),
            pair(5.0, 1.5, 2.0, 1.0),
        ],
        swelling_sick: 0.80,
        nonadherence_sick: 0.30,
        age_mean: 68.0,
        bmi_mean: 31.0,
        comorbidity_risk: 0.45,
    },
    DiseaseProfile {
        name: "spinal_surgery",
        system: "orthopedic",
        weight: 0.045,
        prognosis: Prognosis::Recoverable,
        vitals: [
            pair(98.5, 0.5, 100.3, 0.8),
            pair(76.0, 8.0, 100.0, 12.0),
            pair(126.0, 14.0, 140.0, 18.0),
            pair(97.0, 1.2, 94.0, 2.0),
            pair(6.5, 1.0, 4.0, 1.4),
            pair(5.0, 1.5, 9.0, 1.0),
            pair(4.0, 1.5, 7.0, 1.5),
            pair(4.0, 1.5, 1.0, 0.8),
        ],
        swelling_sick: 0.55,
        nonadherence_sick: 0.35,
        age_mean: 55.0,
        bmi_mean: 29.0,
        comorbidity_risk: 0.40,
    },
    // Respiratory
    DiseaseProfile {
        name: "pneumonia",
        system: "respiratory",
        weight: 0.060,
        prognosis: Prognosis::Recoverable,
        vitals: [
            pair(98.6, 0.5, 101.5, 1.1),
            pair(80.0, 10.0, 108.0, 14.0),
            pair(122.0, 14.0, 108.0, 20.0),
            pair(97.0, 1.2, 90.0, 4.0),
            pair(6.3, 1.0, 3.5, 1.4),
            pair(3.0, 1.5, 6.0, 1.8),
            pair(5.0, 1.5, 9.0, 1.0),
            pair(6.0, 1.5, 3.0, 1.5),
        ],
        swelling_sick: 0.35,
        nonadherence_sick: 0.35,
        age_mean: 62.0,
        bmi_mean: 27.0,
        comorbidity_risk: 0.55,
    },
    DiseaseProfile {
        name: "copd_exacerbation",
        system: "respiratory",
        weight: 0.050,
        prognosis: Prognosis::Chronic,
        vitals: [
            pair(98.6, 0.5, 100.5, 0.9),
            pair(82.0, 10.0, 110.0, 14.0),
            pair(130.0, 16.0, 145.0, 22.0),
            pair(93.0, 2.0, 85.0, 4.0), // lower COPD baseline
            pair(6.0, 1.2, 3.5, 1.5),
            pair(3.0, 1.5, 6.0, 1.8),
            pair(6.0, 1.5, 9.0, 0.8),
            pair(5.0, 1.5, 2.0, 1.2),
        ],
        swelling_sick: 0.50,
        nonadherence_sick: 0.45,
        age_mean: 68.0,
        bmi_mean: 26.0,
        comorbidity_risk: 0.70,
    },
    DiseaseProfile {
        name: "pulmonary_embolism",
        system: "respiratory",
        weight: 0.035,
        prognosis: Prognosis::Recoverable,
        vitals: [
            pair(98.5, 0.5, 100.2, 0.8),
            pair(78.0, 10.0, 112.0, 16.0),
            pair(122.0, 14.0, 100.0, 22.0),
            pair(96.0, 1.5, 88.0, 4.5),
            pair(6.5, 1.0, 4.0, 1.3),
            pair(3.0, 1.5, 7.0, 1.8),
            pair(4.0, 1.5, 8.0, 1.2),
            pair(5.0, 1.5, 2.0, 1.2),
        ],
        swelling_sick: 0.60,
        nonadherence_sick: 0.40,
        age_mean: 58.0,
        bmi_mean: 30.0,
        comorbidity_risk: 0.55,
    },
    // Endocrine / metabolic
    DiseaseProfile {
        name: "diabetic_ketoacidosis",
        system: "endocrine",
        weight: 0.040,
        prognosis: Prognosis::Recoverable,
        vitals: [
            pair(98.5, 0.5, 99.8, 1.0),
            pair(78.0, 10.0, 110.0, 14.0),
            pair(120.0, 14.0, 102.0, 20.0),
            pair(98.0, 1.0, 95.0, 2.0),
            pair(7.0, 0.8, 4.5, 1.3),
            pair(2.0, 1.5, 6.0, 1.8),
            pair(3.0, 1.5, 8.0, 1.2),
            pair(7.0, 1.5, 4.0, 1.5),
        ],
        swelling_sick: 0.30,
        nonadherence_sick: 0.70,
        age_mean: 40.0,
        bmi_mean: 28.0,
        comorbidity_risk: 0.60,
    },
    DiseaseProfile {
        name: "chronic_kidney_disease",
        system: "renal",
        weight: 0.040,
        prognosis: Prognosis::NonRecoverable,
        vitals: [
            pair(98.4, 0.5, 99.5, 0.8),
            pair(76.0, 10.0, 100.0, 14.0),
            pair(142.0, 18.0, 168.0, 25.0),
            pair(96.0, 1.5, 91.0, 3.0),
            pair(5.5, 1.2, 3.5, 1.5),
            pair(3.0, 1.5, 6.0, 1.8),
            pair(6.0, 1.5, 9.0, 0.8),
            pair(5.0, 1.5, 3.0, 1.2),
        ],
        swelling_sick: 0.75,
        nonadherence_sick: 0.45,
        age_mean: 65.0,
        bmi_mean: 29.0,
        comorbidity_risk: 0.80,
    },
    // Gastrointestinal / hepatic
    DiseaseProfile {
        name: "gi_surgery",
        system: "gastrointestinal",
        weight: 0.045,
        prognosis: Prognosis::Recoverable,
        vitals: [
            pair(98.6, 0.5, 100.8, 0.9),
            pair(76.0, 8.0, 102.0, 12.0),
            pair(122.0, 14.0, 110.0, 18.0),
            pair(97.0, 1.2, 94.0, 2.0),
            pair(6.5, 1.0, 4.0, 1.3),
            pair(4.0, 1.5, 8.0, 1.2),
            pair(4.0, 1.5, 8.0, 1.2),
            pair(6.0, 1.5, 3.0, 1.2),
        ],
        swelling_sick: 0.45,
        nonadherence_sick: 0.35,
        age_mean: 55.0,
        bmi_mean: 27.0,
        comorbidity_risk: 0.45,
    },
    DiseaseProfile {
        name: "liver_cirrhosis",
        system: "hepatic",
        weight: 0.035,
        prognosis: Prognosis::NonRecoverable,
        vitals: [
            pair(98.6, 0.6, 100.0, 1.0),
            pair(80.0, 10.0, 106.0, 14.0),
            pair(108.0, 18.0, 88.0, 22.0), // portal hypertension
            pair(95.0, 2.0, 89.0, 4.0),
            pair(5.5, 1.5, 3.0, 1.5),
            pair(4.0, 2.0, 7.0, 1.8),
            pair(7.0, 1.5, 10.0, 0.5),
            pair(4.0, 1.5, 1.0, 0.8),
        ],
        swelling_sick: 0.80,
        nonadherence_sick: 0.50,
        age_mean: 58.0,
        bmi_mean: 26.0,
        comorbidity_risk: 0.75,
    },
    // Infectious disease
    DiseaseProfile {
        name: "sepsis",
        system: "infectious",
        weight: 0.045,
        prognosis: Prognosis::Recoverable,
        vitals: [
            pair(98.6, 0.5, 102.5, 1.5),
            pair(78.0, 8.0, 118.0, 18.0),
            pair(122.0, 14.0, 90.0, 25.0), // septic shock
            pair(97.0, 1.2, 90.0, 4.5),
            pair(6.5, 1.0, 3.0, 1.5),
            pair(3.0, 1.5, 7.0, 1.8),
            pair(4.0, 1.5, 9.0, 0.8),
            pair(6.0, 1.5, 1.0, 0.8),
        ],
        swelling_sick: 0.55,
        nonadherence_sick: 0.25,
        age_mean: 60.0,
        bmi_mean: 27.0,
        comorbidity_risk: 0.65,
    },
    DiseaseProfile {
        name: "post_covid",
        system: "infectious",
        weight: 0.045,
        prognosis: Prognosis::Chronic,
        vitals: [
            pair(98.6, 0.5, 99.5, 0.8),
            pair(84.0, 12.0, 106.0, 16.0), // POTS-like
            pair(120.0, 14.0, 110.0, 18.0),
            pair(96.0, 1.5, 92.0, 3.0),
            pair(5.5, 1.5, 3.0, 1.8),
            pair(3.0, 2.0, 7.0, 1.8),
            pair(6.0, 1.5, 9.0, 0.8),
            pair(6.0, 1.5, 3.0, 1.5),
        ],
        swelling_sick: 0.35,
        nonadherence_sick: 0.30,
        age_mean: 48.0,
        bmi_mean: 28.0,
        comorbidity_risk: 0.50,
    },
    // Mental health
    DiseaseProfile {
        name: "psychiatric_crisis",
        system: "mental_health",
        weight: 0.035,
        prognosis: Prognosis::Chronic,
        vitals: [
            pair(98.6, 0.5, 98.9, 0.6),
            pair(80.0, 12.0, 96.0, 16.0),
            pair(122.0, 16.0, 132.0, 20.0),
            pair(98.0, 0.8, 97.0, 1.2),
            pair(5.0, 1.8, 2.0, 1.5), // severe insomnia
            pair(3.0, 2.0, 5.0, 2.0),
            pair(6.0, 1.8, 8.0, 1.5),
            pair(5.0, 2.0, 3.0, 2.0),
        ],
        swelling_sick: 0.10,
        nonadherence_sick: 0.65,
        age_mean: 38.0,
        bmi_mean: 26.0,
        comorbidity_risk: 0.50,
    },
    // Geriatric / multi-system
    DiseaseProfile {
        name: "frailty_syndrome",
        system: "geriatric",
        weight: 0.040,
        prognosis: Prognosis::NonRecoverable,
        vitals: [
            pair(97.8, 0.7, 99.0, 1.0),
            pair(72.0, 12.0, 96.0, 16.0),
            pair(138.0, 20.0, 158.0, 28.0),
            pair(95.0, 2.0, 90.0, 3.5),
            pair(5.0, 1.5, 3.0, 1.5),
            pair(4.0, 2.0, 7.0, 1.8),
            pair(7.0, 1.5, 9.0, 0.8),
            pair(3.0, 1.5, 1.0, 0.8),
        ],
        swelling_sick: 0.60,
        nonadherence_sick: 0.60,
        age_mean: 82.0,
        bmi_mean: 23.0,
        comorbidity_risk: 0.90,
    },
    DiseaseProfile {
        name: "traumatic_injury",
        system: "trauma",
        weight: 0.040,
        prognosis: Prognosis::Recoverable,
        vitals: [
            pair(98.6, 0.5, 100.5, 0.9),
            pair(78.0, 10.0, 108.0, 15.0),
            pair(124.0, 14.0, 106.0, 22.0),
            pair(97.0, 1.2, 93.0, 3.0),
            pair(6.5, 1.0, 3.8, 1.4),
            pair(5.0, 1.8, 9.0, 0.8),
            pair(4.0, 1.5, 8.0, 1.2),
            pair(5.0, 1.5, 1.0, 0.8),
        ],
        swelling_sick: 0.65,
        nonadherence_sick: 0.30,
        age_mean: 38.0,
        bmi_mean: 26.0,
        comorbidity_risk: 0.35,
    },
];
