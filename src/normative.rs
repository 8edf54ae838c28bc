//! Converts a mean simple reaction time into a normative "biological age".
//!
//! The estimate compares the measured mean against the normative mean for
//! the subject's age and sex. The ratio between the two is the tempo of
//! biological development: below 1 the subject reacts faster than peers,
//! above 1 slower. Dividing chronological age by that ratio gives the
//! biological age.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::util::round2;

pub const MIN_TABLE_AGE: i32 = 7;
pub const MAX_TABLE_AGE: i32 = 16;

const ACCELERATED_BELOW: f64 = 0.95;
const DELAYED_ABOVE: f64 = 1.10;

// Normative mean simple visual reaction time (ms), ages 7..=16.
const MALE_NORMS: [f64; 10] = [
    340.50, 322.10, 305.80, 290.40, 275.90, 262.26, 251.30, 242.70, 236.10, 231.40,
];
const FEMALE_NORMS: [f64; 10] = [
    352.80, 333.60, 316.20, 300.10, 285.70, 273.40, 263.90, 256.20, 250.80, 247.30,
];

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
    /// Fallback bucket: the midpoint of the male and female norms
    #[default]
    Unspecified,
}

impl Sex {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "male" | "m" | "boy" => Some(Self::Male),
            "female" | "f" | "girl" => Some(Self::Female),
            "unspecified" | "other" => Some(Self::Unspecified),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Verdict {
    Accelerated,
    Normal,
    Delayed,
}

impl Verdict {
    fn from_ratio(ratio: f64) -> Self {
        if ratio < ACCELERATED_BELOW {
            Verdict::Accelerated
        } else if ratio > DELAYED_ABOVE {
            Verdict::Delayed
        } else {
            Verdict::Normal
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormativeResult {
    /// The age that was asked about, before clamping into the table range
    pub chronological_age: i32,
    pub biological_age: f64,
    /// Actual over normative time, rounded to two decimals. The verdict is
    /// taken from the unrounded ratio, so 0.9499 shows as 0.95 yet is
    /// `Accelerated`.
    pub ratio: f64,
    pub normative_ms: f64,
    pub verdict: Verdict,
}

impl fmt::Display for NormativeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "age {} | biological age {:.2} | tempo {:.2} (norm {:.2}ms) | {}",
            self.chronological_age, self.biological_age, self.ratio, self.normative_ms, self.verdict
        )
    }
}

/// Normative constant for an age already inside the table range.
pub fn normative_constant(age: i32, sex: Sex) -> Option<f64> {
    let idx = usize::try_from(age - MIN_TABLE_AGE).ok()?;
    match sex {
        Sex::Male => MALE_NORMS.get(idx).copied(),
        Sex::Female => FEMALE_NORMS.get(idx).copied(),
        Sex::Unspecified => {
            let m = MALE_NORMS.get(idx)?;
            let f = FEMALE_NORMS.get(idx)?;
            Some((m + f) / 2.0)
        }
    }
}

pub fn estimate(actual_average_ms: f64, age: i32, sex: Sex) -> Option<NormativeResult> {
    if !actual_average_ms.is_finite() || actual_average_ms <= 0.0 {
        return None;
    }
    let lookup_age = age.clamp(MIN_TABLE_AGE, MAX_TABLE_AGE);
    let normative_ms = normative_constant(lookup_age, sex)?;

    let ratio = actual_average_ms / normative_ms;
    let biological_age = age as f64 / ratio;

    Some(NormativeResult {
        chronological_age: age,
        biological_age: round2(biological_age),
        ratio: round2(ratio),
        normative_ms: round2(normative_ms),
        verdict: Verdict::from_ratio(ratio),
    })
}

/// Same as [`estimate`], for a free-form sex label. Unknown labels give `None`.
pub fn estimate_for_label(actual_average_ms: f64, age: i32, sex: &str) -> Option<NormativeResult> {
    estimate(actual_average_ms, age, Sex::from_label(sex)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_point_maps_to_chronological_age() {
        let r = estimate(262.26, 12, Sex::Male).unwrap();
        assert_eq!(r.chronological_age, 12);
        assert_eq!(r.biological_age, 12.0);
        assert_eq!(r.ratio, 1.0);
        assert_eq!(r.normative_ms, 262.26);
        assert_eq!(r.verdict, Verdict::Normal);
    }

    #[test]
    fn faster_than_norm_is_accelerated() {
        let r = estimate(200.0, 12, Sex::Male).unwrap();
        assert_eq!(r.verdict, Verdict::Accelerated);
        assert!(r.biological_age > 12.0);
        assert_eq!(r.ratio, 0.76);
    }

    #[test]
    fn slower_than_norm_is_delayed() {
        let r = estimate(350.0, 12, Sex::Female).unwrap();
        assert_eq!(r.verdict, Verdict::Delayed);
        assert!(r.biological_age < 12.0);
    }

    #[test]
    fn verdict_thresholds_are_exclusive() {
        assert_eq!(Verdict::from_ratio(0.95), Verdict::Normal);
        assert_eq!(Verdict::from_ratio(1.10), Verdict::Normal);
        assert_eq!(Verdict::from_ratio(0.9499), Verdict::Accelerated);
        assert_eq!(Verdict::from_ratio(1.1001), Verdict::Delayed);
    }

    #[test]
    fn ages_outside_table_use_boundary_bucket() {
        let young = estimate(340.50, 5, Sex::Male).unwrap();
        assert_eq!(young.chronological_age, 5);
        assert_eq!(young.normative_ms, 340.5);
        assert_eq!(young.biological_age, 5.0);

        let old = estimate(231.40, 30, Sex::Male).unwrap();
        assert_eq!(old.chronological_age, 30);
        assert_eq!(old.normative_ms, 231.4);
        assert_eq!(old.biological_age, 30.0);
    }

    #[test]
    fn unspecified_uses_midpoint_of_norms() {
        let n = normative_constant(12, Sex::Unspecified).unwrap();
        assert!((n - (262.26 + 273.40) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn table_covers_every_age_in_range() {
        for age in MIN_TABLE_AGE..=MAX_TABLE_AGE {
            for sex in [Sex::Male, Sex::Female, Sex::Unspecified] {
                assert!(normative_constant(age, sex).is_some(), "{age} {sex}");
            }
        }
        assert_eq!(normative_constant(MAX_TABLE_AGE + 1, Sex::Male), None);
        assert_eq!(normative_constant(MIN_TABLE_AGE - 1, Sex::Male), None);
    }

    #[test]
    fn non_positive_average_has_no_estimate() {
        assert_eq!(estimate(0.0, 12, Sex::Male), None);
        assert_eq!(estimate(-10.0, 12, Sex::Male), None);
        assert_eq!(estimate(f64::NAN, 12, Sex::Male), None);
    }

    #[test]
    fn labels_parse_case_insensitively() {
        assert_eq!(Sex::from_label(" Male "), Some(Sex::Male));
        assert_eq!(Sex::from_label("GIRL"), Some(Sex::Female));
        assert_eq!(Sex::from_label("other"), Some(Sex::Unspecified));
        assert_eq!(Sex::from_label("robot"), None);
    }

    #[test]
    fn unknown_label_has_no_estimate() {
        assert!(estimate_for_label(262.26, 12, "male").is_some());
        assert_eq!(estimate_for_label(262.26, 12, "robot"), None);
    }

    #[test]
    fn display_uses_two_decimals() {
        let r = estimate(262.26, 12, Sex::Male).unwrap();
        assert_eq!(
            r.to_string(),
            "age 12 | biological age 12.00 | tempo 1.00 (norm 262.26ms) | normal"
        );
    }

    #[test]
    fn verdict_uses_unrounded_ratio() {
        // 249.12 / 262.26 = 0.94990...
        let n = estimate(249.12, 12, Sex::Male).unwrap();
        assert_eq!(n.ratio, 0.95);
        assert_eq!(n.verdict, Verdict::Accelerated);
    }
}
