//! Body-composition formulas.
//!
//! Given weight, height and skinfold thicknesses this module derives BMI,
//! body-fat percentage, fat and lean mass, and waist-hip ratio.
//!
//! Body fat is estimated by one of several skinfold protocols. Each protocol
//! needs a fixed set of sites (which may depend on sex). When any required
//! site is missing or not positive the percentage is exactly `0.0`; callers
//! rely on that value rather than an error.

use crate::patient::Gender;
use serde::{Deserialize, Serialize};

/// A skinfold measurement site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SkinfoldSite {
    Chest,
    Midaxillary,
    Triceps,
    Subscapular,
    Abdominal,
    Suprailiac,
    Thigh,
    Biceps,
}

/// Skinfold thicknesses in millimetres.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skinfolds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chest: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midaxillary: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triceps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscapular: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abdominal: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suprailiac: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thigh: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub biceps: Option<f64>,
}

impl Skinfolds {
    pub fn get(&self, site: SkinfoldSite) -> Option<f64> {
        match site {
            SkinfoldSite::Chest => self.chest,
            SkinfoldSite::Midaxillary => self.midaxillary,
            SkinfoldSite::Triceps => self.triceps,
            SkinfoldSite::Subscapular => self.subscapular,
            SkinfoldSite::Abdominal => self.abdominal,
            SkinfoldSite::Suprailiac => self.suprailiac,
            SkinfoldSite::Thigh => self.thigh,
            SkinfoldSite::Biceps => self.biceps,
        }
    }

    /// Sum of the given sites, or `None` if any is absent or not positive.
    pub fn sum_of(&self, sites: &[SkinfoldSite]) -> Option<f64> {
        sites.iter().try_fold(0.0, |acc, site| {
            self.get(*site)
                .filter(|v| v.is_finite() && *v > 0.0)
                .map(|v| acc + v)
        })
    }
}

/// Raw measurements taken at a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurements {
    pub weight_kg: f64,
    /// Metres or centimetres; disambiguated by magnitude
    pub height: f64,
    #[serde(default)]
    pub waist_cm: Option<f64>,
    #[serde(default)]
    pub hip_cm: Option<f64>,
    #[serde(default)]
    pub skinfolds: Skinfolds,
}

/// Skinfold regression used to estimate body density or fat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkinfoldProtocol {
    #[default]
    JacksonPollock7,
    JacksonPollock3,
    DurninWomersley,
    Faulkner,
}

impl SkinfoldProtocol {
    /// Sites this protocol needs for the given sex.
    pub fn required_sites(self, gender: Gender) -> &'static [SkinfoldSite] {
        use SkinfoldSite::*;
        match self {
            SkinfoldProtocol::JacksonPollock7 => &[
                Chest,
                Midaxillary,
                Triceps,
                Subscapular,
                Abdominal,
                Suprailiac,
                Thigh,
            ],
            SkinfoldProtocol::JacksonPollock3 => match gender {
                Gender::Male => &[Chest, Abdominal, Thigh],
                _ => &[Triceps, Suprailiac, Thigh],
            },
            SkinfoldProtocol::DurninWomersley => &[Biceps, Triceps, Subscapular, Suprailiac],
            SkinfoldProtocol::Faulkner => &[Triceps, Subscapular, Suprailiac, Abdominal],
        }
    }
}

/// Derived body composition for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyComposition {
    pub bmi: f64,
    pub body_fat_percent: f64,
    pub fat_mass_kg: f64,
    pub lean_mass_kg: f64,
    pub waist_hip_ratio: f64,
}

/// Height in metres. Values above 3 are taken as centimetres.
pub fn normalize_height_m(height: f64) -> f64 {
    if height > 3.0 {
        height / 100.0
    } else {
        height
    }
}

/// Body-mass index, or 0 when weight or height is unusable.
pub fn bmi(weight_kg: f64, height: f64) -> f64 {
    let h = normalize_height_m(height);
    let usable = h.is_finite() && h > 0.0 && weight_kg.is_finite() && weight_kg > 0.0;
    if !usable {
        return 0.0;
    }
    weight_kg / (h * h)
}

/// Siri's conversion from body density to fat percentage.
pub fn siri(density: f64) -> f64 {
    (4.95 / density - 4.5) * 100.0
}

/// Body-fat percentage for the protocol, or exactly 0 on incomplete folds.
pub fn body_fat_percent(
    protocol: SkinfoldProtocol,
    skinfolds: &Skinfolds,
    gender: Gender,
    age: u32,
) -> f64 {
    let Some(sum) = skinfolds.sum_of(protocol.required_sites(gender)) else {
        return 0.0;
    };
    let age = f64::from(age);
    let male = gender == Gender::Male;

    let percent = match protocol {
        SkinfoldProtocol::JacksonPollock7 => {
            let density = if male {
                1.112 - 0.00043499 * sum + 0.00000055 * sum * sum - 0.00028826 * age
            } else {
                1.097 - 0.00046971 * sum + 0.00000056 * sum * sum - 0.00012828 * age
            };
            siri(density)
        }
        SkinfoldProtocol::JacksonPollock3 => {
            let density = if male {
                1.10938 - 0.0008267 * sum + 0.0000016 * sum * sum - 0.0002574 * age
            } else {
                1.0994921 - 0.0009929 * sum + 0.0000023 * sum * sum - 0.0001392 * age
            };
            siri(density)
        }
        SkinfoldProtocol::DurninWomersley => {
            let (c, m) = durnin_womersley_coefficients(male, age);
            siri(c - m * sum.log10())
        }
        SkinfoldProtocol::Faulkner => sum * 0.153 + 5.783,
    };

    if percent.is_finite() {
        percent.max(0.0)
    } else {
        0.0
    }
}

// Intercept and slope by sex and age bracket.
fn durnin_womersley_coefficients(male: bool, age: f64) -> (f64, f64) {
    let table: [(f64, f64); 6] = if male {
        [
            (1.1533, 0.0643),
            (1.1620, 0.0630),
            (1.1631, 0.0632),
            (1.1422, 0.0544),
            (1.1620, 0.0700),
            (1.1715, 0.0779),
        ]
    } else {
        [
            (1.1369, 0.0598),
            (1.1549, 0.0678),
            (1.1599, 0.0717),
            (1.1423, 0.0632),
            (1.1333, 0.0612),
            (1.1339, 0.0645),
        ]
    };
    let bracket = match age {
        a if a < 17.0 => 0,
        a if a < 20.0 => 1,
        a if a < 30.0 => 2,
        a if a < 40.0 => 3,
        a if a < 50.0 => 4,
        _ => 5,
    };
    table[bracket]
}

/// Full composition for one measurement session.
pub fn compute(
    measurements: &Measurements,
    protocol: SkinfoldProtocol,
    gender: Gender,
    age: u32,
) -> BodyComposition {
    let weight = if measurements.weight_kg.is_finite() && measurements.weight_kg > 0.0 {
        measurements.weight_kg
    } else {
        0.0
    };
    let body_fat_percent = body_fat_percent(protocol, &measurements.skinfolds, gender, age);
    let fat_mass_kg = weight * body_fat_percent / 100.0;

    let waist_hip_ratio = match (measurements.waist_cm, measurements.hip_cm) {
        (Some(waist), Some(hip)) if waist > 0.0 && hip > 0.0 => waist / hip,
        _ => 0.0,
    };

    BodyComposition {
        bmi: bmi(weight, measurements.height),
        body_fat_percent,
        fat_mass_kg,
        lean_mass_kg: weight - fat_mass_kg,
        waist_hip_ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seven_folds(value: f64) -> Skinfolds {
        Skinfolds {
            chest: Some(value),
            midaxillary: Some(value),
            triceps: Some(value),
            subscapular: Some(value),
            abdominal: Some(value),
            suprailiac: Some(value),
            thigh: Some(value),
            biceps: None,
        }
    }

    #[test]
    fn height_units_are_normalized() {
        assert_eq!(normalize_height_m(175.0), 1.75);
        assert_eq!(normalize_height_m(1.75), 1.75);

        let from_cm = bmi(70.0, 175.0);
        let from_m = bmi(70.0, 1.75);
        assert!((from_cm - from_m).abs() < 1e-12);
        assert!((from_m - 22.857142857).abs() < 1e-6);
    }

    #[test]
    fn bmi_zero_on_bad_input() {
        assert_eq!(bmi(70.0, 0.0), 0.0);
        assert_eq!(bmi(0.0, 1.7), 0.0);
        assert_eq!(bmi(f64::NAN, 1.7), 0.0);
    }

    #[test]
    fn jackson_pollock_7_male_reference() {
        // Sum 70mm, age 30:
        // D = 1.112 - 0.00043499*70 + 0.00000055*4900 - 0.00028826*30 = 1.0755979
        // %BF = (4.95 / D - 4.5) * 100
        let expected = (4.95 / 1.0755979 - 4.5) * 100.0;
        let pct = body_fat_percent(
            SkinfoldProtocol::JacksonPollock7,
            &seven_folds(10.0),
            Gender::Male,
            30,
        );
        assert!((pct - expected).abs() < 1e-9, "got {pct}, expected {expected}");
        assert!((pct - 10.209).abs() < 0.01);
    }

    #[test]
    fn jackson_pollock_7_female_uses_female_coefficients() {
        let male = body_fat_percent(
            SkinfoldProtocol::JacksonPollock7,
            &seven_folds(15.0),
            Gender::Male,
            40,
        );
        let female = body_fat_percent(
            SkinfoldProtocol::JacksonPollock7,
            &seven_folds(15.0),
            Gender::Female,
            40,
        );
        assert!(female > male);
    }

    #[test]
    fn incomplete_folds_give_exact_zero() {
        let mut folds = seven_folds(10.0);
        folds.thigh = None;
        let pct = body_fat_percent(SkinfoldProtocol::JacksonPollock7, &folds, Gender::Male, 30);
        assert_eq!(pct, 0.0);

        let mut folds = seven_folds(10.0);
        folds.chest = Some(0.0);
        let pct = body_fat_percent(SkinfoldProtocol::JacksonPollock7, &folds, Gender::Male, 30);
        assert_eq!(pct, 0.0);
    }

    #[test]
    fn jackson_pollock_3_sites_depend_on_sex() {
        let folds = Skinfolds {
            chest: Some(12.0),
            abdominal: Some(20.0),
            thigh: Some(15.0),
            ..Default::default()
        };
        assert!(body_fat_percent(SkinfoldProtocol::JacksonPollock3, &folds, Gender::Male, 25) > 0.0);
        // Women need triceps and suprailiac
        assert_eq!(
            body_fat_percent(SkinfoldProtocol::JacksonPollock3, &folds, Gender::Female, 25),
            0.0
        );
    }

    #[test]
    fn durnin_womersley_age_brackets() {
        let folds = Skinfolds {
            biceps: Some(5.0),
            triceps: Some(10.0),
            subscapular: Some(12.0),
            suprailiac: Some(13.0),
            ..Default::default()
        };
        // Sum 40, male 20-29: D = 1.1631 - 0.0632 * log10(40)
        let expected = siri(1.1631 - 0.0632 * 40f64.log10());
        let pct = body_fat_percent(SkinfoldProtocol::DurninWomersley, &folds, Gender::Male, 25);
        assert!((pct - expected).abs() < 1e-9);

        let older = body_fat_percent(SkinfoldProtocol::DurninWomersley, &folds, Gender::Male, 55);
        assert!(older > pct);
    }

    #[test]
    fn faulkner_is_linear() {
        let folds = Skinfolds {
            triceps: Some(10.0),
            subscapular: Some(10.0),
            suprailiac: Some(10.0),
            abdominal: Some(10.0),
            ..Default::default()
        };
        let pct = body_fat_percent(SkinfoldProtocol::Faulkner, &folds, Gender::Female, 30);
        assert!((pct - (40.0 * 0.153 + 5.783)).abs() < 1e-12);
    }

    #[test]
    fn full_composition() {
        let m = Measurements {
            weight_kg: 80.0,
            height: 180.0,
            waist_cm: Some(85.0),
            hip_cm: Some(100.0),
            skinfolds: seven_folds(10.0),
        };
        let c = compute(&m, SkinfoldProtocol::JacksonPollock7, Gender::Male, 30);

        assert!((c.bmi - 80.0 / (1.8 * 1.8)).abs() < 1e-9);
        assert!((c.fat_mass_kg - 80.0 * c.body_fat_percent / 100.0).abs() < 1e-9);
        assert!((c.fat_mass_kg + c.lean_mass_kg - 80.0).abs() < 1e-9);
        assert!((c.waist_hip_ratio - 0.85).abs() < 1e-12);
    }

    #[test]
    fn composition_without_folds_keeps_full_lean_mass() {
        let m = Measurements {
            weight_kg: 60.0,
            height: 1.6,
            ..Default::default()
        };
        let c = compute(&m, SkinfoldProtocol::Faulkner, Gender::Female, 30);
        assert_eq!(c.body_fat_percent, 0.0);
        assert_eq!(c.fat_mass_kg, 0.0);
        assert_eq!(c.lean_mass_kg, 60.0);
        assert_eq!(c.waist_hip_ratio, 0.0);
    }
}
