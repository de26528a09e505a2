use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::macro_cycle::round1;
use crate::models::{DayTargets, validate_macro_split, validate_weight_kg};

/// Approximate energy content of one kilogram of body weight.
pub const KCAL_PER_KG: f64 = 7700.0;

pub const MIN_CALORIES_FEMALE: i64 = 1200;
pub const MIN_CALORIES_MALE: i64 = 1500;

const KCAL_PER_G_PROTEIN: f64 = 4.0;
const KCAL_PER_G_CARBS: f64 = 4.0;
const KCAL_PER_G_FAT: f64 = 9.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    #[must_use]
    pub fn calorie_floor(self) -> i64 {
        match self {
            Self::Male => MIN_CALORIES_MALE,
            Self::Female => MIN_CALORIES_FEMALE,
        }
    }
}

impl FromStr for Sex {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "male" | "m" => Ok(Self::Male),
            "female" | "f" => Ok(Self::Female),
            _ => bail!("Invalid sex: {s}. Use male or female"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    Moderate,
    VeryActive,
    ExtraActive,
}

impl ActivityLevel {
    #[must_use]
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Sedentary => 1.2,
            Self::Light => 1.375,
            Self::Moderate => 1.55,
            Self::VeryActive => 1.725,
            Self::ExtraActive => 1.9,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sedentary => "sedentary",
            Self::Light => "light",
            Self::Moderate => "moderate",
            Self::VeryActive => "very_active",
            Self::ExtraActive => "extra_active",
        }
    }
}

impl FromStr for ActivityLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "sedentary" => Ok(Self::Sedentary),
            "light" => Ok(Self::Light),
            "moderate" => Ok(Self::Moderate),
            "very_active" | "very" => Ok(Self::VeryActive),
            "extra_active" | "extra" => Ok(Self::ExtraActive),
            _ => bail!(
                "Invalid activity level: {s}. Use sedentary, light, moderate, very-active, or extra-active"
            ),
        }
    }
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    Lose,
    Maintain,
    Gain,
}

impl FromStr for Goal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "lose" | "cut" => Ok(Self::Lose),
            "maintain" => Ok(Self::Maintain),
            "gain" | "bulk" => Ok(Self::Gain),
            _ => bail!("Invalid goal: {s}. Use lose, maintain, or gain"),
        }
    }
}

/// Mifflin-St Jeor resting energy expenditure in kcal/day.
#[must_use]
pub fn bmr_mifflin_st_jeor(sex: Sex, weight_kg: f64, height_cm: f64, age_years: u32) -> f64 {
    let base = 10.0 * weight_kg + 6.25 * height_cm - 5.0 * f64::from(age_years);
    match sex {
        Sex::Male => base + 5.0,
        Sex::Female => base - 161.0,
    }
}

#[must_use]
pub fn tdee(bmr: f64, activity: ActivityLevel) -> f64 {
    bmr * activity.multiplier()
}

/// Daily calorie target for a goal and a weekly rate of change in kg.
///
/// Losing never goes below the sex-specific floor.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn calorie_target(tdee: f64, goal: Goal, weekly_rate_kg: f64, sex: Sex) -> i64 {
    let daily_delta = weekly_rate_kg.abs() * KCAL_PER_KG / 7.0;
    match goal {
        Goal::Lose => ((tdee - daily_delta).round() as i64).max(sex.calorie_floor()),
        Goal::Maintain => tdee.round() as i64,
        Goal::Gain => (tdee + daily_delta).round() as i64,
    }
}

/// Gram targets for a calorie budget split by percentage.
#[allow(clippy::cast_precision_loss)]
pub fn macro_split(calories: i64, protein_pct: i64, carbs_pct: i64, fat_pct: i64) -> Result<DayTargets> {
    validate_macro_split(protein_pct, carbs_pct, fat_pct)?;
    if calories < 0 {
        bail!("calories must not be negative");
    }
    let grams = |pct: i64, kcal_per_g: f64| round1(calories as f64 * pct as f64 / 100.0 / kcal_per_g);
    Ok(DayTargets {
        calories,
        protein: grams(protein_pct, KCAL_PER_G_PROTEIN),
        carbs: grams(carbs_pct, KCAL_PER_G_CARBS),
        fat: grams(fat_pct, KCAL_PER_G_FAT),
    })
}

/// Body stats and preferences stored as the `goal_profile` user setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalProfile {
    pub sex: Sex,
    pub age_years: u32,
    pub height_cm: f64,
    pub weight_kg: f64,
    pub activity_level: ActivityLevel,
    pub goal: Goal,
    #[serde(default)]
    pub weekly_rate_kg: f64,
    pub protein_pct: i64,
    pub carbs_pct: i64,
    pub fat_pct: i64,
}

impl GoalProfile {
    pub const SETTING_KEY: &'static str = "goal_profile";

    pub fn validate(&self) -> Result<()> {
        if !(13..=120).contains(&self.age_years) {
            bail!("Age must be between 13 and 120 (got {})", self.age_years);
        }
        if !self.height_cm.is_finite() || !(100.0..=250.0).contains(&self.height_cm) {
            bail!("Height must be between 100 and 250 cm (got {})", self.height_cm);
        }
        validate_weight_kg(self.weight_kg)?;
        if !self.weekly_rate_kg.is_finite() || !(0.0..=1.0).contains(&self.weekly_rate_kg) {
            bail!("Weekly rate must be between 0 and 1 kg (got {})", self.weekly_rate_kg);
        }
        validate_macro_split(self.protein_pct, self.carbs_pct, self.fat_pct)
    }

    #[must_use]
    pub fn bmr(&self) -> f64 {
        bmr_mifflin_st_jeor(self.sex, self.weight_kg, self.height_cm, self.age_years)
    }

    #[must_use]
    pub fn tdee(&self) -> f64 {
        tdee(self.bmr(), self.activity_level)
    }

    pub fn base_targets(&self) -> Result<DayTargets> {
        let calories = calorie_target(self.tdee(), self.goal, self.weekly_rate_kg, self.sex);
        macro_split(calories, self.protein_pct, self.carbs_pct, self.fat_pct)
    }
}
