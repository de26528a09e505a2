use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Lowest weigh-in accepted at the entry boundary.
pub const MIN_WEIGHT_KG: f64 = 30.0;
/// Highest weigh-in accepted at the entry boundary.
pub const MAX_WEIGHT_KG: f64 = 300.0;

/// Weekday names indexed by `day_of_week` (0 = Sunday).
pub const DAY_NAMES: &[&str] = &[
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

pub const DATE_FORMAT: &str = "%Y-%m-%d";

// --- Weight tracking types ---

#[derive(Debug, Clone, Serialize)]
pub struct WeightEntry {
    pub id: i64,
    pub uuid: String,
    pub date: NaiveDate,
    pub weight_kg: f64,
    /// Smoothed weight, written only by the trend filter.
    pub trend_weight_kg: Option<f64>,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewWeightEntry {
    pub date: NaiveDate,
    pub weight_kg: f64,
    pub source: String,
    pub notes: Option<String>,
}

// --- Macro target types ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DayTargets {
    pub calories: i64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

impl DayTargets {
    #[must_use]
    pub fn new(calories: i64, protein: f64, carbs: f64, fat: f64) -> Self {
        Self {
            calories,
            protein,
            carbs,
            fat,
        }
    }
}

/// Weekly macro-cycling pattern. Unrecognized stored values survive a
/// round trip through `Other` instead of failing to load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PatternType {
    TrainingRest,
    HighLowCarb,
    EvenDistribution,
    Custom,
    Redistribution,
    Other(String),
}

impl PatternType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::TrainingRest => "training_rest",
            Self::HighLowCarb => "high_low_carb",
            Self::EvenDistribution => "even_distribution",
            Self::Custom => "custom",
            Self::Redistribution => "redistribution",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for PatternType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "training_rest" => Self::TrainingRest,
            "high_low_carb" => Self::HighLowCarb,
            "even_distribution" => Self::EvenDistribution,
            "custom" => Self::Custom,
            "redistribution" => Self::Redistribution,
            _ => Self::Other(value),
        }
    }
}

impl From<PatternType> for String {
    fn from(value: PatternType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// UI label for a weekday under the active pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayType {
    Training,
    Rest,
    HighCarb,
    LowCarb,
    Even,
    Custom,
}

impl DayType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Training => "training",
            Self::Rest => "rest",
            Self::HighCarb => "high_carb",
            Self::LowCarb => "low_carb",
            Self::Even => "even",
            Self::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroCycleConfig {
    pub enabled: bool,
    pub pattern_type: PatternType,
    #[serde(default)]
    pub marked_days: BTreeSet<u8>,
    /// Sparse: only weekdays with explicit targets are present.
    #[serde(default)]
    pub day_targets: BTreeMap<u8, DayTargets>,
    #[serde(default)]
    pub locked_days: BTreeSet<u8>,
    #[serde(default)]
    pub redistribution_start_day: u8,
}

impl Default for MacroCycleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pattern_type: PatternType::TrainingRest,
            marked_days: BTreeSet::new(),
            day_targets: BTreeMap::new(),
            locked_days: BTreeSet::new(),
            redistribution_start_day: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MacroOverride {
    pub id: i64,
    pub uuid: String,
    pub date: NaiveDate,
    pub calories: i64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub created_at: String,
}

impl MacroOverride {
    #[must_use]
    pub fn targets(&self) -> DayTargets {
        DayTargets::new(self.calories, self.protein, self.carbs, self.fat)
    }
}

/// One element of a bulk override save.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DatedTargets {
    pub date: NaiveDate,
    pub targets: DayTargets,
}

// --- Validation ---

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|_| anyhow::anyhow!("Invalid date '{s}'. Must be YYYY-MM-DD"))
}

pub fn validate_weight_kg(weight_kg: f64) -> Result<()> {
    if !weight_kg.is_finite() || !(MIN_WEIGHT_KG..=MAX_WEIGHT_KG).contains(&weight_kg) {
        bail!("Weight must be between {MIN_WEIGHT_KG} and {MAX_WEIGHT_KG} kg (got {weight_kg})");
    }
    Ok(())
}

pub fn validate_day_of_week(day: u8) -> Result<()> {
    if day > 6 {
        bail!("day_of_week must be between 0 (Sunday) and 6 (Saturday)");
    }
    Ok(())
}

pub fn validate_day_targets(targets: &DayTargets) -> Result<()> {
    if targets.calories < 0 {
        bail!("calories must not be negative");
    }
    for (name, value) in [
        ("protein", targets.protein),
        ("carbs", targets.carbs),
        ("fat", targets.fat),
    ] {
        if !value.is_finite() || value < 0.0 {
            bail!("{name} must be a non-negative number");
        }
    }
    Ok(())
}

pub fn validate_macro_split(protein: i64, carbs: i64, fat: i64) -> Result<()> {
    if protein < 0 || carbs < 0 || fat < 0 {
        bail!("Macro percentages must be non-negative");
    }
    if protein > 100 || carbs > 100 || fat > 100 {
        bail!("Each macro percentage must be between 0 and 100");
    }
    let sum = protein + carbs + fat;
    if sum != 100 {
        bail!("Macro percentages must sum to 100 (got {sum})");
    }
    Ok(())
}

/// Validate a cycle config before it is persisted: every weekday index in
/// range and every day target non-negative.
pub fn validate_cycle_config(config: &MacroCycleConfig) -> Result<()> {
    for day in config.marked_days.iter().chain(&config.locked_days) {
        validate_day_of_week(*day)?;
    }
    validate_day_of_week(config.redistribution_start_day)?;
    for (day, targets) in &config.day_targets {
        validate_day_of_week(*day)?;
        validate_day_targets(targets)
            .map_err(|e| anyhow::anyhow!("{} target: {e}", DAY_NAMES[usize::from(*day)]))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_type_known_values() {
        assert_eq!(
            PatternType::from("training_rest".to_string()),
            PatternType::TrainingRest
        );
        assert_eq!(
            PatternType::from("redistribution".to_string()),
            PatternType::Redistribution
        );
        assert_eq!(PatternType::HighLowCarb.as_str(), "high_low_carb");
    }

    #[test]
    fn test_pattern_type_unknown_preserved() {
        let p = PatternType::from("zigzag".to_string());
        assert_eq!(p, PatternType::Other("zigzag".to_string()));
        assert_eq!(String::from(p), "zigzag");
    }

    #[test]
    fn test_cycle_config_json_shape() {
        let mut config = MacroCycleConfig {
            enabled: true,
            pattern_type: PatternType::HighLowCarb,
            ..MacroCycleConfig::default()
        };
        config.marked_days.insert(2);
        config
            .day_targets
            .insert(2, DayTargets::new(2500, 180.0, 280.0, 80.0));

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["pattern_type"], "high_low_carb");
        assert_eq!(json["day_targets"]["2"]["calories"], 2500);

        let back: MacroCycleConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2024-01-15").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
        assert!(parse_date("15/01/2024").is_err());
        assert!(parse_date("").is_err());
    }

    #[test]
    fn test_validate_weight_range() {
        assert!(validate_weight_kg(30.0).is_ok());
        assert!(validate_weight_kg(82.4).is_ok());
        assert!(validate_weight_kg(300.0).is_ok());
        assert!(validate_weight_kg(29.9).is_err());
        assert!(validate_weight_kg(300.1).is_err());
        assert!(validate_weight_kg(f64::NAN).is_err());
    }

    #[test]
    fn test_validate_day_targets() {
        assert!(validate_day_targets(&DayTargets::new(2000, 150.0, 200.0, 67.0)).is_ok());
        assert!(validate_day_targets(&DayTargets::default()).is_ok());
        assert!(validate_day_targets(&DayTargets::new(-1, 0.0, 0.0, 0.0)).is_err());
        assert!(validate_day_targets(&DayTargets::new(2000, -5.0, 0.0, 0.0)).is_err());
    }

    #[test]
    fn test_validate_macro_split() {
        assert!(validate_macro_split(30, 40, 30).is_ok());
        assert!(validate_macro_split(40, 30, 20).is_err());
        assert!(validate_macro_split(-10, 60, 50).is_err());
    }

    #[test]
    fn test_validate_cycle_config_rejects_bad_weekday() {
        let mut config = MacroCycleConfig::default();
        config.marked_days.insert(7);
        assert!(validate_cycle_config(&config).is_err());

        let mut config = MacroCycleConfig::default();
        config.day_targets.insert(9, DayTargets::default());
        assert!(validate_cycle_config(&config).is_err());
    }

    #[test]
    fn test_validate_cycle_config_rejects_negative_target() {
        let mut config = MacroCycleConfig::default();
        config
            .day_targets
            .insert(1, DayTargets::new(2000, 150.0, -1.0, 60.0));
        let err = validate_cycle_config(&config).unwrap_err();
        assert!(err.to_string().contains("Monday"));
    }
}
