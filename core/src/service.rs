use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};

use crate::db::Database;
use crate::goals::GoalProfile;
use crate::macro_cycle::{self, PlannedDay, ResolvedTargets};
use crate::models::{
    DatedTargets, DayTargets, DayType, MacroCycleConfig, MacroOverride, NewWeightEntry,
    PatternType, WeightEntry, parse_date, validate_day_of_week, validate_day_targets,
    validate_weight_kg,
};
use crate::weight_import::{self, WeightImportSummary};

const BASE_TARGETS_KEY: &str = "base_targets";

/// Local calendar date, the reference "today" for weekly planning.
#[must_use]
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// String-dated facade over [`Database`] for UI and API layers.
pub struct HeftService {
    db: Database,
}

impl HeftService {
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Database::open(Path::new(db_path))?;
        Ok(Self { db })
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self { db })
    }

    #[must_use]
    pub fn from_database(db: Database) -> Self {
        Self { db }
    }

    // --- Weight ---

    pub fn log_weight(
        &self,
        date: &str,
        weight_kg: f64,
        notes: Option<String>,
    ) -> Result<WeightEntry> {
        let date = parse_date(date)?;
        validate_weight_kg(weight_kg)?;
        self.db.upsert_weight(&NewWeightEntry {
            date,
            weight_kg,
            source: "manual".to_string(),
            notes,
        })
    }

    pub fn get_weight(&self, date: &str) -> Result<Option<WeightEntry>> {
        self.db.get_weight(parse_date(date)?)
    }

    pub fn get_weight_by_id(&self, id: i64) -> Result<Option<WeightEntry>> {
        self.db.get_weight_by_id(id)
    }

    pub fn get_weight_history(&self, days: Option<i64>) -> Result<Vec<WeightEntry>> {
        self.db.get_weight_history(days)
    }

    pub fn delete_weight(&self, id: i64) -> Result<()> {
        self.db.delete_weight(id)
    }

    pub fn recompute_trends(&self, from: Option<&str>) -> Result<usize> {
        let from = from.map(parse_date).transpose()?;
        self.db.recompute_trends(from)
    }

    pub fn import_weight_csv(&self, csv_data: &str, dry_run: bool) -> Result<WeightImportSummary> {
        let rows = weight_import::parse_weight_csv(csv_data.as_bytes())?;
        weight_import::import_weights(&self.db, &rows, dry_run)
    }

    // --- Target resolution ---

    pub fn resolve_targets(&self, date: &str, base: &DayTargets) -> Result<ResolvedTargets> {
        Ok(macro_cycle::resolve_targets(
            &self.db,
            parse_date(date)?,
            *base,
        ))
    }

    /// Resolve against the stored base targets.
    pub fn targets_for(&self, date: &str) -> Result<ResolvedTargets> {
        let base = self.require_base_targets()?;
        self.resolve_targets(date, &base)
    }

    pub fn week_plan(&self, date: &str, base: &DayTargets) -> Result<Vec<PlannedDay>> {
        Ok(macro_cycle::week_plan(&self.db, parse_date(date)?, *base))
    }

    // --- Cycle config ---

    pub fn get_cycle_config(&self) -> Result<MacroCycleConfig> {
        self.db.get_or_create_cycle_config()
    }

    pub fn save_cycle_config(&self, config: &MacroCycleConfig) -> Result<MacroCycleConfig> {
        self.db.save_cycle_config(config)
    }

    pub fn get_day_type(&self, day_of_week: u8) -> Result<Option<DayType>> {
        validate_day_of_week(day_of_week)?;
        let config = self.get_cycle_config()?;
        Ok(macro_cycle::get_day_type(day_of_week, &config))
    }

    pub fn calculate_weekly_average(&self) -> Result<DayTargets> {
        let config = self.get_cycle_config()?;
        Ok(macro_cycle::calculate_weekly_average(&config))
    }

    // --- Overrides ---

    pub fn get_override(&self, date: &str) -> Result<Option<MacroOverride>> {
        self.db.get_override(parse_date(date)?)
    }

    pub fn set_override(&self, date: &str, targets: &DayTargets) -> Result<MacroOverride> {
        self.db.set_override(parse_date(date)?, targets)
    }

    pub fn clear_override(&self, date: &str) -> Result<bool> {
        self.db.clear_override(parse_date(date)?)
    }

    pub fn list_overrides(&self, from: Option<&str>) -> Result<Vec<MacroOverride>> {
        let from = from.map(parse_date).transpose()?;
        self.db.list_overrides(from)
    }

    pub fn save_redistribution_overrides(&self, items: &[DatedTargets]) -> Result<usize> {
        for item in items {
            validate_day_targets(&item.targets)
                .with_context(|| format!("Invalid targets for {}", item.date))?;
        }
        self.db.save_redistribution_overrides(items)
    }

    /// Plan the rest of the cycle week containing `today` from recorded
    /// `intake`. Nothing is written.
    pub fn plan_redistribution(
        &self,
        today: &str,
        intake: &BTreeMap<NaiveDate, DayTargets>,
    ) -> Result<Vec<DatedTargets>> {
        let today = parse_date(today)?;
        let base = self.require_base_targets()?;
        let config = self.get_cycle_config()?;
        Ok(macro_cycle::plan_redistribution(
            &self.db, &config, base, today, intake,
        ))
    }

    /// Plan and persist the redistribution as overrides in one transaction.
    ///
    /// Only runs while cycling is enabled with the redistribution pattern.
    pub fn apply_redistribution(
        &self,
        today: &str,
        intake: &BTreeMap<NaiveDate, DayTargets>,
    ) -> Result<Vec<DatedTargets>> {
        let config = self.get_cycle_config()?;
        if !config.enabled || config.pattern_type != PatternType::Redistribution {
            bail!(
                "Redistribution is not active. Use `heft cycle enable --pattern redistribution` first"
            );
        }
        let plan = self.plan_redistribution(today, intake)?;
        self.save_redistribution_overrides(&plan)?;
        Ok(plan)
    }

    // --- Goal profile and base targets ---

    pub fn set_goal_profile(&self, profile: &GoalProfile) -> Result<DayTargets> {
        profile.validate()?;
        let targets = profile.base_targets()?;
        self.db
            .set_setting(GoalProfile::SETTING_KEY, &serde_json::to_string(profile)?)?;
        Ok(targets)
    }

    pub fn get_goal_profile(&self) -> Result<Option<GoalProfile>> {
        match self.db.get_setting(GoalProfile::SETTING_KEY)? {
            Some(raw) => Ok(Some(
                serde_json::from_str(&raw).context("Stored goal profile is not valid JSON")?,
            )),
            None => Ok(None),
        }
    }

    pub fn clear_goal_profile(&self) -> Result<bool> {
        self.db.delete_setting(GoalProfile::SETTING_KEY)
    }

    /// Fix the base targets by hand. Takes precedence over the goal profile.
    pub fn set_base_targets(&self, targets: &DayTargets) -> Result<()> {
        validate_day_targets(targets)?;
        self.db
            .set_setting(BASE_TARGETS_KEY, &serde_json::to_string(targets)?)
    }

    pub fn clear_base_targets(&self) -> Result<bool> {
        self.db.delete_setting(BASE_TARGETS_KEY)
    }

    /// Manually set base targets, else targets derived from the goal profile.
    pub fn base_targets(&self) -> Result<Option<DayTargets>> {
        if let Some(raw) = self.db.get_setting(BASE_TARGETS_KEY)? {
            let targets =
                serde_json::from_str(&raw).context("Stored base targets are not valid JSON")?;
            return Ok(Some(targets));
        }
        self.get_goal_profile()?
            .map(|profile| profile.base_targets())
            .transpose()
    }

    fn require_base_targets(&self) -> Result<DayTargets> {
        match self.base_targets()? {
            Some(targets) => Ok(targets),
            None => bail!(
                "No base targets. Use `heft target set` or `heft goal set` to define them"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goals::{ActivityLevel, Goal, Sex};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn profile() -> GoalProfile {
        GoalProfile {
            sex: Sex::Female,
            age_years: 34,
            height_cm: 168.0,
            weight_kg: 70.0,
            activity_level: ActivityLevel::Light,
            goal: Goal::Maintain,
            weekly_rate_kg: 0.0,
            protein_pct: 30,
            carbs_pct: 40,
            fat_pct: 30,
        }
    }

    #[test]
    fn test_log_weight_validates_range_and_date() {
        let svc = HeftService::new_in_memory().unwrap();
        assert!(svc.log_weight("2024-01-15", 29.0, None).is_err());
        assert!(svc.log_weight("2024-01-15", 301.0, None).is_err());
        assert!(svc.log_weight("01/15/2024", 80.0, None).is_err());

        let entry = svc.log_weight("2024-01-15", 80.0, None).unwrap();
        assert_eq!(entry.trend_weight_kg, Some(80.0));
        assert!(svc.get_weight("2024-01-15").unwrap().is_some());
    }

    #[test]
    fn test_targets_for_requires_base() {
        let svc = HeftService::new_in_memory().unwrap();
        let err = svc.targets_for("2024-01-15").unwrap_err();
        assert!(err.to_string().contains("No base targets"));
    }

    #[test]
    fn test_resolution_precedence_through_service() {
        let svc = HeftService::new_in_memory().unwrap();
        let base = DayTargets::new(2200, 165.0, 220.0, 73.0);
        svc.set_base_targets(&base).unwrap();

        let mut config = svc.get_cycle_config().unwrap();
        config.enabled = true;
        config.pattern_type = PatternType::Custom;
        config
            .day_targets
            .insert(1, DayTargets::new(2500, 180.0, 280.0, 80.0));
        svc.save_cycle_config(&config).unwrap();

        assert_eq!(svc.targets_for("2024-01-15").unwrap().source(), "cycling");
        assert_eq!(svc.targets_for("2024-01-16").unwrap().source(), "base");

        svc.set_override("2024-01-15", &DayTargets::new(2000, 150.0, 200.0, 67.0))
            .unwrap();
        let resolved = svc.targets_for("2024-01-15").unwrap();
        assert_eq!(resolved, ResolvedTargets::Override(DayTargets::new(2000, 150.0, 200.0, 67.0)));

        assert!(svc.clear_override("2024-01-15").unwrap());
        assert_eq!(svc.targets_for("2024-01-15").unwrap().source(), "cycling");
    }

    #[test]
    fn test_get_day_type_validates_weekday() {
        let svc = HeftService::new_in_memory().unwrap();
        assert!(svc.get_day_type(7).is_err());
        assert_eq!(svc.get_day_type(3).unwrap(), None);
    }

    #[test]
    fn test_goal_profile_round_trip_and_base_targets() {
        let svc = HeftService::new_in_memory().unwrap();
        assert!(svc.get_goal_profile().unwrap().is_none());
        assert!(svc.base_targets().unwrap().is_none());

        let derived = svc.set_goal_profile(&profile()).unwrap();
        assert_eq!(svc.get_goal_profile().unwrap(), Some(profile()));
        assert_eq!(svc.base_targets().unwrap(), Some(derived));

        let manual = DayTargets::new(1900, 140.0, 190.0, 63.0);
        svc.set_base_targets(&manual).unwrap();
        assert_eq!(svc.base_targets().unwrap(), Some(manual));

        assert!(svc.clear_base_targets().unwrap());
        assert_eq!(svc.base_targets().unwrap(), Some(derived));
    }

    #[test]
    fn test_set_goal_profile_rejects_invalid() {
        let svc = HeftService::new_in_memory().unwrap();
        let mut bad = profile();
        bad.protein_pct = 50;
        assert!(svc.set_goal_profile(&bad).is_err());
        assert!(svc.get_goal_profile().unwrap().is_none());
    }

    #[test]
    fn test_apply_redistribution_writes_overrides() {
        let svc = HeftService::new_in_memory().unwrap();
        svc.set_base_targets(&DayTargets::new(2000, 150.0, 200.0, 70.0))
            .unwrap();
        let mut config = svc.get_cycle_config().unwrap();
        config.enabled = true;
        config.pattern_type = PatternType::Redistribution;
        config.redistribution_start_day = 1;
        config.locked_days.insert(0);
        svc.save_cycle_config(&config).unwrap();

        let mut intake = BTreeMap::new();
        intake.insert(d(2024, 1, 15), DayTargets::new(2500, 150.0, 250.0, 90.0));
        intake.insert(d(2024, 1, 16), DayTargets::new(2300, 150.0, 250.0, 80.0));

        let preview = svc.plan_redistribution("2024-01-18", &intake).unwrap();
        assert_eq!(preview.len(), 3);
        assert!(svc.list_overrides(None).unwrap().is_empty());

        let applied = svc.apply_redistribution("2024-01-18", &intake).unwrap();
        assert_eq!(applied, preview);
        let overrides = svc.list_overrides(Some("2024-01-18")).unwrap();
        assert_eq!(overrides.len(), 3);
        assert_eq!(svc.targets_for("2024-01-19").unwrap().targets().calories, 1733);
        // Locked Sunday keeps resolving to base.
        assert_eq!(svc.targets_for("2024-01-21").unwrap().source(), "base");
    }

    #[test]
    fn test_apply_redistribution_requires_active_pattern() {
        let svc = HeftService::new_in_memory().unwrap();
        let base = DayTargets::new(2000, 150.0, 200.0, 70.0);
        svc.set_base_targets(&base).unwrap();
        let mut config = svc.get_cycle_config().unwrap();
        for dow in 0..7 {
            config
                .day_targets
                .insert(dow, DayTargets::new(3000, 200.0, 300.0, 100.0));
        }
        svc.save_cycle_config(&config).unwrap();

        // Disabled cycling plans base for every day and refuses to write.
        let preview = svc.plan_redistribution("2024-01-14", &BTreeMap::new()).unwrap();
        assert!(preview.iter().all(|p| p.targets == base));
        let err = svc
            .apply_redistribution("2024-01-14", &BTreeMap::new())
            .unwrap_err();
        assert!(err.to_string().contains("not active"));
        assert!(svc.list_overrides(None).unwrap().is_empty());
        assert_eq!(svc.targets_for("2024-01-15").unwrap(), ResolvedTargets::Base(base));

        config.enabled = true;
        config.pattern_type = PatternType::TrainingRest;
        svc.save_cycle_config(&config).unwrap();
        assert!(svc.apply_redistribution("2024-01-14", &BTreeMap::new()).is_err());
        assert!(svc.list_overrides(None).unwrap().is_empty());
    }

    #[test]
    fn test_save_redistribution_overrides_validates_first() {
        let svc = HeftService::new_in_memory().unwrap();
        let items = vec![DatedTargets {
            date: d(2024, 1, 18),
            targets: DayTargets::new(2000, -1.0, 200.0, 70.0),
        }];
        let err = svc.save_redistribution_overrides(&items).unwrap_err();
        assert!(err.to_string().contains("2024-01-18"));
    }

    #[test]
    fn test_import_weight_csv_and_recompute() {
        let svc = HeftService::new_in_memory().unwrap();
        let csv = "Date,Weight (lbs)\n2024-01-01,176.37\n2024-01-08,171.96\n";
        let summary = svc.import_weight_csv(csv, false).unwrap();
        assert_eq!(summary.imported, 2);

        assert_eq!(svc.recompute_trends(None).unwrap(), 2);
        assert_eq!(svc.recompute_trends(Some("2024-01-05")).unwrap(), 1);
        let history = svc.get_weight_history(None).unwrap();
        let newest = &history[0];
        let oldest = &history[1];
        let expected = 0.5 * newest.weight_kg + 0.5 * oldest.weight_kg;
        assert!((newest.trend_weight_kg.unwrap() - expected).abs() < 1e-9);
    }
}
