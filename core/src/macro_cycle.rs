use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use tracing::{debug, warn};

use crate::models::{
    DatedTargets, DayTargets, DayType, MacroCycleConfig, MacroOverride, PatternType,
};

/// Read side of the store consulted during resolution.
///
/// `Database` implements this over SQLite; tests substitute in-memory or
/// failing sources.
pub trait TargetSource {
    fn override_for(&self, date: NaiveDate) -> Result<Option<MacroOverride>>;
    fn cycle_config(&self) -> Result<Option<MacroCycleConfig>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "source", content = "targets", rename_all = "snake_case")]
pub enum ResolvedTargets {
    Override(DayTargets),
    Cycling(DayTargets),
    Base(DayTargets),
}

impl ResolvedTargets {
    #[must_use]
    pub fn targets(&self) -> DayTargets {
        match self {
            Self::Override(t) | Self::Cycling(t) | Self::Base(t) => *t,
        }
    }

    #[must_use]
    pub fn source(&self) -> &'static str {
        match self {
            Self::Override(_) => "override",
            Self::Cycling(_) => "cycling",
            Self::Base(_) => "base",
        }
    }
}

/// Weekday index of a calendar date, 0 = Sunday .. 6 = Saturday.
///
/// Derived from the calendar date itself, so the result does not depend on
/// the process timezone.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// First date of the cycle week containing `date`.
#[must_use]
pub fn week_start(date: NaiveDate, start_day: u8) -> NaiveDate {
    let offset = (i64::from(day_of_week(date)) + 7 - i64::from(start_day % 7)) % 7;
    date - Duration::days(offset)
}

/// Effective targets for `date`: a per-date override, else the enabled cycling
/// pattern's target for that weekday, else `base`. Sources are never blended.
pub fn resolve_targets(
    source: &dyn TargetSource,
    date: NaiveDate,
    base: DayTargets,
) -> ResolvedTargets {
    match source.override_for(date) {
        Ok(Some(o)) => return ResolvedTargets::Override(o.targets()),
        Ok(None) => {}
        Err(e) => {
            warn!(%date, error = %e, "override lookup failed, using base targets");
            return ResolvedTargets::Base(base);
        }
    }

    let config = match source.cycle_config() {
        Ok(Some(config)) if config.enabled => config,
        Ok(_) => return ResolvedTargets::Base(base),
        Err(e) => {
            warn!(%date, error = %e, "cycle config lookup failed, using base targets");
            return ResolvedTargets::Base(base);
        }
    };

    match config.day_targets.get(&day_of_week(date)) {
        Some(targets) => ResolvedTargets::Cycling(*targets),
        None => ResolvedTargets::Base(base),
    }
}

#[must_use]
pub fn get_day_type(day_of_week: u8, config: &MacroCycleConfig) -> Option<DayType> {
    if !config.enabled {
        return None;
    }
    let marked = config.marked_days.contains(&day_of_week);
    match config.pattern_type {
        PatternType::TrainingRest => Some(if marked {
            DayType::Training
        } else {
            DayType::Rest
        }),
        PatternType::HighLowCarb => Some(if marked {
            DayType::HighCarb
        } else {
            DayType::LowCarb
        }),
        PatternType::EvenDistribution => Some(DayType::Even),
        PatternType::Custom | PatternType::Redistribution => Some(DayType::Custom),
        PatternType::Other(_) => None,
    }
}

/// Per-field mean over the weekdays that have targets, each rounded half-up.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn calculate_weekly_average(config: &MacroCycleConfig) -> DayTargets {
    if config.day_targets.is_empty() {
        return DayTargets::default();
    }
    let count = config.day_targets.len() as f64;
    let sum = config
        .day_targets
        .values()
        .fold(Totals::default(), |acc, t| acc.add(t));
    DayTargets {
        calories: (sum.calories / count).round() as i64,
        protein: (sum.protein / count).round(),
        carbs: (sum.carbs / count).round(),
        fat: (sum.fat / count).round(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedDay {
    pub date: NaiveDate,
    pub day_of_week: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_type: Option<DayType>,
    pub resolved: ResolvedTargets,
}

/// The seven days of the cycle week containing `date`, each resolved.
pub fn week_plan(source: &dyn TargetSource, date: NaiveDate, base: DayTargets) -> Vec<PlannedDay> {
    let config = source.cycle_config().unwrap_or_else(|e| {
        warn!(error = %e, "cycle config lookup failed, planning without day types");
        None
    });
    let start = week_start(
        date,
        config.as_ref().map_or(0, |c| c.redistribution_start_day),
    );

    (0..7)
        .map(|i| {
            let day = start + Duration::days(i);
            let dow = day_of_week(day);
            PlannedDay {
                date: day,
                day_of_week: dow,
                day_type: config.as_ref().and_then(|c| get_day_type(dow, c)),
                resolved: resolve_targets(source, day, base),
            }
        })
        .collect()
}

/// Spread what is left of the weekly budget over the unlocked days from
/// `today` to the end of the cycle week.
///
/// The weekly budget is the sum of each day's planned target: its cycling day
/// target while cycling is enabled, otherwise `base`. Past days subtract what
/// was actually eaten according to `intake`, or the target in effect for them
/// (as [`resolve_targets`] sees it) when no intake is recorded. Locked days
/// from `today` on subtract their target in effect and get no entry in the
/// result.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn plan_redistribution(
    source: &dyn TargetSource,
    config: &MacroCycleConfig,
    base: DayTargets,
    today: NaiveDate,
    intake: &BTreeMap<NaiveDate, DayTargets>,
) -> Vec<DatedTargets> {
    let planned = |date: NaiveDate| {
        if !config.enabled {
            return base;
        }
        config
            .day_targets
            .get(&day_of_week(date))
            .copied()
            .unwrap_or(base)
    };
    let in_effect = |date: NaiveDate| resolve_targets(source, date, base).targets();

    let start = week_start(today, config.redistribution_start_day);
    let week: Vec<NaiveDate> = (0..7).map(|i| start + Duration::days(i)).collect();

    let mut remaining = week
        .iter()
        .fold(Totals::default(), |acc, d| acc.add(&planned(*d)));

    let mut open = Vec::new();
    for &date in &week {
        if date < today {
            let eaten = intake.get(&date).copied().unwrap_or_else(|| in_effect(date));
            remaining = remaining.sub(&eaten);
        } else if config.locked_days.contains(&day_of_week(date)) {
            remaining = remaining.sub(&in_effect(date));
        } else {
            open.push(date);
        }
    }

    if open.is_empty() {
        debug!(%today, "no unlocked days left to redistribute");
        return Vec::new();
    }

    let per_day = remaining.scale(1.0 / open.len() as f64);
    let targets = DayTargets {
        calories: per_day.calories.max(0.0).round() as i64,
        protein: round1(per_day.protein.max(0.0)),
        carbs: round1(per_day.carbs.max(0.0)),
        fat: round1(per_day.fat.max(0.0)),
    };
    open.into_iter()
        .map(|date| DatedTargets { date, targets })
        .collect()
}

pub(crate) fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Copy, Default)]
struct Totals {
    calories: f64,
    protein: f64,
    carbs: f64,
    fat: f64,
}

impl Totals {
    #[allow(clippy::cast_precision_loss)]
    fn add(self, t: &DayTargets) -> Self {
        Self {
            calories: self.calories + t.calories as f64,
            protein: self.protein + t.protein,
            carbs: self.carbs + t.carbs,
            fat: self.fat + t.fat,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn sub(self, t: &DayTargets) -> Self {
        Self {
            calories: self.calories - t.calories as f64,
            protein: self.protein - t.protein,
            carbs: self.carbs - t.carbs,
            fat: self.fat - t.fat,
        }
    }

    fn scale(self, k: f64) -> Self {
        Self {
            calories: self.calories * k,
            protein: self.protein * k,
            carbs: self.carbs * k,
            fat: self.fat * k,
        }
    }
}
