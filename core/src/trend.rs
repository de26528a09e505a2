use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::models::WeightEntry;

/// An observation this many days old keeps half its influence on the trend,
/// however many days were skipped in between.
pub const HALF_LIFE_DAYS: f64 = 7.0;

/// Lower bound for the day gap. Same-day or out-of-order pairs still produce a
/// small positive alpha instead of zero or a negative weight.
pub const MIN_DAY_GAP: f64 = 0.01;

const SECONDS_PER_DAY: f64 = 86_400.0;

fn noon(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(12, 0, 0)
        .unwrap_or_else(|| date.and_time(NaiveTime::MIN))
}

/// Days between two weigh-ins, both anchored at noon, clamped to
/// [`MIN_DAY_GAP`].
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn day_gap(prev: NaiveDate, next: NaiveDate) -> f64 {
    let seconds = (noon(next) - noon(prev)).num_seconds() as f64;
    (seconds / SECONDS_PER_DAY).max(MIN_DAY_GAP)
}

/// `1 - 2^(-gap / half_life)`
#[must_use]
pub fn smoothing_alpha(day_gap: f64) -> f64 {
    1.0 - (-day_gap / HALF_LIFE_DAYS).exp2()
}

/// Accumulator of the fold: the last trend value and the date it belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendState {
    pub date: NaiveDate,
    pub trend: f64,
}

impl TrendState {
    /// The first weigh-in of a series seeds the trend with its raw value.
    #[must_use]
    pub fn seed(date: NaiveDate, weight_kg: f64) -> Self {
        Self {
            date,
            trend: weight_kg,
        }
    }

    #[must_use]
    pub fn advance(self, date: NaiveDate, weight_kg: f64) -> Self {
        let alpha = smoothing_alpha(day_gap(self.date, date));
        Self {
            date,
            trend: alpha * weight_kg + (1.0 - alpha) * self.trend,
        }
    }
}

/// Fold `(date, weight_kg)` samples (ascending by date) into trend values.
///
/// With `seed = None` the first sample seeds the series. The fold is strictly
/// left to right, so changing any sample invalidates every later value.
pub fn fold_trend<I>(samples: I, seed: Option<TrendState>) -> Vec<f64>
where
    I: IntoIterator<Item = (NaiveDate, f64)>,
{
    samples
        .into_iter()
        .scan(seed, |state, (date, weight_kg)| {
            let next = match *state {
                Some(prev) => prev.advance(date, weight_kg),
                None => TrendState::seed(date, weight_kg),
            };
            *state = Some(next);
            Some(next.trend)
        })
        .collect()
}

fn apply(entries: &mut [WeightEntry], seed: Option<TrendState>) {
    let trends = fold_trend(entries.iter().map(|e| (e.date, e.weight_kg)), seed);
    for (entry, trend) in entries.iter_mut().zip(trends) {
        entry.trend_weight_kg = Some(trend);
    }
}

/// Recompute every trend value from scratch. `entries` must be sorted
/// ascending by date; an empty slice is a no-op.
pub fn compute_trend(entries: &mut [WeightEntry]) {
    apply(entries, None);
}

/// Recompute the trend for every entry dated on or after `start`, seeded from
/// the stored trend of the entry immediately before `start`.
///
/// When that entry has no stored trend the whole history is recomputed. When
/// nothing precedes `start`, the first recomputed entry seeds itself.
/// Returns the number of entries whose trend was rewritten.
pub fn recompute_from(entries: &mut [WeightEntry], start: NaiveDate) -> usize {
    let split = entries.partition_point(|e| e.date < start);
    let seed = match split.checked_sub(1).map(|i| &entries[i]) {
        None => None,
        Some(prev) => match prev.trend_weight_kg {
            Some(trend) => Some(TrendState {
                date: prev.date,
                trend,
            }),
            None => {
                compute_trend(entries);
                return entries.len();
            }
        },
    };
    apply(&mut entries[split..], seed);
    entries.len() - split
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn entry(date: NaiveDate, weight_kg: f64) -> WeightEntry {
        WeightEntry {
            id: 0,
            uuid: String::new(),
            date,
            weight_kg,
            trend_weight_kg: None,
            source: "manual".to_string(),
            notes: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn history() -> Vec<WeightEntry> {
        vec![
            entry(d(2024, 3, 1), 82.0),
            entry(d(2024, 3, 2), 81.6),
            entry(d(2024, 3, 5), 81.9),
            entry(d(2024, 3, 6), 81.1),
            entry(d(2024, 3, 13), 80.4),
            entry(d(2024, 3, 14), 80.9),
            entry(d(2024, 3, 30), 79.8),
        ]
    }

    fn trends(entries: &[WeightEntry]) -> Vec<f64> {
        entries.iter().map(|e| e.trend_weight_kg.unwrap()).collect()
    }

    #[test]
    fn test_first_entry_trend_equals_raw_weight() {
        let mut entries = history();
        compute_trend(&mut entries);
        assert_eq!(entries[0].trend_weight_kg, Some(82.0));
    }

    #[test]
    fn test_seven_day_gap_moves_exactly_halfway() {
        assert_eq!(day_gap(d(2024, 1, 1), d(2024, 1, 8)), 7.0);
        assert_eq!(smoothing_alpha(7.0), 0.5);

        let mut entries = vec![entry(d(2024, 1, 1), 80.0), entry(d(2024, 1, 8), 78.0)];
        compute_trend(&mut entries);
        assert_eq!(entries[1].trend_weight_kg, Some(79.0));
    }

    #[test]
    fn test_fourteen_day_gap_uses_three_quarters() {
        assert_eq!(smoothing_alpha(day_gap(d(2024, 1, 1), d(2024, 1, 15))), 0.75);
    }

    #[test]
    fn test_one_day_step() {
        let mut entries = vec![entry(d(2024, 1, 1), 80.0), entry(d(2024, 1, 2), 81.0)];
        compute_trend(&mut entries);
        let alpha = 1.0 - 2f64.powf(-1.0 / 7.0);
        let expected = alpha * 81.0 + (1.0 - alpha) * 80.0;
        assert!((entries[1].trend_weight_kg.unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_gap_clamped_for_same_or_reversed_dates() {
        assert_eq!(day_gap(d(2024, 1, 5), d(2024, 1, 5)), MIN_DAY_GAP);
        assert_eq!(day_gap(d(2024, 1, 5), d(2024, 1, 3)), MIN_DAY_GAP);
        assert!(smoothing_alpha(MIN_DAY_GAP) > 0.0);
    }

    #[test]
    fn test_gap_ignores_daylight_saving_changes() {
        // US spring-forward and EU fall-back weekends.
        assert_eq!(day_gap(d(2024, 3, 9), d(2024, 3, 11)), 2.0);
        assert_eq!(day_gap(d(2024, 10, 26), d(2024, 10, 28)), 2.0);
    }

    #[test]
    fn test_empty_history_is_noop() {
        let mut entries: Vec<WeightEntry> = Vec::new();
        compute_trend(&mut entries);
        assert_eq!(recompute_from(&mut entries, d(2024, 1, 1)), 0);
    }

    #[test]
    fn test_trend_damps_noise() {
        let mut entries = history();
        compute_trend(&mut entries);
        // Raw dropped 0.8 kg between 3/5 and 3/6; trend moves far less.
        let raw_step = entries[2].weight_kg - entries[3].weight_kg;
        let trend_step = entries[2].trend_weight_kg.unwrap() - entries[3].trend_weight_kg.unwrap();
        assert!(trend_step > 0.0);
        assert!(trend_step < raw_step / 4.0);
    }

    #[test]
    fn test_recompute_from_matches_full_recompute() {
        let mut full = history();
        compute_trend(&mut full);

        let mut partial = full.clone();
        // Corrupt everything from the start date on, then recompute.
        for e in partial.iter_mut().skip(3) {
            e.trend_weight_kg = Some(0.0);
        }
        let rewritten = recompute_from(&mut partial, d(2024, 3, 6));
        assert_eq!(rewritten, 4);
        assert_eq!(trends(&partial), trends(&full));
    }

    #[test]
    fn test_recompute_from_date_between_entries() {
        let mut full = history();
        compute_trend(&mut full);

        let mut partial = full.clone();
        partial[5].trend_weight_kg = None;
        partial[6].trend_weight_kg = None;
        // 3/20 has no entry; recompute picks up 3/30 seeded from 3/14.
        let rewritten = recompute_from(&mut partial, d(2024, 3, 14));
        assert_eq!(rewritten, 2);
        assert_eq!(trends(&partial), trends(&full));

        let mut gap = full.clone();
        gap[6].trend_weight_kg = None;
        assert_eq!(recompute_from(&mut gap, d(2024, 3, 20)), 1);
        assert_eq!(trends(&gap), trends(&full));
    }

    #[test]
    fn test_recompute_from_before_history_seeds_itself() {
        let mut entries = history();
        let rewritten = recompute_from(&mut entries, d(2020, 1, 1));
        assert_eq!(rewritten, entries.len());
        assert_eq!(entries[0].trend_weight_kg, Some(82.0));
    }

    #[test]
    fn test_recompute_from_without_stored_seed_restarts() {
        let mut full = history();
        compute_trend(&mut full);

        // Nothing has a stored trend yet.
        let mut fresh = history();
        let rewritten = recompute_from(&mut fresh, d(2024, 3, 13));
        assert_eq!(rewritten, fresh.len());
        assert_eq!(trends(&fresh), trends(&full));
    }

    #[test]
    fn test_fold_trend_with_seed() {
        let seed = TrendState::seed(d(2024, 1, 1), 80.0);
        let out = fold_trend([(d(2024, 1, 8), 78.0), (d(2024, 1, 15), 79.0)], Some(seed));
        assert_eq!(out, vec![79.0, 79.0]);
    }
}
