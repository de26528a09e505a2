use std::collections::BTreeMap;
use std::io::Read;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use crate::db::Database;
use crate::models::{DATE_FORMAT, NewWeightEntry, validate_weight_kg};

pub const KG_PER_LB: f64 = 0.453_592;

pub const IMPORT_SOURCE: &str = "import";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightUnit {
    Kg,
    Lbs,
}

impl WeightUnit {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "kg" | "kgs" | "kilograms" => Some(Self::Kg),
            "lb" | "lbs" | "pounds" => Some(Self::Lbs),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_kg(self, value: f64) -> f64 {
        match self {
            Self::Kg => value,
            Self::Lbs => value * KG_PER_LB,
        }
    }
}

/// A single weigh-in parsed from a third-party CSV export.
#[derive(Debug, Clone)]
pub struct WeightRow {
    pub date: String,
    pub weight: f64,
    pub unit: WeightUnit,
    pub notes: Option<String>,
}

impl WeightRow {
    #[must_use]
    pub fn weight_kg(&self) -> f64 {
        self.unit.to_kg(self.weight)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WeightImportSummary {
    pub rows_parsed: usize,
    pub imported: usize,
    pub skipped_out_of_range: usize,
    pub duplicate_dates: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_date: Option<NaiveDate>,
    pub dry_run: bool,
}

/// Parse a weight CSV export from any reader.
///
/// Requires a `Date` column and one of `Weight (kg)`, `Weight (lbs)` or
/// `Weight`. A plain `Weight` column takes its unit from an optional `Unit`
/// column and defaults to kilograms. `Notes` or `Comment` is carried along.
pub fn parse_weight_csv<R: Read>(reader: R) -> Result<Vec<WeightRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("Failed to read CSV headers")?.clone();
    let col =
        |name: &str| -> Option<usize> { headers.iter().position(|h| h.eq_ignore_ascii_case(name)) };

    let idx_date = col("Date").context("Missing required column: Date")?;
    let (idx_weight, fixed_unit) = if let Some(i) = col("Weight (kg)") {
        (i, Some(WeightUnit::Kg))
    } else if let Some(i) = col("Weight (lbs)").or_else(|| col("Weight (lb)")) {
        (i, Some(WeightUnit::Lbs))
    } else if let Some(i) = col("Weight") {
        (i, None)
    } else {
        bail!("Missing required column: Weight (kg), Weight (lbs) or Weight");
    };
    let idx_unit = col("Unit");
    let idx_notes = col("Notes").or_else(|| col("Comment"));

    let mut rows = Vec::new();

    for (line_num, result) in rdr.records().enumerate() {
        let line = line_num + 2;
        let record = result.with_context(|| format!("Failed to parse CSV row {line}"))?;

        let date = record.get(idx_date).unwrap_or("").trim().to_string();
        let raw_weight = record.get(idx_weight).unwrap_or("").trim();
        if date.is_empty() || raw_weight.is_empty() {
            continue;
        }

        let weight: f64 = raw_weight
            .parse()
            .with_context(|| format!("Invalid weight '{raw_weight}' on row {line}"))?;

        let unit = match fixed_unit {
            Some(unit) => unit,
            None => match idx_unit.and_then(|i| record.get(i)).map(str::trim) {
                None | Some("") => WeightUnit::Kg,
                Some(raw) => WeightUnit::parse(raw)
                    .with_context(|| format!("Unknown unit '{raw}' on row {line}"))?,
            },
        };

        let notes = idx_notes
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        rows.push(WeightRow {
            date,
            weight,
            unit,
            notes,
        });
    }

    Ok(rows)
}

/// Normalize the date formats common in weight exports.
///
/// Slash dates are read month-first; a day-first reading is used only when
/// the month-first one is impossible.
pub fn normalize_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    for fmt in [DATE_FORMAT, "%Y/%m/%d", "%m/%d/%Y", "%d/%m/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Ok(d);
        }
    }
    // ISO timestamps such as 2024-01-15T07:30:00Z keep only the date part.
    match raw.get(..10) {
        Some(prefix) if raw.len() > 10 => NaiveDate::parse_from_str(prefix, DATE_FORMAT)
            .with_context(|| format!("Cannot parse date: '{raw}'")),
        _ => bail!("Cannot parse date: '{raw}'"),
    }
}

/// Import parsed rows into the database.
///
/// Rows outside the accepted weight range are skipped and counted. When a date
/// appears more than once the last row wins. All writes and the trend refold
/// happen in one transaction. When `dry_run` is true, nothing is written.
pub fn import_weights(
    db: &Database,
    rows: &[WeightRow],
    dry_run: bool,
) -> Result<WeightImportSummary> {
    let mut summary = WeightImportSummary {
        rows_parsed: rows.len(),
        dry_run,
        ..WeightImportSummary::default()
    };
    let mut by_date: BTreeMap<NaiveDate, NewWeightEntry> = BTreeMap::new();

    for row in rows {
        let date = normalize_date(&row.date)?;
        let weight_kg = row.weight_kg();
        if let Err(e) = validate_weight_kg(weight_kg) {
            debug!(%date, error = %e, "skipping out-of-range weight");
            summary.skipped_out_of_range += 1;
            continue;
        }
        let previous = by_date.insert(
            date,
            NewWeightEntry {
                date,
                weight_kg,
                source: IMPORT_SOURCE.to_string(),
                notes: row.notes.clone(),
            },
        );
        if previous.is_some() {
            summary.duplicate_dates += 1;
        }
    }

    summary.first_date = by_date.keys().next().copied();
    summary.last_date = by_date.keys().next_back().copied();
    let entries: Vec<NewWeightEntry> = by_date.into_values().collect();
    summary.imported = entries.len();

    if !dry_run {
        db.upsert_weights(&entries)?;
        info!(
            imported = summary.imported,
            skipped = summary.skipped_out_of_range,
            "imported weight entries"
        );
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CSV: &str = "\
Date,Weight (kg),Notes
2024-01-15,82.4,Morning
2024-01-16,82.1,
2024-01-18,81.7,After run
";

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_parse_weight_csv_basic() {
        let rows = parse_weight_csv(SAMPLE_CSV.as_bytes()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].date, "2024-01-15");
        assert!((rows[0].weight_kg() - 82.4).abs() < f64::EPSILON);
        assert_eq!(rows[0].notes.as_deref(), Some("Morning"));
        assert!(rows[1].notes.is_none());
    }

    #[test]
    fn test_parse_weight_csv_lbs_column() {
        let csv = "date,weight (lbs)\n1/15/2024,180\n";
        let rows = parse_weight_csv(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].unit, WeightUnit::Lbs);
        assert!((rows[0].weight_kg() - 81.646_56).abs() < 1e-9);
    }

    #[test]
    fn test_parse_weight_csv_unit_column() {
        let csv = "\
Date,Weight,Unit,Comment
2024-01-15,176.5,lb,scale A
2024-01-16,80.2,kg,
2024-01-17,80.0,,
";
        let rows = parse_weight_csv(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].unit, WeightUnit::Lbs);
        assert_eq!(rows[0].notes.as_deref(), Some("scale A"));
        assert_eq!(rows[1].unit, WeightUnit::Kg);
        assert_eq!(rows[2].unit, WeightUnit::Kg);
    }

    #[test]
    fn test_parse_weight_csv_unknown_unit() {
        let csv = "Date,Weight,Unit\n2024-01-15,12,stone\n";
        let err = parse_weight_csv(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("stone"));
    }

    #[test]
    fn test_parse_weight_csv_missing_weight_column() {
        let csv = "Date,Calories\n2024-01-15,2000\n";
        let err = parse_weight_csv(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("Weight"));
    }

    #[test]
    fn test_parse_weight_csv_skips_blank_rows() {
        let csv = "Date,Weight (kg)\n2024-01-15,82.4\n,\n2024-01-16,\n2024-01-17,82.0\n";
        let rows = parse_weight_csv(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_normalize_date_formats() {
        assert_eq!(normalize_date("2024-01-15").unwrap(), d(2024, 1, 15));
        assert_eq!(normalize_date("2024/01/15").unwrap(), d(2024, 1, 15));
        assert_eq!(normalize_date("1/15/2024").unwrap(), d(2024, 1, 15));
        assert_eq!(normalize_date("15/01/2024").unwrap(), d(2024, 1, 15));
        assert_eq!(normalize_date("2024-01-15T07:30:00Z").unwrap(), d(2024, 1, 15));
        assert!(normalize_date("yesterday").is_err());
    }

    #[test]
    fn test_import_weights_dry_run_writes_nothing() {
        let db = Database::open_in_memory().unwrap();
        let rows = parse_weight_csv(SAMPLE_CSV.as_bytes()).unwrap();

        let summary = import_weights(&db, &rows, true).unwrap();
        assert_eq!(summary.rows_parsed, 3);
        assert_eq!(summary.imported, 3);
        assert!(summary.dry_run);
        assert!(db.get_weight_history(None).unwrap().is_empty());
    }

    #[test]
    fn test_import_weights_writes_and_computes_trend() {
        let db = Database::open_in_memory().unwrap();
        let rows = parse_weight_csv(SAMPLE_CSV.as_bytes()).unwrap();

        let summary = import_weights(&db, &rows, false).unwrap();
        assert_eq!(summary.imported, 3);
        assert_eq!(summary.first_date, Some(d(2024, 1, 15)));
        assert_eq!(summary.last_date, Some(d(2024, 1, 18)));

        let history = db.get_weight_history(None).unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|e| e.source == IMPORT_SOURCE));
        assert!(history.iter().all(|e| e.trend_weight_kg.is_some()));
        assert_eq!(history[2].trend_weight_kg, Some(82.4));
    }

    #[test]
    fn test_import_weights_skips_out_of_range_and_keeps_last_duplicate() {
        let db = Database::open_in_memory().unwrap();
        let csv = "\
Date,Weight (kg)
2024-01-15,82.4
2024-01-15,82.0
2024-01-16,8.2
2024-01-17,820
";
        let rows = parse_weight_csv(csv.as_bytes()).unwrap();
        let summary = import_weights(&db, &rows, false).unwrap();
        assert_eq!(summary.rows_parsed, 4);
        assert_eq!(summary.imported, 1);
        assert_eq!(summary.duplicate_dates, 1);
        assert_eq!(summary.skipped_out_of_range, 2);

        let entry = db.get_weight(d(2024, 1, 15)).unwrap().unwrap();
        assert!((entry.weight_kg - 82.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_import_weights_bad_date_fails_whole_import() {
        let db = Database::open_in_memory().unwrap();
        let csv = "Date,Weight (kg)\n2024-01-15,82.4\nsometime,82.0\n";
        let rows = parse_weight_csv(csv.as_bytes()).unwrap();
        assert!(import_weights(&db, &rows, false).is_err());
        assert!(db.get_weight_history(None).unwrap().is_empty());
    }
}
