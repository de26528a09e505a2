use std::collections::BTreeSet;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use heft_core::models::{DATE_FORMAT, DAY_NAMES, DayTargets};

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, DATE_FORMAT).with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Same as [`parse_date`], formatted for the string-dated service API.
pub(crate) fn date_arg(date_str: Option<String>) -> Result<String> {
    Ok(parse_date(date_str)?.format(DATE_FORMAT).to_string())
}

/// Parse one weekday: a name, a three-letter abbreviation, or 0 (Sunday) to 6.
pub(crate) fn parse_day(day: &str) -> Result<u8> {
    let day = day.trim().to_lowercase();
    if let Ok(n) = day.parse::<u8>() {
        if n <= 6 {
            return Ok(n);
        }
        bail!("Invalid day: {n}. Use 0 (Sunday) to 6 (Saturday)");
    }
    match day.as_str() {
        "sunday" | "sun" => Ok(0),
        "monday" | "mon" => Ok(1),
        "tuesday" | "tue" => Ok(2),
        "wednesday" | "wed" => Ok(3),
        "thursday" | "thu" => Ok(4),
        "friday" | "fri" => Ok(5),
        "saturday" | "sat" => Ok(6),
        _ => bail!("Invalid day: {day}. Use sunday-saturday, sun-sat, or 0-6"),
    }
}

/// Parse a comma-separated list of weekdays, or one of the keywords
/// `weekdays`, `weekends`, `all`, `none`.
pub(crate) fn parse_days(days: &str) -> Result<BTreeSet<u8>> {
    match days.trim().to_lowercase().as_str() {
        "weekdays" => Ok((1..=5).collect()),
        "weekends" => Ok([0, 6].into_iter().collect()),
        "all" => Ok((0..=6).collect()),
        "none" | "" => Ok(BTreeSet::new()),
        list => list.split(',').map(parse_day).collect(),
    }
}

pub(crate) fn day_name(day_of_week: u8) -> &'static str {
    DAY_NAMES
        .get(usize::from(day_of_week))
        .copied()
        .unwrap_or("?")
}

pub(crate) fn day_list(days: &BTreeSet<u8>) -> String {
    if days.is_empty() {
        return "-".to_string();
    }
    days.iter()
        .map(|d| {
            let name = day_name(*d);
            name.get(..3).unwrap_or(name)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn format_targets(t: &DayTargets) -> String {
    format!(
        "{} kcal  P {:.0}g  C {:.0}g  F {:.0}g",
        t.calories, t.protein, t.carbs, t.fat
    )
}

#[derive(Tabled)]
pub(crate) struct TargetRow {
    #[tabled(rename = "Date")]
    pub date: String,
    #[tabled(rename = "Day")]
    pub day: String,
    #[tabled(rename = "Type")]
    pub day_type: String,
    #[tabled(rename = "Source")]
    pub source: String,
    #[tabled(rename = "Calories")]
    pub calories: String,
    #[tabled(rename = "Protein")]
    pub protein: String,
    #[tabled(rename = "Carbs")]
    pub carbs: String,
    #[tabled(rename = "Fat")]
    pub fat: String,
}

impl TargetRow {
    pub(crate) fn new(date: String, day: &str, day_type: &str, source: &str, t: &DayTargets) -> Self {
        Self {
            date,
            day: day.to_string(),
            day_type: day_type.to_string(),
            source: source.to_string(),
            calories: t.calories.to_string(),
            protein: format!("{:.1}", t.protein),
            carbs: format!("{:.1}", t.carbs),
            fat: format!("{:.1}", t.fat),
        }
    }
}

pub(crate) fn print_target_table(rows: &[TargetRow]) {
    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(4..8)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_none() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(None).unwrap(), today);
    }

    #[test]
    fn test_parse_date_keywords() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(Some("today".to_string())).unwrap(), today);
        assert_eq!(
            parse_date(Some("yesterday".to_string())).unwrap(),
            today - chrono::Duration::days(1)
        );
        assert_eq!(
            parse_date(Some("tomorrow".to_string())).unwrap(),
            today + chrono::Duration::days(1)
        );
    }

    #[test]
    fn test_parse_date_iso() {
        let date = parse_date(Some("2024-01-15".to_string())).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(date_arg(Some("2024-01-15".to_string())).unwrap(), "2024-01-15");
    }

    #[test]
    fn test_parse_date_invalid() {
        assert!(parse_date(Some("nope".to_string())).is_err());
    }

    #[test]
    fn test_parse_day() {
        assert_eq!(parse_day("Sunday").unwrap(), 0);
        assert_eq!(parse_day("mon").unwrap(), 1);
        assert_eq!(parse_day("6").unwrap(), 6);
        assert!(parse_day("7").is_err());
        assert!(parse_day("someday").is_err());
    }

    #[test]
    fn test_parse_days() {
        assert_eq!(
            parse_days("mon,wed,fri").unwrap(),
            [1, 3, 5].into_iter().collect()
        );
        assert_eq!(parse_days("weekends").unwrap(), [0, 6].into_iter().collect());
        assert_eq!(parse_days("all").unwrap().len(), 7);
        assert!(parse_days("none").unwrap().is_empty());
        assert!(parse_days("mon,blursday").is_err());
    }

    #[test]
    fn test_day_list() {
        assert_eq!(day_list(&[1, 3, 5].into_iter().collect()), "Mon, Wed, Fri");
        assert_eq!(day_list(&BTreeSet::new()), "-");
    }

    #[test]
    fn test_day_list_unknown_day() {
        assert_eq!(day_list(&[2, 9].into_iter().collect()), "Tue, ?");
    }

    #[test]
    fn test_format_targets() {
        assert_eq!(
            format_targets(&DayTargets::new(2000, 150.0, 200.0, 66.7)),
            "2000 kcal  P 150g  C 200g  F 67g"
        );
    }

    #[test]
    fn test_no_neg_zero() {
        assert_eq!(no_neg_zero(-0.0).to_bits(), 0.0_f64.to_bits());
        assert_eq!(no_neg_zero(5.0), 5.0);
    }
}
