use anyhow::{Result, bail};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use heft_core::models::DATE_FORMAT;
use heft_core::service::HeftService;
use heft_core::weight_import::KG_PER_LB;

use super::helpers::{date_arg, json_error, no_neg_zero};

const LBS_PER_KG: f64 = 2.20462;

fn fmt_trend(trend: Option<f64>) -> String {
    trend.map_or_else(|| "-".to_string(), |t| format!("{t:.1}"))
}

pub(crate) fn cmd_weight_log(
    svc: &HeftService,
    value: f64,
    unit: &str,
    date: Option<String>,
    notes: Option<String>,
    json: bool,
) -> Result<()> {
    if value <= 0.0 {
        bail!("Weight must be greater than 0");
    }

    let weight_kg = match unit.to_lowercase().as_str() {
        "kg" => value,
        "lbs" | "lb" => {
            let kg = no_neg_zero(value * KG_PER_LB);
            eprintln!("Converting {value:.1} lbs → {kg:.2} kg");
            kg
        }
        _ => bail!("Invalid unit '{unit}'. Use 'kg' or 'lbs'"),
    };

    let result = svc.log_weight(&date_arg(date)?, weight_kg, notes)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        let lbs = result.weight_kg * LBS_PER_KG;
        println!(
            "Logged {:.1} kg ({:.1} lbs) for {}  trend {} kg",
            result.weight_kg,
            lbs,
            result.date.format(DATE_FORMAT),
            fmt_trend(result.trend_weight_kg)
        );
        if let Some(ref n) = result.notes {
            println!("  Notes: {n}");
        }
    }

    Ok(())
}

pub(crate) fn cmd_weight_show(svc: &HeftService, date: Option<String>, json: bool) -> Result<()> {
    let date = date_arg(date)?;

    if let Some(e) = svc.get_weight(&date)? {
        if json {
            println!("{}", serde_json::to_string_pretty(&e)?);
        } else {
            println!(
                "{}: {:.1} kg ({:.1} lbs)  trend {} kg",
                e.date.format(DATE_FORMAT),
                e.weight_kg,
                e.weight_kg * LBS_PER_KG,
                fmt_trend(e.trend_weight_kg)
            );
            if let Some(ref n) = e.notes {
                println!("  Notes: {n}");
            }
        }
    } else if json {
        println!("{}", json_error(&format!("No weight entry for {date}")));
    } else {
        eprintln!("No weight entry for {date}");
    }

    Ok(())
}

pub(crate) fn cmd_weight_history(svc: &HeftService, days: Option<u32>, json: bool) -> Result<()> {
    let entries = svc.get_weight_history(days.map(i64::from))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        eprintln!("No weight entries found. Use `heft weight log` to record your weight.");
    } else {
        #[derive(Tabled)]
        struct WeightRow {
            #[tabled(rename = "ID")]
            id: i64,
            #[tabled(rename = "Date")]
            date: String,
            #[tabled(rename = "Weight (kg)")]
            kg: String,
            #[tabled(rename = "Trend (kg)")]
            trend: String,
            #[tabled(rename = "Weight (lbs)")]
            lbs: String,
            #[tabled(rename = "Notes")]
            notes: String,
        }

        let rows: Vec<WeightRow> = entries
            .iter()
            .map(|e| WeightRow {
                id: e.id,
                date: e.date.format(DATE_FORMAT).to_string(),
                kg: format!("{:.1}", e.weight_kg),
                trend: fmt_trend(e.trend_weight_kg),
                lbs: format!("{:.1}", e.weight_kg * LBS_PER_KG),
                notes: e.notes.clone().unwrap_or_default(),
            })
            .collect();

        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(2..5)).with(Alignment::right()))
            .to_string();
        println!("{table}");
    }

    Ok(())
}

pub(crate) fn cmd_weight_delete(svc: &HeftService, id: i64, json: bool) -> Result<()> {
    svc.delete_weight(id)?;

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted weight entry {id}");
    }

    Ok(())
}

pub(crate) fn cmd_weight_recompute(svc: &HeftService, from: Option<String>, json: bool) -> Result<()> {
    let from = from.map(|d| date_arg(Some(d))).transpose()?;
    let rewritten = svc.recompute_trends(from.as_deref())?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "from": from, "recomputed": rewritten })
        );
    } else {
        match from {
            Some(d) => println!("Recomputed trend for {rewritten} entries from {d}"),
            None => println!("Recomputed trend for {rewritten} entries"),
        }
    }

    Ok(())
}
