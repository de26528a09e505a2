use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use heft_core::macro_cycle::day_of_week;
use heft_core::models::DayTargets;
use heft_core::service::HeftService;

use super::helpers::{TargetRow, date_arg, day_name, print_target_table};

/// Read recorded intake as a JSON object of `YYYY-MM-DD` to day totals.
fn read_intake(path: &Path) -> Result<BTreeMap<NaiveDate, DayTargets>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid intake file: {}", path.display()))
}

pub(crate) fn cmd_redistribute(
    svc: &HeftService,
    intake: Option<&Path>,
    date: Option<String>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let today = date_arg(date)?;
    let intake = match intake {
        Some(path) => read_intake(path)?,
        None => BTreeMap::new(),
    };

    let plan = if dry_run {
        svc.plan_redistribution(&today, &intake)?
    } else {
        svc.apply_redistribution(&today, &intake)?
    };

    if json {
        println!(
            "{}",
            serde_json::json!({ "applied": !dry_run, "days": plan })
        );
        return Ok(());
    }

    if plan.is_empty() {
        eprintln!("No open days left to redistribute this week.");
        return Ok(());
    }

    let rows: Vec<TargetRow> = plan
        .iter()
        .map(|d| {
            TargetRow::new(
                d.date.to_string(),
                day_name(day_of_week(d.date)),
                "-",
                "redistributed",
                &d.targets,
            )
        })
        .collect();
    print_target_table(&rows);

    if dry_run {
        println!("Dry run, no overrides written.");
    } else {
        println!("Saved {} overrides.", plan.len());
    }
    Ok(())
}
