use anyhow::Result;

use heft_core::macro_cycle::day_of_week;
use heft_core::models::DayTargets;
use heft_core::service::HeftService;

use super::helpers::{TargetRow, date_arg, day_name, format_targets, json_error, print_target_table};

pub(crate) fn cmd_override_set(
    svc: &HeftService,
    date: Option<String>,
    targets: &DayTargets,
    json: bool,
) -> Result<()> {
    let date = date_arg(date)?;
    let saved = svc.set_override(&date, targets)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&saved)?);
    } else {
        println!("Override for {date}: {}", format_targets(&saved.targets()));
    }
    Ok(())
}

pub(crate) fn cmd_override_clear(svc: &HeftService, date: Option<String>, json: bool) -> Result<()> {
    let date = date_arg(date)?;
    let cleared = svc.clear_override(&date)?;

    if json {
        if cleared {
            println!("{}", serde_json::json!({ "cleared": date }));
        } else {
            println!("{}", json_error(&format!("No override for {date}")));
        }
    } else if cleared {
        println!("Cleared override for {date}");
    } else {
        eprintln!("No override for {date}");
    }
    Ok(())
}

pub(crate) fn cmd_override_list(svc: &HeftService, from: Option<String>, json: bool) -> Result<()> {
    let from = from.map(|d| date_arg(Some(d))).transpose()?;
    let overrides = svc.list_overrides(from.as_deref())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&overrides)?);
    } else if overrides.is_empty() {
        eprintln!("No overrides found.");
    } else {
        let rows: Vec<TargetRow> = overrides
            .iter()
            .map(|o| {
                TargetRow::new(
                    o.date.to_string(),
                    day_name(day_of_week(o.date)),
                    "-",
                    "override",
                    &o.targets(),
                )
            })
            .collect();
        print_target_table(&rows);
    }
    Ok(())
}
