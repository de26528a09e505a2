use anyhow::{Result, bail};

use heft_core::macro_cycle::day_of_week;
use heft_core::models::{DayTargets, parse_date};
use heft_core::service::HeftService;

use super::helpers::{TargetRow, date_arg, day_name, format_targets, print_target_table};

fn stored_base(svc: &HeftService) -> Result<DayTargets> {
    match svc.base_targets()? {
        Some(t) => Ok(t),
        None => bail!("No base targets. Use `heft target set` or `heft goal set` to define them"),
    }
}

pub(crate) fn cmd_target_show(svc: &HeftService, date: Option<String>, json: bool) -> Result<()> {
    let date = date_arg(date)?;
    let resolved = svc.targets_for(&date)?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "date": date, "resolved": resolved })
        );
    } else {
        let dow = day_of_week(parse_date(&date)?);
        println!(
            "{date} ({}): {}  [{}]",
            day_name(dow),
            format_targets(&resolved.targets()),
            resolved.source()
        );
    }

    Ok(())
}

pub(crate) fn cmd_target_week(svc: &HeftService, date: Option<String>, json: bool) -> Result<()> {
    let date = date_arg(date)?;
    let base = stored_base(svc)?;
    let plan = svc.week_plan(&date, &base)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        let rows: Vec<TargetRow> = plan
            .iter()
            .map(|p| {
                TargetRow::new(
                    p.date.to_string(),
                    day_name(p.day_of_week),
                    p.day_type.map_or("-", |t| t.as_str()),
                    p.resolved.source(),
                    &p.resolved.targets(),
                )
            })
            .collect();
        print_target_table(&rows);
    }

    Ok(())
}

pub(crate) fn cmd_target_set(svc: &HeftService, targets: &DayTargets, json: bool) -> Result<()> {
    svc.set_base_targets(targets)?;

    if json {
        println!("{}", serde_json::to_string_pretty(targets)?);
    } else {
        println!("Base targets: {}", format_targets(targets));
    }

    Ok(())
}

pub(crate) fn cmd_target_clear(svc: &HeftService, json: bool) -> Result<()> {
    let cleared = svc.clear_base_targets()?;

    if json {
        println!("{}", serde_json::json!({ "cleared": cleared }));
    } else if cleared {
        println!("Base targets cleared");
    } else {
        eprintln!("No base targets were set");
    }
    Ok(())
}
