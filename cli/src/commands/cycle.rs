use anyhow::Result;

use heft_core::macro_cycle::get_day_type;
use heft_core::models::{DayTargets, MacroCycleConfig, PatternType};
use heft_core::service::HeftService;

use super::helpers::{
    TargetRow, day_list, day_name, format_targets, parse_day, parse_days, print_target_table,
};

fn print_config(svc: &HeftService, config: &MacroCycleConfig, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    println!(
        "Macro cycling: {} ({})",
        if config.enabled { "enabled" } else { "disabled" },
        config.pattern_type
    );
    println!("  Marked days:  {}", day_list(&config.marked_days));
    println!("  Locked days:  {}", day_list(&config.locked_days));
    println!(
        "  Week starts:  {}",
        day_name(config.redistribution_start_day)
    );

    if config.day_targets.is_empty() {
        println!("\nNo per-day targets. Use `heft cycle set-day` to add some.");
        return Ok(());
    }

    let rows: Vec<TargetRow> = config
        .day_targets
        .iter()
        .map(|(dow, t)| {
            let day_type = get_day_type(*dow, config);
            TargetRow::new(
                "-".to_string(),
                day_name(*dow),
                day_type.map_or("-", |d| d.as_str()),
                "cycling",
                t,
            )
        })
        .collect();
    println!();
    print_target_table(&rows);

    let avg = svc.calculate_weekly_average()?;
    println!("Weekly average: {}", format_targets(&avg));
    Ok(())
}

/// Load, mutate and save the cycle config, then print the result.
fn update_config(
    svc: &HeftService,
    json: bool,
    f: impl FnOnce(&mut MacroCycleConfig),
) -> Result<()> {
    let mut config = svc.get_cycle_config()?;
    f(&mut config);
    let saved = svc.save_cycle_config(&config)?;
    print_config(svc, &saved, json)
}

pub(crate) fn cmd_cycle_show(svc: &HeftService, json: bool) -> Result<()> {
    let config = svc.get_cycle_config()?;
    print_config(svc, &config, json)
}

pub(crate) fn cmd_cycle_enable(svc: &HeftService, pattern: Option<String>, json: bool) -> Result<()> {
    update_config(svc, json, |c| {
        c.enabled = true;
        if let Some(p) = pattern {
            c.pattern_type = PatternType::from(p);
        }
    })
}

pub(crate) fn cmd_cycle_disable(svc: &HeftService, json: bool) -> Result<()> {
    update_config(svc, json, |c| c.enabled = false)
}

pub(crate) fn cmd_cycle_set_day(
    svc: &HeftService,
    day: &str,
    targets: DayTargets,
    json: bool,
) -> Result<()> {
    let dow = parse_day(day)?;
    update_config(svc, json, |c| {
        c.day_targets.insert(dow, targets);
    })
}

pub(crate) fn cmd_cycle_clear_day(svc: &HeftService, day: &str, json: bool) -> Result<()> {
    let dow = parse_day(day)?;
    update_config(svc, json, |c| {
        c.day_targets.remove(&dow);
    })
}

pub(crate) fn cmd_cycle_mark(svc: &HeftService, days: &str, json: bool) -> Result<()> {
    let days = parse_days(days)?;
    update_config(svc, json, |c| c.marked_days = days)
}

pub(crate) fn cmd_cycle_lock(svc: &HeftService, days: &str, json: bool) -> Result<()> {
    let days = parse_days(days)?;
    update_config(svc, json, |c| c.locked_days = days)
}

pub(crate) fn cmd_cycle_start_day(svc: &HeftService, day: &str, json: bool) -> Result<()> {
    let dow = parse_day(day)?;
    update_config(svc, json, |c| c.redistribution_start_day = dow)
}

pub(crate) fn cmd_cycle_average(svc: &HeftService, json: bool) -> Result<()> {
    let avg = svc.calculate_weekly_average()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&avg)?);
    } else {
        println!("Weekly average: {}", format_targets(&avg));
    }
    Ok(())
}

pub(crate) fn cmd_cycle_day_type(svc: &HeftService, day: &str, json: bool) -> Result<()> {
    let dow = parse_day(day)?;
    let day_type = svc.get_day_type(dow)?;
    if json {
        println!(
            "{}",
            serde_json::json!({ "day_of_week": dow, "day_type": day_type })
        );
    } else {
        println!(
            "{}: {}",
            day_name(dow),
            day_type.map_or("none (cycling disabled or pattern unknown)", |d| d.as_str())
        );
    }
    Ok(())
}
