use anyhow::Result;

use heft_core::goals::GoalProfile;
use heft_core::service::HeftService;

use super::helpers::{format_targets, json_error};

fn print_profile(profile: &GoalProfile) {
    println!(
        "  {:?}, {} years, {:.0} cm, {:.1} kg",
        profile.sex, profile.age_years, profile.height_cm, profile.weight_kg
    );
    println!("  Activity:     {}", profile.activity_level);
    println!(
        "  Goal:         {:?} ({:.2} kg/week)",
        profile.goal, profile.weekly_rate_kg
    );
    println!(
        "  Macro split:  P {}%  C {}%  F {}%",
        profile.protein_pct, profile.carbs_pct, profile.fat_pct
    );
    println!("  BMR:          {:.0} kcal", profile.bmr());
    println!("  TDEE:         {:.0} kcal", profile.tdee());
}

pub(crate) fn cmd_goal_set(svc: &HeftService, profile: &GoalProfile, json: bool) -> Result<()> {
    let targets = svc.set_goal_profile(profile)?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "profile": profile, "base_targets": targets })
        );
    } else {
        println!("Goal profile saved.");
        print_profile(profile);
        println!("  Base targets: {}", format_targets(&targets));
    }
    Ok(())
}

pub(crate) fn cmd_goal_show(svc: &HeftService, json: bool) -> Result<()> {
    let Some(profile) = svc.get_goal_profile()? else {
        if json {
            println!("{}", json_error("No goal profile set"));
        } else {
            eprintln!("No goal profile set. Use `heft goal set` to create one.");
        }
        return Ok(());
    };
    let targets = profile.base_targets()?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "profile": profile, "base_targets": targets })
        );
    } else {
        println!("Goal profile:");
        print_profile(&profile);
        println!("  Base targets: {}", format_targets(&targets));
        if let Some(active) = svc.base_targets()? {
            if active != targets {
                println!("  Manual base targets in effect: {}", format_targets(&active));
            }
        }
    }
    Ok(())
}

pub(crate) fn cmd_goal_clear(svc: &HeftService, json: bool) -> Result<()> {
    let cleared = svc.clear_goal_profile()?;
    if json {
        println!("{}", serde_json::json!({ "cleared": cleared }));
    } else if cleared {
        println!("Goal profile cleared");
    } else {
        eprintln!("No goal profile was set");
    }
    Ok(())
}
