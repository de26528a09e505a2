use std::path::Path;

use anyhow::{Context, Result};

use heft_core::service::HeftService;

pub(crate) fn cmd_import_weights(svc: &HeftService, path: &Path, dry_run: bool, json: bool) -> Result<()> {
    let csv_data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;

    let summary = svc.import_weight_csv(&csv_data, dry_run)?;

    if summary.rows_parsed == 0 {
        if json {
            println!(
                "{}",
                serde_json::json!({ "error": "No rows found in CSV file" })
            );
        } else {
            eprintln!("No rows found in CSV file.");
        }
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    if dry_run {
        println!("Dry run, no changes made.\n");
        println!("  Rows parsed:      {}", summary.rows_parsed);
        println!("  Entries to write: {}", summary.imported);
    } else {
        println!("Import complete.\n");
        println!("  Rows parsed:      {}", summary.rows_parsed);
        println!("  Entries written:  {}", summary.imported);
    }
    println!("  Out of range:     {}", summary.skipped_out_of_range);
    println!("  Duplicate dates:  {}", summary.duplicate_dates);
    if let (Some(first), Some(last)) = (summary.first_date, summary.last_date) {
        println!("  Dates spanned:    {first} to {last}");
    }

    Ok(())
}
