use anyhow::{Context, Result};
use std::path::Path;

use psyjournal_core::models::JournalExport;
use psyjournal_core::service::JournalService;

use super::helpers::print_json;

pub(crate) fn cmd_export(svc: &JournalService, output: Option<&Path>) -> Result<()> {
    let export = svc.db().export_journal()?;
    let data = serde_json::to_string_pretty(&export)?;
    match output {
        Some(path) => {
            std::fs::write(path, data)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "Exported {} experiences to {}",
                export.experiences.len(),
                path.display()
            );
        }
        None => println!("{data}"),
    }
    Ok(())
}

pub(crate) fn cmd_import(svc: &JournalService, file: &Path, json: bool) -> Result<()> {
    let data = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to open file: {}", file.display()))?;
    let export: JournalExport =
        serde_json::from_str(&data).context("File is not a psyjournal export")?;
    let summary = svc.import_journal(&export)?;

    if json {
        print_json(&summary)?;
    } else {
        println!("Import complete.\n");
        println!("  Experiences:       {}", summary.experiences_imported);
        println!("  Ingestions:        {}", summary.ingestions_imported);
        println!("  Timed notes:       {}", summary.timed_notes_imported);
        println!(
            "  Custom substances: {} ({} skipped)",
            summary.custom_substances_imported, summary.custom_substances_skipped
        );
        println!("  Custom units:      {}", summary.custom_units_imported);
        println!("  Recipes:           {}", summary.custom_recipes_imported);
        println!("  Reminders:         {}", summary.reminders_imported);
    }
    Ok(())
}
