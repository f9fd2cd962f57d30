use anyhow::{Context, Result, bail};
use std::path::Path;
use tabled::{Table, Tabled, settings::Style};

use psyjournal_core::models::{
    AdaptiveColor, AdministrationRoute, ExportCustomSubstance, NewCustomSubstance, Roa,
};
use psyjournal_core::search::SearchResult;
use psyjournal_core::service::{DEFAULT_RECENTS_LIMIT, JournalService};

use super::helpers::{exit_not_found, print_json, prompt_choice, truncate};

pub(crate) fn print_substance_table(results: &[SearchResult]) {
    #[derive(Tabled)]
    struct SubstanceRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Also known as")]
        aliases: String,
        #[tabled(rename = "Categories")]
        categories: String,
        #[tabled(rename = "Source")]
        source: &'static str,
    }

    let rows: Vec<SubstanceRow> = results
        .iter()
        .enumerate()
        .map(|(i, r)| match r {
            SearchResult::Reference(s) => SubstanceRow {
                idx: i + 1,
                name: s.name.clone(),
                aliases: truncate(&s.common_names.join(", "), 40),
                categories: s.categories.join(", "),
                source: "catalog",
            },
            SearchResult::Custom(c) => SubstanceRow {
                idx: i + 1,
                name: c.name.clone(),
                aliases: String::new(),
                categories: String::new(),
                source: "custom",
            },
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

/// Resolve what the user typed to a substance: an exact catalog or custom name, else the single
/// search hit, else an interactive choice. Unknown names are kept as typed.
pub(crate) fn resolve_substance(
    svc: &JournalService,
    query: &str,
    json: bool,
) -> Result<(String, Option<SearchResult>)> {
    if let Some(found) = svc.lookup_substance(query)? {
        return Ok((found.name().to_string(), Some(found)));
    }

    let results = svc.search_substances(query, &[], 0)?;
    match results.len() {
        0 => {
            if !json {
                eprintln!("Note: '{query}' is not in the catalog or your custom substances");
            }
            Ok((query.trim().to_string(), None))
        }
        1 => {
            let found = results.into_iter().next().context("Search result vanished")?;
            Ok((found.name().to_string(), Some(found)))
        }
        n => {
            if json {
                let names: Vec<&str> = results.iter().map(SearchResult::name).collect();
                bail!("'{query}' is ambiguous: {}", names.join(", "));
            }
            print_substance_table(&results);
            let idx = prompt_choice("substance", n)?;
            let found = results.into_iter().nth(idx).context("Selection out of range")?;
            Ok((found.name().to_string(), Some(found)))
        }
    }
}

/// Units a dose of this substance is normally measured in for `route`.
pub(crate) fn default_units(found: &SearchResult, route: AdministrationRoute) -> Option<String> {
    match found {
        SearchResult::Reference(s) => s
            .roa(route)
            .or_else(|| s.roas.first())
            .and_then(|r| r.dose.as_ref())
            .map(|d| d.units.clone()),
        SearchResult::Custom(c) => Some(c.units.clone()),
    }
}

pub(crate) fn cmd_search(
    svc: &JournalService,
    query: &str,
    categories: &[String],
    json: bool,
) -> Result<()> {
    let results = svc.search_substances(query, categories, DEFAULT_RECENTS_LIMIT)?;

    if results.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No substances found for '{query}'");
        }
        std::process::exit(2);
    }

    if json {
        print_json(&results)?;
    } else {
        print_substance_table(&results);
    }
    Ok(())
}

pub(crate) fn cmd_categories(svc: &JournalService, json: bool) -> Result<()> {
    let categories = svc.catalog().categories();
    if json {
        print_json(&categories)?;
    } else {
        for c in categories {
            println!("{c}");
        }
    }
    Ok(())
}

fn print_roas(roas: &[Roa]) {
    for roa in roas {
        println!("\n  {}", roa.route);
        if let Some(dose) = &roa.dose {
            let u = &dose.units;
            if let Some(t) = dose.threshold {
                println!("    threshold  {t} {u}");
            }
            for (label, range) in [
                ("light", dose.light),
                ("common", dose.common),
                ("strong", dose.strong),
            ] {
                if let Some(r) = range {
                    println!("    {label:<10} {}-{} {u}", r.min, r.max);
                }
            }
            if let Some(h) = dose.heavy {
                println!("    heavy      {h}+ {u}");
            }
        }
        if let Some(duration) = &roa.duration {
            for (label, range) in [
                ("onset", duration.onset),
                ("comeup", duration.comeup),
                ("peak", duration.peak),
                ("offset", duration.offset),
                ("total", duration.total),
            ] {
                if let Some(r) = range {
                    println!("    {label:<10} {r}");
                }
            }
        }
    }
}

pub(crate) fn cmd_substance_show(svc: &JournalService, name: &str, json: bool) -> Result<()> {
    let Some(found) = svc.lookup_substance(name)? else {
        exit_not_found(&format!("Substance '{name}' not found"), json);
    };
    let companion = svc.db().get_companion(found.name())?;

    if json {
        print_json(&serde_json::json!({
            "substance": found,
            "color": companion.map(|c| c.color),
        }))?;
        return Ok(());
    }

    match &found {
        SearchResult::Reference(s) => {
            println!("=== {} ===", s.name);
            if !s.common_names.is_empty() {
                println!("Also known as: {}", s.common_names.join(", "));
            }
            if !s.categories.is_empty() {
                println!("Categories:    {}", s.categories.join(", "));
            }
            if let Some(url) = &s.url {
                println!("More info:     {url}");
            }
            if let Some(summary) = &s.summary {
                println!("\n{summary}");
            }
            print_roas(&s.roas);
        }
        SearchResult::Custom(c) => {
            println!("=== {} (custom) ===", c.name);
            println!("Units: {}", c.units);
            if !c.description.is_empty() {
                println!("\n{}", c.description);
            }
            print_roas(&c.roas);
        }
    }
    if let Some(c) = companion {
        println!("\nColor: {}", c.color);
    }
    Ok(())
}

pub(crate) fn cmd_substance_add(
    svc: &JournalService,
    name: &str,
    units: &str,
    description: Option<String>,
    routes: &[String],
    json: bool,
) -> Result<()> {
    let roas = routes
        .iter()
        .map(|r| {
            Ok(Roa {
                route: r.parse()?,
                dose: None,
                duration: None,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let created = svc.create_custom_substance(&NewCustomSubstance {
        name: name.to_string(),
        units: units.to_string(),
        description: description.unwrap_or_default(),
        roas,
    })?;

    if json {
        print_json(&created)?;
    } else {
        println!(
            "Created custom substance {} (ID {}, units: {})",
            created.name, created.id, created.units
        );
    }
    Ok(())
}

pub(crate) fn cmd_substance_list(svc: &JournalService, json: bool) -> Result<()> {
    let substances = svc.db().list_custom_substances()?;

    if json {
        print_json(&substances)?;
    } else if substances.is_empty() {
        eprintln!("No custom substances. Use `psyjournal substance add` to create one.");
    } else {
        #[derive(Tabled)]
        struct CustomRow {
            #[tabled(rename = "ID")]
            id: i64,
            #[tabled(rename = "Name")]
            name: String,
            #[tabled(rename = "Units")]
            units: String,
            #[tabled(rename = "Routes")]
            routes: String,
            #[tabled(rename = "Description")]
            description: String,
        }

        let rows: Vec<CustomRow> = substances
            .iter()
            .map(|s| CustomRow {
                id: s.id,
                name: s.name.clone(),
                units: s.units.clone(),
                routes: s
                    .roas
                    .iter()
                    .map(|r| r.route.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
                description: truncate(&s.description, 40),
            })
            .collect();
        let table = Table::new(&rows).with(Style::rounded()).to_string();
        println!("{table}");
    }
    Ok(())
}

pub(crate) fn cmd_substance_delete(svc: &JournalService, id: i64, json: bool) -> Result<()> {
    if !svc.db().delete_custom_substance(id)? {
        exit_not_found(&format!("Custom substance {id} not found"), json);
    }
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted custom substance {id}");
    }
    Ok(())
}

pub(crate) fn cmd_substance_export(svc: &JournalService, output: Option<&Path>) -> Result<()> {
    let substances = svc.db().export_custom_substances()?;
    let data = serde_json::to_string_pretty(&substances)?;
    match output {
        Some(path) => {
            std::fs::write(path, data)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "Exported {} custom substances to {}",
                substances.len(),
                path.display()
            );
        }
        None => println!("{data}"),
    }
    Ok(())
}

pub(crate) fn cmd_substance_import(svc: &JournalService, file: &Path, json: bool) -> Result<()> {
    let data = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let substances: Vec<ExportCustomSubstance> =
        serde_json::from_str(&data).context("File is not a custom substance export")?;
    let summary = svc.import_custom_substances(&substances)?;

    if json {
        print_json(&summary)?;
    } else {
        println!(
            "Imported {} custom substances ({} skipped)",
            summary.custom_substances_imported, summary.custom_substances_skipped
        );
    }
    Ok(())
}

pub(crate) fn cmd_companion_list(svc: &JournalService, json: bool) -> Result<()> {
    let companions = svc.db().list_companions()?;
    if json {
        print_json(&companions)?;
    } else if companions.is_empty() {
        eprintln!("No substances logged yet.");
    } else {
        for c in companions {
            println!("{:<28} {}", c.substance_name, c.color);
        }
    }
    Ok(())
}

pub(crate) fn cmd_companion_color(
    svc: &JournalService,
    substance: &str,
    color: &str,
    json: bool,
) -> Result<()> {
    let color: AdaptiveColor = color.parse()?;
    if !svc.db().set_companion_color(substance, color)? {
        exit_not_found(&format!("No ingestions of '{substance}' logged"), json);
    }
    if json {
        println!(
            "{}",
            serde_json::json!({ "substance_name": substance, "color": color })
        );
    } else {
        println!("{substance} is now {color}");
    }
    Ok(())
}
