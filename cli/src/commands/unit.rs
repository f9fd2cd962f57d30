use anyhow::{Result, bail};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use psyjournal_core::models::{AdministrationRoute, NewCustomUnit};
use psyjournal_core::service::JournalService;

use super::helpers::{exit_not_found, format_dose, parse_dose, print_json, truncate};
use super::substance::{default_units, resolve_substance};

/// Everything `psyjournal unit add` accepts.
pub(crate) struct UnitOptions {
    pub substance: String,
    pub name: String,
    pub dose: String,
    pub unit: String,
    pub plural: Option<String>,
    pub route: String,
    pub sd: Option<f64>,
    pub note: Option<String>,
}

pub(crate) fn cmd_unit_add(svc: &JournalService, opts: UnitOptions, json: bool) -> Result<()> {
    let route: AdministrationRoute = opts.route.parse()?;
    let dose = parse_dose(&opts.dose)?;
    let (substance_name, found) = resolve_substance(svc, &opts.substance, json)?;
    let original_unit = match dose.units.or_else(|| found.as_ref().and_then(|f| default_units(f, route))) {
        Some(u) => u,
        None => bail!("No default units known for '{substance_name}'. Give the dose with units, e.g. '10mg'"),
    };

    let unit = svc.db().create_custom_unit(&NewCustomUnit {
        substance_name,
        name: opts.name,
        administration_route: route,
        dose: dose.dose,
        estimated_dose_standard_deviation: opts.sd,
        is_estimate: dose.is_estimate || opts.sd.is_some(),
        unit: opts.unit,
        unit_plural: opts.plural,
        original_unit,
        note: opts.note.unwrap_or_default(),
    })?;

    if json {
        print_json(&unit)?;
    } else {
        println!(
            "Created unit {} \"{}\": 1 {} = {} of {}",
            unit.id,
            unit.name,
            unit.unit,
            format_dose(unit.dose, &unit.original_unit, unit.is_estimate),
            unit.substance_name
        );
        println!("Log it with: psyjournal log --unit {} --count <n>", unit.id);
    }
    Ok(())
}

pub(crate) fn cmd_unit_list(
    svc: &JournalService,
    substance: Option<&str>,
    all: bool,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct UnitRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Substance")]
        substance: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Per unit")]
        per_unit: String,
        #[tabled(rename = "Route")]
        route: String,
        #[tabled(rename = "Note")]
        note: String,
    }

    let units = svc.db().list_custom_units(substance, all)?;
    if json {
        print_json(&units)?;
        return Ok(());
    }
    if units.is_empty() {
        eprintln!("No custom units. Use `psyjournal unit add` to create one.");
        return Ok(());
    }

    let rows: Vec<UnitRow> = units
        .iter()
        .map(|u| UnitRow {
            id: u.id,
            substance: u.substance_name.clone(),
            name: if u.is_archived {
                format!("{} (archived)", u.name)
            } else {
                u.name.clone()
            },
            per_unit: format!(
                "1 {} = {}",
                u.unit,
                format_dose(u.dose, &u.original_unit, u.is_estimate)
            ),
            route: u.administration_route.to_string(),
            note: truncate(&u.note, 30),
        })
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_unit_archive(
    svc: &JournalService,
    id: i64,
    archived: bool,
    json: bool,
) -> Result<()> {
    if !svc.db().set_custom_unit_archived(id, archived)? {
        exit_not_found(&format!("Unit {id} not found"), json);
    }
    if json {
        println!("{}", serde_json::json!({ "id": id, "is_archived": archived }));
    } else if archived {
        println!("Archived unit {id}");
    } else {
        println!("Restored unit {id}");
    }
    Ok(())
}

pub(crate) fn cmd_unit_delete(svc: &JournalService, id: i64, json: bool) -> Result<()> {
    if !svc.db().delete_custom_unit(id)? {
        exit_not_found(&format!("Unit {id} not found"), json);
    }
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted unit {id}");
    }
    Ok(())
}
