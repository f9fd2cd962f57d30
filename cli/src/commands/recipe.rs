use anyhow::{Context, Result, bail};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use psyjournal_core::models::{
    AdministrationRoute, NewCustomRecipe, NewRecipeSubcomponent, RecipeDetail,
};
use psyjournal_core::service::JournalService;

use super::helpers::{exit_not_found, format_dose, parse_dose, print_json};
use super::substance::default_units;

/// Split a `--component` value like `"Caffeine=100mg"` into name and dose.
fn split_component(s: &str) -> Result<(&str, &str)> {
    let (name, dose) = s
        .split_once('=')
        .with_context(|| format!("Invalid component '{s}'. Use SUBSTANCE=DOSE, e.g. Caffeine=100mg"))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("Invalid component '{s}': missing substance name");
    }
    Ok((name, dose.trim()))
}

fn build_subcomponent(
    svc: &JournalService,
    substance: &str,
    dose: &str,
    route: AdministrationRoute,
    sd: Option<f64>,
) -> Result<NewRecipeSubcomponent> {
    let dose = parse_dose(dose)?;
    let found = svc.lookup_substance(substance)?;
    let substance_name = found
        .as_ref()
        .map_or_else(|| substance.trim().to_string(), |f| f.name().to_string());
    let units = match dose
        .units
        .or_else(|| found.as_ref().and_then(|f| default_units(f, route)))
    {
        Some(u) => u,
        None => bail!("No default units known for '{substance_name}'. Give the dose with units"),
    };
    Ok(NewRecipeSubcomponent {
        substance_name,
        dose: dose.dose,
        is_estimate: dose.is_estimate || sd.is_some(),
        estimated_dose_standard_deviation: sd,
        units,
    })
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_recipe_create(
    svc: &JournalService,
    name: &str,
    route: &str,
    unit: &str,
    plural: Option<String>,
    note: Option<String>,
    components: &[String],
    json: bool,
) -> Result<()> {
    let route: AdministrationRoute = route.parse()?;
    let subcomponents = components
        .iter()
        .map(|c| {
            let (substance, dose) = split_component(c)?;
            build_subcomponent(svc, substance, dose, route, None)
        })
        .collect::<Result<Vec<_>>>()?;

    let detail = svc.db().create_recipe(
        &NewCustomRecipe {
            name: name.to_string(),
            administration_route: route,
            unit: unit.to_string(),
            unit_plural: plural,
            note: note.unwrap_or_default(),
        },
        &subcomponents,
    )?;

    if json {
        print_json(&detail)?;
    } else {
        let id = detail.recipe.id;
        println!(
            "Created recipe {id} \"{}\" with {} components",
            detail.recipe.name,
            detail.subcomponents.len()
        );
        if detail.subcomponents.is_empty() {
            println!("Add components with: psyjournal recipe add {id} <substance> <dose>");
        }
    }
    Ok(())
}

pub(crate) fn cmd_recipe_add(
    svc: &JournalService,
    recipe_id: i64,
    substance: &str,
    dose: &str,
    sd: Option<f64>,
    json: bool,
) -> Result<()> {
    let Some(recipe) = svc.db().get_recipe(recipe_id)? else {
        exit_not_found(&format!("Recipe {recipe_id} not found"), json);
    };
    let sub = build_subcomponent(svc, substance, dose, recipe.administration_route, sd)?;
    let added = svc.db().add_recipe_subcomponent(recipe_id, &sub)?;

    if json {
        print_json(&added)?;
    } else {
        println!(
            "Added {} {} to \"{}\" (component {})",
            format_dose(added.dose, &added.units, added.is_estimate),
            added.substance_name,
            recipe.name,
            added.id
        );
    }
    Ok(())
}

pub(crate) fn cmd_recipe_remove(svc: &JournalService, id: i64, json: bool) -> Result<()> {
    if !svc.db().remove_recipe_subcomponent(id)? {
        exit_not_found(&format!("Recipe component {id} not found"), json);
    }
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Removed component {id}");
    }
    Ok(())
}

fn print_recipe(detail: &RecipeDetail) {
    let r = &detail.recipe;
    let archived = if r.is_archived { " (archived)" } else { "" };
    println!("=== {}{archived} ===", r.name);
    println!("  Per {}  |  Route: {}", r.unit, r.administration_route);
    if !r.note.is_empty() {
        println!("  {}", r.note);
    }
    println!("\n  COMPONENTS:");
    if detail.subcomponents.is_empty() {
        println!("    (none)");
    }
    for sub in &detail.subcomponents {
        let sd = sub
            .estimated_dose_standard_deviation
            .map(|sd| format!(" ±{sd}"))
            .unwrap_or_default();
        println!(
            "    [{}] {} {}{sd}",
            sub.id,
            sub.substance_name,
            format_dose(sub.dose, &sub.units, sub.is_estimate)
        );
    }
}

pub(crate) fn cmd_recipe_show(svc: &JournalService, id: i64, json: bool) -> Result<()> {
    let Some(detail) = svc.db().get_recipe_detail(id)? else {
        exit_not_found(&format!("Recipe {id} not found"), json);
    };
    if json {
        print_json(&detail)?;
    } else {
        print_recipe(&detail);
    }
    Ok(())
}

pub(crate) fn cmd_recipe_list(svc: &JournalService, all: bool, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Unit")]
        unit: String,
        #[tabled(rename = "Route")]
        route: String,
        #[tabled(rename = "Components")]
        components: usize,
    }

    let recipes = svc.db().list_recipes(all)?;
    if json {
        print_json(&recipes)?;
        return Ok(());
    }
    if recipes.is_empty() {
        eprintln!("No recipes found");
        return Ok(());
    }

    let rows: Vec<RecipeRow> = recipes
        .iter()
        .map(|d| RecipeRow {
            id: d.recipe.id,
            name: if d.recipe.is_archived {
                format!("{} (archived)", d.recipe.name)
            } else {
                d.recipe.name.clone()
            },
            unit: d.recipe.unit.clone(),
            route: d.recipe.administration_route.to_string(),
            components: d.subcomponents.len(),
        })
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(4..5)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_recipe_archive(
    svc: &JournalService,
    id: i64,
    archived: bool,
    json: bool,
) -> Result<()> {
    if !svc.db().set_recipe_archived(id, archived)? {
        exit_not_found(&format!("Recipe {id} not found"), json);
    }
    if json {
        println!("{}", serde_json::json!({ "id": id, "is_archived": archived }));
    } else if archived {
        println!("Archived recipe {id}");
    } else {
        println!("Restored recipe {id}");
    }
    Ok(())
}

pub(crate) fn cmd_recipe_delete(svc: &JournalService, id: i64, json: bool) -> Result<()> {
    if !svc.db().delete_recipe(id)? {
        exit_not_found(&format!("Recipe {id} not found"), json);
    }
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted recipe {id}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_component() {
        assert_eq!(split_component("Caffeine=100mg").unwrap(), ("Caffeine", "100mg"));
        assert_eq!(split_component(" L-Theanine = 200 mg ").unwrap(), ("L-Theanine", "200 mg"));
        assert!(split_component("Caffeine 100mg").is_err());
        assert!(split_component("=100mg").is_err());
    }

    #[test]
    fn test_build_subcomponent_uses_catalog_units() {
        let svc = JournalService::new_in_memory().unwrap();
        let sub = build_subcomponent(&svc, "caffeine", "80", AdministrationRoute::Oral, None)
            .unwrap();
        assert_eq!(sub.substance_name, "Caffeine");
        assert_eq!(sub.units, "mg");
        assert_eq!(sub.dose, Some(80.0));
        assert!(!sub.is_estimate);
    }

    #[test]
    fn test_build_subcomponent_unknown_substance_needs_units() {
        let svc = JournalService::new_in_memory().unwrap();
        assert!(build_subcomponent(&svc, "Mystery tea", "2", AdministrationRoute::Oral, None)
            .is_err());
        let sub = build_subcomponent(&svc, "Mystery tea", "2 g", AdministrationRoute::Oral, Some(0.5))
            .unwrap();
        assert_eq!(sub.units, "g");
        assert!(sub.is_estimate);
    }
}
