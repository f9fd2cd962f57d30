use anyhow::{Result, bail};

use psyjournal_core::models::{AdministrationRoute, DoseClass, NewIngestion};
use psyjournal_core::search::SearchResult;
use psyjournal_core::service::{JournalService, LogContext, LoggedIngestions};

use super::helpers::{format_dose, format_local, parse_dose, parse_when, print_json};
use super::substance::{default_units, resolve_substance};

/// Everything `psyjournal log` accepts.
pub(crate) struct LogOptions {
    pub substance: Option<String>,
    pub dose: Option<String>,
    pub route: String,
    pub units: Option<String>,
    pub unit_id: Option<i64>,
    pub recipe_id: Option<i64>,
    pub count: f64,
    pub experience: Option<i64>,
    pub at: Option<String>,
    pub sd: Option<f64>,
    pub notes: Option<String>,
    pub consumer: Option<String>,
}

pub(crate) fn cmd_log(svc: &JournalService, opts: LogOptions, json: bool) -> Result<()> {
    let time = parse_when(opts.at.as_deref())?;
    let ctx = LogContext {
        experience_id: opts.experience,
        time,
        notes: opts.notes.clone().unwrap_or_default(),
        consumer_name: opts.consumer.clone(),
    };

    let (logged, classification) = match (opts.unit_id, opts.recipe_id) {
        (Some(_), Some(_)) => bail!("Use either --unit or --recipe, not both"),
        (Some(unit_id), None) => (svc.log_custom_unit(&ctx, unit_id, opts.count)?, None),
        (None, Some(recipe_id)) => (svc.log_recipe(&ctx, recipe_id, opts.count)?, None),
        (None, None) => log_substance(svc, &opts, &ctx, json)?,
    };

    if json {
        print_json(&logged)?;
    } else {
        print_logged(&logged, classification);
    }
    Ok(())
}

fn log_substance(
    svc: &JournalService,
    opts: &LogOptions,
    ctx: &LogContext,
    json: bool,
) -> Result<(LoggedIngestions, Option<DoseClass>)> {
    let Some(query) = opts.substance.as_deref() else {
        bail!("Name a substance, or pass --unit or --recipe");
    };
    let route: AdministrationRoute = opts.route.parse()?;
    let dose = parse_dose(opts.dose.as_deref().unwrap_or("?"))?;
    let (name, found) = resolve_substance(svc, query, json)?;

    let units = match dose.units.or_else(|| opts.units.clone()) {
        Some(u) => u,
        None => match found.as_ref().and_then(|f| default_units(f, route)) {
            Some(u) => u,
            None => bail!("No default units known for '{name}'. Pass --units or a dose like '10mg'"),
        },
    };
    let is_estimate = dose.is_estimate || opts.sd.is_some();

    let ingestion = NewIngestion {
        experience_id: 0,
        substance_name: name,
        time: ctx.time,
        administration_route: route,
        dose: dose.dose,
        is_dose_an_estimate: is_estimate,
        estimated_dose_standard_deviation: opts.sd,
        units,
        notes: ctx.notes.clone(),
        consumer_name: ctx.consumer_name.clone(),
        custom_unit_id: None,
        custom_recipe_id: None,
    };
    let classification = classify(found.as_ref(), &ingestion);
    let logged = svc.log_ingestion(ctx.experience_id, &ingestion)?;
    Ok((logged, classification))
}

/// Dose class against the catalog's ranges, when the units agree.
fn classify(found: Option<&SearchResult>, ingestion: &NewIngestion) -> Option<DoseClass> {
    let Some(SearchResult::Reference(substance)) = found else {
        return None;
    };
    let roa_dose = substance.roa(ingestion.administration_route)?.dose.as_ref()?;
    if !roa_dose.units.eq_ignore_ascii_case(&ingestion.units) {
        return None;
    }
    roa_dose.classify(ingestion.dose?)
}

fn print_logged(logged: &LoggedIngestions, classification: Option<DoseClass>) {
    for i in &logged.ingestions {
        let dose = format_dose(i.dose, &i.units, i.is_dose_an_estimate);
        let who = i
            .consumer_name
            .as_deref()
            .map(|c| format!(" for {c}"))
            .unwrap_or_default();
        println!(
            "Logged: {dose} {} ({}){who} at {}",
            i.substance_name,
            i.administration_route,
            format_local(&i.time)
        );
    }
    if let Some(class) = classification {
        println!("Dose class: {class}");
    }
    let e = &logged.experience;
    if logged.created_experience {
        println!("Started experience {} \"{}\"", e.id, e.title);
    } else {
        println!("Added to experience {} \"{}\"", e.id, e.title);
    }
}
