use anyhow::{Result, bail};
use std::path::Path;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use psyjournal_core::models::{
    AdaptiveColor, Experience, ExperienceDetail, Location, NewExperience, NewTimedNote,
    UpdateExperience, UpdateIngestion, UpdateTimedNote,
};
use psyjournal_core::service::JournalService;

use super::helpers::{
    exit_not_found, format_dose, format_local, parse_dose, parse_when, print_json, truncate,
};

fn print_experience_table(svc: &JournalService, experiences: &[Experience]) -> Result<()> {
    #[derive(Tabled)]
    struct ExperienceRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Title")]
        title: String,
        #[tabled(rename = "Substances")]
        substances: String,
        #[tabled(rename = "★")]
        favorite: &'static str,
    }

    let mut rows = Vec::with_capacity(experiences.len());
    for e in experiences {
        let mut names: Vec<String> = Vec::new();
        for i in svc.db().list_ingestions_for_experience(e.id)? {
            if !names.contains(&i.substance_name) {
                names.push(i.substance_name);
            }
        }
        rows.push(ExperienceRow {
            id: e.id,
            date: format_local(&e.sort_date),
            title: truncate(&e.title, 32),
            substances: truncate(&names.join(", "), 40),
            favorite: if e.is_favorite { "★" } else { "" },
        });
    }

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::first()).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_experience_list(
    svc: &JournalService,
    search: Option<&str>,
    favorites: bool,
    json: bool,
) -> Result<()> {
    let experiences = match search {
        Some(query) => svc.db().search_experiences(query, favorites)?,
        None if favorites => svc.db().search_experiences("", true)?,
        None => svc.db().list_experiences()?,
    };

    if json {
        print_json(&experiences)?;
    } else if experiences.is_empty() {
        eprintln!("No experiences found");
    } else {
        print_experience_table(svc, &experiences)?;
    }
    Ok(())
}

fn print_detail(detail: &ExperienceDetail) {
    #[derive(Tabled)]
    struct IngestionRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Time")]
        time: String,
        #[tabled(rename = "Substance")]
        substance: String,
        #[tabled(rename = "Dose")]
        dose: String,
        #[tabled(rename = "Route")]
        route: String,
        #[tabled(rename = "Consumer")]
        consumer: String,
        #[tabled(rename = "Notes")]
        notes: String,
    }

    let e = &detail.experience;
    let star = if e.is_favorite { " ★" } else { "" };
    println!("=== {}{star} ===", e.title);
    println!("Experience {} - {}", e.id, format_local(&e.sort_date));
    if let Some(location) = &e.location {
        match (location.latitude, location.longitude) {
            (Some(lat), Some(lon)) => println!("Location: {} ({lat:.4}, {lon:.4})", location.name),
            _ => println!("Location: {}", location.name),
        }
    }
    if !e.text.is_empty() {
        println!("\n{}", e.text);
    }

    if detail.ingestions.is_empty() {
        println!("\nNo ingestions.");
    } else {
        let rows: Vec<IngestionRow> = detail
            .ingestions
            .iter()
            .map(|i| IngestionRow {
                id: i.id,
                time: format_local(&i.time),
                substance: i.substance_name.clone(),
                dose: match i.estimated_dose_standard_deviation {
                    Some(sd) => format!(
                        "{} ±{sd}",
                        format_dose(i.dose, &i.units, i.is_dose_an_estimate)
                    ),
                    None => format_dose(i.dose, &i.units, i.is_dose_an_estimate),
                },
                route: i.administration_route.to_string(),
                consumer: i.consumer_name.clone().unwrap_or_default(),
                notes: truncate(&i.notes, 30),
            })
            .collect();
        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(3..4)).with(Alignment::right()))
            .to_string();
        println!("\n{table}");
    }

    if !detail.timed_notes.is_empty() {
        println!("\nNotes:");
        for n in &detail.timed_notes {
            let hidden = if n.note.is_part_of_timeline {
                ""
            } else {
                " (not on timeline)"
            };
            println!(
                "  [{}] {} {}{hidden}",
                n.note.id,
                format_local(&n.note.time),
                n.note.note
            );
            for p in &n.photos {
                if p.caption.is_empty() {
                    println!("       photo {}: {}", p.id, p.file_path);
                } else {
                    println!("       photo {}: {} ({})", p.id, p.file_path, p.caption);
                }
            }
        }
    }
}

pub(crate) fn cmd_experience_show(svc: &JournalService, id: i64, json: bool) -> Result<()> {
    let Some(detail) = svc.db().get_experience_detail(id)? else {
        exit_not_found(&format!("Experience {id} not found"), json);
    };
    if json {
        print_json(&detail)?;
    } else {
        print_detail(&detail);
    }
    Ok(())
}

fn location_arg(name: Option<String>, lat: Option<f64>, lon: Option<f64>) -> Result<Option<Location>> {
    match name {
        Some(name) if !name.trim().is_empty() => Ok(Some(Location {
            name: name.trim().to_string(),
            latitude: lat,
            longitude: lon,
        })),
        _ if lat.is_some() || lon.is_some() => bail!("--lat/--lon need a --location name"),
        _ => Ok(None),
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_experience_new(
    svc: &JournalService,
    title: &str,
    text: Option<String>,
    at: Option<&str>,
    location: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    json: bool,
) -> Result<()> {
    let experience = svc.db().create_experience(&NewExperience {
        title: title.to_string(),
        text: text.unwrap_or_default(),
        sort_date: parse_when(at)?,
        location: location_arg(location, lat, lon)?,
    })?;

    if json {
        print_json(&experience)?;
    } else {
        println!("Created experience {} \"{}\"", experience.id, experience.title);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_experience_edit(
    svc: &JournalService,
    id: i64,
    title: Option<String>,
    text: Option<String>,
    at: Option<&str>,
    location: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    clear_location: bool,
    json: bool,
) -> Result<()> {
    if title.is_none()
        && text.is_none()
        && at.is_none()
        && location.is_none()
        && lat.is_none()
        && lon.is_none()
        && !clear_location
    {
        bail!("Nothing to update. Provide at least one of --title, --text, --at or --location");
    }

    let location = if clear_location {
        Some(None)
    } else {
        location_arg(location, lat, lon)?.map(Some)
    };
    let update = UpdateExperience {
        title,
        text,
        sort_date: at.map(|s| parse_when(Some(s))).transpose()?,
        is_favorite: None,
        location,
    };

    let Some(experience) = svc.db().update_experience(id, &update)? else {
        exit_not_found(&format!("Experience {id} not found"), json);
    };
    if json {
        print_json(&experience)?;
    } else {
        println!("Updated experience {} \"{}\"", experience.id, experience.title);
    }
    Ok(())
}

pub(crate) fn cmd_experience_favorite(
    svc: &JournalService,
    id: i64,
    favorite: bool,
    json: bool,
) -> Result<()> {
    let update = UpdateExperience {
        is_favorite: Some(favorite),
        ..UpdateExperience::default()
    };
    let Some(experience) = svc.db().update_experience(id, &update)? else {
        exit_not_found(&format!("Experience {id} not found"), json);
    };
    if json {
        print_json(&experience)?;
    } else if favorite {
        println!("Marked \"{}\" as favorite", experience.title);
    } else {
        println!("Removed \"{}\" from favorites", experience.title);
    }
    Ok(())
}

pub(crate) fn cmd_experience_delete(svc: &JournalService, id: i64, json: bool) -> Result<()> {
    if !svc.db().delete_experience(id)? {
        exit_not_found(&format!("Experience {id} not found"), json);
    }
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted experience {id}");
    }
    Ok(())
}

// --- Ingestions ---

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_ingestion_edit(
    svc: &JournalService,
    id: i64,
    dose: Option<&str>,
    at: Option<&str>,
    sd: Option<f64>,
    notes: Option<String>,
    consumer: Option<String>,
    experience: Option<i64>,
    json: bool,
) -> Result<()> {
    if dose.is_none()
        && at.is_none()
        && sd.is_none()
        && notes.is_none()
        && consumer.is_none()
        && experience.is_none()
    {
        bail!("Nothing to update. Provide at least one of --dose, --at, --sd, --notes, --consumer or --experience");
    }
    let Some(current) = svc.db().get_ingestion(id)? else {
        exit_not_found(&format!("Ingestion {id} not found"), json);
    };

    let mut update = UpdateIngestion {
        time: at.map(|s| parse_when(Some(s))).transpose()?,
        notes,
        consumer_name: consumer.map(|c| Some(c).filter(|c| !c.trim().is_empty())),
        experience_id: experience,
        ..UpdateIngestion::default()
    };
    if let Some(dose) = dose {
        let parsed = parse_dose(dose)?;
        if let Some(units) = &parsed.units {
            if !units.eq_ignore_ascii_case(&current.units) {
                bail!("Ingestion {id} is measured in {}, not {units}", current.units);
            }
        }
        update.dose = Some(parsed.dose);
        update.is_dose_an_estimate = Some(parsed.is_estimate || sd.is_some());
    }
    if let Some(sd) = sd {
        update.estimated_dose_standard_deviation = Some(Some(sd));
        update.is_dose_an_estimate = Some(true);
    }

    let Some(ingestion) = svc.db().update_ingestion(id, &update)? else {
        exit_not_found(&format!("Ingestion {id} not found"), json);
    };
    if json {
        print_json(&ingestion)?;
    } else {
        println!(
            "Updated ingestion {id}: {} {} at {}",
            format_dose(ingestion.dose, &ingestion.units, ingestion.is_dose_an_estimate),
            ingestion.substance_name,
            format_local(&ingestion.time)
        );
    }
    Ok(())
}

pub(crate) fn cmd_ingestion_delete(svc: &JournalService, id: i64, json: bool) -> Result<()> {
    if !svc.db().delete_ingestion(id)? {
        exit_not_found(&format!("Ingestion {id} not found"), json);
    }
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted ingestion {id}");
    }
    Ok(())
}

// --- Timed notes ---

pub(crate) fn cmd_note_add(
    svc: &JournalService,
    experience_id: i64,
    text: &str,
    at: Option<&str>,
    color: &str,
    hidden: bool,
    json: bool,
) -> Result<()> {
    let note = svc.db().create_timed_note(&NewTimedNote {
        experience_id,
        time: parse_when(at)?,
        note: text.to_string(),
        color: color.parse::<AdaptiveColor>()?,
        is_part_of_timeline: !hidden,
    })?;
    if json {
        print_json(&note)?;
    } else {
        println!(
            "Added note {} to experience {experience_id} at {}",
            note.id,
            format_local(&note.time)
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_note_edit(
    svc: &JournalService,
    id: i64,
    text: Option<String>,
    at: Option<&str>,
    color: Option<&str>,
    timeline: Option<bool>,
    json: bool,
) -> Result<()> {
    if text.is_none() && at.is_none() && color.is_none() && timeline.is_none() {
        bail!("Nothing to update. Provide at least one of --text, --at, --color or --timeline");
    }
    let update = UpdateTimedNote {
        time: at.map(|s| parse_when(Some(s))).transpose()?,
        note: text,
        color: color.map(str::parse::<AdaptiveColor>).transpose()?,
        is_part_of_timeline: timeline,
    };
    let Some(note) = svc.db().update_timed_note(id, &update)? else {
        exit_not_found(&format!("Note {id} not found"), json);
    };
    if json {
        print_json(&note)?;
    } else {
        println!("Updated note {id}");
    }
    Ok(())
}

pub(crate) fn cmd_note_delete(svc: &JournalService, id: i64, json: bool) -> Result<()> {
    if !svc.db().delete_timed_note(id)? {
        exit_not_found(&format!("Note {id} not found"), json);
    }
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted note {id}");
    }
    Ok(())
}

pub(crate) fn cmd_note_photo(
    svc: &JournalService,
    note_id: i64,
    file: &Path,
    caption: Option<String>,
    json: bool,
) -> Result<()> {
    let path = std::path::absolute(file)?;
    if !path.is_file() {
        bail!("No such file: {}", path.display());
    }
    let photo = svc.db().add_timed_note_photo(
        note_id,
        &path.to_string_lossy(),
        caption.as_deref().unwrap_or(""),
    )?;
    if json {
        print_json(&photo)?;
    } else {
        println!("Attached photo {} to note {note_id}", photo.id);
    }
    Ok(())
}

pub(crate) fn cmd_photo_delete(svc: &JournalService, id: i64, json: bool) -> Result<()> {
    if !svc.db().delete_timed_note_photo(id)? {
        exit_not_found(&format!("Photo {id} not found"), json);
    }
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Removed photo {id}");
    }
    Ok(())
}
