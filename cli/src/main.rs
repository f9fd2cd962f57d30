mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    LogOptions, ReminderOptions, UnitOptions, cmd_categories, cmd_companion_color,
    cmd_companion_list, cmd_experience_delete, cmd_experience_edit, cmd_experience_favorite,
    cmd_experience_list, cmd_experience_new, cmd_experience_show, cmd_export, cmd_import,
    cmd_ingestion_delete, cmd_ingestion_edit, cmd_log, cmd_note_add, cmd_note_delete,
    cmd_note_edit, cmd_note_photo, cmd_photo_delete, cmd_recipe_add, cmd_recipe_archive,
    cmd_recipe_create, cmd_recipe_delete, cmd_recipe_list, cmd_recipe_remove, cmd_recipe_show,
    cmd_reminder_add, cmd_reminder_delete, cmd_reminder_enable, cmd_reminder_fire,
    cmd_reminder_list, cmd_reminder_watch, cmd_search, cmd_stats, cmd_substance_add,
    cmd_substance_delete, cmd_substance_export, cmd_substance_import, cmd_substance_list,
    cmd_substance_show, cmd_unit_add, cmd_unit_archive, cmd_unit_delete, cmd_unit_list,
    parse_date,
};
use crate::config::Config;
use psyjournal_core::service::JournalService;

#[derive(Parser)]
#[command(
    name = "psyjournal",
    version,
    about = "A local-first journal for substance experiences",
    long_about = "A local-first journal for substance experiences.\n\n\
        Log what you took and when, keep timed notes, and get reminded of planned doses.\n\
        Everything stays in a SQLite file on this machine (set PSYJOURNAL_DATA_DIR to move it)."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log an ingestion (starts a new experience unless --experience is given)
    Log {
        /// Substance name (catalog, custom, or free text)
        substance: Option<String>,
        /// Dose, e.g. "100mg", "~2 g", or "?" when unknown
        dose: Option<String>,
        /// Route of administration
        #[arg(short, long, default_value = "oral")]
        route: String,
        /// Units, when the dose doesn't carry them
        #[arg(short, long)]
        units: Option<String>,
        /// Log a custom unit by ID instead of a substance
        #[arg(long = "unit", value_name = "ID")]
        unit_id: Option<i64>,
        /// Log a recipe by ID instead of a substance
        #[arg(long = "recipe", value_name = "ID")]
        recipe_id: Option<i64>,
        /// How many custom units or recipe servings
        #[arg(short, long, default_value = "1")]
        count: f64,
        /// Add to an existing experience
        #[arg(short, long, value_name = "ID")]
        experience: Option<i64>,
        /// When: now, -30m, 21:30, "2026-04-04 21:30" or RFC 3339
        #[arg(long, allow_hyphen_values = true)]
        at: Option<String>,
        /// Standard deviation of an estimated dose
        #[arg(long)]
        sd: Option<f64>,
        /// Notes on this ingestion
        #[arg(short, long)]
        notes: Option<String>,
        /// Who took it, when not you
        #[arg(long)]
        consumer: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search the substance catalog and your custom substances
    Search {
        /// Search query (name or alias)
        #[arg(default_value = "")]
        query: String,
        /// Only substances in this category (repeatable)
        #[arg(short, long = "category")]
        categories: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Per-substance usage statistics
    Stats {
        /// Only the last N days (default: all time)
        #[arg(short, long)]
        days: Option<u32>,
        #[arg(long)]
        json: bool,
    },
    /// Export the whole journal as JSON
    Export {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Import a journal export
    Import {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Browse and edit experiences
    Experience {
        #[command(subcommand)]
        command: ExperienceCommands,
    },
    /// Edit or delete logged ingestions
    Ingestion {
        #[command(subcommand)]
        command: IngestionCommands,
    },
    /// Timed notes on an experience
    Note {
        #[command(subcommand)]
        command: NoteCommands,
    },
    /// Catalog lookups and custom substances
    Substance {
        #[command(subcommand)]
        command: SubstanceCommands,
    },
    /// Substance colors
    Companion {
        #[command(subcommand)]
        command: CompanionCommands,
    },
    /// Custom units (e.g. "1 pill = 120 mg MDMA")
    Unit {
        #[command(subcommand)]
        command: UnitCommands,
    },
    /// Recipes: several substances taken together
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Daily ingestion reminders
    Reminder {
        #[command(subcommand)]
        command: ReminderCommands,
    },
}

#[derive(Subcommand)]
enum ExperienceCommands {
    /// List experiences, newest first
    List {
        /// Filter by title, text or substance
        #[arg(short, long)]
        search: Option<String>,
        /// Only favorites
        #[arg(short, long)]
        favorites: bool,
        #[arg(long)]
        json: bool,
    },
    /// Show an experience with its ingestions and notes
    Show {
        id: i64,
        #[arg(long)]
        json: bool,
    },
    /// Create an empty experience
    New {
        title: String,
        #[arg(long)]
        text: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        at: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,
        #[arg(long)]
        json: bool,
    },
    /// Edit title, text, date or location
    Edit {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        text: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        at: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,
        /// Remove the location
        #[arg(long, conflicts_with_all = ["location", "lat", "lon"])]
        clear_location: bool,
        #[arg(long)]
        json: bool,
    },
    /// Mark as favorite
    Favorite {
        id: i64,
        /// Remove from favorites instead
        #[arg(long)]
        remove: bool,
        #[arg(long)]
        json: bool,
    },
    /// Delete an experience with all its ingestions and notes
    Delete {
        id: i64,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum IngestionCommands {
    /// Change dose, time, notes or consumer, or move to another experience
    Edit {
        id: i64,
        #[arg(long)]
        dose: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        at: Option<String>,
        #[arg(long)]
        sd: Option<f64>,
        #[arg(long)]
        notes: Option<String>,
        /// Consumer name; empty clears it
        #[arg(long)]
        consumer: Option<String>,
        /// Move to this experience
        #[arg(long, value_name = "ID")]
        experience: Option<i64>,
        #[arg(long)]
        json: bool,
    },
    Delete {
        id: i64,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum NoteCommands {
    /// Add a timed note to an experience
    Add {
        experience: i64,
        text: String,
        #[arg(long, allow_hyphen_values = true)]
        at: Option<String>,
        /// Palette name or #RRGGBB
        #[arg(long, default_value = "blue")]
        color: String,
        /// Keep the note off the timeline
        #[arg(long)]
        hidden: bool,
        #[arg(long)]
        json: bool,
    },
    Edit {
        id: i64,
        #[arg(long)]
        text: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        at: Option<String>,
        #[arg(long)]
        color: Option<String>,
        /// Show on the timeline (true/false)
        #[arg(long)]
        timeline: Option<bool>,
        #[arg(long)]
        json: bool,
    },
    Delete {
        id: i64,
        #[arg(long)]
        json: bool,
    },
    /// Attach a photo to a note
    Photo {
        note: i64,
        file: PathBuf,
        #[arg(long)]
        caption: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Remove a photo from its note
    RemovePhoto {
        id: i64,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum SubstanceCommands {
    /// Show dosage and duration info
    Show {
        name: String,
        #[arg(long)]
        json: bool,
    },
    /// List catalog categories
    Categories {
        #[arg(long)]
        json: bool,
    },
    /// Create a custom substance
    Add {
        name: String,
        #[arg(short, long)]
        units: String,
        #[arg(short, long)]
        description: Option<String>,
        /// Supported route (repeatable)
        #[arg(short, long = "route")]
        routes: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// List custom substances
    List {
        #[arg(long)]
        json: bool,
    },
    Delete {
        id: i64,
        #[arg(long)]
        json: bool,
    },
    /// Export custom substances as JSON
    Export {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Import custom substances from JSON
    Import {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum CompanionCommands {
    List {
        #[arg(long)]
        json: bool,
    },
    /// Set a substance's color (palette name or #RRGGBB)
    Color {
        substance: String,
        color: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum UnitCommands {
    /// Define a unit, e.g. `unit add MDMA pill 120mg --unit pill`
    Add {
        substance: String,
        name: String,
        /// Dose of the substance in one unit
        dose: String,
        /// Label for one unit
        #[arg(short, long)]
        unit: String,
        #[arg(long)]
        plural: Option<String>,
        #[arg(short, long, default_value = "oral")]
        route: String,
        #[arg(long)]
        sd: Option<f64>,
        #[arg(long)]
        note: Option<String>,
        #[arg(long)]
        json: bool,
    },
    List {
        /// Only units for this substance
        #[arg(short, long)]
        substance: Option<String>,
        /// Include archived units
        #[arg(short, long)]
        all: bool,
        #[arg(long)]
        json: bool,
    },
    Archive {
        id: i64,
        /// Restore instead
        #[arg(long)]
        undo: bool,
        #[arg(long)]
        json: bool,
    },
    Delete {
        id: i64,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    Create {
        name: String,
        #[arg(short, long, default_value = "oral")]
        route: String,
        /// Label for one serving
        #[arg(short, long, default_value = "serving")]
        unit: String,
        #[arg(long)]
        plural: Option<String>,
        #[arg(long)]
        note: Option<String>,
        /// Component as SUBSTANCE=DOSE (repeatable)
        #[arg(short, long = "component")]
        components: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Add a component
    Add {
        recipe: i64,
        substance: String,
        dose: String,
        #[arg(long)]
        sd: Option<f64>,
        #[arg(long)]
        json: bool,
    },
    /// Remove a component by its ID
    Remove {
        component: i64,
        #[arg(long)]
        json: bool,
    },
    Show {
        id: i64,
        #[arg(long)]
        json: bool,
    },
    List {
        #[arg(short, long)]
        all: bool,
        #[arg(long)]
        json: bool,
    },
    Archive {
        id: i64,
        #[arg(long)]
        undo: bool,
        #[arg(long)]
        json: bool,
    },
    Delete {
        id: i64,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ReminderCommands {
    /// Remind me to take something every day at a time
    Add {
        substance: Option<String>,
        dose: Option<String>,
        /// Time of day, HH:MM
        #[arg(short, long)]
        time: String,
        #[arg(short, long, default_value = "oral")]
        route: String,
        /// Plan a custom unit instead of a substance
        #[arg(long = "unit", value_name = "ID")]
        unit_id: Option<i64>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        sd: Option<f64>,
        #[arg(long)]
        consumer: Option<String>,
        #[arg(long)]
        note: Option<String>,
        /// Weekdays, e.g. mon,thu
        #[arg(long, value_delimiter = ',')]
        days: Vec<String>,
        /// Every N days
        #[arg(long)]
        every: Option<u32>,
        /// Last day (YYYY-MM-DD)
        #[arg(long)]
        until: Option<String>,
        /// Stop after N reminders
        #[arg(long)]
        times: Option<u32>,
        /// Create switched off
        #[arg(long)]
        disabled: bool,
        #[arg(long)]
        json: bool,
    },
    List {
        #[arg(long)]
        json: bool,
    },
    Enable {
        id: i64,
        #[arg(long)]
        json: bool,
    },
    Disable {
        id: i64,
        #[arg(long)]
        json: bool,
    },
    Delete {
        id: i64,
        #[arg(long)]
        json: bool,
    },
    /// Fire a reminder now
    Fire {
        id: i64,
        /// Answer without prompting: taken, snooze or skip
        #[arg(long)]
        action: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Stay in the foreground and deliver reminders as they come due
    Watch,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    tracing::debug!(data_dir = %config.data_dir.display(), "config loaded");
    let svc = JournalService::new(&config.db_path.to_string_lossy())?;

    match cli.command {
        Commands::Log {
            substance,
            dose,
            route,
            units,
            unit_id,
            recipe_id,
            count,
            experience,
            at,
            sd,
            notes,
            consumer,
            json,
        } => cmd_log(
            &svc,
            LogOptions {
                substance,
                dose,
                route,
                units,
                unit_id,
                recipe_id,
                count,
                experience,
                at,
                sd,
                notes,
                consumer,
            },
            json,
        ),
        Commands::Search {
            query,
            categories,
            json,
        } => cmd_search(&svc, &query, &categories, json),
        Commands::Stats { days, json } => cmd_stats(&svc, days, json),
        Commands::Export { output } => cmd_export(&svc, output.as_deref()),
        Commands::Import { file, json } => cmd_import(&svc, &file, json),
        Commands::Experience { command } => match command {
            ExperienceCommands::List {
                search,
                favorites,
                json,
            } => cmd_experience_list(&svc, search.as_deref(), favorites, json),
            ExperienceCommands::Show { id, json } => cmd_experience_show(&svc, id, json),
            ExperienceCommands::New {
                title,
                text,
                at,
                location,
                lat,
                lon,
                json,
            } => cmd_experience_new(&svc, &title, text, at.as_deref(), location, lat, lon, json),
            ExperienceCommands::Edit {
                id,
                title,
                text,
                at,
                location,
                lat,
                lon,
                clear_location,
                json,
            } => cmd_experience_edit(
                &svc,
                id,
                title,
                text,
                at.as_deref(),
                location,
                lat,
                lon,
                clear_location,
                json,
            ),
            ExperienceCommands::Favorite { id, remove, json } => {
                cmd_experience_favorite(&svc, id, !remove, json)
            }
            ExperienceCommands::Delete { id, json } => cmd_experience_delete(&svc, id, json),
        },
        Commands::Ingestion { command } => match command {
            IngestionCommands::Edit {
                id,
                dose,
                at,
                sd,
                notes,
                consumer,
                experience,
                json,
            } => cmd_ingestion_edit(
                &svc,
                id,
                dose.as_deref(),
                at.as_deref(),
                sd,
                notes,
                consumer,
                experience,
                json,
            ),
            IngestionCommands::Delete { id, json } => cmd_ingestion_delete(&svc, id, json),
        },
        Commands::Note { command } => match command {
            NoteCommands::Add {
                experience,
                text,
                at,
                color,
                hidden,
                json,
            } => cmd_note_add(&svc, experience, &text, at.as_deref(), &color, hidden, json),
            NoteCommands::Edit {
                id,
                text,
                at,
                color,
                timeline,
                json,
            } => cmd_note_edit(
                &svc,
                id,
                text,
                at.as_deref(),
                color.as_deref(),
                timeline,
                json,
            ),
            NoteCommands::Delete { id, json } => cmd_note_delete(&svc, id, json),
            NoteCommands::Photo {
                note,
                file,
                caption,
                json,
            } => cmd_note_photo(&svc, note, &file, caption, json),
            NoteCommands::RemovePhoto { id, json } => cmd_photo_delete(&svc, id, json),
        },
        Commands::Substance { command } => match command {
            SubstanceCommands::Show { name, json } => cmd_substance_show(&svc, &name, json),
            SubstanceCommands::Categories { json } => cmd_categories(&svc, json),
            SubstanceCommands::Add {
                name,
                units,
                description,
                routes,
                json,
            } => cmd_substance_add(&svc, &name, &units, description, &routes, json),
            SubstanceCommands::List { json } => cmd_substance_list(&svc, json),
            SubstanceCommands::Delete { id, json } => cmd_substance_delete(&svc, id, json),
            SubstanceCommands::Export { output } => cmd_substance_export(&svc, output.as_deref()),
            SubstanceCommands::Import { file, json } => cmd_substance_import(&svc, &file, json),
        },
        Commands::Companion { command } => match command {
            CompanionCommands::List { json } => cmd_companion_list(&svc, json),
            CompanionCommands::Color {
                substance,
                color,
                json,
            } => cmd_companion_color(&svc, &substance, &color, json),
        },
        Commands::Unit { command } => match command {
            UnitCommands::Add {
                substance,
                name,
                dose,
                unit,
                plural,
                route,
                sd,
                note,
                json,
            } => cmd_unit_add(
                &svc,
                UnitOptions {
                    substance,
                    name,
                    dose,
                    unit,
                    plural,
                    route,
                    sd,
                    note,
                },
                json,
            ),
            UnitCommands::List {
                substance,
                all,
                json,
            } => cmd_unit_list(&svc, substance.as_deref(), all, json),
            UnitCommands::Archive { id, undo, json } => cmd_unit_archive(&svc, id, !undo, json),
            UnitCommands::Delete { id, json } => cmd_unit_delete(&svc, id, json),
        },
        Commands::Recipe { command } => match command {
            RecipeCommands::Create {
                name,
                route,
                unit,
                plural,
                note,
                components,
                json,
            } => cmd_recipe_create(&svc, &name, &route, &unit, plural, note, &components, json),
            RecipeCommands::Add {
                recipe,
                substance,
                dose,
                sd,
                json,
            } => cmd_recipe_add(&svc, recipe, &substance, &dose, sd, json),
            RecipeCommands::Remove { component, json } => cmd_recipe_remove(&svc, component, json),
            RecipeCommands::Show { id, json } => cmd_recipe_show(&svc, id, json),
            RecipeCommands::List { all, json } => cmd_recipe_list(&svc, all, json),
            RecipeCommands::Archive { id, undo, json } => {
                cmd_recipe_archive(&svc, id, !undo, json)
            }
            RecipeCommands::Delete { id, json } => cmd_recipe_delete(&svc, id, json),
        },
        Commands::Reminder { command } => match command {
            ReminderCommands::Add {
                substance,
                dose,
                time,
                route,
                unit_id,
                title,
                sd,
                consumer,
                note,
                days,
                every,
                until,
                times,
                disabled,
                json,
            } => cmd_reminder_add(
                &svc,
                ReminderOptions {
                    substance,
                    time,
                    dose,
                    route,
                    unit_id,
                    title,
                    sd,
                    consumer,
                    note,
                    days,
                    every,
                    until: until.as_deref().map(parse_date).transpose()?,
                    times,
                    disabled,
                },
                json,
            ),
            ReminderCommands::List { json } => cmd_reminder_list(&svc, json),
            ReminderCommands::Enable { id, json } => cmd_reminder_enable(&svc, id, true, json),
            ReminderCommands::Disable { id, json } => cmd_reminder_enable(&svc, id, false, json),
            ReminderCommands::Delete { id, json } => cmd_reminder_delete(&svc, id, json),
            ReminderCommands::Fire { id, action, json } => {
                cmd_reminder_fire(&svc, id, action.as_deref(), json)
            }
            ReminderCommands::Watch => cmd_reminder_watch(&svc).await,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_log_with_estimate() {
        let cli = Cli::try_parse_from([
            "psyjournal", "log", "mdma", "~120mg", "--at", "-30m", "--consumer", "Sam",
        ])
        .unwrap();
        let Commands::Log {
            substance,
            dose,
            at,
            consumer,
            count,
            ..
        } = cli.command
        else {
            panic!("expected log");
        };
        assert_eq!(substance.as_deref(), Some("mdma"));
        assert_eq!(dose.as_deref(), Some("~120mg"));
        assert_eq!(at.as_deref(), Some("-30m"));
        assert_eq!(consumer.as_deref(), Some("Sam"));
        assert!((count - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_reminder_days() {
        let cli = Cli::try_parse_from([
            "psyjournal", "reminder", "add", "Caffeine", "100mg", "--time", "08:00", "--days",
            "mon,thu",
        ])
        .unwrap();
        let Commands::Reminder {
            command: ReminderCommands::Add { days, time, .. },
        } = cli.command
        else {
            panic!("expected reminder add");
        };
        assert_eq!(days, vec!["mon", "thu"]);
        assert_eq!(time, "08:00");
    }
}
