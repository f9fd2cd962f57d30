use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::de::DeserializeOwned;

use crate::models::{
    AdaptiveColor, AdministrationRoute, CustomRecipe, CustomRepeatPattern, CustomSubstance,
    CustomUnit, Experience, ExperienceDetail, ExportCustomRecipe, ExportCustomSubstance,
    ExportCustomUnit, ExportExperience, ExportIngestion, ExportPhoto, ExportRecipeSubcomponent,
    ExportReminder, ExportTimedNote, ImportSummary, Ingestion, IngestionReminder,
    JOURNAL_EXPORT_VERSION, JournalExport, Location, NewCustomRecipe, NewCustomSubstance,
    NewCustomUnit, NewExperience, NewIngestion, NewIngestionReminder, NewRecipeSubcomponent,
    NewTimedNote, PredefinedColor, RecipeDetail, RecipeSubcomponent, SubstanceCompanion,
    SubstanceStat, TimedNote, TimedNotePhoto, TimedNoteWithPhotos, UpdateExperience,
    UpdateIngestion, UpdateTimedNote, validate_custom_substance, validate_dose,
    validate_recipe_subcomponent, validate_repeat_pattern, validate_substance_name,
};
use crate::observe::{ChangeNotifier, Table};
use crate::reminder::ReminderPayload;

const EXPERIENCE_COLUMNS: &str = "id, title, text, creation_date, sort_date, is_favorite,
    location_name, location_latitude, location_longitude";

const INGESTION_COLUMNS: &str = "id, experience_id, substance_name, time, creation_date,
    administration_route, dose, is_dose_an_estimate, estimated_dose_standard_deviation, units,
    notes, consumer_name, custom_unit_id, custom_recipe_id";

const CUSTOM_UNIT_COLUMNS: &str = "id, substance_name, name, created_at, administration_route,
    dose, estimated_dose_standard_deviation, is_estimate, is_archived, unit, unit_plural,
    original_unit, note";

const RECIPE_COLUMNS: &str =
    "id, name, created_at, administration_route, is_archived, unit, unit_plural, note";

const SUBCOMPONENT_COLUMNS: &str = "id, recipe_id, substance_name, dose, is_estimate,
    estimated_dose_standard_deviation, units";

const TIMED_NOTE_COLUMNS: &str =
    "id, experience_id, creation_date, time, note, color_tag, color_value, is_part_of_timeline";

const PHOTO_COLUMNS: &str = "id, timed_note_id, file_path, caption, creation_date";

const REMINDER_COLUMNS: &str = "id, title, time_of_day, is_enabled, substance_name,
    administration_route, dose, units, is_estimate, estimated_dose_standard_deviation,
    custom_unit_id, consumer_name, note, custom_repeat_pattern, created_at";

const TIME_OF_DAY_FORMAT: &str = "%H:%M";

/// Fixed-width UTC timestamps so text ordering in SQL matches time ordering.
fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn conversion_error(
    idx: usize,
    e: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
}

fn get_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn get_route(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<AdministrationRoute> {
    let s: String = row.get(idx)?;
    s.parse().map_err(|e: anyhow::Error| conversion_error(idx, e))
}

/// Reads a color stored as a `(tag, value)` column pair starting at `idx`.
fn get_color(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<AdaptiveColor> {
    let tag: String = row.get(idx)?;
    let value: String = row.get(idx + 1)?;
    AdaptiveColor::from_columns(&tag, &value)
        .ok_or_else(|| conversion_error(idx, format!("invalid color {tag}:{value}")))
}

fn get_json<T: DeserializeOwned>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    serde_json::from_str(&s).map_err(|e| conversion_error(idx, e))
}

fn get_time_of_day(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveTime> {
    let s: String = row.get(idx)?;
    NaiveTime::parse_from_str(&s, TIME_OF_DAY_FORMAT).map_err(|e| conversion_error(idx, e))
}

/// First palette color no companion uses yet; once all are taken, cycle through the palette.
#[must_use]
pub fn pick_companion_color(used: &[AdaptiveColor]) -> PredefinedColor {
    let palette = PredefinedColor::PALETTE;
    palette
        .iter()
        .copied()
        .find(|c| !used.contains(&AdaptiveColor::Predefined(*c)))
        .unwrap_or(palette[used.len() % palette.len()])
}

fn checked_ingestion(ingestion: &NewIngestion) -> Result<NewIngestion> {
    let substance_name = validate_substance_name(&ingestion.substance_name)?;
    validate_dose(ingestion.dose, ingestion.estimated_dose_standard_deviation)?;
    Ok(NewIngestion {
        substance_name,
        ..ingestion.clone()
    })
}

pub struct Database {
    conn: Connection,
    changes: ChangeNotifier,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Database {
            conn,
            changes: ChangeNotifier::new(),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Subscribe here to hear about committed mutations.
    pub fn changes(&self) -> &ChangeNotifier {
        &self.changes
    }

    fn touched(&self, tables: &[Table]) {
        for table in tables {
            self.changes.notify(*table);
        }
    }

    #[allow(clippy::too_many_lines)]
    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS experiences (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    text TEXT NOT NULL DEFAULT '',
                    creation_date TEXT NOT NULL,
                    sort_date TEXT NOT NULL,
                    is_favorite INTEGER NOT NULL DEFAULT 0,
                    location_name TEXT,
                    location_latitude REAL,
                    location_longitude REAL
                );

                CREATE TABLE IF NOT EXISTS custom_substances (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE COLLATE NOCASE,
                    units TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    roas TEXT NOT NULL DEFAULT '[]'
                );

                CREATE TABLE IF NOT EXISTS custom_units (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    substance_name TEXT NOT NULL,
                    name TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    administration_route TEXT NOT NULL,
                    dose REAL,
                    estimated_dose_standard_deviation REAL,
                    is_estimate INTEGER NOT NULL DEFAULT 0,
                    is_archived INTEGER NOT NULL DEFAULT 0,
                    unit TEXT NOT NULL,
                    unit_plural TEXT,
                    original_unit TEXT NOT NULL,
                    note TEXT NOT NULL DEFAULT ''
                );

                CREATE TABLE IF NOT EXISTS custom_recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    administration_route TEXT NOT NULL,
                    is_archived INTEGER NOT NULL DEFAULT 0,
                    unit TEXT NOT NULL,
                    unit_plural TEXT,
                    note TEXT NOT NULL DEFAULT ''
                );

                CREATE TABLE IF NOT EXISTS recipe_subcomponents (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    recipe_id INTEGER NOT NULL REFERENCES custom_recipes(id) ON DELETE CASCADE,
                    substance_name TEXT NOT NULL,
                    dose REAL,
                    is_estimate INTEGER NOT NULL DEFAULT 0,
                    estimated_dose_standard_deviation REAL,
                    units TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS ingestions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    experience_id INTEGER NOT NULL REFERENCES experiences(id) ON DELETE CASCADE,
                    substance_name TEXT NOT NULL,
                    time TEXT NOT NULL,
                    creation_date TEXT NOT NULL,
                    administration_route TEXT NOT NULL,
                    dose REAL,
                    is_dose_an_estimate INTEGER NOT NULL DEFAULT 0,
                    estimated_dose_standard_deviation REAL,
                    units TEXT NOT NULL,
                    notes TEXT NOT NULL DEFAULT '',
                    consumer_name TEXT,
                    custom_unit_id INTEGER REFERENCES custom_units(id) ON DELETE SET NULL,
                    custom_recipe_id INTEGER REFERENCES custom_recipes(id) ON DELETE SET NULL
                );

                CREATE TABLE IF NOT EXISTS timed_notes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    experience_id INTEGER NOT NULL REFERENCES experiences(id) ON DELETE CASCADE,
                    creation_date TEXT NOT NULL,
                    time TEXT NOT NULL,
                    note TEXT NOT NULL,
                    color_tag TEXT NOT NULL,
                    color_value TEXT NOT NULL,
                    is_part_of_timeline INTEGER NOT NULL DEFAULT 1
                );

                CREATE TABLE IF NOT EXISTS timed_note_photos (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    timed_note_id INTEGER NOT NULL REFERENCES timed_notes(id) ON DELETE CASCADE,
                    file_path TEXT NOT NULL,
                    caption TEXT NOT NULL DEFAULT '',
                    creation_date TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS ingestion_reminders (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    time_of_day TEXT NOT NULL,
                    is_enabled INTEGER NOT NULL DEFAULT 1,
                    substance_name TEXT NOT NULL,
                    administration_route TEXT NOT NULL,
                    dose REAL,
                    units TEXT NOT NULL,
                    is_estimate INTEGER NOT NULL DEFAULT 0,
                    estimated_dose_standard_deviation REAL,
                    custom_unit_id INTEGER REFERENCES custom_units(id) ON DELETE SET NULL,
                    consumer_name TEXT,
                    note TEXT NOT NULL DEFAULT '',
                    custom_repeat_pattern TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS substance_companions (
                    substance_name TEXT PRIMARY KEY,
                    color_tag TEXT NOT NULL,
                    color_value TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_experiences_sort_date ON experiences(sort_date);
                CREATE INDEX IF NOT EXISTS idx_ingestions_experience ON ingestions(experience_id);
                CREATE INDEX IF NOT EXISTS idx_ingestions_time ON ingestions(time);
                CREATE INDEX IF NOT EXISTS idx_ingestions_substance ON ingestions(substance_name);
                CREATE INDEX IF NOT EXISTS idx_timed_notes_experience ON timed_notes(experience_id);
                CREATE INDEX IF NOT EXISTS idx_photos_timed_note ON timed_note_photos(timed_note_id);
                CREATE INDEX IF NOT EXISTS idx_subcomponents_recipe ON recipe_subcomponents(recipe_id);

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS reminder_snoozes (
                    reminder_id INTEGER PRIMARY KEY
                        REFERENCES ingestion_reminders(id) ON DELETE CASCADE,
                    until TEXT NOT NULL,
                    payload TEXT NOT NULL
                );

                PRAGMA user_version = 2;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn experience_from_row(row: &rusqlite::Row) -> rusqlite::Result<Experience> {
        let location = match row.get::<_, Option<String>>(6)? {
            Some(name) => Some(Location {
                name,
                latitude: row.get(7)?,
                longitude: row.get(8)?,
            }),
            None => None,
        };
        Ok(Experience {
            id: row.get(0)?,
            title: row.get(1)?,
            text: row.get(2)?,
            creation_date: get_ts(row, 3)?,
            sort_date: get_ts(row, 4)?,
            is_favorite: row.get(5)?,
            location,
        })
    }

    fn ingestion_from_row(row: &rusqlite::Row) -> rusqlite::Result<Ingestion> {
        Ok(Ingestion {
            id: row.get(0)?,
            experience_id: row.get(1)?,
            substance_name: row.get(2)?,
            time: get_ts(row, 3)?,
            creation_date: get_ts(row, 4)?,
            administration_route: get_route(row, 5)?,
            dose: row.get(6)?,
            is_dose_an_estimate: row.get(7)?,
            estimated_dose_standard_deviation: row.get(8)?,
            units: row.get(9)?,
            notes: row.get(10)?,
            consumer_name: row.get(11)?,
            custom_unit_id: row.get(12)?,
            custom_recipe_id: row.get(13)?,
        })
    }

    fn custom_substance_from_row(row: &rusqlite::Row) -> rusqlite::Result<CustomSubstance> {
        Ok(CustomSubstance {
            id: row.get(0)?,
            name: row.get(1)?,
            units: row.get(2)?,
            description: row.get(3)?,
            roas: get_json(row, 4)?,
        })
    }

    fn custom_unit_from_row(row: &rusqlite::Row) -> rusqlite::Result<CustomUnit> {
        Ok(CustomUnit {
            id: row.get(0)?,
            substance_name: row.get(1)?,
            name: row.get(2)?,
            created_at: get_ts(row, 3)?,
            administration_route: get_route(row, 4)?,
            dose: row.get(5)?,
            estimated_dose_standard_deviation: row.get(6)?,
            is_estimate: row.get(7)?,
            is_archived: row.get(8)?,
            unit: row.get(9)?,
            unit_plural: row.get(10)?,
            original_unit: row.get(11)?,
            note: row.get(12)?,
        })
    }

    fn recipe_from_row(row: &rusqlite::Row) -> rusqlite::Result<CustomRecipe> {
        Ok(CustomRecipe {
            id: row.get(0)?,
            name: row.get(1)?,
            created_at: get_ts(row, 2)?,
            administration_route: get_route(row, 3)?,
            is_archived: row.get(4)?,
            unit: row.get(5)?,
            unit_plural: row.get(6)?,
            note: row.get(7)?,
        })
    }

    fn subcomponent_from_row(row: &rusqlite::Row) -> rusqlite::Result<RecipeSubcomponent> {
        Ok(RecipeSubcomponent {
            id: row.get(0)?,
            recipe_id: row.get(1)?,
            substance_name: row.get(2)?,
            dose: row.get(3)?,
            is_estimate: row.get(4)?,
            estimated_dose_standard_deviation: row.get(5)?,
            units: row.get(6)?,
        })
    }

    fn timed_note_from_row(row: &rusqlite::Row) -> rusqlite::Result<TimedNote> {
        Ok(TimedNote {
            id: row.get(0)?,
            experience_id: row.get(1)?,
            creation_date: get_ts(row, 2)?,
            time: get_ts(row, 3)?,
            note: row.get(4)?,
            color: get_color(row, 5)?,
            is_part_of_timeline: row.get(7)?,
        })
    }

    fn photo_from_row(row: &rusqlite::Row) -> rusqlite::Result<TimedNotePhoto> {
        Ok(TimedNotePhoto {
            id: row.get(0)?,
            timed_note_id: row.get(1)?,
            file_path: row.get(2)?,
            caption: row.get(3)?,
            creation_date: get_ts(row, 4)?,
        })
    }

    fn reminder_from_row(row: &rusqlite::Row) -> rusqlite::Result<IngestionReminder> {
        let pattern: Option<String> = row.get(13)?;
        Ok(IngestionReminder {
            id: row.get(0)?,
            title: row.get(1)?,
            time_of_day: get_time_of_day(row, 2)?,
            is_enabled: row.get(3)?,
            substance_name: row.get(4)?,
            administration_route: get_route(row, 5)?,
            dose: row.get(6)?,
            units: row.get(7)?,
            is_estimate: row.get(8)?,
            estimated_dose_standard_deviation: row.get(9)?,
            custom_unit_id: row.get(10)?,
            consumer_name: row.get(11)?,
            note: row.get(12)?,
            custom_repeat_pattern: CustomRepeatPattern::decode(pattern.as_deref()),
            created_at: get_ts(row, 14)?,
        })
    }

    fn companion_from_row(row: &rusqlite::Row) -> rusqlite::Result<SubstanceCompanion> {
        Ok(SubstanceCompanion {
            substance_name: row.get(0)?,
            color: get_color(row, 1)?,
        })
    }

    // --- Experiences ---

    fn insert_experience_row(
        &self,
        experience: &NewExperience,
        creation_date: &DateTime<Utc>,
        is_favorite: bool,
    ) -> Result<i64> {
        let location = experience.location.as_ref();
        self.conn.execute(
            "INSERT INTO experiences (title, text, creation_date, sort_date, is_favorite,
                                      location_name, location_latitude, location_longitude)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                experience.title,
                experience.text,
                ts(creation_date),
                ts(&experience.sort_date),
                is_favorite,
                location.map(|l| l.name.as_str()),
                location.and_then(|l| l.latitude),
                location.and_then(|l| l.longitude),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn create_experience(&self, experience: &NewExperience) -> Result<Experience> {
        let id = self.insert_experience_row(experience, &Utc::now(), false)?;
        self.touched(&[Table::Experiences]);
        self.get_experience(id)?
            .context("Experience not found after insert")
    }

    /// Create an experience and its first ingestions atomically. The ingestions'
    /// `experience_id` is ignored.
    pub fn create_experience_with_ingestions(
        &self,
        experience: &NewExperience,
        ingestions: &[NewIngestion],
    ) -> Result<(Experience, Vec<Ingestion>)> {
        let checked = ingestions
            .iter()
            .map(checked_ingestion)
            .collect::<Result<Vec<_>>>()?;

        let now = Utc::now();
        let tx = self.conn.unchecked_transaction()?;
        let experience_id = self.insert_experience_row(experience, &now, false)?;
        let mut ids = Vec::with_capacity(checked.len());
        for ingestion in &checked {
            ids.push(self.insert_ingestion_row(experience_id, ingestion, &now)?);
            self.ensure_companion(&ingestion.substance_name)?;
        }
        tx.commit()?;
        self.touched(&[Table::Experiences, Table::Ingestions, Table::Companions]);

        let experience = self
            .get_experience(experience_id)?
            .context("Experience not found after insert")?;
        let mut created = Vec::with_capacity(ids.len());
        for id in ids {
            created.push(
                self.get_ingestion(id)?
                    .context("Ingestion not found after insert")?,
            );
        }
        Ok((experience, created))
    }

    pub fn get_experience(&self, id: i64) -> Result<Option<Experience>> {
        let experience = self
            .conn
            .query_row(
                &format!("SELECT {EXPERIENCE_COLUMNS} FROM experiences WHERE id = ?1"),
                params![id],
                Self::experience_from_row,
            )
            .optional()?;
        Ok(experience)
    }

    /// The whole journal, most recent first.
    pub fn list_experiences(&self) -> Result<Vec<Experience>> {
        self.search_experiences("", false)
    }

    /// Experiences whose title, text or any ingested substance contains `query`
    /// (case-insensitive), most recent first.
    pub fn search_experiences(&self, query: &str, favorites_only: bool) -> Result<Vec<Experience>> {
        let query = query.trim();
        let pattern = like_pattern(query);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EXPERIENCE_COLUMNS} FROM experiences
             WHERE (?1 = 0 OR is_favorite = 1)
               AND (?2 = '' OR title LIKE ?3 ESCAPE '\\' OR text LIKE ?3 ESCAPE '\\'
                    OR EXISTS (SELECT 1 FROM ingestions i
                               WHERE i.experience_id = experiences.id
                                 AND i.substance_name LIKE ?3 ESCAPE '\\'))
             ORDER BY sort_date DESC, id DESC"
        ))?;
        let experiences = stmt
            .query_map(
                params![favorites_only, query, pattern],
                Self::experience_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(experiences)
    }

    pub fn update_experience(
        &self,
        id: i64,
        update: &UpdateExperience,
    ) -> Result<Option<Experience>> {
        let Some(current) = self.get_experience(id)? else {
            return Ok(None);
        };
        let title = update.title.as_ref().unwrap_or(&current.title);
        let text = update.text.as_ref().unwrap_or(&current.text);
        let sort_date = update.sort_date.unwrap_or(current.sort_date);
        let is_favorite = update.is_favorite.unwrap_or(current.is_favorite);
        let location = match &update.location {
            Some(new_location) => new_location.as_ref(),
            None => current.location.as_ref(),
        };
        self.conn.execute(
            "UPDATE experiences SET title = ?1, text = ?2, sort_date = ?3, is_favorite = ?4,
                    location_name = ?5, location_latitude = ?6, location_longitude = ?7
             WHERE id = ?8",
            params![
                title,
                text,
                ts(&sort_date),
                is_favorite,
                location.map(|l| l.name.as_str()),
                location.and_then(|l| l.latitude),
                location.and_then(|l| l.longitude),
                id,
            ],
        )?;
        self.touched(&[Table::Experiences]);
        self.get_experience(id)
    }

    /// Deletes the experience with its ingestions, timed notes and photos.
    pub fn delete_experience(&self, id: i64) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let rows = self
            .conn
            .execute("DELETE FROM experiences WHERE id = ?1", params![id])?;
        self.remove_orphan_companions()?;
        tx.commit()?;
        if rows > 0 {
            self.touched(&[
                Table::Experiences,
                Table::Ingestions,
                Table::TimedNotes,
                Table::Companions,
            ]);
        }
        Ok(rows > 0)
    }

    pub fn get_experience_detail(&self, id: i64) -> Result<Option<ExperienceDetail>> {
        let Some(experience) = self.get_experience(id)? else {
            return Ok(None);
        };
        Ok(Some(ExperienceDetail {
            experience,
            ingestions: self.list_ingestions_for_experience(id)?,
            timed_notes: self.list_timed_notes(id)?,
        }))
    }

    // --- Ingestions ---

    fn insert_ingestion_row(
        &self,
        experience_id: i64,
        ingestion: &NewIngestion,
        creation_date: &DateTime<Utc>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO ingestions (experience_id, substance_name, time, creation_date,
                                     administration_route, dose, is_dose_an_estimate,
                                     estimated_dose_standard_deviation, units, notes,
                                     consumer_name, custom_unit_id, custom_recipe_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                experience_id,
                ingestion.substance_name,
                ts(&ingestion.time),
                ts(creation_date),
                ingestion.administration_route.as_db_str(),
                ingestion.dose,
                ingestion.is_dose_an_estimate,
                ingestion.estimated_dose_standard_deviation,
                ingestion.units,
                ingestion.notes,
                ingestion.consumer_name,
                ingestion.custom_unit_id,
                ingestion.custom_recipe_id,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn create_ingestion(&self, ingestion: &NewIngestion) -> Result<Ingestion> {
        Ok(self
            .create_ingestions(ingestion.experience_id, std::slice::from_ref(ingestion))?
            .remove(0))
    }

    /// Insert several ingestions into an existing experience in one transaction.
    pub fn create_ingestions(
        &self,
        experience_id: i64,
        ingestions: &[NewIngestion],
    ) -> Result<Vec<Ingestion>> {
        if ingestions.is_empty() {
            bail!("Nothing to log");
        }
        if self.get_experience(experience_id)?.is_none() {
            bail!("Experience {experience_id} not found");
        }
        let checked = ingestions
            .iter()
            .map(checked_ingestion)
            .collect::<Result<Vec<_>>>()?;

        let now = Utc::now();
        let tx = self.conn.unchecked_transaction()?;
        let mut ids = Vec::with_capacity(checked.len());
        for ingestion in &checked {
            ids.push(self.insert_ingestion_row(experience_id, ingestion, &now)?);
            self.ensure_companion(&ingestion.substance_name)?;
        }
        tx.commit()?;
        self.touched(&[Table::Ingestions, Table::Companions]);

        let mut created = Vec::with_capacity(ids.len());
        for id in ids {
            created.push(
                self.get_ingestion(id)?
                    .context("Ingestion not found after insert")?,
            );
        }
        Ok(created)
    }

    pub fn get_ingestion(&self, id: i64) -> Result<Option<Ingestion>> {
        let ingestion = self
            .conn
            .query_row(
                &format!("SELECT {INGESTION_COLUMNS} FROM ingestions WHERE id = ?1"),
                params![id],
                Self::ingestion_from_row,
            )
            .optional()?;
        Ok(ingestion)
    }

    pub fn list_ingestions_for_experience(&self, experience_id: i64) -> Result<Vec<Ingestion>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INGESTION_COLUMNS} FROM ingestions
             WHERE experience_id = ?1
             ORDER BY time, id"
        ))?;
        let ingestions = stmt
            .query_map(params![experience_id], Self::ingestion_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ingestions)
    }

    /// All ingestions at or after `since` (or ever), most recent first.
    pub fn list_ingestions(&self, since: Option<DateTime<Utc>>) -> Result<Vec<Ingestion>> {
        let since = since.as_ref().map(ts);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INGESTION_COLUMNS} FROM ingestions
             WHERE ?1 IS NULL OR time >= ?1
             ORDER BY time DESC, id DESC"
        ))?;
        let ingestions = stmt
            .query_map(params![since], Self::ingestion_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ingestions)
    }

    pub fn update_ingestion(&self, id: i64, update: &UpdateIngestion) -> Result<Option<Ingestion>> {
        let Some(current) = self.get_ingestion(id)? else {
            return Ok(None);
        };
        let time = update.time.unwrap_or(current.time);
        let dose = update.dose.unwrap_or(current.dose);
        let is_estimate = update
            .is_dose_an_estimate
            .unwrap_or(current.is_dose_an_estimate);
        let sd = update
            .estimated_dose_standard_deviation
            .unwrap_or(current.estimated_dose_standard_deviation);
        let notes = update.notes.as_ref().unwrap_or(&current.notes);
        let consumer_name = update
            .consumer_name
            .as_ref()
            .unwrap_or(&current.consumer_name);
        let experience_id = update.experience_id.unwrap_or(current.experience_id);

        validate_dose(dose, sd)?;
        if experience_id != current.experience_id && self.get_experience(experience_id)?.is_none()
        {
            bail!("Experience {experience_id} not found");
        }

        self.conn.execute(
            "UPDATE ingestions SET time = ?1, dose = ?2, is_dose_an_estimate = ?3,
                    estimated_dose_standard_deviation = ?4, notes = ?5, consumer_name = ?6,
                    experience_id = ?7
             WHERE id = ?8",
            params![
                ts(&time),
                dose,
                is_estimate,
                sd,
                notes,
                consumer_name,
                experience_id,
                id,
            ],
        )?;
        self.touched(&[Table::Ingestions]);
        self.get_ingestion(id)
    }

    pub fn delete_ingestion(&self, id: i64) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let rows = self
            .conn
            .execute("DELETE FROM ingestions WHERE id = ?1", params![id])?;
        self.remove_orphan_companions()?;
        tx.commit()?;
        if rows > 0 {
            self.touched(&[Table::Ingestions, Table::Companions]);
        }
        Ok(rows > 0)
    }

    /// Distinct substance names, most recently ingested first.
    pub fn recently_used_substances(&self, limit: usize) -> Result<Vec<String>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(
            "SELECT substance_name FROM ingestions
             GROUP BY substance_name
             ORDER BY MAX(time) DESC, MAX(id) DESC
             LIMIT ?1",
        )?;
        let names = stmt
            .query_map(params![limit], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    // --- Companions ---

    /// Give `substance_name` a companion if it has none yet. Returns true if one was created.
    fn ensure_companion(&self, substance_name: &str) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM substance_companions WHERE substance_name = ?1)",
            params![substance_name],
            |row| row.get(0),
        )?;
        if exists {
            return Ok(false);
        }
        let used: Vec<AdaptiveColor> = self
            .list_companions()?
            .into_iter()
            .map(|c| c.color)
            .collect();
        let color = AdaptiveColor::Predefined(pick_companion_color(&used));
        let (tag, value) = color.to_columns();
        self.conn.execute(
            "INSERT INTO substance_companions (substance_name, color_tag, color_value)
             VALUES (?1, ?2, ?3)",
            params![substance_name, tag, value],
        )?;
        tracing::debug!(substance = substance_name, %color, "companion created");
        Ok(true)
    }

    fn remove_orphan_companions(&self) -> Result<usize> {
        let rows = self.conn.execute(
            "DELETE FROM substance_companions
             WHERE substance_name NOT IN (SELECT DISTINCT substance_name FROM ingestions)",
            [],
        )?;
        Ok(rows)
    }

    pub fn get_companion(&self, substance_name: &str) -> Result<Option<SubstanceCompanion>> {
        let companion = self
            .conn
            .query_row(
                "SELECT substance_name, color_tag, color_value FROM substance_companions
                 WHERE substance_name = ?1",
                params![substance_name],
                Self::companion_from_row,
            )
            .optional()?;
        Ok(companion)
    }

    pub fn list_companions(&self) -> Result<Vec<SubstanceCompanion>> {
        let mut stmt = self.conn.prepare(
            "SELECT substance_name, color_tag, color_value FROM substance_companions
             ORDER BY substance_name COLLATE NOCASE",
        )?;
        let companions = stmt
            .query_map([], Self::companion_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(companions)
    }

    pub fn set_companion_color(&self, substance_name: &str, color: AdaptiveColor) -> Result<bool> {
        let (tag, value) = color.to_columns();
        let rows = self.conn.execute(
            "UPDATE substance_companions SET color_tag = ?1, color_value = ?2
             WHERE substance_name = ?3",
            params![tag, value, substance_name],
        )?;
        if rows > 0 {
            self.touched(&[Table::Companions]);
        }
        Ok(rows > 0)
    }

    // --- Custom substances ---

    fn insert_custom_substance_row(&self, substance: &NewCustomSubstance) -> Result<i64> {
        let roas = serde_json::to_string(&substance.roas)?;
        self.conn.execute(
            "INSERT INTO custom_substances (name, units, description, roas)
             VALUES (?1, ?2, ?3, ?4)",
            params![substance.name, substance.units, substance.description, roas],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn create_custom_substance(&self, substance: &NewCustomSubstance) -> Result<CustomSubstance> {
        let name = validate_substance_name(&substance.name)?;
        if substance.units.trim().is_empty() {
            bail!("Custom substance '{name}' must have units");
        }
        if self.get_custom_substance_by_name(&name)?.is_some() {
            bail!("A custom substance named '{name}' already exists");
        }
        let id = self.insert_custom_substance_row(&NewCustomSubstance {
            name,
            ..substance.clone()
        })?;
        self.touched(&[Table::CustomSubstances]);
        self.get_custom_substance(id)?
            .context("Custom substance not found after insert")
    }

    pub fn get_custom_substance(&self, id: i64) -> Result<Option<CustomSubstance>> {
        let substance = self
            .conn
            .query_row(
                "SELECT id, name, units, description, roas FROM custom_substances WHERE id = ?1",
                params![id],
                Self::custom_substance_from_row,
            )
            .optional()?;
        Ok(substance)
    }

    /// Case-insensitive lookup.
    pub fn get_custom_substance_by_name(&self, name: &str) -> Result<Option<CustomSubstance>> {
        let substance = self
            .conn
            .query_row(
                "SELECT id, name, units, description, roas FROM custom_substances
                 WHERE name = ?1 COLLATE NOCASE",
                params![name.trim()],
                Self::custom_substance_from_row,
            )
            .optional()?;
        Ok(substance)
    }

    pub fn list_custom_substances(&self) -> Result<Vec<CustomSubstance>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, units, description, roas FROM custom_substances
             ORDER BY name COLLATE NOCASE",
        )?;
        let substances = stmt
            .query_map([], Self::custom_substance_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(substances)
    }

    pub fn update_custom_substance(
        &self,
        id: i64,
        substance: &NewCustomSubstance,
    ) -> Result<Option<CustomSubstance>> {
        if self.get_custom_substance(id)?.is_none() {
            return Ok(None);
        }
        let name = validate_substance_name(&substance.name)?;
        if substance.units.trim().is_empty() {
            bail!("Custom substance '{name}' must have units");
        }
        if let Some(other) = self.get_custom_substance_by_name(&name)? {
            if other.id != id {
                bail!("A custom substance named '{name}' already exists");
            }
        }
        let roas = serde_json::to_string(&substance.roas)?;
        self.conn.execute(
            "UPDATE custom_substances SET name = ?1, units = ?2, description = ?3, roas = ?4
             WHERE id = ?5",
            params![name, substance.units, substance.description, roas, id],
        )?;
        self.touched(&[Table::CustomSubstances]);
        self.get_custom_substance(id)
    }

    pub fn delete_custom_substance(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM custom_substances WHERE id = ?1", params![id])?;
        if rows > 0 {
            self.touched(&[Table::CustomSubstances]);
        }
        Ok(rows > 0)
    }

    pub fn export_custom_substances(&self) -> Result<Vec<ExportCustomSubstance>> {
        Ok(self
            .list_custom_substances()?
            .into_iter()
            .map(|s| ExportCustomSubstance {
                name: s.name,
                units: s.units,
                description: s.description,
                roas: s.roas,
            })
            .collect())
    }

    /// Import custom substances, skipping names that already exist. Every record is validated
    /// before anything is written.
    pub fn import_custom_substances(
        &self,
        substances: &[ExportCustomSubstance],
    ) -> Result<ImportSummary> {
        for (i, substance) in substances.iter().enumerate() {
            validate_custom_substance(substance)
                .with_context(|| format!("Invalid custom substance at index {i}"))?;
        }

        let tx = self.conn.unchecked_transaction()?;
        let summary = self.import_custom_substance_rows(substances)?;
        tx.commit()?;
        if summary.custom_substances_imported > 0 {
            self.touched(&[Table::CustomSubstances]);
        }
        Ok(summary)
    }

    fn import_custom_substance_rows(
        &self,
        substances: &[ExportCustomSubstance],
    ) -> Result<ImportSummary> {
        let mut summary = ImportSummary::default();
        for substance in substances {
            let name = substance.name.trim();
            if self.get_custom_substance_by_name(name)?.is_some() {
                summary.custom_substances_skipped += 1;
                continue;
            }
            self.insert_custom_substance_row(&NewCustomSubstance {
                name: name.to_string(),
                units: substance.units.trim().to_string(),
                description: substance.description.clone(),
                roas: substance.roas.clone(),
            })?;
            summary.custom_substances_imported += 1;
        }
        Ok(summary)
    }

    // --- Custom units ---

    fn insert_custom_unit_row(
        &self,
        unit: &NewCustomUnit,
        created_at: &DateTime<Utc>,
        is_archived: bool,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO custom_units (substance_name, name, created_at, administration_route,
                                       dose, estimated_dose_standard_deviation, is_estimate,
                                       is_archived, unit, unit_plural, original_unit, note)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                unit.substance_name,
                unit.name,
                ts(created_at),
                unit.administration_route.as_db_str(),
                unit.dose,
                unit.estimated_dose_standard_deviation,
                unit.is_estimate,
                is_archived,
                unit.unit,
                unit.unit_plural,
                unit.original_unit,
                unit.note,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn create_custom_unit(&self, unit: &NewCustomUnit) -> Result<CustomUnit> {
        let substance_name = validate_substance_name(&unit.substance_name)?;
        validate_dose(unit.dose, unit.estimated_dose_standard_deviation)?;
        if unit.name.trim().is_empty() {
            bail!("Custom unit name must not be empty");
        }
        if unit.unit.trim().is_empty() {
            bail!("Custom unit '{}' must have a unit label", unit.name);
        }
        let id = self.insert_custom_unit_row(
            &NewCustomUnit {
                substance_name,
                ..unit.clone()
            },
            &Utc::now(),
            false,
        )?;
        self.touched(&[Table::CustomUnits]);
        self.get_custom_unit(id)?
            .context("Custom unit not found after insert")
    }

    /// Archived units are returned too; ingestions keep pointing at them.
    pub fn get_custom_unit(&self, id: i64) -> Result<Option<CustomUnit>> {
        let unit = self
            .conn
            .query_row(
                &format!("SELECT {CUSTOM_UNIT_COLUMNS} FROM custom_units WHERE id = ?1"),
                params![id],
                Self::custom_unit_from_row,
            )
            .optional()?;
        Ok(unit)
    }

    pub fn list_custom_units(
        &self,
        substance_name: Option<&str>,
        include_archived: bool,
    ) -> Result<Vec<CustomUnit>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CUSTOM_UNIT_COLUMNS} FROM custom_units
             WHERE (?1 IS NULL OR substance_name = ?1 COLLATE NOCASE)
               AND (?2 = 1 OR is_archived = 0)
             ORDER BY substance_name COLLATE NOCASE, name COLLATE NOCASE"
        ))?;
        let units = stmt
            .query_map(
                params![substance_name, include_archived],
                Self::custom_unit_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(units)
    }

    pub fn set_custom_unit_archived(&self, id: i64, archived: bool) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE custom_units SET is_archived = ?1 WHERE id = ?2",
            params![archived, id],
        )?;
        if rows > 0 {
            self.touched(&[Table::CustomUnits]);
        }
        Ok(rows > 0)
    }

    /// Ingestions and reminders using the unit keep their dose but lose the link.
    pub fn delete_custom_unit(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM custom_units WHERE id = ?1", params![id])?;
        if rows > 0 {
            self.touched(&[Table::CustomUnits, Table::Ingestions, Table::Reminders]);
        }
        Ok(rows > 0)
    }

    // --- Custom recipes ---

    fn insert_recipe_row(
        &self,
        recipe: &NewCustomRecipe,
        created_at: &DateTime<Utc>,
        is_archived: bool,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO custom_recipes (name, created_at, administration_route, is_archived,
                                         unit, unit_plural, note)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                recipe.name,
                ts(created_at),
                recipe.administration_route.as_db_str(),
                is_archived,
                recipe.unit,
                recipe.unit_plural,
                recipe.note,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn insert_subcomponent_row(
        &self,
        recipe_id: i64,
        sub: &NewRecipeSubcomponent,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO recipe_subcomponents (recipe_id, substance_name, dose, is_estimate,
                                               estimated_dose_standard_deviation, units)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                recipe_id,
                sub.substance_name.trim(),
                sub.dose,
                sub.is_estimate,
                sub.estimated_dose_standard_deviation,
                sub.units,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn create_recipe(
        &self,
        recipe: &NewCustomRecipe,
        subcomponents: &[NewRecipeSubcomponent],
    ) -> Result<RecipeDetail> {
        if recipe.name.trim().is_empty() {
            bail!("Recipe name must not be empty");
        }
        if recipe.unit.trim().is_empty() {
            bail!("Recipe '{}' must have a unit label", recipe.name);
        }
        for sub in subcomponents {
            validate_recipe_subcomponent(sub)?;
        }

        let tx = self.conn.unchecked_transaction()?;
        let recipe_id = self.insert_recipe_row(
            &NewCustomRecipe {
                name: recipe.name.trim().to_string(),
                ..recipe.clone()
            },
            &Utc::now(),
            false,
        )?;
        for sub in subcomponents {
            self.insert_subcomponent_row(recipe_id, sub)?;
        }
        tx.commit()?;
        self.touched(&[Table::CustomRecipes]);
        self.get_recipe_detail(recipe_id)?
            .context("Recipe not found after insert")
    }

    pub fn add_recipe_subcomponent(
        &self,
        recipe_id: i64,
        sub: &NewRecipeSubcomponent,
    ) -> Result<RecipeSubcomponent> {
        validate_recipe_subcomponent(sub)?;
        if self.get_recipe(recipe_id)?.is_none() {
            bail!("Recipe {recipe_id} not found");
        }
        let id = self.insert_subcomponent_row(recipe_id, sub)?;
        self.touched(&[Table::CustomRecipes]);
        self.conn
            .query_row(
                &format!("SELECT {SUBCOMPONENT_COLUMNS} FROM recipe_subcomponents WHERE id = ?1"),
                params![id],
                Self::subcomponent_from_row,
            )
            .context("Recipe subcomponent not found after insert")
    }

    pub fn remove_recipe_subcomponent(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM recipe_subcomponents WHERE id = ?1", params![id])?;
        if rows > 0 {
            self.touched(&[Table::CustomRecipes]);
        }
        Ok(rows > 0)
    }

    pub fn get_recipe(&self, id: i64) -> Result<Option<CustomRecipe>> {
        let recipe = self
            .conn
            .query_row(
                &format!("SELECT {RECIPE_COLUMNS} FROM custom_recipes WHERE id = ?1"),
                params![id],
                Self::recipe_from_row,
            )
            .optional()?;
        Ok(recipe)
    }

    pub fn get_recipe_subcomponents(&self, recipe_id: i64) -> Result<Vec<RecipeSubcomponent>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SUBCOMPONENT_COLUMNS} FROM recipe_subcomponents
             WHERE recipe_id = ?1
             ORDER BY id"
        ))?;
        let subs = stmt
            .query_map(params![recipe_id], Self::subcomponent_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(subs)
    }

    pub fn get_recipe_detail(&self, id: i64) -> Result<Option<RecipeDetail>> {
        let Some(recipe) = self.get_recipe(id)? else {
            return Ok(None);
        };
        let subcomponents = self.get_recipe_subcomponents(id)?;
        Ok(Some(RecipeDetail {
            recipe,
            subcomponents,
        }))
    }

    pub fn list_recipes(&self, include_archived: bool) -> Result<Vec<RecipeDetail>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECIPE_COLUMNS} FROM custom_recipes
             WHERE ?1 = 1 OR is_archived = 0
             ORDER BY name COLLATE NOCASE"
        ))?;
        let recipes = stmt
            .query_map(params![include_archived], Self::recipe_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        let mut details = Vec::with_capacity(recipes.len());
        for recipe in recipes {
            let subcomponents = self.get_recipe_subcomponents(recipe.id)?;
            details.push(RecipeDetail {
                recipe,
                subcomponents,
            });
        }
        Ok(details)
    }

    pub fn set_recipe_archived(&self, id: i64, archived: bool) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE custom_recipes SET is_archived = ?1 WHERE id = ?2",
            params![archived, id],
        )?;
        if rows > 0 {
            self.touched(&[Table::CustomRecipes]);
        }
        Ok(rows > 0)
    }

    /// Deletes the recipe and its subcomponents. Ingestions logged from it are kept.
    pub fn delete_recipe(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM custom_recipes WHERE id = ?1", params![id])?;
        if rows > 0 {
            self.touched(&[Table::CustomRecipes, Table::Ingestions]);
        }
        Ok(rows > 0)
    }

    // --- Timed notes ---

    fn insert_timed_note_row(
        &self,
        note: &NewTimedNote,
        creation_date: &DateTime<Utc>,
    ) -> Result<i64> {
        let (tag, value) = note.color.to_columns();
        self.conn.execute(
            "INSERT INTO timed_notes (experience_id, creation_date, time, note, color_tag,
                                      color_value, is_part_of_timeline)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                note.experience_id,
                ts(creation_date),
                ts(&note.time),
                note.note,
                tag,
                value,
                note.is_part_of_timeline,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn create_timed_note(&self, note: &NewTimedNote) -> Result<TimedNote> {
        if note.note.trim().is_empty() {
            bail!("Note must not be empty");
        }
        if self.get_experience(note.experience_id)?.is_none() {
            bail!("Experience {} not found", note.experience_id);
        }
        let id = self.insert_timed_note_row(note, &Utc::now())?;
        self.touched(&[Table::TimedNotes]);
        self.get_timed_note(id)?
            .context("Timed note not found after insert")
    }

    pub fn get_timed_note(&self, id: i64) -> Result<Option<TimedNote>> {
        let note = self
            .conn
            .query_row(
                &format!("SELECT {TIMED_NOTE_COLUMNS} FROM timed_notes WHERE id = ?1"),
                params![id],
                Self::timed_note_from_row,
            )
            .optional()?;
        Ok(note)
    }

    pub fn list_timed_notes(&self, experience_id: i64) -> Result<Vec<TimedNoteWithPhotos>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TIMED_NOTE_COLUMNS} FROM timed_notes
             WHERE experience_id = ?1
             ORDER BY time, id"
        ))?;
        let notes = stmt
            .query_map(params![experience_id], Self::timed_note_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        let mut with_photos = Vec::with_capacity(notes.len());
        for note in notes {
            let photos = self.list_timed_note_photos(note.id)?;
            with_photos.push(TimedNoteWithPhotos { note, photos });
        }
        Ok(with_photos)
    }

    pub fn update_timed_note(&self, id: i64, update: &UpdateTimedNote) -> Result<Option<TimedNote>> {
        let Some(current) = self.get_timed_note(id)? else {
            return Ok(None);
        };
        let note = update.note.as_ref().unwrap_or(&current.note);
        if note.trim().is_empty() {
            bail!("Note must not be empty");
        }
        let time = update.time.unwrap_or(current.time);
        let (tag, value) = update.color.unwrap_or(current.color).to_columns();
        let on_timeline = update
            .is_part_of_timeline
            .unwrap_or(current.is_part_of_timeline);
        self.conn.execute(
            "UPDATE timed_notes SET time = ?1, note = ?2, color_tag = ?3, color_value = ?4,
                    is_part_of_timeline = ?5
             WHERE id = ?6",
            params![ts(&time), note, tag, value, on_timeline, id],
        )?;
        self.touched(&[Table::TimedNotes]);
        self.get_timed_note(id)
    }

    pub fn delete_timed_note(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM timed_notes WHERE id = ?1", params![id])?;
        if rows > 0 {
            self.touched(&[Table::TimedNotes]);
        }
        Ok(rows > 0)
    }

    fn insert_photo_row(
        &self,
        timed_note_id: i64,
        file_path: &str,
        caption: &str,
        creation_date: &DateTime<Utc>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO timed_note_photos (timed_note_id, file_path, caption, creation_date)
             VALUES (?1, ?2, ?3, ?4)",
            params![timed_note_id, file_path, caption, ts(creation_date)],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Attach a photo by absolute path. The file itself is not touched.
    pub fn add_timed_note_photo(
        &self,
        timed_note_id: i64,
        file_path: &str,
        caption: &str,
    ) -> Result<TimedNotePhoto> {
        if !Path::new(file_path).is_absolute() {
            bail!("Photo path must be absolute: {file_path}");
        }
        if self.get_timed_note(timed_note_id)?.is_none() {
            bail!("Timed note {timed_note_id} not found");
        }
        let id = self.insert_photo_row(timed_note_id, file_path, caption, &Utc::now())?;
        self.touched(&[Table::TimedNotes]);
        self.conn
            .query_row(
                &format!("SELECT {PHOTO_COLUMNS} FROM timed_note_photos WHERE id = ?1"),
                params![id],
                Self::photo_from_row,
            )
            .context("Photo not found after insert")
    }

    pub fn list_timed_note_photos(&self, timed_note_id: i64) -> Result<Vec<TimedNotePhoto>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PHOTO_COLUMNS} FROM timed_note_photos
             WHERE timed_note_id = ?1
             ORDER BY creation_date, id"
        ))?;
        let photos = stmt
            .query_map(params![timed_note_id], Self::photo_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(photos)
    }

    pub fn delete_timed_note_photo(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM timed_note_photos WHERE id = ?1", params![id])?;
        if rows > 0 {
            self.touched(&[Table::TimedNotes]);
        }
        Ok(rows > 0)
    }

    // --- Reminders ---

    fn insert_reminder_row(
        &self,
        reminder: &NewIngestionReminder,
        created_at: &DateTime<Utc>,
    ) -> Result<i64> {
        let pattern = reminder
            .custom_repeat_pattern
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn.execute(
            "INSERT INTO ingestion_reminders (title, time_of_day, is_enabled, substance_name,
                                              administration_route, dose, units, is_estimate,
                                              estimated_dose_standard_deviation, custom_unit_id,
                                              consumer_name, note, custom_repeat_pattern,
                                              created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                reminder.title,
                reminder.time_of_day.format(TIME_OF_DAY_FORMAT).to_string(),
                reminder.is_enabled,
                reminder.substance_name,
                reminder.administration_route.as_db_str(),
                reminder.dose,
                reminder.units,
                reminder.is_estimate,
                reminder.estimated_dose_standard_deviation,
                reminder.custom_unit_id,
                reminder.consumer_name,
                reminder.note,
                pattern,
                ts(created_at),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn checked_reminder(reminder: &NewIngestionReminder) -> Result<NewIngestionReminder> {
        let substance_name = validate_substance_name(&reminder.substance_name)?;
        validate_dose(reminder.dose, reminder.estimated_dose_standard_deviation)?;
        if let Some(pattern) = &reminder.custom_repeat_pattern {
            validate_repeat_pattern(pattern)?;
        }
        let title = if reminder.title.trim().is_empty() {
            substance_name.clone()
        } else {
            reminder.title.trim().to_string()
        };
        Ok(NewIngestionReminder {
            title,
            substance_name,
            ..reminder.clone()
        })
    }

    pub fn create_reminder(&self, reminder: &NewIngestionReminder) -> Result<IngestionReminder> {
        let reminder = Self::checked_reminder(reminder)?;
        let id = self.insert_reminder_row(&reminder, &Utc::now())?;
        self.touched(&[Table::Reminders]);
        self.get_reminder(id)?
            .context("Reminder not found after insert")
    }

    pub fn get_reminder(&self, id: i64) -> Result<Option<IngestionReminder>> {
        let reminder = self
            .conn
            .query_row(
                &format!("SELECT {REMINDER_COLUMNS} FROM ingestion_reminders WHERE id = ?1"),
                params![id],
                Self::reminder_from_row,
            )
            .optional()?;
        Ok(reminder)
    }

    pub fn list_reminders(&self) -> Result<Vec<IngestionReminder>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {REMINDER_COLUMNS} FROM ingestion_reminders ORDER BY time_of_day, id"
        ))?;
        let reminders = stmt
            .query_map([], Self::reminder_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(reminders)
    }

    pub fn update_reminder(
        &self,
        id: i64,
        reminder: &NewIngestionReminder,
    ) -> Result<Option<IngestionReminder>> {
        if self.get_reminder(id)?.is_none() {
            return Ok(None);
        }
        let reminder = Self::checked_reminder(reminder)?;
        let pattern = reminder
            .custom_repeat_pattern
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn.execute(
            "UPDATE ingestion_reminders SET title = ?1, time_of_day = ?2, is_enabled = ?3,
                    substance_name = ?4, administration_route = ?5, dose = ?6, units = ?7,
                    is_estimate = ?8, estimated_dose_standard_deviation = ?9,
                    custom_unit_id = ?10, consumer_name = ?11, note = ?12,
                    custom_repeat_pattern = ?13
             WHERE id = ?14",
            params![
                reminder.title,
                reminder.time_of_day.format(TIME_OF_DAY_FORMAT).to_string(),
                reminder.is_enabled,
                reminder.substance_name,
                reminder.administration_route.as_db_str(),
                reminder.dose,
                reminder.units,
                reminder.is_estimate,
                reminder.estimated_dose_standard_deviation,
                reminder.custom_unit_id,
                reminder.consumer_name,
                reminder.note,
                pattern,
                id,
            ],
        )?;
        self.touched(&[Table::Reminders]);
        self.get_reminder(id)
    }

    pub fn set_reminder_enabled(&self, id: i64, enabled: bool) -> Result<Option<IngestionReminder>> {
        let rows = self.conn.execute(
            "UPDATE ingestion_reminders SET is_enabled = ?1 WHERE id = ?2",
            params![enabled, id],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        if !enabled {
            self.conn
                .execute("DELETE FROM reminder_snoozes WHERE reminder_id = ?1", params![id])?;
        }
        self.touched(&[Table::Reminders]);
        self.get_reminder(id)
    }

    pub fn delete_reminder(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM ingestion_reminders WHERE id = ?1", params![id])?;
        if rows > 0 {
            self.touched(&[Table::Reminders]);
        }
        Ok(rows > 0)
    }

    /// Remember a snoozed alarm so it survives the process that set it.
    /// A later snooze of the same reminder replaces the earlier one.
    pub fn save_reminder_snooze(
        &self,
        until: &DateTime<Utc>,
        payload: &ReminderPayload,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO reminder_snoozes (reminder_id, until, payload) VALUES (?1, ?2, ?3)
             ON CONFLICT(reminder_id) DO UPDATE SET until = excluded.until, payload = excluded.payload",
            params![payload.reminder_id, ts(until), serde_json::to_string(payload)?],
        )?;
        self.touched(&[Table::Reminders]);
        Ok(())
    }

    /// Pending snoozes, earliest first.
    pub fn list_reminder_snoozes(&self) -> Result<Vec<(DateTime<Utc>, ReminderPayload)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT until, payload FROM reminder_snoozes ORDER BY until, reminder_id")?;
        let snoozes = stmt
            .query_map([], |row| Ok((get_ts(row, 0)?, get_json(row, 1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(snoozes)
    }

    pub fn clear_reminder_snooze(&self, reminder_id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM reminder_snoozes WHERE reminder_id = ?1",
            params![reminder_id],
        )?;
        if rows > 0 {
            self.touched(&[Table::Reminders]);
        }
        Ok(rows > 0)
    }

    // --- Statistics ---

    /// Per substance and unit usage since `since` (or ever), most used first.
    pub fn substance_stats(&self, since: Option<DateTime<Utc>>) -> Result<Vec<SubstanceStat>> {
        let since = since.as_ref().map(ts);
        let mut stmt = self.conn.prepare(
            "SELECT i.substance_name, i.units, COUNT(*), COUNT(DISTINCT i.experience_id),
                    COALESCE(SUM(i.dose), 0.0),
                    SUM(CASE WHEN i.dose IS NULL THEN 1 ELSE 0 END) > 0,
                    MAX(i.time), c.color_tag, c.color_value
             FROM ingestions i
             LEFT JOIN substance_companions c ON c.substance_name = i.substance_name
             WHERE ?1 IS NULL OR i.time >= ?1
             GROUP BY i.substance_name, i.units
             ORDER BY COUNT(*) DESC, i.substance_name COLLATE NOCASE, i.units",
        )?;
        let stats = stmt
            .query_map(params![since], |row| {
                let tag: Option<String> = row.get(7)?;
                let value: Option<String> = row.get(8)?;
                let color = match (tag, value) {
                    (Some(tag), Some(value)) => AdaptiveColor::from_columns(&tag, &value),
                    _ => None,
                };
                Ok(SubstanceStat {
                    substance_name: row.get(0)?,
                    units: row.get(1)?,
                    ingestion_count: row.get(2)?,
                    experience_count: row.get(3)?,
                    total_known_dose: row.get(4)?,
                    has_unknown_dose: row.get(5)?,
                    last_used: get_ts(row, 6)?,
                    color,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(stats)
    }

    // --- Export / Import ---

    pub fn export_journal(&self) -> Result<JournalExport> {
        let mut experiences = Vec::new();
        for experience in self.list_experiences()? {
            let ingestions = self
                .list_ingestions_for_experience(experience.id)?
                .into_iter()
                .map(|i| ExportIngestion {
                    substance_name: i.substance_name,
                    time: i.time,
                    creation_date: i.creation_date,
                    administration_route: i.administration_route,
                    dose: i.dose,
                    is_dose_an_estimate: i.is_dose_an_estimate,
                    estimated_dose_standard_deviation: i.estimated_dose_standard_deviation,
                    units: i.units,
                    notes: i.notes,
                    consumer_name: i.consumer_name,
                    custom_unit_id: i.custom_unit_id,
                    custom_recipe_id: i.custom_recipe_id,
                })
                .collect();
            let timed_notes = self
                .list_timed_notes(experience.id)?
                .into_iter()
                .map(|TimedNoteWithPhotos { note, photos }| ExportTimedNote {
                    creation_date: note.creation_date,
                    time: note.time,
                    note: note.note,
                    color: note.color,
                    is_part_of_timeline: note.is_part_of_timeline,
                    photos: photos
                        .into_iter()
                        .map(|p| ExportPhoto {
                            file_path: p.file_path,
                            caption: p.caption,
                            creation_date: p.creation_date,
                        })
                        .collect(),
                })
                .collect();
            experiences.push(ExportExperience {
                title: experience.title,
                text: experience.text,
                creation_date: experience.creation_date,
                sort_date: experience.sort_date,
                is_favorite: experience.is_favorite,
                location: experience.location,
                ingestions,
                timed_notes,
            });
        }

        let custom_units = self
            .list_custom_units(None, true)?
            .into_iter()
            .map(|u| ExportCustomUnit {
                id: u.id,
                substance_name: u.substance_name,
                name: u.name,
                created_at: u.created_at,
                administration_route: u.administration_route,
                dose: u.dose,
                estimated_dose_standard_deviation: u.estimated_dose_standard_deviation,
                is_estimate: u.is_estimate,
                is_archived: u.is_archived,
                unit: u.unit,
                unit_plural: u.unit_plural,
                original_unit: u.original_unit,
                note: u.note,
            })
            .collect();

        let custom_recipes = self
            .list_recipes(true)?
            .into_iter()
            .map(|RecipeDetail { recipe, subcomponents }| ExportCustomRecipe {
                id: recipe.id,
                name: recipe.name,
                created_at: recipe.created_at,
                administration_route: recipe.administration_route,
                is_archived: recipe.is_archived,
                unit: recipe.unit,
                unit_plural: recipe.unit_plural,
                note: recipe.note,
                subcomponents: subcomponents
                    .into_iter()
                    .map(|s| ExportRecipeSubcomponent {
                        substance_name: s.substance_name,
                        dose: s.dose,
                        is_estimate: s.is_estimate,
                        estimated_dose_standard_deviation: s.estimated_dose_standard_deviation,
                        units: s.units,
                    })
                    .collect(),
            })
            .collect();

        let reminders = self
            .list_reminders()?
            .into_iter()
            .map(|r| ExportReminder {
                title: r.title,
                time_of_day: r.time_of_day,
                is_enabled: r.is_enabled,
                substance_name: r.substance_name,
                administration_route: r.administration_route,
                dose: r.dose,
                units: r.units,
                is_estimate: r.is_estimate,
                estimated_dose_standard_deviation: r.estimated_dose_standard_deviation,
                custom_unit_id: r.custom_unit_id,
                consumer_name: r.consumer_name,
                note: r.note,
                custom_repeat_pattern: r.custom_repeat_pattern,
            })
            .collect();

        Ok(JournalExport {
            version: JOURNAL_EXPORT_VERSION,
            exported_at: Utc::now(),
            experiences,
            custom_substances: self.export_custom_substances()?,
            custom_units,
            custom_recipes,
            reminders,
        })
    }

    /// Re-create everything in `data` with fresh ids, in one transaction. Custom unit and recipe
    /// references are remapped; references to records missing from the export are dropped.
    #[allow(clippy::too_many_lines)]
    pub fn import_journal(&self, data: &JournalExport) -> Result<ImportSummary> {
        if data.version > JOURNAL_EXPORT_VERSION {
            bail!(
                "Export version {} is newer than supported version {JOURNAL_EXPORT_VERSION}",
                data.version
            );
        }
        for (i, substance) in data.custom_substances.iter().enumerate() {
            validate_custom_substance(substance)
                .with_context(|| format!("Invalid custom substance at index {i}"))?;
        }

        let tx = self.conn.unchecked_transaction()?;
        let mut summary = self.import_custom_substance_rows(&data.custom_substances)?;

        let mut unit_ids: HashMap<i64, i64> = HashMap::new();
        for unit in &data.custom_units {
            let new_id = self.insert_custom_unit_row(
                &NewCustomUnit {
                    substance_name: unit.substance_name.clone(),
                    name: unit.name.clone(),
                    administration_route: unit.administration_route,
                    dose: unit.dose,
                    estimated_dose_standard_deviation: unit.estimated_dose_standard_deviation,
                    is_estimate: unit.is_estimate,
                    unit: unit.unit.clone(),
                    unit_plural: unit.unit_plural.clone(),
                    original_unit: unit.original_unit.clone(),
                    note: unit.note.clone(),
                },
                &unit.created_at,
                unit.is_archived,
            )?;
            unit_ids.insert(unit.id, new_id);
            summary.custom_units_imported += 1;
        }

        let mut recipe_ids: HashMap<i64, i64> = HashMap::new();
        for recipe in &data.custom_recipes {
            let new_id = self.insert_recipe_row(
                &NewCustomRecipe {
                    name: recipe.name.clone(),
                    administration_route: recipe.administration_route,
                    unit: recipe.unit.clone(),
                    unit_plural: recipe.unit_plural.clone(),
                    note: recipe.note.clone(),
                },
                &recipe.created_at,
                recipe.is_archived,
            )?;
            for sub in &recipe.subcomponents {
                self.insert_subcomponent_row(
                    new_id,
                    &NewRecipeSubcomponent {
                        substance_name: sub.substance_name.clone(),
                        dose: sub.dose,
                        is_estimate: sub.is_estimate,
                        estimated_dose_standard_deviation: sub.estimated_dose_standard_deviation,
                        units: sub.units.clone(),
                    },
                )?;
            }
            recipe_ids.insert(recipe.id, new_id);
            summary.custom_recipes_imported += 1;
        }

        for experience in &data.experiences {
            let experience_id = self.insert_experience_row(
                &NewExperience {
                    title: experience.title.clone(),
                    text: experience.text.clone(),
                    sort_date: experience.sort_date,
                    location: experience.location.clone(),
                },
                &experience.creation_date,
                experience.is_favorite,
            )?;
            summary.experiences_imported += 1;

            for ingestion in &experience.ingestions {
                let new = checked_ingestion(&NewIngestion {
                    experience_id,
                    substance_name: ingestion.substance_name.clone(),
                    time: ingestion.time,
                    administration_route: ingestion.administration_route,
                    dose: ingestion.dose,
                    is_dose_an_estimate: ingestion.is_dose_an_estimate,
                    estimated_dose_standard_deviation: ingestion
                        .estimated_dose_standard_deviation,
                    units: ingestion.units.clone(),
                    notes: ingestion.notes.clone(),
                    consumer_name: ingestion.consumer_name.clone(),
                    custom_unit_id: ingestion
                        .custom_unit_id
                        .and_then(|id| unit_ids.get(&id).copied()),
                    custom_recipe_id: ingestion
                        .custom_recipe_id
                        .and_then(|id| recipe_ids.get(&id).copied()),
                })?;
                self.insert_ingestion_row(experience_id, &new, &ingestion.creation_date)?;
                self.ensure_companion(&new.substance_name)?;
                summary.ingestions_imported += 1;
            }

            for note in &experience.timed_notes {
                let note_id = self.insert_timed_note_row(
                    &NewTimedNote {
                        experience_id,
                        time: note.time,
                        note: note.note.clone(),
                        color: note.color,
                        is_part_of_timeline: note.is_part_of_timeline,
                    },
                    &note.creation_date,
                )?;
                for photo in &note.photos {
                    self.insert_photo_row(
                        note_id,
                        &photo.file_path,
                        &photo.caption,
                        &photo.creation_date,
                    )?;
                }
                summary.timed_notes_imported += 1;
            }
        }

        let now = Utc::now();
        for reminder in &data.reminders {
            let new = Self::checked_reminder(&NewIngestionReminder {
                title: reminder.title.clone(),
                time_of_day: reminder.time_of_day,
                is_enabled: reminder.is_enabled,
                substance_name: reminder.substance_name.clone(),
                administration_route: reminder.administration_route,
                dose: reminder.dose,
                units: reminder.units.clone(),
                is_estimate: reminder.is_estimate,
                estimated_dose_standard_deviation: reminder.estimated_dose_standard_deviation,
                custom_unit_id: reminder
                    .custom_unit_id
                    .and_then(|id| unit_ids.get(&id).copied()),
                consumer_name: reminder.consumer_name.clone(),
                note: reminder.note.clone(),
                custom_repeat_pattern: reminder.custom_repeat_pattern.clone(),
            })?;
            self.insert_reminder_row(&new, &now)?;
            summary.reminders_imported += 1;
        }

        tx.commit()?;
        tracing::info!(
            experiences = summary.experiences_imported,
            ingestions = summary.ingestions_imported,
            "journal imported"
        );
        self.touched(&[
            Table::Experiences,
            Table::Ingestions,
            Table::TimedNotes,
            Table::CustomSubstances,
            Table::CustomUnits,
            Table::CustomRecipes,
            Table::Reminders,
            Table::Companions,
        ]);
        Ok(summary)
    }
}
