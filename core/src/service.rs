use std::fmt;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, TimeZone, Utc};
use serde::Serialize;

use crate::catalog::SubstanceCatalog;
use crate::db::Database;
use crate::models::{
    CustomSubstance, Experience, ExportCustomSubstance, ImportSummary, Ingestion,
    IngestionReminder, JournalExport, NewCustomSubstance, NewExperience, NewIngestion,
    NewIngestionReminder,
};
use crate::reminder::{
    ActionOutcome, NotificationAction, ReminderPayload, ReminderScheduler, ScheduleOutcome,
    default_experience_title,
};
use crate::search::{self, SearchHit, SearchResult};

/// How many recently used substances are lifted to the top of search results.
pub const DEFAULT_RECENTS_LIMIT: usize = 10;

/// Where and when a logged ingestion goes. `experience_id: None` starts a new experience.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub experience_id: Option<i64>,
    pub time: DateTime<Utc>,
    pub notes: String,
    pub consumer_name: Option<String>,
}

impl LogContext {
    #[must_use]
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            experience_id: None,
            time,
            notes: String::new(),
            consumer_name: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggedIngestions {
    pub experience: Experience,
    pub created_experience: bool,
    pub ingestions: Vec<Ingestion>,
}

fn check_count(count: f64) -> Result<()> {
    if !count.is_finite() || count <= 0.0 {
        bail!("Count must be a positive number");
    }
    Ok(())
}

pub struct JournalService {
    db: Database,
    catalog: &'static SubstanceCatalog,
}

impl JournalService {
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Database::open(Path::new(db_path))?;
        Ok(Self::with_database(db))
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self::with_database(db))
    }

    #[must_use]
    pub fn with_database(db: Database) -> Self {
        Self {
            db,
            catalog: SubstanceCatalog::bundled(),
        }
    }

    /// Plain CRUD goes straight to the database.
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn catalog(&self) -> &SubstanceCatalog {
        self.catalog
    }

    // --- Logging ---

    /// Log one ingestion. With no experience given, a new one is created, titled after the
    /// ingestion's local date. `ingestion.experience_id` is ignored.
    pub fn log_ingestion(
        &self,
        experience_id: Option<i64>,
        ingestion: &NewIngestion,
    ) -> Result<LoggedIngestions> {
        self.insert_logged(experience_id, ingestion.time, std::slice::from_ref(ingestion))
    }

    /// Log `count` of a custom unit, converted to the substance's own units.
    pub fn log_custom_unit(
        &self,
        ctx: &LogContext,
        unit_id: i64,
        count: f64,
    ) -> Result<LoggedIngestions> {
        check_count(count)?;
        let unit = self
            .db
            .get_custom_unit(unit_id)?
            .with_context(|| format!("Custom unit {unit_id} not found"))?;
        let ingestion = NewIngestion {
            experience_id: 0,
            substance_name: unit.substance_name.clone(),
            time: ctx.time,
            administration_route: unit.administration_route,
            dose: unit.calculate_pure_dose(count),
            is_dose_an_estimate: unit.is_estimate,
            estimated_dose_standard_deviation: unit
                .estimated_dose_standard_deviation
                .map(|sd| sd * count),
            units: unit.original_unit.clone(),
            notes: ctx.notes.clone(),
            consumer_name: ctx.consumer_name.clone(),
            custom_unit_id: Some(unit.id),
            custom_recipe_id: None,
        };
        tracing::debug!(unit_id, count, substance = %unit.substance_name, "logging custom unit");
        self.insert_logged(ctx.experience_id, ctx.time, &[ingestion])
    }

    /// Log `count` of a recipe: one ingestion per subcomponent, each dose scaled by `count`.
    pub fn log_recipe(
        &self,
        ctx: &LogContext,
        recipe_id: i64,
        count: f64,
    ) -> Result<LoggedIngestions> {
        check_count(count)?;
        let detail = self
            .db
            .get_recipe_detail(recipe_id)?
            .with_context(|| format!("Recipe {recipe_id} not found"))?;
        if detail.subcomponents.is_empty() {
            bail!("Recipe '{}' has no subcomponents", detail.recipe.name);
        }
        let ingestions: Vec<NewIngestion> = detail
            .subcomponents
            .iter()
            .map(|sub| NewIngestion {
                experience_id: 0,
                substance_name: sub.substance_name.clone(),
                time: ctx.time,
                administration_route: detail.recipe.administration_route,
                dose: sub.dose.map(|d| d * count),
                is_dose_an_estimate: sub.is_estimate,
                estimated_dose_standard_deviation: sub
                    .estimated_dose_standard_deviation
                    .map(|sd| sd * count),
                units: sub.units.clone(),
                notes: ctx.notes.clone(),
                consumer_name: ctx.consumer_name.clone(),
                custom_unit_id: None,
                custom_recipe_id: Some(detail.recipe.id),
            })
            .collect();
        self.insert_logged(ctx.experience_id, ctx.time, &ingestions)
    }

    fn insert_logged(
        &self,
        experience_id: Option<i64>,
        time: DateTime<Utc>,
        ingestions: &[NewIngestion],
    ) -> Result<LoggedIngestions> {
        match experience_id {
            Some(id) => {
                let created = self.db.create_ingestions(id, ingestions)?;
                let experience = self
                    .db
                    .get_experience(id)?
                    .with_context(|| format!("Experience {id} not found"))?;
                Ok(LoggedIngestions {
                    experience,
                    created_experience: false,
                    ingestions: created,
                })
            }
            None => {
                let experience = NewExperience {
                    title: default_experience_title(&time.with_timezone(&Local)),
                    text: String::new(),
                    sort_date: time,
                    location: None,
                };
                let (experience, created) = self
                    .db
                    .create_experience_with_ingestions(&experience, ingestions)?;
                tracing::info!(experience_id = experience.id, "experience started");
                Ok(LoggedIngestions {
                    experience,
                    created_experience: true,
                    ingestions: created,
                })
            }
        }
    }

    // --- Substances ---

    /// Search the catalog and custom substances, most recently used first.
    pub fn search_substances(
        &self,
        query: &str,
        required_categories: &[String],
        recents_limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let recents = self.db.recently_used_substances(recents_limit)?;
        let customs = self.db.list_custom_substances()?;
        let candidates: Vec<SearchHit<'_>> = self
            .catalog
            .all()
            .iter()
            .map(SearchHit::Reference)
            .chain(customs.iter().map(SearchHit::Custom))
            .collect();
        let ranked = search::search_substances(&candidates, query, required_categories, &recents);
        Ok(ranked.into_iter().map(|hit| SearchResult::from(*hit)).collect())
    }

    /// Catalog entry first, then a custom substance of the same name.
    pub fn lookup_substance(&self, name: &str) -> Result<Option<SearchResult>> {
        if let Some(substance) = self.catalog.get(name.trim()) {
            return Ok(Some(SearchResult::Reference(substance.clone())));
        }
        Ok(self
            .db
            .get_custom_substance_by_name(name)?
            .map(SearchResult::Custom))
    }

    pub fn create_custom_substance(&self, substance: &NewCustomSubstance) -> Result<CustomSubstance> {
        if let Some(existing) = self.catalog.get(substance.name.trim()) {
            bail!(
                "'{}' is already in the substance catalog as '{}'",
                substance.name.trim(),
                existing.name
            );
        }
        self.db.create_custom_substance(substance)
    }

    pub fn import_custom_substances(
        &self,
        substances: &[ExportCustomSubstance],
    ) -> Result<ImportSummary> {
        let (clashing, fresh): (Vec<_>, Vec<_>) = substances
            .iter()
            .cloned()
            .partition(|s| self.catalog.get(s.name.trim()).is_some());
        let mut summary = self.db.import_custom_substances(&fresh)?;
        summary.custom_substances_skipped += i64::try_from(clashing.len()).unwrap_or(i64::MAX);
        Ok(summary)
    }

    /// Import a full journal export. Custom substances named like a catalog entry are skipped.
    pub fn import_journal(&self, data: &JournalExport) -> Result<ImportSummary> {
        let (clashing, fresh): (Vec<_>, Vec<_>) = data
            .custom_substances
            .iter()
            .cloned()
            .partition(|s| self.catalog.get(s.name.trim()).is_some());
        let filtered = JournalExport {
            custom_substances: fresh,
            ..data.clone()
        };
        let mut summary = self.db.import_journal(&filtered)?;
        summary.custom_substances_skipped += i64::try_from(clashing.len()).unwrap_or(i64::MAX);
        Ok(summary)
    }

    // --- Reminders ---

    pub fn create_reminder<Tz: TimeZone>(
        &self,
        reminder: &NewIngestionReminder,
        scheduler: &ReminderScheduler<'_>,
        now: &DateTime<Tz>,
    ) -> Result<(IngestionReminder, ScheduleOutcome)> {
        let created = self.db.create_reminder(reminder)?;
        let outcome = scheduler.schedule(&created, now)?;
        Ok((created, outcome))
    }

    /// Enabling schedules the next alarm; disabling cancels anything pending.
    pub fn set_reminder_enabled<Tz: TimeZone>(
        &self,
        id: i64,
        enabled: bool,
        scheduler: &ReminderScheduler<'_>,
        now: &DateTime<Tz>,
    ) -> Result<Option<(IngestionReminder, ScheduleOutcome)>> {
        let Some(reminder) = self.db.set_reminder_enabled(id, enabled)? else {
            return Ok(None);
        };
        let outcome = scheduler.schedule(&reminder, now)?;
        Ok(Some((reminder, outcome)))
    }

    pub fn delete_reminder(&self, id: i64, scheduler: &ReminderScheduler<'_>) -> Result<bool> {
        let deleted = self.db.delete_reminder(id)?;
        if deleted {
            scheduler.cancel(id);
        }
        Ok(deleted)
    }

    /// Schedule every stored reminder, e.g. at startup.
    pub fn schedule_all_reminders<Tz: TimeZone>(
        &self,
        scheduler: &ReminderScheduler<'_>,
        now: &DateTime<Tz>,
    ) -> Result<Vec<(i64, ScheduleOutcome)>> {
        let reminders = self.db.list_reminders()?;
        Ok(scheduler.schedule_all(&reminders, now))
    }

    pub fn handle_reminder_action<Tz>(
        &self,
        scheduler: &ReminderScheduler<'_>,
        action: NotificationAction,
        payload: &ReminderPayload,
        now: &DateTime<Tz>,
    ) -> ActionOutcome
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        scheduler.handle_action(&self.db, action, payload, now)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::{NaiveTime, TimeZone};

    use super::*;
    use crate::models::{
        AdministrationRoute, NewCustomRecipe, NewCustomUnit, NewRecipeSubcomponent,
    };
    use crate::reminder::{AlarmKey, AlarmScheduler, Notifier, ReminderNotification};

    #[derive(Default)]
    struct FakeAlarms {
        scheduled: Mutex<Vec<(DateTime<Utc>, AlarmKey)>>,
        cancelled: Mutex<Vec<AlarmKey>>,
    }

    impl AlarmScheduler for FakeAlarms {
        fn can_schedule_exact(&self) -> bool {
            true
        }

        fn schedule_exact(
            &self,
            trigger: DateTime<Utc>,
            key: AlarmKey,
            _payload: &ReminderPayload,
        ) -> Result<()> {
            self.scheduled.lock().unwrap().push((trigger, key));
            Ok(())
        }

        fn cancel(&self, key: AlarmKey) {
            self.cancelled.lock().unwrap().push(key);
        }
    }

    struct SilentNotifier;

    impl Notifier for SilentNotifier {
        fn is_permitted(&self) -> bool {
            true
        }

        fn show(&self, _notification: &ReminderNotification) -> Result<()> {
            Ok(())
        }

        fn cancel(&self, _notification_id: i64) {}
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, day, hour, 0, 0).unwrap()
    }

    fn sample_ingestion(substance: &str) -> NewIngestion {
        NewIngestion {
            experience_id: 0,
            substance_name: substance.to_string(),
            time: at(4, 21),
            administration_route: AdministrationRoute::Oral,
            dose: Some(100.0),
            is_dose_an_estimate: false,
            estimated_dose_standard_deviation: None,
            units: "mg".to_string(),
            notes: String::new(),
            consumer_name: None,
            custom_unit_id: None,
            custom_recipe_id: None,
        }
    }

    fn sample_reminder() -> NewIngestionReminder {
        NewIngestionReminder {
            title: "Morning".to_string(),
            time_of_day: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            is_enabled: true,
            substance_name: "Caffeine".to_string(),
            administration_route: AdministrationRoute::Oral,
            dose: Some(100.0),
            units: "mg".to_string(),
            is_estimate: false,
            estimated_dose_standard_deviation: None,
            custom_unit_id: None,
            consumer_name: None,
            note: String::new(),
            custom_repeat_pattern: None,
        }
    }

    fn names(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(SearchResult::name).collect()
    }

    #[test]
    fn test_log_ingestion_starts_experience() {
        let svc = JournalService::new_in_memory().unwrap();
        let logged = svc.log_ingestion(None, &sample_ingestion("MDMA")).unwrap();
        assert!(logged.created_experience);
        assert_eq!(logged.experience.sort_date, at(4, 21));
        assert!(!logged.experience.title.is_empty());
        assert_eq!(logged.ingestions.len(), 1);
        assert_eq!(logged.ingestions[0].experience_id, logged.experience.id);
        assert!(svc.db().get_companion("MDMA").unwrap().is_some());
    }

    #[test]
    fn test_log_ingestion_into_existing_experience() {
        let svc = JournalService::new_in_memory().unwrap();
        let first = svc.log_ingestion(None, &sample_ingestion("MDMA")).unwrap();
        let second = svc
            .log_ingestion(Some(first.experience.id), &sample_ingestion("LSD"))
            .unwrap();
        assert!(!second.created_experience);
        assert_eq!(second.experience.id, first.experience.id);
        assert_eq!(svc.db().list_experiences().unwrap().len(), 1);
        assert_eq!(
            svc.db()
                .list_ingestions_for_experience(first.experience.id)
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn test_log_into_missing_experience_fails() {
        let svc = JournalService::new_in_memory().unwrap();
        assert!(svc.log_ingestion(Some(12), &sample_ingestion("MDMA")).is_err());
    }

    #[test]
    fn test_log_custom_unit_converts_dose() {
        let svc = JournalService::new_in_memory().unwrap();
        let unit = svc
            .db()
            .create_custom_unit(&NewCustomUnit {
                substance_name: "Caffeine".to_string(),
                name: "Espresso".to_string(),
                administration_route: AdministrationRoute::Oral,
                dose: Some(80.0),
                estimated_dose_standard_deviation: Some(10.0),
                is_estimate: true,
                unit: "shot".to_string(),
                unit_plural: Some("shots".to_string()),
                original_unit: "mg".to_string(),
                note: String::new(),
            })
            .unwrap();

        let logged = svc
            .log_custom_unit(&LogContext::new(at(5, 9)), unit.id, 2.0)
            .unwrap();
        let ingestion = &logged.ingestions[0];
        assert_eq!(ingestion.substance_name, "Caffeine");
        assert_eq!(ingestion.dose, Some(160.0));
        assert_eq!(ingestion.estimated_dose_standard_deviation, Some(20.0));
        assert!(ingestion.is_dose_an_estimate);
        assert_eq!(ingestion.units, "mg");
        assert_eq!(ingestion.custom_unit_id, Some(unit.id));
        assert_eq!(ingestion.time, at(5, 9));
    }

    #[test]
    fn test_log_custom_unit_rejects_bad_count_and_unknown_unit() {
        let svc = JournalService::new_in_memory().unwrap();
        let ctx = LogContext::new(at(5, 9));
        assert!(svc.log_custom_unit(&ctx, 1, 0.0).is_err());
        assert!(svc.log_custom_unit(&ctx, 1, f64::NAN).is_err());
        assert!(svc.log_custom_unit(&ctx, 1, 1.0).is_err());
    }

    #[test]
    fn test_log_recipe_expands_subcomponents() {
        let svc = JournalService::new_in_memory().unwrap();
        let recipe = svc
            .db()
            .create_recipe(
                &NewCustomRecipe {
                    name: "Candyflip".to_string(),
                    administration_route: AdministrationRoute::Sublingual,
                    unit: "dose".to_string(),
                    unit_plural: None,
                    note: String::new(),
                },
                &[
                    NewRecipeSubcomponent {
                        substance_name: "LSD".to_string(),
                        dose: Some(100.0),
                        is_estimate: false,
                        estimated_dose_standard_deviation: None,
                        units: "µg".to_string(),
                    },
                    NewRecipeSubcomponent {
                        substance_name: "MDMA".to_string(),
                        dose: None,
                        is_estimate: false,
                        estimated_dose_standard_deviation: None,
                        units: "mg".to_string(),
                    },
                ],
            )
            .unwrap();

        let ctx = LogContext {
            notes: "split".to_string(),
            ..LogContext::new(at(6, 22))
        };
        let logged = svc.log_recipe(&ctx, recipe.recipe.id, 1.5).unwrap();
        assert_eq!(logged.ingestions.len(), 2);
        let lsd = &logged.ingestions[0];
        assert_eq!(lsd.substance_name, "LSD");
        assert_eq!(lsd.dose, Some(150.0));
        assert_eq!(lsd.administration_route, AdministrationRoute::Sublingual);
        assert_eq!(lsd.custom_recipe_id, Some(recipe.recipe.id));
        assert_eq!(lsd.notes, "split");
        assert!(logged.ingestions[1].dose.is_none());
        assert!(
            logged
                .ingestions
                .iter()
                .all(|i| i.experience_id == logged.experience.id)
        );
    }

    #[test]
    fn test_log_empty_recipe_fails() {
        let svc = JournalService::new_in_memory().unwrap();
        let recipe = svc
            .db()
            .create_recipe(
                &NewCustomRecipe {
                    name: "Nothing".to_string(),
                    administration_route: AdministrationRoute::Oral,
                    unit: "cup".to_string(),
                    unit_plural: None,
                    note: String::new(),
                },
                &[],
            )
            .unwrap();
        assert!(
            svc.log_recipe(&LogContext::new(at(1, 1)), recipe.recipe.id, 1.0)
                .is_err()
        );
        assert!(svc.db().list_experiences().unwrap().is_empty());
    }

    #[test]
    fn test_search_includes_customs_and_recents() {
        let svc = JournalService::new_in_memory().unwrap();
        svc.create_custom_substance(&NewCustomSubstance {
            name: "Mystery Pill".to_string(),
            units: "mg".to_string(),
            description: String::new(),
            roas: vec![],
        })
        .unwrap();

        let results = svc.search_substances("mystery", &[], 10).unwrap();
        assert_eq!(names(&results), vec!["Mystery Pill"]);
        assert!(matches!(results[0], SearchResult::Custom(_)));

        svc.log_ingestion(None, &sample_ingestion("Ketamine")).unwrap();
        let all = svc.search_substances("", &[], 10).unwrap();
        assert_eq!(all[0].name(), "Ketamine");
        assert!(names(&all).contains(&"Mystery Pill"));
    }

    #[test]
    fn test_search_category_filter_excludes_customs() {
        let svc = JournalService::new_in_memory().unwrap();
        svc.create_custom_substance(&NewCustomSubstance {
            name: "Mystery Pill".to_string(),
            units: "mg".to_string(),
            description: String::new(),
            roas: vec![],
        })
        .unwrap();
        let results = svc
            .search_substances("", &["stimulant".to_string()], 10)
            .unwrap();
        assert!(!results.is_empty());
        assert!(
            results
                .iter()
                .all(|r| matches!(r, SearchResult::Reference(_)))
        );
    }

    #[test]
    fn test_custom_substance_cannot_shadow_catalog() {
        let svc = JournalService::new_in_memory().unwrap();
        let result = svc.create_custom_substance(&NewCustomSubstance {
            name: "caffeine".to_string(),
            units: "mg".to_string(),
            description: String::new(),
            roas: vec![],
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_import_skips_catalog_names() {
        let svc = JournalService::new_in_memory().unwrap();
        let batch = vec![
            ExportCustomSubstance {
                name: "MDMA".to_string(),
                units: "mg".to_string(),
                description: String::new(),
                roas: vec![],
            },
            ExportCustomSubstance {
                name: "Homebrew".to_string(),
                units: "mg".to_string(),
                description: String::new(),
                roas: vec![],
            },
        ];
        let summary = svc.import_custom_substances(&batch).unwrap();
        assert_eq!(summary.custom_substances_imported, 1);
        assert_eq!(summary.custom_substances_skipped, 1);
    }

    #[test]
    fn test_import_journal_skips_catalog_names() {
        let svc = JournalService::new_in_memory().unwrap();
        let data = JournalExport {
            version: 1,
            exported_at: Utc::now(),
            experiences: vec![],
            custom_substances: vec![
                ExportCustomSubstance {
                    name: "caffeine".to_string(),
                    units: "mg".to_string(),
                    description: String::new(),
                    roas: vec![],
                },
                ExportCustomSubstance {
                    name: "Homebrew".to_string(),
                    units: "ml".to_string(),
                    description: String::new(),
                    roas: vec![],
                },
            ],
            custom_units: vec![],
            custom_recipes: vec![],
            reminders: vec![],
        };
        let summary = svc.import_journal(&data).unwrap();
        assert_eq!(summary.custom_substances_imported, 1);
        assert_eq!(summary.custom_substances_skipped, 1);
        assert!(svc.db().get_custom_substance_by_name("caffeine").unwrap().is_none());
    }

    #[test]
    fn test_lookup_substance_prefers_catalog() {
        let svc = JournalService::new_in_memory().unwrap();
        svc.db()
            .create_custom_substance(&NewCustomSubstance {
                name: "Homebrew".to_string(),
                units: "mg".to_string(),
                description: String::new(),
                roas: vec![],
            })
            .unwrap();
        assert!(matches!(
            svc.lookup_substance("lsd").unwrap(),
            Some(SearchResult::Reference(_))
        ));
        assert!(matches!(
            svc.lookup_substance("homebrew").unwrap(),
            Some(SearchResult::Custom(_))
        ));
        assert!(svc.lookup_substance("nothing").unwrap().is_none());
    }

    #[test]
    fn test_reminder_lifecycle_drives_scheduler() {
        let svc = JournalService::new_in_memory().unwrap();
        let alarms = FakeAlarms::default();
        let notifier = SilentNotifier;
        let scheduler = ReminderScheduler::new(&alarms, &notifier);
        let now = at(4, 6);

        let (reminder, outcome) = svc
            .create_reminder(&sample_reminder(), &scheduler, &now)
            .unwrap();
        assert_eq!(outcome, ScheduleOutcome::Scheduled(at(4, 8)));

        let (_, outcome) = svc
            .set_reminder_enabled(reminder.id, false, &scheduler, &now)
            .unwrap()
            .unwrap();
        assert_eq!(outcome, ScheduleOutcome::Disabled);
        assert!(
            alarms
                .cancelled
                .lock()
                .unwrap()
                .contains(&AlarmKey::Daily(reminder.id))
        );

        assert!(svc.delete_reminder(reminder.id, &scheduler).unwrap());
        assert!(!svc.delete_reminder(reminder.id, &scheduler).unwrap());
        assert!(
            svc.set_reminder_enabled(reminder.id, true, &scheduler, &now)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_schedule_all_reminders() {
        let svc = JournalService::new_in_memory().unwrap();
        let alarms = FakeAlarms::default();
        let notifier = SilentNotifier;
        let scheduler = ReminderScheduler::new(&alarms, &notifier);
        svc.db().create_reminder(&sample_reminder()).unwrap();
        svc.db()
            .create_reminder(&NewIngestionReminder {
                is_enabled: false,
                ..sample_reminder()
            })
            .unwrap();

        let outcomes = svc.schedule_all_reminders(&scheduler, &at(4, 9)).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].1, ScheduleOutcome::Scheduled(at(5, 8)));
        assert_eq!(outcomes[1].1, ScheduleOutcome::Disabled);
        assert_eq!(alarms.scheduled.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_taken_action_through_service() {
        let svc = JournalService::new_in_memory().unwrap();
        let alarms = FakeAlarms::default();
        let notifier = SilentNotifier;
        let scheduler = ReminderScheduler::new(&alarms, &notifier);
        let reminder = svc.db().create_reminder(&sample_reminder()).unwrap();
        let payload = ReminderPayload::from(&reminder);

        let outcome =
            svc.handle_reminder_action(&scheduler, NotificationAction::Taken, &payload, &at(4, 8));
        assert!(matches!(outcome, ActionOutcome::Taken { .. }));
        assert_eq!(svc.db().list_ingestions(None).unwrap().len(), 1);
    }
}
