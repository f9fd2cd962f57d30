//! Daily ingestion reminders: trigger computation, alarm requests, and notification actions.
//!
//! The OS alarm and notification services are reached through [`AlarmScheduler`] and
//! [`Notifier`]. The alarm carries a [`ReminderPayload`] so the receiving side can show the
//! notification and record an ingestion without reading the reminder back from the database.

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::models::{AdministrationRoute, IngestionReminder, NewExperience, NewIngestion};

pub const SNOOZE_MINUTES: i64 = 15;

/// Added to a reminder id to get its notification id, keeping clear of other notifications.
pub const REMINDER_NOTIFICATION_OFFSET: i64 = 10_000;

const GAP_SEARCH_LIMIT_MINUTES: i64 = 24 * 60;

#[must_use]
pub fn notification_id(reminder_id: i64) -> i64 {
    REMINDER_NOTIFICATION_OFFSET + reminder_id
}

/// Next instant at which a daily reminder set for `time_of_day` should fire: today at that time
/// if it is still strictly in the future, otherwise tomorrow.
pub fn next_trigger<Tz: TimeZone>(time_of_day: NaiveTime, now: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    let today = now.date_naive();
    let candidate = resolve_local(&tz, today.and_time(time_of_day));
    if candidate > *now {
        return candidate;
    }
    let tomorrow = today.succ_opt().unwrap_or(NaiveDate::MAX);
    resolve_local(&tz, tomorrow.and_time(time_of_day))
}

#[must_use]
pub fn snooze_trigger(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::minutes(SNOOZE_MINUTES)
}

/// Map a wall-clock time to an instant. Ambiguous times take the earlier instant; times inside a
/// DST gap move forward to the first valid minute after it.
fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
        return dt;
    }
    let mut candidate = naive;
    for _ in 0..GAP_SEARCH_LIMIT_MINUTES {
        candidate += Duration::minutes(1);
        if let Some(dt) = tz.from_local_datetime(&candidate).earliest() {
            return dt;
        }
    }
    tz.from_utc_datetime(&naive)
}

// --- Alarm payloads ---

/// Identifies a pending alarm. A snooze has its own key so it never displaces the next daily alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reminder_id", rename_all = "snake_case")]
pub enum AlarmKey {
    Daily(i64),
    Snooze(i64),
}

impl AlarmKey {
    #[must_use]
    pub fn reminder_id(self) -> i64 {
        match self {
            Self::Daily(id) | Self::Snooze(id) => id,
        }
    }
}

impl fmt::Display for AlarmKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daily(id) => write!(f, "reminder-{id}"),
            Self::Snooze(id) => write!(f, "reminder-{id}-snooze"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderPayload {
    pub reminder_id: i64,
    pub title: String,
    pub time_of_day: NaiveTime,
    pub substance_name: String,
    pub administration_route: AdministrationRoute,
    pub dose: Option<f64>,
    pub units: String,
    pub is_estimate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_dose_standard_deviation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_unit_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_name: Option<String>,
    #[serde(default)]
    pub note: String,
}

impl From<&IngestionReminder> for ReminderPayload {
    fn from(r: &IngestionReminder) -> Self {
        Self {
            reminder_id: r.id,
            title: r.title.clone(),
            time_of_day: r.time_of_day,
            substance_name: r.substance_name.clone(),
            administration_route: r.administration_route,
            dose: r.dose,
            units: r.units.clone(),
            is_estimate: r.is_estimate,
            estimated_dose_standard_deviation: r.estimated_dose_standard_deviation,
            custom_unit_id: r.custom_unit_id,
            consumer_name: r.consumer_name.clone(),
            note: r.note.clone(),
        }
    }
}

impl ReminderPayload {
    /// One-line description of the planned ingestion, e.g. `"100 mg Caffeine (oral)"`.
    #[must_use]
    pub fn describe(&self) -> String {
        let estimate = if self.is_estimate { "~" } else { "" };
        match self.dose {
            Some(dose) => format!(
                "{estimate}{dose} {} {} ({})",
                self.units, self.substance_name, self.administration_route
            ),
            None => format!("{} ({})", self.substance_name, self.administration_route),
        }
    }
}

// --- Notifications ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationAction {
    Taken,
    Snooze,
    Skip,
}

impl NotificationAction {
    pub const ALL: &'static [NotificationAction] = &[Self::Taken, Self::Snooze, Self::Skip];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Taken => "Mark as taken",
            Self::Snooze => "Snooze",
            Self::Skip => "Skip",
        }
    }
}

impl FromStr for NotificationAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "taken" | "take" => Ok(Self::Taken),
            "snooze" => Ok(Self::Snooze),
            "skip" => Ok(Self::Skip),
            _ => anyhow::bail!("Invalid action '{s}'. Must be one of: taken, snooze, skip"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReminderNotification {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub actions: Vec<NotificationAction>,
    pub payload: ReminderPayload,
}

impl From<&ReminderPayload> for ReminderNotification {
    fn from(payload: &ReminderPayload) -> Self {
        let mut body = payload.describe();
        if !payload.note.is_empty() {
            body.push_str(" - ");
            body.push_str(&payload.note);
        }
        Self {
            id: notification_id(payload.reminder_id),
            title: payload.title.clone(),
            body,
            actions: NotificationAction::ALL.to_vec(),
            payload: payload.clone(),
        }
    }
}

// --- Platform collaborators ---

/// Exact, idle-tolerant one-shot wake alarms. Scheduling an existing key replaces it.
pub trait AlarmScheduler: Send + Sync {
    fn can_schedule_exact(&self) -> bool;
    fn schedule_exact(
        &self,
        trigger: DateTime<Utc>,
        key: AlarmKey,
        payload: &ReminderPayload,
    ) -> Result<()>;
    fn cancel(&self, key: AlarmKey);
}

pub trait Notifier: Send + Sync {
    fn is_permitted(&self) -> bool;
    fn show(&self, notification: &ReminderNotification) -> Result<()>;
    fn cancel(&self, notification_id: i64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Scheduled(DateTime<Utc>),
    /// The reminder is disabled; any pending alarm was cancelled.
    Disabled,
    /// Alarm or notification permission is missing; nothing was scheduled.
    NotPermitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Taken {
        experience_id: i64,
        ingestion_id: i64,
    },
    Snoozed {
        until: DateTime<Utc>,
    },
    Skipped,
    /// The action could not be completed. Details were logged.
    Failed,
}

pub struct ReminderScheduler<'a> {
    alarms: &'a dyn AlarmScheduler,
    notifier: &'a dyn Notifier,
}

impl<'a> ReminderScheduler<'a> {
    pub fn new(alarms: &'a dyn AlarmScheduler, notifier: &'a dyn Notifier) -> Self {
        Self { alarms, notifier }
    }

    fn permitted(&self) -> bool {
        self.alarms.can_schedule_exact() && self.notifier.is_permitted()
    }

    /// Request the next daily alarm for `reminder`, replacing any pending one.
    pub fn schedule<Tz: TimeZone>(
        &self,
        reminder: &IngestionReminder,
        now: &DateTime<Tz>,
    ) -> Result<ScheduleOutcome> {
        if !reminder.is_enabled {
            self.cancel(reminder.id);
            return Ok(ScheduleOutcome::Disabled);
        }
        if !self.permitted() {
            tracing::debug!(
                reminder_id = reminder.id,
                "alarm or notification permission missing, not scheduling"
            );
            return Ok(ScheduleOutcome::NotPermitted);
        }
        let trigger = next_trigger(reminder.time_of_day, now).with_timezone(&Utc);
        self.alarms
            .schedule_exact(
                trigger,
                AlarmKey::Daily(reminder.id),
                &ReminderPayload::from(reminder),
            )
            .with_context(|| format!("Failed to schedule reminder {}", reminder.id))?;
        tracing::info!(reminder_id = reminder.id, %trigger, "reminder scheduled");
        Ok(ScheduleOutcome::Scheduled(trigger))
    }

    /// Schedule every reminder in `reminders`. Failures are logged and skipped.
    pub fn schedule_all<Tz: TimeZone>(
        &self,
        reminders: &[IngestionReminder],
        now: &DateTime<Tz>,
    ) -> Vec<(i64, ScheduleOutcome)> {
        reminders
            .iter()
            .filter_map(|r| match self.schedule(r, now) {
                Ok(outcome) => Some((r.id, outcome)),
                Err(e) => {
                    tracing::warn!(reminder_id = r.id, error = %e, "failed to schedule reminder");
                    None
                }
            })
            .collect()
    }

    /// Drop pending alarms and any visible notification for a reminder.
    pub fn cancel(&self, reminder_id: i64) {
        self.alarms.cancel(AlarmKey::Daily(reminder_id));
        self.alarms.cancel(AlarmKey::Snooze(reminder_id));
        self.notifier.cancel(notification_id(reminder_id));
    }

    /// An alarm went off: show the notification, and for daily alarms request the next one.
    /// Returns the next daily trigger if one was scheduled.
    pub fn handle_alarm<Tz: TimeZone>(
        &self,
        key: AlarmKey,
        payload: &ReminderPayload,
        now: &DateTime<Tz>,
    ) -> Option<DateTime<Utc>> {
        if self.notifier.is_permitted() {
            if let Err(e) = self.notifier.show(&ReminderNotification::from(payload)) {
                tracing::warn!(reminder_id = payload.reminder_id, error = %e, "failed to show reminder");
            }
        } else {
            tracing::debug!(reminder_id = payload.reminder_id, "notifications not permitted");
        }

        let AlarmKey::Daily(reminder_id) = key else {
            return None;
        };
        if !self.alarms.can_schedule_exact() {
            return None;
        }
        let trigger = next_trigger(payload.time_of_day, now).with_timezone(&Utc);
        match self
            .alarms
            .schedule_exact(trigger, AlarmKey::Daily(reminder_id), payload)
        {
            Ok(()) => Some(trigger),
            Err(e) => {
                tracing::warn!(reminder_id, error = %e, "failed to reschedule daily reminder");
                None
            }
        }
    }

    /// Apply a notification action. Never returns an error: failures are logged and reported
    /// as [`ActionOutcome::Failed`], leaving the notification in place.
    pub fn handle_action<Tz>(
        &self,
        db: &Database,
        action: NotificationAction,
        payload: &ReminderPayload,
        now: &DateTime<Tz>,
    ) -> ActionOutcome
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let outcome = match action {
            NotificationAction::Taken => match record_taken(db, payload, now) {
                Ok((experience_id, ingestion_id)) => ActionOutcome::Taken {
                    experience_id,
                    ingestion_id,
                },
                Err(e) => {
                    tracing::error!(
                        reminder_id = payload.reminder_id,
                        error = ?e,
                        "failed to record ingestion from reminder"
                    );
                    return ActionOutcome::Failed;
                }
            },
            NotificationAction::Snooze => {
                let until = snooze_trigger(now.with_timezone(&Utc));
                if !self.alarms.can_schedule_exact() {
                    tracing::warn!(reminder_id = payload.reminder_id, "cannot snooze without alarm permission");
                    return ActionOutcome::Failed;
                }
                if let Err(e) =
                    self.alarms
                        .schedule_exact(until, AlarmKey::Snooze(payload.reminder_id), payload)
                {
                    tracing::error!(reminder_id = payload.reminder_id, error = %e, "failed to snooze reminder");
                    return ActionOutcome::Failed;
                }
                ActionOutcome::Snoozed { until }
            }
            NotificationAction::Skip => ActionOutcome::Skipped,
        };
        self.notifier.cancel(notification_id(payload.reminder_id));
        outcome
    }
}

/// Title given to experiences created implicitly, e.g. "Sat 4 Apr 2026".
#[must_use]
pub fn default_experience_title<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    at.format("%a %-d %b %Y").to_string()
}

/// Create a fresh experience holding one ingestion described by `payload`, timed at `now`.
pub fn record_taken<Tz>(
    db: &Database,
    payload: &ReminderPayload,
    now: &DateTime<Tz>,
) -> Result<(i64, i64)>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let at = now.with_timezone(&Utc);
    let experience = NewExperience {
        title: default_experience_title(now),
        text: String::new(),
        sort_date: at,
        location: None,
    };
    let ingestion = NewIngestion {
        experience_id: 0,
        substance_name: payload.substance_name.clone(),
        time: at,
        administration_route: payload.administration_route,
        dose: payload.dose,
        is_dose_an_estimate: payload.is_estimate,
        estimated_dose_standard_deviation: payload.estimated_dose_standard_deviation,
        units: payload.units.clone(),
        notes: payload.note.clone(),
        consumer_name: payload.consumer_name.clone(),
        custom_unit_id: payload.custom_unit_id,
        custom_recipe_id: None,
    };
    let (experience, ingestions) = db.create_experience_with_ingestions(&experience, &[ingestion])?;
    let ingestion = ingestions
        .first()
        .context("Experience was created without its ingestion")?;
    Ok((experience.id, ingestion.id))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::{FixedOffset, LocalResult, NaiveDate, Offset};

    use super::*;

    #[derive(Default)]
    struct RecordingAlarms {
        denied: bool,
        pending: Mutex<HashMap<AlarmKey, (DateTime<Utc>, ReminderPayload)>>,
    }

    impl AlarmScheduler for RecordingAlarms {
        fn can_schedule_exact(&self) -> bool {
            !self.denied
        }

        fn schedule_exact(
            &self,
            trigger: DateTime<Utc>,
            key: AlarmKey,
            payload: &ReminderPayload,
        ) -> Result<()> {
            self.pending
                .lock()
                .unwrap()
                .insert(key, (trigger, payload.clone()));
            Ok(())
        }

        fn cancel(&self, key: AlarmKey) {
            self.pending.lock().unwrap().remove(&key);
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        denied: bool,
        shown: Mutex<Vec<ReminderNotification>>,
        cancelled: Mutex<Vec<i64>>,
    }

    impl Notifier for RecordingNotifier {
        fn is_permitted(&self) -> bool {
            !self.denied
        }

        fn show(&self, notification: &ReminderNotification) -> Result<()> {
            self.shown.lock().unwrap().push(notification.clone());
            Ok(())
        }

        fn cancel(&self, notification_id: i64) {
            self.cancelled.lock().unwrap().push(notification_id);
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, h, m, 0).unwrap()
    }

    fn eight() -> NaiveTime {
        NaiveTime::from_hms_opt(8, 0, 0).unwrap()
    }

    fn sample_reminder(enabled: bool) -> IngestionReminder {
        IngestionReminder {
            id: 3,
            title: "Morning meds".to_string(),
            time_of_day: eight(),
            is_enabled: enabled,
            substance_name: "Methylphenidate".to_string(),
            administration_route: AdministrationRoute::Oral,
            dose: Some(10.0),
            units: "mg".to_string(),
            is_estimate: false,
            estimated_dose_standard_deviation: None,
            custom_unit_id: None,
            consumer_name: None,
            note: "with breakfast".to_string(),
            custom_repeat_pattern: None,
            created_at: at(6, 0),
        }
    }

    #[test]
    fn test_next_trigger_before_time_is_today() {
        assert_eq!(next_trigger(eight(), &at(7, 0)), at(8, 0));
    }

    #[test]
    fn test_next_trigger_at_or_after_time_is_tomorrow() {
        let tomorrow = at(8, 0) + Duration::days(1);
        assert_eq!(next_trigger(eight(), &at(8, 0)), tomorrow);
        assert_eq!(next_trigger(eight(), &at(9, 0)), tomorrow);
    }

    #[test]
    fn test_next_trigger_uses_local_wall_clock() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        // 05:30 UTC is 07:30 at +02:00, so 08:00 local is still ahead
        let now = at(5, 30).with_timezone(&tz);
        let trigger = next_trigger(eight(), &now);
        assert_eq!(trigger.with_timezone(&Utc), at(6, 0));
        assert_eq!(trigger.time(), eight());
    }

    /// +01:00 with a spring-forward gap from 02:00 to 03:00 local on 2026-03-29.
    #[derive(Debug, Clone, Copy)]
    struct GapZone;

    impl GapZone {
        fn transition_local() -> NaiveDateTime {
            NaiveDate::from_ymd_opt(2026, 3, 29)
                .unwrap()
                .and_hms_opt(2, 0, 0)
                .unwrap()
        }

        fn winter() -> FixedOffset {
            FixedOffset::east_opt(3600).unwrap()
        }

        fn summer() -> FixedOffset {
            FixedOffset::east_opt(7200).unwrap()
        }
    }

    impl TimeZone for GapZone {
        type Offset = FixedOffset;

        fn from_offset(_offset: &FixedOffset) -> Self {
            GapZone
        }

        fn offset_from_local_date(&self, _local: &NaiveDate) -> LocalResult<FixedOffset> {
            LocalResult::Single(Self::winter())
        }

        fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
            let start = Self::transition_local();
            let end = start + Duration::hours(1);
            if *local < start {
                LocalResult::Single(Self::winter())
            } else if *local < end {
                LocalResult::None
            } else {
                LocalResult::Single(Self::summer())
            }
        }

        fn offset_from_utc_date(&self, _utc: &NaiveDate) -> FixedOffset {
            Self::winter()
        }

        fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
            let switch = Self::transition_local() - Duration::hours(1);
            if *utc < switch {
                Self::winter()
            } else {
                Self::summer()
            }
        }
    }

    #[test]
    fn test_next_trigger_inside_dst_gap_moves_to_gap_end() {
        let now = GapZone
            .from_local_datetime(
                &NaiveDate::from_ymd_opt(2026, 3, 29)
                    .unwrap()
                    .and_hms_opt(0, 30, 0)
                    .unwrap(),
            )
            .unwrap();
        let trigger = next_trigger(NaiveTime::from_hms_opt(2, 30, 0).unwrap(), &now);
        assert_eq!(
            trigger.naive_local(),
            NaiveDate::from_ymd_opt(2026, 3, 29)
                .unwrap()
                .and_hms_opt(3, 0, 0)
                .unwrap()
        );
        assert_eq!(trigger.offset().fix(), GapZone::summer());
    }

    #[test]
    fn test_snooze_is_exactly_fifteen_minutes() {
        let now = Utc.with_ymd_and_hms(2026, 5, 10, 8, 3, 17).unwrap();
        assert_eq!(snooze_trigger(now) - now, Duration::minutes(15));
    }

    #[test]
    fn test_notification_id_offset() {
        assert_eq!(notification_id(3), REMINDER_NOTIFICATION_OFFSET + 3);
        assert_ne!(notification_id(1), notification_id(2));
    }

    #[test]
    fn test_schedule_enabled_reminder() {
        let alarms = RecordingAlarms::default();
        let notifier = RecordingNotifier::default();
        let scheduler = ReminderScheduler::new(&alarms, &notifier);

        let outcome = scheduler.schedule(&sample_reminder(true), &at(7, 0)).unwrap();
        assert_eq!(outcome, ScheduleOutcome::Scheduled(at(8, 0)));

        let pending = alarms.pending.lock().unwrap();
        let (trigger, payload) = &pending[&AlarmKey::Daily(3)];
        assert_eq!(*trigger, at(8, 0));
        assert_eq!(payload.substance_name, "Methylphenidate");
    }

    #[test]
    fn test_rescheduling_replaces_pending_alarm() {
        let alarms = RecordingAlarms::default();
        let notifier = RecordingNotifier::default();
        let scheduler = ReminderScheduler::new(&alarms, &notifier);
        let reminder = sample_reminder(true);

        scheduler.schedule(&reminder, &at(7, 0)).unwrap();
        scheduler.schedule(&reminder, &at(9, 0)).unwrap();

        let pending = alarms.pending.lock().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[&AlarmKey::Daily(3)].0, at(8, 0) + Duration::days(1));
    }

    #[test]
    fn test_disabled_reminder_cancels_and_never_schedules() {
        let alarms = RecordingAlarms::default();
        let notifier = RecordingNotifier::default();
        let scheduler = ReminderScheduler::new(&alarms, &notifier);

        scheduler.schedule(&sample_reminder(true), &at(7, 0)).unwrap();
        let outcome = scheduler.schedule(&sample_reminder(false), &at(7, 0)).unwrap();

        assert_eq!(outcome, ScheduleOutcome::Disabled);
        assert!(alarms.pending.lock().unwrap().is_empty());
        assert_eq!(*notifier.cancelled.lock().unwrap(), vec![notification_id(3)]);
    }

    #[test]
    fn test_missing_permission_is_noop() {
        let alarms = RecordingAlarms {
            denied: true,
            ..Default::default()
        };
        let notifier = RecordingNotifier::default();
        let scheduler = ReminderScheduler::new(&alarms, &notifier);
        let outcome = scheduler.schedule(&sample_reminder(true), &at(7, 0)).unwrap();
        assert_eq!(outcome, ScheduleOutcome::NotPermitted);
        assert!(alarms.pending.lock().unwrap().is_empty());

        let alarms = RecordingAlarms::default();
        let notifier = RecordingNotifier {
            denied: true,
            ..Default::default()
        };
        let scheduler = ReminderScheduler::new(&alarms, &notifier);
        let outcome = scheduler.schedule(&sample_reminder(true), &at(7, 0)).unwrap();
        assert_eq!(outcome, ScheduleOutcome::NotPermitted);
    }

    #[test]
    fn test_daily_alarm_shows_and_reschedules() {
        let alarms = RecordingAlarms::default();
        let notifier = RecordingNotifier::default();
        let scheduler = ReminderScheduler::new(&alarms, &notifier);
        let payload = ReminderPayload::from(&sample_reminder(true));

        let next = scheduler.handle_alarm(AlarmKey::Daily(3), &payload, &at(8, 0));
        assert_eq!(next, Some(at(8, 0) + Duration::days(1)));

        let shown = notifier.shown.lock().unwrap();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].id, notification_id(3));
        assert_eq!(shown[0].title, "Morning meds");
        assert_eq!(shown[0].body, "10 mg Methylphenidate (oral) - with breakfast");
        assert_eq!(shown[0].actions, NotificationAction::ALL.to_vec());
    }

    #[test]
    fn test_snooze_alarm_does_not_reschedule() {
        let alarms = RecordingAlarms::default();
        let notifier = RecordingNotifier::default();
        let scheduler = ReminderScheduler::new(&alarms, &notifier);
        let payload = ReminderPayload::from(&sample_reminder(true));

        assert!(scheduler
            .handle_alarm(AlarmKey::Snooze(3), &payload, &at(8, 15))
            .is_none());
        assert!(alarms.pending.lock().unwrap().is_empty());
        assert_eq!(notifier.shown.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_snooze_action_keeps_daily_alarm() {
        let db = Database::open_in_memory().unwrap();
        let alarms = RecordingAlarms::default();
        let notifier = RecordingNotifier::default();
        let scheduler = ReminderScheduler::new(&alarms, &notifier);
        let reminder = sample_reminder(true);
        let payload = ReminderPayload::from(&reminder);

        scheduler.schedule(&reminder, &at(7, 0)).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 5, 10, 8, 2, 30).unwrap();
        let outcome = scheduler.handle_action(&db, NotificationAction::Snooze, &payload, &now);

        let until = now + Duration::minutes(15);
        assert_eq!(outcome, ActionOutcome::Snoozed { until });
        let pending = alarms.pending.lock().unwrap();
        assert_eq!(pending[&AlarmKey::Snooze(3)].0, until);
        assert_eq!(pending[&AlarmKey::Snooze(3)].1, payload);
        assert!(pending.contains_key(&AlarmKey::Daily(3)));
        assert_eq!(*notifier.cancelled.lock().unwrap(), vec![notification_id(3)]);
    }

    #[test]
    fn test_taken_action_records_experience_and_ingestion() {
        let db = Database::open_in_memory().unwrap();
        let alarms = RecordingAlarms::default();
        let notifier = RecordingNotifier::default();
        let scheduler = ReminderScheduler::new(&alarms, &notifier);
        let payload = ReminderPayload::from(&sample_reminder(true));

        let outcome = scheduler.handle_action(&db, NotificationAction::Taken, &payload, &at(8, 5));
        let ActionOutcome::Taken {
            experience_id,
            ingestion_id,
        } = outcome
        else {
            panic!("expected Taken, got {outcome:?}");
        };

        let experience = db.get_experience(experience_id).unwrap().unwrap();
        assert_eq!(experience.title, "Sun 10 May 2026");
        let ingestion = db.get_ingestion(ingestion_id).unwrap().unwrap();
        assert_eq!(ingestion.experience_id, experience_id);
        assert_eq!(ingestion.substance_name, "Methylphenidate");
        assert_eq!(ingestion.time, at(8, 5));
        assert_eq!(ingestion.dose, Some(10.0));
        assert_eq!(ingestion.notes, "with breakfast");
        assert_eq!(*notifier.cancelled.lock().unwrap(), vec![notification_id(3)]);
    }

    #[test]
    fn test_taken_failure_is_reported_not_raised() {
        let db = Database::open_in_memory().unwrap();
        let alarms = RecordingAlarms::default();
        let notifier = RecordingNotifier::default();
        let scheduler = ReminderScheduler::new(&alarms, &notifier);
        let mut payload = ReminderPayload::from(&sample_reminder(true));
        payload.substance_name = "   ".to_string();

        let outcome = scheduler.handle_action(&db, NotificationAction::Taken, &payload, &at(8, 5));
        assert_eq!(outcome, ActionOutcome::Failed);
        assert!(db.list_experiences().unwrap().is_empty());
        assert!(notifier.cancelled.lock().unwrap().is_empty());
    }

    #[test]
    fn test_skip_only_dismisses() {
        let db = Database::open_in_memory().unwrap();
        let alarms = RecordingAlarms::default();
        let notifier = RecordingNotifier::default();
        let scheduler = ReminderScheduler::new(&alarms, &notifier);
        let payload = ReminderPayload::from(&sample_reminder(true));

        let outcome = scheduler.handle_action(&db, NotificationAction::Skip, &payload, &at(8, 5));
        assert_eq!(outcome, ActionOutcome::Skipped);
        assert!(db.list_experiences().unwrap().is_empty());
        assert!(alarms.pending.lock().unwrap().is_empty());
        assert_eq!(*notifier.cancelled.lock().unwrap(), vec![notification_id(3)]);
    }

    #[test]
    fn test_payload_roundtrips_through_json() {
        let payload = ReminderPayload::from(&sample_reminder(true));
        let json = serde_json::to_string(&payload).unwrap();
        let back: ReminderPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_action_parse() {
        assert_eq!("Taken".parse::<NotificationAction>().unwrap(), NotificationAction::Taken);
        assert_eq!(" snooze".parse::<NotificationAction>().unwrap(), NotificationAction::Snooze);
        assert!("later".parse::<NotificationAction>().is_err());
    }
}
