use anyhow::{Result, bail};
use chrono::{DateTime, Local, NaiveDate, Utc, Weekday};
use std::collections::{HashMap, HashSet};
use std::io::{self, BufRead, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tabled::{Table, Tabled, settings::Style};

use psyjournal_core::models::{
    AdministrationRoute, CustomRepeatPattern, IngestionReminder, NewIngestionReminder,
    parse_time_of_day,
};
use psyjournal_core::reminder::{
    ActionOutcome, AlarmKey, AlarmScheduler, NotificationAction, Notifier, ReminderNotification,
    ReminderPayload, ReminderScheduler, ScheduleOutcome, next_trigger,
};
use psyjournal_core::service::JournalService;

use super::helpers::{exit_not_found, format_dose, format_local, parse_dose, print_json};
use super::substance::{default_units, resolve_substance};

/// Longest the watch loop sleeps before looking for new or edited reminders.
const RESCAN_INTERVAL: Duration = Duration::from_secs(60);

// --- Terminal collaborators ---

type Pending = HashMap<AlarmKey, (DateTime<Utc>, ReminderPayload)>;

/// Alarms held in memory. They only fire while `reminder watch` is running.
#[derive(Default)]
pub(crate) struct PendingAlarms {
    pending: Mutex<Pending>,
}

impl PendingAlarms {
    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_due(&self) -> Option<DateTime<Utc>> {
        self.lock().values().map(|(trigger, _)| *trigger).min()
    }

    /// Remove and return every alarm due at `now`, earliest first.
    fn take_due(&self, now: DateTime<Utc>) -> Vec<(AlarmKey, ReminderPayload)> {
        let mut pending = self.lock();
        let due_keys: Vec<AlarmKey> = pending
            .iter()
            .filter(|(_, (trigger, _))| *trigger <= now)
            .map(|(key, _)| *key)
            .collect();
        let mut due: Vec<(DateTime<Utc>, AlarmKey, ReminderPayload)> = due_keys
            .into_iter()
            .filter_map(|key| pending.remove(&key).map(|(t, p)| (t, key, p)))
            .collect();
        due.sort_by_key(|(t, key, _)| (*t, key.reminder_id()));
        due.into_iter().map(|(_, key, p)| (key, p)).collect()
    }

    fn holds(&self, key: AlarmKey, payload: &ReminderPayload) -> bool {
        self.lock().get(&key).is_some_and(|(_, p)| p == payload)
    }

    fn holds_at(&self, key: AlarmKey, trigger: DateTime<Utc>, payload: &ReminderPayload) -> bool {
        self.lock()
            .get(&key)
            .is_some_and(|(t, p)| *t == trigger && p == payload)
    }

    fn reminder_ids(&self) -> HashSet<i64> {
        self.lock().keys().map(|k| k.reminder_id()).collect()
    }
}

impl AlarmScheduler for PendingAlarms {
    fn can_schedule_exact(&self) -> bool {
        true
    }

    fn schedule_exact(
        &self,
        trigger: DateTime<Utc>,
        key: AlarmKey,
        payload: &ReminderPayload,
    ) -> Result<()> {
        tracing::debug!(%key, %trigger, "alarm set");
        self.lock().insert(key, (trigger, payload.clone()));
        Ok(())
    }

    fn cancel(&self, key: AlarmKey) {
        if self.lock().remove(&key).is_some() {
            tracing::debug!(%key, "alarm cancelled");
        }
    }
}

pub(crate) struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn is_permitted(&self) -> bool {
        true
    }

    fn show(&self, notification: &ReminderNotification) -> Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "\n*** {} ***", notification.title)?;
        writeln!(out, "    {}", notification.body)?;
        let actions: Vec<String> = notification
            .actions
            .iter()
            .map(|a| format!("[{}] {}", action_key(*a), a.label()))
            .collect();
        writeln!(out, "    {}", actions.join("  "))?;
        out.flush()?;
        Ok(())
    }

    fn cancel(&self, notification_id: i64) {
        tracing::debug!(notification_id, "notification dismissed");
    }
}

fn action_key(action: NotificationAction) -> char {
    match action {
        NotificationAction::Taken => 't',
        NotificationAction::Snooze => 's',
        NotificationAction::Skip => 'k',
    }
}

/// Read an answer to a shown notification. An empty line skips.
fn parse_action(input: &str) -> Result<NotificationAction> {
    match input.trim().to_lowercase().as_str() {
        "" | "k" => Ok(NotificationAction::Skip),
        "t" => Ok(NotificationAction::Taken),
        "s" => Ok(NotificationAction::Snooze),
        other => other.parse(),
    }
}

fn read_action() -> Result<NotificationAction> {
    eprint!("Action [t/s/k]: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    parse_action(&line)
}

fn print_outcome(id: i64, outcome: ActionOutcome, json: bool) -> Result<()> {
    if json {
        let value = match outcome {
            ActionOutcome::Taken {
                experience_id,
                ingestion_id,
            } => serde_json::json!({
                "reminder_id": id,
                "outcome": "taken",
                "experience_id": experience_id,
                "ingestion_id": ingestion_id,
            }),
            ActionOutcome::Snoozed { until } => {
                serde_json::json!({ "reminder_id": id, "outcome": "snoozed", "until": until })
            }
            ActionOutcome::Skipped => serde_json::json!({ "reminder_id": id, "outcome": "skipped" }),
            ActionOutcome::Failed => serde_json::json!({ "reminder_id": id, "outcome": "failed" }),
        };
        print_json(&value)?;
        return Ok(());
    }
    match outcome {
        ActionOutcome::Taken {
            experience_id,
            ingestion_id,
        } => println!("Logged ingestion {ingestion_id} in experience {experience_id}"),
        ActionOutcome::Snoozed { until } => println!("Snoozed until {}", format_local(&until)),
        ActionOutcome::Skipped => println!("Skipped"),
        ActionOutcome::Failed => eprintln!("Could not complete the action. See the log for details."),
    }
    Ok(())
}

fn describe_schedule(outcome: ScheduleOutcome) -> String {
    match outcome {
        ScheduleOutcome::Scheduled(at) => format!("next at {}", format_local(&at)),
        ScheduleOutcome::Disabled => "disabled".to_string(),
        ScheduleOutcome::NotPermitted => "not scheduled (no permission)".to_string(),
    }
}

fn describe_repeat(pattern: Option<&CustomRepeatPattern>) -> String {
    let Some(p) = pattern else {
        return "daily".to_string();
    };
    let mut text = if let Some(n) = p.interval_days {
        format!("every {n} days")
    } else if p.days_of_week.is_empty() {
        "daily".to_string()
    } else {
        p.days_of_week
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    };
    if let Some(end) = p.end_date {
        text.push_str(&format!(" until {end}"));
    }
    if let Some(max) = p.max_occurrences {
        text.push_str(&format!(" ({max}x)"));
    }
    text
}

fn repeat_pattern(
    days: &[String],
    every: Option<u32>,
    until: Option<NaiveDate>,
    times: Option<u32>,
) -> Result<Option<CustomRepeatPattern>> {
    if days.is_empty() && every.is_none() && until.is_none() && times.is_none() {
        return Ok(None);
    }
    let days_of_week = days
        .iter()
        .map(|d| {
            d.trim()
                .parse::<Weekday>()
                .map_err(|_| anyhow::anyhow!("Invalid weekday '{d}'. Use mon, tue, ..."))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(CustomRepeatPattern {
        days_of_week,
        interval_days: every,
        end_date: until,
        max_occurrences: times,
    }))
}

// --- Commands ---

/// Everything `psyjournal reminder add` accepts.
pub(crate) struct ReminderOptions {
    pub substance: Option<String>,
    pub time: String,
    pub dose: Option<String>,
    pub route: String,
    pub unit_id: Option<i64>,
    pub title: Option<String>,
    pub sd: Option<f64>,
    pub consumer: Option<String>,
    pub note: Option<String>,
    pub days: Vec<String>,
    pub every: Option<u32>,
    pub until: Option<NaiveDate>,
    pub times: Option<u32>,
    pub disabled: bool,
}

fn build_reminder(
    svc: &JournalService,
    opts: ReminderOptions,
    json: bool,
) -> Result<NewIngestionReminder> {
    let time_of_day = parse_time_of_day(&opts.time)?;
    let custom_repeat_pattern = repeat_pattern(&opts.days, opts.every, opts.until, opts.times)?;
    let mut reminder = NewIngestionReminder {
        title: opts.title.unwrap_or_default(),
        time_of_day,
        is_enabled: !opts.disabled,
        substance_name: String::new(),
        administration_route: AdministrationRoute::Oral,
        dose: None,
        units: String::new(),
        is_estimate: false,
        estimated_dose_standard_deviation: opts.sd,
        custom_unit_id: None,
        consumer_name: opts.consumer,
        note: opts.note.unwrap_or_default(),
        custom_repeat_pattern,
    };

    if let Some(unit_id) = opts.unit_id {
        let Some(unit) = svc.db().get_custom_unit(unit_id)? else {
            exit_not_found(&format!("Unit {unit_id} not found"), json);
        };
        reminder.substance_name = unit.substance_name;
        reminder.administration_route = unit.administration_route;
        reminder.dose = unit.dose;
        reminder.units = unit.original_unit;
        reminder.is_estimate = unit.is_estimate;
        reminder.estimated_dose_standard_deviation =
            opts.sd.or(unit.estimated_dose_standard_deviation);
        reminder.custom_unit_id = Some(unit.id);
        return Ok(reminder);
    }

    let Some(query) = opts.substance.as_deref() else {
        bail!("Name a substance or pass --unit");
    };
    let route: AdministrationRoute = opts.route.parse()?;
    let dose = parse_dose(opts.dose.as_deref().unwrap_or("?"))?;
    let (name, found) = resolve_substance(svc, query, json)?;
    reminder.units = match dose
        .units
        .or_else(|| found.as_ref().and_then(|f| default_units(f, route)))
    {
        Some(u) => u,
        None => bail!("No default units known for '{name}'. Give the dose with units"),
    };
    reminder.substance_name = name;
    reminder.administration_route = route;
    reminder.dose = dose.dose;
    reminder.is_estimate = dose.is_estimate || opts.sd.is_some();
    Ok(reminder)
}

pub(crate) fn cmd_reminder_add(
    svc: &JournalService,
    opts: ReminderOptions,
    json: bool,
) -> Result<()> {
    let new = build_reminder(svc, opts, json)?;
    let alarms = PendingAlarms::default();
    let scheduler = ReminderScheduler::new(&alarms, &TerminalNotifier);
    let (reminder, outcome) = svc.create_reminder(&new, &scheduler, &Local::now())?;

    if json {
        print_json(&reminder)?;
    } else {
        println!(
            "Created reminder {} \"{}\" at {} ({})",
            reminder.id,
            reminder.title,
            reminder.time_of_day.format("%H:%M"),
            describe_schedule(outcome)
        );
        println!("Reminders fire while `psyjournal reminder watch` is running.");
    }
    Ok(())
}

pub(crate) fn cmd_reminder_list(svc: &JournalService, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct ReminderRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Time")]
        time: String,
        #[tabled(rename = "Title")]
        title: String,
        #[tabled(rename = "Planned")]
        planned: String,
        #[tabled(rename = "Repeat")]
        repeat: String,
        #[tabled(rename = "Next")]
        next: String,
    }

    let reminders = svc.db().list_reminders()?;
    if json {
        print_json(&reminders)?;
        return Ok(());
    }
    if reminders.is_empty() {
        eprintln!("No reminders. Use `psyjournal reminder add` to create one.");
        return Ok(());
    }

    let now = Local::now();
    let rows: Vec<ReminderRow> = reminders
        .iter()
        .map(|r| ReminderRow {
            id: r.id,
            time: r.time_of_day.format("%H:%M").to_string(),
            title: r.title.clone(),
            planned: format!(
                "{} {}",
                format_dose(r.dose, &r.units, r.is_estimate),
                r.substance_name
            ),
            repeat: describe_repeat(r.custom_repeat_pattern.as_ref()),
            next: if r.is_enabled {
                next_trigger(r.time_of_day, &now)
                    .format("%a %H:%M")
                    .to_string()
            } else {
                "off".to_string()
            },
        })
        .collect();
    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_reminder_enable(
    svc: &JournalService,
    id: i64,
    enabled: bool,
    json: bool,
) -> Result<()> {
    let alarms = PendingAlarms::default();
    let scheduler = ReminderScheduler::new(&alarms, &TerminalNotifier);
    let Some((reminder, outcome)) =
        svc.set_reminder_enabled(id, enabled, &scheduler, &Local::now())?
    else {
        exit_not_found(&format!("Reminder {id} not found"), json);
    };
    if json {
        print_json(&reminder)?;
    } else {
        println!("Reminder {id} \"{}\": {}", reminder.title, describe_schedule(outcome));
    }
    Ok(())
}

pub(crate) fn cmd_reminder_delete(svc: &JournalService, id: i64, json: bool) -> Result<()> {
    let alarms = PendingAlarms::default();
    let scheduler = ReminderScheduler::new(&alarms, &TerminalNotifier);
    if !svc.delete_reminder(id, &scheduler)? {
        exit_not_found(&format!("Reminder {id} not found"), json);
    }
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted reminder {id}");
    }
    Ok(())
}

/// Apply an action and store a resulting snooze, so whichever `watch` runs next delivers it.
fn apply_action(
    svc: &JournalService,
    scheduler: &ReminderScheduler<'_>,
    action: NotificationAction,
    payload: &ReminderPayload,
) -> Result<ActionOutcome> {
    let outcome = svc.handle_reminder_action(scheduler, action, payload, &Local::now());
    if let ActionOutcome::Snoozed { until } = &outcome {
        svc.db().save_reminder_snooze(until, payload)?;
    }
    Ok(outcome)
}

/// Fire a reminder now, as if its alarm went off.
pub(crate) fn cmd_reminder_fire(
    svc: &JournalService,
    id: i64,
    action: Option<&str>,
    json: bool,
) -> Result<()> {
    let Some(reminder) = svc.db().get_reminder(id)? else {
        exit_not_found(&format!("Reminder {id} not found"), json);
    };
    let action = action.map(parse_action).transpose()?;
    let payload = ReminderPayload::from(&reminder);
    let alarms = PendingAlarms::default();
    let scheduler = ReminderScheduler::new(&alarms, &TerminalNotifier);

    let action = match action {
        Some(a) => a,
        None => {
            TerminalNotifier.show(&ReminderNotification::from(&payload))?;
            read_action()?
        }
    };
    let outcome = apply_action(svc, &scheduler, action, &payload)?;
    print_outcome(id, outcome, json)
}

/// Bring pending alarms in line with the stored reminders: new or edited ones are scheduled,
/// disabled and deleted ones dropped, stored snoozes picked up.
fn resync(
    svc: &JournalService,
    scheduler: &ReminderScheduler<'_>,
    alarms: &PendingAlarms,
) -> Result<()> {
    let reminders: Vec<IngestionReminder> = svc.db().list_reminders()?;
    let now = Local::now();
    let mut known = HashSet::new();
    for r in &reminders {
        known.insert(r.id);
        if !r.is_enabled {
            if alarms.reminder_ids().contains(&r.id) {
                scheduler.cancel(r.id);
            }
            continue;
        }
        if !alarms.holds(AlarmKey::Daily(r.id), &ReminderPayload::from(r)) {
            if let Err(e) = scheduler.schedule(r, &now) {
                tracing::warn!(reminder_id = r.id, error = %e, "failed to schedule reminder");
            }
        }
    }
    for id in alarms.reminder_ids() {
        if !known.contains(&id) {
            scheduler.cancel(id);
        }
    }
    for (until, payload) in svc.db().list_reminder_snoozes()? {
        let key = AlarmKey::Snooze(payload.reminder_id);
        if !alarms.holds_at(key, until, &payload) {
            alarms.schedule_exact(until, key, &payload)?;
        }
    }
    Ok(())
}

pub(crate) async fn cmd_reminder_watch(svc: &JournalService) -> Result<()> {
    let alarms = PendingAlarms::default();
    let notifier = TerminalNotifier;
    let scheduler = ReminderScheduler::new(&alarms, &notifier);

    let scheduled = svc.schedule_all_reminders(&scheduler, &Local::now())?;
    let active = scheduled
        .iter()
        .filter(|(_, o)| matches!(o, ScheduleOutcome::Scheduled(_)))
        .count();
    eprintln!("Watching {active} reminders. Press Ctrl-C to stop.");

    loop {
        for (key, payload) in alarms.take_due(Utc::now()) {
            tracing::info!(%key, "alarm fired");
            if let AlarmKey::Snooze(id) = key {
                svc.db().clear_reminder_snooze(id)?;
            }
            scheduler.handle_alarm(key, &payload, &Local::now());
            let action = tokio::task::spawn_blocking(read_action).await?;
            let action = match action {
                Ok(a) => a,
                Err(e) => {
                    eprintln!("{e:#}");
                    NotificationAction::Skip
                }
            };
            let outcome = apply_action(svc, &scheduler, action, &payload)?;
            print_outcome(payload.reminder_id, outcome, false)?;
        }

        resync(svc, &scheduler, &alarms)?;

        let now = Utc::now();
        let wait = alarms.next_due().map_or(RESCAN_INTERVAL, |due| {
            (due - now).to_std().unwrap_or_default().min(RESCAN_INTERVAL)
        });
        tokio::time::sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};

    fn payload(id: i64) -> ReminderPayload {
        ReminderPayload {
            reminder_id: id,
            title: "Morning".to_string(),
            time_of_day: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            substance_name: "Caffeine".to_string(),
            administration_route: AdministrationRoute::Oral,
            dose: Some(100.0),
            units: "mg".to_string(),
            is_estimate: false,
            estimated_dose_standard_deviation: None,
            custom_unit_id: None,
            consumer_name: None,
            note: String::new(),
        }
    }

    #[test]
    fn test_pending_alarms_take_due_in_order() {
        let alarms = PendingAlarms::default();
        let t0 = Utc.with_ymd_and_hms(2026, 4, 4, 8, 0, 0).unwrap();
        alarms
            .schedule_exact(t0 + chrono::Duration::minutes(5), AlarmKey::Daily(2), &payload(2))
            .unwrap();
        alarms.schedule_exact(t0, AlarmKey::Snooze(1), &payload(1)).unwrap();
        alarms
            .schedule_exact(t0 + chrono::Duration::hours(1), AlarmKey::Daily(3), &payload(3))
            .unwrap();

        assert_eq!(alarms.next_due(), Some(t0));
        let due = alarms.take_due(t0 + chrono::Duration::minutes(10));
        let keys: Vec<AlarmKey> = due.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![AlarmKey::Snooze(1), AlarmKey::Daily(2)]);
        assert_eq!(alarms.next_due(), Some(t0 + chrono::Duration::hours(1)));
    }

    #[test]
    fn test_pending_alarms_replace_and_cancel() {
        let alarms = PendingAlarms::default();
        let t0 = Utc.with_ymd_and_hms(2026, 4, 4, 8, 0, 0).unwrap();
        alarms.schedule_exact(t0, AlarmKey::Daily(1), &payload(1)).unwrap();
        let mut edited = payload(1);
        edited.dose = Some(50.0);
        assert!(alarms.holds(AlarmKey::Daily(1), &payload(1)));
        assert!(!alarms.holds(AlarmKey::Daily(1), &edited));

        alarms.schedule_exact(t0, AlarmKey::Daily(1), &edited).unwrap();
        assert!(alarms.holds(AlarmKey::Daily(1), &edited));
        AlarmScheduler::cancel(&alarms, AlarmKey::Daily(1));
        assert!(alarms.next_due().is_none());
    }

    #[test]
    fn test_parse_action() {
        assert_eq!(parse_action("t\n").unwrap(), NotificationAction::Taken);
        assert_eq!(parse_action("snooze").unwrap(), NotificationAction::Snooze);
        assert_eq!(parse_action("").unwrap(), NotificationAction::Skip);
        assert!(parse_action("later").is_err());
    }

    #[test]
    fn test_describe_repeat() {
        assert_eq!(describe_repeat(None), "daily");
        let weekly = CustomRepeatPattern {
            days_of_week: vec![Weekday::Mon, Weekday::Fri],
            ..CustomRepeatPattern::default()
        };
        assert_eq!(describe_repeat(Some(&weekly)), "Mon,Fri");
        let interval = CustomRepeatPattern {
            interval_days: Some(3),
            max_occurrences: Some(10),
            ..CustomRepeatPattern::default()
        };
        assert_eq!(describe_repeat(Some(&interval)), "every 3 days (10x)");
    }

    #[test]
    fn test_repeat_pattern_parses_weekdays() {
        assert!(repeat_pattern(&[], None, None, None).unwrap().is_none());
        let p = repeat_pattern(&["mon".to_string(), "Thursday".to_string()], None, None, None)
            .unwrap()
            .unwrap();
        assert_eq!(p.days_of_week, vec![Weekday::Mon, Weekday::Thu]);
        assert!(repeat_pattern(&["someday".to_string()], None, None, None).is_err());
    }

    fn morning_reminder() -> NewIngestionReminder {
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

    #[test]
    fn test_resync_follows_stored_reminders() {
        let svc = JournalService::new_in_memory().unwrap();
        let alarms = PendingAlarms::default();
        let scheduler = ReminderScheduler::new(&alarms, &TerminalNotifier);
        let new = morning_reminder();
        let a = svc.db().create_reminder(&new).unwrap();
        let b = svc.db().create_reminder(&new).unwrap();

        resync(&svc, &scheduler, &alarms).unwrap();
        assert_eq!(alarms.reminder_ids(), HashSet::from([a.id, b.id]));

        svc.db().set_reminder_enabled(a.id, false).unwrap();
        svc.db().delete_reminder(b.id).unwrap();
        resync(&svc, &scheduler, &alarms).unwrap();
        assert!(alarms.reminder_ids().is_empty());
    }

    #[test]
    fn test_snooze_outlives_fire_and_reaches_watch() {
        let svc = JournalService::new_in_memory().unwrap();
        let reminder = svc.db().create_reminder(&morning_reminder()).unwrap();
        let payload = ReminderPayload::from(&reminder);

        let until = {
            let fired = PendingAlarms::default();
            let scheduler = ReminderScheduler::new(&fired, &TerminalNotifier);
            match apply_action(&svc, &scheduler, NotificationAction::Snooze, &payload).unwrap() {
                ActionOutcome::Snoozed { until } => until,
                other => panic!("expected a snooze, got {other:?}"),
            }
        };

        let alarms = PendingAlarms::default();
        let scheduler = ReminderScheduler::new(&alarms, &TerminalNotifier);
        svc.schedule_all_reminders(&scheduler, &Local::now()).unwrap();
        resync(&svc, &scheduler, &alarms).unwrap();
        let stored = svc.db().list_reminder_snoozes().unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].0 <= until);
        assert!(alarms.holds_at(AlarmKey::Snooze(reminder.id), stored[0].0, &payload));
        assert!(alarms.holds(AlarmKey::Daily(reminder.id), &payload));

        let due = alarms.take_due(until);
        assert!(due.iter().any(|(k, _)| *k == AlarmKey::Snooze(reminder.id)));
        assert!(svc.db().clear_reminder_snooze(reminder.id).unwrap());
        resync(&svc, &scheduler, &alarms).unwrap();
        assert!(!alarms.holds(AlarmKey::Snooze(reminder.id), &payload));
    }
}
