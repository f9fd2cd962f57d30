//! Change notification for the journal tables.
//!
//! Listeners register a callback and get told which table changed after each committed
//! mutation; they re-query whatever they display.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Experiences,
    Ingestions,
    CustomSubstances,
    CustomUnits,
    CustomRecipes,
    TimedNotes,
    Reminders,
    Companions,
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Experiences => "experiences",
            Self::Ingestions => "ingestions",
            Self::CustomSubstances => "custom_substances",
            Self::CustomUnits => "custom_units",
            Self::CustomRecipes => "custom_recipes",
            Self::TimedNotes => "timed_notes",
            Self::Reminders => "ingestion_reminders",
            Self::Companions => "substance_companions",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(Table) + Send + Sync>;

#[derive(Default)]
pub struct ChangeNotifier {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}

impl ChangeNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(Table) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(listener)));
        id
    }

    /// Returns false if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(sub, _)| *sub != id);
        listeners.len() != before
    }

    /// Call every listener with `table`. Listeners are snapshotted first so a callback may
    /// subscribe or unsubscribe without deadlocking.
    pub fn notify(&self, table: Table) {
        let snapshot: Vec<Listener> = self.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
        tracing::trace!(%table, listeners = snapshot.len(), "table changed");
        for listener in snapshot {
            listener(table);
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, Listener)>> {
        // A panicking listener can't leave the list half-updated, so poison is ignored.
        self.listeners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_receives_table() {
        let notifier = ChangeNotifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        notifier.subscribe(move |t| sink.lock().unwrap().push(t));

        notifier.notify(Table::Experiences);
        notifier.notify(Table::Ingestions);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Table::Experiences, Table::Ingestions]
        );
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let notifier = ChangeNotifier::new();
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        let id = notifier.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        notifier.notify(Table::Reminders);
        assert!(notifier.unsubscribe(id));
        notifier.notify(Table::Reminders);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!notifier.unsubscribe(id));
        assert_eq!(notifier.listener_count(), 0);
    }

    #[test]
    fn test_subscription_ids_unique() {
        let notifier = ChangeNotifier::new();
        let a = notifier.subscribe(|_| {});
        let b = notifier.subscribe(|_| {});
        assert_ne!(a, b);
        assert_eq!(notifier.listener_count(), 2);
    }

    #[test]
    fn test_table_display() {
        assert_eq!(Table::Reminders.to_string(), "ingestion_reminders");
        assert_eq!(Table::CustomUnits.to_string(), "custom_units");
    }
}
