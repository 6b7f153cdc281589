//! Event dispatch to observers and the notification feed.
//!
//! # Deadlock Prevention
//!
//! Observers are collected under the registry lock, then the lock is released
//! before invoking any of them. An observer may therefore register or remove
//! observers, or read the feed, from inside its callback.
//!
//! # Panicking Observers
//!
//! Each callback runs under `catch_unwind`. A panic is logged and the
//! remaining observers still run, so one faulty consumer cannot take down
//! the connection task that dispatches into it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::events::Event;
use crate::notifications::{Notification, NotificationFeed};

/// Callback invoked for every parsed event, lifecycle events included.
pub type EventObserver = Arc<dyn Fn(&Event) + Send + Sync>;

/// Callback invoked with each notification after it enters the feed.
pub type NotificationListener = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Handle returned by [`EventDispatcher::on_event`] for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Routes events to observers and maintains the notification feed.
pub struct EventDispatcher {
    observers: Mutex<Vec<(ObserverId, EventObserver)>>,
    listeners: Mutex<Vec<(ObserverId, NotificationListener)>>,
    next_id: AtomicU64,
    feed: NotificationFeed,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("observers", &self.lock_observers().len())
            .field("listeners", &self.lock_listeners().len())
            .field("feed", &self.feed.len())
            .finish()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::with_feed(NotificationFeed::new())
    }
}

impl EventDispatcher {
    /// Dispatcher with an empty default-capacity feed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher writing into `feed`.
    #[must_use]
    pub fn with_feed(feed: NotificationFeed) -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            feed,
        }
    }

    fn lock_observers(&self) -> MutexGuard<'_, Vec<(ObserverId, EventObserver)>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<(ObserverId, NotificationListener)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_observer_id(&self) -> ObserverId {
        ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register an observer. Observers run in registration order.
    ///
    /// A panic inside `observer` is caught and logged; later observers and
    /// the feed update still run.
    pub fn on_event<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.add_observer(Arc::new(observer))
    }

    /// Register an already shared observer.
    pub fn add_observer(&self, observer: EventObserver) -> ObserverId {
        let id = self.next_observer_id();
        self.lock_observers().push((id, observer));
        id
    }

    /// Register a listener for notifications added to the feed.
    ///
    /// The listener receives the same entry the feed holds, after it was
    /// inserted. Lifecycle events never reach it.
    pub fn on_notification<F>(&self, listener: F) -> ObserverId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.add_notification_listener(Arc::new(listener))
    }

    /// Register an already shared notification listener.
    pub fn add_notification_listener(&self, listener: NotificationListener) -> ObserverId {
        let id = self.next_observer_id();
        self.lock_listeners().push((id, listener));
        id
    }

    /// Unregister an observer or notification listener. Returns whether it
    /// was registered.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let removed_observer = {
            let mut observers = self.lock_observers();
            let before = observers.len();
            observers.retain(|(existing, _)| *existing != id);
            observers.len() != before
        };
        let removed_listener = {
            let mut listeners = self.lock_listeners();
            let before = listeners.len();
            listeners.retain(|(existing, _)| *existing != id);
            listeners.len() != before
        };
        removed_observer || removed_listener
    }

    /// Deliver `event` to every observer and, unless it is a lifecycle
    /// event, prepend a rendered notification to the feed.
    ///
    /// Returns the notification that was added, if any.
    pub fn dispatch(&self, event: &Event) -> Option<Notification> {
        let observers: Vec<EventObserver> = self
            .lock_observers()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in &observers {
            if panic::catch_unwind(AssertUnwindSafe(|| observer(event))).is_err() {
                log::error!("[Realtime] Observer panicked handling {}", event.kind());
            }
        }

        if event.kind().is_lifecycle() {
            log::debug!("[Realtime] Lifecycle event {} kept out of feed", event.kind());
            return None;
        }

        let notification = Notification::from_event(event);
        self.feed.push(notification.clone());

        let listeners: Vec<NotificationListener> = self
            .lock_listeners()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in &listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(&notification))).is_err() {
                log::error!("[Realtime] Notification listener panicked");
            }
        }

        Some(notification)
    }

    /// The notification feed.
    #[must_use]
    pub fn feed(&self) -> &NotificationFeed {
        &self.feed
    }

    /// Snapshot of the feed, newest first.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.feed.list()
    }

    /// Remove one notification by id; no-op if absent.
    pub fn dismiss_notification(&self, id: &str) -> bool {
        self.feed.dismiss(id)
    }

    /// Remove all notifications.
    pub fn clear_notifications(&self) {
        self.feed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn event(kind: &str, data: serde_json::Value) -> Event {
        Event::new(
            EventKind::from(kind),
            data,
            Some("2024-01-01T00:00:00Z".to_string()),
        )
    }

    #[test]
    fn test_dispatch_adds_one_notification_to_front() {
        let dispatcher = EventDispatcher::new();
        dispatcher.dispatch(&event("job_created", json!({"title": "First"})));
        let added = dispatcher
            .dispatch(&event("job_created", json!({"title": "Backend Engineer"})))
            .expect("notification added");

        let list = dispatcher.notifications();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, added.id);
        assert!(list[0].message.contains("Backend Engineer"));
    }

    #[test]
    fn test_lifecycle_event_reaches_observer_but_not_feed() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        dispatcher.on_event(move |e| {
            seen_clone
                .lock()
                .expect("observer log")
                .push(e.kind().clone());
        });

        let added = dispatcher.dispatch(&event(
            "connection_established",
            json!({"message": "Connected"}),
        ));

        assert!(added.is_none());
        assert!(dispatcher.feed().is_empty());
        assert_eq!(
            *seen.lock().expect("observer log"),
            vec![EventKind::ConnectionEstablished]
        );
    }

    #[test]
    fn test_observers_run_in_registration_order() {
        let dispatcher = EventDispatcher::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let order = Arc::clone(&order);
            dispatcher.on_event(move |_| order.lock().expect("order").push(tag));
        }

        dispatcher.dispatch(&event("job_deleted", json!({})));
        assert_eq!(*order.lock().expect("order"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_remove_observer() {
        let dispatcher = EventDispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let id = dispatcher.on_event(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.dispatch(&event("job_deleted", json!({})));
        assert!(dispatcher.remove_observer(id));
        assert!(!dispatcher.remove_observer(id));
        dispatcher.dispatch(&event("job_deleted", json!({})));

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_observer_may_reenter_dispatcher() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let inner = Arc::clone(&dispatcher);
        dispatcher.on_event(move |_| {
            // Registering from inside a callback must not deadlock
            inner.on_event(|_| {});
            let _ = inner.notifications();
        });

        dispatcher.dispatch(&event("report_generated", json!({})));
        assert_eq!(dispatcher.lock_observers().len(), 2);
        // Break the Arc cycle held by the observer
        dispatcher.lock_observers().clear();
    }

    #[test]
    fn test_eleven_events_keep_ten_newest() {
        let dispatcher = EventDispatcher::new();
        let mut ids = Vec::new();
        for i in 1..=11 {
            let n = dispatcher
                .dispatch(&event("job_created", json!({"title": format!("Job {i}")})))
                .expect("notification");
            ids.push(n.id);
        }

        let list = dispatcher.notifications();
        assert_eq!(list.len(), 10);
        assert_eq!(list[0].id, ids[10]);
        assert!(!list.iter().any(|n| n.id == ids[0]));
    }

    #[test]
    fn test_dismiss_and_clear() {
        let dispatcher = EventDispatcher::new();
        let a = dispatcher
            .dispatch(&event("job_created", json!({"title": "A"})))
            .expect("a");
        dispatcher.dispatch(&event("job_created", json!({"title": "B"})));

        let before = dispatcher.notifications();
        assert!(!dispatcher.dismiss_notification("missing"));
        assert_eq!(dispatcher.notifications(), before);

        assert!(dispatcher.dismiss_notification(&a.id));
        assert_eq!(dispatcher.notifications().len(), 1);

        dispatcher.clear_notifications();
        assert!(dispatcher.notifications().is_empty());
    }

    #[test]
    fn test_panicking_observer_does_not_stop_dispatch() {
        let dispatcher = EventDispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));
        dispatcher.on_event(|_| panic!("observer failure"));
        let count_clone = Arc::clone(&count);
        dispatcher.on_event(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        let added = dispatcher.dispatch(&event("job_created", json!({"title": "After panic"})));
        assert!(added.is_some());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.notifications().len(), 1);

        // Still usable afterwards
        dispatcher.dispatch(&event("job_deleted", json!({})));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_notification_listener_sees_feed_entry() {
        let dispatcher = EventDispatcher::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = Arc::clone(&received);
        let id = dispatcher.on_notification(move |n: &Notification| {
            received_clone.lock().expect("received").push(n.clone());
        });

        dispatcher.dispatch(&event("connection_established", json!({})));
        dispatcher.dispatch(&event("job_created", json!({"title": "Backend Engineer"})));

        let received_list = received.lock().expect("received").clone();
        assert_eq!(received_list.len(), 1);
        assert_eq!(dispatcher.feed().latest(), Some(received_list[0].clone()));

        assert!(dispatcher.remove_observer(id));
        dispatcher.dispatch(&event("job_created", json!({"title": "Second"})));
        assert_eq!(received.lock().expect("received").len(), 1);
    }
}
