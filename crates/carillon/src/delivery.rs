//! Reminder delivery handling.
//!
//! Invoked when a wake fires or a dismiss action arrives. Per reminder
//! id the state machine is `Scheduled -> Fired -> Delivered`, or
//! `Scheduled -> Dismissed` when the user cancels at or before fire
//! time. Nothing here may let a fault escape the event loop: a panic in
//! a wake callback would take every other pending reminder down with
//! it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use carillon_scheduler::WakeScheduler;
use carillon_store::ReminderStore;

use crate::notify::Presenter;
use crate::payload::ReminderPayload;

/// Inbound delivery event, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderEvent {
    /// A wake fired for `id`, carrying the payload attached at
    /// registration time.
    Fire { id: i64, payload: Option<String> },
    /// The user dismissed the reminder with the given id.
    Dismiss { id: i64 },
}

/// Handles fires and dismissals.
pub struct DeliveryHandler {
    store: Arc<ReminderStore>,
    scheduler: Arc<WakeScheduler>,
    presenter: Presenter,
    /// Alert identities are time-salted, so remember which one was
    /// posted for each reminder id to be able to cancel it on dismiss.
    /// Identities recycle within a small ring, so an entry holding a
    /// newly issued identity is stale and evicted on fire; that also
    /// bounds the map at the size of the identity space.
    posted_alerts: Mutex<HashMap<i64, i64>>,
}

impl DeliveryHandler {
    pub fn new(
        store: Arc<ReminderStore>,
        scheduler: Arc<WakeScheduler>,
        presenter: Presenter,
    ) -> Self {
        Self {
            store,
            scheduler,
            presenter,
            posted_alerts: Mutex::new(HashMap::new()),
        }
    }

    /// Dispatch a tagged event to the matching handler.
    pub fn dispatch(&self, event: ReminderEvent) {
        match event {
            ReminderEvent::Fire { id, payload } => self.on_fire(id, payload),
            ReminderEvent::Dismiss { id } => self.on_dismiss(id),
        }
    }

    /// Handle a wake firing.
    ///
    /// The store record is removed before anything else so a duplicate
    /// fire for the same id finds no record and cannot double-mutate.
    /// The duplicate still notifies from the callback-carried payload:
    /// a duplicate notification beats a silent drop.
    pub fn on_fire(&self, id: i64, payload: Option<String>) {
        info!(id, "reminder fired");

        if let Err(e) = self.store.remove(id) {
            warn!(id, error = %e, "failed removing fired record, continuing delivery");
        }

        let parsed = ReminderPayload::parse(payload.as_deref());

        let alert = self
            .presenter
            .post_alert(parsed.title(), parsed.body(), payload.as_deref());
        {
            let mut posted = self.posted_alerts.lock().unwrap_or_else(|e| e.into_inner());
            // A stale entry holding this recycled identity would cancel
            // the wrong alert on a later dismiss.
            posted.retain(|_, identity| *identity != alert);
            posted.insert(id, alert);
        }

        self.presenter
            .post_sticky(parsed.title(), parsed.body(), id, payload.as_deref());
    }

    /// Handle an explicit dismiss.
    ///
    /// Negative ids are rejected silently. The three cleanup steps are
    /// independently best-effort; one failing does not block the
    /// others.
    pub fn on_dismiss(&self, id: i64) {
        if id < 0 {
            debug!(id, "ignoring dismiss with invalid id");
            return;
        }
        info!(id, "reminder dismissed");

        self.presenter.cancel_sticky(id);
        if let Some(alert) = self
            .posted_alerts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
        {
            self.presenter.cancel_alert(alert);
        }

        self.scheduler.cancel(id);

        if let Err(e) = self.store.remove(id) {
            warn!(id, error = %e, "failed removing dismissed record");
        }
    }

    #[cfg(test)]
    fn tracked_alert_count(&self) -> usize {
        self.posted_alerts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carillon_scheduler::{TimerCapabilities, WakeFire};
    use chrono::{Duration, Utc};
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    use crate::notify::{
        ChannelSpec, Notification, NotificationShade, STICKY_BASE, ShadeError, ShadeModel,
    };

    struct Fixture {
        _dir: TempDir,
        store: Arc<ReminderStore>,
        scheduler: Arc<WakeScheduler>,
        shade: Arc<ShadeModel>,
        handler: DeliveryHandler,
        _fire_rx: mpsc::Receiver<WakeFire>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ReminderStore::open(dir.path().join("reminders.json")));
        let (fire_tx, fire_rx) = mpsc::channel(16);
        let scheduler = Arc::new(WakeScheduler::new(
            fire_tx,
            TimerCapabilities::unrestricted(),
        ));
        let shade = Arc::new(ShadeModel::new());
        let handler = DeliveryHandler::new(
            Arc::clone(&store),
            Arc::clone(&scheduler),
            Presenter::new(shade.clone() as Arc<dyn NotificationShade>),
        );
        Fixture {
            _dir: dir,
            store,
            scheduler,
            shade,
            handler,
            _fire_rx: fire_rx,
        }
    }

    /// Shade that rejects every post.
    struct RejectingShade;

    impl NotificationShade for RejectingShade {
        fn ensure_channel(&self, _spec: &ChannelSpec) {}
        fn post(&self, _identity: i64, _notification: Notification) -> Result<(), ShadeError> {
            Err(ShadeError("shade unavailable".into()))
        }
        fn cancel(&self, _identity: i64) {}
    }

    #[tokio::test]
    async fn fire_removes_record_and_posts_both_surfaces() {
        let f = fixture();
        f.store.put(5, Utc::now(), Some("x".into())).unwrap();

        f.handler.on_fire(
            5,
            Some(r#"{"task_id":"t1","task_title":"Take pills"}"#.into()),
        );

        assert!(f.store.list().is_empty());
        let sticky = f.shade.get(STICKY_BASE + 5).unwrap();
        assert_eq!(sticky.title, "Take pills");
        assert_eq!(sticky.dismiss_id, Some(5));
        // Alert surface posted as well
        assert_eq!(f.shade.posted().len(), 2);
    }

    #[tokio::test]
    async fn fire_removes_record_even_when_posting_fails() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ReminderStore::open(dir.path().join("reminders.json")));
        let (fire_tx, _fire_rx) = mpsc::channel(16);
        let scheduler = Arc::new(WakeScheduler::new(
            fire_tx,
            TimerCapabilities::unrestricted(),
        ));
        let handler = DeliveryHandler::new(
            Arc::clone(&store),
            scheduler,
            Presenter::new(Arc::new(RejectingShade) as Arc<dyn NotificationShade>),
        );
        store.put(7, Utc::now(), None).unwrap();

        handler.on_fire(7, None);

        assert!(store.list().is_empty());
    }

    #[tokio::test]
    async fn duplicate_fire_still_notifies() {
        let f = fixture();
        f.store.put(5, Utc::now(), None).unwrap();

        f.handler.on_fire(5, Some(r#"{"task_title":"Walk"}"#.into()));
        f.shade.cancel(STICKY_BASE + 5);
        // Second fire finds no record but must still notify.
        f.handler.on_fire(5, Some(r#"{"task_title":"Walk"}"#.into()));

        assert!(f.shade.get(STICKY_BASE + 5).is_some());
    }

    #[tokio::test]
    async fn malformed_payload_gets_generic_text() {
        let f = fixture();

        f.handler.on_fire(2, Some("not json".into()));

        let sticky = f.shade.get(STICKY_BASE + 2).unwrap();
        assert_eq!(sticky.title, "Task Reminder");
        assert_eq!(sticky.body, "Tap to view your reminder");
    }

    #[tokio::test]
    async fn dismiss_clears_notifications_timer_and_record() {
        let f = fixture();
        let at = Utc::now() + Duration::hours(1);
        f.store.put(3, at, None).unwrap();
        f.scheduler.schedule_exact(3, at, None).unwrap();
        f.handler.on_fire(3, None);

        f.handler.on_dismiss(3);

        assert!(f.shade.get(STICKY_BASE + 3).is_none());
        assert!(f.shade.posted().is_empty(), "alert surface also cancelled");
        assert!(!f.scheduler.is_registered(3));
        assert!(f.store.list().iter().all(|r| r.id != 3));
    }

    #[tokio::test]
    async fn dismiss_with_negative_id_is_rejected_silently() {
        let f = fixture();
        f.store.put(1, Utc::now(), None).unwrap();

        f.handler.on_dismiss(-1);

        assert_eq!(f.store.list().len(), 1);
    }

    #[tokio::test]
    async fn dismiss_without_prior_fire_is_safe() {
        let f = fixture();
        f.handler.on_dismiss(9);
        assert!(f.store.list().is_empty());
    }

    #[tokio::test]
    async fn alert_tracking_is_bounded_by_the_identity_space() {
        let f = fixture();

        // Far more fires than there are alert identities; undismissed
        // reminders must not grow the tracking map past that space.
        for id in 0..1500 {
            f.handler.on_fire(id, None);
        }

        assert!(f.handler.tracked_alert_count() <= 999);
    }

    #[tokio::test]
    async fn dispatch_routes_by_variant() {
        let f = fixture();
        f.store.put(4, Utc::now(), None).unwrap();

        f.handler.dispatch(ReminderEvent::Fire {
            id: 4,
            payload: None,
        });
        assert!(f.shade.get(STICKY_BASE + 4).is_some());

        f.handler.dispatch(ReminderEvent::Dismiss { id: 4 });
        assert!(f.shade.get(STICKY_BASE + 4).is_none());
    }
}
