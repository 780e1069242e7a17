//! Notification presentation.
//!
//! Each delivered reminder gets two notification surfaces:
//! - An alert with a time-salted identity, highest importance, carrying
//!   a full-screen escalation directive. Used once per fire.
//! - A sticky entry with the deterministic identity `STICKY_BASE + id`,
//!   so re-posting updates instead of duplicating. Some shades
//!   auto-clear the alert surface; the sticky entry is the visibility
//!   backstop and carries the dismiss action.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, warn};

/// Base for time-salted alert identities.
pub const ALERT_BASE: i64 = 1001;

/// Base for deterministic sticky identities.
pub const STICKY_BASE: i64 = 2000;

/// Channel id for reminder notifications.
pub const REMINDER_CHANNEL: &str = "carillon_reminders";

/// A notification post rejected by the shade. There is no retry; a
/// failed post for a given fire is lost, mitigated by the other
/// surface's independent post attempt.
#[derive(Debug, Error)]
#[error("notification post rejected: {0}")]
pub struct ShadeError(pub String);

/// Notification importance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Importance {
    Low,
    High,
}

/// A notification channel/category definition. Safe to re-register on
/// every post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub id: String,
    pub name: String,
    pub importance: Importance,
    /// Off/on millisecond pattern, empty to disable vibration.
    pub vibration_pattern: Vec<u64>,
}

/// What tapping a notification does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapAction {
    /// Open the full-screen escalation surface with the payload.
    OpenEscalation { payload: Option<String> },
    /// Open the consumer application directly with the payload.
    OpenConsumer { payload: Option<String> },
}

/// A notification as handed to the shade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel: String,
    pub title: String,
    pub body: String,
    /// Launch the escalation surface immediately where supported.
    pub full_screen: bool,
    /// Keep visible until explicitly dismissed or tapped.
    pub ongoing: bool,
    pub tap: Option<TapAction>,
    /// Dismiss action wired to the delivery handler, tagged with the
    /// reminder id.
    pub dismiss_id: Option<i64>,
}

/// The OS notification service boundary.
pub trait NotificationShade: Send + Sync {
    /// Idempotent channel registration.
    fn ensure_channel(&self, spec: &ChannelSpec);
    /// Post or update the notification with the given identity.
    fn post(&self, identity: i64, notification: Notification) -> Result<(), ShadeError>;
    /// Remove the notification with the given identity, if present.
    fn cancel(&self, identity: i64);
}

/// Builds and posts the two reminder surfaces.
#[derive(Clone)]
pub struct Presenter {
    shade: Arc<dyn NotificationShade>,
    /// Sequence mixed into alert identities so concurrent fires within
    /// the same millisecond still get distinct surfaces.
    alert_seq: Arc<AtomicI64>,
}

impl Presenter {
    pub fn new(shade: Arc<dyn NotificationShade>) -> Self {
        Self {
            shade,
            alert_seq: Arc::new(AtomicI64::new(0)),
        }
    }

    fn reminder_channel() -> ChannelSpec {
        ChannelSpec {
            id: REMINDER_CHANNEL.to_string(),
            name: "Task Reminders".to_string(),
            importance: Importance::High,
            vibration_pattern: vec![0, 300, 200, 300],
        }
    }

    /// Post the alerting surface. Returns the identity it was posted
    /// under. Identities are time-salted so simultaneously-firing
    /// reminders each get their own alert.
    pub fn post_alert(&self, title: &str, body: &str, payload: Option<&str>) -> i64 {
        self.shade.ensure_channel(&Self::reminder_channel());
        let salt = Utc::now().timestamp_millis() % 1000;
        let seq = self.alert_seq.fetch_add(1, Ordering::Relaxed);
        // Stays strictly below STICKY_BASE so the two surfaces never
        // share an identity.
        let identity = ALERT_BASE + (salt + seq) % 999;
        let notification = Notification {
            channel: REMINDER_CHANNEL.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            full_screen: true,
            ongoing: false,
            tap: Some(TapAction::OpenEscalation {
                payload: payload.map(str::to_string),
            }),
            dismiss_id: None,
        };
        if let Err(e) = self.shade.post(identity, notification) {
            warn!(identity, error = %e, "alert notification post failed");
        } else {
            debug!(identity, "posted alert notification");
        }
        identity
    }

    /// Post or update the sticky surface for `id`. Returns its
    /// deterministic identity.
    pub fn post_sticky(&self, title: &str, body: &str, id: i64, payload: Option<&str>) -> i64 {
        self.shade.ensure_channel(&Self::reminder_channel());
        let identity = STICKY_BASE + id;
        let notification = Notification {
            channel: REMINDER_CHANNEL.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            full_screen: false,
            ongoing: false,
            tap: Some(TapAction::OpenConsumer {
                payload: payload.map(str::to_string),
            }),
            dismiss_id: Some(id),
        };
        if let Err(e) = self.shade.post(identity, notification) {
            warn!(identity, error = %e, "sticky notification post failed");
        } else {
            debug!(identity, "posted sticky notification");
        }
        identity
    }

    /// Cancel the sticky surface for `id`.
    pub fn cancel_sticky(&self, id: i64) {
        self.shade.cancel(STICKY_BASE + id);
    }

    /// Cancel an alert surface by the identity `post_alert` returned.
    pub fn cancel_alert(&self, identity: i64) {
        self.shade.cancel(identity);
    }
}

/// In-process shade model. Tracks registered channels and posted
/// notifications; backs the daemon's default wiring and the tests.
#[derive(Default)]
pub struct ShadeModel {
    channels: Mutex<HashMap<String, ChannelSpec>>,
    posted: Mutex<BTreeMap<i64, Notification>>,
}

impl ShadeModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// The notification currently posted under `identity`, if any.
    pub fn get(&self, identity: i64) -> Option<Notification> {
        self.posted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&identity)
            .cloned()
    }

    /// All posted notifications, by identity.
    pub fn posted(&self) -> Vec<(i64, Notification)> {
        self.posted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }

    /// The channel registered under `id`, if any.
    pub fn channel(&self, id: &str) -> Option<ChannelSpec> {
        self.channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }
}

impl NotificationShade for ShadeModel {
    fn ensure_channel(&self, spec: &ChannelSpec) {
        self.channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(spec.id.clone(), spec.clone());
    }

    fn post(&self, identity: i64, notification: Notification) -> Result<(), ShadeError> {
        self.posted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(identity, notification);
        Ok(())
    }

    fn cancel(&self, identity: i64) {
        self.posted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&identity);
    }
}
