//! Command interface for the consumer application.
//!
//! Synchronous per call. Scheduling upserts both the scheduler (primary
//! path) and the store (durability backstop); a store failure degrades
//! to in-memory scheduling rather than failing the call.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use carillon_scheduler::{SchedulerError, WakeScheduler};
use carillon_store::ReminderStore;

use crate::notify::Presenter;

/// Errors surfaced to the command caller. Never fatal to the core.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The epoch-millis fire time is out of representable range.
    #[error("invalid fire time: {0}")]
    InvalidFireTime(i64),

    /// Scheduler rejected the registration.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Device capability queries and settings surfaces. Implementations
/// live with the host platform; settings deep-links are best-effort.
pub trait DeviceCapabilities: Send + Sync {
    fn notifications_enabled(&self) -> bool;
    fn battery_optimization_exempt(&self) -> bool;
    /// Open the platform's exact-alarm permission surface, if any.
    fn open_exact_alarm_settings(&self);
}

/// Fixed capability answers, for hosts without a settings surface.
#[derive(Debug, Clone, Copy)]
pub struct StaticDevice {
    pub notifications_enabled: bool,
    pub battery_optimization_exempt: bool,
}

impl Default for StaticDevice {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
            battery_optimization_exempt: true,
        }
    }
}

impl DeviceCapabilities for StaticDevice {
    fn notifications_enabled(&self) -> bool {
        self.notifications_enabled
    }

    fn battery_optimization_exempt(&self) -> bool {
        self.battery_optimization_exempt
    }

    fn open_exact_alarm_settings(&self) {
        debug!("no settings surface on this host");
    }
}

/// The boundary the consumer application drives.
pub struct Commands {
    store: Arc<ReminderStore>,
    scheduler: Arc<WakeScheduler>,
    presenter: Presenter,
    device: Arc<dyn DeviceCapabilities>,
}

impl Commands {
    pub fn new(
        store: Arc<ReminderStore>,
        scheduler: Arc<WakeScheduler>,
        presenter: Presenter,
        device: Arc<dyn DeviceCapabilities>,
    ) -> Self {
        Self {
            store,
            scheduler,
            presenter,
            device,
        }
    }

    /// Schedule (or replace) the reminder with the given id.
    pub fn schedule(
        &self,
        id: i64,
        fire_at_millis: i64,
        payload: Option<String>,
    ) -> Result<(), CommandError> {
        let fire_at: DateTime<Utc> = Utc
            .timestamp_millis_opt(fire_at_millis)
            .single()
            .ok_or(CommandError::InvalidFireTime(fire_at_millis))?;

        self.scheduler.schedule_exact(id, fire_at, payload.clone())?;

        // Durability backstop; losing it must not fail the call.
        if let Err(e) = self.store.put(id, fire_at, payload) {
            warn!(id, error = %e, "failed persisting reminder, in-memory wake only");
        }
        Ok(())
    }

    /// Cancel the reminder with the given id: sticky notification,
    /// wake registration, and store record, each best-effort.
    pub fn cancel(&self, id: i64) {
        self.presenter.cancel_sticky(id);
        self.scheduler.cancel(id);
        if let Err(e) = self.store.remove(id) {
            warn!(id, error = %e, "failed removing cancelled record");
        }
    }

    /// Whether exact wake scheduling is currently permitted.
    pub fn query_exact_alarm_permission(&self) -> bool {
        self.scheduler.capabilities().can_schedule_exact()
    }

    /// Request exact-alarm permission. Opens the settings surface when
    /// not yet granted; returns the current state either way.
    pub fn request_exact_alarm_permission(&self) -> bool {
        let permitted = self.query_exact_alarm_permission();
        if !permitted {
            self.device.open_exact_alarm_settings();
        }
        permitted
    }

    pub fn query_notifications_enabled(&self) -> bool {
        self.device.notifications_enabled()
    }

    pub fn query_battery_optimization_exempt(&self) -> bool {
        self.device.battery_optimization_exempt()
    }

    /// Read and clear the last unseen reminder payload.
    pub fn pop_last_unseen_reminder(&self) -> Option<String> {
        self.store.pop_unseen()
    }
}
