//! Wake scheduler implementation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{SchedulerError, TimerCapabilities, TimerPrimitive};

/// A wake callback firing. Carries the payload attached at registration
/// so the delivery handler needs no store lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeFire {
    pub id: i64,
    pub fire_at: DateTime<Utc>,
    pub payload: Option<String>,
}

/// A live registration for one reminder id.
struct RegisteredWake {
    fire_at: DateTime<Utc>,
    task: JoinHandle<()>,
}

/// Registers and cancels exact-time one-shot wakes keyed by reminder
/// id. Registrations do not survive a process restart; the record
/// store plus the recovery pass are the durability backstop.
pub struct WakeScheduler {
    registrations: Arc<DashMap<i64, RegisteredWake>>,
    fire_tx: mpsc::Sender<WakeFire>,
    capabilities: TimerCapabilities,
}

impl WakeScheduler {
    /// Create a scheduler that delivers fires on the given channel.
    pub fn new(fire_tx: mpsc::Sender<WakeFire>, capabilities: TimerCapabilities) -> Self {
        Self {
            registrations: Arc::new(DashMap::new()),
            fire_tx,
            capabilities,
        }
    }

    /// The capability table this scheduler negotiates against.
    pub fn capabilities(&self) -> TimerCapabilities {
        self.capabilities
    }

    /// Register a one-shot wake for `id` at `fire_at`, replacing any
    /// existing registration for that id. Returns the primitive that
    /// was selected.
    ///
    /// A fire time already in the past fires immediately.
    pub fn schedule_exact(
        &self,
        id: i64,
        fire_at: DateTime<Utc>,
        payload: Option<String>,
    ) -> Result<TimerPrimitive, SchedulerError> {
        if self.fire_tx.is_closed() {
            return Err(SchedulerError::ShuttingDown(id));
        }

        let primitive = self.capabilities.best_primitive();
        if primitive == TimerPrimitive::Windowed {
            warn!(id, "exact wake not permitted, scheduling best-effort windowed wake");
        }

        let delay = (fire_at - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
            + primitive.deferral_slack();

        let fire_tx = self.fire_tx.clone();
        let registrations = Arc::clone(&self.registrations);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Deregister before sending so a re-schedule arriving after
            // the fire starts a fresh registration.
            registrations.remove(&id);
            let fire = WakeFire {
                id,
                fire_at,
                payload,
            };
            if fire_tx.send(fire).await.is_err() {
                warn!(id, "wake fired but delivery side is gone");
            }
        });

        // Same id replaces, never duplicates.
        if let Some(previous) = self
            .registrations
            .insert(id, RegisteredWake { fire_at, task })
        {
            previous.task.abort();
            debug!(id, "replaced existing wake registration");
        }

        info!(id, %fire_at, ?primitive, "registered wake");
        Ok(primitive)
    }

    /// Cancel the registration for `id`. A no-op if none exists.
    pub fn cancel(&self, id: i64) {
        if let Some((_, registration)) = self.registrations.remove(&id) {
            registration.task.abort();
            info!(id, "cancelled wake registration");
        }
    }

    /// Whether a registration currently exists for `id`.
    pub fn is_registered(&self, id: i64) -> bool {
        self.registrations.contains_key(&id)
    }

    /// The fire time registered for `id`, if any.
    pub fn registered_fire_at(&self, id: i64) -> Option<DateTime<Utc>> {
        self.registrations.get(&id).map(|r| r.fire_at)
    }

    /// Number of live registrations.
    pub fn pending_count(&self) -> usize {
        self.registrations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn scheduler() -> (WakeScheduler, mpsc::Receiver<WakeFire>) {
        let (tx, rx) = mpsc::channel(16);
        (WakeScheduler::new(tx, TimerCapabilities::unrestricted()), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn wake_fires_with_payload() {
        let (sched, mut rx) = scheduler();
        let at = Utc::now() + Duration::seconds(30);

        sched.schedule_exact(5, at, Some("hello".into())).unwrap();
        assert!(sched.is_registered(5));

        let fire = rx.recv().await.unwrap();
        assert_eq!(fire.id, 5);
        assert_eq!(fire.payload.as_deref(), Some("hello"));
        assert!(!sched.is_registered(5));
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_replaces_registration() {
        let (sched, mut rx) = scheduler();
        let now = Utc::now();

        sched
            .schedule_exact(5, now + Duration::hours(1), Some("first".into()))
            .unwrap();
        sched
            .schedule_exact(5, now + Duration::seconds(10), Some("second".into()))
            .unwrap();
        assert_eq!(sched.pending_count(), 1);

        let fire = rx.recv().await.unwrap();
        assert_eq!(fire.payload.as_deref(), Some("second"));

        // The replaced registration must never fire.
        tokio::time::sleep(std::time::Duration::from_secs(7200)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_fire() {
        let (sched, mut rx) = scheduler();

        sched
            .schedule_exact(3, Utc::now() + Duration::seconds(5), None)
            .unwrap();
        sched.cancel(3);
        assert!(!sched.is_registered(3));

        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_unknown_id_is_noop() {
        let (sched, _rx) = scheduler();
        sched.cancel(42);
        assert_eq!(sched.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn past_fire_time_fires_immediately() {
        let (sched, mut rx) = scheduler();

        sched
            .schedule_exact(1, Utc::now() - Duration::minutes(5), None)
            .unwrap();

        let fire = rx.recv().await.unwrap();
        assert_eq!(fire.id, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_ids_fire_independently() {
        let (sched, mut rx) = scheduler();
        let at = Utc::now() + Duration::seconds(10);

        sched.schedule_exact(1, at, Some("one".into())).unwrap();
        sched.schedule_exact(2, at, Some("two".into())).unwrap();
        assert_eq!(sched.pending_count(), 2);

        let mut ids = vec![rx.recv().await.unwrap().id, rx.recv().await.unwrap().id];
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_channel_is_typed_error() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sched = WakeScheduler::new(tx, TimerCapabilities::unrestricted());

        let err = sched
            .schedule_exact(9, Utc::now() + Duration::seconds(1), None)
            .unwrap_err();
        assert!(matches!(err, SchedulerError::ShuttingDown(9)));
    }

    #[tokio::test(start_paused = true)]
    async fn windowed_fallback_still_fires() {
        let (tx, mut rx) = mpsc::channel(1);
        let caps = TimerCapabilities {
            exact_permitted: false,
            idle_bypass: false,
        };
        let sched = WakeScheduler::new(tx, caps);

        let primitive = sched
            .schedule_exact(7, Utc::now() + Duration::seconds(1), None)
            .unwrap();
        assert_eq!(primitive, TimerPrimitive::Windowed);

        let fire = rx.recv().await.unwrap();
        assert_eq!(fire.id, 7);
    }
}
