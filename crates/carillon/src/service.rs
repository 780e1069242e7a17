//! Keep-alive service supervisor.
//!
//! Keeps the process visible to the host's task killer while reminders
//! are pending. Its whole contract is start, stop, and "is it running";
//! presentation is a single low-importance ongoing notification. The
//! running state is an explicit value behind an accessor, not a shared
//! static.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::notify::{ChannelSpec, Importance, Notification, NotificationShade, TapAction};

/// Identity of the keep-alive notification.
const KEEPALIVE_IDENTITY: i64 = 7042;

/// Channel for the keep-alive notification.
const KEEPALIVE_CHANNEL: &str = "carillon_background_sync";

/// Whether the keep-alive service is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Running,
    Stopped,
}

/// Supervises the keep-alive presence.
pub struct KeepAliveService {
    shade: Arc<dyn NotificationShade>,
    state_tx: watch::Sender<ServiceState>,
}

impl KeepAliveService {
    pub fn new(shade: Arc<dyn NotificationShade>) -> Self {
        let (state_tx, _) = watch::channel(ServiceState::Stopped);
        Self { shade, state_tx }
    }

    fn channel_spec() -> ChannelSpec {
        ChannelSpec {
            id: KEEPALIVE_CHANNEL.to_string(),
            name: "Reminder Background Sync".to_string(),
            importance: Importance::Low,
            vibration_pattern: Vec::new(),
        }
    }

    /// Start the service. Idempotent.
    pub fn start(&self) {
        self.shade.ensure_channel(&Self::channel_spec());
        let notification = Notification {
            channel: KEEPALIVE_CHANNEL.to_string(),
            title: "Carillon reminders active".to_string(),
            body: "Keeping task alerts running in the background.".to_string(),
            full_screen: false,
            ongoing: true,
            tap: Some(TapAction::OpenConsumer { payload: None }),
            dismiss_id: None,
        };
        if let Err(e) = self.shade.post(KEEPALIVE_IDENTITY, notification) {
            warn!(error = %e, "keep-alive notification post failed");
        }
        self.state_tx.send_replace(ServiceState::Running);
        info!("keep-alive service started");
    }

    /// Stop the service. Idempotent.
    pub fn stop(&self) {
        self.shade.cancel(KEEPALIVE_IDENTITY);
        self.state_tx.send_replace(ServiceState::Stopped);
        info!("keep-alive service stopped");
    }

    /// Current state.
    pub fn state(&self) -> ServiceState {
        *self.state_tx.borrow()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ServiceState> {
        self.state_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ShadeModel;

    fn service() -> (KeepAliveService, Arc<ShadeModel>) {
        let shade = Arc::new(ShadeModel::new());
        (
            KeepAliveService::new(shade.clone() as Arc<dyn NotificationShade>),
            shade,
        )
    }

    #[test]
    fn starts_stopped() {
        let (svc, shade) = service();
        assert_eq!(svc.state(), ServiceState::Stopped);
        assert!(shade.get(KEEPALIVE_IDENTITY).is_none());
    }

    #[test]
    fn start_posts_ongoing_notification_and_flips_state() {
        let (svc, shade) = service();

        svc.start();

        assert_eq!(svc.state(), ServiceState::Running);
        let posted = shade.get(KEEPALIVE_IDENTITY).unwrap();
        assert!(posted.ongoing);
        assert_eq!(
            shade.channel(KEEPALIVE_CHANNEL).unwrap().importance,
            Importance::Low
        );
    }

    #[test]
    fn stop_clears_notification_and_state() {
        let (svc, shade) = service();
        svc.start();

        svc.stop();

        assert_eq!(svc.state(), ServiceState::Stopped);
        assert!(shade.get(KEEPALIVE_IDENTITY).is_none());
    }

    #[test]
    fn start_is_idempotent() {
        let (svc, shade) = service();
        svc.start();
        svc.start();

        assert_eq!(svc.state(), ServiceState::Running);
        assert_eq!(
            shade
                .posted()
                .iter()
                .filter(|(id, _)| *id == KEEPALIVE_IDENTITY)
                .count(),
            1
        );
    }

    #[test]
    fn subscribers_see_transitions() {
        let (svc, _shade) = service();
        let rx = svc.subscribe();

        svc.start();
        assert_eq!(*rx.borrow(), ServiceState::Running);
        svc.stop();
        assert_eq!(*rx.borrow(), ServiceState::Stopped);
    }
}
