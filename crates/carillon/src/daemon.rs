//! Daemon wiring and event loop.
//!
//! Builds the full delivery pipeline (store, wake scheduler, presenter,
//! delivery handler, handoff queue, keep-alive service), runs the boot
//! recovery pass, then drives a single event loop until shutdown. Wake
//! fires arrive on the scheduler's channel; dismissals, alert taps and
//! consumer connections arrive on the daemon event channel.

use std::path::PathBuf;
use std::sync::Arc;

use miette::Result;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use carillon_scheduler::{TimerCapabilities, WakeFire, WakeScheduler};
use carillon_store::ReminderStore;

use crate::delivery::{DeliveryHandler, ReminderEvent};
use crate::escalate::{Annunciator, EscalationSession, SilentSideChannels, SpeechEngine};
use crate::handoff::{HandoffQueue, LoggingConsumer};
use crate::notify::{NotificationShade, Presenter, ShadeModel};
use crate::recovery;
use crate::service::KeepAliveService;

/// Capacity of the wake fire and daemon event channels.
const EVENT_QUEUE: usize = 64;

/// Configuration for the daemon.
pub struct DaemonConfig {
    /// Path of the durable reminder store.
    pub store_path: PathBuf,
    /// Whether exact wake scheduling is permitted on this host.
    pub exact_alarms: bool,
    /// Whether exact wakes may bypass host idle/doze modes.
    pub idle_bypass: bool,
    /// Whether to hold the keep-alive presence while running.
    pub keep_alive: bool,
}

/// Events injected into the loop from outside the wake path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonEvent {
    /// A delivery event (fire replay or dismissal).
    Reminder(ReminderEvent),
    /// The user tapped an alert surface; escalate with its payload.
    AlertTapped { payload: Option<String> },
    /// The consumer connected; flush queued handoffs.
    ConsumerConnected,
}

/// Run the daemon until a shutdown signal arrives.
pub async fn run_with_config(config: DaemonConfig) -> Result<()> {
    info!(store_path = %config.store_path.display(), "starting carillon daemon");

    let store = Arc::new(ReminderStore::open(&config.store_path));
    let (fire_tx, fire_rx) = mpsc::channel::<WakeFire>(EVENT_QUEUE);
    let capabilities = TimerCapabilities {
        exact_permitted: config.exact_alarms,
        idle_bypass: config.idle_bypass,
    };
    if !capabilities.can_schedule_exact() {
        warn!("exact wakes not permitted, reminders may fire with a delivery window");
    }
    let scheduler = Arc::new(WakeScheduler::new(fire_tx, capabilities));

    let shade: Arc<dyn NotificationShade> = Arc::new(ShadeModel::new());
    let presenter = Presenter::new(Arc::clone(&shade));
    let delivery = Arc::new(DeliveryHandler::new(
        Arc::clone(&store),
        Arc::clone(&scheduler),
        presenter,
    ));
    let handoff = Arc::new(HandoffQueue::new(Arc::new(LoggingConsumer)));
    let keep_alive = KeepAliveService::new(Arc::clone(&shade));

    let rearmed = recovery::run(&store, &scheduler);
    info!(rearmed, "boot recovery complete");

    if config.keep_alive {
        keep_alive.start();
    }

    // Shutdown channel, flipped by ctrl-c.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        let _ = shutdown_tx_clone.send(true);
    });

    // The headless daemon has no external event source yet; the sender
    // is held so the loop never observes a closed channel.
    let (_event_tx, event_rx) = mpsc::channel::<DaemonEvent>(EVENT_QUEUE);

    let side_channels = Arc::new(SilentSideChannels);
    event_loop(
        shutdown_rx,
        fire_rx,
        event_rx,
        Arc::clone(&delivery),
        Arc::clone(&store),
        Arc::clone(&handoff),
        Arc::clone(&side_channels) as Arc<dyn Annunciator>,
        side_channels as Arc<dyn SpeechEngine>,
    )
    .await;

    keep_alive.stop();
    info!("daemon shut down gracefully");
    Ok(())
}

/// Drive the delivery pipeline until shutdown.
///
/// A wake fire posts both notification surfaces and, since the alert
/// carries a full-screen directive and this host has no interactive
/// shade, launches the escalation session immediately. Alert taps
/// injected as daemon events launch further sessions the same way.
#[allow(clippy::too_many_arguments)]
async fn event_loop(
    mut shutdown_rx: watch::Receiver<bool>,
    mut fire_rx: mpsc::Receiver<WakeFire>,
    mut event_rx: mpsc::Receiver<DaemonEvent>,
    delivery: Arc<DeliveryHandler>,
    store: Arc<ReminderStore>,
    handoff: Arc<HandoffQueue>,
    annunciator: Arc<dyn Annunciator>,
    speech: Arc<dyn SpeechEngine>,
) {
    let escalate = |payload: Option<String>| {
        let session = EscalationSession::new(
            Arc::clone(&store),
            Arc::clone(&handoff),
            Arc::clone(&annunciator),
            Arc::clone(&speech),
        );
        tokio::spawn(session.run(payload));
    };

    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            fire = fire_rx.recv() => {
                let Some(WakeFire { id, payload, .. }) = fire else {
                    // Scheduler gone; nothing left to deliver.
                    break;
                };
                delivery.on_fire(id, payload.clone());
                escalate(payload);
            }

            event = event_rx.recv() => {
                let Some(event) = event else {
                    break;
                };
                match event {
                    DaemonEvent::Reminder(reminder) => delivery.dispatch(reminder),
                    DaemonEvent::AlertTapped { payload } => escalate(payload),
                    DaemonEvent::ConsumerConnected => handoff.flush().await,
                }
            }
        }
    }
}
