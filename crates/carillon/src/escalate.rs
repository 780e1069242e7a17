//! Full-screen escalation session.
//!
//! Launched when the user taps the alert surface (or the platform
//! honors its full-screen directive). The session turns the screen on,
//! pulses the vibrator, speaks the reminder title, persists the payload
//! as the cold-start fallback, and hands the payload to the consumer.
//! Every sensory channel is best-effort; only the handoff matters for
//! delivery correctness.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use carillon_store::ReminderStore;

use crate::handoff::HandoffQueue;
use crate::payload::ReminderPayload;

/// Fallback delay after which handoff happens even if speech never
/// completes.
const HANDOFF_FALLBACK: Duration = Duration::from_secs(7);

/// Length of the attention vibration pulse.
const VIBRATION_PULSE: Duration = Duration::from_millis(400);

/// A best-effort side channel failed. Always swallowed.
#[derive(Debug, Error)]
#[error("side channel failed: {0}")]
pub struct SideChannelError(pub String);

/// Screen and vibration side channels.
pub trait Annunciator: Send + Sync {
    /// Turn the screen on and keep it on, even while locked.
    fn wake_screen(&self) -> Result<(), SideChannelError>;
    /// Pulse the vibrator.
    fn vibrate(&self, duration: Duration) -> Result<(), SideChannelError>;
}

/// Text-to-speech side channel. `speak` resolves when the utterance
/// finishes or fails.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    async fn speak(&self, text: &str) -> Result<(), SideChannelError>;
}

/// No-op side channels for hosts without the hardware.
pub struct SilentSideChannels;

impl Annunciator for SilentSideChannels {
    fn wake_screen(&self) -> Result<(), SideChannelError> {
        Ok(())
    }

    fn vibrate(&self, _duration: Duration) -> Result<(), SideChannelError> {
        Ok(())
    }
}

#[async_trait]
impl SpeechEngine for SilentSideChannels {
    async fn speak(&self, _text: &str) -> Result<(), SideChannelError> {
        Ok(())
    }
}

/// What ended the session's waiting phase. Speech completion, speech
/// failure, and the fallback timer race; the first to arrive wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    SpeechDone,
    SpeechFailed,
    TimedOut,
}

/// One escalation per alert tap. `run` consumes the session and
/// performs handoff exactly once.
pub struct EscalationSession {
    store: Arc<ReminderStore>,
    handoff: Arc<HandoffQueue>,
    annunciator: Arc<dyn Annunciator>,
    speech: Arc<dyn SpeechEngine>,
}

impl EscalationSession {
    pub fn new(
        store: Arc<ReminderStore>,
        handoff: Arc<HandoffQueue>,
        annunciator: Arc<dyn Annunciator>,
        speech: Arc<dyn SpeechEngine>,
    ) -> Self {
        Self {
            store,
            handoff,
            annunciator,
            speech,
        }
    }

    pub async fn run(self, payload: Option<String>) {
        info!("escalation session started");

        if let Err(e) = self.annunciator.wake_screen() {
            debug!(error = %e, "screen wake failed");
        }
        if let Err(e) = self.annunciator.vibrate(VIBRATION_PULSE) {
            debug!(error = %e, "vibration failed");
        }

        // Persist the cold-start fallback before anything can race the
        // consumer.
        if let Some(ref p) = payload {
            if let Err(e) = self.store.save_unseen(p) {
                warn!(error = %e, "failed saving last-unseen payload");
            }
        }

        let parsed = ReminderPayload::parse(payload.as_deref());

        // Independent tasks feed a single-consumer completion channel;
        // the first arrival wins, the rest are cancelled.
        let (done_tx, mut done_rx) = mpsc::channel::<Completion>(2);

        let speech = Arc::clone(&self.speech);
        let utterance = parsed.speech_text().to_string();
        let speech_tx = done_tx.clone();
        let speech_task = tokio::spawn(async move {
            let outcome = match speech.speak(&utterance).await {
                Ok(()) => Completion::SpeechDone,
                Err(e) => {
                    debug!(error = %e, "speech failed");
                    Completion::SpeechFailed
                }
            };
            let _ = speech_tx.send(outcome).await;
        });

        let timer_task = tokio::spawn(async move {
            tokio::time::sleep(HANDOFF_FALLBACK).await;
            let _ = done_tx.send(Completion::TimedOut).await;
        });

        if let Some(winner) = done_rx.recv().await {
            debug!(?winner, "escalation wait complete");
        }
        speech_task.abort();
        timer_task.abort();
        done_rx.close();

        if let Some(p) = payload {
            self.handoff.forward_or_queue(p).await;
        }
        info!("escalation session finished");
    }
}
