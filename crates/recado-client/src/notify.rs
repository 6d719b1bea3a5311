//! Audible cues and blocking urgent alerts.
//!
//! The messenger never renders anything itself. It talks to a [`CuePlayer`]
//! and an [`AlertSurface`], and the [`NotificationDispatcher`] makes sure
//! cue failures go nowhere and alerts are shown one at a time, in arrival
//! order.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use recado_shared::constants::URGENT_ALERT_TITLE;

#[derive(Error, Debug)]
pub enum PlaybackError {
    /// The platform refused to play without a user gesture.
    #[error("Playback blocked by platform policy")]
    Blocked,

    #[error("No audio output available")]
    NoDevice,

    #[error("Playback failed: {0}")]
    Other(String),
}

pub trait CuePlayer: Send + Sync {
    fn play(&self) -> Result<(), PlaybackError>;
}

#[async_trait]
pub trait AlertSurface: Send + Sync {
    /// Show a modal alert. Returns once the user has acknowledged it.
    async fn present(&self, title: &str, body: &str);
}

struct PendingAlert {
    title: String,
    body: String,
    ack: oneshot::Sender<()>,
}

pub struct NotificationDispatcher {
    cue: Arc<dyn CuePlayer>,
    alerts: mpsc::UnboundedSender<PendingAlert>,
}

impl NotificationDispatcher {
    /// Spawns the alert worker, so this must be called inside a tokio
    /// runtime.
    pub fn new(cue: Arc<dyn CuePlayer>, surface: Arc<dyn AlertSurface>) -> Self {
        let (alerts, mut rx) = mpsc::unbounded_channel::<PendingAlert>();

        tokio::spawn(async move {
            while let Some(alert) = rx.recv().await {
                surface.present(&alert.title, &alert.body).await;
                let _ = alert.ack.send(());
            }
            debug!("Alert worker stopped");
        });

        Self { cue, alerts }
    }

    /// Best effort. A refused playback is logged and dropped.
    pub fn play_cue(&self) {
        if let Err(e) = self.cue.play() {
            debug!(error = %e, "Cue playback rejected");
        }
    }

    /// Queue an urgent alert behind any already showing. The receiver fires
    /// once the user acknowledges it.
    pub fn queue_urgent_alert(&self, sender_name: &str, content: &str) -> oneshot::Receiver<()> {
        let (ack, acked) = oneshot::channel();
        let alert = PendingAlert {
            title: URGENT_ALERT_TITLE.to_string(),
            body: urgent_alert_body(sender_name, content),
            ack,
        };
        info!(sender = sender_name, "Raising urgent alert");
        if self.alerts.send(alert).is_err() {
            warn!(sender = sender_name, "Alert worker is gone, urgent alert dropped");
        }
        acked
    }

    /// Raise an urgent alert and wait until it has been acknowledged.
    pub async fn raise_urgent_alert(&self, sender_name: &str, content: &str) {
        if self.queue_urgent_alert(sender_name, content).await.is_err() {
            warn!(sender = sender_name, "Urgent alert was never acknowledged");
        }
    }
}

pub fn urgent_alert_body(sender_name: &str, content: &str) -> String {
    format!("Urgent message from {sender_name}: \"{content}\"")
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Counts cues; fails every play when `blocked`.
    #[derive(Default)]
    pub struct CountingCue {
        pub plays: AtomicUsize,
        pub blocked: bool,
    }

    impl CountingCue {
        pub fn count(&self) -> usize {
            self.plays.load(Ordering::SeqCst)
        }
    }

    impl CuePlayer for CountingCue {
        fn play(&self) -> Result<(), PlaybackError> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            if self.blocked {
                Err(PlaybackError::Blocked)
            } else {
                Ok(())
            }
        }
    }

    /// Records every alert body and acknowledges immediately.
    #[derive(Default)]
    pub struct RecordingSurface {
        pub shown: Mutex<Vec<String>>,
    }

    impl RecordingSurface {
        pub fn bodies(&self) -> Vec<String> {
            self.shown.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AlertSurface for RecordingSurface {
        async fn present(&self, _title: &str, body: &str) {
            self.shown.lock().unwrap().push(body.to_string());
        }
    }
}
