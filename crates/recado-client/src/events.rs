use serde::Serialize;
use tokio::sync::broadcast;

use recado_shared::UserId;

/// Notifications for whatever renders the messenger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessengerEvent {
    /// The displayed list of the open conversation changed.
    ConversationUpdated { peer: UserId, count: usize },
    UnreadChanged { peer: UserId, count: u32, total: u32 },
    PresenceChanged { online: usize },
    /// The store refused a write. Shown to the user once.
    WriteRejected { reason: String },
    NoticesChanged { unread: usize },
    /// Inbound messages were skipped; unread counts may be short.
    InboxLagged { skipped: u64 },
}

impl MessengerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MessengerEvent::ConversationUpdated { .. } => "conversation-updated",
            MessengerEvent::UnreadChanged { .. } => "unread-changed",
            MessengerEvent::PresenceChanged { .. } => "presence-changed",
            MessengerEvent::WriteRejected { .. } => "write-rejected",
            MessengerEvent::NoticesChanged { .. } => "notices-changed",
            MessengerEvent::InboxLagged { .. } => "inbox-lagged",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<MessengerEvent>,
}

impl EventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MessengerEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: MessengerEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            tracing::trace!(event = name, "No event listeners");
        }
    }
}
