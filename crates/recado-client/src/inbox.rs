//! Session-wide listener for messages addressed to me.
//!
//! Independent of whichever conversation is open: it keeps the unread
//! counters, raises urgent alerts, and plays the cue. It runs from login to
//! logout on a lossless subscription, so every insert is counted once.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use recado_shared::{ChangeEvent, InboundEvent, UserId};
use recado_store::{ChangeSubscription, FeedError, MessageStore};

use crate::events::{EventSink, MessengerEvent};
use crate::notify::NotificationDispatcher;
use crate::state::SharedState;

pub struct InboxListener {
    me: UserId,
    state: SharedState,
    dispatcher: Arc<NotificationDispatcher>,
    events: EventSink,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl InboxListener {
    pub fn new(
        me: UserId,
        state: SharedState,
        dispatcher: Arc<NotificationDispatcher>,
        events: EventSink,
    ) -> Self {
        Self {
            me,
            state,
            dispatcher,
            events,
            task: Mutex::new(None),
        }
    }

    /// Subscribe to inserts addressed to me. A second call replaces the
    /// first subscription.
    pub fn start(&self, store: &dyn MessageStore) {
        let subscription = store.subscribe_inbox(self.me);
        let subscription_filter = subscription.filter().clone();
        let worker = InboxWorker {
            state: self.state.clone(),
            dispatcher: self.dispatcher.clone(),
            events: self.events.clone(),
        };
        let task = tokio::spawn(worker.run(subscription));

        let previous = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
        info!(me = %self.me.short(), filter = ?subscription_filter, "Inbox listener started");
    }

    /// Unsubscribe and forget every unread count.
    pub fn stop(&self) {
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            task.abort();
        }
        self.state.lock().unread.clear();
        info!(me = %self.me.short(), "Inbox listener stopped");
    }
}

struct InboxWorker {
    state: SharedState,
    dispatcher: Arc<NotificationDispatcher>,
    events: EventSink,
}

impl InboxWorker {
    async fn run(self, mut subscription: ChangeSubscription) {
        loop {
            match subscription.recv().await {
                Ok(ChangeEvent::Inserted(row)) => self.handle(InboundEvent::from(row)),
                Ok(other) => {
                    debug!(kind = ?other.kind(), "Inbox ignoring non-insert change");
                }
                Err(FeedError::Lagged(skipped)) => {
                    warn!(skipped, "Inbox feed lagged, unread counts may be short");
                    self.events.emit(MessengerEvent::InboxLagged { skipped });
                }
                Err(FeedError::Closed) => {
                    info!("Change feed closed, inbox listener exiting");
                    break;
                }
            }
        }
    }

    fn handle(&self, event: InboundEvent) {
        let sender = event.sender();

        // One lock for the open check, the increment and the name lookup.
        let (is_open, counted, name) = {
            let mut state = self.state.lock();
            let is_open = state.conversation.is_open_with(&sender);
            let counted = if is_open {
                None
            } else {
                let count = state.unread.increment(sender);
                Some((count, state.unread.total()))
            };
            (is_open, counted, state.display_name(&sender))
        };

        if let Some((count, total)) = counted {
            debug!(sender = %sender.short(), count, "Unread incremented");
            self.events.emit(MessengerEvent::UnreadChanged {
                peer: sender,
                count,
                total,
            });
        }

        match event {
            InboundEvent::Urgent(message) => {
                // Queue without waiting for acknowledgement; the listener
                // keeps draining the feed while the alert is up.
                drop(self.dispatcher.queue_urgent_alert(&name, &message.content));
                self.dispatcher.play_cue();
            }
            InboundEvent::Ordinary(_) if !is_open => self.dispatcher.play_cue(),
            InboundEvent::Ordinary(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use recado_shared::{Peer, Role};
    use recado_store::{LocalService, NewMessage};

    use super::*;
    use crate::notify::testing::{CountingCue, RecordingSurface};
    use crate::notify::urgent_alert_body;

    struct Fixture {
        service: Arc<LocalService>,
        me: Peer,
        peer: Peer,
        state: SharedState,
        cue: Arc<CountingCue>,
        surface: Arc<RecordingSurface>,
        inbox: InboxListener,
    }

    fn fixture() -> Fixture {
        fixture_on(LocalService::in_memory().unwrap())
    }

    fn fixture_on(service: LocalService) -> Fixture {
        let service = Arc::new(service);
        let me = service.register_user("ana", "Ana", Role::Doctor).unwrap();
        let peer = service.register_user("beto", "Beto", Role::Receptionist).unwrap();
        let state = SharedState::default();
        state.lock().roster.push(peer.clone());
        let cue = Arc::new(CountingCue::default());
        let surface = Arc::new(RecordingSurface::default());
        let dispatcher = Arc::new(NotificationDispatcher::new(cue.clone(), surface.clone()));
        let inbox = InboxListener::new(me.id, state.clone(), dispatcher, EventSink::new(32));
        inbox.start(service.as_ref());
        Fixture {
            service,
            me,
            peer,
            state,
            cue,
            surface,
            inbox,
        }
    }

    async fn deliver(f: &Fixture, content: &str, urgent: bool) {
        f.service
            .insert_message(NewMessage {
                sender_id: f.peer.id,
                receiver_id: f.me.id,
                content: content.into(),
                urgent,
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    fn unread(f: &Fixture) -> u32 {
        f.state.lock().unread.get(&f.peer.id)
    }

    #[tokio::test]
    async fn test_unread_accumulates_while_closed() {
        let f = fixture();
        for i in 0..3 {
            deliver(&f, &format!("m{i}"), false).await;
        }
        assert_eq!(unread(&f), 3);
        assert_eq!(f.cue.count(), 3);
        assert!(f.surface.bodies().is_empty());
    }

    #[tokio::test]
    async fn test_open_conversation_is_not_counted() {
        let f = fixture();
        f.state.lock().conversation.open(f.peer.id);
        deliver(&f, "while open", false).await;
        assert_eq!(unread(&f), 0);
        assert_eq!(f.cue.count(), 0);
    }

    #[tokio::test]
    async fn test_urgent_alerts_once_whether_open_or_not() {
        let f = fixture();
        deliver(&f, "closed urgent", true).await;
        assert_eq!(unread(&f), 1);
        assert_eq!(
            f.surface.bodies(),
            vec![urgent_alert_body("Beto", "closed urgent")]
        );

        f.state.lock().conversation.open(f.peer.id);
        f.state.lock().unread.reset(&f.peer.id);
        deliver(&f, "open urgent", true).await;
        assert_eq!(unread(&f), 0);
        assert_eq!(f.surface.bodies().len(), 2);
    }

    #[tokio::test]
    async fn test_burst_larger_than_feed_buffer_is_fully_counted() {
        let f = fixture_on(LocalService::in_memory().unwrap().with_feed_capacity(2));
        // No await point yields between inserts, so the listener sees the
        // whole burst at once.
        for i in 0..8 {
            f.service
                .insert_message(NewMessage {
                    sender_id: f.peer.id,
                    receiver_id: f.me.id,
                    content: format!("m{i}"),
                    urgent: i >= 6,
                })
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(unread(&f), 8);
        assert_eq!(f.cue.count(), 8);
        assert_eq!(
            f.surface.bodies(),
            vec![urgent_alert_body("Beto", "m6"), urgent_alert_body("Beto", "m7")]
        );
    }

    #[tokio::test]
    async fn test_unknown_sender_name_falls_back() {
        let f = fixture();
        f.state.lock().roster.clear();
        deliver(&f, "who?", true).await;
        assert_eq!(
            f.surface.bodies(),
            vec![urgent_alert_body("Unknown user", "who?")]
        );
    }

    #[tokio::test]
    async fn test_outgoing_and_other_recipients_ignored() {
        let f = fixture();
        f.service
            .insert_message(NewMessage {
                sender_id: f.me.id,
                receiver_id: f.peer.id,
                content: "mine".into(),
                urgent: true,
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(f.state.lock().unread.total(), 0);
        assert!(f.surface.bodies().is_empty());
    }

    #[tokio::test]
    async fn test_stop_unsubscribes_and_clears() {
        let f = fixture();
        deliver(&f, "before", false).await;
        assert_eq!(unread(&f), 1);

        f.inbox.stop();
        assert_eq!(f.state.lock().unread.total(), 0);
        deliver(&f, "after", false).await;
        assert_eq!(f.state.lock().unread.total(), 0);
    }
}
