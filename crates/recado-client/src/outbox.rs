//! Optimistic sends and deletes.
//!
//! A send shows a provisional entry right away and then writes the durable
//! row. The store echoes the insert on the change feed, the conversation
//! stream refetches, and the wholesale replace swaps the provisional entry
//! for the durable one. A failed write leaves the entry in place, marked
//! [`Delivery::Failed`](crate::conversation::Delivery::Failed), until the
//! next fetch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use recado_shared::{Message, MessageId, UserId};
use recado_store::{MessageStore, NewMessage, StoreError};

use crate::error::ClientError;
use crate::events::{EventSink, MessengerEvent};
use crate::state::SharedState;

pub struct SendQueue {
    me: UserId,
    store: Arc<dyn MessageStore>,
    state: SharedState,
    events: EventSink,
    next_provisional: AtomicU64,
}

impl SendQueue {
    pub fn new(
        me: UserId,
        store: Arc<dyn MessageStore>,
        state: SharedState,
        events: EventSink,
    ) -> Self {
        Self {
            me,
            store,
            state,
            events,
            next_provisional: AtomicU64::new(1),
        }
    }

    /// Send `content` to `peer`. Returns the durable id.
    ///
    /// The provisional entry is only shown when `peer`'s conversation is the
    /// open one.
    pub async fn send(
        &self,
        peer: UserId,
        content: &str,
        urgent: bool,
    ) -> Result<MessageId, ClientError> {
        if content.trim().is_empty() {
            return Err(ClientError::EmptyMessage);
        }

        let provisional = Message {
            id: MessageId::Provisional(self.next_provisional.fetch_add(1, Ordering::Relaxed)),
            sender_id: self.me,
            receiver_id: peer,
            content: content.to_string(),
            urgent,
            created_at: Utc::now(),
        };
        let provisional_id = provisional.id;

        let shown = {
            let mut state = self.state.lock();
            if state.conversation.is_open_with(&peer) {
                state.conversation.push_provisional(provisional);
                Some(state.conversation.messages().len())
            } else {
                None
            }
        };
        if let Some(count) = shown {
            self.events
                .emit(MessengerEvent::ConversationUpdated { peer, count });
        }

        let new = NewMessage {
            sender_id: self.me,
            receiver_id: peer,
            content: content.to_string(),
            urgent,
        };
        match self.store.insert_message(new).await {
            Ok(stored) => {
                debug!(
                    provisional = %provisional_id,
                    msg_id = %stored.id,
                    peer = %peer.short(),
                    urgent,
                    "Message sent"
                );
                Ok(stored.id)
            }
            Err(e) => {
                warn!(provisional = %provisional_id, peer = %peer.short(), error = %e, "Send failed");
                let marked = self.state.lock().conversation.mark_failed(&provisional_id);
                if marked {
                    let count = self.state.lock().conversation.messages().len();
                    self.events
                        .emit(MessengerEvent::ConversationUpdated { peer, count });
                }
                self.surface_rejection(&e);
                Err(e.into())
            }
        }
    }

    /// Remove `id` from the displayed list, then delete the durable row.
    ///
    /// A failed durable delete is not rolled back locally.
    pub async fn delete(&self, id: MessageId) -> Result<(), ClientError> {
        let removed = {
            let mut state = self.state.lock();
            let peer = state.conversation.open_peer();
            match peer {
                Some(peer) if state.conversation.remove(&id) => {
                    Some((peer, state.conversation.messages().len()))
                }
                _ => None,
            }
        };
        if let Some((peer, count)) = removed {
            self.events
                .emit(MessengerEvent::ConversationUpdated { peer, count });
        }

        if id.is_provisional() {
            debug!(msg_id = %id, "Dropped provisional message locally");
            return Ok(());
        }

        self.store.delete_message(id).await.map_err(|e| {
            warn!(msg_id = %id, error = %e, "Delete failed");
            self.surface_rejection(&e);
            ClientError::from(e)
        })
    }

    fn surface_rejection(&self, e: &StoreError) {
        if let StoreError::Rejected(reason) = e {
            self.events.emit(MessengerEvent::WriteRejected {
                reason: reason.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use recado_shared::{Peer, Role};
    use recado_store::LocalService;

    use super::*;
    use crate::conversation::Delivery;
    use crate::stream::ConversationStream;

    struct Fixture {
        service: Arc<LocalService>,
        me: Peer,
        peer: Peer,
        state: SharedState,
        events: EventSink,
        stream: ConversationStream,
        queue: SendQueue,
    }

    fn fixture() -> Fixture {
        let service = Arc::new(LocalService::in_memory().unwrap());
        let me = service.register_user("ana", "Ana", Role::Doctor).unwrap();
        let peer = service.register_user("beto", "Beto", Role::Receptionist).unwrap();
        let state = SharedState::default();
        let events = EventSink::new(32);
        let stream = ConversationStream::new(me.id, service.clone(), state.clone(), events.clone());
        let queue = SendQueue::new(me.id, service.clone(), state.clone(), events.clone());
        Fixture {
            service,
            me,
            peer,
            state,
            events,
            stream,
            queue,
        }
    }

    fn displayed(state: &SharedState) -> Vec<(String, Delivery, bool)> {
        state
            .lock()
            .conversation
            .messages()
            .iter()
            .map(|m| (m.message.content.clone(), m.delivery, m.message.id.is_provisional()))
            .collect()
    }

    async fn settle(state: &SharedState, pred: impl Fn(&[(String, Delivery, bool)]) -> bool) {
        for _ in 0..200 {
            if pred(&displayed(state)) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("state never settled: {:?}", displayed(state));
    }

    #[tokio::test]
    async fn test_send_converges_to_single_durable_entry() {
        let f = fixture();
        f.stream.open(f.peer.id).await.unwrap();

        let id = f.queue.send(f.peer.id, "hello", false).await.unwrap();
        assert!(!id.is_provisional());

        settle(&f.state, |list| {
            list.len() == 1 && list[0] == ("hello".to_string(), Delivery::Confirmed, false)
        })
        .await;
        // Give any straggling refetch a chance to land; the list must not change.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(f.state.lock().conversation.messages().len(), 1);
        assert_eq!(f.state.lock().conversation.messages()[0].message.id, id);
    }

    #[tokio::test]
    async fn test_empty_content_never_shows() {
        let f = fixture();
        f.stream.open(f.peer.id).await.unwrap();

        assert!(matches!(
            f.queue.send(f.peer.id, "  \n ", false).await,
            Err(ClientError::EmptyMessage)
        ));
        assert!(displayed(&f.state).is_empty());
    }

    #[tokio::test]
    async fn test_rejected_send_is_marked_failed_and_surfaced() {
        let f = fixture();
        let mut events = f.events.subscribe();
        f.stream.open(f.peer.id).await.unwrap();

        let too_long = "x".repeat(recado_shared::constants::MAX_MESSAGE_CHARS + 1);
        let err = f.queue.send(f.peer.id, &too_long, false).await.unwrap_err();
        assert!(err.is_rejection());

        let list = displayed(&f.state);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].1, Delivery::Failed);

        let mut rejected = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, MessengerEvent::WriteRejected { .. }) {
                rejected += 1;
            }
        }
        assert_eq!(rejected, 1);
    }

    #[tokio::test]
    async fn test_send_to_closed_peer_is_not_shown() {
        let f = fixture();
        f.queue.send(f.peer.id, "background", false).await.unwrap();
        assert!(displayed(&f.state).is_empty());
        assert_eq!(
            f.service.list_messages(f.me.id, f.peer.id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_delete_removes_locally_and_durably() {
        let f = fixture();
        f.stream.open(f.peer.id).await.unwrap();
        let id = f.queue.send(f.peer.id, "oops", false).await.unwrap();
        settle(&f.state, |list| list.len() == 1 && !list[0].2).await;

        f.queue.delete(id).await.unwrap();
        assert!(displayed(&f.state).is_empty());
        assert!(f
            .service
            .list_messages(f.me.id, f.peer.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_provisional_delete_is_local_only() {
        let f = fixture();
        f.stream.open(f.peer.id).await.unwrap();
        let provisional = MessageId::Provisional(42);
        f.state.lock().conversation.push_provisional(Message {
            id: provisional,
            sender_id: f.me.id,
            receiver_id: f.peer.id,
            content: "draft".into(),
            urgent: false,
            created_at: Utc::now(),
        });

        f.queue.delete(provisional).await.unwrap();
        assert!(displayed(&f.state).is_empty());
    }
}
