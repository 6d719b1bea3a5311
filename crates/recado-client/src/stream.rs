//! Subscription and refetch loop of the open conversation.
//!
//! Opening a conversation subscribes to the pair's change feed and starts a
//! full fetch. Every relevant change (and every lag) triggers another full
//! fetch. Fetches may overlap and finish in any order; the generation guard
//! in [`Conversation`](crate::conversation::Conversation) keeps only the
//! newest. Closing aborts the listener task.
//!
//! The listener slot is only swapped while the state lock is held, in the
//! same critical section that moves the epoch. Whatever open or close runs
//! last therefore also owns the slot.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use recado_shared::{ChangeFilter, UserId};
use recado_store::{ChangeSubscription, FeedError, MessageStore};

use crate::error::ClientError;
use crate::events::{EventSink, MessengerEvent};
use crate::state::SharedState;

#[derive(Clone)]
pub struct ConversationStream {
    me: UserId,
    store: Arc<dyn MessageStore>,
    state: SharedState,
    events: EventSink,
    listener: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ConversationStream {
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
            listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Select `peer`: reset its unread count, subscribe, and fetch.
    ///
    /// Returns once the first fetch has finished. A failed first fetch is
    /// returned; the subscription stays up and the next change retries.
    pub async fn open(&self, peer: UserId) -> Result<(), ClientError> {
        let (epoch, cleared, total, previous) = {
            let mut state = self.state.lock();
            let epoch = state.conversation.open(peer);
            let cleared = state.unread.reset(&peer);

            // Subscribe before fetching so nothing committed in between is missed.
            let subscription = self
                .store
                .subscribe_changes(ChangeFilter::Conversation(self.me, peer));
            let task = tokio::spawn(self.clone().listen(subscription, peer, epoch));
            let previous = self.swap_listener(Some(task));
            (epoch, cleared, state.unread.total(), previous)
        };
        if let Some(previous) = previous {
            previous.abort();
        }
        info!(peer = %peer.short(), epoch, "Conversation opened");
        if cleared {
            self.events.emit(MessengerEvent::UnreadChanged {
                peer,
                count: 0,
                total,
            });
        }

        self.refetch(peer, epoch).await
    }

    pub fn close(&self) {
        let (closed, previous) = {
            let mut state = self.state.lock();
            let peer = state.conversation.open_peer();
            state.conversation.close();
            (peer, self.swap_listener(None))
        };
        if let Some(previous) = previous {
            previous.abort();
        }
        if let Some(peer) = closed {
            info!(peer = %peer.short(), "Conversation closed");
        }
    }

    /// Call with the state lock held.
    fn swap_listener(&self, next: Option<JoinHandle<()>>) -> Option<JoinHandle<()>> {
        let mut slot = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, next)
    }

    async fn listen(self, mut subscription: ChangeSubscription, peer: UserId, epoch: u64) {
        loop {
            match subscription.recv().await {
                Ok(event) => {
                    let relevant = {
                        let state = self.state.lock();
                        if state.conversation.epoch() != epoch {
                            break;
                        }
                        state.conversation.is_relevant(&self.me, &event)
                    };
                    if relevant {
                        debug!(peer = %peer.short(), kind = ?event.kind(), "Change in open conversation");
                        self.spawn_refetch(peer, epoch);
                    }
                }
                Err(FeedError::Lagged(skipped)) => {
                    warn!(peer = %peer.short(), skipped, "Conversation feed lagged, refetching");
                    self.spawn_refetch(peer, epoch);
                }
                Err(FeedError::Closed) => {
                    info!(peer = %peer.short(), "Change feed closed");
                    break;
                }
            }
        }
    }

    fn spawn_refetch(&self, peer: UserId, epoch: u64) {
        let stream = self.clone();
        tokio::spawn(async move {
            if let Err(e) = stream.refetch(peer, epoch).await {
                warn!(peer = %peer.short(), error = %e, "Refetch failed");
            }
        });
    }

    /// Fetch the pair's page and apply it if nothing newer has landed.
    pub(crate) async fn refetch(&self, peer: UserId, epoch: u64) -> Result<(), ClientError> {
        let ticket = self.state.lock().conversation.begin_fetch(epoch);
        let Some(ticket) = ticket else {
            return Ok(());
        };

        let rows = self.store.list_messages(self.me, peer).await?;

        let applied = {
            let mut state = self.state.lock();
            if state.conversation.apply_fetch(ticket, rows) {
                Some(state.conversation.messages().len())
            } else {
                None
            }
        };
        match applied {
            Some(count) => {
                debug!(peer = %peer.short(), generation = ticket.generation, count, "Fetch applied");
                self.events
                    .emit(MessengerEvent::ConversationUpdated { peer, count });
            }
            None => {
                debug!(peer = %peer.short(), generation = ticket.generation, "Stale fetch discarded");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use tokio::sync::oneshot;

    use recado_shared::{Message, MessageId};
    use recado_store::{LocalService, NewMessage, Result as StoreResult};

    use super::*;

    /// Wraps a [`LocalService`] and can hold `list_messages` calls until
    /// released, so tests control the order fetches complete in.
    pub struct GatedStore {
        pub inner: Arc<LocalService>,
        gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    }

    impl GatedStore {
        pub fn new(inner: Arc<LocalService>) -> Self {
            Self {
                inner,
                gates: Mutex::new(VecDeque::new()),
            }
        }

        /// The next `list_messages` call waits until the returned sender fires.
        pub fn hold_next_fetch(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().push_back(rx);
            tx
        }
    }

    #[async_trait]
    impl MessageStore for GatedStore {
        async fn list_messages(&self, a: UserId, b: UserId) -> StoreResult<Vec<Message>> {
            let rows = self.inner.list_messages(a, b).await?;
            let gate = self.gates.lock().unwrap().pop_front();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            Ok(rows)
        }

        async fn insert_message(&self, new: NewMessage) -> StoreResult<Message> {
            self.inner.insert_message(new).await
        }

        async fn delete_message(&self, id: MessageId) -> StoreResult<()> {
            self.inner.delete_message(id).await
        }

        fn subscribe_changes(&self, filter: ChangeFilter) -> ChangeSubscription {
            self.inner.subscribe_changes(filter)
        }

        fn subscribe_inbox(&self, me: UserId) -> ChangeSubscription {
            self.inner.subscribe_inbox(me)
        }
    }
}
