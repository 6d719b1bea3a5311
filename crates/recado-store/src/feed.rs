//! Row-level change feed.
//!
//! Every committed insert, update or delete is published once on a tokio
//! broadcast channel. Each subscriber applies its own [`ChangeFilter`], so
//! the store never needs to know who is listening. Dropping a
//! [`ChangeSubscription`] unsubscribes.
//!
//! Broadcast subscriptions can lag and report it. Consumers that must see
//! every event (unread counting) take a lossless subscription instead: the
//! filter runs at publish time and matching events are queued on an
//! unbounded channel of their own.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, trace};

use recado_shared::{ChangeEvent, ChangeFilter};

use crate::error::FeedError;

type LosslessSinks = Arc<Mutex<Vec<(ChangeFilter, mpsc::UnboundedSender<ChangeEvent>)>>>;

#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
    lossless: LosslessSinks,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            lossless: Arc::default(),
        }
    }

    /// Publish an event to every live subscription. Returns the number of
    /// subscriptions that will see it before filtering.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        trace!(kind = ?event.kind(), "publishing change event");
        let mut delivered = 0;
        {
            let mut sinks = self.lossless.lock().unwrap_or_else(PoisonError::into_inner);
            sinks.retain(|(filter, tx)| {
                if tx.is_closed() {
                    return false;
                }
                delivered += 1;
                !filter.matches(&event) || tx.send(event.clone()).is_ok()
            });
        }
        // No subscribers is not an error.
        delivered + self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self, filter: ChangeFilter) -> ChangeSubscription {
        ChangeSubscription {
            filter,
            source: Source::Broadcast(self.tx.subscribe()),
        }
    }

    /// A subscription that never lags. Matching events queue without bound
    /// until received.
    pub fn subscribe_lossless(&self, filter: ChangeFilter) -> ChangeSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lossless
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((filter.clone(), tx));
        debug!(filter = ?filter, "lossless change subscription");
        ChangeSubscription {
            filter,
            source: Source::Lossless(rx),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        let lossless = self
            .lossless
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, tx)| !tx.is_closed())
            .count();
        self.tx.receiver_count() + lossless
    }
}

#[derive(Debug)]
enum Source {
    Broadcast(broadcast::Receiver<ChangeEvent>),
    Lossless(mpsc::UnboundedReceiver<ChangeEvent>),
}

/// A filtered view of the change feed.
#[derive(Debug)]
pub struct ChangeSubscription {
    filter: ChangeFilter,
    source: Source,
}

impl ChangeSubscription {
    pub fn filter(&self) -> &ChangeFilter {
        &self.filter
    }

    /// Wait for the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<ChangeEvent, FeedError> {
        match &mut self.source {
            Source::Lossless(rx) => rx.recv().await.ok_or(FeedError::Closed),
            Source::Broadcast(rx) => loop {
                match rx.recv().await {
                    Ok(event) if self.filter.matches(&event) => return Ok(event),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(n)) => return Err(FeedError::Lagged(n)),
                    Err(broadcast::error::RecvError::Closed) => return Err(FeedError::Closed),
                }
            },
        }
    }
}
