//! Displayed state of the open conversation.
//!
//! A conversation moves `Closed -> Opening -> Open -> Closed`. Every open
//! starts a new epoch; every fetch takes a generation from a counter that
//! never goes backwards. A fetch result is applied only when its epoch is
//! still current and its generation is newer than the last one applied, so
//! results that land out of order or after a close are dropped.
//!
//! Applying a fetch replaces the displayed list wholesale. That is also how
//! provisional entries from the send queue disappear once the durable row
//! comes back.

use serde::Serialize;

use recado_shared::{ChangeEvent, Message, MessageId, UserId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Closed,
    /// Selected, first fetch not applied yet.
    Opening,
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// Provisional, durable write in flight.
    Pending,
    /// Came from a fetch.
    Confirmed,
    /// The durable write failed. Stays visible until the next fetch.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayedMessage {
    pub message: Message,
    pub delivery: Delivery,
}

/// Proof that a fetch was started against a given epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub epoch: u64,
    pub generation: u64,
}

#[derive(Debug, Default)]
pub struct Conversation {
    peer: Option<UserId>,
    phase: Phase,
    epoch: u64,
    last_generation: u64,
    applied_generation: u64,
    messages: Vec<DisplayedMessage>,
}

impl Conversation {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The peer whose conversation is opening or open.
    pub fn open_peer(&self) -> Option<UserId> {
        match self.phase() {
            Phase::Closed => None,
            Phase::Opening | Phase::Open => self.peer,
        }
    }

    pub fn is_open_with(&self, peer: &UserId) -> bool {
        self.open_peer().as_ref() == Some(peer)
    }

    pub fn messages(&self) -> &[DisplayedMessage] {
        &self.messages
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.messages.iter().any(|m| m.message.id == *id)
    }

    /// Start a new epoch for `peer`. Returns the epoch.
    pub fn open(&mut self, peer: UserId) -> u64 {
        self.epoch += 1;
        self.peer = Some(peer);
        self.phase = Phase::Opening;
        self.messages.clear();
        self.epoch
    }

    pub fn close(&mut self) {
        self.epoch += 1;
        self.peer = None;
        self.phase = Phase::Closed;
        self.messages.clear();
    }

    /// Take a generation for a fetch belonging to `epoch`. `None` if that
    /// epoch is over.
    pub fn begin_fetch(&mut self, epoch: u64) -> Option<FetchTicket> {
        if epoch != self.epoch || self.open_peer().is_none() {
            return None;
        }
        self.last_generation += 1;
        Some(FetchTicket {
            epoch,
            generation: self.last_generation,
        })
    }

    /// Replace the displayed list with `rows` unless the ticket is stale.
    /// Returns whether the rows were applied.
    pub fn apply_fetch(&mut self, ticket: FetchTicket, rows: Vec<Message>) -> bool {
        if ticket.epoch != self.epoch || self.open_peer().is_none() {
            return false;
        }
        if ticket.generation <= self.applied_generation {
            return false;
        }
        self.applied_generation = ticket.generation;
        self.phase = Phase::Open;

        let mut messages: Vec<DisplayedMessage> = rows
            .into_iter()
            .map(|message| DisplayedMessage {
                message,
                delivery: Delivery::Confirmed,
            })
            .collect();
        messages.sort_by_key(|m| m.message.created_at);
        self.messages = messages;
        true
    }

    /// Append a provisional message from the send queue.
    pub fn push_provisional(&mut self, message: Message) {
        self.messages.push(DisplayedMessage {
            message,
            delivery: Delivery::Pending,
        });
    }

    pub fn remove(&mut self, id: &MessageId) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.message.id != *id);
        self.messages.len() != before
    }

    pub fn mark_failed(&mut self, id: &MessageId) -> bool {
        match self.messages.iter_mut().find(|m| m.message.id == *id) {
            Some(entry) => {
                entry.delivery = Delivery::Failed;
                true
            }
            None => false,
        }
    }

    /// Whether a change warrants a refetch of the open conversation.
    pub fn is_relevant(&self, me: &UserId, event: &ChangeEvent) -> bool {
        let Some(peer) = self.open_peer() else {
            return false;
        };
        match event {
            ChangeEvent::Inserted(row) | ChangeEvent::Updated(row) => row.is_between(me, &peer),
            ChangeEvent::Deleted { id } => self.contains(id),
        }
    }
}
