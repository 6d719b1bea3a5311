//! Who is online, while the contact list is open.
//!
//! Joining announces me on the shared channel and keeps re-announcing on a
//! heartbeat. Every sync from the channel carries the full membership and
//! replaces the held set. Payloads are validated as they arrive; bad ones
//! are logged and skipped.
//!
//! Join and leave can race: if the contact list closes while a join is still
//! in flight, the join leaves the channel it just joined instead of
//! installing it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use recado_realtime::{ChannelHandle, PresenceHubHandle, SyncStream};
use recado_shared::constants::PRESENCE_CHANNEL;
use recado_shared::{PresencePayload, UserId};

use crate::error::ClientError;
use crate::events::{EventSink, MessengerEvent};

#[derive(Default)]
enum Membership {
    #[default]
    Idle,
    Joining(u64),
    Joined {
        handle: ChannelHandle,
        tasks: Vec<JoinHandle<()>>,
    },
}

#[derive(Default)]
struct PresenceState {
    epoch: u64,
    membership: Membership,
    online: HashSet<UserId>,
}

#[derive(Clone)]
pub struct PresenceTracker {
    me: UserId,
    hub: PresenceHubHandle,
    heartbeat: Duration,
    events: EventSink,
    inner: Arc<Mutex<PresenceState>>,
}

impl PresenceTracker {
    pub fn new(me: UserId, hub: PresenceHubHandle, heartbeat: Duration, events: EventSink) -> Self {
        Self {
            me,
            hub,
            heartbeat,
            events,
            inner: Arc::new(Mutex::new(PresenceState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PresenceState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_online(&self, peer: &UserId) -> bool {
        self.lock().online.contains(peer)
    }

    /// Copy of the current online set.
    pub fn online(&self) -> HashSet<UserId> {
        self.lock().online.clone()
    }

    pub fn is_joined(&self) -> bool {
        matches!(self.lock().membership, Membership::Joined { .. })
    }

    /// Announce me as online. Does nothing if already joined or joining.
    pub async fn join(&self) -> Result<(), ClientError> {
        let epoch = {
            let mut inner = self.lock();
            if !matches!(inner.membership, Membership::Idle) {
                return Ok(());
            }
            inner.epoch += 1;
            inner.membership = Membership::Joining(inner.epoch);
            inner.epoch
        };

        let channel = match self.hub.join_channel(PRESENCE_CHANNEL).await {
            Ok(channel) => channel,
            Err(e) => {
                let mut inner = self.lock();
                if matches!(inner.membership, Membership::Joining(j) if j == epoch) {
                    inner.membership = Membership::Idle;
                }
                return Err(e.into());
            }
        };
        let (handle, syncs) = channel.into_parts();

        let payload = PresencePayload::now(self.me).to_value();
        if let Err(e) = handle.track(payload.clone()).await {
            warn!(error = %e, "Initial presence announcement failed");
        }

        let conn = handle.connection_id();
        let backed_out = {
            let mut inner = self.lock();
            if matches!(inner.membership, Membership::Joining(j) if j == epoch) {
                let tasks = vec![
                    tokio::spawn(heartbeat(handle.clone(), payload, self.heartbeat)),
                    tokio::spawn(self.clone().follow(syncs, epoch)),
                ];
                inner.membership = Membership::Joined { handle, tasks };
                None
            } else {
                Some(handle)
            }
        };

        match backed_out {
            None => info!(me = %self.me.short(), conn, "Joined presence channel"),
            Some(handle) => {
                debug!(epoch, conn, "Contact list closed during join, leaving");
                if let Err(e) = handle.leave().await {
                    debug!(error = %e, "Leave after aborted join failed");
                }
            }
        }
        Ok(())
    }

    /// Stop announcing and forget the online set.
    pub async fn leave(&self) {
        let previous = {
            let mut inner = self.lock();
            inner.epoch += 1;
            inner.online.clear();
            std::mem::take(&mut inner.membership)
        };

        if let Membership::Joined { handle, tasks } = previous {
            for task in tasks {
                task.abort();
            }
            if let Err(e) = handle.leave().await {
                debug!(error = %e, "Presence leave failed");
            }
            info!(me = %self.me.short(), "Left presence channel");
            self.events.emit(MessengerEvent::PresenceChanged { online: 0 });
        }
    }

    async fn follow(self, mut syncs: SyncStream, epoch: u64) {
        while let Some(snapshot) = syncs.next_sync().await {
            let mut online = HashSet::with_capacity(snapshot.len());
            for raw in &snapshot {
                match PresencePayload::from_value(raw) {
                    Ok(payload) => {
                        online.insert(payload.user_id);
                    }
                    Err(e) => warn!(error = %e, "Skipping malformed presence payload"),
                }
            }

            let count = online.len();
            {
                let mut inner = self.lock();
                if inner.epoch != epoch {
                    break;
                }
                inner.online = online;
            }
            debug!(online = count, "Presence synced");
            self.events.emit(MessengerEvent::PresenceChanged { online: count });
        }
    }
}

async fn heartbeat(handle: ChannelHandle, payload: serde_json::Value, period: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        ticker.tick().await;
        if let Err(e) = handle.track(payload.clone()).await {
            warn!(channel = handle.channel(), error = %e, "Presence heartbeat failed");
            break;
        }
    }
}
