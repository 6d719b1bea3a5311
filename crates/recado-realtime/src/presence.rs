//! Presence hub with a tokio mpsc command pattern.
//!
//! The hub runs in a dedicated tokio task. Clients join a named channel,
//! `track` an opaque JSON payload and receive the full membership of the
//! channel whenever it changes. Snapshots are delivered over a `watch`
//! channel, so a slow reader always sees the latest membership and never a
//! stale intermediate one.
//!
//! Members that stop refreshing their payload are dropped after
//! [`PresenceConfig::expiry`]. That covers clients that vanish without
//! calling `leave`.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use recado_shared::constants::{PRESENCE_EXPIRY_SECS, PRESENCE_HEARTBEAT_SECS};

use crate::error::PresenceError;

pub type ConnectionId = u64;

/// Payloads of every member currently tracked on a channel.
pub type PresenceSnapshot = Vec<serde_json::Value>;

// ---------------------------------------------------------------------------
// Command types
// ---------------------------------------------------------------------------

/// Commands sent *into* the hub task.
#[derive(Debug)]
pub enum HubCommand {
    /// Join a channel; the reply carries the connection id and its snapshot
    /// receiver.
    Join {
        channel: String,
        reply: oneshot::Sender<(ConnectionId, watch::Receiver<PresenceSnapshot>)>,
    },
    /// Announce (or refresh) this connection's payload.
    Track {
        channel: String,
        conn: ConnectionId,
        payload: serde_json::Value,
    },
    /// Stop announcing and stop receiving snapshots.
    Leave {
        channel: String,
        conn: ConnectionId,
    },
    /// Gracefully shut down the hub.
    Shutdown,
}

/// Configuration for spawning the hub.
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// A member not refreshed within this window is dropped.
    pub expiry: Duration,
    /// How often expired members are swept.
    pub sweep_interval: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            expiry: Duration::from_secs(PRESENCE_EXPIRY_SECS),
            sweep_interval: Duration::from_secs(PRESENCE_HEARTBEAT_SECS),
        }
    }
}

// ---------------------------------------------------------------------------
// Client-side handles
// ---------------------------------------------------------------------------

/// Cheap handle used to talk to the hub task.
#[derive(Debug, Clone)]
pub struct PresenceHubHandle {
    cmd_tx: mpsc::Sender<HubCommand>,
}

impl PresenceHubHandle {
    pub async fn join_channel(&self, channel: &str) -> Result<PresenceChannel, PresenceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(HubCommand::Join {
                channel: channel.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| PresenceError::HubClosed)?;

        let (conn, syncs) = reply_rx
            .await
            .map_err(|_| PresenceError::JoinDropped(channel.to_string()))?;

        Ok(PresenceChannel {
            handle: ChannelHandle {
                channel: channel.to_string(),
                conn,
                cmd_tx: self.cmd_tx.clone(),
            },
            syncs: SyncStream { rx: syncs },
        })
    }

    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(HubCommand::Shutdown).await;
    }
}

/// A joined presence channel.
#[derive(Debug)]
pub struct PresenceChannel {
    handle: ChannelHandle,
    syncs: SyncStream,
}

impl PresenceChannel {
    /// Split into the announcing half and the snapshot half so they can be
    /// driven from different tasks.
    pub fn into_parts(self) -> (ChannelHandle, SyncStream) {
        (self.handle, self.syncs)
    }
}

/// Announcing half of a joined channel.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    channel: String,
    conn: ConnectionId,
    cmd_tx: mpsc::Sender<HubCommand>,
}

impl ChannelHandle {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.conn
    }

    pub async fn track(&self, payload: serde_json::Value) -> Result<(), PresenceError> {
        self.cmd_tx
            .send(HubCommand::Track {
                channel: self.channel.clone(),
                conn: self.conn,
                payload,
            })
            .await
            .map_err(|_| PresenceError::HubClosed)
    }

    pub async fn leave(self) -> Result<(), PresenceError> {
        self.cmd_tx
            .send(HubCommand::Leave {
                channel: self.channel,
                conn: self.conn,
            })
            .await
            .map_err(|_| PresenceError::HubClosed)
    }
}

/// Snapshot half of a joined channel.
#[derive(Debug)]
pub struct SyncStream {
    rx: watch::Receiver<PresenceSnapshot>,
}

impl SyncStream {
    /// Wait for the next membership change. Returns `None` once the hub has
    /// forgotten this connection (leave, shutdown).
    pub async fn next_sync(&mut self) -> Option<PresenceSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

// ---------------------------------------------------------------------------
// Hub task
// ---------------------------------------------------------------------------

struct Member {
    payload: serde_json::Value,
    last_seen: Instant,
}

/// `joined` is membership of the channel, with the last time each connection
/// joined or tracked; `subscribers` only tracks who still listens for
/// snapshots. Dropping the sync half never stops a connection from
/// announcing.
#[derive(Default)]
struct ChannelState {
    joined: HashMap<ConnectionId, Instant>,
    members: BTreeMap<ConnectionId, Member>,
    subscribers: HashMap<ConnectionId, watch::Sender<PresenceSnapshot>>,
}

impl ChannelState {
    fn snapshot(&self) -> PresenceSnapshot {
        self.members.values().map(|m| m.payload.clone()).collect()
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        for tx in self.subscribers.values() {
            // A closed receiver is cleaned up by the next sweep.
            let _ = tx.send(snapshot.clone());
        }
    }

    fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.members.is_empty() && self.subscribers.is_empty()
    }
}

/// Spawn the presence hub in a background tokio task.
pub fn spawn_presence_hub(config: PresenceConfig) -> PresenceHubHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<HubCommand>(256);

    tokio::spawn(async move {
        let mut channels: HashMap<String, ChannelState> = HashMap::new();
        let mut next_conn: ConnectionId = 1;
        let mut sweep = tokio::time::interval(config.sweep_interval);

        info!(expiry = ?config.expiry, "Presence hub started");

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(HubCommand::Join { channel, reply }) => {
                            let conn = next_conn;
                            next_conn += 1;

                            let state = channels.entry(channel.clone()).or_default();
                            let (tx, rx) = watch::channel(Vec::new());
                            // Deliver the current membership as the first sync.
                            let _ = tx.send(state.snapshot());
                            state.subscribers.insert(conn, tx);
                            state.joined.insert(conn, Instant::now());

                            debug!(channel = %channel, conn, "Presence join");
                            if reply.send((conn, rx)).is_err() {
                                debug!(channel = %channel, conn, "Joiner went away before ack");
                                state.subscribers.remove(&conn);
                                state.joined.remove(&conn);
                            }
                        }
                        Some(HubCommand::Track { channel, conn, payload }) => {
                            let Some(state) = channels.get_mut(&channel) else {
                                debug!(channel = %channel, conn, "Track on unknown channel");
                                continue;
                            };
                            let now = Instant::now();
                            let Some(active) = state.joined.get_mut(&conn) else {
                                debug!(channel = %channel, conn, "Track from a connection that left");
                                continue;
                            };
                            *active = now;
                            let changed = match state.members.get_mut(&conn) {
                                Some(member) => {
                                    member.last_seen = now;
                                    if member.payload != payload {
                                        member.payload = payload;
                                        true
                                    } else {
                                        false
                                    }
                                }
                                None => {
                                    state.members.insert(conn, Member { payload, last_seen: now });
                                    true
                                }
                            };
                            if changed {
                                debug!(channel = %channel, conn, members = state.members.len(), "Presence changed");
                                state.publish();
                            }
                        }
                        Some(HubCommand::Leave { channel, conn }) => {
                            if let Some(state) = channels.get_mut(&channel) {
                                state.subscribers.remove(&conn);
                                state.joined.remove(&conn);
                                if state.members.remove(&conn).is_some() {
                                    debug!(channel = %channel, conn, "Presence leave");
                                    state.publish();
                                }
                                if state.is_empty() {
                                    channels.remove(&channel);
                                }
                            }
                        }
                        Some(HubCommand::Shutdown) => {
                            info!("Presence hub shutdown requested");
                            break;
                        }
                        None => {
                            info!("Command channel closed, shutting down presence hub");
                            break;
                        }
                    }
                }

                _ = sweep.tick() => {
                    let now = Instant::now();
                    for (name, state) in channels.iter_mut() {
                        state.subscribers.retain(|_, tx| !tx.is_closed());

                        let before = state.members.len();
                        state.members.retain(|conn, member| {
                            let alive = now.duration_since(member.last_seen) < config.expiry;
                            if !alive {
                                warn!(channel = %name, conn = *conn, "Presence member expired");
                            }
                            alive
                        });
                        if state.members.len() != before {
                            state.publish();
                        }
                        // Silent past the window and no longer listening: the client is gone.
                        let ChannelState { joined, members, subscribers } = state;
                        joined.retain(|conn, active| {
                            members.contains_key(conn)
                                || subscribers.contains_key(conn)
                                || now.duration_since(*active) < config.expiry
                        });
                    }
                    channels.retain(|_, state| !state.is_empty());
                }
            }
        }

        info!("Presence hub terminated");
    });

    PresenceHubHandle { cmd_tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(snapshot: &PresenceSnapshot) -> Vec<String> {
        let mut names: Vec<String> = snapshot
            .iter()
            .filter_map(|p| p["name"].as_str().map(String::from))
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_join_delivers_initial_snapshot() {
        let hub = spawn_presence_hub(PresenceConfig::default());
        let (_, mut syncs) = hub.join_channel("room").await.unwrap().into_parts();
        assert_eq!(syncs.next_sync().await.unwrap(), Vec::<serde_json::Value>::new());
    }

    #[tokio::test]
    async fn test_track_and_leave_broadcast_full_membership() {
        let hub = spawn_presence_hub(PresenceConfig::default());
        let (a, mut a_syncs) = hub.join_channel("room").await.unwrap().into_parts();
        let (b, _b_syncs) = hub.join_channel("room").await.unwrap().into_parts();
        a_syncs.next_sync().await.unwrap();

        a.track(json!({ "name": "a" })).await.unwrap();
        b.track(json!({ "name": "b" })).await.unwrap();

        let mut latest = a_syncs.next_sync().await.unwrap();
        while latest.len() < 2 {
            latest = a_syncs.next_sync().await.unwrap();
        }
        assert_eq!(names(&latest), vec!["a", "b"]);

        b.leave().await.unwrap();
        let after = a_syncs.next_sync().await.unwrap();
        assert_eq!(names(&after), vec!["a"]);
    }

    #[tokio::test]
    async fn test_identical_heartbeat_is_silent() {
        let hub = spawn_presence_hub(PresenceConfig::default());
        let (a, mut syncs) = hub.join_channel("room").await.unwrap().into_parts();
        syncs.next_sync().await.unwrap();

        a.track(json!({ "name": "a" })).await.unwrap();
        assert_eq!(syncs.next_sync().await.unwrap().len(), 1);

        a.track(json!({ "name": "a" })).await.unwrap();
        let quiet = tokio::time::timeout(Duration::from_millis(50), syncs.next_sync()).await;
        assert!(quiet.is_err());
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let hub = spawn_presence_hub(PresenceConfig::default());
        let (a, _) = hub.join_channel("one").await.unwrap().into_parts();
        let (_, mut other) = hub.join_channel("two").await.unwrap().into_parts();
        other.next_sync().await.unwrap();

        a.track(json!({ "name": "a" })).await.unwrap();
        let quiet = tokio::time::timeout(Duration::from_millis(50), other.next_sync()).await;
        assert!(quiet.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_member_expires() {
        let config = PresenceConfig {
            expiry: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(5),
        };
        let hub = spawn_presence_hub(config);
        let (ghost, _ghost_syncs) = hub.join_channel("room").await.unwrap().into_parts();
        let (_, mut watcher) = hub.join_channel("room").await.unwrap().into_parts();
        watcher.next_sync().await.unwrap();

        ghost.track(json!({ "name": "ghost" })).await.unwrap();
        assert_eq!(watcher.next_sync().await.unwrap().len(), 1);

        // No heartbeat: the sweep drops the member once the window passes.
        tokio::time::sleep(Duration::from_secs(40)).await;
        assert!(watcher.next_sync().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_announce_only_half_keeps_updating_after_sweep() {
        let config = PresenceConfig {
            expiry: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(5),
        };
        let hub = spawn_presence_hub(config);
        let (_, mut watcher) = hub.join_channel("room").await.unwrap().into_parts();
        watcher.next_sync().await.unwrap();

        let (announcer, syncs) = hub.join_channel("room").await.unwrap().into_parts();
        drop(syncs);
        announcer.track(json!({ "name": "first" })).await.unwrap();
        assert_eq!(names(&watcher.next_sync().await.unwrap()), vec!["first"]);

        // Several sweeps prune the closed snapshot receiver.
        tokio::time::sleep(Duration::from_secs(12)).await;
        announcer.track(json!({ "name": "second" })).await.unwrap();
        assert_eq!(names(&watcher.next_sync().await.unwrap()), vec!["second"]);

        // Heartbeats keep refreshing it past the original expiry window.
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_secs(10)).await;
            announcer.track(json!({ "name": "second" })).await.unwrap();
        }
        let quiet = tokio::time::timeout(Duration::from_secs(1), watcher.next_sync()).await;
        assert!(quiet.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_closes_handles() {
        let hub = spawn_presence_hub(PresenceConfig::default());
        let (_, mut syncs) = hub.join_channel("room").await.unwrap().into_parts();
        syncs.next_sync().await.unwrap();

        hub.shutdown().await;
        assert!(syncs.next_sync().await.is_none());
        assert!(hub.join_channel("room").await.is_err());
    }
}
