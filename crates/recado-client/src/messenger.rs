//! The messenger facade.
//!
//! Wires the components together for one session and exposes the
//! operations a front end needs. All state lives in the components; this
//! type only routes calls.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use recado_realtime::PresenceHubHandle;
use recado_shared::{MessageId, Peer, UserId};
use recado_store::{Directory, MessageStore, Notice, NoticeBoard};

use crate::conversation::{DisplayedMessage, Phase};
use crate::error::ClientError;
use crate::events::{EventSink, MessengerEvent};
use crate::inbox::InboxListener;
use crate::notices::NoticePoller;
use crate::notify::NotificationDispatcher;
use crate::outbox::SendQueue;
use crate::presence::PresenceTracker;
use crate::session::Session;
use crate::state::SharedState;
use crate::stream::ConversationStream;

/// External services the messenger talks to.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn MessageStore>,
    pub directory: Arc<dyn Directory>,
    pub notices: Arc<dyn NoticeBoard>,
    pub presence: PresenceHubHandle,
}

pub struct Messenger {
    session: Session,
    directory: Arc<dyn Directory>,
    state: SharedState,
    events: EventSink,
    stream: ConversationStream,
    outbox: SendQueue,
    inbox: InboxListener,
    presence: PresenceTracker,
    notices: NoticePoller,
}

impl Messenger {
    /// Build the messenger for `session` and start the session-wide parts:
    /// the inbox listener and the notice poller.
    pub async fn start(
        session: Session,
        services: Services,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        let me = session.user_id();
        let state = SharedState::default();
        let events = EventSink::new(session.config.event_capacity);

        let messenger = Self {
            stream: ConversationStream::new(
                me,
                services.store.clone(),
                state.clone(),
                events.clone(),
            ),
            outbox: SendQueue::new(me, services.store.clone(), state.clone(), events.clone()),
            inbox: InboxListener::new(me, state.clone(), dispatcher, events.clone()),
            presence: PresenceTracker::new(
                me,
                services.presence.clone(),
                session.config.presence_heartbeat,
                events.clone(),
            ),
            notices: NoticePoller::new(me, services.notices.clone(), state.clone(), events.clone()),
            directory: services.directory.clone(),
            session,
            state,
            events,
        };

        // The roster is only needed for sender names here; a failure just
        // means alerts say "Unknown user" until the contact list opens.
        if let Err(e) = messenger.refresh_roster().await {
            warn!(error = %e, "Could not load roster at startup");
        }
        messenger.inbox.start(services.store.as_ref());
        messenger.notices.start(messenger.session.config.notice_poll);

        info!(me = %me.short(), name = %messenger.session.me.display_name, "Messenger started");
        messenger
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<MessengerEvent> {
        self.events.subscribe()
    }

    // -- Contact list --------------------------------------------------------

    /// Load the roster and join presence. A presence failure is logged and
    /// the roster is returned without online indicators.
    pub async fn open_contact_list(&self) -> Result<Vec<Peer>, ClientError> {
        let roster = self.refresh_roster().await?;
        if let Err(e) = self.presence.join().await {
            warn!(error = %e, "Presence unavailable, contact list has no online badges");
        }
        Ok(roster)
    }

    pub async fn close_contact_list(&self) {
        self.presence.leave().await;
    }

    pub fn roster(&self) -> Vec<Peer> {
        self.state.lock().roster.clone()
    }

    pub fn is_online(&self, peer: &UserId) -> bool {
        self.presence.is_online(peer)
    }

    pub fn online(&self) -> HashSet<UserId> {
        self.presence.online()
    }

    async fn refresh_roster(&self) -> Result<Vec<Peer>, ClientError> {
        let roster = self.directory.list_peers(self.session.user_id()).await?;
        self.state.lock().roster = roster.clone();
        Ok(roster)
    }

    // -- Unread --------------------------------------------------------------

    pub fn unread_for(&self, peer: &UserId) -> u32 {
        self.state.lock().unread.get(peer)
    }

    pub fn unread_total(&self) -> u32 {
        self.state.lock().unread.total()
    }

    pub fn has_unread(&self) -> bool {
        self.state.lock().unread.has_unread()
    }

    // -- Conversation --------------------------------------------------------

    pub async fn open_conversation(&self, peer: UserId) -> Result<(), ClientError> {
        let known = self.state.lock().peer(&peer).is_some();
        if !known {
            let roster = self.refresh_roster().await?;
            if !roster.iter().any(|p| p.id == peer) {
                return Err(ClientError::UnknownPeer(peer));
            }
        }
        self.stream.open(peer).await
    }

    pub fn close_conversation(&self) {
        self.stream.close();
    }

    pub fn open_peer(&self) -> Option<UserId> {
        self.state.lock().conversation.open_peer()
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().conversation.phase()
    }

    /// Snapshot of the open conversation, oldest first.
    pub fn messages(&self) -> Vec<DisplayedMessage> {
        self.state.lock().conversation.messages().to_vec()
    }

    /// Send to the open conversation's peer.
    pub async fn send(&self, content: &str, urgent: bool) -> Result<MessageId, ClientError> {
        let peer = self.open_peer().ok_or(ClientError::NoOpenConversation)?;
        self.outbox.send(peer, content, urgent).await
    }

    pub async fn delete_message(&self, id: MessageId) -> Result<(), ClientError> {
        self.outbox.delete(id).await
    }

    // -- Notices -------------------------------------------------------------

    pub fn notices(&self) -> Vec<Notice> {
        self.state.lock().notices.clone()
    }

    pub async fn refresh_notices(&self) -> Result<(), ClientError> {
        self.notices.refresh().await
    }

    pub async fn mark_notice_read(&self, id: Uuid) -> Result<(), ClientError> {
        self.notices.mark_read(id).await
    }

    pub async fn mark_all_notices_read(&self) -> Result<(), ClientError> {
        self.notices.mark_all_read().await
    }

    // -- Session -------------------------------------------------------------

    /// Tear everything down: conversation, presence, inbox, notices.
    pub async fn logout(&self) {
        self.stream.close();
        self.presence.leave().await;
        self.inbox.stop();
        self.notices.stop();
        info!(me = %self.session.user_id().short(), "Logged out");
    }
}
