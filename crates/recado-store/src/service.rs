//! Service contracts consumed by the client, and a local implementation.
//!
//! The client only ever talks to the store through [`MessageStore`],
//! [`Directory`] and [`NoticeBoard`]. [`LocalService`] backs all three with a
//! [`Database`] and publishes every committed message change on its
//! [`ChangeFeed`].

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use recado_shared::constants::{CHANGE_FEED_CAPACITY, CONVERSATION_PAGE_LIMIT};
use recado_shared::{ChangeEvent, ChangeFilter, Message, MessageId, Peer, Role, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::feed::{ChangeFeed, ChangeSubscription};
use crate::models::{NewMessage, Notice};

/// Durable, append-only message table with a change feed.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// A bounded page of the conversation between `a` and `b`, oldest first.
    async fn list_messages(&self, a: UserId, b: UserId) -> Result<Vec<Message>>;

    /// Persist a message. The store assigns the durable id and timestamp.
    async fn insert_message(&self, new: NewMessage) -> Result<Message>;

    async fn delete_message(&self, id: MessageId) -> Result<()>;

    /// Subscribe to changes passing `filter`. Drop the subscription to
    /// unsubscribe.
    fn subscribe_changes(&self, filter: ChangeFilter) -> ChangeSubscription;

    /// Every insert addressed to `me`, without loss. The subscription never
    /// reports [`FeedError::Lagged`](crate::FeedError::Lagged).
    fn subscribe_inbox(&self, me: UserId) -> ChangeSubscription;
}

/// Roster of addressable peers.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Every peer except `exclude`, ordered by display name.
    async fn list_peers(&self, exclude: UserId) -> Result<Vec<Peer>>;
}

/// System notices addressed to individual users.
#[async_trait]
pub trait NoticeBoard: Send + Sync {
    async fn post_notice(&self, user_id: UserId, content: &str) -> Result<Notice>;

    async fn list_unread_notices(&self, user_id: UserId) -> Result<Vec<Notice>>;

    async fn mark_notice_read(&self, id: Uuid) -> Result<()>;

    async fn mark_all_notices_read(&self, user_id: UserId) -> Result<()>;
}

/// All three services over one local database.
pub struct LocalService {
    db: Mutex<Database>,
    feed: ChangeFeed,
    page_limit: u32,
}

impl LocalService {
    pub fn new(db: Database) -> Self {
        Self {
            db: Mutex::new(db),
            feed: ChangeFeed::new(CHANGE_FEED_CAPACITY),
            page_limit: CONVERSATION_PAGE_LIMIT,
        }
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        Ok(Self::new(Database::open_at(path)?))
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    pub fn with_page_limit(mut self, limit: u32) -> Self {
        self.page_limit = limit;
        self
    }

    /// Replace the change feed with one buffering `capacity` events per
    /// broadcast subscriber. Call before anyone subscribes.
    pub fn with_feed_capacity(mut self, capacity: usize) -> Self {
        self.feed = ChangeFeed::new(capacity);
        self
    }

    /// The feed every change is published on.
    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Add a user to the directory.
    pub fn register_user(&self, username: &str, name: &str, role: Role) -> Result<Peer> {
        let user = self.db()?.create_user(username, name, role)?;
        info!(user = %user.id, username, "registered user");
        Ok(user.into())
    }

    fn db(&self) -> Result<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

#[async_trait]
impl MessageStore for LocalService {
    async fn list_messages(&self, a: UserId, b: UserId) -> Result<Vec<Message>> {
        self.db()?.list_conversation(a, b, self.page_limit)
    }

    async fn insert_message(&self, new: NewMessage) -> Result<Message> {
        let message = self.db()?.insert_message(&new)?;
        debug!(
            msg_id = %message.id,
            sender = %message.sender_id.short(),
            receiver = %message.receiver_id.short(),
            urgent = message.urgent,
            "message stored"
        );
        self.feed.publish(ChangeEvent::Inserted(message.clone()));
        Ok(message)
    }

    async fn delete_message(&self, id: MessageId) -> Result<()> {
        let Some(uuid) = id.as_durable() else {
            return Err(StoreError::NotFound);
        };
        let removed = self.db()?.delete_message(uuid)?;
        if removed {
            debug!(msg_id = %id, "message deleted");
            self.feed.publish(ChangeEvent::Deleted { id });
        }
        Ok(())
    }

    fn subscribe_changes(&self, filter: ChangeFilter) -> ChangeSubscription {
        self.feed.subscribe(filter)
    }

    fn subscribe_inbox(&self, me: UserId) -> ChangeSubscription {
        self.feed.subscribe_lossless(ChangeFilter::InsertsTo(me))
    }
}

#[async_trait]
impl Directory for LocalService {
    async fn list_peers(&self, exclude: UserId) -> Result<Vec<Peer>> {
        let users = self.db()?.list_users_except(exclude)?;
        Ok(users.into_iter().map(Peer::from).collect())
    }
}

#[async_trait]
impl NoticeBoard for LocalService {
    async fn post_notice(&self, user_id: UserId, content: &str) -> Result<Notice> {
        self.db()?.insert_notice(user_id, content)
    }

    async fn list_unread_notices(&self, user_id: UserId) -> Result<Vec<Notice>> {
        self.db()?.list_unread_notices(user_id)
    }

    async fn mark_notice_read(&self, id: Uuid) -> Result<()> {
        self.db()?.mark_notice_read(id)
    }

    async fn mark_all_notices_read(&self, user_id: UserId) -> Result<()> {
        let flipped = self.db()?.mark_all_notices_read(user_id)?;
        debug!(user = %user_id.short(), flipped, "marked all notices read");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeedError;

    fn service_with_pair() -> (LocalService, Peer, Peer) {
        let service = LocalService::in_memory().unwrap();
        let a = service.register_user("ana", "Ana", Role::Doctor).unwrap();
        let b = service.register_user("beto", "Beto", Role::Receptionist).unwrap();
        (service, a, b)
    }

    fn new_message(from: &Peer, to: &Peer, content: &str) -> NewMessage {
        NewMessage {
            sender_id: from.id,
            receiver_id: to.id,
            content: content.into(),
            urgent: false,
        }
    }

    #[tokio::test]
    async fn test_insert_is_echoed_on_feed() {
        let (service, a, b) = service_with_pair();
        let mut inbox = service.subscribe_changes(ChangeFilter::InsertsTo(b.id));

        let stored = service
            .insert_message(new_message(&a, &b, "hello"))
            .await
            .unwrap();

        assert_eq!(inbox.recv().await.unwrap(), ChangeEvent::Inserted(stored));
    }

    #[tokio::test]
    async fn test_delete_publishes_only_when_removed() {
        let (service, a, b) = service_with_pair();
        let stored = service
            .insert_message(new_message(&a, &b, "oops"))
            .await
            .unwrap();
        let mut sub = service.subscribe_changes(ChangeFilter::Conversation(a.id, b.id));

        service.delete_message(stored.id).await.unwrap();
        service.delete_message(stored.id).await.unwrap();
        drop(service);

        assert_eq!(
            sub.recv().await.unwrap(),
            ChangeEvent::Deleted { id: stored.id }
        );
        assert_eq!(sub.recv().await, Err(FeedError::Closed));
    }

    #[tokio::test]
    async fn test_inbox_subscription_survives_small_feed() {
        let (service, a, b) = service_with_pair();
        let service = service.with_feed_capacity(2);
        let mut inbox = service.subscribe_inbox(b.id);
        let mut conversation = service.subscribe_changes(ChangeFilter::Conversation(a.id, b.id));

        for i in 0..6 {
            service
                .insert_message(new_message(&a, &b, &format!("m{i}")))
                .await
                .unwrap();
        }

        assert!(matches!(conversation.recv().await, Err(FeedError::Lagged(_))));
        for i in 0..6 {
            match inbox.recv().await.unwrap() {
                ChangeEvent::Inserted(row) => assert_eq!(row.content, format!("m{i}")),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_provisional_delete_is_not_found() {
        let (service, _, _) = service_with_pair();
        assert!(matches!(
            service.delete_message(MessageId::Provisional(1)).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_rejected_insert_publishes_nothing() {
        let (service, a, b) = service_with_pair();
        let mut sub = service.subscribe_changes(ChangeFilter::Conversation(a.id, b.id));

        let err = service
            .insert_message(new_message(&a, &b, "  "))
            .await
            .unwrap_err();
        assert!(err.is_rejection());

        let ok = service
            .insert_message(new_message(&a, &b, "real"))
            .await
            .unwrap();
        assert_eq!(sub.recv().await.unwrap(), ChangeEvent::Inserted(ok));
    }

    #[tokio::test]
    async fn test_page_limit_applies() {
        let (service, a, b) = service_with_pair();
        let service = service.with_page_limit(1);
        service.insert_message(new_message(&a, &b, "old")).await.unwrap();
        service.insert_message(new_message(&b, &a, "new")).await.unwrap();

        let page = service.list_messages(a.id, b.id).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].content, "new");
    }

    #[tokio::test]
    async fn test_directory_excludes_self() {
        let (service, a, b) = service_with_pair();
        let peers = service.list_peers(a.id).await.unwrap();
        assert_eq!(peers, vec![b]);
    }

    #[tokio::test]
    async fn test_notice_board() {
        let (service, a, _) = service_with_pair();
        let notice = service.post_notice(a.id, "New appointment").await.unwrap();
        assert_eq!(service.list_unread_notices(a.id).await.unwrap(), vec![notice.clone()]);
        service.mark_notice_read(notice.id).await.unwrap();
        assert!(service.list_unread_notices(a.id).await.unwrap().is_empty());
        service.post_notice(a.id, "Another").await.unwrap();
        service.mark_all_notices_read(a.id).await.unwrap();
        assert!(service.list_unread_notices(a.id).await.unwrap().is_empty());
    }
}
