//! Periodic refresh of unread system notices.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use recado_shared::UserId;
use recado_store::NoticeBoard;

use crate::error::ClientError;
use crate::events::{EventSink, MessengerEvent};
use crate::state::SharedState;

#[derive(Clone)]
pub struct NoticePoller {
    me: UserId,
    board: Arc<dyn NoticeBoard>,
    state: SharedState,
    events: EventSink,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl NoticePoller {
    pub fn new(me: UserId, board: Arc<dyn NoticeBoard>, state: SharedState, events: EventSink) -> Self {
        Self {
            me,
            board,
            state,
            events,
            task: Arc::new(Mutex::new(None)),
        }
    }

    /// Refresh now and then every `period` until [`stop`](Self::stop).
    pub fn start(&self, period: Duration) {
        let poller = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(e) = poller.refresh().await {
                    warn!(error = %e, "Notice refresh failed");
                }
            }
        });
        let previous = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub fn stop(&self) {
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            task.abort();
        }
        self.state.lock().notices.clear();
    }

    pub async fn refresh(&self) -> Result<(), ClientError> {
        let notices = self.board.list_unread_notices(self.me).await?;
        let changed = {
            let mut state = self.state.lock();
            if state.notices == notices {
                None
            } else {
                state.notices = notices;
                Some(state.notices.len())
            }
        };
        if let Some(unread) = changed {
            debug!(unread, "Notices changed");
            self.events.emit(MessengerEvent::NoticesChanged { unread });
        }
        Ok(())
    }

    pub async fn mark_read(&self, id: Uuid) -> Result<(), ClientError> {
        self.board.mark_notice_read(id).await?;
        self.refresh().await
    }

    pub async fn mark_all_read(&self) -> Result<(), ClientError> {
        self.board.mark_all_notices_read(self.me).await?;
        self.refresh().await
    }
}

#[cfg(test)]
mod tests {
    use recado_shared::Role;
    use recado_store::LocalService;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_poller_picks_up_new_notices() {
        let service = Arc::new(LocalService::in_memory().unwrap());
        let me = service.register_user("ana", "Ana", Role::Doctor).unwrap();
        let state = SharedState::default();
        let events = EventSink::new(16);
        let mut rx = events.subscribe();
        let poller = NoticePoller::new(me.id, service.clone(), state.clone(), events);

        poller.start(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(state.lock().notices.is_empty());

        service.post_notice(me.id, "New appointment at 10:00").await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(state.lock().notices.len(), 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            MessengerEvent::NoticesChanged { unread: 1 }
        );

        poller.mark_all_read().await.unwrap();
        assert!(state.lock().notices.is_empty());

        poller.stop();
    }

    #[tokio::test]
    async fn test_mark_single_notice_read() {
        let service = Arc::new(LocalService::in_memory().unwrap());
        let me = service.register_user("ana", "Ana", Role::Doctor).unwrap();
        let state = SharedState::default();
        let poller = NoticePoller::new(me.id, service.clone(), state.clone(), EventSink::new(16));

        let first = service.post_notice(me.id, "first").await.unwrap();
        service.post_notice(me.id, "second").await.unwrap();
        poller.refresh().await.unwrap();
        assert_eq!(state.lock().notices.len(), 2);

        poller.mark_read(first.id).await.unwrap();
        let remaining: Vec<String> = state.lock().notices.iter().map(|n| n.content.clone()).collect();
        assert_eq!(remaining, vec!["second"]);
    }
}
