//! Two staff members on one store: an ordinary message while the
//! conversation is closed, then an urgent one while it is open.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use tracing::info;

use recado_client::{
    AlertSurface, ClientConfig, CuePlayer, Messenger, NotificationDispatcher, PlaybackError,
    Services, Session,
};
use recado_realtime::{spawn_presence_hub, PresenceConfig, PresenceHubHandle};
use recado_shared::constants::APP_NAME;
use recado_shared::{Peer, Role};
use recado_store::{Database, LocalService, NoticeBoard};

/// Rings the terminal bell.
struct TerminalBell;

impl CuePlayer for TerminalBell {
    fn play(&self) -> Result<(), PlaybackError> {
        use std::io::Write;
        let mut out = std::io::stdout();
        out.write_all(b"\x07")
            .and_then(|_| out.flush())
            .map_err(|e| PlaybackError::Other(e.to_string()))
    }
}

/// Prints the alert and acknowledges it after a short pause.
struct TerminalAlert {
    owner: String,
}

#[async_trait]
impl AlertSurface for TerminalAlert {
    async fn present(&self, title: &str, body: &str) {
        println!("[{}] *** {title} *** {body}", self.owner);
        tokio::time::sleep(Duration::from_millis(200)).await;
        println!("[{}] (acknowledged)", self.owner);
    }
}

async fn sign_in(
    service: &Arc<LocalService>,
    hub: &PresenceHubHandle,
    me: Peer,
    config: &ClientConfig,
) -> Messenger {
    let dispatcher = Arc::new(NotificationDispatcher::new(
        Arc::new(TerminalBell),
        Arc::new(TerminalAlert {
            owner: me.display_name.clone(),
        }),
    ));
    let services = Services {
        store: service.clone(),
        directory: service.clone(),
        notices: service.clone(),
        presence: hub.clone(),
    };
    Messenger::start(Session::new(me, config.clone()), services, dispatcher).await
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    recado_client::init_tracing();
    let config = ClientConfig::from_env();

    let db = match &config.db_path {
        Some(path) => Database::open_at(path),
        None => Database::new(),
    }
    .context("Failed to open database")?;
    info!(path = ?db.path(), "{APP_NAME} demo starting");
    let service = Arc::new(LocalService::new(db));

    let hub = spawn_presence_hub(PresenceConfig {
        expiry: config.presence_expiry,
        ..PresenceConfig::default()
    });

    let run = uuid::Uuid::new_v4().simple().to_string();
    let run = &run[..6];
    let ana = service
        .register_user(&format!("ana-{run}"), "Ana", Role::Doctor)
        .context("Failed to register Ana")?;
    let beto = service
        .register_user(&format!("beto-{run}"), "Beto", Role::Receptionist)
        .context("Failed to register Beto")?;

    let a = sign_in(&service, &hub, ana.clone(), &config).await;
    let b = sign_in(&service, &hub, beto.clone(), &config).await;

    for peer in a.open_contact_list().await? {
        println!("[Ana] contact: {} ({})", peer.display_name, peer.role.label());
    }
    b.open_contact_list().await?;
    settle().await;
    println!("[Ana] Beto online: {}", a.is_online(&beto.id));

    b.open_conversation(ana.id).await?;
    b.send("test", false).await?;
    settle().await;
    println!("[Ana] unread from Beto: {}", a.unread_for(&beto.id));
    if a.unread_for(&beto.id) != 1 {
        bail!("expected one unread message from Beto");
    }

    a.open_conversation(beto.id).await?;
    println!("[Ana] unread after opening: {}", a.unread_for(&beto.id));
    for shown in a.messages() {
        println!("[Ana] {:?}: {}", shown.delivery, shown.message.content);
    }

    b.send("URGENT", true).await?;
    // Long enough for the alert to be shown and acknowledged.
    tokio::time::sleep(Duration::from_millis(400)).await;
    println!("[Ana] unread after urgent: {}", a.unread_total());

    service
        .post_notice(ana.id, "New appointment booked for 10:30")
        .await
        .context("Failed to post notice")?;
    a.refresh_notices().await?;
    for notice in a.notices() {
        println!("[Ana] notice: {}", notice.content);
    }
    a.mark_all_notices_read().await?;

    a.logout().await;
    b.logout().await;
    hub.shutdown().await;
    Ok(())
}
