//! # recado-client
//!
//! Client side of Recado's peer messaging: presence badges, unread
//! accounting, urgent alerts and the optimistic view of the open
//! conversation. [`Messenger`] is the entry point.

pub mod config;
pub mod conversation;
pub mod error;
pub mod events;
pub mod inbox;
pub mod messenger;
pub mod notices;
pub mod notify;
pub mod outbox;
pub mod presence;
pub mod session;
pub mod state;
pub mod stream;
pub mod unread;

use tracing_subscriber::{fmt, EnvFilter};

pub use config::ClientConfig;
pub use conversation::{Delivery, DisplayedMessage, Phase};
pub use error::ClientError;
pub use events::MessengerEvent;
pub use messenger::{Messenger, Services};
pub use notify::{AlertSurface, CuePlayer, NotificationDispatcher, PlaybackError};
pub use session::Session;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("recado_client=debug,recado_store=info,recado_realtime=info,warn")
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
