use recado_shared::{Peer, UserId};

use crate::config::ClientConfig;

/// The signed-in user and the settings of this client.
///
/// Passed explicitly into every component that needs to know who "me" is.
#[derive(Debug, Clone)]
pub struct Session {
    pub me: Peer,
    pub config: ClientConfig,
}

impl Session {
    pub fn new(me: Peer, config: ClientConfig) -> Self {
        Self { me, config }
    }

    pub fn user_id(&self) -> UserId {
        self.me.id
    }
}
