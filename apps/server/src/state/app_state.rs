//! Shared application state handed to every handler.

use std::sync::Arc;

use crate::auth::TokenKey;
use crate::session::SessionService;
use crate::ws::hub::WsHub;

#[derive(Clone)]
pub struct AppState {
    session: Arc<SessionService>,
    hub: Arc<WsHub>,
    token_key: TokenKey,
}

impl AppState {
    pub fn new(session: Arc<SessionService>, hub: Arc<WsHub>, token_key: TokenKey) -> Self {
        Self {
            session,
            hub,
            token_key,
        }
    }

    pub fn session(&self) -> Arc<SessionService> {
        self.session.clone()
    }

    pub fn hub(&self) -> Arc<WsHub> {
        self.hub.clone()
    }

    pub fn token_key(&self) -> &TokenKey {
        &self.token_key
    }
}
