//! services/tracker/src/session.rs
//!
//! The identity session manager. Establishes at most one session per
//! application instance and broadcasts every change through a `watch` channel.

use commission_guard_core::domain::Session;
use commission_guard_core::ports::IdentityProvider;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    current: watch::Sender<Option<Session>>,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (current, _) = watch::channel(None);
        Self { provider, current }
    }

    /// Signs in with `token` when one is supplied, anonymously otherwise.
    ///
    /// Failures are logged and leave the manager without a session; a rejected
    /// token does not fall back to anonymous sign-in.
    pub async fn initialize(&self, token: Option<&str>) -> Option<Session> {
        let result = match token {
            Some(token) => {
                info!("Signing in with a supplied token.");
                self.provider.sign_in_with_token(token).await
            }
            None => {
                info!("Signing in anonymously.");
                self.provider.sign_in_anonymously().await
            }
        };

        let session = match result {
            Ok(session) => {
                info!("Session established for identity {}.", session.id);
                Some(session)
            }
            Err(e) => {
                error!("Failed to establish a session: {}", e);
                None
            }
        };
        self.current.send_replace(session.clone());
        session
    }

    pub async fn sign_out(&self) {
        let Some(session) = self.current() else {
            warn!("Sign-out requested without an active session.");
            return;
        };
        if let Err(e) = self.provider.sign_out(&session).await {
            error!("Identity provider failed to sign out {}: {}", session.id, e);
        }
        info!("Identity {} signed out.", session.id);
        self.current.send_replace(None);
    }

    pub fn current(&self) -> Option<Session> {
        self.current.borrow().clone()
    }

    /// A stream of session changes; the receiver starts at the current value.
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.current.subscribe()
    }
}
