// ── Auth state sources ──
//
// Session state and identity token are each backed by one backend
// registration made when the driver is constructed. Both are removed once
// the driver and every source built from it are dropped. Provider lookup and redirect results issue a fresh
// backend call per invocation.

use std::sync::Arc;

use blaze_backend::{Backend, ListenerId, SessionCallback, SessionEvent, User, UserCredential};
use tracing::{debug, warn};

use crate::error::DriverError;
use crate::replay::{Outcome, Replay, ReplayStream};

/// Session-side sources of a driver.
#[derive(Clone)]
pub struct Auth {
    backend: Arc<dyn Backend>,
    session_state: Arc<Replay<Option<User>>>,
    identity_token: Arc<Replay<Option<User>>>,
    _registration: Arc<Registration>,
}

/// Backend session listeners owned by one driver.
struct Registration {
    backend: Arc<dyn Backend>,
    listeners: [ListenerId; 2],
}

impl Drop for Registration {
    fn drop(&mut self) {
        for id in self.listeners {
            self.backend.unlisten_session(id);
        }
        debug!(listeners = ?self.listeners, "session listeners removed");
    }
}

impl Auth {
    pub(crate) fn attach(backend: Arc<dyn Backend>) -> Self {
        let session_state = Arc::new(Replay::new());
        let identity_token = Arc::new(Replay::new());
        let state_listener = backend.listen_session(
            SessionEvent::StateChanged,
            forward(Arc::clone(&session_state), SessionEvent::StateChanged),
        );
        let token_listener = backend.listen_session(
            SessionEvent::IdTokenChanged,
            forward(Arc::clone(&identity_token), SessionEvent::IdTokenChanged),
        );
        let registration = Arc::new(Registration {
            backend: Arc::clone(&backend),
            listeners: [state_listener, token_listener],
        });
        Self {
            backend,
            session_state,
            identity_token,
            _registration: registration,
        }
    }

    /// Signed-in principal, replayed on subscribe; `None` when signed out.
    /// Emits on sign-in and sign-out.
    pub fn session_state(&self) -> ReplayStream<Option<User>> {
        self.session_state.subscribe()
    }

    /// Like [`session_state`](Self::session_state), but also emits when
    /// the principal's token or profile changes.
    pub fn identity_token(&self) -> ReplayStream<Option<User>> {
        self.identity_token.subscribe()
    }

    /// Most recent session state, without subscribing.
    pub fn current_user(&self) -> Option<User> {
        self.session_state.latest().flatten()
    }

    /// Sign-in providers registered for `email`. Issues a new lookup on
    /// every call.
    pub fn providers_for_address(&self, email: &str) -> Outcome<Vec<String>> {
        let lookup = self.backend.fetch_providers_for_email(email);
        Outcome::spawn(async move { lookup.await.map_err(DriverError::BackendOperation) })
    }

    /// Result of a pending redirect sign-in, if any. Issues a new query on
    /// every call.
    pub fn pending_redirect_result(&self) -> Outcome<Option<UserCredential>> {
        let query = self.backend.redirect_result();
        Outcome::spawn(async move { query.await.map_err(DriverError::BackendOperation) })
    }
}

fn forward(replay: Arc<Replay<Option<User>>>, event: SessionEvent) -> SessionCallback {
    Arc::new(move |notification| match notification {
        Ok(user) => replay.push(user),
        Err(source) => {
            warn!(%event, error = %source, "session listener failed");
            replay.fail(DriverError::Subscription {
                path: "auth".into(),
                kind: event.to_string(),
                source,
            });
        }
    })
}
