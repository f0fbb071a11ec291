// ── Backend collaborator interface ──
//
// Everything `blaze-core` needs from a session + hierarchical store
// service. Object safe so the core can hold an `Arc<dyn Backend>`.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::{Map, Value};

use crate::error::BackendError;
use crate::types::{
    ActionCodeInfo, AuthProvider, BackendConfig, Credential, EventKind, ListenerId, Password,
    Persistence, Priority, ProfileUpdate, SessionCallback, SessionEvent, SnapshotCallback,
    TransactionOutcome, UpdateFn, User, UserCredential, UserHandle,
};

/// Future returned by every asynchronous backend operation.
pub type BackendFuture<T> = BoxFuture<'static, Result<T, BackendError>>;

/// A session + store service.
///
/// # Issue semantics
///
/// Calling an operation method *issues* the operation: implementations
/// must start the work (send the request, apply the write) before
/// returning. The returned future only reports the outcome, and dropping
/// it does not cancel anything. The dispatcher relies on this to keep
/// backend issue order equal to command order.
///
/// Paths are normalized by the caller: no leading, trailing or doubled
/// `/`, and `""` addresses the root.
pub trait Backend: Send + Sync {
    // ── Session ──────────────────────────────────────────────────────

    fn apply_action_code(&self, code: &str) -> BackendFuture<()>;

    fn check_action_code(&self, code: &str) -> BackendFuture<ActionCodeInfo>;

    fn confirm_password_reset(&self, code: &str, new_password: &Password) -> BackendFuture<()>;

    fn create_user_with_email_and_password(
        &self,
        email: &str,
        password: &Password,
    ) -> BackendFuture<UserCredential>;

    fn send_password_reset_email(&self, email: &str) -> BackendFuture<()>;

    fn set_persistence(&self, persistence: Persistence) -> BackendFuture<()>;

    fn sign_in_anonymously(&self) -> BackendFuture<UserCredential>;

    fn sign_in_with_credential(&self, credential: &Credential) -> BackendFuture<UserCredential>;

    fn sign_in_with_custom_token(&self, token: &str) -> BackendFuture<UserCredential>;

    fn sign_in_with_email_and_password(
        &self,
        email: &str,
        password: &Password,
    ) -> BackendFuture<UserCredential>;

    /// Starts phone verification; resolves with the verification id to
    /// combine with the delivered code into a [`Credential::phone`].
    fn sign_in_with_phone_number(&self, phone_number: &str, verifier: &str)
    -> BackendFuture<String>;

    fn sign_in_with_popup(&self, provider: &AuthProvider) -> BackendFuture<UserCredential>;

    fn sign_in_with_redirect(&self, provider: &AuthProvider) -> BackendFuture<()>;

    fn sign_out(&self) -> BackendFuture<()>;

    /// Resolves with the email address the reset code was issued for.
    fn verify_password_reset_code(&self, code: &str) -> BackendFuture<String>;

    fn fetch_providers_for_email(&self, email: &str) -> BackendFuture<Vec<String>>;

    /// Result of a pending redirect sign-in, if any.
    fn redirect_result(&self) -> BackendFuture<Option<UserCredential>>;

    // ── Principal ────────────────────────────────────────────────────

    fn unlink(&self, user: &UserHandle, provider_id: &str) -> BackendFuture<User>;

    fn update_email(&self, user: &UserHandle, email: &str) -> BackendFuture<()>;

    fn update_password(&self, user: &UserHandle, new_password: &Password) -> BackendFuture<()>;

    fn update_phone_number(&self, user: &UserHandle, credential: &Credential)
    -> BackendFuture<()>;

    fn update_profile(&self, user: &UserHandle, profile: &ProfileUpdate) -> BackendFuture<()>;

    // ── Store ────────────────────────────────────────────────────────

    fn go_online(&self);

    fn go_offline(&self);

    fn set(&self, path: &str, value: &Value) -> BackendFuture<()>;

    /// Writes `value` under a freshly generated child key of `path` and
    /// resolves with that key.
    fn push(&self, path: &str, value: &Value) -> BackendFuture<String>;

    fn remove(&self, path: &str) -> BackendFuture<()>;

    /// Multi-location update: each key of `values` is a path relative to
    /// `path`.
    fn update(&self, path: &str, values: &Map<String, Value>) -> BackendFuture<()>;

    fn transaction(&self, path: &str, update_fn: UpdateFn) -> BackendFuture<TransactionOutcome>;

    fn set_priority(&self, path: &str, priority: &Priority) -> BackendFuture<()>;

    fn set_with_priority(&self, path: &str, value: &Value, priority: &Priority)
    -> BackendFuture<()>;

    // ── Notifications ────────────────────────────────────────────────

    /// Register a change listener on `(path, kind)`.
    ///
    /// The callback may be invoked synchronously from within this call
    /// (initial data) and later from any thread.
    fn listen(&self, path: &str, kind: EventKind, callback: SnapshotCallback) -> ListenerId;

    /// Remove exactly the listener registered under `id`.
    fn unlisten(&self, path: &str, kind: EventKind, id: ListenerId);

    /// Register a session listener.
    fn listen_session(&self, event: SessionEvent, callback: SessionCallback) -> ListenerId;

    /// Remove the session listener registered under `id`.
    fn unlisten_session(&self, id: ListenerId);
}

/// Constructs backend handles from connection parameters.
pub trait Connector: Send + Sync {
    /// Connect a backend for the named instance.
    fn connect(
        &self,
        config: &BackendConfig,
        instance: &str,
    ) -> Result<Arc<dyn Backend>, BackendError>;
}
