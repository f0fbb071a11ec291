//! In-process reference backend.
//!
//! [`MemoryBackend`] implements the full [`Backend`] contract against a
//! JSON tree and an account registry held in memory. Every operation
//! completes before its method returns, so the returned futures are
//! already resolved. Each issued call is recorded in an ordered journal
//! ([`MemoryBackend::journal`]) so callers can assert exactly which
//! backend operations a command stream produced, and in which order.
//!
//! Handles are cheap to clone and share state; a `MemoryBackend` is also
//! its own [`Connector`], handing out clones of itself.

mod accounts;
mod push_id;
mod tree;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use futures_util::future;
use serde_json::{Map, Value, json};
use tracing::{debug, trace};

use self::accounts::Accounts;
use self::push_id::PushIdGenerator;
use self::tree::Tree;
use crate::backend::{Backend, BackendFuture, Connector};
use crate::error::BackendError;
use crate::types::{
    ActionCodeInfo, ActionCodeOperation, AuthProvider, BackendConfig, Credential, EventKind,
    ListenerId, Password, Persistence, Priority, ProfileUpdate, SessionCallback, SessionEvent,
    Snapshot, SnapshotCallback, TransactionOutcome, UpdateFn, User, UserCredential, UserHandle,
};

/// One recorded backend interaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// Operation name, e.g. `"set"`, `"signInWithEmailAndPassword"`, `"listen"`.
    pub op: &'static str,
    /// Store path the call addressed, if any.
    pub path: Option<String>,
    /// The call's arguments (passwords are never recorded).
    pub args: Value,
}

struct DataListener {
    path: String,
    kind: EventKind,
    callback: SnapshotCallback,
}

struct SessionListener {
    event: SessionEvent,
    callback: SessionCallback,
}

#[derive(Default)]
struct Inner {
    tree: Mutex<Tree>,
    accounts: Mutex<Accounts>,
    push_ids: Mutex<PushIdGenerator>,
    journal: Mutex<Vec<Call>>,
    listeners: DashMap<ListenerId, DataListener>,
    session_listeners: DashMap<ListenerId, SessionListener>,
    next_listener: AtomicU64,
    offline: AtomicBool,
}

/// In-memory [`Backend`].
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

fn ready<T: Send + 'static>(result: Result<T, BackendError>) -> BackendFuture<T> {
    Box::pin(future::ready(result))
}

fn unsupported_environment(operation: &str) -> BackendError {
    BackendError::auth(
        "operation-not-supported-in-this-environment",
        format!("{operation} requires an interactive browser environment"),
    )
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store without recording a journal entry.
    pub fn seed(&self, path: &str, value: Value) {
        self.mutate(&[path.to_owned()], |tree| tree.write(path, value));
    }

    /// Current data at `path` (`Value::Null` when absent).
    pub fn value_at(&self, path: &str) -> Value {
        self.tree().get(path)
    }

    pub fn priority_at(&self, path: &str) -> Option<Priority> {
        self.tree().priority(path)
    }

    pub fn current_user(&self) -> Option<User> {
        self.accounts().current_user()
    }

    pub fn persistence(&self) -> Persistence {
        self.accounts().persistence()
    }

    pub fn is_online(&self) -> bool {
        !self.inner.offline.load(Ordering::SeqCst)
    }

    /// Action codes issued for `email`, oldest first (the "inbox").
    pub fn action_codes_for(&self, email: &str) -> Vec<String> {
        self.accounts().codes_for(email)
    }

    /// Issue an email verification code, as a sign-up flow would.
    pub fn issue_email_verification(&self, email: &str) -> Result<String, BackendError> {
        self.accounts().issue_code(email, ActionCodeOperation::VerifyEmail)
    }

    /// SMS code delivered for a pending phone verification.
    pub fn verification_code(&self, verification_id: &str) -> Option<String> {
        self.accounts().verification_code(verification_id)
    }

    // ── Journal ──────────────────────────────────────────────────────

    /// Every recorded call, in issue order.
    pub fn journal(&self) -> Vec<Call> {
        self.inner.journal.lock().expect("journal lock poisoned").clone()
    }

    /// Recorded calls with the given operation name.
    pub fn calls(&self, op: &str) -> Vec<Call> {
        self.journal().into_iter().filter(|c| c.op == op).collect()
    }

    pub fn clear_journal(&self) {
        self.inner.journal.lock().expect("journal lock poisoned").clear();
    }

    /// Number of store listeners currently registered.
    pub fn active_listeners(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Number of registered session listeners.
    pub fn active_session_listeners(&self) -> usize {
        self.inner.session_listeners.len()
    }

    fn record(&self, op: &'static str, path: Option<&str>, args: Value) {
        trace!(op, path, "memory backend call");
        self.inner
            .journal
            .lock()
            .expect("journal lock poisoned")
            .push(Call {
                op,
                path: path.map(str::to_owned),
                args,
            });
    }

    // ── Store internals ──────────────────────────────────────────────

    fn tree(&self) -> std::sync::MutexGuard<'_, Tree> {
        self.inner.tree.lock().expect("tree lock poisoned")
    }

    fn accounts(&self) -> std::sync::MutexGuard<'_, Accounts> {
        self.inner.accounts.lock().expect("accounts lock poisoned")
    }

    /// Apply a write touching `paths` and fan the resulting changes out to
    /// every overlapping listener. Callbacks run after the tree lock is
    /// released.
    fn mutate<T>(&self, paths: &[String], apply: impl FnOnce(&mut Tree) -> T) -> T {
        let mut deliveries: Vec<(SnapshotCallback, Snapshot)> = Vec::new();
        let result = {
            let mut tree = self.tree();
            let watching: Vec<(String, EventKind, SnapshotCallback, Value)> = self
                .inner
                .listeners
                .iter()
                .filter(|l| paths.iter().any(|p| tree::overlaps(&l.path, p)))
                .map(|l| {
                    let before = tree.get(&l.path);
                    (l.path.clone(), l.kind, Arc::clone(&l.callback), before)
                })
                .collect();

            let result = apply(&mut tree);

            for (path, kind, callback, before) in watching {
                for snapshot in tree.changes(kind, &path, &before) {
                    deliveries.push((Arc::clone(&callback), snapshot));
                }
            }
            result
        };

        for (callback, snapshot) in deliveries {
            callback(Ok(Some(snapshot)));
        }
        result
    }

    fn checked_path(path: &str) -> Result<(), BackendError> {
        tree::validate_path(path)
    }

    // ── Session internals ────────────────────────────────────────────

    /// Run an account operation and notify session listeners of any
    /// resulting change to the signed-in principal.
    fn session<T>(
        &self,
        op: impl FnOnce(&mut Accounts) -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        let (result, before, after) = {
            let mut accounts = self.accounts();
            let before = accounts.current_user();
            let result = op(&mut accounts);
            let after = accounts.current_user();
            (result, before, after)
        };

        if before != after {
            let uid_changed =
                before.as_ref().map(|u| &u.uid) != after.as_ref().map(|u| &u.uid);
            self.notify_session(SessionEvent::IdTokenChanged, after.as_ref());
            if uid_changed {
                self.notify_session(SessionEvent::StateChanged, after.as_ref());
            }
        }
        result
    }

    fn notify_session(&self, event: SessionEvent, user: Option<&User>) {
        let callbacks: Vec<SessionCallback> = self
            .inner
            .session_listeners
            .iter()
            .filter(|l| l.event == event)
            .map(|l| Arc::clone(&l.callback))
            .collect();
        debug!(%event, listeners = callbacks.len(), "session change");
        for callback in callbacks {
            callback(Ok(user.cloned()));
        }
    }

    fn next_listener_id(&self) -> ListenerId {
        ListenerId(self.inner.next_listener.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

impl Backend for MemoryBackend {
    // ── Session ──────────────────────────────────────────────────────

    fn apply_action_code(&self, code: &str) -> BackendFuture<()> {
        self.record("applyActionCode", None, json!({ "code": code }));
        ready(self.session(|a| a.apply_code(code)))
    }

    fn check_action_code(&self, code: &str) -> BackendFuture<ActionCodeInfo> {
        self.record("checkActionCode", None, json!({ "code": code }));
        ready(self.accounts().check_code(code))
    }

    fn confirm_password_reset(&self, code: &str, new_password: &Password) -> BackendFuture<()> {
        self.record("confirmPasswordReset", None, json!({ "code": code }));
        ready(self.session(|a| a.confirm_reset(code, new_password)))
    }

    fn create_user_with_email_and_password(
        &self,
        email: &str,
        password: &Password,
    ) -> BackendFuture<UserCredential> {
        self.record(
            "createUserWithEmailAndPassword",
            None,
            json!({ "email": email }),
        );
        ready(self.session(|a| a.create_user(email, password)))
    }

    fn send_password_reset_email(&self, email: &str) -> BackendFuture<()> {
        self.record("sendPasswordResetEmail", None, json!({ "email": email }));
        let issued = self
            .accounts()
            .issue_code(email, ActionCodeOperation::PasswordReset);
        ready(issued.map(|_| ()))
    }

    fn set_persistence(&self, persistence: Persistence) -> BackendFuture<()> {
        self.record(
            "setPersistence",
            None,
            json!({ "persistence": persistence.to_string() }),
        );
        self.accounts().set_persistence(persistence);
        ready(Ok(()))
    }

    fn sign_in_anonymously(&self) -> BackendFuture<UserCredential> {
        self.record("signInAnonymously", None, Value::Null);
        ready(self.session(|a| Ok(a.sign_in_anonymously())))
    }

    fn sign_in_with_credential(&self, credential: &Credential) -> BackendFuture<UserCredential> {
        self.record(
            "signInWithCredential",
            None,
            json!({ "providerId": credential.provider_id }),
        );
        ready(self.session(|a| a.sign_in_with_credential(credential)))
    }

    fn sign_in_with_custom_token(&self, token: &str) -> BackendFuture<UserCredential> {
        self.record("signInWithCustomToken", None, json!({ "token": token }));
        ready(self.session(|a| a.sign_in_with_custom_token(token)))
    }

    fn sign_in_with_email_and_password(
        &self,
        email: &str,
        password: &Password,
    ) -> BackendFuture<UserCredential> {
        self.record(
            "signInWithEmailAndPassword",
            None,
            json!({ "email": email }),
        );
        ready(self.session(|a| a.sign_in_with_password(email, password)))
    }

    fn sign_in_with_phone_number(
        &self,
        phone_number: &str,
        verifier: &str,
    ) -> BackendFuture<String> {
        self.record(
            "signInWithPhoneNumber",
            None,
            json!({ "phoneNumber": phone_number }),
        );
        ready(
            self.accounts()
                .start_phone_verification(phone_number, verifier),
        )
    }

    fn sign_in_with_popup(&self, provider: &AuthProvider) -> BackendFuture<UserCredential> {
        self.record(
            "signInWithPopup",
            None,
            json!({ "providerId": provider.provider_id }),
        );
        ready(Err(unsupported_environment("signInWithPopup")))
    }

    fn sign_in_with_redirect(&self, provider: &AuthProvider) -> BackendFuture<()> {
        self.record(
            "signInWithRedirect",
            None,
            json!({ "providerId": provider.provider_id }),
        );
        ready(Err(unsupported_environment("signInWithRedirect")))
    }

    fn sign_out(&self) -> BackendFuture<()> {
        self.record("signOut", None, Value::Null);
        ready(self.session(|a| {
            a.sign_out();
            Ok(())
        }))
    }

    fn verify_password_reset_code(&self, code: &str) -> BackendFuture<String> {
        self.record("verifyPasswordResetCode", None, json!({ "code": code }));
        ready(self.accounts().verify_reset_code(code))
    }

    fn fetch_providers_for_email(&self, email: &str) -> BackendFuture<Vec<String>> {
        self.record("fetchProvidersForEmail", None, json!({ "email": email }));
        ready(self.accounts().providers_for_email(email))
    }

    fn redirect_result(&self) -> BackendFuture<Option<UserCredential>> {
        self.record("getRedirectResult", None, Value::Null);
        // Redirect flows never start here, so there is never a pending result.
        ready(Ok(None))
    }

    // ── Principal ────────────────────────────────────────────────────

    fn unlink(&self, user: &UserHandle, provider_id: &str) -> BackendFuture<User> {
        self.record(
            "unlink",
            None,
            json!({ "uid": user.uid, "providerId": provider_id }),
        );
        ready(self.session(|a| a.unlink(user, provider_id)))
    }

    fn update_email(&self, user: &UserHandle, email: &str) -> BackendFuture<()> {
        self.record("updateEmail", None, json!({ "uid": user.uid, "email": email }));
        ready(self.session(|a| a.update_email(user, email)))
    }

    fn update_password(&self, user: &UserHandle, new_password: &Password) -> BackendFuture<()> {
        self.record("updatePassword", None, json!({ "uid": user.uid }));
        ready(self.session(|a| a.update_password(user, new_password)))
    }

    fn update_phone_number(
        &self,
        user: &UserHandle,
        credential: &Credential,
    ) -> BackendFuture<()> {
        self.record("updatePhoneNumber", None, json!({ "uid": user.uid }));
        ready(self.session(|a| a.update_phone_number(user, credential)))
    }

    fn update_profile(&self, user: &UserHandle, profile: &ProfileUpdate) -> BackendFuture<()> {
        self.record(
            "updateProfile",
            None,
            json!({
                "uid": user.uid,
                "displayName": profile.display_name,
                "photoURL": profile.photo_url,
            }),
        );
        ready(self.session(|a| a.update_profile(user, profile)))
    }

    // ── Store ────────────────────────────────────────────────────────

    fn go_online(&self) {
        self.record("goOnline", None, Value::Null);
        self.inner.offline.store(false, Ordering::SeqCst);
    }

    fn go_offline(&self) {
        self.record("goOffline", None, Value::Null);
        self.inner.offline.store(true, Ordering::SeqCst);
    }

    fn set(&self, path: &str, value: &Value) -> BackendFuture<()> {
        self.record("set", Some(path), value.clone());
        if let Err(e) = Self::checked_path(path) {
            return ready(Err(e));
        }
        self.mutate(&[path.to_owned()], |tree| {
            tree.clear_priorities_under(path);
            tree.write(path, value.clone());
        });
        ready(Ok(()))
    }

    fn push(&self, path: &str, value: &Value) -> BackendFuture<String> {
        self.record("push", Some(path), value.clone());
        if let Err(e) = Self::checked_path(path) {
            return ready(Err(e));
        }
        let key = self
            .inner
            .push_ids
            .lock()
            .expect("push id lock poisoned")
            .next_id();
        let child = tree::join(path, &key);
        self.mutate(&[child.clone()], |tree| tree.write(&child, value.clone()));
        ready(Ok(key))
    }

    fn remove(&self, path: &str) -> BackendFuture<()> {
        self.record("remove", Some(path), Value::Null);
        if let Err(e) = Self::checked_path(path) {
            return ready(Err(e));
        }
        self.mutate(&[path.to_owned()], |tree| tree.write(path, Value::Null));
        ready(Ok(()))
    }

    fn update(&self, path: &str, values: &Map<String, Value>) -> BackendFuture<()> {
        self.record("update", Some(path), Value::Object(values.clone()));
        let targets: Vec<String> = values.keys().map(|k| tree::join(path, k)).collect();
        if let Some(err) = std::iter::once(path)
            .chain(values.keys().map(String::as_str))
            .find_map(|p| Self::checked_path(p).err())
        {
            return ready(Err(err));
        }
        self.mutate(&targets, |tree| {
            for (target, value) in targets.iter().zip(values.values()) {
                tree.write(target, value.clone());
            }
        });
        ready(Ok(()))
    }

    fn transaction(&self, path: &str, update_fn: UpdateFn) -> BackendFuture<TransactionOutcome> {
        self.record("transaction", Some(path), Value::Null);
        if let Err(e) = Self::checked_path(path) {
            return ready(Err(e));
        }
        let outcome = self.mutate(&[path.to_owned()], |tree| {
            let current = tree.get(path);
            let committed = match update_fn.apply(current) {
                Some(next) => {
                    tree.write(path, next);
                    true
                }
                None => false,
            };
            TransactionOutcome {
                committed,
                snapshot: tree.snapshot(path),
            }
        });
        ready(Ok(outcome))
    }

    fn set_priority(&self, path: &str, priority: &Priority) -> BackendFuture<()> {
        self.record("setPriority", Some(path), json!(priority));
        if let Err(e) = Self::checked_path(path) {
            return ready(Err(e));
        }
        self.mutate(&[path.to_owned()], |tree| {
            tree.set_priority(path, priority.clone());
        });
        ready(Ok(()))
    }

    fn set_with_priority(
        &self,
        path: &str,
        value: &Value,
        priority: &Priority,
    ) -> BackendFuture<()> {
        self.record(
            "setWithPriority",
            Some(path),
            json!({ "value": value, "priority": priority }),
        );
        if let Err(e) = Self::checked_path(path) {
            return ready(Err(e));
        }
        self.mutate(&[path.to_owned()], |tree| {
            tree.clear_priorities_under(path);
            tree.write(path, value.clone());
            tree.set_priority(path, priority.clone());
        });
        ready(Ok(()))
    }

    // ── Notifications ────────────────────────────────────────────────

    fn listen(&self, path: &str, kind: EventKind, callback: SnapshotCallback) -> ListenerId {
        let id = self.next_listener_id();
        self.record(
            "listen",
            Some(path),
            json!({ "kind": kind.to_string(), "id": id.0 }),
        );

        if let Err(e) = Self::checked_path(path) {
            callback(Err(e));
            return id;
        }

        // Register under the tree lock so no write slips between the
        // initial snapshot and the first change notification.
        let initial = {
            let tree = self.tree();
            self.inner.listeners.insert(
                id,
                DataListener {
                    path: path.to_owned(),
                    kind,
                    callback: Arc::clone(&callback),
                },
            );
            tree.initial(kind, path)
        };
        debug!(%id, path, %kind, "listener registered");
        for snapshot in initial {
            callback(Ok(Some(snapshot)));
        }
        id
    }

    fn unlisten(&self, path: &str, kind: EventKind, id: ListenerId) {
        self.record(
            "unlisten",
            Some(path),
            json!({ "kind": kind.to_string(), "id": id.0 }),
        );
        if self.inner.listeners.remove(&id).is_some() {
            debug!(%id, path, %kind, "listener removed");
        }
    }

    fn listen_session(&self, event: SessionEvent, callback: SessionCallback) -> ListenerId {
        let id = self.next_listener_id();
        self.record(
            "listenSession",
            None,
            json!({ "event": event.to_string(), "id": id.0 }),
        );
        let current = self.accounts().current_user();
        self.inner.session_listeners.insert(
            id,
            SessionListener {
                event,
                callback: Arc::clone(&callback),
            },
        );
        callback(Ok(current));
        id
    }

    fn unlisten_session(&self, id: ListenerId) {
        self.record("unlistenSession", None, json!({ "id": id.0 }));
        if let Some((_, listener)) = self.inner.session_listeners.remove(&id) {
            debug!(%id, event = %listener.event, "session listener removed");
        }
    }
}

impl Connector for MemoryBackend {
    fn connect(
        &self,
        config: &BackendConfig,
        instance: &str,
    ) -> Result<Arc<dyn Backend>, BackendError> {
        debug!(
            instance,
            project = %config.project_id,
            database = %config.database_url,
            "connecting in-memory backend"
        );
        Ok(Arc::new(self.clone()))
    }
}
