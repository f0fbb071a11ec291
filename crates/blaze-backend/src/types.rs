// ── Wire-level types shared by every backend ──
//
// Snapshots, principals, credentials and the callback shapes handed to
// `Backend::listen` / `Backend::listen_session`. Field names serialize in
// camelCase to match the JSON command scripts consumed by the CLI.

use std::fmt;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use strum::{Display, EnumString, IntoStaticStr};
use url::Url;

use crate::error::BackendError;

// ── Store notifications ─────────────────────────────────────────────

/// Kind of change notification a listener registers for on a path.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    /// Full value of the location, on every change.
    Value,
    ChildAdded,
    ChildChanged,
    ChildRemoved,
    ChildMoved,
}

/// Session-level notification kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum SessionEvent {
    /// Fires when the signed-in principal changes (sign-in / sign-out).
    StateChanged,
    /// Fires whenever the principal's identity token changes, including
    /// sign-in, sign-out and profile updates.
    IdTokenChanged,
}

/// Ordering priority attached to a store location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Priority {
    Number(f64),
    Text(String),
}

/// Point-in-time view of a store location delivered to listeners.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Normalized path of the location (`""` for the root).
    pub path: String,
    /// Last path segment, or `None` for the root.
    pub key: Option<String>,
    pub value: Value,
    pub priority: Option<Priority>,
}

impl Snapshot {
    pub fn new(path: &str, value: Value, priority: Option<Priority>) -> Self {
        let key = path.rsplit('/').next().filter(|k| !k.is_empty()).map(str::to_owned);
        Self {
            path: path.to_owned(),
            key,
            value,
            priority,
        }
    }

    /// The payload at this location (`Value::Null` when absent).
    pub fn val(&self) -> &Value {
        &self.value
    }

    pub fn into_val(self) -> Value {
        self.value
    }

    pub fn exists(&self) -> bool {
        !self.value.is_null()
    }
}

/// Outcome of a transaction: whether the update function committed and
/// the resulting data at the location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionOutcome {
    pub committed: bool,
    pub snapshot: Snapshot,
}

/// Update function applied by a transaction.
///
/// Receives the current value (`Value::Null` when absent) and returns the
/// new value, or `None` to abort. Compared by identity so commands that
/// carry one keep structural `PartialEq`.
#[derive(Clone)]
pub struct UpdateFn(Arc<dyn Fn(Value) -> Option<Value> + Send + Sync>);

impl UpdateFn {
    pub fn new(f: impl Fn(Value) -> Option<Value> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn apply(&self, current: Value) -> Option<Value> {
        (self.0)(current)
    }
}

impl PartialEq for UpdateFn {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for UpdateFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UpdateFn(..)")
    }
}

// ── Session types ───────────────────────────────────────────────────

/// How long a signed-in session survives.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Persistence {
    /// Survives restarts.
    #[default]
    Local,
    /// Cleared when the current session ends.
    Session,
    /// In memory only.
    None,
}

/// A password carried by a command or backend call.
///
/// Wraps [`SecretString`] so it never shows up in `Debug` output, while
/// still comparing by content (commands compare field-by-field).
#[derive(Clone)]
pub struct Password(SecretString);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(SecretString::from(password.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl PartialEq for Password {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password([REDACTED])")
    }
}

impl<'de> Deserialize<'de> for Password {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// A signed-in (or previously signed-in) principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uid: String,
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub phone_number: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
    /// Linked sign-in providers (`"password"`, `"phone"`, `"google.com"`, ...).
    #[serde(default)]
    pub provider_ids: Vec<String>,
}

impl User {
    pub fn handle(&self) -> UserHandle {
        UserHandle {
            uid: self.uid.clone(),
        }
    }
}

/// Reference to a principal by id, carried by principal commands.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserHandle {
    pub uid: String,
}

impl UserHandle {
    pub fn new(uid: impl Into<String>) -> Self {
        Self { uid: uid.into() }
    }
}

/// Result of a successful sign-in or account creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCredential {
    pub user: User,
    pub provider_id: Option<String>,
    pub is_new_user: bool,
}

/// Provider-issued credential used to sign in or to update a principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub provider_id: String,
    /// OAuth / id token for federated providers.
    pub token: Option<String>,
    /// Phone verification id returned by `sign_in_with_phone_number`.
    pub verification_id: Option<String>,
    /// Code delivered to the phone.
    pub verification_code: Option<String>,
}

impl Credential {
    pub fn oauth(provider_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            token: Some(token.into()),
            verification_id: None,
            verification_code: None,
        }
    }

    pub fn phone(verification_id: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            provider_id: "phone".into(),
            token: None,
            verification_id: Some(verification_id.into()),
            verification_code: Some(code.into()),
        }
    }
}

/// Federated identity provider used for popup / redirect flows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthProvider {
    pub provider_id: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl AuthProvider {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            scopes: Vec::new(),
        }
    }
}

/// Fields to change on a principal's profile; `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

/// Purpose of an out-of-band action code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionCodeOperation {
    PasswordReset,
    VerifyEmail,
}

/// Metadata about an action code, as returned by `check_action_code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionCodeInfo {
    pub operation: ActionCodeOperation,
    pub email: String,
}

// ── Listener plumbing ───────────────────────────────────────────────

/// Opaque id returned by listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Callback for store notifications. `Ok(None)` is an absent notification.
pub type SnapshotCallback = Arc<dyn Fn(Result<Option<Snapshot>, BackendError>) + Send + Sync>;

/// Callback for session notifications. `Ok(None)` means signed out.
pub type SessionCallback = Arc<dyn Fn(Result<Option<User>, BackendError>) + Send + Sync>;

// ── Connection parameters ───────────────────────────────────────────

/// Project / connection parameters forwarded to a [`Connector`](crate::Connector).
///
/// The core never interprets these beyond handing them over.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub api_key: SecretString,
    pub auth_domain: String,
    pub database_url: Url,
    pub project_id: String,
    pub storage_bucket: Option<String>,
    pub messaging_sender_id: Option<String>,
}
