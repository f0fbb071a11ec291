// ── Driver error types ──
//
// Every failure is delivered on the stream tied to the operation that
// caused it. There is no global error channel: a Result Stream carries
// its command's error, a reference subscription carries its listener's
// error, and only driver construction returns errors directly.

use blaze_backend::BackendError;
use thiserror::Error;

/// Unified error type for the core crate.
///
/// `Clone` so a single failure can be replayed to every subscriber of the
/// stream it terminated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    // ── Dispatch errors ──────────────────────────────────────────────
    #[error("Unknown command: no route for tag '{tag}'")]
    UnknownCommand { tag: String },

    #[error("Backend rejected operation: {0}")]
    BackendOperation(#[source] BackendError),

    // ── Listener errors ──────────────────────────────────────────────
    #[error("Listener for {kind} events on '{path}' failed: {source}")]
    Subscription {
        path: String,
        kind: String,
        #[source]
        source: BackendError,
    },

    // ── Construction errors ──────────────────────────────────────────
    #[error("Driver instance '{name}' is already initialized")]
    DuplicateInstance { name: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Cannot connect backend: {0}")]
    Connect(#[source] BackendError),

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Stream closed before producing an outcome")]
    Closed,
}

impl DriverError {
    /// Errors returned synchronously from driver construction or
    /// reference resolution, as opposed to errors carried by a stream.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::DuplicateInstance { .. } | Self::Config { .. } | Self::Connect(_)
        )
    }

    /// The backend error behind this failure, if any.
    pub fn backend_error(&self) -> Option<&BackendError> {
        match self {
            Self::BackendOperation(e) | Self::Connect(e) | Self::Subscription { source: e, .. } => {
                Some(e)
            }
            Self::UnknownCommand { .. }
            | Self::DuplicateInstance { .. }
            | Self::Config { .. }
            | Self::Closed => None,
        }
    }
}

impl From<BackendError> for DriverError {
    fn from(err: BackendError) -> Self {
        Self::BackendOperation(err)
    }
}
