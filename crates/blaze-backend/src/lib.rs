// blaze-backend: Collaborator interface for session + hierarchical store services
//
// `blaze-core` drives everything through the object-safe [`Backend`]
// trait defined here. [`MemoryBackend`] is a complete in-process
// implementation used by the CLI's offline mode and by the test suites.

pub mod backend;
pub mod error;
pub mod memory;
pub mod types;

pub use backend::{Backend, BackendFuture, Connector};
pub use error::BackendError;
pub use memory::{Call, MemoryBackend};
pub use types::{
    ActionCodeInfo, ActionCodeOperation, AuthProvider, BackendConfig, Credential, EventKind,
    ListenerId, Password, Persistence, Priority, ProfileUpdate, SessionCallback, SessionEvent,
    Snapshot, SnapshotCallback, TransactionOutcome, UpdateFn, User, UserCredential, UserHandle,
};
