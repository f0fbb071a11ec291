//! Reactive binding layer between a command stream and a session + store
//! backend.
//!
//! - **[`Command`]**: immutable record of one backend operation, with an
//!   optional category. Decodes from tagged JSON; unknown tags decode to
//!   [`CommandKind::Unrecognized`] and fail on their own Result Stream.
//!
//! - **[`ActionRouter`]**: exhaustive `match` from command to backend
//!   call. The call is issued at dispatch time, so issue order equals
//!   command order.
//!
//! - **[`ResultStream`]** / **[`Selection`]**: one replaying,
//!   single-outcome stream per dispatched command, fanned out through the
//!   [`ResultMultiplexer`] and filtered by category.
//!
//! - **[`Database`]** / **[`Reference`]**: normalized store coordinates.
//!   [`EventStream::subscribe`] attaches to a ref-counted hub per
//!   `(path, kind)`: one backend listener for any number of subscribers,
//!   removed when the last one detaches.
//!
//! - **[`Auth`]**: session state and identity token replay streams, plus
//!   provider lookup and redirect results.
//!
//! - **[`Registry`]** / **[`Driver`]** / **[`Source`]**: construction per
//!   instance name and the composed surface the application reads.

pub mod auth;
pub mod command;
pub mod config;
pub mod driver;
pub mod error;
pub mod path;
pub mod reference;
pub mod replay;
pub mod result;
pub mod router;

// ── Primary re-exports ──────────────────────────────────────────────
pub use auth::Auth;
pub use command::{Command, CommandKind, CommandOutput, factory};
pub use config::{DEFAULT_INSTANCE, DriverConfig};
pub use driver::{Driver, Registry, Source};
pub use error::DriverError;
pub use reference::{Database, EventStream, Reference, Subscription};
pub use replay::{Outcome, ReplayStream};
pub use result::{ResultMultiplexer, ResultStream, Selection};
pub use router::{ActionRouter, PendingOutcome};

// Backend types that appear in this crate's public API.
pub use blaze_backend::{
    Backend, BackendConfig, BackendError, Connector, EventKind, Persistence, Priority, User,
    UserCredential, UserHandle,
};
