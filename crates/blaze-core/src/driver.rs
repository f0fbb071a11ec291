// ── Driver entry point ──
//
// `Registry::make_driver` connects one backend per instance name and
// wires the auth sources and reference multiplexer against it.
// `Driver::run` attaches a command stream and returns the `Source` the
// application reads from.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use blaze_backend::{Backend, Connector};
use futures_core::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::auth::Auth;
use crate::command::Command;
use crate::config::DriverConfig;
use crate::error::DriverError;
use crate::reference::Database;
use crate::result::{ResultMultiplexer, Selection};
use crate::router::ActionRouter;

// ── Registry ─────────────────────────────────────────────────────────

/// Tracks which instance names have a live driver.
///
/// An explicit value owned by the application; independent registries
/// do not see each other's names.
#[derive(Clone, Default)]
pub struct Registry {
    names: Arc<Mutex<HashSet<String>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a backend and build a driver for `config`'s instance name.
    ///
    /// Fails with [`DriverError::DuplicateInstance`] if the name is
    /// already taken in this registry; the existing driver is untouched.
    pub fn make_driver(
        &self,
        config: DriverConfig,
        connector: &dyn Connector,
    ) -> Result<Driver, DriverError> {
        let instance = config.instance_name().to_owned();
        if !self.names().insert(instance.clone()) {
            return Err(DriverError::DuplicateInstance { name: instance });
        }

        let backend = match connector.connect(&config.backend, &instance) {
            Ok(backend) => backend,
            Err(e) => {
                self.release(&instance);
                return Err(DriverError::Connect(e));
            }
        };

        let auth = Auth::attach(Arc::clone(&backend));
        let database = Database::new(Arc::clone(&backend), config.backend.database_url.clone());
        info!(
            instance = %instance,
            project = %config.backend.project_id,
            "driver initialized"
        );

        Ok(Driver {
            instance,
            config,
            backend,
            auth,
            database,
        })
    }

    /// Free `name` for reuse. Returns `false` if it was not registered.
    pub fn release(&self, name: &str) -> bool {
        let released = self.names().remove(name);
        if released {
            debug!(instance = name, "driver instance released");
        }
        released
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names().contains(name)
    }

    fn names(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.names.lock().expect("registry lock poisoned")
    }
}

// ── Driver ───────────────────────────────────────────────────────────

/// One connected driver instance.
pub struct Driver {
    instance: String,
    config: DriverConfig,
    backend: Arc<dyn Backend>,
    auth: Auth,
    database: Database,
}

impl Driver {
    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Shared backend handle.
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Attach `commands` and return the composed source.
    ///
    /// Commands are dispatched in arrival order on a background task, so
    /// this must be called from within a tokio runtime. Selections only
    /// see commands dispatched after they were created: select first,
    /// then feed the command stream.
    pub fn run<S>(&self, commands: S) -> Source
    where
        S: Stream<Item = Command> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let router = ActionRouter::new(Arc::clone(&self.backend));
        let results = ResultMultiplexer::attach(router, commands, cancel.clone());
        debug!(instance = %self.instance, "command stream attached");
        Source {
            auth: self.auth.clone(),
            database: self.database.clone(),
            results,
            cancel,
        }
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("instance", &self.instance)
            .field("project", &self.config.backend.project_id)
            .finish_non_exhaustive()
    }
}

// ── Source ───────────────────────────────────────────────────────────

/// What the application reads from a running driver.
///
/// Dropping the source stops dispatching further commands; commands
/// already dispatched still complete.
pub struct Source {
    auth: Auth,
    database: Database,
    results: ResultMultiplexer,
    cancel: CancellationToken,
}

impl Source {
    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Result Streams of commands dispatched from now on, optionally
    /// filtered by category.
    pub fn select(&self, category: Option<&str>) -> Selection {
        self.results.select(category)
    }

    /// Resolves once the command stream has ended and every command in
    /// it has been dispatched.
    pub async fn dispatched(&self) {
        self.results.dispatched().await;
    }

    /// Stop consuming the command stream.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Source {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
