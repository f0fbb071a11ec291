// ── Driver construction parameters ──
//
// A `DriverConfig` names the driver instance and carries the connection
// parameters handed to the backend connector. The core never reads
// config files and never interprets `BackendConfig` beyond forwarding it.

use blaze_backend::BackendConfig;

/// Instance name used when a config does not set one.
pub const DEFAULT_INSTANCE: &str = "[DEFAULT]";

/// Configuration for one driver instance.
///
/// Built by the CLI (or any embedding application) and passed to
/// [`Registry::make_driver`](crate::Registry::make_driver).
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Instance name; `None` selects [`DEFAULT_INSTANCE`]. Independent
    /// instances can target different projects side by side.
    pub instance_name: Option<String>,
    /// Project / connection parameters, forwarded to the connector as is.
    pub backend: BackendConfig,
}

impl DriverConfig {
    pub fn new(backend: BackendConfig) -> Self {
        Self {
            instance_name: None,
            backend,
        }
    }

    pub fn with_instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = Some(name.into());
        self
    }

    /// Effective instance name.
    pub fn instance_name(&self) -> &str {
        self.instance_name.as_deref().unwrap_or(DEFAULT_INSTANCE)
    }
}
