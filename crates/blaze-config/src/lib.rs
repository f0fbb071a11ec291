//! Shared configuration for blaze.
//!
//! TOML instance profiles, API key resolution (env + keyring + plaintext),
//! and translation to `blaze_core::DriverConfig`. The core never reads
//! config files; the CLI builds a `DriverConfig` through this crate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use blaze_core::{BackendConfig, DriverConfig};

/// Keyring service name; entries are `<instance>/api-key`.
const KEYRING_SERVICE: &str = "blaze";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no instance named '{instance}' in config")]
    UnknownInstance { instance: String },

    #[error("no API key configured for instance '{instance}'")]
    NoCredentials { instance: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Instance used when none is named on the command line.
    pub default_instance: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named driver instances.
    #[serde(default)]
    pub instances: HashMap<String, InstanceProfile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_instance: Some("default".into()),
            defaults: Defaults::default(),
            instances: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, or the default instance when `name` is `None`.
    pub fn instance(&self, name: Option<&str>) -> Result<(&str, &InstanceProfile), ConfigError> {
        let wanted = name
            .or(self.default_instance.as_deref())
            .unwrap_or("default");
        self.instances
            .get_key_value(wanted)
            .map(|(name, profile)| (name.as_str(), profile))
            .ok_or_else(|| ConfigError::UnknownInstance {
                instance: wanted.into(),
            })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// Result rendering: "json" (one object per line) or "pretty".
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
        }
    }
}

fn default_output() -> String {
    "json".into()
}
fn default_color() -> String {
    "auto".into()
}

/// Connection parameters for one named driver instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstanceProfile {
    /// Database URL (e.g., "https://demo.example.com").
    pub database_url: String,

    pub project_id: String,

    /// Session service domain; defaults to `<project_id>.firebaseapp.com`.
    pub auth_domain: Option<String>,

    /// API key (plaintext; prefer keyring or env var).
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,

    pub storage_bucket: Option<String>,

    pub messaging_sender_id: Option<String>,

    /// JSON document loaded into the in-memory store before a run.
    pub seed: Option<PathBuf>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "blaze", "blaze").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("blaze");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load Config from `path` + environment. A missing file yields the
/// defaults, overridden by any `BLAZE_` variables.
///
/// Nested keys use a double underscore:
/// `BLAZE_INSTANCES__DEFAULT__PROJECT_ID=demo`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("BLAZE_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve an instance's API key: named env var, then system keyring,
/// then plaintext in the config.
pub fn resolve_api_key(
    profile: &InstanceProfile,
    instance: &str,
) -> Result<SecretString, ConfigError> {
    // 1. Profile's api_key_env → env var lookup
    if let Some(ref env_name) = profile.api_key_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{instance}/api-key")) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref key) = profile.api_key {
        return Ok(SecretString::from(key.clone()));
    }

    Err(ConfigError::NoCredentials {
        instance: instance.into(),
    })
}

/// Store an instance's API key in the system keyring.
pub fn store_api_key(instance: &str, key: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &format!("{instance}/api-key")).map_err(
        |e| ConfigError::Validation {
            field: "keyring".into(),
            reason: format!("failed to access keyring: {e}"),
        },
    )?;
    entry.set_password(key).map_err(|e| ConfigError::Validation {
        field: "keyring".into(),
        reason: format!("failed to store API key in keyring: {e}"),
    })?;
    debug!(instance, "API key stored in keyring");
    Ok(())
}

/// Build a `DriverConfig` for the named instance profile.
pub fn profile_to_driver_config(
    profile: &InstanceProfile,
    instance: &str,
) -> Result<DriverConfig, ConfigError> {
    let database_url: Url = profile
        .database_url
        .parse()
        .map_err(|_| ConfigError::Validation {
            field: "database_url".into(),
            reason: format!("invalid URL: {}", profile.database_url),
        })?;
    if database_url.host_str().is_none() {
        return Err(ConfigError::Validation {
            field: "database_url".into(),
            reason: format!("URL has no host: {}", profile.database_url),
        });
    }

    if profile.project_id.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "project_id".into(),
            reason: "must not be empty".into(),
        });
    }

    let api_key = resolve_api_key(profile, instance)?;
    let auth_domain = profile
        .auth_domain
        .clone()
        .unwrap_or_else(|| format!("{}.firebaseapp.com", profile.project_id));

    Ok(DriverConfig::new(BackendConfig {
        api_key,
        auth_domain,
        database_url,
        project_id: profile.project_id.clone(),
        storage_bucket: profile.storage_bucket.clone(),
        messaging_sender_id: profile.messaging_sender_id.clone(),
    })
    .with_instance_name(instance))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> InstanceProfile {
        InstanceProfile {
            database_url: "https://demo.example.com".into(),
            project_id: "demo".into(),
            auth_domain: None,
            api_key: Some("plain-key".into()),
            api_key_env: None,
            storage_bucket: None,
            messaging_sender_id: None,
            seed: None,
        }
    }

    #[test]
    fn auth_domain_defaults_from_project() {
        let config = profile_to_driver_config(&profile(), "blaze-test-auth-domain");
        let config = config.expect("profile should resolve");
        assert_eq!(config.backend.auth_domain, "demo.firebaseapp.com");
        assert_eq!(config.instance_name(), "blaze-test-auth-domain");
    }

    #[test]
    fn database_url_must_have_a_host() {
        let mut bad = profile();
        bad.database_url = "not a url".into();
        let err = profile_to_driver_config(&bad, "blaze-test-bad-url");
        assert!(matches!(err, Err(ConfigError::Validation { ref field, .. }) if field == "database_url"));
    }

    #[test]
    fn missing_key_is_reported() {
        let mut keyless = profile();
        keyless.api_key = None;
        let err = resolve_api_key(&keyless, "blaze-test-no-key");
        assert!(matches!(err, Err(ConfigError::NoCredentials { ref instance }) if instance == "blaze-test-no-key"));
    }

    #[test]
    fn unknown_instance_lookup() {
        let config = Config::default();
        assert!(matches!(
            config.instance(None),
            Err(ConfigError::UnknownInstance { ref instance }) if instance == "default"
        ));
    }
}
