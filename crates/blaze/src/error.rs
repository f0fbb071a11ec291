//! CLI error types with miette diagnostics.

use miette::Diagnostic;
use thiserror::Error;

use blaze_config::ConfigError;
use blaze_core::DriverError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFIG: i32 = 5;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Script ───────────────────────────────────────────────────────

    #[error("Invalid command on line {line}: {source}")]
    #[diagnostic(
        code(blaze::script),
        help("Each line must be a JSON object with a \"tag\" field, e.g. {{\"tag\": \"Set\", \"refPath\": \"a\", \"value\": 1}}")
    )]
    Script {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("{failed} of {total} commands failed")]
    #[diagnostic(code(blaze::commands_failed))]
    CommandsFailed { failed: usize, total: usize },

    // ── Driver ───────────────────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(code(blaze::driver))]
    Driver(#[from] DriverError),

    // ── Configuration ────────────────────────────────────────────────

    #[error("Instance '{name}' not found in configuration")]
    #[diagnostic(
        code(blaze::instance_not_found),
        help("Available instances: {available}")
    )]
    InstanceNotFound { name: String, available: String },

    #[error("No API key configured for instance '{instance}'")]
    #[diagnostic(
        code(blaze::no_credentials),
        help(
            "Store one with: blaze config set-key {instance}\n\
             Or set api_key_env in the instance profile."
        )
    )]
    NoCredentials { instance: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(blaze::validation))]
    Validation { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(code(blaze::config))]
    Config(ConfigError),

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(blaze::json), help("Check the JSON file contents and try again."))]
    Json(#[from] serde_json::Error),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { instance } => Self::NoCredentials { instance },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(other),
        }
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Script { .. } | Self::Validation { .. } => exit_code::USAGE,
            Self::NoCredentials { .. } => exit_code::AUTH,
            Self::InstanceNotFound { .. } => exit_code::NOT_FOUND,
            Self::Config(_) => exit_code::CONFIG,
            Self::Driver(err) if err.is_config() => exit_code::CONFIG,
            _ => exit_code::GENERAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_map_to_cli_variants() {
        let err = CliError::from(ConfigError::NoCredentials {
            instance: "prod".into(),
        });
        assert_eq!(err.exit_code(), exit_code::AUTH);

        let err = CliError::from(ConfigError::Validation {
            field: "database_url".into(),
            reason: "bad".into(),
        });
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }

    #[test]
    fn duplicate_instance_is_a_config_failure() {
        let err = CliError::from(DriverError::DuplicateInstance {
            name: "[DEFAULT]".into(),
        });
        assert_eq!(err.exit_code(), exit_code::CONFIG);
        assert_eq!(
            CliError::CommandsFailed { failed: 1, total: 2 }.exit_code(),
            exit_code::GENERAL
        );
    }
}
