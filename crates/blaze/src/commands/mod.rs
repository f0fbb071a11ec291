//! Subcommand handlers.

pub mod config_cmd;
pub mod run;

use blaze_config::Config;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Load the config named by `--config`, or the platform default.
fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    let path = global
        .config
        .clone()
        .unwrap_or_else(blaze_config::config_path);
    Ok(blaze_config::load_config_from(&path)?)
}
