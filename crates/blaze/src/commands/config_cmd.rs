//! Config subcommand handlers.

use blaze_config::ConfigError;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;

const REDACTED: &str = "********";

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            let path = global
                .config
                .clone()
                .unwrap_or_else(blaze_config::config_path);
            println!("{}", path.display());
            Ok(())
        }

        ConfigCommand::Show => {
            let mut cfg = super::load_config(global)?;
            for profile in cfg.instances.values_mut() {
                if profile.api_key.is_some() {
                    profile.api_key = Some(REDACTED.into());
                }
            }
            let rendered = toml::to_string_pretty(&cfg).map_err(ConfigError::from)?;
            print!("{rendered}");
            Ok(())
        }

        ConfigCommand::SetKey { instance } => {
            let mut key = String::new();
            std::io::stdin().read_line(&mut key)?;
            let key = key.trim();
            if key.is_empty() {
                return Err(CliError::Validation {
                    field: "api_key".into(),
                    reason: "API key cannot be empty".into(),
                });
            }
            blaze_config::store_api_key(&instance, key)?;
            eprintln!("API key for '{instance}' stored in system keyring");
            Ok(())
        }
    }
}
