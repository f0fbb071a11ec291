//! `blaze run`: dispatch a JSON-lines script through a driver.

use std::path::{Path, PathBuf};

use futures_util::stream::{BoxStream, SelectAll};
use futures_util::{FutureExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};
use url::Url;

use blaze_backend::MemoryBackend;
use blaze_config::{Config, ConfigError};
use blaze_core::{BackendConfig, Command, DriverConfig, DriverError, Registry};

use crate::cli::{GlobalOpts, RunArgs};
use crate::error::CliError;
use crate::output;

const COMMAND_BUFFER: usize = 64;
const LOCAL_DATABASE_URL: &str = "http://localhost:9000";

type WatchEvent = (String, Result<Value, DriverError>);

pub async fn handle(args: RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let commands = read_script(&args.script)?;
    let cfg = super::load_config(global)?;
    let format = output::resolve_format(global.output, &cfg.defaults.output);
    let (driver_config, profile_seed) = driver_config(&cfg, args.instance.as_deref())?;

    let memory = MemoryBackend::new();
    if let Some(path) = args.seed.as_deref().or(profile_seed.as_deref()) {
        let document: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        debug!(path = %path.display(), "seeding store");
        memory.seed("", document);
    }

    let driver = Registry::new().make_driver(driver_config, &memory)?;
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let source = driver.run(ReceiverStream::new(rx));
    let mut results = source.select(None);

    let mut watches: SelectAll<BoxStream<'static, WatchEvent>> = SelectAll::new();
    for path in &args.watch {
        let reference = source.database().reference(path);
        let label = reference.path().to_owned();
        watches.push(
            reference
                .value()
                .subscribe()
                .map(move |event| (label.clone(), event))
                .boxed(),
        );
    }

    // Selection and watches exist before the first command is sent.
    tokio::spawn(async move {
        for command in commands {
            if tx.send(command).await.is_err() {
                break;
            }
        }
    });

    let mut total = 0;
    let mut failed = 0;
    loop {
        tokio::select! {
            biased;
            Some((path, event)) = watches.next() => {
                output::emit(format, &output::watch_record(&path, &event))?;
            }
            next = results.next() => {
                let Some(result) = next else { break };
                let outcome = result.outcome().await;
                if let Err(err) = &outcome {
                    debug!(command = %result.command(), error = %err, "command failed");
                    failed += 1;
                }
                if args.category.is_none() || result.category() == args.category.as_deref() {
                    output::emit(format, &output::outcome_record(total, &result, &outcome))?;
                }
                total += 1;
            }
        }
    }

    // Events already delivered for the final writes.
    while let Some(Some((path, event))) = watches.next().now_or_never() {
        output::emit(format, &output::watch_record(&path, &event))?;
    }

    info!(total, failed, "script complete");
    if failed > 0 {
        return Err(CliError::CommandsFailed { failed, total });
    }
    Ok(())
}

// ── Script parsing ──────────────────────────────────────────────────

fn read_script(path: &Path) -> Result<Vec<Command>, CliError> {
    let text = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin())?
    } else {
        std::fs::read_to_string(path)?
    };
    parse_script(&text)
}

/// One JSON command per line; blank lines and `#` comments are skipped.
fn parse_script(text: &str) -> Result<Vec<Command>, CliError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|source| CliError::Script {
                line: index + 1,
                source,
            })
        })
        .collect()
}

// ── Driver configuration ────────────────────────────────────────────

/// Driver config and seed file for the selected instance. With no
/// instances configured and none requested, runs against a local store.
fn driver_config(
    cfg: &Config,
    instance: Option<&str>,
) -> Result<(DriverConfig, Option<PathBuf>), CliError> {
    match cfg.instance(instance) {
        Ok((name, profile)) => Ok((
            blaze_config::profile_to_driver_config(profile, name)?,
            profile.seed.clone(),
        )),
        Err(ConfigError::UnknownInstance { .. })
            if instance.is_none() && cfg.instances.is_empty() =>
        {
            Ok((local_config()?, None))
        }
        Err(ConfigError::UnknownInstance { instance }) => {
            let mut names: Vec<&str> = cfg.instances.keys().map(String::as_str).collect();
            names.sort_unstable();
            Err(CliError::InstanceNotFound {
                name: instance,
                available: if names.is_empty() {
                    "(none)".into()
                } else {
                    names.join(", ")
                },
            })
        }
        Err(other) => Err(other.into()),
    }
}

fn local_config() -> Result<DriverConfig, CliError> {
    let database_url = Url::parse(LOCAL_DATABASE_URL).map_err(|e| CliError::Validation {
        field: "database_url".into(),
        reason: e.to_string(),
    })?;
    Ok(DriverConfig::new(BackendConfig {
        api_key: String::from("local").into(),
        auth_domain: "localhost".into(),
        database_url,
        project_id: "local".into(),
        storage_bucket: None,
        messaging_sender_id: None,
    }))
}
