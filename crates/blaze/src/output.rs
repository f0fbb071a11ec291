//! Line-oriented JSON rendering for command outcomes and watch events.

use std::io::Write;

use serde_json::{Value, json};

use blaze_core::{CommandOutput, DriverError, ResultStream};

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Resolve the output format: flag, then the config default.
pub fn resolve_format(flag: Option<OutputFormat>, configured: &str) -> OutputFormat {
    flag.unwrap_or(match configured {
        "pretty" => OutputFormat::Pretty,
        _ => OutputFormat::Json,
    })
}

/// JSON record for one settled Result Stream.
pub fn outcome_record(
    index: usize,
    result: &ResultStream,
    outcome: &Result<CommandOutput, DriverError>,
) -> Value {
    let mut record = json!({
        "index": index,
        "command": result.command().tag(),
        "category": result.category(),
    });
    match outcome {
        Ok(output) => {
            record["status"] = json!("ok");
            record["output"] = serde_json::to_value(output).unwrap_or(Value::Null);
        }
        Err(err) => {
            record["status"] = json!("error");
            record["error"] = error_record(err);
        }
    }
    record
}

/// JSON record for one watched-path event.
pub fn watch_record(path: &str, event: &Result<Value, DriverError>) -> Value {
    match event {
        Ok(value) => json!({ "watch": path, "value": value }),
        Err(err) => json!({ "watch": path, "error": error_record(err) }),
    }
}

fn error_record(err: &DriverError) -> Value {
    json!({
        "code": err.backend_error().map(|e| e.code.clone()),
        "message": err.to_string(),
    })
}

pub fn emit(format: OutputFormat, record: &Value) -> Result<(), CliError> {
    let mut stdout = std::io::stdout().lock();
    match format {
        OutputFormat::Json => serde_json::to_writer(&mut stdout, record)?,
        OutputFormat::Pretty => serde_json::to_writer_pretty(&mut stdout, record)?,
    }
    writeln!(stdout)?;
    Ok(())
}
