//! Purpose: `pdhlink` CLI entry point: probe the PDH binding and run one-shot queries.
//! Role: Binary crate root; parses args, configures the facade, emits JSON on stdout.
//! Invariants: Successful commands print exactly one JSON document on stdout.
//! Invariants: Errors are emitted as JSON on stderr (plain text on a terminal).
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: Every command that touches the library holds one `Attachment` for its duration.
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

use pdhlink::api::query::{self, CounterQuery};
use pdhlink::api::{
    BindingConfig, CounterPathElements, Error, ErrorKind, PdhStatus, pdh, status_name,
    to_exit_code,
};

#[derive(Parser)]
#[command(
    name = "pdhlink",
    version,
    about = "Probe and query the Performance Data Helper library"
)]
struct Cli {
    /// Library to bind (overrides --config and PDHLINK_LIBRARY).
    #[arg(long, global = true)]
    library: Option<String>,
    /// JSON config file, e.g. {"library": "pdh.dll"}.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Attach, report which entry points resolved, then detach.
    Probe {
        /// Fail unless every entry point resolved.
        #[arg(long)]
        require: bool,
    },
    /// Classify a status code (decimal or 0x-prefixed hex).
    Status { code: String },
    /// Look up a counter or object name by its registry index.
    Lookup { index: u32 },
    /// Expand a wildcard counter path.
    Expand { pattern: String },
    /// List the counters and instances of a performance object.
    Items { object: String },
    /// Build a counter path from its elements.
    MakePath {
        #[arg(long)]
        object: String,
        #[arg(long)]
        counter: String,
        #[arg(long)]
        instance: Option<String>,
        #[arg(long)]
        machine: Option<String>,
    },
    /// Collect a counter twice and print its formatted value.
    Sample {
        path: String,
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(()) => 0,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

// Stdout carries JSON and stderr carries JSON errors, so lifecycle chatter stays opt-in.
const DEFAULT_LOG_FILTER: &str = "warn";

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn run() -> Result<(), Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                return Ok(());
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Try `pdhlink --help`."));
            }
        },
    };

    if let Command::Status { code } = &cli.command {
        return emit_json(&status_json(parse_status(code)?));
    }

    let config = BindingConfig::resolve(cli.library, cli.config.as_deref())?;
    tracing::debug!(library = %config.library, "configuring pdh binding");
    pdh::configure(config)?;

    match cli.command {
        Command::Status { .. } => Ok(()),
        Command::Probe { require } => {
            let attachment = pdh::attachment();
            let snapshot = pdh::binding().snapshot();
            if require {
                attachment.require()?;
            } else {
                drop(attachment);
            }
            let value = serde_json::to_value(&snapshot).map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to encode snapshot")
                    .with_source(err)
            })?;
            emit_json(&value)
        }
        Command::Lookup { index } => {
            let attachment = pdh::attachment().require()?;
            let name = query::lookup_perf_name(&attachment, index)?;
            emit_json(&json!({ "index": index, "name": name }))
        }
        Command::Expand { pattern } => {
            let attachment = pdh::attachment().require()?;
            let paths = query::expand_wildcard_path(&attachment, &pattern)?;
            emit_json(&json!({ "pattern": pattern, "paths": paths }))
        }
        Command::Items { object } => {
            let attachment = pdh::attachment().require()?;
            let items = query::enum_object_items(&attachment, &object)?;
            emit_json(&json!({
                "object": object,
                "counters": items.counters,
                "instances": items.instances,
            }))
        }
        Command::MakePath {
            object,
            counter,
            instance,
            machine,
        } => {
            let attachment = pdh::attachment().require()?;
            let elements = CounterPathElements {
                machine,
                object,
                instance,
                counter,
                ..CounterPathElements::default()
            };
            let path = query::make_counter_path(&attachment, &elements)?;
            emit_json(&json!({ "path": path }))
        }
        Command::Sample { path, interval_ms } => {
            let attachment = pdh::attachment().require()?;
            let mut counters = CounterQuery::open(&attachment)?;
            let counter = counters.add_counter(&path)?;
            counters.collect()?;
            thread::sleep(Duration::from_millis(interval_ms));
            counters.collect()?;
            let value = counters.formatted_double(counter)?;
            emit_json(&json!({ "path": path, "value": value }))
        }
    }
}

fn parse_status(text: &str) -> Result<i32, Error> {
    let trimmed = text.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16).map(|code| code as i32).ok(),
        None => trimmed.parse::<i32>().ok(),
    };
    parsed.ok_or_else(|| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid status code: {text}"))
            .with_hint("Use a decimal value or 0x-prefixed hex, e.g. 0x800007D2.")
    })
}

fn status_json(code: i32) -> Value {
    let status = PdhStatus::classify(code);
    json!({
        "code": code,
        "hex": format!("{:#010x}", code as u32),
        "name": status_name(code),
        "failure": status.is_failure(),
        "status": status,
    })
}

fn emit_json(value: &Value) -> Result<(), Error> {
    let text = serde_json::to_string_pretty(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("json encode failed")
            .with_source(err)
    })?;
    println!("{text}");
    Ok(())
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    err.message()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{:?}", err.kind()))
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut current = err.source();
    while let Some(cause) = current {
        causes.push(cause.to_string());
        current = cause.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(symbol) = err.symbol() {
        inner.insert("symbol".to_string(), json!(symbol));
    }
    if let Some(status) = err.status() {
        inner.insert("status".to_string(), json!(status));
        if let Some(name) = status_name(status) {
            inner.insert("status_name".to_string(), json!(name));
        }
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(symbol) = err.symbol() {
        lines.push(format!("symbol: {symbol}"));
    }
    if let Some(status) = err.status() {
        lines.push(format!("status: {}", PdhStatus::classify(status)));
    }
    for cause in error_causes(err) {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
