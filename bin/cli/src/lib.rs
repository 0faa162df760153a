//! The `flowpatch` command: applies a diff request file to a workflow
//! document file.
//!
//! The engine itself never touches the filesystem. This crate is the
//! caller that reads both inputs, reports the [`DiffResult`] and decides
//! whether to persist the patched document.

pub mod config;
pub mod error;

use crate::config::CliConfig;
use crate::error::CliError;
use clap::Parser;
use flowpatch_core::Result;
use flowpatch_workflow::{DiffEngine, DiffResult, WorkflowDocument};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Apply a batch of edit operations to a workflow document
#[derive(Debug, Clone, Parser)]
#[command(name = "flowpatch")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Workflow document (JSON)
    #[arg(short, long)]
    pub document: PathBuf,

    /// Diff request (JSON)
    #[arg(short, long)]
    pub request: PathBuf,

    /// Write the patched workflow back to the document file
    #[arg(short, long)]
    pub write: bool,

    /// Write the result to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// What a run produced.
#[derive(Debug)]
pub struct Outcome {
    pub result: DiffResult,
    /// Whether the document file was rewritten.
    pub persisted: bool,
}

/// Runs one diff request, writing the result to `--output` or `stdout`.
///
/// # Errors
///
/// Returns an error if an input cannot be read or parsed, the request is
/// rejected as a whole, or the output cannot be written. Failed operations
/// are not errors; they are reported in the result.
#[instrument(skip_all, fields(document = %args.document.display(), write = args.write))]
pub fn run(
    args: &Args,
    config: &CliConfig,
    stdout: &mut impl Write,
) -> Result<Outcome, CliError> {
    let document: WorkflowDocument = read_json(&args.document)?;
    let request: JsonValue = read_json(&args.request)?;

    let engine = DiffEngine::new(config.engine.clone());
    let result = engine
        .apply_json(&document, &request)
        .map_err(|err| CliError::Request {
            details: err.to_string(),
        })?;

    let persisted = match &result.workflow {
        Some(workflow) if args.write && result.should_persist() => {
            write_file(&args.document, &to_json(workflow, config.pretty, Some(&args.document))?)?;
            info!(path = %args.document.display(), "persisted patched workflow");
            true
        }
        _ => {
            if args.write {
                debug!("result not persistable, leaving document untouched");
            }
            false
        }
    };

    let rendered = to_json(&result, config.pretty, args.output.as_deref())?;
    match &args.output {
        Some(path) => write_file(path, &rendered)?,
        None => writeln!(stdout, "{rendered}").map_err(|err| CliError::Write {
            path: None,
            details: err.to_string(),
        })?,
    }

    Ok(Outcome { result, persisted })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let text = fs::read_to_string(path).map_err(|err| CliError::Read {
        path: path.to_path_buf(),
        details: err.to_string(),
    })?;
    let value = serde_json::from_str(&text).map_err(|err| CliError::Parse {
        path: path.to_path_buf(),
        details: err.to_string(),
    })?;
    Ok(value)
}

fn to_json(
    value: &impl Serialize,
    pretty: bool,
    path: Option<&Path>,
) -> Result<String, CliError> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    let rendered = rendered.map_err(|err| CliError::Write {
        path: path.map(Path::to_path_buf),
        details: err.to_string(),
    })?;
    Ok(rendered)
}

fn write_file(path: &Path, contents: &str) -> Result<(), CliError> {
    fs::write(path, format!("{contents}\n")).map_err(|err| CliError::Write {
        path: Some(path.to_path_buf()),
        details: err.to_string(),
    })?;
    Ok(())
}
