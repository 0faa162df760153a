//! Errors surfaced by the `flowpatch` binary.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded.
    Config { details: String },
    /// A file could not be read.
    Read { path: PathBuf, details: String },
    /// A file did not contain the expected JSON.
    Parse { path: PathBuf, details: String },
    /// The engine rejected the request before running it.
    Request { details: String },
    /// Output could not be serialized or written.
    Write { path: Option<PathBuf>, details: String },
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "invalid configuration: {details}"),
            Self::Read { path, details } => {
                write!(f, "failed to read '{}': {details}", path.display())
            }
            Self::Parse { path, details } => {
                write!(f, "invalid JSON in '{}': {details}", path.display())
            }
            Self::Request { details } => write!(f, "request rejected: {details}"),
            Self::Write {
                path: Some(path),
                details,
            } => write!(f, "failed to write '{}': {details}", path.display()),
            Self::Write {
                path: None,
                details,
            } => write!(f, "failed to write output: {details}"),
        }
    }
}

impl std::error::Error for CliError {}
