//! Error types shared by the harness components.
//!
//! Two classes matter to callers: configuration errors abort the whole run
//! on the spot, everything else is counted against the current document
//! and surfaced at its end.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal misconfiguration. Never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown language '{0}' (expected one of: {list})", list = crate::language::Language::names().join(", "))]
    UnknownLanguage(String),

    #[error("bad characters in ${var}: {value:?}")]
    UnsafeTool { var: &'static str, value: String },

    #[error("bad characters in cleanfirst: {0:?}")]
    UnsafeCleanTarget(String),

    #[error("'{tool} {option}' doesn't work")]
    ToolProbe { tool: String, option: &'static str },
}

/// Errors raised while processing directives.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: pattern {pattern:?} not found", file.display())]
    PatternNotFound { file: PathBuf, pattern: String },

    #[error("{}: {errors} error(s) with example code", document.display())]
    DocumentFailed { document: PathBuf, errors: usize },
}

impl HarnessError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Configuration errors terminate the run; the rest are per-document.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;
