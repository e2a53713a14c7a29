//! Script errors

use std::io;
use std::path::PathBuf;

/// Errors raised while running tl script
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("{origin}:{line}: syntax error: {message}")]
    Syntax {
        origin: String,
        line: usize,
        message: String,
    },
    #[error("line {line}: name '{name}' is not defined")]
    Name { name: String, line: usize },
    #[error("line {line}: type error: {message}")]
    Type { message: String, line: usize },
    #[error("line {line}: {message}")]
    Raised { message: String, line: usize },
    #[error("can't open file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no module named '{name}'")]
    ModuleNotFound { name: String, searched: Vec<PathBuf> },
    #[error("{0}")]
    Usage(String),
    #[error("exit requested with status {code}")]
    Exit { code: i32 },
    #[error("no top-level task context is live")]
    NoTaskContext,
}

impl ScriptError {
    /// Whether this is a missing-file error
    pub fn is_not_found(&self) -> bool {
        matches!(self, ScriptError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }

    pub(crate) fn type_error(
        line: usize,
        message: impl Into<String>,
    ) -> Self {
        ScriptError::Type {
            message: message.into(),
            line,
        }
    }
}
