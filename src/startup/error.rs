use std::time::Duration;

use thiserror::Error;

/// Why one inventory source contributed nothing
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SourceUnavailable {
    #[error("source not available on this platform")]
    UnsupportedPlatform,
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("tool not found: {0}")]
    ToolMissing(String),
    #[error("{tool} exited unsuccessfully ({status})")]
    ToolFailed { tool: String, status: String },
    #[error("{tool} timed out after {after:?}")]
    TimedOut { tool: String, after: Duration },
    #[error("collection cancelled")]
    Cancelled,
    #[error("i/o error: {0}")]
    Io(String),
    #[error("unreadable output: {0}")]
    Parse(String),
}

impl SourceUnavailable {
    /// Classify an I/O failure raised while reading `what`
    pub fn from_io(what: &str, err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(what.to_string()),
            _ => Self::Io(format!("{}: {}", what, err)),
        }
    }
}
