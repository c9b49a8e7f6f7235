//! Error types for local git log reads.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from reading commit history out of a local clone.
#[derive(Error, Debug)]
pub enum GitLogError {
    #[error("git executable not found")]
    GitMissing,

    #[error("{0} is not a git clone")]
    NotAClone(PathBuf),

    #[error("git log {revision} failed: {stderr}")]
    LogFailed { revision: String, stderr: String },

    #[error("malformed git log output: {0}")]
    MalformedLog(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("git log output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
