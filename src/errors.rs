// ABOUTME: Error types for the slidev pipeline
// ABOUTME: Provides structured error handling for each stage of the transform chain

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SlidevError {
    #[error("Failed to read file: {0}")]
    FileReadError(#[from] std::io::Error),

    #[error("Failed to fetch remote asset: {0}")]
    FetchError(#[from] reqwest::Error),

    /// Bad theme or project layout. Aborts the whole build.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Malformed input for a single file. Sibling files keep compiling.
    #[error("Failed to compile {file}: {message}")]
    CompileError { file: String, message: String },

    /// A virtual module references a slide or setup file that does not exist.
    #[error("Failed to resolve {id}: {message}")]
    ResolutionError { id: String, message: String },

    #[error("Path not found: {0}")]
    PathNotFoundError(PathBuf),

    #[error("Input validation error: {0}")]
    ValidationError(String),

    #[error("Watch error: {0}")]
    WatchError(String),

    #[error("Unknown error: {0}")]
    UnknownError(String),
}

impl SlidevError {
    pub fn compile(file: impl Into<String>, message: impl Into<String>) -> Self {
        SlidevError::CompileError {
            file: file.into(),
            message: message.into(),
        }
    }

    pub fn resolution(id: impl Into<String>, message: impl Into<String>) -> Self {
        SlidevError::ResolutionError {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Fatal errors terminate the affected build invocation; the rest are
    /// contained at the file boundary.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SlidevError::ConfigError(_) | SlidevError::ResolutionError { .. }
        )
    }
}

// Implement conversion from anyhow::Error to our SlidevError
impl From<anyhow::Error> for SlidevError {
    fn from(err: anyhow::Error) -> Self {
        SlidevError::UnknownError(err.to_string())
    }
}

impl From<glob::PatternError> for SlidevError {
    fn from(err: glob::PatternError) -> Self {
        SlidevError::ConfigError(format!("Invalid glob pattern: {}", err))
    }
}

impl From<regex::Error> for SlidevError {
    fn from(err: regex::Error) -> Self {
        SlidevError::ConfigError(format!("Invalid pattern: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, SlidevError>;

/// A non-fatal problem that was logged and skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Degradation {
    /// A used component tag that no directory or resolver could provide.
    UnresolvedComponent { tag: String },
    /// A remote asset that could not be materialized locally.
    AssetFetchFailed { url: String, reason: String },
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::UnresolvedComponent { tag } => {
                write!(f, "unresolved component <{}>", tag)
            }
            Degradation::AssetFetchFailed { url, reason } => {
                write!(f, "failed to fetch {}: {}", url, reason)
            }
        }
    }
}
