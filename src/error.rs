//! Error types for layout construction and signing.

use signy_keys::{ErrorKind, KeyError};
use signy_rules::RuleError;
use std::io;
use std::path::PathBuf;

/// Errors from loading a layout plan file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render TOML: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid rule {rule:?} in {location}: {source}")]
    Rule {
        location: String,
        rule: String,
        #[source]
        source: RuleError,
    },

    #[error(transparent)]
    Key(#[from] KeyError),
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound => {
                ErrorKind::NotFound
            }
            ConfigError::Io { .. } => ErrorKind::StorageError,
            ConfigError::Key(e) => e.kind(),
            ConfigError::Parse(_)
            | ConfigError::Render(_)
            | ConfigError::Validation(_)
            | ConfigError::Rule { .. } => ErrorKind::InvalidInput,
        }
    }
}

/// Errors from building, assembling, signing, or persisting a layout
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("refusing to overwrite {}", .0.display())]
    PathCollision(PathBuf),

    #[error("cannot canonicalize layout: {0}")]
    Canonicalize(String),

    #[error("malformed layout document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LayoutError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            LayoutError::Key(e) => e.kind(),
            LayoutError::Config(e) => e.kind(),
            LayoutError::Rule(_) | LayoutError::InvalidInput(_) | LayoutError::Json(_) => {
                ErrorKind::InvalidInput
            }
            LayoutError::InvalidThreshold(_) => ErrorKind::InvalidThreshold,
            LayoutError::InvariantViolation(_) | LayoutError::Canonicalize(_) => {
                ErrorKind::InvariantViolation
            }
            LayoutError::PathCollision(_) => ErrorKind::PathCollision,
            LayoutError::Io { source, .. } => match source.kind() {
                io::ErrorKind::NotFound => ErrorKind::NotFound,
                io::ErrorKind::AlreadyExists => ErrorKind::PathCollision,
                _ => ErrorKind::StorageError,
            },
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        LayoutError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for layout operations
pub type LayoutResult<T> = Result<T, LayoutError>;
