//! Error types for key management.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Stable error classification shared by every layer of the layout build.
///
/// These codes are what the command-line surface reports and maps to exit
/// codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed names, rules, or configuration
    InvalidInput,
    /// m/n out of range, or no signing keys where at least one is required
    InvalidThreshold,
    /// A key file already exists where a fresh write or rename was expected
    PathCollision,
    /// An expected key file is missing
    NotFound,
    /// Wrong or missing passphrase for an encrypted private key
    DecryptionError,
    /// Internal consistency check failed (duplicate key id, dangling key reference)
    InvariantViolation,
    /// Filesystem failure unrelated to collisions
    StorageError,
}

impl ErrorKind {
    /// Returns the string representation of the error kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::InvalidThreshold => "INVALID_THRESHOLD",
            ErrorKind::PathCollision => "PATH_COLLISION",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::DecryptionError => "DECRYPTION_ERROR",
            ErrorKind::InvariantViolation => "INVARIANT_VIOLATION",
            ErrorKind::StorageError => "STORAGE_ERROR",
        }
    }

    /// Process exit code for this kind of failure
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::InvalidInput => 2,
            ErrorKind::InvalidThreshold => 3,
            ErrorKind::PathCollision => 4,
            ErrorKind::NotFound => 5,
            ErrorKind::DecryptionError => 6,
            ErrorKind::InvariantViolation => 7,
            ErrorKind::StorageError => 8,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors from threshold, keystore, and keyring operations
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("refusing to overwrite existing key file {}", .0.display())]
    PathCollision(PathBuf),

    #[error("key file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("cannot decrypt private key {}: {reason}", .path.display())]
    Decryption { path: PathBuf, reason: String },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("storage error at {}: {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid key material in {}: {reason}", .path.display())]
    InvalidKey { path: PathBuf, reason: String },

    #[error("invalid functionary name {0:?}: expected [A-Za-z0-9][A-Za-z0-9._-]*")]
    InvalidName(String),

    #[error("passphrase: {0}")]
    Passphrase(String),
}

impl KeyError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            KeyError::InvalidThreshold(_) => ErrorKind::InvalidThreshold,
            KeyError::PathCollision(_) => ErrorKind::PathCollision,
            KeyError::NotFound(_) => ErrorKind::NotFound,
            KeyError::Decryption { .. } => ErrorKind::DecryptionError,
            KeyError::InvariantViolation(_) => ErrorKind::InvariantViolation,
            KeyError::Storage { .. } | KeyError::InvalidKey { .. } => ErrorKind::StorageError,
            KeyError::InvalidName(_) | KeyError::Passphrase(_) => ErrorKind::InvalidInput,
        }
    }

    /// Map an I/O error on `path`, keeping missing files and collisions distinct.
    pub(crate) fn from_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::NotFound => KeyError::NotFound(path),
            io::ErrorKind::AlreadyExists => KeyError::PathCollision(path),
            _ => KeyError::Storage { path, source },
        }
    }
}

/// Result type for key operations
pub type KeyResult<T> = Result<T, KeyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_str() {
        assert_eq!(ErrorKind::PathCollision.as_str(), "PATH_COLLISION");
        assert_eq!(ErrorKind::InvariantViolation.to_string(), "INVARIANT_VIOLATION");
    }

    #[test]
    fn test_exit_codes_are_nonzero_and_distinct() {
        let kinds = [
            ErrorKind::InvalidInput,
            ErrorKind::InvalidThreshold,
            ErrorKind::PathCollision,
            ErrorKind::NotFound,
            ErrorKind::DecryptionError,
            ErrorKind::InvariantViolation,
            ErrorKind::StorageError,
        ];
        let mut codes: Vec<i32> = kinds.iter().map(ErrorKind::exit_code).collect();
        assert!(codes.iter().all(|c| *c != 0));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn test_from_io_classification() {
        let not_found = KeyError::from_io("/x", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(not_found.kind(), ErrorKind::NotFound);

        let exists = KeyError::from_io("/x", io::Error::from(io::ErrorKind::AlreadyExists));
        assert_eq!(exists.kind(), ErrorKind::PathCollision);

        let denied = KeyError::from_io("/x", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(denied.kind(), ErrorKind::StorageError);
    }
}
