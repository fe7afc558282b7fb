//! Common error types for QuickCrypt.

use std::path::PathBuf;

use thiserror::Error;

/// Process exit code for a successful run.
pub const EXIT_SUCCESS: u8 = 0;

/// Process exit code for configuration, I/O, resource and usage errors.
pub const EXIT_FAILURE: u8 = 1;

/// Process exit code when a ciphertext stream fails authentication or
/// violates the framing protocol.
pub const EXIT_INTEGRITY_FAILURE: u8 = 2;

/// Top-level error type for QuickCrypt operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Key source misconfigured (missing, established twice, bad salt, ...).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A named file could not be read or written.
    #[error("{}: {source}", path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O on the data streams failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The host could not provide the resources an operation needs.
    #[error("Resource error: {0}")]
    Resource(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Cryptographic primitive failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Ciphertext failed authentication.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Ciphertext stream is malformed (truncated, trailing data, bad tag).
    #[error("Protocol violation: {0}")]
    Protocol(String),
}

impl Error {
    /// Build a [`Error::FileAccess`] for `path`.
    pub fn file_access(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileAccess {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means the ciphertext could not be trusted.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Protocol(_))
    }

    /// Exit code the command line front end reports for this error.
    pub fn exit_code(&self) -> u8 {
        if self.is_integrity_failure() {
            EXIT_INTEGRITY_FAILURE
        } else {
            EXIT_FAILURE
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
