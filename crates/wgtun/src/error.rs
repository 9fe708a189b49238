//! Error types for tunnel configuration and network operations.

use std::io;

/// Result type for tunnel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing, compiling or applying a tunnel.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from socket or file operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration text could not be parsed.
    #[error("line {line}: {message}")]
    Parse {
        /// 1-based line number in the source document.
        line: usize,
        /// Human-readable description.
        message: String,
    },

    /// Key material was not valid base64 or had the wrong length.
    #[error("invalid key: {0}")]
    Key(String),

    /// Caller-provided buffer cannot hold the compiled configuration.
    #[error("buffer too small: {required} bytes required, {capacity} available")]
    BufferTooSmall {
        /// Bytes the configuration needs.
        required: usize,
        /// Bytes the caller provided.
        capacity: usize,
    },

    /// Bytes written differ from the size computed up front.
    #[error("size mismatch: computed {expected} bytes, wrote {written}")]
    SizeMismatch {
        /// Size computed before writing.
        expected: usize,
        /// Bytes actually written.
        written: usize,
    },

    /// A collection is too large for its 32-bit count field.
    #[error("too many {what}: {count}")]
    TooMany {
        /// What was being counted.
        what: &'static str,
        /// How many there were.
        count: usize,
    },

    /// Operating system or driver call failed.
    #[error("OS error: {message} (code {errno})")]
    Os {
        /// The error code reported by the OS.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// OS error with operation context.
    #[error("{operation}: {message} (code {errno})")]
    OsWithContext {
        /// The operation that failed.
        operation: String,
        /// The error code reported by the OS.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// The driver capability set is not loaded.
    #[error("tunnel driver is not available")]
    Unavailable,

    /// Operation attempted on an adapter handle that is not valid.
    #[error("adapter handle is not valid")]
    InvalidHandle,

    /// Configuration was set on the adapter but bringing it up failed.
    #[error("configuration applied but adapter not brought up: {0}")]
    NotBroughtUp(Box<Error>),

    /// Message was truncated.
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Expected message length.
        expected: usize,
        /// Actual bytes received.
        actual: usize,
    },

    /// Invalid message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Malformed or out-of-range address prefix.
    #[error("invalid prefix: {0}")]
    InvalidPrefix(String),

    /// Interface not found.
    #[error("interface not found: {0}")]
    InterfaceNotFound(String),
}

impl Error {
    /// Create an OS error from a (possibly negated) errno value.
    pub fn from_errno(errno: i32) -> Self {
        let errno = errno.abs();
        let message = io::Error::from_raw_os_error(errno).to_string();
        Self::Os { errno, message }
    }

    /// Create an OS error with operation context.
    pub fn from_errno_with_context(errno: i32, operation: impl Into<String>) -> Self {
        Self::from_errno(errno).with_context(operation)
    }

    /// Add context to this error.
    ///
    /// Wraps OS errors with operation context. Other errors are returned unchanged.
    pub fn with_context(self, operation: impl Into<String>) -> Self {
        match self {
            Self::Os { errno, message } => Self::OsWithContext {
                operation: operation.into(),
                errno,
                message,
            },
            other => other,
        }
    }

    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }

    /// Check if this is a "not found" error (ENOENT, ESRCH, ENODEV, EADDRNOTAVAIL).
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Os { errno, .. } | Self::OsWithContext { errno, .. } => {
                matches!(*errno, libc::ENOENT | libc::ESRCH | libc::ENODEV | libc::EADDRNOTAVAIL)
            }
            Self::InterfaceNotFound(_) => true,
            _ => false,
        }
    }

    /// Check if this is an "already exists" error (EEXIST).
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::Os { errno, .. } | Self::OsWithContext { errno, .. } => *errno == libc::EEXIST,
            _ => false,
        }
    }

    /// Check if this is a permission error (EPERM, EACCES).
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::Os { errno, .. } | Self::OsWithContext { errno, .. } => {
                matches!(*errno, libc::EPERM | libc::EACCES)
            }
            _ => false,
        }
    }

    /// Get the OS error code, if any.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Os { errno, .. } | Self::OsWithContext { errno, .. } => Some(*errno),
            Self::Io(e) => e.raw_os_error(),
            Self::NotBroughtUp(inner) => inner.errno(),
            _ => None,
        }
    }
}
