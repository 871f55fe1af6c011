//! Top-level server errors and their process exit codes.

use thiserror::Error;

/// Fatal errors that stop the server process.
///
/// Each variant maps to a distinct exit code so supervisors can tell a bad
/// configuration apart from a transient I/O failure.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("no configuration: {0}")]
    NoConfiguration(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("incompatible protocol: {0}")]
    IncompatibleProtocol(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            ServerError::NoConfiguration(_) => 4,
            ServerError::InvalidAddress(_) => 3,
            ServerError::IncompatibleProtocol(_) => 5,
            ServerError::Io(_) => 1,
        }
    }
}
