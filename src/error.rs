use std::path::PathBuf;

use thiserror::Error;

use crate::principal::UserId;
use crate::sanitizer::SanitizationError;

/// Failures of login and of authenticated calls in general.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The server rejected the username/password pair
    #[error("invalid username or password")]
    InvalidCredentials,
    /// No session, or the server rejected the session token
    #[error("not authenticated")]
    Unauthorized,
    /// The transport could not reach the server
    #[error("network failure: {0}")]
    NetworkFailure(String),
}

/// Failures of account registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// The server already has an account with that username
    #[error("username is already taken")]
    DuplicateUsername,
    /// Password and confirmation differ; decided locally
    #[error("passwords do not match")]
    Mismatch,
    /// A field failed local validation
    #[error(transparent)]
    InvalidInput(#[from] SanitizationError),
    /// The server rejected the request for another reason, or was unreachable
    #[error("network failure: {0}")]
    NetworkFailure(String),
}

/// Failures of password changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// New password and confirmation differ; decided locally
    #[error("new password and confirmation do not match")]
    Mismatch,
    /// The server did not accept the current password
    #[error("current password is incorrect")]
    WrongCurrentPassword,
    /// The new password failed local validation
    #[error(transparent)]
    InvalidInput(#[from] SanitizationError),
    /// No session, or the session was rejected (the session has been cleared)
    #[error("not authenticated")]
    Unauthorized,
    /// A password change is already in flight
    #[error("a password change is already in progress")]
    Busy,
    /// Any other transport failure
    #[error("network failure: {0}")]
    NetworkFailure(String),
}

/// No record with the given id exists in the current snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("user {id} not found")]
pub struct NotFoundError {
    /// The id that was looked up
    pub id: UserId,
}

/// Failures of directory and profile operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// The id is not in the snapshot (or the server no longer has it)
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    /// Another mutation on the same id is still in flight
    #[error("user {0} has a request in flight")]
    Busy(UserId),
    /// The server refused the change; the local snapshot was rolled back
    #[error("rejected by server: {0}")]
    Rejected(String),
    /// A field failed local validation; nothing was sent
    #[error(transparent)]
    InvalidInput(#[from] SanitizationError),
    /// No session, or the session was rejected (the session has been cleared)
    #[error("not authenticated")]
    Unauthorized,
    /// The transport could not reach the server; the local snapshot was rolled back
    #[error("network failure: {0}")]
    NetworkFailure(String),
    /// The owning client context was torn down before the result arrived
    #[error("client context was torn down")]
    Cancelled,
}

/// Failures reported by a [`Transport`](crate::Transport) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// 401 or 403
    #[error("unauthorized (status {0})")]
    Unauthorized(u16),
    /// 404
    #[error("not found")]
    NotFound,
    /// Any other non-success status; `message` is the response body
    #[error("rejected with status {status}: {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Server-provided reason
        message: String,
    },
    /// Connection, timeout or TLS failure
    #[error("network failure: {0}")]
    Network(String),
    /// The response body could not be decoded
    #[error("malformed response: {0}")]
    Decode(String),
}

impl TransportError {
    /// True for 401/403, which end the session.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, TransportError::Unauthorized(_))
    }
}

/// Failures of durable token storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the token file failed
    #[error("cannot access token file {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// The token file exists but is not valid TOML for a stored session
    #[error("corrupted token file {path}: {message}")]
    Corrupted {
        /// File involved
        path: PathBuf,
        /// Parser message
        message: String,
    },
    /// The session could not be serialized
    #[error("cannot serialize session: {0}")]
    Serialize(String),
}

/// Failures loading [`ClientConfig`](crate::ClientConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("cannot read config {path}: {source}")]
    Read {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid TOML
    #[error("invalid config {path}: {message}")]
    Parse {
        /// File involved
        path: PathBuf,
        /// Parser message
        message: String,
    },
    /// A value is out of range or malformed
    #[error("invalid value for {key}: {message}")]
    Invalid {
        /// Config key
        key: &'static str,
        /// What is wrong with it
        message: String,
    },
}

/// Failures starting a [`ConsoleClient`](crate::ConsoleClient).
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Stored session could not be read
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The HTTP transport could not be built
    #[error(transparent)]
    Transport(#[from] TransportError),
}
