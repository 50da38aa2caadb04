//! Error types for the sync engine.

use sparkle_core::{ModelError, PrimaryKey, State};
use sparkle_sync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// Protocol desynchronization and malformed change entries are not errors:
/// sessions recover from them by resyncing or dropping the entry.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The router could not deliver a message.
    #[error("router error: {message}")]
    Router {
        /// Error message.
        message: String,
        /// Whether delivery can be retried.
        retryable: bool,
    },

    /// Model error while applying changes.
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Message encoding or decoding failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The keep-alive task is already running.
    #[error("keep-alive already running")]
    KeepAliveRunning,

    /// A keep-alive task was started outside a tokio runtime.
    #[error("no tokio runtime available")]
    NoRuntime,

    /// No session exists for the host.
    #[error("no session for host {0}")]
    UnknownSession(String),

    /// A change was refused before touching the model.
    #[error("invalid change: {0}")]
    InvalidChange(String),
}

impl SyncError {
    /// Creates a retryable router error.
    pub fn router_retryable(message: impl Into<String>) -> Self {
        Self::Router {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable router error.
    pub fn router_fatal(message: impl Into<String>) -> Self {
        Self::Router {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Router { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

/// Why a reported change entry was dropped.
///
/// Rejections are logged and counted, never propagated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The entry does not have the `[table, pkey, state, part]` shape.
    #[error("malformed entry: {0}")]
    Malformed(String),

    /// Hosts may only report current state.
    #[error("state {0} cannot be reported")]
    StateNotCurrent(State),

    /// The table is not one hosts report.
    #[error("table {0} is not host-reportable")]
    TableNotReportable(String),

    /// The part lacks a primary key column.
    #[error("part lacks primary key column {0}")]
    MissingPrimaryKey(String),

    /// The part's primary key differs from the entry's.
    #[error("part key {found} does not match entry key {expected}")]
    PrimaryKeyMismatch {
        /// Key named by the entry.
        expected: PrimaryKey,
        /// Key found in the part.
        found: PrimaryKey,
    },
}
