//! The `error` module defines the error types used within `ledgercast`.
//!
//! The broadcaster core deliberately exposes no error from register, publish
//! or unregister. Failures there are absorbed as subscriber termination and
//! described by [`SessionError`]. Request-level problems at the HTTP boundary
//! are [`ApiError`], and process startup failures are [`AppError`].

use std::time::Duration;

use thiserror::Error;

/// Boxed error produced by a [`Connection`](crate::client::Connection) write.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a subscriber session stopped draining.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The read side observed the peer closing or erroring.
    #[error("connection closed by peer")]
    Cancelled,

    /// The publish path found the outbound queue full.
    #[error("connection too slow to keep up with messages")]
    Evicted,

    /// The subscriber was removed from the registry by someone else.
    #[error("subscriber unregistered")]
    Unregistered,

    /// A single write exceeded its deadline.
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    /// The connection rejected a write.
    #[error("write failed: {0}")]
    Write(#[source] BoxError),

    /// `run` was called on a session that already finished.
    #[error("session already terminated")]
    Terminated,
}

impl SessionError {
    /// Expected closures that are not worth more than a debug line.
    pub fn is_expected(&self) -> bool {
        matches!(self, SessionError::Cancelled | SessionError::Unregistered)
    }
}

/// Errors rejected at the HTTP boundary, before anything reaches the broker.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid deposit amount: {0:?}")]
    InvalidDeposit(String),

    #[error("deposit of {deposit} overflows balance of account {account_id}")]
    BalanceOverflow { account_id: String, deposit: i64 },

    #[error("topic must not be empty")]
    EmptyTopic,
}

/// Process-level failures surfaced from `main`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid CORS origin: {0:?}")]
    InvalidOrigin(String),
}

/// Result type for process-level operations.
pub type Result<T> = std::result::Result<T, AppError>;
