//! Errors - エラー型と分類
//!
//! 境界ごとにエラー型を分けています。
//! - `StoreError`: Job Store（正本）
//! - `QueueError`: Work Queue（配送）
//! - `QueryError`: 外部クエリエンジン
//! - `BobbinError`: Producer / Worker / StatusReader が呼び出し元に返すエラー
//!
//! どのエラーも `ErrorKind` で運用分類でき、リトライ判定と HTTP マッピングに使います。

use std::time::Duration;

use super::ids::JobId;
use super::job::TransitionError;

/// Operational classification of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input. No side effects happened.
    Validation,
    /// The referenced job does not exist.
    NotFound,
    /// The request contradicts existing state.
    Conflict,
    /// Infrastructure hiccup (store / queue). Worth retrying.
    Transient,
    /// Retrying will not help.
    Permanent,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

/// Anything that can report its `ErrorKind`.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

/// A rejected request field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl Classify for ValidationError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// Errors raised by a `JobStore`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job store unavailable: {0}")]
    Unavailable(String),

    #[error("job {id}: {source}")]
    Transition {
        id: JobId,
        #[source]
        source: TransitionError,
    },

    #[error("job {id}: stored record is unreadable: {reason}")]
    Corrupt { id: JobId, reason: String },
}

impl Classify for StoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Unavailable(_) => ErrorKind::Transient,
            StoreError::Transition { .. } => ErrorKind::Conflict,
            StoreError::Corrupt { .. } => ErrorKind::Permanent,
        }
    }
}

/// Errors raised by a `WorkQueue`.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("work queue unavailable: {0}")]
    Unavailable(String),

    /// The visibility window lapsed; the message is visible again.
    #[error("receipt {0} is no longer valid")]
    StaleReceipt(String),

    #[error("dispatch message could not be encoded: {0}")]
    Encode(String),
}

impl Classify for QueueError {
    fn kind(&self) -> ErrorKind {
        match self {
            QueueError::Unavailable(_) => ErrorKind::Transient,
            QueueError::StaleReceipt(_) => ErrorKind::Conflict,
            QueueError::Encode(_) => ErrorKind::Permanent,
        }
    }
}

/// Errors raised while executing a named operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("{0}")]
    Execution(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl Classify for QueryError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Permanent
    }
}

/// Errors surfaced by the producer, worker and status reader.
#[derive(Debug, thiserror::Error)]
pub enum BobbinError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("job {0} not found")]
    NotFound(String),

    #[error("job {0} already exists with different params")]
    IdConflict(JobId),

    #[error("job store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("work queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("operation {operation} failed: {source}")]
    OperationExecution {
        operation: String,
        #[source]
        source: QueryError,
    },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl Classify for BobbinError {
    fn kind(&self) -> ErrorKind {
        match self {
            BobbinError::Validation(_) => ErrorKind::Validation,
            BobbinError::NotFound(_) => ErrorKind::NotFound,
            BobbinError::IdConflict(_) => ErrorKind::Conflict,
            BobbinError::StoreUnavailable(_) | BobbinError::QueueUnavailable(_) => {
                ErrorKind::Transient
            }
            BobbinError::OperationExecution { .. } | BobbinError::InvariantViolation(_) => {
                ErrorKind::Permanent
            }
        }
    }
}

impl From<StoreError> for BobbinError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => BobbinError::NotFound(id.to_string()),
            StoreError::Unavailable(msg) => BobbinError::StoreUnavailable(msg),
            other @ (StoreError::Transition { .. } | StoreError::Corrupt { .. }) => {
                BobbinError::InvariantViolation(other.to_string())
            }
        }
    }
}

impl From<QueueError> for BobbinError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Encode(msg) => BobbinError::InvariantViolation(msg),
            other => BobbinError::QueueUnavailable(other.to_string()),
        }
    }
}
